//! Core types for the negotiation core
//!
//! Identifiers, media descriptions and the engine-facing value types shared by
//! the transport adapter, the state machine and the controller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a locally published media stream
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new() -> Self {
        Self(format!("stream-{}", uuid::Uuid::new_v4()))
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StreamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a media track
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TrackId(pub String);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-assigned transceiver handle
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransceiverId(pub u64);

impl fmt::Display for TransceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transceiver-{}", self.0)
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A single local media track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: TrackId,
    pub kind: MediaKind,
}

impl MediaTrack {
    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: TrackId(id.into()),
            kind: MediaKind::Audio,
        }
    }

    pub fn video(id: impl Into<String>) -> Self {
        Self {
            id: TrackId(id.into()),
            kind: MediaKind::Video,
        }
    }
}

/// A local media stream: a labelled group of tracks published together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: StreamId,
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<StreamId>) -> Self {
        Self {
            id: id.into(),
            tracks: Vec::new(),
        }
    }

    /// Add a track to the stream
    pub fn with_track(mut self, track: MediaTrack) -> Self {
        self.tracks.push(track);
        self
    }

    /// A stream with a freshly generated id
    pub fn generated() -> Self {
        Self::new(StreamId::new())
    }
}

/// Type of a session description
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offer => write!(f, "offer"),
            Self::Answer => write!(f, "answer"),
            Self::Pranswer => write!(f, "pranswer"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// An SDP offer or answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Marker used by both ends for the end-of-candidates sentinel
pub const END_OF_CANDIDATES: &str = "end";

/// A normalized ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub sdp_m_line_index: i32,
    pub sdp_mid: Option<String>,
    pub candidate: String,
}

impl IceCandidate {
    /// The sentinel signalling that candidate gathering has completed
    pub fn end_of_candidates() -> Self {
        Self {
            sdp_m_line_index: -1,
            sdp_mid: Some(END_OF_CANDIDATES.to_string()),
            candidate: END_OF_CANDIDATES.to_string(),
        }
    }

    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate == END_OF_CANDIDATES
    }
}

/// Options for creating a local offer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OfferOptions {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
    pub ice_restart: bool,
}

/// Direction of a transceiver
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransceiverDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

/// Send encoding parameters for one simulcast layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingParameters {
    pub rid: String,
    pub scale_resolution_down_by: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u64>,
}

/// Parameters used when attaching a track to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct TransceiverInit {
    pub direction: TransceiverDirection,
    pub stream_ids: Vec<StreamId>,
    pub send_encodings: Vec<EncodingParameters>,
}
