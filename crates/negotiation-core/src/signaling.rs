//! Signaling wire format
//!
//! Messages exchanged with the remote peer over the signaling channel. The
//! JSON shape is fixed by the remote side: a `type` tag with camelCase
//! fields.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::ConfigUpdate;
use crate::error::{NegotiationError, Result};
use crate::types::{IceCandidate, SessionDescription, SdpType, StreamId, END_OF_CANDIDATES};

/// Configuration attached to offers and answers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionConfig {
    #[serde(rename = "maxVideoBW", default, skip_serializing_if = "Option::is_none")]
    pub max_video_bw: Option<u32>,
}

impl DescriptionConfig {
    pub fn new(max_video_bw: Option<u32>) -> Self {
        Self { max_video_bw }
    }
}

/// A signaling message, in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingMessage {
    #[serde(rename = "offer")]
    Offer {
        sdp: String,
        #[serde(default)]
        config: DescriptionConfig,
    },

    #[serde(rename = "answer")]
    Answer {
        sdp: String,
        #[serde(default)]
        config: DescriptionConfig,
    },

    #[serde(rename = "candidate")]
    Candidate { candidate: CandidatePayload },

    /// A remote offer could not be applied
    #[serde(rename = "offer-error")]
    OfferError {
        sdp: String,
        #[serde(default)]
        config: DescriptionConfig,
    },

    /// Out-of-band stream options that need no renegotiation
    #[serde(rename = "updatestream")]
    UpdateStream {
        config: ConfigUpdate,
        #[serde(rename = "streamId", default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<StreamId>,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(rename = "previousType", default, skip_serializing_if = "Option::is_none")]
        previous_type: Option<String>,
    },
}

impl SignalingMessage {
    /// Parse a message received as JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NegotiationError::malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the message type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
            Self::OfferError { .. } => "offer-error",
            Self::UpdateStream { .. } => "updatestream",
            Self::Error { .. } => "error",
        }
    }

    /// Build an offer or answer message from a local description
    pub fn description(description: &SessionDescription, max_video_bw: Option<u32>) -> Self {
        let sdp = description.sdp.clone();
        let config = DescriptionConfig::new(max_video_bw);
        match description.sdp_type {
            SdpType::Answer | SdpType::Pranswer => Self::Answer { sdp, config },
            SdpType::Offer | SdpType::Rollback => Self::Offer { sdp, config },
        }
    }

    pub fn candidate(candidate: &IceCandidate) -> Self {
        Self::Candidate {
            candidate: CandidatePayload::from_local(candidate),
        }
    }
}

/// Candidate field as sent by remote peers: either an object or a JSON
/// string encoding one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidatePayload {
    Json(String),
    Object(RawCandidate),
}

/// Candidate fields before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    #[serde(default)]
    pub sdp_m_line_index: serde_json::Value,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub candidate: Option<String>,
}

impl CandidatePayload {
    /// Outbound form of a local candidate; candidate lines always carry `a=`
    pub fn from_local(candidate: &IceCandidate) -> Self {
        let line = if candidate.is_end_of_candidates() || candidate.candidate.starts_with("a=") {
            candidate.candidate.clone()
        } else {
            format!("a={}", candidate.candidate)
        };
        Self::Object(RawCandidate {
            sdp_m_line_index: serde_json::Value::from(candidate.sdp_m_line_index),
            sdp_mid: candidate.sdp_mid.clone(),
            candidate: Some(line),
        })
    }

    /// Normalize into a candidate the engine accepts.
    ///
    /// Returns `Ok(None)` for the end-of-candidates sentinel.
    pub fn normalize(&self) -> Result<Option<IceCandidate>> {
        let raw = match self {
            Self::Object(raw) => raw.clone(),
            Self::Json(json) => serde_json::from_str::<RawCandidate>(json)
                .map_err(|e| NegotiationError::malformed(format!("candidate: {}", e)))?,
        };

        let line = match raw.candidate.as_deref() {
            Some(END_OF_CANDIDATES) => {
                debug!("Ignoring end of candidates");
                return Ok(None);
            }
            Some(line) => strip_attribute_prefix(line),
            None => return Err(NegotiationError::malformed("candidate line missing")),
        };
        if line.is_empty() {
            return Err(NegotiationError::malformed("candidate line empty"));
        }

        let index = coerce_m_line_index(&raw.sdp_m_line_index)?;
        Ok(Some(IceCandidate {
            sdp_m_line_index: index,
            sdp_mid: raw.sdp_mid,
            candidate: line.to_string(),
        }))
    }
}

fn strip_attribute_prefix(mut line: &str) -> &str {
    while let Some(rest) = line.strip_prefix("a=") {
        line = rest;
    }
    line
}

/// Accept a number or a string with a leading integer, e.g. `"1"` or `"1abc"`
fn coerce_m_line_index(value: &serde_json::Value) -> Result<i32> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => parse_leading_int(s),
        _ => None,
    };
    parsed
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| NegotiationError::malformed(format!("invalid sdpMLineIndex: {}", value)))
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Outbound half of the signaling channel
#[derive(Debug, Clone)]
pub struct SignalingSender {
    tx: mpsc::UnboundedSender<SignalingMessage>,
}

impl SignalingSender {
    pub fn new(tx: mpsc::UnboundedSender<SignalingMessage>) -> Self {
        Self { tx }
    }

    /// Create a sender and the receiver the transport drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SignalingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, message: SignalingMessage) -> Result<()> {
        debug!("Sending signaling message, type: {}", message.type_name());
        self.tx.send(message).map_err(|_| NegotiationError::SignalingClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
