//! Media transport engine seam
//!
//! The engine is the peer-connection primitive that performs ICE, DTLS and
//! SRTP and produces or consumes SDP. The negotiation core only drives it
//! through [`MediaEngine`] and listens to its [`EngineEvent`] notifications.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{
    EncodingParameters, IceCandidate, MediaTrack, OfferOptions, SessionDescription,
    TransceiverId, TransceiverInit,
};

/// Capability set consumed from the media transport engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create a local offer
    async fn create_offer(&self, options: OfferOptions) -> EngineResult<SessionDescription>;

    /// Create a local answer for the applied remote offer
    async fn create_answer(&self) -> EngineResult<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> EngineResult<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> EngineResult<()>;

    /// The currently applied local description, if any
    fn local_description(&self) -> Option<SessionDescription>;

    /// Attach a track as a new transceiver
    async fn add_transceiver(
        &self,
        track: &MediaTrack,
        init: TransceiverInit,
    ) -> EngineResult<TransceiverId>;

    /// Negotiated media section id of a transceiver, once known
    fn transceiver_mid(&self, transceiver: TransceiverId) -> Option<String>;

    /// Detach the outgoing track of a transceiver, keeping its media section
    async fn remove_track(&self, transceiver: TransceiverId) -> EngineResult<()>;

    async fn stop_transceiver(&self, transceiver: TransceiverId) -> EngineResult<()>;

    /// Replace the send encodings of a transceiver
    async fn set_send_encodings(
        &self,
        transceiver: TransceiverId,
        encodings: Vec<EncodingParameters>,
    ) -> EngineResult<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> EngineResult<()>;

    async fn restart_ice(&self) -> EngineResult<()>;

    async fn close(&self) -> EngineResult<()>;
}

/// Asynchronous notifications raised by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Local changes require a new offer
    NegotiationNeeded,
    /// A gathered local candidate; `None` once gathering completed
    IceCandidate(Option<IceCandidate>),
    /// ICE or DTLS failed
    ConnectionFailed(String),
    /// The engine closed the peer connection
    Closed,
}
