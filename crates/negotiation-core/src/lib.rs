//! # Negotiation Core - WebRTC peer connection negotiation
//!
//! This crate governs when and how session descriptions and ICE candidates
//! may be created, applied or renegotiated on a peer connection, and
//! serializes concurrent change requests into a single negotiation pipeline.
//!
//! - **state_machine**: table-driven negotiation states with bounded history
//! - **adapter**: guarded operations against the media engine, SDP munging,
//!   simulcast encodings and candidate normalization
//! - **queue**: at most one offer/answer round in flight
//! - **controller**: ties the three together and is what applications drive
//!
//! The media engine and the signaling transport stay outside: the engine is
//! consumed through [`MediaEngine`](engine::MediaEngine) and signaling
//! through a channel of [`SignalingMessage`](signaling::SignalingMessage).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rtcneg_negotiation_core::prelude::*;
//!
//! async fn publish(engine: Arc<dyn MediaEngine>) -> Result<()> {
//!     let (signaling, mut outbound) = SignalingSender::channel();
//!     let config = NegotiationConfig::new().with_limit_max_video_bw(1000);
//!     let mut controller = PeerConnectionController::new(config, engine, signaling)?;
//!
//!     let stream = MediaStream::new("camera")
//!         .with_track(MediaTrack::audio("mic"))
//!         .with_track(MediaTrack::video("cam"));
//!     controller.add_stream(stream, false).await;
//!     controller.create_offer(false).await;
//!
//!     if let Some(offer) = outbound.recv().await {
//!         println!("send to remote: {}", offer.to_json()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod queue;
pub mod sdp;
pub mod signaling;
pub mod simulcast;
pub mod state_machine;
pub mod types;

pub use adapter::{AdapterCall, Precondition, TransportAdapter, TAGGED_MID};
pub use config::{ConfigUpdate, IceServerConfig, NegotiationConfig, SimulcastConfig};
pub use controller::{DispatchOutcome, PeerConnectionController};
pub use engine::{EngineEvent, MediaEngine};
pub use error::{EngineError, EngineResult, NegotiationError, Result};
pub use queue::{UpdateCallback, UpdateOutcome};
pub use signaling::{CandidatePayload, SignalingMessage, SignalingSender};
pub use state_machine::{NegotiationState, NegotiationStateMachine, Trigger};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use crate::config::{ConfigUpdate, IceServerConfig, NegotiationConfig, SimulcastConfig};
    pub use crate::controller::{DispatchOutcome, PeerConnectionController};
    pub use crate::engine::{EngineEvent, MediaEngine};
    pub use crate::error::{EngineError, EngineResult, NegotiationError, Result};
    pub use crate::queue::{UpdateCallback, UpdateOutcome};
    pub use crate::signaling::{SignalingMessage, SignalingSender};
    pub use crate::state_machine::{NegotiationState, Trigger};
    pub use crate::types::{
        IceCandidate, MediaKind, MediaStream, MediaTrack, SessionDescription, StreamId,
    };
}
