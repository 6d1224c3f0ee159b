//! Error types for the negotiation core

use thiserror::Error;

/// Result type for negotiation operations
pub type Result<T> = std::result::Result<T, NegotiationError>;

/// Result type returned by [`MediaEngine`](crate::engine::MediaEngine) implementations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors reported by the media transport engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine rejected a session description
    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    /// The engine rejected an ICE candidate
    #[error("Invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    /// Referenced transceiver is unknown to the engine
    #[error("Unknown transceiver: {0}")]
    UnknownTransceiver(u64),

    /// The peer connection has already been closed
    #[error("Peer connection closed")]
    Closed,

    /// Any other engine failure
    #[error("Engine failure: {0}")]
    Other(String),
}

/// Errors that can occur in the negotiation core
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// Media engine error
    #[error("Transport engine error during {operation}: {source}")]
    Engine {
        operation: &'static str,
        #[source]
        source: EngineError,
    },

    /// Malformed signaling payload
    #[error("Malformed signaling payload: {message}")]
    MalformedPayload { message: String },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Signaling channel closed
    #[error("Signaling channel closed")]
    SignalingClosed,
}

impl NegotiationError {
    /// Wrap an engine error with the operation that produced it
    pub fn engine(operation: &'static str, source: EngineError) -> Self {
        Self::Engine { operation, source }
    }

    /// Create a malformed payload error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
