//! Connection configuration
//!
//! [`NegotiationConfig`] holds the desired state of a peer connection: which
//! media kinds are enabled, the bandwidth caps and the hard limits they are
//! clamped to, simulcast settings and the ICE setup handed to the engine.
//! [`ConfigUpdate`] is the partial update an application submits through
//! `update_configuration`; it doubles as the `updatestream` wire payload.
//!
//! # Usage Examples
//!
//! ```rust
//! use rtcneg_negotiation_core::config::{NegotiationConfig, IceServerConfig};
//!
//! let config = NegotiationConfig::new()
//!     .with_limit_max_video_bw(1000)
//!     .with_max_video_bw(500)
//!     .with_ice_server(IceServerConfig::new("stun:stun.example.org:3478"))
//!     .with_force_turn(true);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.clamp_video_bw(5000), 1000);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{NegotiationError, Result};
use crate::state_machine::history::HISTORY_SIZE_LIMIT;

/// Number of spatial layers used when simulcast does not specify one
pub const DEFAULT_SIMULCAST_SPATIAL_LAYERS: u32 = 3;

/// Resolution scale base for camera video layers
pub const SCALE_RESOLUTION_DOWN_BASE: f64 = 2.0;

/// Resolution scale base for screenshare layers (all layers at full resolution)
pub const SCALE_RESOLUTION_DOWN_BASE_SCREENSHARE: f64 = 1.0;

/// Default hard ceiling for video bandwidth, in kbps
pub const DEFAULT_LIMIT_MAX_VIDEO_BW: u32 = 300;

/// Default hard ceiling for audio bandwidth, in kbps
pub const DEFAULT_LIMIT_MAX_AUDIO_BW: u32 = 64;

/// An ICE server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Attach TURN credentials
    pub fn with_credentials(mut self, username: impl Into<String>, credential: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

/// Which candidates the engine may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    All,
    Relay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundlePolicy {
    Balanced,
    MaxCompat,
    MaxBundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SdpSemantics {
    UnifiedPlan,
    PlanB,
}

/// Configuration an engine implementation should create its peer connection with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConnectionConfig {
    pub ice_servers: Vec<IceServerConfig>,
    pub ice_transport_policy: IceTransportPolicy,
    pub bundle_policy: BundlePolicy,
    pub sdp_semantics: SdpSemantics,
}

/// Per spatial layer settings, keyed by rid in [`SimulcastConfig`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialLayerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u64>,
}

/// Simulcast settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulcastConfig {
    pub num_spatial_layers: u32,
    pub scale_resolution_down_base: f64,
    pub scale_resolution_down_base_screenshare: f64,
    pub spatial_layer_configs: BTreeMap<String, SpatialLayerConfig>,
}

impl Default for SimulcastConfig {
    fn default() -> Self {
        Self {
            num_spatial_layers: DEFAULT_SIMULCAST_SPATIAL_LAYERS,
            scale_resolution_down_base: SCALE_RESOLUTION_DOWN_BASE,
            scale_resolution_down_base_screenshare: SCALE_RESOLUTION_DOWN_BASE_SCREENSHARE,
            spatial_layer_configs: BTreeMap::new(),
        }
    }
}

impl SimulcastConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spatial_layers(mut self, layers: u32) -> Self {
        self.num_spatial_layers = layers;
        self
    }

    pub fn with_screenshare_base(mut self, base: f64) -> Self {
        self.scale_resolution_down_base_screenshare = base;
        self
    }
}

/// Desired state of the peer connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NegotiationConfig {
    pub audio: bool,
    pub video: bool,
    #[serde(rename = "maxVideoBW")]
    pub max_video_bw: Option<u32>,
    #[serde(rename = "maxAudioBW")]
    pub max_audio_bw: Option<u32>,
    #[serde(rename = "limitMaxVideoBW")]
    pub limit_max_video_bw: u32,
    #[serde(rename = "limitMaxAudioBW")]
    pub limit_max_audio_bw: u32,
    /// Peer-to-peer sessions carry video bandwidth in the SDP instead of `updatestream`
    pub p2p: bool,
    pub simulcast: Option<SimulcastConfig>,
    pub ice_servers: Vec<IceServerConfig>,
    pub force_turn: bool,
    /// Ignore engine "negotiation needed" notifications
    pub managed: bool,
    pub history_limit: usize,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            max_video_bw: None,
            max_audio_bw: None,
            limit_max_video_bw: DEFAULT_LIMIT_MAX_VIDEO_BW,
            limit_max_audio_bw: DEFAULT_LIMIT_MAX_AUDIO_BW,
            p2p: false,
            simulcast: None,
            ice_servers: Vec::new(),
            force_turn: false,
            managed: false,
            history_limit: HISTORY_SIZE_LIMIT,
        }
    }
}

impl NegotiationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio = enabled;
        self
    }

    pub fn with_video(mut self, enabled: bool) -> Self {
        self.video = enabled;
        self
    }

    pub fn with_max_video_bw(mut self, kbps: u32) -> Self {
        self.max_video_bw = Some(kbps);
        self
    }

    pub fn with_max_audio_bw(mut self, kbps: u32) -> Self {
        self.max_audio_bw = Some(kbps);
        self
    }

    pub fn with_limit_max_video_bw(mut self, kbps: u32) -> Self {
        self.limit_max_video_bw = kbps;
        self
    }

    pub fn with_limit_max_audio_bw(mut self, kbps: u32) -> Self {
        self.limit_max_audio_bw = kbps;
        self
    }

    pub fn with_p2p(mut self, p2p: bool) -> Self {
        self.p2p = p2p;
        self
    }

    pub fn with_simulcast(mut self, simulcast: SimulcastConfig) -> Self {
        self.simulcast = Some(simulcast);
        self
    }

    pub fn with_ice_server(mut self, server: IceServerConfig) -> Self {
        self.ice_servers.push(server);
        self
    }

    pub fn with_force_turn(mut self, force_turn: bool) -> Self {
        self.force_turn = force_turn;
        self
    }

    pub fn with_managed(mut self, managed: bool) -> Self {
        self.managed = managed;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Parse a configuration from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for inconsistent values
    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 || self.history_limit > HISTORY_SIZE_LIMIT {
            return Err(NegotiationError::config(format!(
                "history_limit must be between 1 and {}, got {}",
                HISTORY_SIZE_LIMIT, self.history_limit
            )));
        }
        if let Some(simulcast) = &self.simulcast {
            if simulcast.num_spatial_layers == 0 {
                return Err(NegotiationError::config("simulcast requires at least one spatial layer"));
            }
            if simulcast.scale_resolution_down_base < 1.0
                || simulcast.scale_resolution_down_base_screenshare < 1.0
            {
                return Err(NegotiationError::config("simulcast scale bases must be >= 1"));
            }
        }
        for server in &self.ice_servers {
            if server.urls.is_empty() {
                return Err(NegotiationError::config("ICE server entry without urls"));
            }
        }
        Ok(())
    }

    /// Clamp a requested video bandwidth to the hard ceiling
    pub fn clamp_video_bw(&self, requested: u32) -> u32 {
        requested.min(self.limit_max_video_bw)
    }

    /// Clamp a requested audio bandwidth to the hard ceiling
    pub fn clamp_audio_bw(&self, requested: u32) -> u32 {
        requested.min(self.limit_max_audio_bw)
    }

    /// Engine configuration derived from this connection configuration
    pub fn peer_connection_config(&self) -> PeerConnectionConfig {
        PeerConnectionConfig {
            ice_servers: self.ice_servers.clone(),
            ice_transport_policy: if self.force_turn {
                IceTransportPolicy::Relay
            } else {
                IceTransportPolicy::All
            },
            bundle_policy: BundlePolicy::MaxBundle,
            sdp_semantics: SdpSemantics::UnifiedPlan,
        }
    }
}

/// Mute flags carried by `updatestream`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteStream {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<bool>,
}

/// Forced quality layer selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_layer: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_layer: Option<u32>,
}

/// A partial configuration change requested by the application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(rename = "maxVideoBW", default, skip_serializing_if = "Option::is_none")]
    pub max_video_bw: Option<u32>,
    #[serde(rename = "maxAudioBW", default, skip_serializing_if = "Option::is_none")]
    pub max_audio_bw: Option<u32>,
    #[serde(rename = "minVideoBW", default, skip_serializing_if = "Option::is_none")]
    pub min_video_bw: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_show_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute_stream: Option<MuteStream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_layer: Option<QualityLayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_show_below_layer: Option<bool>,
    /// Video constraints, forwarded untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_level: Option<u32>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_video_bw(mut self, kbps: u32) -> Self {
        self.max_video_bw = Some(kbps);
        self
    }

    pub fn with_max_audio_bw(mut self, kbps: u32) -> Self {
        self.max_audio_bw = Some(kbps);
        self
    }

    pub fn with_min_video_bw(mut self, kbps: u32) -> Self {
        self.min_video_bw = Some(kbps);
        self
    }

    pub fn with_slide_show_mode(mut self, enabled: bool) -> Self {
        self.slide_show_mode = Some(enabled);
        self
    }

    pub fn with_mute_stream(mut self, mute: MuteStream) -> Self {
        self.mute_stream = Some(mute);
        self
    }

    pub fn with_quality_layer(mut self, layer: QualityLayer) -> Self {
        self.quality_layer = Some(layer);
        self
    }

    pub fn with_priority_level(mut self, level: u32) -> Self {
        self.priority_level = Some(level);
        self
    }

    /// Requested video bandwidth; zero counts as unset
    pub fn requested_video_bw(&self) -> Option<u32> {
        self.max_video_bw.filter(|bw| *bw > 0)
    }

    /// Requested audio bandwidth; zero counts as unset
    pub fn requested_audio_bw(&self) -> Option<u32> {
        self.max_audio_bw.filter(|bw| *bw > 0)
    }

    /// Whether any field other than the bandwidth caps is present
    pub fn has_stream_options(&self) -> bool {
        self.min_video_bw.filter(|bw| *bw > 0).is_some()
            || self.slide_show_mode.is_some()
            || self.mute_stream.is_some()
            || self.quality_layer.is_some()
            || self.slide_show_below_layer.is_some()
            || self.video.is_some()
            || self.priority_level.is_some()
    }
}
