//! Simulcast send encodings
//!
//! Layer `rid`s are the 1-based spatial layer indices. Layer `i` of `n` is
//! scaled down by `base^(n - i)`, so the highest index carries full
//! resolution.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{SimulcastConfig, SpatialLayerConfig};
use crate::types::EncodingParameters;

/// Send encodings for a new video transceiver
pub fn encoding_parameters(config: &SimulcastConfig, is_screenshare: bool) -> Vec<EncodingParameters> {
    let layers = config.num_spatial_layers;
    let base = if is_screenshare {
        config.scale_resolution_down_base_screenshare
    } else {
        config.scale_resolution_down_base
    };

    (1..=layers)
        .map(|layer| {
            let rid = layer.to_string();
            let layer_config = config.spatial_layer_configs.get(&rid);
            EncodingParameters {
                scale_resolution_down_by: base.powi((layers - layer) as i32),
                active: layer_config.and_then(|c| c.active),
                max_bitrate: layer_config.and_then(|c| c.max_bitrate),
                rid,
            }
        })
        .collect()
}

impl SimulcastConfig {
    fn layer_mut(&mut self, rid: &str) -> &mut SpatialLayerConfig {
        self.spatial_layer_configs.entry(rid.to_string()).or_default()
    }

    /// Set per-layer max bitrates, keyed by rid
    pub fn set_layer_bitrates(&mut self, bitrates: &BTreeMap<String, u64>) {
        for (rid, bitrate) in bitrates {
            debug!("Simulcast layer {} max bitrate {}", rid, bitrate);
            self.layer_mut(rid).max_bitrate = Some(*bitrate);
        }
    }

    /// Set per-layer active flags, keyed by rid
    pub fn set_active_layers(&mut self, layers: &BTreeMap<String, bool>) {
        for (rid, active) in layers {
            debug!("Simulcast layer {} active {}", rid, active);
            self.layer_mut(rid).active = Some(*active);
        }
    }
}
