//! Bridge configuration and fixed protocol constants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Namespace prefix of every bridge topic.
pub const MQTT_PREFIX: &str = "Homematic";

/// Default Home Assistant discovery prefix.
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Default XML-RPC interface id announced to the controller.
pub const DEFAULT_INTERFACE_ID: &str = "mqttbridge";

/// Name of the single remote controller.
pub const DEFAULT_REMOTE: &str = "default";

/// Manufacturer reported in every discovery identity.
pub const MANUFACTURER: &str = "eQ-3";

/// Prefix of every discovery `unique_id`.
pub const UNIQUE_ID_PREFIX: &str = "Homematic";

/// Runtime settings of the translation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Home Assistant discovery prefix.
    pub discovery_prefix: String,

    /// Interface id registered with the controller.
    pub interface_id: String,

    /// Remote name, the second half of the session id.
    pub remote: String,

    /// Cover command channel -> channel that reports the position.
    ///
    /// Some shutter actuators (HmIP-BROLL) accept commands on channel 4 but
    /// report their position on the transmitter channel 3.
    pub cover_position_channels: BTreeMap<u32, u32>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
            interface_id: DEFAULT_INTERFACE_ID.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            cover_position_channels: BTreeMap::from([(4, 3)]),
        }
    }
}

impl BridgeConfig {
    pub fn with_discovery_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.discovery_prefix = prefix.into();
        self
    }

    pub fn with_interface_id(mut self, interface_id: impl Into<String>) -> Self {
        self.interface_id = interface_id.into();
        self
    }

    /// Replace the cover position remap table.
    pub fn with_cover_position_channels(mut self, channels: BTreeMap<u32, u32>) -> Self {
        self.cover_position_channels = channels;
        self
    }

    /// Session id the controller tags every callback with.
    pub fn session_id(&self) -> String {
        format!("{}-{}", self.interface_id, self.remote)
    }

    pub fn is_own_session(&self, session_id: &str) -> bool {
        session_id == self.session_id()
    }

    /// Channel whose state topic carries the position of cover `index`.
    /// Unlisted channels report their own position.
    pub fn cover_position_channel(&self, index: u32) -> u32 {
        self.cover_position_channels
            .get(&index)
            .copied()
            .unwrap_or(index)
    }
}
