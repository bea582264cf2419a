//! Configuration file and command-line merging.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file, flags.

use hmbridge_core::config::{DEFAULT_DISCOVERY_PREFIX, DEFAULT_INTERFACE_ID};
use hmbridge_core::BridgeConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/hm-mqtt-bridge/config.json";
pub const DEFAULT_BROKER: &str = "mqtt://localhost";
pub const DEFAULT_LISTEN: &str = "xmlrpc://0.0.0.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Missing required parameter: connect")]
    MissingConnect,
}

/// Effective settings of one run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// MQTT broker URL.
    pub broker: String,
    /// Where the CCU calls back.
    pub listen: String,
    /// XML-RPC endpoint of the CCU.
    pub connect: Option<String>,
    pub debug: bool,
    pub discovery_prefix: String,
    pub interface_id: String,
    pub cover_position_channels: BTreeMap<u32, u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            listen: DEFAULT_LISTEN.to_string(),
            connect: None,
            debug: false,
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
            interface_id: DEFAULT_INTERFACE_ID.to_string(),
            cover_position_channels: BridgeConfig::default().cover_position_channels,
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub broker: Option<String>,
    pub listen: Option<String>,
    pub connect: Option<String>,
    pub debug: bool,
    pub discovery_prefix: Option<String>,
}

impl Settings {
    /// Load defaults merged with the config file.
    ///
    /// Without an explicit path a missing default file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(broker) = overrides.broker {
            self.broker = broker;
        }
        if let Some(listen) = overrides.listen {
            self.listen = listen;
        }
        if let Some(connect) = overrides.connect {
            self.connect = Some(connect);
        }
        if overrides.debug {
            self.debug = true;
        }
        if let Some(prefix) = overrides.discovery_prefix {
            self.discovery_prefix = prefix;
        }
        self
    }

    pub fn connect_url(&self) -> Result<&str, ConfigError> {
        self.connect
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(ConfigError::MissingConnect)
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::default()
            .with_discovery_prefix(self.discovery_prefix.clone())
            .with_interface_id(self.interface_id.clone())
            .with_cover_position_channels(self.cover_position_channels.clone())
    }
}
