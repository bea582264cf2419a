//! Command Router.
//!
//! Parses `Homematic/<device>/<channel>/<action>` messages, checks the
//! payload against what the target channel accepts and invokes the device
//! action. Nothing is ever published back.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::MQTT_PREFIX;
use crate::error::{BridgeError, Result};
use crate::ports::{BusMessage, DeviceAction, DeviceCapability, DeviceConnection};
use crate::topic::{ACTION, SET_LEVEL};

const COVER_CHANNEL_TYPES: &[&str] = &["SHUTTER_VIRTUAL_RECEIVER"];
const SWITCH_CHANNEL_TYPES: &[&str] = &["SWITCH_VIRTUAL_RECEIVER"];

/// A parsed command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTopic {
    pub address: String,
    pub channel: u32,
    pub action: String,
}

impl CommandTopic {
    pub fn parse(topic: &str) -> Result<Self> {
        let segments: Vec<&str> = topic.split('/').collect();
        let &[prefix, address, channel, action] = segments.as_slice() else {
            return Err(BridgeError::InvalidTopic(topic.to_string()));
        };

        let channel = channel
            .parse::<u32>()
            .map_err(|_| BridgeError::InvalidChannel(channel.to_string()))?;

        if prefix != MQTT_PREFIX {
            return Err(BridgeError::InvalidPrefix(prefix.to_string()));
        }

        Ok(Self {
            address: address.to_string(),
            channel,
            action: action.to_string(),
        })
    }
}

/// A validated device action.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCommand {
    pub address: String,
    pub channel: u32,
    pub action: DeviceAction,
}

/// Routes bus commands to the device connection.
pub struct CommandRouter {
    connection: Arc<dyn DeviceConnection>,
}

impl CommandRouter {
    pub fn new(connection: Arc<dyn DeviceConnection>) -> Self {
        Self { connection }
    }

    /// Handle one inbound message. Errors are logged, never returned.
    pub async fn route(&self, topic: &str, payload: &[u8]) {
        debug!("Command {}: {}", topic, String::from_utf8_lossy(payload));

        let command = match self.resolve(topic, payload) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) if e.is_malformed_input() => {
                error!("Dropping command on {}: {}", topic, e);
                return;
            }
            Err(e) => {
                warn!("Dropping command on {}: {}", topic, e);
                return;
            }
        };

        if let Err(e) = self
            .connection
            .invoke(&command.address, command.channel, command.action)
            .await
        {
            error!(
                "{} on {}:{} failed: {}",
                command.action.name(),
                command.address,
                command.channel,
                e
            );
        }
    }

    /// Validate a message into a device command.
    ///
    /// `Ok(None)` means the message does not address a command this bridge
    /// handles and is ignored without logging an error.
    pub fn resolve(&self, topic: &str, payload: &[u8]) -> Result<Option<DeviceCommand>> {
        let target = CommandTopic::parse(topic)?;
        let payload = std::str::from_utf8(payload)
            .map_err(|e| BridgeError::InvalidPayload(e.to_string()))?;

        let device = self
            .connection
            .device(&target.address)
            .ok_or_else(|| BridgeError::UnknownDevice(target.address.clone()))?;
        let channel_type = device.channel_type(target.channel).ok_or_else(|| {
            BridgeError::UnknownAddress(format!("{}:{}", target.address, target.channel))
        })?;

        let action = match (device.capability, target.action.as_str()) {
            (DeviceCapability::Blind, ACTION) if COVER_CHANNEL_TYPES.contains(&channel_type) => {
                match payload {
                    "move_up" => DeviceAction::MoveUp,
                    "move_down" => DeviceAction::MoveDown,
                    "stop" => DeviceAction::Stop,
                    other => return Err(BridgeError::InvalidAction(other.to_string())),
                }
            }
            (DeviceCapability::Blind, SET_LEVEL)
                if COVER_CHANNEL_TYPES.contains(&channel_type) =>
            {
                DeviceAction::SetLevel(parse_level(payload)?)
            }
            (DeviceCapability::Switch, ACTION) if SWITCH_CHANNEL_TYPES.contains(&channel_type) => {
                match payload {
                    "on" => DeviceAction::On,
                    "off" => DeviceAction::Off,
                    other => return Err(BridgeError::InvalidAction(other.to_string())),
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(DeviceCommand {
            address: target.address,
            channel: target.channel,
            action,
        }))
    }

    /// Route messages until the inbound stream closes.
    pub async fn run(&self, messages: &mut mpsc::Receiver<BusMessage>) {
        while let Some(message) = messages.recv().await {
            self.route(&message.topic, &message.payload).await;
        }
        info!("Command stream closed");
    }
}

/// Level fraction in `[0, 1]`.
fn parse_level(payload: &str) -> Result<f64> {
    let level: f64 = payload
        .trim()
        .parse()
        .map_err(|_| BridgeError::InvalidLevel(payload.to_string()))?;
    if !(0.0..=1.0).contains(&level) {
        return Err(BridgeError::InvalidLevel(payload.to_string()));
    }
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::DeviceInfo;
    use async_trait::async_trait;

    struct Table(Vec<DeviceInfo>);

    #[async_trait]
    impl DeviceConnection for Table {
        fn device(&self, address: &str) -> Option<DeviceInfo> {
            self.0.iter().find(|d| d.address == address).cloned()
        }

        async fn invoke(&self, _address: &str, _channel: u32, _action: DeviceAction) -> Result<()> {
            Ok(())
        }
    }

    fn router() -> CommandRouter {
        CommandRouter::new(Arc::new(Table(vec![
            DeviceInfo::new("ABC", "HmIP-BROLL", DeviceCapability::Blind)
                .with_channel(3, "SHUTTER_TRANSMITTER")
                .with_channel(4, "SHUTTER_VIRTUAL_RECEIVER"),
            DeviceInfo::new("DEF", "HmIP-BSM", DeviceCapability::Switch)
                .with_channel(4, "SWITCH_VIRTUAL_RECEIVER"),
        ])))
    }

    #[test]
    fn test_parse_topic() {
        let topic = CommandTopic::parse("Homematic/ABC/4/action").unwrap();
        assert_eq!(topic.address, "ABC");
        assert_eq!(topic.channel, 4);
        assert_eq!(topic.action, "action");

        assert!(matches!(
            CommandTopic::parse("Homematic/ABC/4"),
            Err(BridgeError::InvalidTopic(_))
        ));
        assert!(matches!(
            CommandTopic::parse("Homematic/ABC/4/action/extra"),
            Err(BridgeError::InvalidTopic(_))
        ));
        assert!(matches!(
            CommandTopic::parse("Homematic/ABC/four/action"),
            Err(BridgeError::InvalidChannel(_))
        ));
        assert!(matches!(
            CommandTopic::parse("Other/ABC/4/action"),
            Err(BridgeError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_cover_actions() {
        let router = router();
        let command = router
            .resolve("Homematic/ABC/4/action", b"move_up")
            .unwrap()
            .unwrap();
        assert_eq!(command.action, DeviceAction::MoveUp);
        assert_eq!(command.channel, 4);

        assert!(matches!(
            router.resolve("Homematic/ABC/4/action", b"sideways"),
            Err(BridgeError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_set_level_bounds() {
        let router = router();
        let command = router
            .resolve("Homematic/ABC/4/set_level", b"0.42")
            .unwrap()
            .unwrap();
        assert_eq!(command.action, DeviceAction::SetLevel(0.42));

        let command = router
            .resolve("Homematic/ABC/4/set_level", b"1")
            .unwrap()
            .unwrap();
        assert_eq!(command.action, DeviceAction::SetLevel(1.0));

        let rejected: [&[u8]; 4] = [b"1.5", b"-0.1", b"half", b"NaN"];
        for payload in rejected {
            assert!(matches!(
                router.resolve("Homematic/ABC/4/set_level", payload),
                Err(BridgeError::InvalidLevel(_))
            ));
        }
    }

    #[test]
    fn test_switch_actions() {
        let router = router();
        let command = router
            .resolve("Homematic/DEF/4/action", b"off")
            .unwrap()
            .unwrap();
        assert_eq!(command.action, DeviceAction::Off);

        assert!(router.resolve("Homematic/DEF/4/action", b"toggle").is_err());
        assert_eq!(
            router.resolve("Homematic/DEF/4/set_level", b"0.5").unwrap(),
            None
        );
    }

    #[test]
    fn test_unsupported_combinations_are_ignored() {
        let router = router();
        assert_eq!(
            router.resolve("Homematic/ABC/3/action", b"move_up").unwrap(),
            None
        );
        assert_eq!(
            router.resolve("Homematic/ABC/4/state", b"move_up").unwrap(),
            None
        );
    }

    #[test]
    fn test_unknown_references() {
        let router = router();
        assert!(matches!(
            router.resolve("Homematic/XYZ/4/action", b"move_up"),
            Err(BridgeError::UnknownDevice(_))
        ));
        assert!(matches!(
            router.resolve("Homematic/ABC/9/action", b"move_up"),
            Err(BridgeError::UnknownAddress(_))
        ));
        assert!(matches!(
            router.resolve("Homematic/ABC/4/action", &[0xff, 0xfe]),
            Err(BridgeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_rejections_are_categorized() {
        let router = router();
        let unknown = router
            .resolve("Homematic/XYZ/4/action", b"move_up")
            .unwrap_err();
        assert!(unknown.is_unknown_reference());
        assert!(!unknown.is_malformed_input());

        let prefix = router.resolve("Other/ABC/4/action", b"move_up").unwrap_err();
        assert!(prefix.is_unknown_reference());

        let level = router
            .resolve("Homematic/ABC/4/set_level", b"1.5")
            .unwrap_err();
        assert!(level.is_malformed_input());
        assert!(!level.is_unknown_reference());
    }
}
