//! Collaborator traits.
//!
//! The engine never talks to MQTT or the controller directly. The bus client
//! implements [`BusPublisher`], the controller connection implements
//! [`DeviceConnection`] and feeds [`DeviceNotification`]s to anything that
//! implements [`DeviceCallbacks`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::Result;
use crate::value::{AttrValue, ChannelDescriptor};

/// Publish side of the message bus.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;

    /// Subscribe to `topic` for inbound commands.
    async fn subscribe(&self, topic: &str) -> Result<()>;
}

/// Inbound bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// One planned bus operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Publish {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Subscribe {
        topic: String,
    },
}

impl Outgoing {
    pub fn retained(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::Publish {
            topic: topic.into(),
            payload: payload.into(),
            retain: true,
        }
    }

    pub fn transient(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::Publish {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Self::Publish { topic, .. } | Self::Subscribe { topic } => topic,
        }
    }
}

/// Hand a plan to the bus in order. Failures are logged and do not stop the
/// remaining operations.
pub async fn deliver<B: BusPublisher + ?Sized>(bus: &B, plan: Vec<Outgoing>) {
    for op in plan {
        let result = match &op {
            Outgoing::Publish {
                topic,
                payload,
                retain,
            } => {
                debug!(
                    "Publishing {}: {}",
                    topic,
                    String::from_utf8_lossy(payload)
                );
                bus.publish(topic, payload.clone(), *retain).await
            }
            Outgoing::Subscribe { topic } => {
                debug!("Subscribing to {}", topic);
                bus.subscribe(topic).await
            }
        };

        if let Err(e) = result {
            error!("Bus operation on {} failed: {}", op.topic(), e);
        }
    }
}

/// What a device accepts from the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCapability {
    Blind,
    Switch,
    Other,
}

/// Command sent to a device channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceAction {
    MoveUp,
    MoveDown,
    Stop,
    /// Target level as a fraction in `[0, 1]`.
    SetLevel(f64),
    On,
    Off,
}

impl DeviceAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MoveUp => "move_up",
            Self::MoveDown => "move_down",
            Self::Stop => "stop",
            Self::SetLevel(_) => "set_level",
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Device as known to the controller connection.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub address: String,
    pub device_type: String,
    pub capability: DeviceCapability,
    /// Channel index -> channel type tag.
    pub channels: BTreeMap<u32, String>,
}

impl DeviceInfo {
    pub fn new(
        address: impl Into<String>,
        device_type: impl Into<String>,
        capability: DeviceCapability,
    ) -> Self {
        Self {
            address: address.into(),
            device_type: device_type.into(),
            capability,
            channels: BTreeMap::new(),
        }
    }

    pub fn with_channel(mut self, index: u32, channel_type: impl Into<String>) -> Self {
        self.channels.insert(index, channel_type.into());
        self
    }

    pub fn channel_type(&self, index: u32) -> Option<&str> {
        self.channels.get(&index).map(String::as_str)
    }
}

/// Device table and action sink of the controller connection.
#[async_trait]
pub trait DeviceConnection: Send + Sync {
    fn device(&self, address: &str) -> Option<DeviceInfo>;

    async fn invoke(&self, address: &str, channel: u32, action: DeviceAction) -> Result<()>;
}

/// Receiver of controller callbacks.
#[async_trait]
pub trait DeviceCallbacks: Send + Sync {
    async fn on_discovery(&self, session_id: &str, descriptors: Vec<ChannelDescriptor>);

    async fn on_event(&self, session_id: &str, address: &str, field: &str, value: AttrValue);
}

/// Controller callback queued for the consumer task.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceNotification {
    Event {
        interface_id: String,
        address: String,
        key: String,
        value: AttrValue,
    },
    NewDevices {
        interface_id: String,
        descriptors: Vec<ChannelDescriptor>,
    },
}

/// Deliver queued notifications one at a time until the sender side closes.
pub async fn dispatch_notifications<C: DeviceCallbacks + ?Sized>(
    callbacks: &C,
    mut notifications: mpsc::Receiver<DeviceNotification>,
) {
    while let Some(notification) = notifications.recv().await {
        match notification {
            DeviceNotification::Event {
                interface_id,
                address,
                key,
                value,
            } => callbacks.on_event(&interface_id, &address, &key, value).await,
            DeviceNotification::NewDevices {
                interface_id,
                descriptors,
            } => callbacks.on_discovery(&interface_id, descriptors).await,
        }
    }
    debug!("Notification channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FlakyBus {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BusPublisher for FlakyBus {
        async fn publish(&self, topic: &str, _payload: Vec<u8>, _retain: bool) -> Result<()> {
            self.seen.lock().push(topic.to_string());
            if topic == "fail" {
                return Err(BridgeError::Bus("rejected".into()));
            }
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<()> {
            self.seen.lock().push(format!("sub:{}", topic));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_deliver_continues_after_failure() {
        let bus = FlakyBus::default();
        deliver(
            &bus,
            vec![
                Outgoing::retained("a", "1"),
                Outgoing::retained("fail", "2"),
                Outgoing::subscribe("b"),
            ],
        )
        .await;
        assert_eq!(*bus.seen.lock(), vec!["a", "fail", "sub:b"]);
    }

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeviceCallbacks for Collect {
        async fn on_discovery(&self, session_id: &str, descriptors: Vec<ChannelDescriptor>) {
            self.seen
                .lock()
                .push(format!("{} new {}", session_id, descriptors.len()));
        }

        async fn on_event(&self, session_id: &str, address: &str, field: &str, value: AttrValue) {
            self.seen
                .lock()
                .push(format!("{} {} {}={}", session_id, address, field, value));
        }
    }

    #[tokio::test]
    async fn test_dispatch_preserves_order() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(DeviceNotification::NewDevices {
            interface_id: "s".into(),
            descriptors: vec![ChannelDescriptor::device("ABC", "HmIP-BSM")],
        })
        .await
        .unwrap();
        tx.send(DeviceNotification::Event {
            interface_id: "s".into(),
            address: "ABC:3".into(),
            key: "STATE".into(),
            value: AttrValue::Bool(true),
        })
        .await
        .unwrap();
        drop(tx);

        let callbacks = Collect::default();
        dispatch_notifications(&callbacks, rx).await;
        assert_eq!(*callbacks.seen.lock(), vec!["s new 1", "s ABC:3 STATE=true"]);
    }

    #[test]
    fn test_action_names() {
        assert_eq!(DeviceAction::SetLevel(0.4).name(), "set_level");
        assert_eq!(DeviceAction::MoveDown.name(), "move_down");
    }
}
