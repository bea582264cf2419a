//! Discovery Publisher.
//!
//! Turns discovery batches into Home Assistant MQTT discovery documents.
//! Device descriptors only register an identity. Channel descriptors are
//! classified by type and announced under their parent's identity.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::classify::{classify, unit_of_measurement, EntityKind};
use crate::config::{BridgeConfig, UNIQUE_ID_PREFIX};
use crate::error::{BridgeError, Result};
use crate::ports::{deliver, BusPublisher, Outgoing};
use crate::registry::{DeviceRegistry, DiscoveryIdentity};
use crate::topic::{self, ACTION, ATTRIBUTES, SET_LEVEL, STATE};
use crate::value::ChannelDescriptor;

const PRESS_SHORT: &str = "PRESS_SHORT";
const PRESS_LONG: &str = "PRESS_LONG";

/// MQTT discovery payload.
///
/// One struct covers every component; fields a component does not use stay
/// `None` and are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub device: Option<DiscoveryIdentity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_attributes_topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_close: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_open: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_stop: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_closed: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_open: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_position_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_position_topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_off: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_on: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_topic: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub trigger_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
}

/// A document together with the discovery topic it goes to.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub component: &'static str,
    pub node_id: String,
    pub object_id: String,
    pub document: DiscoveryDocument,
}

impl Announcement {
    pub fn topic(&self, discovery_prefix: &str) -> String {
        topic::discovery_topic(
            discovery_prefix,
            self.component,
            &self.node_id,
            &self.object_id,
        )
    }
}

/// Everything a channel descriptor contributes to discovery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelAnnouncements {
    pub announcements: Vec<Announcement>,
    /// Command topics to subscribe to.
    pub subscriptions: Vec<String>,
}

/// Publishes discovery documents for new channels.
pub struct DiscoveryPublisher {
    config: BridgeConfig,
    registry: Arc<DeviceRegistry>,
    bus: Arc<dyn BusPublisher>,
}

impl DiscoveryPublisher {
    pub fn new(
        config: BridgeConfig,
        registry: Arc<DeviceRegistry>,
        bus: Arc<dyn BusPublisher>,
    ) -> Self {
        Self {
            config,
            registry,
            bus,
        }
    }

    /// Process one discovery batch.
    ///
    /// Batches from a foreign session are ignored as a whole. A bad
    /// descriptor is logged and skipped without affecting the others.
    pub async fn handle_batch(&self, session_id: &str, descriptors: &[ChannelDescriptor]) {
        debug!("new_devices({}, {} descriptors)", session_id, descriptors.len());

        if !self.config.is_own_session(session_id) {
            error!("{}", BridgeError::UnknownSession(session_id.to_string()));
            return;
        }

        for descriptor in descriptors {
            match self.plan_descriptor(descriptor) {
                Ok(plan) => deliver(self.bus.as_ref(), plan).await,
                Err(e) if e.is_unknown_reference() => {
                    warn!("Skipping {}: {}", descriptor.address, e)
                }
                Err(e) => error!("Skipping {}: {}", descriptor.address, e),
            }
        }
    }

    /// Register `descriptor` and return the bus operations it requires.
    ///
    /// Nothing is stored when an error is returned.
    pub fn plan_descriptor(&self, descriptor: &ChannelDescriptor) -> Result<Vec<Outgoing>> {
        if descriptor.address.is_empty() || descriptor.channel_type.is_empty() {
            return Err(BridgeError::InvalidDescriptor(
                "ADDRESS and TYPE are required".to_string(),
            ));
        }

        let Some(parent) = descriptor.parent() else {
            self.registry
                .set_attributes(&descriptor.address, descriptor.snapshot());
            let identity = DiscoveryIdentity::from_descriptor(descriptor);
            debug!("New parent: {:?}", identity);
            self.registry.upsert_identity(&descriptor.address, identity);
            return Ok(Vec::new());
        };

        let identity = self
            .registry
            .identity(parent)
            .ok_or_else(|| BridgeError::MissingParent(parent.to_string()))?;
        let index = descriptor.index.ok_or_else(|| {
            BridgeError::InvalidDescriptor(format!("{} has no INDEX", descriptor.address))
        })?;

        self.registry
            .set_attributes(&descriptor.address, descriptor.snapshot());

        let channel = self.announce_channel(descriptor, parent, index, identity);
        if channel.announcements.is_empty() {
            warn!("Unhandled channel: {}", descriptor.channel_type);
        }

        let mut plan: Vec<Outgoing> = channel
            .subscriptions
            .into_iter()
            .map(Outgoing::subscribe)
            .collect();
        for announcement in &channel.announcements {
            let payload = serde_json::to_vec(&announcement.document)?;
            plan.push(Outgoing::retained(
                announcement.topic(&self.config.discovery_prefix),
                payload,
            ));
        }
        Ok(plan)
    }

    /// Build the documents of a channel whose parent is known.
    pub fn announce_channel(
        &self,
        descriptor: &ChannelDescriptor,
        parent: &str,
        index: u32,
        identity: DiscoveryIdentity,
    ) -> ChannelAnnouncements {
        let kind = classify(&descriptor.channel_type);
        let Some(component) = kind.component() else {
            return ChannelAnnouncements::default();
        };

        let parent_type = descriptor
            .parent_type
            .clone()
            .unwrap_or_else(|| identity.model.clone());
        let node_id = format!("{}_{}", parent_type, parent);
        let object_id = format!("{}-{}", index, descriptor.channel_type);
        let base = topic::channel_topic(parent, index);

        let announce = |object_id: String, document: DiscoveryDocument| Announcement {
            component,
            node_id: node_id.clone(),
            object_id,
            document,
        };

        if kind == EntityKind::DeviceTrigger {
            let trigger = |field: &str, trigger_type: &str| DiscoveryDocument {
                device: Some(identity.clone()),
                automation_type: Some("trigger".to_string()),
                subtype: Some(format!("button_{}", index)),
                topic: Some(topic::sub_topic(&base, field)),
                trigger_type: Some(trigger_type.to_string()),
                ..Default::default()
            };
            return ChannelAnnouncements {
                announcements: vec![
                    announce(
                        format!("{}-short", object_id),
                        trigger(PRESS_SHORT, "button_short_press"),
                    ),
                    announce(
                        format!("{}-long", object_id),
                        trigger(PRESS_LONG, "button_long_press"),
                    ),
                ],
                subscriptions: Vec::new(),
            };
        }

        let mut document = DiscoveryDocument {
            device: Some(identity),
            availability_topic: Some(topic::availability_topic(parent)),
            json_attributes_topic: Some(topic::sub_topic(&base, ATTRIBUTES)),
            name: Some(format!(
                "{} {} {}",
                parent_type, descriptor.channel_type, descriptor.address
            )),
            unique_id: Some(format!("{}-{}", UNIQUE_ID_PREFIX, descriptor.address)),
            ..Default::default()
        };
        let mut subscriptions = Vec::new();

        match kind {
            EntityKind::BinarySensor => {
                document.state_topic = Some(topic::sub_topic(&base, STATE));
            }
            EntityKind::Sensor => {
                document.state_topic = Some(topic::sub_topic(&base, STATE));
                document.unit_of_measurement =
                    unit_of_measurement(&descriptor.channel_type).map(str::to_string);
            }
            EntityKind::Cover => {
                let command_topic = topic::sub_topic(&base, ACTION);
                let set_position_topic = topic::sub_topic(&base, SET_LEVEL);
                let position_base =
                    topic::channel_topic(parent, self.config.cover_position_channel(index));

                document.command_topic = Some(command_topic.clone());
                document.device_class = Some("shutter".to_string());
                document.payload_close = Some("move_down".to_string());
                document.payload_open = Some("move_up".to_string());
                document.payload_stop = Some("stop".to_string());
                document.position_closed = Some(0);
                document.position_open = Some(100);
                document.position_topic = Some(topic::sub_topic(&position_base, STATE));
                document.set_position_template = Some("{{ position / 100 }}".to_string());
                document.set_position_topic = Some(set_position_topic.clone());
                subscriptions.push(command_topic);
                subscriptions.push(set_position_topic);
            }
            EntityKind::Switch => {
                let command_topic = topic::sub_topic(&base, ACTION);

                document.command_topic = Some(command_topic.clone());
                document.payload_off = Some("off".to_string());
                document.payload_on = Some("on".to_string());
                document.state_off = Some("OFF".to_string());
                document.state_on = Some("ON".to_string());
                document.state_topic = Some(topic::sub_topic(&base, STATE));
                subscriptions.push(command_topic);
            }
            EntityKind::DeviceTrigger | EntityKind::Unhandled => {}
        }

        ChannelAnnouncements {
            announcements: vec![announce(object_id, document)],
            subscriptions,
        }
    }
}
