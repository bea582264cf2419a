//! Homematic to MQTT translation engine.
//!
//! This crate holds the stateful part of the bridge. It keeps a registry of
//! discovered devices, announces them to Home Assistant through MQTT
//! discovery, republishes channel state as controller events arrive and turns
//! inbound MQTT commands into device actions.
//!
//! ## Architecture
//!
//! - **DeviceRegistry**: attribute snapshots per channel and discovery identities per device
//! - **DiscoveryPublisher**: classifies discovered channels and publishes discovery documents
//! - **EventTranslator**: diffs attribute changes and publishes decoded state
//! - **CommandRouter**: validates MQTT commands and invokes device actions
//! - **Bridge**: wires publisher and translator to the device callbacks
//!
//! The controller connection and the MQTT client live in other crates and are
//! reached only through the traits in [`ports`].

pub mod bridge;
pub mod classify;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ports;
pub mod registry;
pub mod router;
pub mod topic;
pub mod translator;
pub mod value;

pub use bridge::Bridge;
pub use classify::{classify, EntityKind};
pub use config::BridgeConfig;
pub use discovery::{Announcement, DiscoveryDocument, DiscoveryPublisher};
pub use error::{BridgeError, Result};
pub use ports::{
    deliver, dispatch_notifications, BusMessage, BusPublisher, DeviceAction, DeviceCallbacks,
    DeviceCapability, DeviceConnection, DeviceInfo, DeviceNotification, Outgoing,
};
pub use registry::{DeviceRegistry, DiscoveryIdentity};
pub use router::{CommandRouter, CommandTopic, DeviceCommand};
pub use translator::EventTranslator;
pub use value::{AttrValue, AttributeSnapshot, ChannelDescriptor};
