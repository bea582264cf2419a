//! MQTT side of the bridge.
//!
//! Parses the broker URL, connects with rumqttc and exposes the connection
//! as a [`hmbridge_core::BusPublisher`] plus a stream of inbound messages.

pub mod client;
pub mod config;
pub mod error;

pub use client::{MqttBus, MqttSession, QOS};
pub use config::BrokerConfig;
pub use error::{MqttError, Result};
