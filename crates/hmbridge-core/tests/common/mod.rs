//! Common test utilities for bridge tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use hmbridge_core::{
    BridgeConfig, BusPublisher, ChannelDescriptor, DeviceAction, DeviceCapability,
    DeviceConnection, DeviceInfo, DeviceRegistry, Outgoing, Result,
};

pub const SESSION: &str = "mqttbridge-default";

/// Bus that records every operation.
#[derive(Default)]
pub struct RecordingBus {
    ops: Mutex<Vec<Outgoing>>,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<Outgoing> {
        std::mem::take(&mut *self.ops.lock())
    }

    pub fn ops(&self) -> Vec<Outgoing> {
        self.ops.lock().clone()
    }

    pub fn publishes(&self) -> Vec<(String, String, bool)> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                Outgoing::Publish {
                    topic,
                    payload,
                    retain,
                } => Some((
                    topic.clone(),
                    String::from_utf8_lossy(payload).into_owned(),
                    *retain,
                )),
                Outgoing::Subscribe { .. } => None,
            })
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                Outgoing::Subscribe { topic } => Some(topic.clone()),
                Outgoing::Publish { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl BusPublisher for RecordingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.ops.lock().push(Outgoing::Publish {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.ops.lock().push(Outgoing::subscribe(topic));
        Ok(())
    }
}

/// Device connection with a fixed device table that records invocations.
#[derive(Default)]
pub struct ScriptedConnection {
    devices: Vec<DeviceInfo>,
    invoked: Mutex<Vec<(String, u32, DeviceAction)>>,
}

impl ScriptedConnection {
    pub fn new(devices: Vec<DeviceInfo>) -> Arc<Self> {
        Arc::new(Self {
            devices,
            invoked: Mutex::new(Vec::new()),
        })
    }

    pub fn invoked(&self) -> Vec<(String, u32, DeviceAction)> {
        self.invoked.lock().clone()
    }
}

#[async_trait]
impl DeviceConnection for ScriptedConnection {
    fn device(&self, address: &str) -> Option<DeviceInfo> {
        self.devices.iter().find(|d| d.address == address).cloned()
    }

    async fn invoke(&self, address: &str, channel: u32, action: DeviceAction) -> Result<()> {
        self.invoked
            .lock()
            .push((address.to_string(), channel, action));
        Ok(())
    }
}

/// A shutter actuator with its key, transmitter, receiver and maintenance
/// channels.
pub fn shutter_batch() -> Vec<ChannelDescriptor> {
    vec![
        ChannelDescriptor::device("0001D3C99C4A1F", "HmIP-BROLL").with_firmware("1.6.2"),
        ChannelDescriptor::channel("0001D3C99C4A1F", "HmIP-BROLL", 0, "MAINTENANCE"),
        ChannelDescriptor::channel("0001D3C99C4A1F", "HmIP-BROLL", 1, "KEY_TRANSCEIVER"),
        ChannelDescriptor::channel("0001D3C99C4A1F", "HmIP-BROLL", 3, "SHUTTER_TRANSMITTER"),
        ChannelDescriptor::channel("0001D3C99C4A1F", "HmIP-BROLL", 4, "SHUTTER_VIRTUAL_RECEIVER"),
        ChannelDescriptor::channel("0001D3C99C4A1F", "HmIP-BROLL", 7, "BLIND_WEEK_PROFILE"),
    ]
}

/// A switch actuator announcing its receiver channel.
pub fn switch_batch() -> Vec<ChannelDescriptor> {
    vec![
        ChannelDescriptor::device("00021BE9957B8D", "HmIP-BSM"),
        ChannelDescriptor::channel("00021BE9957B8D", "HmIP-BSM", 4, "SWITCH_VIRTUAL_RECEIVER"),
    ]
}

pub fn shutter_device() -> DeviceInfo {
    DeviceInfo::new("0001D3C99C4A1F", "HmIP-BROLL", DeviceCapability::Blind)
        .with_channel(0, "MAINTENANCE")
        .with_channel(1, "KEY_TRANSCEIVER")
        .with_channel(3, "SHUTTER_TRANSMITTER")
        .with_channel(4, "SHUTTER_VIRTUAL_RECEIVER")
}

pub fn switch_device() -> DeviceInfo {
    DeviceInfo::new("00021BE9957B8D", "HmIP-BSM", DeviceCapability::Switch)
        .with_channel(4, "SWITCH_VIRTUAL_RECEIVER")
}

pub fn bridge_parts() -> (BridgeConfig, Arc<DeviceRegistry>, Arc<RecordingBus>) {
    (
        BridgeConfig::default(),
        Arc::new(DeviceRegistry::new()),
        RecordingBus::new(),
    )
}
