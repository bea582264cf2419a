//! Device table built from discovery batches.

use dashmap::DashMap;
use hmbridge_core::{ChannelDescriptor, DeviceCapability, DeviceInfo};
use tracing::debug;

/// Device type prefixes of blind actuators.
const BLIND_TYPES: &[&str] = &[
    "HmIP-BROLL",
    "HmIP-FROLL",
    "HmIP-BBL",
    "HmIP-DRBLI4",
    "HM-LC-Bl1",
    "HM-LC-Ja1",
];

/// Device type prefixes of switch actuators.
const SWITCH_TYPES: &[&str] = &[
    "HmIP-BSM",
    "HmIP-PS",
    "HmIP-FSM",
    "HmIP-DRSI",
    "HM-LC-Sw",
    "HM-ES-PMSw",
];

fn has_prefix(device_type: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| device_type.starts_with(p))
}

pub fn capability_for(device_type: &str) -> DeviceCapability {
    if has_prefix(device_type, BLIND_TYPES) {
        DeviceCapability::Blind
    } else if has_prefix(device_type, SWITCH_TYPES) {
        DeviceCapability::Switch
    } else {
        DeviceCapability::Other
    }
}

/// Devices of one controller session, keyed by device address.
#[derive(Default)]
pub struct DeviceTable {
    devices: DashMap<String, DeviceInfo>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the devices and channels of a discovery batch.
    pub fn apply(&self, descriptors: &[ChannelDescriptor]) {
        for descriptor in descriptors {
            match (descriptor.parent(), descriptor.index) {
                (None, _) => {
                    let capability = capability_for(&descriptor.channel_type);
                    self.devices
                        .entry(descriptor.address.clone())
                        .and_modify(|device| {
                            device.device_type = descriptor.channel_type.clone();
                            device.capability = capability;
                        })
                        .or_insert_with(|| {
                            DeviceInfo::new(
                                descriptor.address.clone(),
                                descriptor.channel_type.clone(),
                                capability,
                            )
                        });
                }
                (Some(parent), Some(index)) => match self.devices.get_mut(parent) {
                    Some(mut device) => {
                        device
                            .channels
                            .insert(index, descriptor.channel_type.clone());
                    }
                    None => debug!("Channel {} has no known device", descriptor.address),
                },
                (Some(_), None) => debug!("Channel {} has no index", descriptor.address),
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<DeviceInfo> {
        self.devices.get(address).map(|device| device.clone())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert_eq!(capability_for("HmIP-BROLL"), DeviceCapability::Blind);
        assert_eq!(capability_for("HmIP-BROLL-2"), DeviceCapability::Blind);
        assert_eq!(capability_for("HM-LC-Sw1-FM"), DeviceCapability::Switch);
        assert_eq!(capability_for("HmIP-BSM"), DeviceCapability::Switch);
        assert_eq!(capability_for("HmIP-SRH"), DeviceCapability::Other);
    }

    #[test]
    fn test_table_from_batch() {
        let table = DeviceTable::new();
        table.apply(&[
            ChannelDescriptor::device("ABC", "HmIP-BROLL"),
            ChannelDescriptor::channel("ABC", "HmIP-BROLL", 3, "SHUTTER_TRANSMITTER"),
            ChannelDescriptor::channel("ABC", "HmIP-BROLL", 4, "SHUTTER_VIRTUAL_RECEIVER"),
            ChannelDescriptor::channel("XYZ", "HmIP-BSM", 4, "SWITCH_VIRTUAL_RECEIVER"),
        ]);

        assert_eq!(table.len(), 1);
        let device = table.get("ABC").unwrap();
        assert_eq!(device.capability, DeviceCapability::Blind);
        assert_eq!(device.channel_type(4), Some("SHUTTER_VIRTUAL_RECEIVER"));
        assert!(table.get("XYZ").is_none());
    }

    #[test]
    fn test_replayed_device_keeps_channels() {
        let table = DeviceTable::new();
        table.apply(&[
            ChannelDescriptor::device("ABC", "HmIP-BSM"),
            ChannelDescriptor::channel("ABC", "HmIP-BSM", 4, "SWITCH_VIRTUAL_RECEIVER"),
        ]);
        table.apply(&[ChannelDescriptor::device("ABC", "HmIP-BSM")]);

        assert_eq!(table.get("ABC").unwrap().channels.len(), 1);
    }
}
