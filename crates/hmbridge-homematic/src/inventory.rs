//! Anonymized device inventory.
//!
//! Prints the discovery batches and events of a CCU with every device
//! address replaced by a sequential serial, so the output can be shared as
//! sample data. Devices of already known types are left out.

use async_trait::async_trait;
use hmbridge_core::{AttrValue, ChannelDescriptor, DeviceCallbacks};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use tracing::error;

/// Interface id the inventory registers with.
pub const INVENTORY_INTERFACE_ID: &str = "inventory";

/// Device types that already have sample data.
pub const KNOWN_DEVICES: &[&str] = &["HmIP-BROLL", "HmIP-RCV-50", "HmIP-SRH", "HmIP-SWSD"];

struct InventoryState<W> {
    aliases: HashMap<String, String>,
    skipped: HashSet<String>,
    serial: u64,
    out: W,
}

impl<W: Write> InventoryState<W> {
    fn alias(&mut self, address: &str) -> String {
        if let Some(alias) = self.aliases.get(address) {
            return alias.clone();
        }
        let alias = format!("{:014X}", self.serial);
        self.serial += 1;
        self.aliases.insert(address.to_string(), alias.clone());
        alias
    }

    fn line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            error!("Failed to write inventory: {}", e);
        }
    }

    fn record_descriptor(&mut self, mut descriptor: ChannelDescriptor) -> serde_json::Result<()> {
        let (device_type, address) = match descriptor.parent() {
            Some(parent) => (
                descriptor.parent_type.clone().unwrap_or_default(),
                parent.to_string(),
            ),
            None => (descriptor.channel_type.clone(), descriptor.address.clone()),
        };

        if KNOWN_DEVICES.contains(&device_type.as_str()) {
            if self.skipped.insert(device_type.clone()) {
                self.line(&format!("# Skipping devices of type {}", device_type));
            }
            return Ok(());
        }

        let alias = self.alias(&address);
        if descriptor.parent().is_some() {
            let index = descriptor
                .index
                .map(|i| i.to_string())
                .unwrap_or_default();
            descriptor.address = format!("{}:{}", alias, index);
            descriptor.parent = Some(alias);
        } else {
            descriptor.address = alias.clone();
            for child in &mut descriptor.children {
                *child = child.replace(&address, &alias);
            }
            descriptor
                .extra
                .insert("RF_ADDRESS".to_string(), AttrValue::Integer(0));
        }

        let json = serde_json::to_string(&[descriptor])?;
        self.line(&format!("devices += {}", json));
        Ok(())
    }
}

/// Writes anonymized inventory lines to `W`.
pub struct Inventory<W> {
    state: Mutex<InventoryState<W>>,
}

impl<W: Write> Inventory<W> {
    /// Create the inventory and write the list headers.
    pub fn new(out: W) -> Self {
        let mut state = InventoryState {
            aliases: HashMap::new(),
            skipped: HashSet::new(),
            serial: 1,
            out,
        };
        state.line("devices = []");
        state.line("events = []");
        Self {
            state: Mutex::new(state),
        }
    }

    /// Alias of a device address, if it has been seen.
    pub fn alias_of(&self, address: &str) -> Option<String> {
        self.state.lock().aliases.get(address).cloned()
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().out
    }
}

#[async_trait]
impl<W: Write + Send> DeviceCallbacks for Inventory<W> {
    async fn on_discovery(&self, _session_id: &str, descriptors: Vec<ChannelDescriptor>) {
        let mut state = self.state.lock();
        for descriptor in descriptors {
            if let Err(e) = state.record_descriptor(descriptor) {
                error!("Failed to encode descriptor: {}", e);
            }
        }
    }

    async fn on_event(&self, _session_id: &str, address: &str, field: &str, value: AttrValue) {
        let device = address.split(':').next().unwrap_or(address);
        let mut state = self.state.lock();
        let Some(alias) = state.aliases.get(device).cloned() else {
            return;
        };

        match serde_json::to_string(&(alias, field, value)) {
            Ok(json) => state.line(&format!("events += {}", json)),
            Err(e) => error!("Failed to encode event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(inventory: Inventory<Vec<u8>>) -> Vec<String> {
        String::from_utf8(inventory.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_addresses_are_aliased() {
        let inventory = Inventory::new(Vec::new());
        inventory
            .on_discovery(
                "inventory-default",
                vec![
                    ChannelDescriptor::device("00021BE9957B8D", "HmIP-BSM")
                        .with_children(vec![
                            "00021BE9957B8D:0".to_string(),
                            "00021BE9957B8D:4".to_string(),
                        ])
                        .with_field("RF_ADDRESS", 7654321),
                    ChannelDescriptor::channel(
                        "00021BE9957B8D",
                        "HmIP-BSM",
                        4,
                        "SWITCH_VIRTUAL_RECEIVER",
                    ),
                ],
            )
            .await;
        inventory
            .on_event(
                "inventory-default",
                "00021BE9957B8D:4",
                "STATE",
                AttrValue::Bool(true),
            )
            .await;
        inventory
            .on_event("inventory-default", "FFFFFFFFFFFFFF:1", "STATE", AttrValue::Bool(true))
            .await;

        assert_eq!(
            inventory.alias_of("00021BE9957B8D").as_deref(),
            Some("00000000000001")
        );

        let lines = output(inventory);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "devices = []");
        assert_eq!(lines[1], "events = []");

        let device: serde_json::Value =
            serde_json::from_str(lines[2].strip_prefix("devices += ").unwrap()).unwrap();
        assert_eq!(device[0]["ADDRESS"], "00000000000001");
        assert_eq!(device[0]["RF_ADDRESS"], 0);
        assert_eq!(device[0]["CHILDREN"][1], "00000000000001:4");

        let channel: serde_json::Value =
            serde_json::from_str(lines[3].strip_prefix("devices += ").unwrap()).unwrap();
        assert_eq!(channel[0]["ADDRESS"], "00000000000001:4");
        assert_eq!(channel[0]["PARENT"], "00000000000001");

        assert_eq!(lines[4], r#"events += ["00000000000001","STATE",true]"#);
    }

    #[tokio::test]
    async fn test_known_devices_are_skipped_once() {
        let inventory = Inventory::new(Vec::new());
        inventory
            .on_discovery(
                "inventory-default",
                vec![
                    ChannelDescriptor::device("0001D3C99C4A1F", "HmIP-BROLL"),
                    ChannelDescriptor::channel("0001D3C99C4A1F", "HmIP-BROLL", 3, "SHUTTER_TRANSMITTER"),
                    ChannelDescriptor::device("0001D3C99C4A20", "HmIP-BROLL"),
                ],
            )
            .await;

        assert!(inventory.alias_of("0001D3C99C4A1F").is_none());
        let lines = output(inventory);
        assert_eq!(
            lines[2..],
            ["# Skipping devices of type HmIP-BROLL".to_string()]
        );
    }
}
