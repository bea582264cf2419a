//! Device Registry - in-memory store of everything discovery has told us.
//!
//! Two maps live behind one lock:
//! - channel (or device) address -> attribute snapshot
//! - device address -> discovery identity
//!
//! Entries are never removed. A reconnect replays discovery, which rewrites
//! identical snapshots and leaves the first identity in place.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

use crate::config::MANUFACTURER;
use crate::value::{AttrValue, AttributeSnapshot, ChannelDescriptor};

/// Device record referenced by every discovery document of its channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryIdentity {
    pub name: String,
    pub identifiers: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

impl DiscoveryIdentity {
    /// Identity of a parentless descriptor.
    pub fn from_descriptor(descriptor: &ChannelDescriptor) -> Self {
        Self {
            name: format!("{}_{}", descriptor.channel_type, descriptor.address),
            identifiers: vec![descriptor.address.clone()],
            manufacturer: MANUFACTURER.to_string(),
            model: descriptor.channel_type.clone(),
            sw_version: descriptor.firmware.clone().filter(|f| !f.is_empty()),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    identities: HashMap<String, DiscoveryIdentity>,
    attributes: HashMap<String, AttributeSnapshot>,
}

/// Shared registry of devices and channels.
#[derive(Default)]
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity unless one is already stored. Returns whether it
    /// was inserted.
    pub fn upsert_identity(&self, device_address: &str, identity: DiscoveryIdentity) -> bool {
        let mut state = self.state.lock();
        if state.identities.contains_key(device_address) {
            return false;
        }
        state
            .identities
            .insert(device_address.to_string(), identity);
        true
    }

    pub fn has_identity(&self, device_address: &str) -> bool {
        self.state.lock().identities.contains_key(device_address)
    }

    pub fn identity(&self, device_address: &str) -> Option<DiscoveryIdentity> {
        self.state.lock().identities.get(device_address).cloned()
    }

    /// Replace the snapshot of an address wholesale.
    pub fn set_attributes(&self, address: &str, snapshot: AttributeSnapshot) {
        self.state
            .lock()
            .attributes
            .insert(address.to_string(), snapshot);
    }

    pub fn get_attributes(&self, address: &str) -> Option<AttributeSnapshot> {
        self.state.lock().attributes.get(address).cloned()
    }

    pub fn has_attributes(&self, address: &str) -> bool {
        self.state.lock().attributes.contains_key(address)
    }

    /// Run `f` against the stored snapshot without cloning it.
    pub fn with_attributes<R>(
        &self,
        address: &str,
        f: impl FnOnce(&AttributeSnapshot) -> R,
    ) -> Option<R> {
        self.state.lock().attributes.get(address).map(f)
    }

    /// Write `field` if its value differs from the stored one.
    ///
    /// Returns `true` when the snapshot changed. Unknown addresses are
    /// logged and reported as unchanged.
    pub fn apply_field(&self, address: &str, field: &str, value: AttrValue) -> bool {
        let mut state = self.state.lock();
        let Some(snapshot) = state.attributes.get_mut(address) else {
            error!("Invalid address: {}", address);
            return false;
        };

        if snapshot.get(field) == Some(&value) {
            return false;
        }
        snapshot.insert(field.to_string(), value);
        true
    }

    /// Stored channel type tag of an address.
    pub fn channel_type(&self, address: &str) -> Option<String> {
        self.with_attributes(address, |attrs| {
            attrs
                .get("type")
                .and_then(AttrValue::as_str)
                .map(str::to_string)
        })
        .flatten()
    }

    pub fn identity_count(&self) -> usize {
        self.state.lock().identities.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.state.lock().attributes.len()
    }
}
