//! Topic naming.
//!
//! ```text
//! Homematic/<device>/availability
//! Homematic/<device>/<channel>/{state,attributes,action,set_level,PRESS_SHORT,PRESS_LONG}
//! <discovery-prefix>/<component>/<node-id>/<object-id>/config
//! ```
//!
//! Device addresses never contain `/`, so `(address, index)` maps to a
//! unique base topic.

use crate::config::MQTT_PREFIX;

pub const AVAILABILITY: &str = "availability";
pub const STATE: &str = "state";
pub const ATTRIBUTES: &str = "attributes";
pub const ACTION: &str = "action";
pub const SET_LEVEL: &str = "set_level";

/// Base topic of a device.
pub fn device_topic(address: &str) -> String {
    format!("{}/{}", MQTT_PREFIX, address)
}

/// Base topic of channel `index` of a device.
pub fn channel_topic(address: &str, index: impl std::fmt::Display) -> String {
    format!("{}/{}", device_topic(address), index)
}

/// Append `suffix` to a base topic.
pub fn sub_topic(base: &str, suffix: &str) -> String {
    format!("{}/{}", base, suffix)
}

pub fn availability_topic(address: &str) -> String {
    sub_topic(&device_topic(address), AVAILABILITY)
}

/// Discovery config topic.
pub fn discovery_topic(prefix: &str, component: &str, node_id: &str, object_id: &str) -> String {
    format!("{}/{}/{}/{}/config", prefix, component, node_id, object_id)
}

/// Split `device:index` into its device address and channel index text.
pub fn split_channel_address(address: &str) -> Option<(&str, &str)> {
    address
        .split_once(':')
        .filter(|(device, index)| !device.is_empty() && !index.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_topics() {
        let base = channel_topic("0001D3C99C4A1F", 4);
        assert_eq!(base, "Homematic/0001D3C99C4A1F/4");
        assert_eq!(sub_topic(&base, STATE), "Homematic/0001D3C99C4A1F/4/state");
        assert_eq!(
            availability_topic("0001D3C99C4A1F"),
            "Homematic/0001D3C99C4A1F/availability"
        );
    }

    #[test]
    fn test_distinct_channels_do_not_collide() {
        assert_ne!(channel_topic("ABC1", 12), channel_topic("ABC12", 1));
        assert_ne!(channel_topic("ABC", 1), channel_topic("ABC", 11));
    }

    #[test]
    fn test_discovery_topic() {
        assert_eq!(
            discovery_topic("homeassistant", "cover", "HmIP-BROLL_ABC", "4-SHUTTER_VIRTUAL_RECEIVER"),
            "homeassistant/cover/HmIP-BROLL_ABC/4-SHUTTER_VIRTUAL_RECEIVER/config"
        );
    }

    #[test]
    fn test_split_channel_address() {
        assert_eq!(split_channel_address("ABC:3"), Some(("ABC", "3")));
        assert_eq!(split_channel_address("ABC:3:1"), Some(("ABC", "3:1")));
        assert_eq!(split_channel_address("ABC"), None);
        assert_eq!(split_channel_address(":3"), None);
    }
}
