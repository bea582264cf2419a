//! Static classification tables.
//!
//! Channel type tags decide which Home Assistant entity a channel becomes,
//! which unit a sensor reports and how enumerated states are rendered.

/// Home Assistant entity kind of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    BinarySensor,
    Sensor,
    DeviceTrigger,
    Cover,
    Switch,
    Unhandled,
}

impl EntityKind {
    /// MQTT discovery component name.
    pub fn component(&self) -> Option<&'static str> {
        match self {
            EntityKind::BinarySensor => Some("binary_sensor"),
            EntityKind::Sensor => Some("sensor"),
            EntityKind::DeviceTrigger => Some("device_automation"),
            EntityKind::Cover => Some("cover"),
            EntityKind::Switch => Some("switch"),
            EntityKind::Unhandled => None,
        }
    }

    /// Whether the entity accepts commands from the bus.
    pub fn is_writable(&self) -> bool {
        matches!(self, EntityKind::Cover | EntityKind::Switch)
    }
}

/// Channel type -> entity kind.
const CHANNEL_KINDS: &[(&str, EntityKind)] = &[
    ("MAINTENANCE", EntityKind::BinarySensor),
    ("ALARM_COND_SWITCH_TRANSMITTER", EntityKind::Sensor),
    ("BLIND_WEEK_PROFILE", EntityKind::Sensor),
    ("COND_SWITCH_TRANSMITTER", EntityKind::Sensor),
    ("ENERGIE_METER_TRANSMITTER", EntityKind::Sensor),
    ("ROTARY_HANDLE_TRANSCEIVER", EntityKind::Sensor),
    ("SHUTTER_TRANSMITTER", EntityKind::Sensor),
    ("SMOKE_DETECTOR", EntityKind::Sensor),
    ("SWITCH_TRANSMITTER", EntityKind::Sensor),
    ("SWITCH_WEEK_PROFILE", EntityKind::Sensor),
    ("KEY_TRANSCEIVER", EntityKind::DeviceTrigger),
    ("SHUTTER_VIRTUAL_RECEIVER", EntityKind::Cover),
    ("SWITCH_VIRTUAL_RECEIVER", EntityKind::Switch),
];

/// Sensor channel type -> unit of measurement.
const SENSOR_UNITS: &[(&str, &str)] = &[("SHUTTER_TRANSMITTER", "%")];

/// Maintenance fields whose OR forms the maintenance binary sensor state.
pub const MAINTENANCE_FLAGS: &[&str] = &[
    "actual_temperature_status",
    "config_pending",
    "duty_cycle",
    "error_code",
    "error_overheat",
    "low_bat",
    "operating_voltage_status",
    "sabotage",
    "time_of_operation_status",
    "unreach",
];

/// Window handle position.
pub const ROTARY_HANDLE_VALUES: &[(i64, &str)] = &[(0, "closed"), (1, "tilted"), (2, "open")];

/// Smoke detector alarm status.
pub const SMOKE_DETECTOR_VALUES: &[(i64, &str)] = &[
    (0, "off"),
    (1, "primary"),
    (2, "intrusion"),
    (3, "secondary"),
];

/// Rendering for codes missing from an enumeration table.
pub const UNKNOWN_STATE: &str = "unknown";

pub fn classify(channel_type: &str) -> EntityKind {
    CHANNEL_KINDS
        .iter()
        .find(|(tag, _)| *tag == channel_type)
        .map(|(_, kind)| *kind)
        .unwrap_or(EntityKind::Unhandled)
}

pub fn unit_of_measurement(channel_type: &str) -> Option<&'static str> {
    SENSOR_UNITS
        .iter()
        .find(|(tag, _)| *tag == channel_type)
        .map(|(_, unit)| *unit)
}

/// Lowercase field name test against [`MAINTENANCE_FLAGS`].
pub fn is_maintenance_flag(field: &str) -> bool {
    MAINTENANCE_FLAGS.contains(&field)
}

/// Look a code up in an enumeration table.
pub fn lookup(table: &[(i64, &'static str)], code: Option<i64>) -> &'static str {
    code.and_then(|code| table.iter().find(|(c, _)| *c == code))
        .map(|(_, text)| *text)
        .unwrap_or(UNKNOWN_STATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("MAINTENANCE"), EntityKind::BinarySensor);
        assert_eq!(classify("SMOKE_DETECTOR"), EntityKind::Sensor);
        assert_eq!(classify("KEY_TRANSCEIVER"), EntityKind::DeviceTrigger);
        assert_eq!(classify("SHUTTER_VIRTUAL_RECEIVER"), EntityKind::Cover);
        assert_eq!(classify("SWITCH_VIRTUAL_RECEIVER"), EntityKind::Switch);
        assert_eq!(classify("CLIMATECONTROL_FLOOR_TRANSCEIVER"), EntityKind::Unhandled);
        assert_eq!(classify("maintenance"), EntityKind::Unhandled);
    }

    #[test]
    fn test_components() {
        assert_eq!(EntityKind::DeviceTrigger.component(), Some("device_automation"));
        assert_eq!(EntityKind::Unhandled.component(), None);
        assert!(EntityKind::Cover.is_writable());
        assert!(!EntityKind::Sensor.is_writable());
    }

    #[test]
    fn test_units() {
        assert_eq!(unit_of_measurement("SHUTTER_TRANSMITTER"), Some("%"));
        assert_eq!(unit_of_measurement("SMOKE_DETECTOR"), None);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(ROTARY_HANDLE_VALUES, Some(1)), "tilted");
        assert_eq!(lookup(ROTARY_HANDLE_VALUES, Some(9)), "unknown");
        assert_eq!(lookup(SMOKE_DETECTOR_VALUES, Some(3)), "secondary");
        assert_eq!(lookup(SMOKE_DETECTOR_VALUES, None), "unknown");
    }
}
