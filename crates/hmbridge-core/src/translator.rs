//! Event Translator.
//!
//! Applies one attribute change to the registry, republishes the channel's
//! attribute snapshot when it changed and decodes a semantic state value
//! according to [`STATE_RULES`].

use std::sync::Arc;
use tracing::{debug, error};

use crate::classify::{
    is_maintenance_flag, lookup, MAINTENANCE_FLAGS, ROTARY_HANDLE_VALUES, SMOKE_DETECTOR_VALUES,
};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::ports::{deliver, BusPublisher, Outgoing};
use crate::registry::DeviceRegistry;
use crate::topic::{self, ATTRIBUTES, STATE};
use crate::value::AttrValue;

/// Channel types a rule applies to.
#[derive(Debug, Clone, Copy)]
pub enum TypeMatch {
    Exact(&'static [&'static str]),
    Suffix(&'static str),
}

impl TypeMatch {
    fn matches(&self, channel_type: &str) -> bool {
        match self {
            Self::Exact(types) => types.contains(&channel_type),
            Self::Suffix(suffix) => channel_type.ends_with(suffix),
        }
    }
}

/// Fields a rule applies to. Names are the controller's uppercase keys.
#[derive(Debug, Clone, Copy)]
pub enum FieldMatch {
    Exact(&'static str),
    AnyOf(&'static [&'static str]),
    MaintenanceFlag,
}

impl FieldMatch {
    fn matches(&self, field: &str) -> bool {
        match self {
            Self::Exact(name) => *name == field,
            Self::AnyOf(names) => names.contains(&field),
            Self::MaintenanceFlag => is_maintenance_flag(&field.to_lowercase()),
        }
    }
}

/// How a matching event becomes a publish.
#[derive(Debug, Clone, Copy)]
pub enum Decoder {
    /// `online` / `offline` on the device availability topic.
    Availability,
    /// OR of every maintenance flag present in the snapshot.
    MaintenanceSummary,
    /// Boolean on `<channel>/<FIELD>`, not retained.
    PressEvent,
    /// Fraction scaled to a percentage.
    Level,
    Raw,
    Lookup(&'static [(i64, &'static str)]),
}

#[derive(Debug, Clone, Copy)]
pub struct StateRule {
    pub channel_types: TypeMatch,
    pub field: FieldMatch,
    pub decoder: Decoder,
}

const fn rule(channel_types: TypeMatch, field: FieldMatch, decoder: Decoder) -> StateRule {
    StateRule {
        channel_types,
        field,
        decoder,
    }
}

/// Decoding table. The first matching rule wins.
pub const STATE_RULES: &[StateRule] = &[
    rule(
        TypeMatch::Exact(&["MAINTENANCE"]),
        FieldMatch::Exact("UNREACH"),
        Decoder::Availability,
    ),
    rule(
        TypeMatch::Exact(&["MAINTENANCE"]),
        FieldMatch::MaintenanceFlag,
        Decoder::MaintenanceSummary,
    ),
    rule(
        TypeMatch::Exact(&["KEY_TRANSCEIVER"]),
        FieldMatch::AnyOf(&["PRESS_SHORT", "PRESS_LONG"]),
        Decoder::PressEvent,
    ),
    rule(
        TypeMatch::Exact(&["SHUTTER_TRANSMITTER", "SHUTTER_VIRTUAL_RECEIVER"]),
        FieldMatch::Exact("LEVEL"),
        Decoder::Level,
    ),
    rule(
        TypeMatch::Suffix("_WEEK_PROFILE"),
        FieldMatch::Exact("WEEK_PROGRAM_CHANNEL_LOCKS"),
        Decoder::Raw,
    ),
    rule(
        TypeMatch::Exact(&["ROTARY_HANDLE_TRANSCEIVER"]),
        FieldMatch::Exact("STATE"),
        Decoder::Lookup(ROTARY_HANDLE_VALUES),
    ),
    rule(
        TypeMatch::Exact(&["SMOKE_DETECTOR"]),
        FieldMatch::Exact("SMOKE_DETECTOR_ALARM_STATUS"),
        Decoder::Lookup(SMOKE_DETECTOR_VALUES),
    ),
    rule(
        TypeMatch::Exact(&["SWITCH_VIRTUAL_RECEIVER"]),
        FieldMatch::Exact("STATE"),
        Decoder::Raw,
    ),
];

/// First rule matching `(channel_type, field)`.
pub fn find_rule(channel_type: &str, field: &str) -> Option<&'static StateRule> {
    STATE_RULES
        .iter()
        .find(|rule| rule.channel_types.matches(channel_type) && rule.field.matches(field))
}

/// Translates controller events into state publishes.
pub struct EventTranslator {
    config: BridgeConfig,
    registry: Arc<DeviceRegistry>,
    bus: Arc<dyn BusPublisher>,
}

impl EventTranslator {
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

    pub async fn handle_event(&self, session_id: &str, address: &str, field: &str, value: AttrValue) {
        debug!("event({}, {}, {}, {})", session_id, address, field, value);

        match self.plan_event(session_id, address, field, value) {
            Ok(plan) => deliver(self.bus.as_ref(), plan).await,
            Err(e) => error!("{}", e),
        }
    }

    /// Apply the event to the registry and return the publishes it causes.
    pub fn plan_event(
        &self,
        session_id: &str,
        address: &str,
        field: &str,
        value: AttrValue,
    ) -> Result<Vec<Outgoing>> {
        if !self.config.is_own_session(session_id) {
            return Err(BridgeError::UnknownSession(session_id.to_string()));
        }
        if !self.registry.has_attributes(address) {
            return Err(BridgeError::UnknownAddress(address.to_string()));
        }
        let (device, index) = topic::split_channel_address(address)
            .ok_or_else(|| BridgeError::InvalidChannel(address.to_string()))?;
        let base = topic::channel_topic(device, index);

        let mut plan = Vec::new();
        if self
            .registry
            .apply_field(address, &field.to_lowercase(), value.clone())
        {
            if let Some(snapshot) = self.registry.get_attributes(address) {
                plan.push(Outgoing::retained(
                    topic::sub_topic(&base, ATTRIBUTES),
                    serde_json::to_vec(&snapshot)?,
                ));
            }
        }

        let Some(channel_type) = self.registry.channel_type(address) else {
            return Ok(plan);
        };
        let Some(rule) = find_rule(&channel_type, field) else {
            return Ok(plan);
        };

        match self.decode(rule.decoder, address, device, &base, field, &value) {
            Ok(publish) => plan.push(publish),
            Err(e) => error!("Dropping {} of {}: {}", field, address, e),
        }
        Ok(plan)
    }

    fn decode(
        &self,
        decoder: Decoder,
        address: &str,
        device: &str,
        base: &str,
        field: &str,
        value: &AttrValue,
    ) -> Result<Outgoing> {
        let state_topic = topic::sub_topic(base, STATE);
        let invalid = || BridgeError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        };

        let publish = match decoder {
            Decoder::Availability => {
                let availability = if value.is_set() { "offline" } else { "online" };
                Outgoing::retained(topic::availability_topic(device), availability)
            }
            Decoder::MaintenanceSummary => {
                let state = self
                    .registry
                    .with_attributes(address, |attrs| {
                        MAINTENANCE_FLAGS
                            .iter()
                            .filter_map(|flag| attrs.get(*flag))
                            .any(AttrValue::is_set)
                    })
                    .unwrap_or(false);
                Outgoing::retained(state_topic, AttrValue::Bool(state).to_payload())
            }
            Decoder::PressEvent => {
                let pressed = value.as_bool().ok_or_else(invalid)?;
                Outgoing::transient(
                    topic::sub_topic(base, field),
                    AttrValue::Bool(pressed).to_payload(),
                )
            }
            Decoder::Level => {
                let level = value.as_f64().ok_or_else(invalid)?;
                let percent = (level * 100.0).round_ties_even() as i64;
                Outgoing::retained(state_topic, AttrValue::Integer(percent).to_payload())
            }
            Decoder::Raw => Outgoing::retained(state_topic, value.to_payload()),
            Decoder::Lookup(table) => {
                Outgoing::retained(state_topic, lookup(table, value.as_i64()))
            }
        };
        Ok(publish)
    }
}
