//! Conversion between XML-RPC values and the engine's value model.

use hmbridge_core::{AttrValue, ChannelDescriptor};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{HomematicError, Result};
use crate::xmlrpc::Value;

/// Scalar view of an XML-RPC value. Arrays, structs and nil have none.
pub fn attr_value(value: &Value) -> Option<AttrValue> {
    match value {
        Value::Int(v) => Some(AttrValue::Integer(*v)),
        Value::Bool(v) => Some(AttrValue::Bool(*v)),
        Value::Double(v) => Some(AttrValue::Float(*v)),
        Value::String(v) | Value::DateTime(v) | Value::Base64(v) => {
            Some(AttrValue::String(v.clone()))
        }
        Value::Array(_) | Value::Struct(_) | Value::Nil => None,
    }
}

fn string_member(members: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    members.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Build a descriptor from a `newDevices` struct.
pub fn channel_descriptor(value: &Value) -> Result<ChannelDescriptor> {
    let members = value
        .as_struct()
        .ok_or_else(|| HomematicError::protocol("device description is not a struct"))?;

    let mut descriptor = ChannelDescriptor {
        address: string_member(members, "ADDRESS").unwrap_or_default(),
        channel_type: string_member(members, "TYPE").unwrap_or_default(),
        index: members
            .get("INDEX")
            .and_then(Value::as_i64)
            .and_then(|i| u32::try_from(i).ok()),
        parent: string_member(members, "PARENT"),
        parent_type: string_member(members, "PARENT_TYPE"),
        firmware: string_member(members, "FIRMWARE"),
        ..Default::default()
    };

    for (key, value) in members {
        match key.as_str() {
            "ADDRESS" | "TYPE" | "INDEX" | "PARENT" | "PARENT_TYPE" | "FIRMWARE" => {}
            "CHILDREN" => {
                descriptor.children = value
                    .as_array()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
            }
            _ => match attr_value(value) {
                Some(attr) => {
                    descriptor.extra.insert(key.clone(), attr);
                }
                None => debug!("Dropping non-scalar field {} of {}", key, descriptor.address),
            },
        }
    }

    Ok(descriptor)
}
