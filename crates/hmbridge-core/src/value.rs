//! Attribute values, snapshots and channel descriptors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mapping from lowercase field name to its last known value.
pub type AttributeSnapshot = BTreeMap<String, AttrValue>;

/// Scalar value reported by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl AttrValue {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of the value. Floats qualify only when they are integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the value counts as a raised flag: `true`, a non-zero number
    /// or a non-empty string.
    pub fn is_set(&self) -> bool {
        match self {
            Self::Bool(v) => *v,
            Self::Integer(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::String(v) => !v.is_empty(),
        }
    }

    /// Empty strings are dropped from snapshots.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::String(v) if v.is_empty())
    }

    /// Encode the value as an MQTT payload.
    ///
    /// Booleans become `ON`/`OFF`, which is what Home Assistant binary
    /// sensors and switches expect by default.
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            Self::Bool(true) => b"ON".to_vec(),
            Self::Bool(false) => b"OFF".to_vec(),
            Self::Integer(v) => v.to_string().into_bytes(),
            Self::Float(v) => format!("{:?}", v).into_bytes(),
            Self::String(v) => v.clone().into_bytes(),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:?}", v),
            Self::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// One entry of a discovery batch: either a device or one of its channels.
///
/// Field names follow the controller's wire names so a descriptor can be
/// dumped and reloaded as sample data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    #[serde(rename = "ADDRESS")]
    pub address: String,

    #[serde(rename = "TYPE")]
    pub channel_type: String,

    #[serde(rename = "INDEX", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    #[serde(rename = "PARENT", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(rename = "PARENT_TYPE", default, skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<String>,

    #[serde(rename = "FIRMWARE", default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,

    #[serde(rename = "CHILDREN", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,

    /// Every other scalar field, keyed by its wire name.
    #[serde(flatten)]
    pub extra: BTreeMap<String, AttrValue>,
}

impl ChannelDescriptor {
    /// Descriptor for a device (no parent).
    pub fn device(address: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            channel_type: device_type.into(),
            ..Default::default()
        }
    }

    /// Descriptor for channel `index` of `parent`.
    ///
    /// The channel address is `parent:index`.
    pub fn channel(
        parent: impl Into<String>,
        parent_type: impl Into<String>,
        index: u32,
        channel_type: impl Into<String>,
    ) -> Self {
        let parent = parent.into();
        Self {
            address: format!("{}:{}", parent, index),
            channel_type: channel_type.into(),
            index: Some(index),
            parent: Some(parent),
            parent_type: Some(parent_type.into()),
            ..Default::default()
        }
    }

    pub fn with_firmware(mut self, firmware: impl Into<String>) -> Self {
        self.firmware = Some(firmware.into());
        self
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = children;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Parent device address, treating an empty string as absent.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref().filter(|p| !p.is_empty())
    }

    /// Whether this descriptor introduces a device rather than a channel.
    pub fn is_device(&self) -> bool {
        self.parent().is_none()
    }

    /// Build the attribute snapshot: every non-empty field, keyed lowercase.
    pub fn snapshot(&self) -> AttributeSnapshot {
        let mut snapshot = AttributeSnapshot::new();

        let mut put = |key: &str, value: AttrValue| {
            if !value.is_empty() {
                snapshot.insert(key.to_string(), value);
            }
        };

        put("address", self.address.as_str().into());
        put("type", self.channel_type.as_str().into());
        if let Some(index) = self.index {
            put("index", index.into());
        }
        if let Some(parent) = &self.parent {
            put("parent", parent.as_str().into());
        }
        if let Some(parent_type) = &self.parent_type {
            put("parent_type", parent_type.as_str().into());
        }
        if let Some(firmware) = &self.firmware {
            put("firmware", firmware.as_str().into());
        }
        for (key, value) in &self.extra {
            put(&key.to_lowercase(), value.clone());
        }

        snapshot
    }
}
