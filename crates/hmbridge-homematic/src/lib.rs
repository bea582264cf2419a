//! Homematic CCU connection over XML-RPC.
//!
//! - [`xmlrpc`]: codec for XML-RPC documents
//! - [`client`]: calls into the CCU (`init`, `setValue`)
//! - [`server`]: callback server the CCU reports events and devices to
//! - [`connection`]: session lifecycle and the [`hmbridge_core::DeviceConnection`] impl
//! - [`inventory`]: anonymized dump of devices and events

pub mod client;
pub mod connection;
pub mod descriptor;
pub mod devices;
pub mod error;
pub mod inventory;
pub mod server;
pub mod url;
pub mod xmlrpc;

pub use client::XmlRpcClient;
pub use connection::{HmConnection, HomematicConfig};
pub use devices::{capability_for, DeviceTable};
pub use error::{HomematicError, Result};
pub use inventory::{Inventory, INVENTORY_INTERFACE_ID};
pub use url::XmlRpcUrl;
pub use xmlrpc::Value;
