//! XML-RPC callback server.
//!
//! The CCU calls back into this server once `init` has registered it. Every
//! `event` and `newDevices` call is queued as a [`DeviceNotification`] in
//! arrival order; the other interface methods are acknowledged.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use hmbridge_core::DeviceNotification;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::descriptor::{attr_value, channel_descriptor};
use crate::devices::DeviceTable;
use crate::xmlrpc::{self, fault_value, Value};

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Methods answered by [`CallbackState::dispatch`].
pub const METHODS: &[&str] = &[
    "event",
    "newDevices",
    "listDevices",
    "deleteDevices",
    "updateDevice",
    "replaceDevice",
    "readdedDevice",
    "system.listMethods",
    "system.multicall",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl Fault {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn invalid_params(method: &str) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid parameters for {}", method))
    }
}

/// Shared state of the callback handlers.
pub struct CallbackState {
    session_id: String,
    devices: Arc<DeviceTable>,
    notifications: mpsc::Sender<DeviceNotification>,
}

impl CallbackState {
    pub fn new(
        session_id: impl Into<String>,
        devices: Arc<DeviceTable>,
        notifications: mpsc::Sender<DeviceNotification>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            devices,
            notifications,
        }
    }

    /// Answer one call, expanding `system.multicall`.
    pub async fn dispatch(&self, method: &str, params: Vec<Value>) -> Result<Value, Fault> {
        if method != "system.multicall" {
            return self.dispatch_single(method, params).await;
        }

        let calls = match params.first() {
            Some(Value::Array(calls)) => calls.clone(),
            _ => return Err(Fault::invalid_params(method)),
        };

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let members = call.as_struct();
            let name = members
                .and_then(|m| m.get("methodName"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let params = members
                .and_then(|m| m.get("params"))
                .and_then(Value::as_array)
                .map(<[Value]>::to_vec)
                .unwrap_or_default();

            let result = match name {
                Some(name) if name != "system.multicall" => self.dispatch_single(&name, params).await,
                _ => Err(Fault::invalid_params(method)),
            };
            results.push(match result {
                Ok(value) => Value::Array(vec![value]),
                Err(fault) => fault_value(fault.code, &fault.message),
            });
        }
        Ok(Value::Array(results))
    }

    async fn dispatch_single(&self, method: &str, params: Vec<Value>) -> Result<Value, Fault> {
        debug!("{}({:?})", method, params);

        match method {
            "event" => {
                let [interface_id, address, key, value] = params.as_slice() else {
                    return Err(Fault::invalid_params(method));
                };
                let (Some(interface_id), Some(address), Some(key)) =
                    (interface_id.as_str(), address.as_str(), key.as_str())
                else {
                    return Err(Fault::invalid_params(method));
                };

                match attr_value(value) {
                    Some(value) => {
                        self.forward(DeviceNotification::Event {
                            interface_id: interface_id.to_string(),
                            address: address.to_string(),
                            key: key.to_string(),
                            value,
                        })
                        .await
                    }
                    None => debug!("Ignoring non-scalar {} of {}", key, address),
                }
                Ok(Value::from(""))
            }
            "newDevices" => {
                let (Some(interface_id), Some(Value::Array(descriptions))) = (
                    params.first().and_then(Value::as_str),
                    params.get(1),
                ) else {
                    return Err(Fault::invalid_params(method));
                };

                let mut descriptors = Vec::with_capacity(descriptions.len());
                for description in descriptions {
                    match channel_descriptor(description) {
                        Ok(descriptor) => descriptors.push(descriptor),
                        Err(e) => error!("Skipping device description: {}", e),
                    }
                }

                if interface_id == self.session_id {
                    self.devices.apply(&descriptors);
                }
                self.forward(DeviceNotification::NewDevices {
                    interface_id: interface_id.to_string(),
                    descriptors,
                })
                .await;
                Ok(Value::from(""))
            }
            "listDevices" => Ok(Value::Array(Vec::new())),
            "deleteDevices" | "updateDevice" | "replaceDevice" | "readdedDevice" => {
                debug!("Acknowledging {}", method);
                Ok(Value::from(""))
            }
            "system.listMethods" => Ok(Value::from(METHODS.to_vec())),
            _ => {
                warn!("Unknown XML-RPC method: {}", method);
                Err(Fault::new(
                    METHOD_NOT_FOUND,
                    format!("Unknown method: {}", method),
                ))
            }
        }
    }

    async fn forward(&self, notification: DeviceNotification) {
        if self.notifications.send(notification).await.is_err() {
            error!("Notification consumer is gone");
        }
    }
}

/// Routes of the callback server. The CCU posts to `/` or `/RPC2`.
pub fn router(state: Arc<CallbackState>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/RPC2", post(handle_rpc))
        .with_state(state)
}

async fn handle_rpc(State(state): State<Arc<CallbackState>>, body: Bytes) -> Response {
    let xml = match xmlrpc::parse_method_call(&body) {
        Ok(call) => match state.dispatch(&call.method, call.params).await {
            Ok(value) => xmlrpc::method_response(&value),
            Err(fault) => xmlrpc::fault_response(fault.code, &fault.message),
        },
        Err(e) => {
            error!("Invalid XML-RPC request: {}", e);
            xmlrpc::fault_response(PARSE_ERROR, &e.to_string())
        }
    };

    ([(header::CONTENT_TYPE, "text/xml")], xml).into_response()
}
