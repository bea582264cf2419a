//! Controller session lifecycle.
//!
//! [`HmConnection::start`] binds the callback server, registers it with the
//! CCU via `init` and from then on serves callbacks until
//! [`HmConnection::stop`] deregisters it again.

use async_trait::async_trait;
use hmbridge_core::config::{DEFAULT_INTERFACE_ID, DEFAULT_REMOTE};
use hmbridge_core::{BridgeError, DeviceAction, DeviceConnection, DeviceInfo, DeviceNotification};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::client::XmlRpcClient;
use crate::devices::DeviceTable;
use crate::error::{HomematicError, Result};
use crate::server::{self, CallbackState};
use crate::url::XmlRpcUrl;
use crate::xmlrpc::Value;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct HomematicConfig {
    pub interface_id: String,
    pub remote: String,
    /// Where the callback server listens.
    pub listen: XmlRpcUrl,
    /// The CCU's XML-RPC endpoint.
    pub connect: XmlRpcUrl,
}

impl HomematicConfig {
    pub fn new(listen: XmlRpcUrl, connect: XmlRpcUrl) -> Self {
        Self {
            interface_id: DEFAULT_INTERFACE_ID.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            listen,
            connect,
        }
    }

    pub fn with_interface_id(mut self, interface_id: impl Into<String>) -> Self {
        self.interface_id = interface_id.into();
        self
    }

    /// Interface id passed to `init`; the CCU tags every callback with it.
    pub fn session_id(&self) -> String {
        format!("{}-{}", self.interface_id, self.remote)
    }
}

/// `setValue` key and value of a device action.
pub fn action_value(action: DeviceAction) -> (&'static str, Value) {
    match action {
        DeviceAction::MoveUp => ("LEVEL", Value::Double(1.0)),
        DeviceAction::MoveDown => ("LEVEL", Value::Double(0.0)),
        DeviceAction::Stop => ("STOP", Value::Bool(true)),
        DeviceAction::SetLevel(level) => ("LEVEL", Value::Double(level)),
        DeviceAction::On => ("STATE", Value::Bool(true)),
        DeviceAction::Off => ("STATE", Value::Bool(false)),
    }
}

/// A registered session with one CCU.
pub struct HmConnection {
    client: XmlRpcClient,
    devices: Arc<DeviceTable>,
    callback_url: String,
    local_addr: SocketAddr,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl HmConnection {
    /// Serve callbacks and register them with the CCU.
    ///
    /// Notifications are sent to `notifications` in arrival order.
    pub async fn start(
        config: HomematicConfig,
        notifications: mpsc::Sender<DeviceNotification>,
    ) -> Result<Self> {
        let client = XmlRpcClient::new(&config.connect)?;
        let devices = Arc::new(DeviceTable::new());

        let listener =
            TcpListener::bind((config.listen.host.as_str(), config.listen.port.unwrap_or(0)))
                .await?;
        let local_addr = listener.local_addr()?;
        let host = callback_host(&config.listen, &config.connect).await?;
        let callback_url = format_callback_url(&host, local_addr.port());

        let state = Arc::new(CallbackState::new(
            config.session_id(),
            devices.clone(),
            notifications,
        ));
        let app = server::router(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("Callback server failed: {}", e);
            }
        });
        info!("Listening for XML-RPC callbacks on {}", local_addr);

        let connection = Self {
            client,
            devices,
            callback_url,
            local_addr,
            shutdown: Mutex::new(Some(shutdown_tx)),
            server: Mutex::new(Some(server)),
        };

        info!(
            "Registering {} as {} with {}",
            connection.callback_url,
            config.session_id(),
            connection.client.endpoint()
        );
        if let Err(e) = connection
            .client
            .init(&connection.callback_url, &config.session_id())
            .await
        {
            connection.shutdown_server().await;
            return Err(HomematicError::Connection(format!("init failed: {}", e)));
        }

        Ok(connection)
    }

    /// Deregister from the CCU and stop serving callbacks.
    pub async fn stop(&self) -> Result<()> {
        info!("Deregistering {}", self.callback_url);
        let result = self.client.deinit(&self.callback_url).await;
        self.shutdown_server().await;
        result
    }

    async fn shutdown_server(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
        let server = self.server.lock().take();
        if let Some(server) = server {
            if let Err(e) = server.await {
                error!("Callback server task failed: {}", e);
            }
        }
    }

    pub fn devices(&self) -> &Arc<DeviceTable> {
        &self.devices
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl DeviceConnection for HmConnection {
    fn device(&self, address: &str) -> Option<DeviceInfo> {
        self.devices.get(address)
    }

    async fn invoke(
        &self,
        address: &str,
        channel: u32,
        action: DeviceAction,
    ) -> hmbridge_core::Result<()> {
        let channel_address = format!("{}:{}", address, channel);
        let (key, value) = action_value(action);
        debug!("{}: {}() -> {}={:?}", channel_address, action.name(), key, value);

        self.client
            .set_value(&channel_address, key, value)
            .await
            .map_err(|e| BridgeError::Device(e.to_string()))
    }
}

/// Host the CCU should call back.
///
/// A wildcard listen host is replaced by the local address of the route to
/// the CCU.
async fn callback_host(listen: &XmlRpcUrl, connect: &XmlRpcUrl) -> Result<String> {
    if !listen.is_unspecified_host() {
        return Ok(listen.host.clone());
    }

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket
        .connect((connect.host.as_str(), connect.port.unwrap_or(0)))
        .await?;
    Ok(socket.local_addr()?.ip().to_string())
}

fn format_callback_url(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("http://[{}]:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    }
}
