//! Bridge and inventory runs.

use anyhow::{Context, Result};
use hmbridge_core::{dispatch_notifications, Bridge, CommandRouter, DeviceRegistry};
use hmbridge_homematic::{
    HmConnection, HomematicConfig, Inventory, XmlRpcUrl, INVENTORY_INTERFACE_ID,
};
use hmbridge_mqtt::{BrokerConfig, MqttBus, MqttError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Settings;
use crate::shutdown::shutdown_signal;

const NOTIFICATION_CAPACITY: usize = 256;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the MQTT bridge until a shutdown signal or a broker failure.
pub async fn run_bridge(settings: Settings) -> Result<()> {
    let broker = BrokerConfig::from_url(&settings.broker)?;
    let listen = XmlRpcUrl::listen(&settings.listen)?;
    let connect = XmlRpcUrl::connect(settings.connect_url()?)?;
    let bridge_config = settings.bridge_config();

    let session = MqttBus::connect(&broker)
        .await
        .context("Failed to connect to MQTT broker")?;
    let mut messages = session.messages;
    let bus = session.bus;

    let registry = Arc::new(DeviceRegistry::new());
    let bridge = Arc::new(Bridge::new(
        bridge_config.clone(),
        registry,
        bus.clone(),
    ));

    let (tx, rx) = mpsc::channel(NOTIFICATION_CAPACITY);
    let consumer = {
        let bridge = bridge.clone();
        tokio::spawn(async move { dispatch_notifications(bridge.as_ref(), rx).await })
    };

    let homematic = HomematicConfig::new(listen, connect)
        .with_interface_id(bridge_config.interface_id.clone());
    let connection = Arc::new(
        HmConnection::start(homematic, tx)
            .await
            .context("Failed to connect to CCU")?,
    );
    info!("Bridge running");

    let router = CommandRouter::new(connection.clone());
    let result = tokio::select! {
        _ = shutdown_signal() => Ok(()),
        _ = router.run(&mut messages) => bus_failure(session.event_loop).await,
    };

    if let Err(e) = connection.stop().await {
        warn!("Failed to deregister from CCU: {}", e);
    }
    if let Err(e) = bus.disconnect().await {
        warn!("Failed to disconnect from MQTT broker: {}", e);
    }
    drain(consumer).await;
    result
}

/// Print an anonymized inventory of devices and events to stdout.
pub async fn run_inventory(settings: Settings) -> Result<()> {
    let listen = XmlRpcUrl::listen(&settings.listen)?;
    let connect = XmlRpcUrl::connect(settings.connect_url()?)?;

    let inventory = Arc::new(Inventory::new(std::io::stdout()));
    let (tx, rx) = mpsc::channel(NOTIFICATION_CAPACITY);
    let consumer = {
        let inventory = inventory.clone();
        tokio::spawn(async move { dispatch_notifications(inventory.as_ref(), rx).await })
    };

    let homematic =
        HomematicConfig::new(listen, connect).with_interface_id(INVENTORY_INTERFACE_ID);
    let connection = HmConnection::start(homematic, tx)
        .await
        .context("Failed to connect to CCU")?;
    info!("Collecting inventory, stop with Ctrl+C");

    shutdown_signal().await;

    if let Err(e) = connection.stop().await {
        warn!("Failed to deregister from CCU: {}", e);
    }
    drain(consumer).await;
    Ok(())
}

/// Outcome once the inbound message stream has ended.
async fn bus_failure(event_loop: JoinHandle<Result<(), MqttError>>) -> Result<()> {
    match event_loop.await {
        Ok(Ok(())) => anyhow::bail!("MQTT message stream closed"),
        Ok(Err(e)) => Err(e).context("MQTT connection lost"),
        Err(e) => Err(e).context("MQTT event loop panicked"),
    }
}

/// Let queued notifications finish once the connection is gone.
async fn drain(consumer: JoinHandle<()>) {
    if tokio::time::timeout(DRAIN_TIMEOUT, consumer).await.is_err() {
        warn!("Timed out waiting for pending notifications");
    }
}
