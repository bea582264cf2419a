//! MQTT bus client.
//!
//! [`MqttBus::connect`] waits for the broker's CONNACK, then hands the event
//! loop to a task that forwards every inbound PUBLISH to a channel.

use async_trait::async_trait;
use hmbridge_core::{BridgeError, BusMessage, BusPublisher};
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::BrokerConfig;
use crate::error::Result;

/// QoS of every publish and subscription.
pub const QOS: QoS = QoS::ExactlyOnce;

const REQUEST_CAPACITY: usize = 100;
const MESSAGE_CAPACITY: usize = 100;

/// Publishing handle.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

/// A connected bus with its inbound stream.
pub struct MqttSession {
    pub bus: Arc<MqttBus>,
    pub messages: mpsc::Receiver<BusMessage>,
    /// Finishes with the error that ended the event loop, or `Ok` once the
    /// message receiver is dropped.
    pub event_loop: JoinHandle<Result<()>>,
}

impl MqttBus {
    pub async fn connect(config: &BrokerConfig) -> Result<MqttSession> {
        info!(
            "Connecting to MQTT broker {}:{} as {}",
            config.host, config.port, config.client_id
        );
        let (client, mut event_loop) = AsyncClient::new(config.mqtt_options(), REQUEST_CAPACITY);

        loop {
            if let Event::Incoming(Packet::ConnAck(ack)) = event_loop.poll().await? {
                debug!("CONNACK: {:?}", ack);
                break;
            }
        }
        info!("Connected to MQTT broker");

        let (tx, messages) = mpsc::channel(MESSAGE_CAPACITY);
        let event_loop = tokio::spawn(forward_messages(event_loop, tx));

        Ok(MqttSession {
            bus: Arc::new(Self { client }),
            messages,
            event_loop,
        })
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

async fn forward_messages(mut event_loop: EventLoop, tx: mpsc::Sender<BusMessage>) -> Result<()> {
    loop {
        match event_loop.poll().await? {
            Event::Incoming(Packet::Publish(publish)) => {
                let message = BusMessage::new(publish.topic, publish.payload.to_vec());
                if tx.send(message).await.is_err() {
                    debug!("Message receiver dropped");
                    return Ok(());
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                info!("Broker closed the connection");
            }
            _ => {}
        }
    }
}

#[async_trait]
impl BusPublisher for MqttBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> hmbridge_core::Result<()> {
        self.client
            .publish(topic, QOS, retain, payload)
            .await
            .map_err(|e| BridgeError::Bus(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> hmbridge_core::Result<()> {
        self.client
            .subscribe(topic, QOS)
            .await
            .map_err(|e| BridgeError::Bus(e.to_string()))
    }
}
