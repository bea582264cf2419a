//! Error types for the MQTT bus.

use thiserror::Error;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    Url(String),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}
