//! Error types for the translation engine.

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised while translating between the controller and the bus.
///
/// None of these escape a unit of work: components log them and drop the
/// offending descriptor, event or command.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid level: {0}")]
    InvalidLevel(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Invalid interface ID: {0}")]
    UnknownSession(String),

    #[error("Invalid address: {0}")]
    UnknownAddress(String),

    #[error("Unable to find Homematic device {0}")]
    UnknownDevice(String),

    #[error("Parent not found: {0}")]
    MissingParent(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Input that could never be processed, whatever the registry holds.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidTopic(_)
                | Self::InvalidChannel(_)
                | Self::InvalidPayload(_)
                | Self::InvalidAction(_)
                | Self::InvalidLevel(_)
                | Self::InvalidDescriptor(_)
                | Self::InvalidValue { .. }
        )
    }

    /// Input that refers to a session, device or channel we do not know.
    pub fn is_unknown_reference(&self) -> bool {
        matches!(
            self,
            Self::InvalidPrefix(_)
                | Self::UnknownSession(_)
                | Self::UnknownAddress(_)
                | Self::UnknownDevice(_)
                | Self::MissingParent(_)
        )
    }
}
