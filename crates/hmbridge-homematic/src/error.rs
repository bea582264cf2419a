//! Error types for the controller connection.

use thiserror::Error;

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, HomematicError>;

#[derive(Debug, Error)]
pub enum HomematicError {
    #[error("Invalid XML-RPC URL: {0}")]
    Url(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Malformed XML-RPC message: {0}")]
    Protocol(String),

    #[error("XML-RPC fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl HomematicError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
