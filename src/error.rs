use std::net::SocketAddr;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No bridge transport available: {message}")]
    TransportUnavailable { message: String },

    #[error("Failed to bind bridge server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop bridge server: {message}")]
    Stop { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Timed out waiting for bridge on {addr}")]
    Timeout { addr: SocketAddr },
}

impl BridgeError {
    pub fn is_bind(&self) -> bool {
        matches!(self, BridgeError::Bind { .. })
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(e: toml::de::Error) -> Self {
        BridgeError::Config {
            message: e.to_string(),
        }
    }
}

impl Serialize for BridgeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
