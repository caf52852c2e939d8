//! Error types for gateway operations.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias using [`GatewayError`].
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures reported back to command senders.
///
/// Every variant renders to the message carried by the error envelope.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No connected device for the given address and unit id.
    #[error("Device not connected")]
    NotConnected,

    /// Method name outside the Modbus capability set.
    #[error("Method not supported: {0}")]
    UnsupportedMethod(String),

    /// Open/close/read/write failed in the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Driver or method not registered with the dispatcher.
    #[error("unknown command or method: {0}")]
    UnknownTarget(String),

    /// Parameters have the wrong shape or are missing a required field.
    #[error("{0}")]
    InvalidParams(String),

    /// No interval registered under the given poll key.
    #[error("No interval found for {0}")]
    NoSuchInterval(String),

    /// The driver task ended without producing an outcome.
    #[error("Driver failure: {0}")]
    Driver(String),
}

impl GatewayError {
    /// Create an invalid-params error.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }
}

impl From<devgate_common::Error> for GatewayError {
    fn from(err: devgate_common::Error) -> Self {
        match err {
            devgate_common::Error::Envelope(msg) => Self::InvalidParams(msg),
            devgate_common::Error::Json(e) => Self::InvalidParams(format!("invalid params: {}", e)),
            other => Self::InvalidParams(other.to_string()),
        }
    }
}
