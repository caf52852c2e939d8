//! devgate Common Library
//!
//! Shared types and utilities for the devgate device gateway:
//!
//! - [`envelope`] - Command and response envelopes exchanged over the bus
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Zenoh, topic and logging configuration
//! - [`session`] - Zenoh session management
//! - [`topics`] - Command/response/error key expressions
//! - [`error`] - Error types

pub mod config;
pub mod envelope;
pub mod error;
pub mod serialization;
pub mod session;
pub mod topics;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, TopicConfig, ZenohConfig};
pub use envelope::{
    CommandEnvelope, CorrelationId, Params, ReplyChannel, ResponseEnvelope, generate_id,
};
pub use error::{Error, Result};
pub use serialization::{Format, decode, decode_auto, encode};
pub use session::connect;
pub use topics::Topics;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
