//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{Format, LoggingConfig, TopicConfig, ZenohConfig};

/// Trait for gateway configuration types.
///
/// Implement this trait for your gateway's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use devgate_bridge_framework::{BridgeConfig, LoggingConfig, TopicConfig, ZenohConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyGatewayConfig {
///     pub zenoh: ZenohConfig,
///     pub topics: TopicConfig,
///     pub logging: LoggingConfig,
/// }
///
/// impl BridgeConfig for MyGatewayConfig {
///     fn zenoh(&self) -> &ZenohConfig {
///         &self.zenoh
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn topics(&self) -> &TopicConfig {
///         &self.topics
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the Zenoh configuration.
    fn zenoh(&self) -> &ZenohConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Get the command/response/error topics.
    fn topics(&self) -> &TopicConfig;

    /// Envelope encoding for outbound replies.
    fn format(&self) -> Format {
        Format::Json
    }

    /// Validate the configuration.
    ///
    /// Called automatically after loading, once the topic root has been
    /// checked. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;

        validate_topics(config.topics())?;
        config.validate()?;

        Ok(config)
    }
}

/// Reject topic settings that would leave a channel without a key.
fn validate_topics(topics: &TopicConfig) -> Result<()> {
    if topics.main.trim_matches('/').is_empty() {
        return Err(BridgeError::validation("topics.main cannot be empty"));
    }
    for (name, key) in [
        ("command", &topics.command),
        ("response", &topics.response),
        ("error", &topics.error),
    ] {
        if key.as_deref().is_some_and(|k| k.trim_matches('/').is_empty()) {
            return Err(BridgeError::validation(format!(
                "topics.{} cannot be empty",
                name
            )));
        }
    }
    Ok(())
}
