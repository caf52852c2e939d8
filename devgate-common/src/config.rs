//! Configuration types shared by gateway binaries.

use serde::{Deserialize, Serialize};

/// Common Zenoh connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
        }
    }
}

/// Bus topics used by the gateway.
///
/// Each channel defaults to `<main>/<channel>` unless set explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Root of all gateway key expressions (e.g. "device").
    #[serde(default = "default_main_topic")]
    pub main: String,

    /// Inbound command key.
    #[serde(default)]
    pub command: Option<String>,

    /// Outbound response key.
    #[serde(default)]
    pub response: Option<String>,

    /// Outbound error key.
    #[serde(default)]
    pub error: Option<String>,
}

fn default_main_topic() -> String {
    "device".to_string()
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            main: default_main_topic(),
            command: None,
            response: None,
            error: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
