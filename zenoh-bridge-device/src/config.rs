//! Configuration for the device gateway.

use std::time::Duration;

use devgate_bridge_framework::{
    BridgeConfig, BridgeError, Format, LoggingConfig, TopicConfig, ZenohConfig,
};
use serde::{Deserialize, Serialize};

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Bus topics and envelope encoding
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Modbus connection defaults
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// Serial port enumeration
    #[serde(default)]
    pub serial: SerialConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bus-facing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Command/response/error topics (default root: "device")
    #[serde(default)]
    pub topics: TopicConfig,

    /// Envelope encoding for replies: "json" or "cbor"
    #[serde(default)]
    pub format: Format,
}

/// Defaults applied to Modbus connect requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Time allowed for a TCP connect or serial open, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Time allowed for a device to answer one request, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Baud rate used when an RTU connect omits `baudRate`
    #[serde(default = "default_baud_rate")]
    pub default_baud_rate: u32,

    /// Port used when a TCP connect omits `port`
    #[serde(default = "default_tcp_port")]
    pub default_tcp_port: u16,
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_tcp_port() -> u16 {
    502
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            default_baud_rate: default_baud_rate(),
            default_tcp_port: default_tcp_port(),
        }
    }
}

impl ModbusConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Serial enumeration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Register the `port` driver
    #[serde(default = "default_serial_enabled")]
    pub enabled: bool,
}

fn default_serial_enabled() -> bool {
    true
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: default_serial_enabled(),
        }
    }
}

impl BridgeConfig for DeviceBridgeConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn topics(&self) -> &TopicConfig {
        &self.gateway.topics
    }

    fn format(&self) -> Format {
        self.gateway.format
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.modbus.connect_timeout_ms == 0 {
            return Err(BridgeError::validation(
                "modbus.connect_timeout_ms must be greater than 0",
            ));
        }

        if self.modbus.request_timeout_ms == 0 {
            return Err(BridgeError::validation(
                "modbus.request_timeout_ms must be greater than 0",
            ));
        }

        if self.modbus.default_baud_rate == 0 {
            return Err(BridgeError::validation(
                "modbus.default_baud_rate must be greater than 0",
            ));
        }

        if self.modbus.default_tcp_port == 0 {
            return Err(BridgeError::validation(
                "modbus.default_tcp_port must be greater than 0",
            ));
        }

        Ok(())
    }
}
