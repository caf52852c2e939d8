//! Gateway status, published at `<root>/@/status`.
//!
//! A status tells bus clients whether the gateway is up, which drivers it
//! answers for, and where to send commands and listen for replies:
//!
//! ```json
//! { "bridge": "device", "version": "0.2.0", "status": "running",
//!   "drivers": ["modbus", "port"], "format": "json",
//!   "channels": { "command": "device/command", "response": "device/response",
//!                 "error": "device/error" } }
//! ```

use serde::{Deserialize, Serialize};

use devgate_common::{Format, Topics};

use crate::Result;
use crate::publisher::Publisher;

/// Lifecycle state reported in a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayState {
    Running,
    Offline,
}

/// Keys the gateway takes commands on and answers on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChannels {
    pub command: String,
    pub response: String,
    pub error: String,
}

impl From<&Topics> for StatusChannels {
    fn from(topics: &Topics) -> Self {
        Self {
            command: topics.command.clone(),
            response: topics.response.clone(),
            error: topics.error.clone(),
        }
    }
}

/// One status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Gateway name (e.g., "device").
    pub bridge: String,
    pub version: String,
    pub status: GatewayState,
    /// Registered driver names; empty once offline.
    #[serde(default)]
    pub drivers: Vec<String>,
    pub channels: StatusChannels,
    /// Envelope encoding used for replies.
    pub format: Format,
}

impl BridgeStatus {
    pub fn new(
        bridge: impl Into<String>,
        version: impl Into<String>,
        status: GatewayState,
        publisher: &Publisher,
    ) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status,
            drivers: Vec::new(),
            channels: StatusChannels::from(publisher.topics()),
            format: publisher.format(),
        }
    }

    pub fn with_drivers(mut self, drivers: Vec<String>) -> Self {
        self.drivers = drivers;
        self
    }

    /// Publish to `<root>/@/status`.
    pub async fn publish(&self, publisher: &Publisher) -> Result<()> {
        let key = publisher.topics().status();
        publisher.publish_json(&key, self).await
    }
}

/// Publishes the gateway's status on startup and shutdown.
pub(crate) struct StatusPublisher {
    publisher: Publisher,
    bridge_name: String,
    version: String,
}

impl StatusPublisher {
    pub(crate) fn new(
        publisher: Publisher,
        bridge_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            bridge_name: bridge_name.into(),
            version: version.into(),
        }
    }

    fn status(&self, state: GatewayState) -> BridgeStatus {
        BridgeStatus::new(&self.bridge_name, &self.version, state, &self.publisher)
    }

    pub(crate) async fn publish_running(&self, drivers: Vec<String>) -> Result<()> {
        self.status(GatewayState::Running)
            .with_drivers(drivers)
            .publish(&self.publisher)
            .await
    }

    pub(crate) async fn publish_offline(&self) -> Result<()> {
        self.status(GatewayState::Offline)
            .publish(&self.publisher)
            .await
    }
}
