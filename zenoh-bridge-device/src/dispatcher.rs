//! Command dispatch: envelope in, exactly one reply out.

use std::collections::HashMap;
use std::sync::Arc;

use devgate_common::{
    CommandEnvelope, CorrelationId, ReplyChannel, ResponseEnvelope, decode_auto, generate_id,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::drivers::Driver;
use crate::error::{GatewayError, Result};

/// A reply and the channel it belongs on.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub channel: ReplyChannel,
    pub envelope: ResponseEnvelope,
}

impl Reply {
    pub fn success(unique_id: impl Into<CorrelationId>, result: Value) -> Self {
        Self {
            channel: ReplyChannel::Response,
            envelope: ResponseEnvelope::success(unique_id, result),
        }
    }

    pub fn failure(unique_id: impl Into<CorrelationId>, message: impl Into<String>) -> Self {
        Self {
            channel: ReplyChannel::Error,
            envelope: ResponseEnvelope::failure(unique_id, message),
        }
    }
}

/// Builder for [`Dispatcher`]. Drivers cannot be added once built.
#[derive(Default)]
pub struct DispatcherBuilder {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DispatcherBuilder {
    /// Register a driver under its own name, replacing any earlier one.
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.drivers.insert(driver.name().to_string(), driver);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            drivers: Arc::new(self.drivers),
        }
    }
}

/// Routes commands to drivers.
#[derive(Clone)]
pub struct Dispatcher {
    drivers: Arc<HashMap<String, Arc<dyn Driver>>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Registered driver names, sorted.
    pub fn driver_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Decode a raw payload and dispatch it.
    ///
    /// A malformed command is answered on the error channel under its own
    /// `uniqueID` when one can be read, and under a fresh one otherwise.
    pub async fn handle_payload(&self, payload: &[u8]) -> Reply {
        let raw: Value = match decode_auto(payload) {
            Ok(raw) => raw,
            Err(e) => {
                let id = generate_id();
                warn!(unique_id = %id, error = %e, "Undecodable command");
                return Reply::failure(id, e.to_string());
            }
        };

        let id = raw
            .get("uniqueID")
            .and_then(CorrelationId::from_value)
            .unwrap_or_else(CorrelationId::generate);

        match serde_json::from_value::<CommandEnvelope>(raw) {
            Ok(command) => self.dispatch(&command).await,
            Err(e) => {
                warn!(unique_id = %id, error = %e, "Malformed command");
                Reply::failure(id, format!("malformed command: {}", e))
            }
        }
    }

    /// Run a command and build its reply.
    pub async fn dispatch(&self, command: &CommandEnvelope) -> Reply {
        debug!(unique_id = %command.unique_id, target = %command.target(), "Dispatching");

        match self.execute(command).await {
            Ok(result) => Reply::success(command.unique_id.clone(), result),
            Err(e) => {
                warn!(
                    unique_id = %command.unique_id,
                    target = %command.target(),
                    error = %e,
                    "Command failed"
                );
                Reply::failure(command.unique_id.clone(), e.to_string())
            }
        }
    }

    async fn execute(&self, command: &CommandEnvelope) -> Result<Value> {
        let driver = self
            .drivers
            .get(&command.driver)
            .filter(|d| d.methods().contains(&command.method.as_str()))
            .cloned()
            .ok_or_else(|| GatewayError::UnknownTarget(command.target()))?;

        let params = command.params()?;
        let method = command.method.clone();

        // Isolated so a panicking driver still produces an error reply.
        tokio::spawn(async move { driver.call(&method, params).await })
            .await
            .map_err(|e| GatewayError::Driver(e.to_string()))?
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("drivers", &self.driver_names())
            .finish()
    }
}
