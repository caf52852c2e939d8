//! Recurring invocations per connection.
//!
//! Each poll entry owns a Tokio task that ticks at a fixed period and runs the
//! invoker with the stored arguments. Dropping an entry aborts its task, so
//! replacing or removing an entry never leaves a timer behind. Tick results
//! are logged and not published.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::invoker::invoke_on;
use crate::method::{MethodArgs, MethodOutput, ModbusMethod};
use crate::registry::{ConnectionKey, ConnectionRegistry, DeviceConnection};

/// Identity of a poll entry within one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollKey {
    pub method: ModbusMethod,
    pub offset: u16,
}

impl fmt::Display for PollKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.method, self.offset)
    }
}

/// A scheduled recurring invocation.
pub struct PollEntry {
    task: JoinHandle<()>,
    period: Duration,
}

impl PollEntry {
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for PollEntry {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Row returned by [`PollingManager::list_intervals`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalInfo {
    pub address: String,
    pub slave_id: u8,
    pub method_name: ModbusMethod,
    pub address_offset: u16,
    pub key: String,
    /// Period in milliseconds.
    pub interval: u64,
}

/// Schedules, replaces and cancels poll entries.
#[derive(Debug, Clone)]
pub struct PollingManager {
    registry: Arc<ConnectionRegistry>,
}

impl PollingManager {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Install a recurring invocation, replacing any entry with the same key.
    pub fn set_interval(
        &self,
        connection: &ConnectionKey,
        method: &str,
        offset: u16,
        period: Duration,
        args: MethodArgs,
    ) -> Result<PollKey> {
        let method: ModbusMethod = method.parse()?;
        if period.is_zero() {
            return Err(GatewayError::invalid_params("interval must be greater than 0"));
        }

        let device = self.registry.connection(connection)?;
        let key = PollKey { method, offset };

        let mut polls = device.polls().lock();
        if !device.is_connected() {
            return Err(GatewayError::NotConnected);
        }

        if let Some(previous) = polls.remove(&key) {
            drop(previous);
            debug!(device = %connection, poll = %key, "Replaced poll timer");
        }

        let task = tokio::spawn(run_poll(Arc::downgrade(&device), key, period, args));
        polls.insert(key, PollEntry { task, period });

        info!(device = %connection, poll = %key, period_ms = period.as_millis() as u64, "Interval set");
        Ok(key)
    }

    /// Cancel and remove one poll entry.
    pub fn remove_interval(
        &self,
        connection: &ConnectionKey,
        method: &str,
        offset: u16,
    ) -> Result<()> {
        let Ok(method) = method.parse::<ModbusMethod>() else {
            return Err(GatewayError::NoSuchInterval(format!("{}_{}", method, offset)));
        };
        let key = PollKey { method, offset };

        let device = self.registry.connection(connection)?;
        let removed = device.polls().lock().remove(&key);

        match removed {
            Some(entry) => {
                drop(entry);
                info!(device = %connection, poll = %key, "Interval removed");
                Ok(())
            }
            None => Err(GatewayError::NoSuchInterval(key.to_string())),
        }
    }

    /// Snapshot of every poll entry across all connections.
    pub fn list_intervals(&self) -> Vec<IntervalInfo> {
        self.registry
            .connections()
            .iter()
            .flat_map(|device| {
                let connection = device.key();
                device
                    .polls()
                    .lock()
                    .iter()
                    .map(|(key, entry)| IntervalInfo {
                        address: connection.address.clone(),
                        slave_id: connection.unit_id,
                        method_name: key.method,
                        address_offset: key.offset,
                        key: key.to_string(),
                        interval: entry.period().as_millis() as u64,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// Tick loop. Exits once the connection is gone; failures never stop it.
async fn run_poll(
    device: Weak<DeviceConnection>,
    key: PollKey,
    period: Duration,
    args: MethodArgs,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(device) = device.upgrade() else {
            break;
        };

        match invoke_on(&device, key.method, key.offset, &args).await {
            Ok(output) => log_output(&device, key, &output),
            Err(e) => {
                warn!(device = %device.key(), poll = %key, error = %e, "Poll tick failed");
            }
        }
    }
}

fn log_output(device: &DeviceConnection, key: PollKey, output: &MethodOutput) {
    match serde_json::to_string(output) {
        Ok(result) => debug!(device = %device.key(), poll = %key, %result, "Poll tick"),
        Err(e) => warn!(device = %device.key(), poll = %key, error = %e, "Unprintable poll result"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_key_display() {
        let key = PollKey {
            method: ModbusMethod::ReadHoldingRegisters,
            offset: 40,
        };
        assert_eq!(key.to_string(), "readHoldingRegisters_40");
    }

    #[test]
    fn test_interval_info_serialization() {
        let info = IntervalInfo {
            address: "10.0.0.5".to_string(),
            slave_id: 1,
            method_name: ModbusMethod::ReadCoils,
            address_offset: 8,
            key: "readCoils_8".to_string(),
            interval: 1000,
        };
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({
                "address": "10.0.0.5",
                "slaveId": 1,
                "methodName": "readCoils",
                "addressOffset": 8,
                "key": "readCoils_8",
                "interval": 1000
            })
        );
    }
}
