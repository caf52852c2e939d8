//! The `modbus` driver: connection lifecycle, one-shot reads/writes and polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devgate_common::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Driver;
use crate::config::ModbusConfig;
use crate::error::{GatewayError, Result};
use crate::invoker::MethodInvoker;
use crate::method::MethodArgs;
use crate::polling::PollingManager;
use crate::registry::{ConnectOutcome, ConnectionKey, ConnectionRegistry};
use crate::transport::{ConnectRequest, SerialSettings, TransportKind};

const METHODS: &[&str] = &[
    "connect",
    "disconnect",
    "getConnections",
    "readCoils",
    "readDiscreteInputs",
    "readHoldingRegisters",
    "readInputRegisters",
    "writeCoil",
    "writeRegister",
    "writeCoils",
    "writeRegisters",
    "setInterval",
    "removeInterval",
    "getIntervals",
];

/// Parameters of `connect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// Host for TCP, serial device path for RTU.
    pub address: String,
    pub slave_id: u8,
    #[serde(default)]
    pub baud_rate: Option<u32>,
    /// TCP port.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub data_bits: Option<u8>,
    #[serde(default)]
    pub parity: Option<String>,
    #[serde(default)]
    pub stop_bits: Option<u8>,
}

/// Parameters of `disconnect`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceParams {
    address: String,
    slave_id: u8,
}

/// Parameters of the read/write methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodParams {
    pub address: String,
    pub slave_id: u8,
    #[serde(default)]
    pub address_offset: u16,
    #[serde(default)]
    pub length: Option<u16>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
}

impl MethodParams {
    fn key(&self) -> ConnectionKey {
        ConnectionKey::new(&self.address, self.slave_id)
    }

    fn args(&self) -> MethodArgs {
        MethodArgs {
            length: self.length,
            value: self.value.clone(),
            values: self.values.clone(),
        }
    }
}

/// Parameters of `setInterval`: a method invocation plus its period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalParams {
    pub address: String,
    pub slave_id: u8,
    #[serde(default)]
    pub address_offset: u16,
    #[serde(default)]
    pub length: Option<u16>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    pub method_name: String,
    /// Period in milliseconds.
    pub interval: u64,
}

/// Parameters of `removeInterval`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveIntervalParams {
    address: String,
    slave_id: u8,
    method_name: String,
    #[serde(default)]
    address_offset: u16,
}

/// Modbus RTU/TCP driver.
#[derive(Debug, Clone)]
pub struct ModbusDriver {
    registry: Arc<ConnectionRegistry>,
    invoker: MethodInvoker,
    polling: PollingManager,
    defaults: ModbusConfig,
}

impl ModbusDriver {
    pub fn new(registry: Arc<ConnectionRegistry>, defaults: ModbusConfig) -> Self {
        Self {
            invoker: MethodInvoker::new(registry.clone()),
            polling: PollingManager::new(registry.clone()),
            registry,
            defaults,
        }
    }

    async fn connect(&self, params: ConnectParams) -> Result<Value> {
        let request = ConnectRequest {
            kind: params.kind,
            address: params.address.clone(),
            unit_id: params.slave_id,
            tcp_port: params.port.unwrap_or(self.defaults.default_tcp_port),
            serial: SerialSettings {
                baud_rate: params.baud_rate.unwrap_or(self.defaults.default_baud_rate),
                data_bits: params.data_bits.unwrap_or(8),
                parity: params.parity.unwrap_or_else(|| "none".to_string()),
                stop_bits: params.stop_bits.unwrap_or(1),
            },
        };

        let message = match self.registry.connect(request).await? {
            ConnectOutcome::AlreadyConnected => "Device already connected".to_string(),
            ConnectOutcome::Connected => format!(
                "Connected to Modbus device at {} with slave ID {}",
                params.address, params.slave_id
            ),
        };
        Ok(Value::String(message))
    }

    async fn disconnect(&self, params: DeviceParams) -> Result<Value> {
        self.registry
            .disconnect(&params.address, params.slave_id)
            .await?;
        Ok(Value::String(format!(
            "Disconnected from device at {} with slave ID {}",
            params.address, params.slave_id
        )))
    }

    async fn invoke(&self, method: &str, params: MethodParams) -> Result<Value> {
        let output = self
            .invoker
            .invoke(&params.key(), method, params.address_offset, &params.args())
            .await?;
        to_value(&output)
    }

    fn set_interval(&self, params: IntervalParams) -> Result<Value> {
        let key = self.polling.set_interval(
            &ConnectionKey::new(&params.address, params.slave_id),
            &params.method_name,
            params.address_offset,
            Duration::from_millis(params.interval),
            MethodArgs {
                length: params.length,
                value: params.value,
                values: params.values,
            },
        )?;
        Ok(Value::String(format!(
            "Interval {} set every {} ms",
            key, params.interval
        )))
    }

    fn remove_interval(&self, params: RemoveIntervalParams) -> Result<Value> {
        self.polling.remove_interval(
            &ConnectionKey::new(&params.address, params.slave_id),
            &params.method_name,
            params.address_offset,
        )?;
        Ok(Value::String(format!(
            "Interval {}_{} removed",
            params.method_name, params.address_offset
        )))
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| GatewayError::Driver(e.to_string()))
}

#[async_trait]
impl Driver for ModbusDriver {
    fn name(&self) -> &'static str {
        "modbus"
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    async fn call(&self, method: &str, params: Params) -> Result<Value> {
        match method {
            "connect" => self.connect(params.into_typed()?).await,
            "disconnect" => self.disconnect(params.into_typed()?).await,
            "getConnections" => to_value(&self.registry.list()),
            "setInterval" => self.set_interval(params.into_typed()?),
            "removeInterval" => self.remove_interval(params.into_typed()?),
            "getIntervals" => to_value(&self.polling.list_intervals()),
            _ => self.invoke(method, params.into_typed()?).await,
        }
    }
}
