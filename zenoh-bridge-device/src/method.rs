//! The fixed Modbus capability set and its argument/result types.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::{GatewayError, Result};

/// Operations a Modbus transport handle supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ModbusMethod {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteCoil,
    WriteRegister,
    WriteCoils,
    WriteRegisters,
}

impl ModbusMethod {
    pub const ALL: [ModbusMethod; 8] = [
        ModbusMethod::ReadCoils,
        ModbusMethod::ReadDiscreteInputs,
        ModbusMethod::ReadHoldingRegisters,
        ModbusMethod::ReadInputRegisters,
        ModbusMethod::WriteCoil,
        ModbusMethod::WriteRegister,
        ModbusMethod::WriteCoils,
        ModbusMethod::WriteRegisters,
    ];

    /// Wire name used in commands (e.g. "readHoldingRegisters").
    pub fn as_str(&self) -> &'static str {
        match self {
            ModbusMethod::ReadCoils => "readCoils",
            ModbusMethod::ReadDiscreteInputs => "readDiscreteInputs",
            ModbusMethod::ReadHoldingRegisters => "readHoldingRegisters",
            ModbusMethod::ReadInputRegisters => "readInputRegisters",
            ModbusMethod::WriteCoil => "writeCoil",
            ModbusMethod::WriteRegister => "writeRegister",
            ModbusMethod::WriteCoils => "writeCoils",
            ModbusMethod::WriteRegisters => "writeRegisters",
        }
    }
}

impl fmt::Display for ModbusMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModbusMethod {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        ModbusMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| GatewayError::UnsupportedMethod(s.to_string()))
    }
}

/// Arguments forwarded to a transport call.
///
/// Reads use `length`, single writes use `value`, bulk writes use `values`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodArgs {
    pub length: Option<u16>,
    pub value: Option<Value>,
    pub values: Option<Vec<Value>>,
}

impl MethodArgs {
    pub fn read(length: u16) -> Self {
        Self {
            length: Some(length),
            ..Default::default()
        }
    }

    pub(crate) fn length_for(&self, method: ModbusMethod) -> Result<u16> {
        self.length.ok_or_else(|| missing(method, "length"))
    }

    pub(crate) fn coil_for(&self, method: ModbusMethod) -> Result<bool> {
        let value = self.value.as_ref().ok_or_else(|| missing(method, "value"))?;
        coil_state(value).ok_or_else(|| bad_value(method, value))
    }

    pub(crate) fn register_for(&self, method: ModbusMethod) -> Result<u16> {
        let value = self.value.as_ref().ok_or_else(|| missing(method, "value"))?;
        register_value(value).ok_or_else(|| bad_value(method, value))
    }

    pub(crate) fn coils_for(&self, method: ModbusMethod) -> Result<Vec<bool>> {
        let values = self.values.as_ref().ok_or_else(|| missing(method, "values"))?;
        values
            .iter()
            .map(|v| coil_state(v).ok_or_else(|| bad_value(method, v)))
            .collect()
    }

    pub(crate) fn registers_for(&self, method: ModbusMethod) -> Result<Vec<u16>> {
        let values = self.values.as_ref().ok_or_else(|| missing(method, "values"))?;
        values
            .iter()
            .map(|v| register_value(v).ok_or_else(|| bad_value(method, v)))
            .collect()
    }
}

fn missing(method: ModbusMethod, field: &str) -> GatewayError {
    GatewayError::invalid_params(format!("{} requires `{}`", method, field))
}

fn bad_value(method: ModbusMethod, value: &Value) -> GatewayError {
    GatewayError::invalid_params(format!("{}: unsupported value {}", method, value))
}

/// Coils take booleans or numbers (non-zero is on).
fn coil_state(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// Registers take 16-bit unsigned numbers, or booleans as 1/0.
fn register_value(value: &Value) -> Option<u16> {
    match value {
        Value::Bool(b) => Some(u16::from(*b)),
        Value::Number(n) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
        _ => None,
    }
}

/// Result of a successful transport call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MethodOutput {
    /// Coil or discrete input states.
    Bits(Vec<bool>),
    /// Holding or input register values.
    Registers(Vec<u16>),
    /// Confirmation of a write.
    Written(WriteConfirmation),
}

/// What the device accepted on a write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WriteConfirmation {
    Coil { address: u16, state: bool },
    Register { address: u16, value: u16 },
    Multiple { address: u16, length: u16 },
}
