//! Envelopes exchanged over the bus.
//!
//! Inbound commands look like:
//!
//! ```json
//! { "uniqueID": "abc", "driver": "modbus", "method": "readHoldingRegisters",
//!   "params": { "address": "10.0.0.5", "slaveId": 1, "addressOffset": 0, "length": 2 } }
//! ```
//!
//! `className` and `methodName` are accepted as aliases for `driver` and `method`.
//! Outbound envelopes carry `{ uniqueID, date, message }`, where `message` is the
//! result on the response channel and the error text on the error channel.
//! `uniqueID` is echoed back with the type it arrived with.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// Opaque correlation token chosen by the command sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationId {
    Text(String),
    Number(Number),
}

impl CorrelationId {
    /// Fresh token for a reply whose command carried none.
    pub fn generate() -> Self {
        Self::Text(generate_id())
    }

    /// Read a token out of a raw JSON value. Only strings and numbers qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => Some(Self::Number(n.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<u64> for CorrelationId {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl PartialEq<&str> for CorrelationId {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Self::Text(s) if s == other)
    }
}

/// A command received on the command channel.
///
/// Missing `driver` or `method` decode as empty names, which no driver
/// answers to; a missing `uniqueID` gets a fresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Correlation token echoed back in the reply.
    #[serde(rename = "uniqueID", default = "CorrelationId::generate")]
    pub unique_id: CorrelationId,

    /// Registered driver name (e.g. "modbus", "port").
    #[serde(alias = "className", default)]
    pub driver: String,

    /// Operation exposed by the driver.
    #[serde(alias = "methodName", default)]
    pub method: String,

    /// Raw parameters. Shaped by [`Params::try_from_value`].
    #[serde(default)]
    pub params: Value,
}

impl CommandEnvelope {
    /// Create a command with named parameters.
    pub fn new(
        unique_id: impl Into<CorrelationId>,
        driver: impl Into<String>,
        method: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            driver: driver.into(),
            method: method.into(),
            params,
        }
    }

    /// `driver.method`, as used in log lines and error messages.
    pub fn target(&self) -> String {
        format!("{}.{}", self.driver, self.method)
    }

    /// Shape the raw parameters.
    pub fn params(&self) -> Result<Params> {
        Params::try_from_value(self.params.clone())
    }
}

/// Invocation parameters: either an ordered argument list or a named object.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Params {
    /// Classify a JSON value. Anything but an array or object is rejected.
    pub fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Params::Positional(items)),
            Value::Object(map) => Ok(Params::Named(map)),
            _ => Err(Error::Envelope("invalid params format".to_string())),
        }
    }

    /// Deserialize into a typed parameter struct.
    ///
    /// A positional list holding a single object is that object passed as the
    /// only argument. Any other list fills the struct fields in order.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        let value = match self {
            Params::Named(map) => Value::Object(map),
            Params::Positional(mut items) if items.len() == 1 && items[0].is_object() => {
                items.remove(0)
            }
            Params::Positional(items) => Value::Array(items),
        };
        serde_json::from_value(value).map_err(Error::from)
    }
}

/// Outbound channel a reply is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyChannel {
    Response,
    Error,
}

/// A reply published on the response or error channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation token of the originating command.
    #[serde(rename = "uniqueID")]
    pub unique_id: CorrelationId,

    /// When the reply was produced.
    pub date: DateTime<Utc>,

    /// Result value, or the error message.
    pub message: Value,
}

impl ResponseEnvelope {
    /// Reply carrying a result.
    pub fn success(unique_id: impl Into<CorrelationId>, result: Value) -> Self {
        Self {
            unique_id: unique_id.into(),
            date: Utc::now(),
            message: result,
        }
    }

    /// Reply carrying an error message.
    pub fn failure(unique_id: impl Into<CorrelationId>, message: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            date: Utc::now(),
            message: Value::String(message.into()),
        }
    }
}

/// Fresh correlation id for replies that have no originating command.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct ReadArgs {
        address: String,
        slave_id: u8,
        #[serde(default)]
        length: Option<u16>,
    }

    #[test]
    fn test_parse_command() {
        let raw = r#"{
            "uniqueID": "abc",
            "driver": "modbus",
            "method": "readHoldingRegisters",
            "params": {"address": "10.0.0.5", "slaveId": 1, "addressOffset": 0, "length": 2}
        }"#;

        let cmd: CommandEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd.unique_id, "abc");
        assert_eq!(cmd.target(), "modbus.readHoldingRegisters");
        assert!(matches!(cmd.params().unwrap(), Params::Named(_)));
    }

    #[test]
    fn test_parse_command_with_legacy_names() {
        let raw = r#"{"uniqueID": "1", "className": "port", "methodName": "detect", "params": []}"#;

        let cmd: CommandEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd.driver, "port");
        assert_eq!(cmd.method, "detect");
        assert_eq!(cmd.params().unwrap(), Params::Positional(vec![]));
    }

    #[test]
    fn test_numeric_id_is_echoed_as_number() {
        let raw = r#"{"uniqueID": 42, "driver": "port", "method": "detect", "params": []}"#;
        let cmd: CommandEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd.unique_id, CorrelationId::from(42u64));
        assert_eq!(cmd.unique_id.to_string(), "42");

        let reply = ResponseEnvelope::success(cmd.unique_id, json!([]));
        assert_eq!(serde_json::to_value(&reply).unwrap()["uniqueID"], json!(42));
    }

    #[test]
    fn test_missing_target_and_id() {
        let cmd: CommandEnvelope = serde_json::from_str(r#"{"method": "readCoils"}"#).unwrap();
        assert_eq!(cmd.target(), ".readCoils");
        assert_eq!(cmd.unique_id.to_string().len(), 36);
    }

    #[test]
    fn test_correlation_id_from_value() {
        assert_eq!(CorrelationId::from_value(&json!("abc")), Some("abc".into()));
        assert_eq!(CorrelationId::from_value(&json!(7)), Some(CorrelationId::from(7u64)));
        assert_eq!(CorrelationId::from_value(&json!(null)), None);
        assert_eq!(CorrelationId::from_value(&json!({"id": 1})), None);
    }

    #[test]
    fn test_invalid_params_shape() {
        for value in [json!("text"), json!(42), json!(true), Value::Null] {
            let err = Params::try_from_value(value).unwrap_err();
            assert_eq!(err.to_string(), "Malformed envelope: invalid params format");
        }
    }

    #[test]
    fn test_missing_params_is_invalid() {
        let raw = r#"{"uniqueID": "1", "driver": "modbus", "method": "getConnections"}"#;
        let cmd: CommandEnvelope = serde_json::from_str(raw).unwrap();
        assert!(cmd.params().is_err());
    }

    #[test]
    fn test_named_params_into_typed() {
        let params = Params::try_from_value(json!({"address": "COM1", "slaveId": 3})).unwrap();
        let args: ReadArgs = params.into_typed().unwrap();
        assert_eq!(
            args,
            ReadArgs {
                address: "COM1".to_string(),
                slave_id: 3,
                length: None
            }
        );
    }

    #[test]
    fn test_single_object_argument() {
        let params =
            Params::try_from_value(json!([{"address": "COM1", "slaveId": 3, "length": 4}]))
                .unwrap();
        let args: ReadArgs = params.into_typed().unwrap();
        assert_eq!(args.length, Some(4));
    }

    #[test]
    fn test_positional_fills_fields_in_order() {
        let params = Params::try_from_value(json!(["10.0.0.5", 7, 10])).unwrap();
        let args: ReadArgs = params.into_typed().unwrap();
        assert_eq!(args.address, "10.0.0.5");
        assert_eq!(args.slave_id, 7);
        assert_eq!(args.length, Some(10));
    }

    #[test]
    fn test_response_wire_shape() {
        let reply = ResponseEnvelope::success("abc", json!([1, 2]));
        let value = serde_json::to_value(&reply).unwrap();

        assert_eq!(value["uniqueID"], "abc");
        assert_eq!(value["message"], json!([1, 2]));
        assert!(value["date"].is_string());

        let failure = ResponseEnvelope::failure("abc", "Device not connected");
        assert_eq!(failure.message, json!("Device not connected"));
    }

    #[test]
    fn test_generate_id_is_unique() {
        assert_ne!(generate_id(), generate_id());
    }
}
