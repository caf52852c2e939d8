use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Serialization format for envelopes on the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, the default for command clients).
    #[default]
    Json,

    /// CBOR format (compact binary).
    Cbor,
}

impl Format {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Cbor => "application/cbor",
        }
    }
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Try to auto-detect the format from the data.
///
/// Returns `Json` if the data starts with `{` or `[` (after leading
/// whitespace), otherwise `Cbor`.
pub fn detect_format(data: &[u8]) -> Format {
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => Format::Json,
        _ => Format::Cbor,
    }
}

/// Decode bytes, auto-detecting the format.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let format = detect_format(data);
    decode(data, format)
}
