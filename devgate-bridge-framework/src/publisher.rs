//! Reply publisher for Zenoh.

use std::sync::Arc;

use devgate_common::{Format, ReplyChannel, ResponseEnvelope, Topics, encode};

use crate::error::{BridgeError, Result};

/// Publisher for sending reply envelopes to Zenoh.
///
/// Wraps a Zenoh session and routes each [`ResponseEnvelope`] to the
/// response or error key with automatic serialization.
#[derive(Clone, Debug)]
pub struct Publisher {
    session: Arc<zenoh::Session>,
    topics: Topics,
    format: Format,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(session: Arc<zenoh::Session>, topics: Topics, format: Format) -> Self {
        Self {
            session,
            topics,
            format,
        }
    }

    /// Get the resolved topics.
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Get the serialization format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Get a reference to the Zenoh session.
    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Publish a reply on the given channel.
    pub async fn reply(&self, channel: ReplyChannel, envelope: &ResponseEnvelope) -> Result<()> {
        let key = self.topics.reply(channel);
        let payload =
            encode(envelope, self.format).map_err(|e| BridgeError::Serialization(e.to_string()))?;

        self.publish_raw(key, payload).await
    }

    /// Publish raw bytes to a key (for status messages, etc.).
    pub async fn publish_raw(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.session
            .put(key, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    /// Publish a JSON value to a key.
    pub async fn publish_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish_raw(key, payload).await
    }
}
