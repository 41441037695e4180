//! Wire-format message envelope.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Event kinds understood by the gateway. Any other value is relayed as-is.
pub struct EventName;

impl EventName {
    pub const MESSAGE: &'static str = "message";
    pub const CLOSE: &'static str = "close";
}

fn default_event() -> String {
    EventName::MESSAGE.to_string()
}

/// Clients may send anything here; it is overwritten before relay, so only
/// a string survives decoding.
fn lenient_issuer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(issuer) => issuer,
        _ => String::new(),
    })
}

/// One JSON frame, in either direction.
///
/// `issuer_id` is accepted from clients but always replaced with the
/// sender's connection ID before the message goes anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "default_event")]
    pub event: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, deserialize_with = "lenient_issuer")]
    pub issuer_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("{0:?} event without a channel")]
    MissingChannel(String),
}

impl Message {
    pub fn new(channel: impl Into<String>, data: Value) -> Self {
        Self {
            event: default_event(),
            channel: channel.into(),
            data,
            issuer_id: String::new(),
        }
    }

    /// Decode and validate the envelope of a single frame.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_slice(frame)?;
        if !value.is_object() {
            return Err(FrameError::NotAnObject);
        }

        let message: Message = serde_json::from_value(value)?;
        if !message.is_close() && message.channel.is_empty() {
            return Err(FrameError::MissingChannel(message.event));
        }
        Ok(message)
    }

    pub fn is_close(&self) -> bool {
        self.event == EventName::CLOSE
    }
}
