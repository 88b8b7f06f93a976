//! Wire envelope exchanged over the socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{ "type": ..., "payload": ... }`, the unit sent and received on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new<P: Serialize>(kind: impl Into<String>, payload: P) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Parses a received text frame. A missing payload reads as `null`.
    pub fn parse(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
