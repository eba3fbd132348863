use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::prelude::*;

/// Kind of [`Envelope`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// Publish `data` to the topic named by `rec`.
    Stream,
    /// Deliver `data` to the endpoint named by `rec`.
    Send,
    /// Anything else. Such envelopes are ignored.
    #[serde(other)]
    Unknown,
}

/// Addressed message received from an external party.
///
/// ```json
/// {"type": "stream", "rec": "plane_obc_data", "data": {"detections": 3}}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// What to do with the payload.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Recipient: a topic or an endpoint name depending on `kind`.
    pub rec: String,
    /// Payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Creates a `stream` envelope.
    pub fn stream(topic: impl Into<String>, data: Value) -> Self {
        Self {
            kind: EnvelopeKind::Stream,
            rec: topic.into(),
            data,
        }
    }

    /// Creates a `send` envelope.
    pub fn send(endpoint: impl Into<String>, data: Value) -> Self {
        Self {
            kind: EnvelopeKind::Send,
            rec: endpoint.into(),
            data,
        }
    }

    /// Parses an envelope from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes envelope into JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
