use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::prelude::*;

/// Bus message.
///
/// An immutable JSON document shared between all subscribers of a topic. Cloning is cheap.
#[derive(Clone, Debug, PartialEq)]
pub struct Message(Arc<Value>);

impl Message {
    /// Creates a message from a JSON value.
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    /// Serializes `value` into a message.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Deserializes message into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(self.0.as_ref()).map_err(Error::from)
    }

    /// Underlying JSON value.
    #[inline]
    pub fn value(&self) -> &Value {
        self.0.as_ref()
    }

    /// Serializes message into JSON bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_string().into_bytes()
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.0.as_ref(), f)
    }
}
