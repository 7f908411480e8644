// Document state for the state stream
//
// The document tracked by a stream is a JSON-like mapping from string keys
// to arbitrary nested values. State is value-typed: cloning is deep and
// equality is structural.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// The state of the tracked document at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateData(Map<String, Value>);

impl StateData {
    /// Create a new empty state
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Create a state from a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidState(format!(
                "document state must be a JSON object, got {}",
                value_kind(&other)
            ))),
        }
    }

    /// Parse a state from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|err| Error::InvalidState(format!("invalid state JSON: {}", err)))?;
        Self::from_value(value)
    }

    /// The state as a JSON value (deep copy)
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Consume the state, returning the underlying JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set the value stored under `key`, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Whether the document has no keys
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the top-level entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for StateData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
