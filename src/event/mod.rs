use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON encoding failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Event payload is not a JSON object")]
    NotAnObject,
}

/// One structured log record to be delivered.
///
/// Field order is preserved from construction through the wire line, so a
/// parsed line compares equal to the submitted mapping. Events are immutable
/// once submitted; the queue takes ownership.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Builds an event from a parsed JSON value, rejecting non-objects.
    pub fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(SerializationError::NotAnObject),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Encodes the event as one newline-terminated JSON object, UTF-8.
    ///
    /// This is the entire wire format: no length prefix, no framing beyond
    /// the trailing `\n`.
    pub fn encode_line(&self) -> Result<Vec<u8>, SerializationError> {
        let mut line = serde_json::to_vec(&self.fields)?;
        line.push(b'\n');
        Ok(line)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
