//! Inbound task payloads and their validation.

use crate::error::ValidationError;
use serde_json::{Map, Value};

/// A validated inbound message: a non-empty `action` plus arbitrary fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    action: String,
    fields: Map<String, Value>,
}

impl Task {
    /// Validate a raw queue payload.
    ///
    /// The payload must be a JSON object whose `action` is a string with at
    /// least one non-whitespace character. The object is kept as-is.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

        let fields = match value {
            Value::Object(fields) => fields,
            other => return Err(ValidationError::InvalidShape(json_type(&other))),
        };

        let action = match fields.get("action") {
            Some(Value::String(action)) if !action.trim().is_empty() => action.clone(),
            _ => return Err(ValidationError::MissingAction),
        };

        Ok(Self { action, fields })
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Text form of a field, empty when absent.
    pub fn field_text(&self, name: &str) -> String {
        self.field(name).map(value_text).unwrap_or_default()
    }

    /// The recipient hint, when it is a non-empty string.
    pub fn email(&self) -> Option<&str> {
        match self.field("email") {
            Some(Value::String(email)) if !email.trim().is_empty() => Some(email.trim()),
            _ => None,
        }
    }
}

/// Shorthand for [`Task::from_payload`].
pub fn validate(payload: &[u8]) -> Result<Task, ValidationError> {
    Task::from_payload(payload)
}

/// Template text for a JSON value.
///
/// Strings verbatim, numbers and booleans as displayed, null as empty,
/// arrays and objects as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
