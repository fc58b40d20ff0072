//! Structured view over device API responses
//!
//! Every device endpoint answers with a flat JSON object carrying at least a
//! `success` flag. Fields are looked up leniently: a field that is absent or of
//! the wrong type is reported as `None` rather than silently defaulted, and the
//! `require_*` accessors turn that into a [`HandyError::Projection`].

use serde_json::{Map, Value};

use crate::error::{HandyError, Result};

/// A parsed device response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    fields: Map<String, Value>,
    malformed: bool,
}

impl Response {
    /// Parse a raw response body.
    ///
    /// Never fails: a body that is not a JSON object yields a malformed
    /// response with no fields, which downstream validation rejects.
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(fields)) => Self {
                fields,
                malformed: false,
            },
            _ => Self {
                fields: Map::new(),
                malformed: true,
            },
        }
    }

    /// Whether the body could not be decoded as a JSON object
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// The `success` flag, if present
    pub fn success(&self) -> Option<bool> {
        self.get_bool("success")
    }

    /// Shorthand for `success() == Some(true)`
    pub fn is_success(&self) -> bool {
        self.success() == Some(true)
    }

    /// The `error` message, if present
    pub fn error_message(&self) -> Option<&str> {
        self.get_str("error")
    }

    /// Check the success flag, mapping failures to [`HandyError::Device`]
    pub fn validate(&self) -> Result<()> {
        match self.success() {
            None => Err(HandyError::Device("Invalid response".to_string())),
            Some(false) => Err(HandyError::Device(
                self.error_message().unwrap_or("Unknown error").to_string(),
            )),
            Some(true) => Ok(()),
        }
    }

    /// Raw access to a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Integer field; numeric strings and integral floats are accepted
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.fields.get(field)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float field; numeric strings are accepted
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field)?.as_str()
    }

    /// Boolean field; `"true"`/`"false"` strings are accepted
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        match self.fields.get(field)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn require_i64(&self, field: &str) -> Result<i64> {
        self.get_i64(field)
            .ok_or_else(|| HandyError::missing_field(field))
    }

    pub fn require_f64(&self, field: &str) -> Result<f64> {
        self.get_f64(field)
            .ok_or_else(|| HandyError::missing_field(field))
    }

    pub fn require_str(&self, field: &str) -> Result<&str> {
        self.get_str(field)
            .ok_or_else(|| HandyError::missing_field(field))
    }

    pub fn require_bool(&self, field: &str) -> Result<bool> {
        self.get_bool(field)
            .ok_or_else(|| HandyError::missing_field(field))
    }

    /// Pretty-printed body, for response logging
    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&self.fields).unwrap_or_default()
    }
}
