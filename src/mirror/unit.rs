//! Config unit model and its store encoding.
//!
//! Units are stored as JSON. The encoder used for writes is the same one the
//! watch path decodes with, so a unit echoed back through the change feed is
//! read as the identical value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mirror::error::{DecodeError, MirrorError};

/// A single named configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUnit {
    /// Unique name; the last segment of the unit's store key.
    #[serde(default)]
    pub name: String,

    /// Human readable display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cn_name: String,

    /// Free-form type hint for UIs (e.g. "string", "array").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value_type: String,

    /// The payload. Required on the wire, `null` included.
    pub value: Value,

    /// Allowed values, when the unit is an enumeration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub require: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub show_area: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ConfigUnit {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            cn_name: String::new(),
            value_type: String::new(),
            value: value.into(),
            options: Vec::new(),
            require: false,
            show_area: String::new(),
        }
    }

    pub fn with_cn_name(mut self, cn_name: impl Into<String>) -> Self {
        self.cn_name = cn_name.into();
        self
    }

    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = value_type.into();
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn required(mut self) -> Self {
        self.require = true;
        self
    }

    /// The value as a string slice, when it is a JSON string.
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Check that the unit can be persisted.
    pub fn validate(&self) -> Result<(), MirrorError> {
        validate_name(&self.name)
    }

    /// Serialize to the store representation.
    pub fn encode(&self) -> Result<String, MirrorError> {
        serde_json::to_string(self).map_err(|source| MirrorError::Encode {
            name: self.name.clone(),
            source,
        })
    }

    /// Parse a store payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }
        let unit: ConfigUnit = serde_json::from_slice(payload)?;
        if unit.name.is_empty() {
            return Err(DecodeError::MissingName);
        }
        Ok(unit)
    }
}

/// Characters that would split a store key or an admin API path segment.
const RESERVED: [char; 4] = ['/', '?', '#', '%'];

/// A name must be non-empty and usable as a single key and URL path segment.
pub fn validate_name(name: &str) -> Result<(), MirrorError> {
    if name.is_empty() {
        return Err(MirrorError::Validation("config name can not be empty".to_string()));
    }
    if name.contains(RESERVED) {
        return Err(MirrorError::Validation(format!(
            "config name {name:?} must not contain any of {RESERVED:?}"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(MirrorError::Validation(format!(
            "config name {name:?} contains control characters"
        )));
    }
    Ok(())
}
