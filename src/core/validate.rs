//! Structural validation of YAML documents
//!
//! Documents are checked on the untyped [`serde_yaml::Value`] tree before
//! typed deserialization, so every problem can be reported with the path of
//! the offending field rather than only the first one serde trips over.

use std::sync::OnceLock;

use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::error::{FieldError, ValidationError};

/// Parse YAML text into an untyped tree
pub fn parse_document(content: &str, document: &str) -> Result<Value, ValidationError> {
    serde_yaml::from_str(content).map_err(|e| ValidationError::Syntax {
        document: document.to_string(),
        error: e.to_string(),
    })
}

/// Join a parent path and a key into a field path
pub fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Human-readable name of a YAML value's type
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Whether a value is usable as an identifier in paths and image tags
pub fn is_identifier(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap())
        .is_match(value)
}

/// Collects field errors while walking a YAML tree
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    /// Create an empty validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    /// Record a type mismatch
    pub fn mistyped(&mut self, path: impl Into<String>, expected: &str, got: &Value) {
        self.error(path, format!("expected {expected}, got {}", type_name(got)));
    }

    /// A required string field; records an error when missing or mistyped
    pub fn required_string<'v>(
        &mut self,
        map: &'v Mapping,
        parent: &str,
        key: &str,
    ) -> Option<&'v str> {
        match map.get(key) {
            None | Some(Value::Null) => {
                self.error(field_path(parent, key), "missing required field");
                None
            }
            Some(value) => self.string_value(value, &field_path(parent, key)),
        }
    }

    /// An optional string field; records an error when mistyped
    pub fn optional_string<'v>(
        &mut self,
        map: &'v Mapping,
        parent: &str,
        key: &str,
    ) -> Option<&'v str> {
        match map.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => self.string_value(value, &field_path(parent, key)),
        }
    }

    /// An optional mapping field; records an error when mistyped
    pub fn optional_mapping<'v>(
        &mut self,
        map: &'v Mapping,
        parent: &str,
        key: &str,
    ) -> Option<&'v Mapping> {
        match map.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Mapping(inner)) => Some(inner),
            Some(other) => {
                self.mistyped(field_path(parent, key), "a mapping", other);
                None
            }
        }
    }

    /// An optional list field; records an error when mistyped
    pub fn optional_sequence<'v>(
        &mut self,
        map: &'v Mapping,
        parent: &str,
        key: &str,
    ) -> Option<&'v [Value]> {
        match map.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Sequence(items)) => Some(items),
            Some(other) => {
                self.mistyped(field_path(parent, key), "a list", other);
                None
            }
        }
    }

    /// An optional list of strings; mistyped items are recorded and skipped
    pub fn string_list<'v>(
        &mut self,
        map: &'v Mapping,
        parent: &str,
        key: &str,
    ) -> Vec<(String, &'v str)> {
        let Some(items) = self.optional_sequence(map, parent, key) else {
            return Vec::new();
        };

        let base = field_path(parent, key);
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let path = format!("{base}[{i}]");
                self.string_value(item, &path).map(|s| (path, s))
            })
            .collect()
    }

    /// Warn about keys that are not part of the schema
    pub fn warn_unknown_keys(map: &Mapping, parent: &str, known: &[&str]) {
        for key in map.keys() {
            match key.as_str() {
                Some(name) if known.contains(&name) => {}
                Some(name) => {
                    tracing::warn!("Ignoring unknown field '{}'", field_path(parent, name));
                }
                None => tracing::warn!("Ignoring non-string key in '{parent}'"),
            }
        }
    }

    /// Turn the collected errors into a result
    pub fn finish(self, document: &str) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Fields {
                document: document.to_string(),
                errors: self.errors,
            })
        }
    }

    fn string_value<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v str> {
        if let Value::String(s) = value {
            Some(s.as_str())
        } else {
            self.mistyped(path, "a string", value);
            None
        }
    }
}
