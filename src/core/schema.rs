use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::core::constants::MAX_COLLECTION_NAME_LEN;
use crate::core::errors::*;

pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::CollectionNameEmpty);
    }

    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(Error::CollectionNameTooLong);
    }

    let first = name.chars().next().ok_or(Error::CollectionNameEmpty)?;
    if !first.is_alphabetic() && first != '_' {
        return Err(Error::CollectionNameInvalid);
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(Error::CollectionNameInvalid);
    }

    Ok(())
}

/// Validated shape for documents in a registered model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, Schema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
}

impl ValueType {
    fn matches(self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Object => value.is_object(),
            ValueType::Array => value.is_array(),
            ValueType::Null => value.is_null(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::Null => "null",
        }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a document against this schema.
    pub fn validate(&self, value: &Value) -> Result<()> {
        self.validate_at(value, "")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<()> {
        if let Some(expected) = self.value_type {
            if !expected.matches(value) {
                return Err(fail(path, format!("expected {}", expected.name())));
            }
        }

        if let Some(required) = &self.required {
            let map = value.as_object();
            for field in required {
                let present = map.map(|m| m.contains_key(field)).unwrap_or(false);
                if !present {
                    return Err(fail(path, format!("missing required field '{}'", field)));
                }
            }
        }

        if let (Some(props), Some(map)) = (&self.properties, value.as_object()) {
            for (field, schema) in props {
                if let Some(v) = map.get(field) {
                    schema.validate_at(v, &child(path, field))?;
                }
            }
        }

        if let (Some(items), Some(arr)) = (&self.items, value.as_array()) {
            for (i, item) in arr.iter().enumerate() {
                items.validate_at(item, &child(path, &i.to_string()))?;
            }
        }

        if let Some(min) = self.minimum {
            if let Some(n) = value.as_f64() {
                if n < min {
                    return Err(fail(path, format!("{} is below minimum {}", n, min)));
                }
            }
        }

        if let Some(max) = self.maximum {
            if let Some(n) = value.as_f64() {
                if n > max {
                    return Err(fail(path, format!("{} is above maximum {}", n, max)));
                }
            }
        }

        let len = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            _ => None,
        };
        if let (Some(min), Some(len)) = (self.min_length, len) {
            if len < min {
                return Err(fail(path, format!("length {} is below minLength {}", len, min)));
            }
        }
        if let (Some(max), Some(len)) = (self.max_length, len) {
            if len > max {
                return Err(fail(path, format!("length {} is above maxLength {}", len, max)));
            }
        }

        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                return Err(fail(path, "value is not one of the allowed values".to_string()));
            }
        }

        Ok(())
    }
}

fn fail(path: &str, reason: String) -> Error {
    let path = if path.is_empty() { "(root)" } else { path };
    Error::ValidationFailed {
        path: path.to_string(),
        reason,
    }
}

fn child(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}
