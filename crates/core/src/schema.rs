//! Tool input schemas and argument validation.
//!
//! Schemas use the JSON-Schema object shape peers already advertise
//! (`type`, `properties`, `required`) but only the structural subset the
//! protocol needs: required fields and per-field JSON types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Errors raised when arguments do not satisfy an input schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("arguments must be an object, got {found}")]
    NotAnObject { found: FieldType },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid type for field '{field}': expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: FieldType,
    },
}

/// JSON value types a field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl FieldType {
    /// The most specific type describing `value`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Integers are numbers; everything else must match exactly.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, FieldType::of(value)) {
            (Self::Number, Self::Integer) => true,
            (expected, found) => expected == found,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    pub fn new(field_type: FieldType, description: impl Into<String>) -> Self {
        Self {
            field_type,
            description: Some(description.into()),
            default: None,
            items: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_items(mut self, items: PropertySchema) -> Self {
        self.items = Some(Box::new(items));
        self
    }
}

fn object_type() -> String {
    "object".to_string()
}

/// Input schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::object()
    }
}

impl InputSchema {
    /// An object schema with no fields.
    pub fn object() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.property(name, PropertySchema::new(FieldType::String, description))
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.property(name, PropertySchema::new(FieldType::Integer, description))
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.property(name, PropertySchema::new(FieldType::Boolean, description))
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    /// Check `arguments` against this schema.
    ///
    /// `null` is treated as an empty object. Fields the schema does not
    /// declare are accepted as-is.
    pub fn validate(&self, arguments: &Value) -> Result<(), SchemaError> {
        let empty = Map::new();
        let fields = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(SchemaError::NotAnObject {
                    found: FieldType::of(other),
                })
            }
        };

        for name in &self.required {
            if !fields.contains_key(name) {
                return Err(SchemaError::MissingField {
                    field: name.clone(),
                });
            }
        }

        for (name, value) in fields {
            if let Some(property) = self.properties.get(name) {
                if !property.field_type.accepts(value) {
                    return Err(SchemaError::TypeMismatch {
                        field: name.clone(),
                        expected: property.field_type,
                        found: FieldType::of(value),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_schema() -> InputSchema {
        InputSchema::object()
            .string("text", "Text to echo back")
            .integer("repeat", "How many times")
            .required("text")
    }

    #[test]
    fn test_valid_arguments() {
        let schema = echo_schema();
        assert!(schema.validate(&json!({"text": "hi"})).is_ok());
        assert!(schema.validate(&json!({"text": "hi", "repeat": 2})).is_ok());
        // Undeclared fields pass through
        assert!(schema.validate(&json!({"text": "hi", "extra": true})).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let err = echo_schema().validate(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), "missing required field: text");

        let err = echo_schema().validate(&Value::Null).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField {
                field: "text".to_string()
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let err = echo_schema()
            .validate(&json!({"text": "hi", "repeat": "twice"}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid type for field 'repeat': expected integer, got string"
        );

        let err = echo_schema()
            .validate(&json!({"text": "hi", "repeat": 1.5}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { found: FieldType::Number, .. }));
    }

    #[test]
    fn test_number_accepts_integer() {
        let schema = InputSchema::object()
            .property("limit", PropertySchema::new(FieldType::Number, "Limit"));
        assert!(schema.validate(&json!({"limit": 3})).is_ok());
        assert!(schema.validate(&json!({"limit": 3.5})).is_ok());
    }

    #[test]
    fn test_non_object_arguments() {
        let err = echo_schema().validate(&json!(["hi"])).unwrap_err();
        assert_eq!(err.to_string(), "arguments must be an object, got array");
    }

    #[test]
    fn test_schema_wire_shape() {
        let schema = InputSchema::object()
            .string("query", "Search query")
            .property(
                "num_results",
                PropertySchema::new(FieldType::Integer, "Number of results").with_default(json!(10)),
            )
            .required("query");

        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["required"], json!(["query"]));
        assert_eq!(value["properties"]["num_results"]["default"], 10);

        let parsed: InputSchema = serde_json::from_value(json!({
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        }))
        .unwrap();
        assert_eq!(parsed.schema_type, "object");
        assert_eq!(parsed.required, vec!["text"]);
    }
}
