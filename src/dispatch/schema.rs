//! Declarative event payload schemas
//!
//! Each inbound event declares its fields up front: required or optional,
//! expected kind, and for enumerated fields a closed set of legal values. One
//! generic routine validates a payload against the declaration before any
//! handler runs, so handlers never see malformed arguments.

use crate::error::LobbyError;
use serde_json::Value;

/// Expected JSON kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Uint,
    Bool,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Uint => value.as_u64().is_some(),
            FieldKind::Bool => value.is_boolean(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Uint => "an unsigned integer",
            FieldKind::Bool => "a boolean",
        }
    }
}

/// Declaration of a single payload field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Closed set of legal values for enumerated string fields
    pub allowed: Option<&'static [&'static str]>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            allowed: None,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            allowed: None,
        }
    }

    pub const fn allowed(mut self, values: &'static [&'static str]) -> Self {
        self.allowed = Some(values);
        self
    }
}

/// Declared payload shape for one event
#[derive(Debug, Clone, Copy)]
pub struct EventSchema {
    pub fields: &'static [FieldSpec],
}

impl EventSchema {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    /// Validate a payload against this schema. The whole event fails on the
    /// first violation; nothing downstream runs on a malformed payload.
    pub fn validate(&self, payload: &Value) -> Result<(), LobbyError> {
        if self.fields.is_empty() {
            return Ok(());
        }
        let object = match payload {
            Value::Object(object) => object,
            Value::Null => {
                if self.fields.iter().any(|f| f.required) {
                    return Err(LobbyError::Validation {
                        reason: "Payload must be an object".to_string(),
                    });
                }
                return Ok(());
            }
            _ => {
                return Err(LobbyError::Validation {
                    reason: "Payload must be an object".to_string(),
                })
            }
        };

        for field in self.fields {
            let value = match object.get(field.name) {
                Some(Value::Null) | None => {
                    if field.required {
                        return Err(LobbyError::Validation {
                            reason: format!("Missing required field '{}'", field.name),
                        });
                    }
                    continue;
                }
                Some(value) => value,
            };

            if !field.kind.matches(value) {
                return Err(LobbyError::Validation {
                    reason: format!("Field '{}' must be {}", field.name, field.kind.describe()),
                });
            }

            if let Some(allowed) = field.allowed {
                let text = value.as_str().unwrap_or_default();
                if !allowed.contains(&text) {
                    return Err(LobbyError::Validation {
                        reason: format!(
                            "Field '{}' must be one of: {}",
                            field.name,
                            allowed.join(", ")
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Extract a validated string field.
pub fn str_field<'a>(payload: &'a Value, name: &str) -> Result<&'a str, LobbyError> {
    payload
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| LobbyError::Validation {
            reason: format!("Missing required field '{}'", name),
        })
}

/// Extract a validated unsigned integer field.
pub fn uint_field(payload: &Value, name: &str) -> Result<u64, LobbyError> {
    payload
        .get(name)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| LobbyError::Validation {
            reason: format!("Missing required field '{}'", name),
        })
}

/// Extract an optional string field. Absent and null both read as `None`.
pub fn opt_str_field<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload.get(name).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static TEST_SCHEMA: EventSchema = EventSchema::new(&[
        FieldSpec::required("id", FieldKind::Uint),
        FieldSpec::required("team", FieldKind::String).allowed(&["red", "blu"]),
        FieldSpec::optional("password", FieldKind::String),
    ]);

    #[test]
    fn test_valid_payload() {
        let payload = json!({"id": 1, "team": "red"});
        assert!(TEST_SCHEMA.validate(&payload).is_ok());

        let payload = json!({"id": 1, "team": "blu", "password": "s3cret"});
        assert!(TEST_SCHEMA.validate(&payload).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let err = TEST_SCHEMA.validate(&json!({"team": "red"})).unwrap_err();
        assert!(matches!(err, LobbyError::Validation { .. }));
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = TEST_SCHEMA
            .validate(&json!({"id": null, "team": "red"}))
            .unwrap_err();
        assert!(err.to_string().contains("'id'"));
        // Optional fields may be null
        assert!(TEST_SCHEMA
            .validate(&json!({"id": 1, "team": "red", "password": null}))
            .is_ok());
    }

    #[test]
    fn test_wrong_kind() {
        let err = TEST_SCHEMA
            .validate(&json!({"id": "seven", "team": "red"}))
            .unwrap_err();
        assert!(err.to_string().contains("unsigned integer"));

        // Negative numbers are not uints
        let err = TEST_SCHEMA
            .validate(&json!({"id": -3, "team": "red"}))
            .unwrap_err();
        assert!(matches!(err, LobbyError::Validation { .. }));
    }

    #[test]
    fn test_closed_value_set() {
        let err = TEST_SCHEMA
            .validate(&json!({"id": 1, "team": "green"}))
            .unwrap_err();
        assert!(err.to_string().contains("red, blu"));
    }

    #[test]
    fn test_non_object_payload() {
        assert!(TEST_SCHEMA.validate(&json!([1, 2])).is_err());
        assert!(TEST_SCHEMA.validate(&Value::Null).is_err());

        // A schema with no required fields accepts null
        static EMPTY: EventSchema = EventSchema::new(&[]);
        assert!(EMPTY.validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let payload = json!({"id": 1, "team": "red", "extra": true});
        assert!(TEST_SCHEMA.validate(&payload).is_ok());
    }
}
