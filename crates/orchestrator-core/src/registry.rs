//! Per job-class input/result schema and assignment timeout table (C1).
//!
//! Registered at startup from configuration; immutable thereafter — there is
//! no method on `PayloadRegistry` that mutates it after `new`.

use std::collections::HashMap;
use std::time::Duration;

use jsonschema::JSONSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// One job class's schema set and timeout.
pub struct ClassDefinition {
    pub input_schema: JSONSchema,
    pub result_schema: Option<JSONSchema>,
    pub timeout: Duration,
}

/// A single job class definition as read from configuration, before schema
/// compilation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassSpec {
    pub class: String,
    pub input_schema: Value,
    #[serde(default)]
    pub result_schema: Option<Value>,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
}

/// Reads the registry's class manifest: a JSON array of [`ClassSpec`]
/// entries, one per job class (spec §4.1 "Payload Registry").
pub fn load_class_specs_from_file(path: &str) -> Result<Vec<ClassSpec>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read class manifest {}: {}", path, e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| Error::config(format!("failed to parse class manifest {}: {}", path, e)))
}

pub struct PayloadRegistry {
    classes: HashMap<String, ClassDefinition>,
}

const DEFAULT_TIMEOUT_MINUTES: u64 = 60;

impl PayloadRegistry {
    /// Compile every class's schemas once at startup. A malformed schema
    /// fails registry construction rather than surfacing lazily on first
    /// use.
    pub fn new(specs: Vec<ClassSpec>) -> Result<Self> {
        let mut classes = HashMap::with_capacity(specs.len());

        for spec in specs {
            let input_schema = JSONSchema::compile(&spec.input_schema).map_err(|e| {
                Error::config(format!(
                    "invalid input schema for class {}: {}",
                    spec.class, e
                ))
            })?;

            let result_schema = spec
                .result_schema
                .map(|schema| {
                    JSONSchema::compile(&schema).map_err(|e| {
                        Error::config(format!(
                            "invalid result schema for class {}: {}",
                            spec.class, e
                        ))
                    })
                })
                .transpose()?;

            classes.insert(
                spec.class,
                ClassDefinition {
                    input_schema,
                    result_schema,
                    timeout: Duration::from_secs(
                        spec.timeout_minutes.max(1) * 60,
                    ),
                },
            );
        }

        Ok(Self { classes })
    }

    fn class_def(&self, class: &str) -> Result<&ClassDefinition> {
        self.classes
            .get(class)
            .ok_or_else(|| Error::validation(format!("unknown job class: {}", class)))
    }

    /// Validate a submitted input payload and return its normalized form
    /// (spec §4.1: `validateInput(class, payload) -> normalized payload or
    /// VALIDATION_ERROR`). Unknown job classes are a validation error, not a
    /// 500. Validation runs against the normalized payload so whitespace/key
    /// order never affects whether a payload passes.
    pub fn validate_input(&self, class: &str, payload: &Value) -> Result<Value> {
        let def = self.class_def(class)?;
        let normalized = crate::fingerprint::normalize(payload);
        validate_against(&def.input_schema, &normalized)?;
        Ok(normalized)
    }

    /// Validate a worker-submitted result payload. No schema registered for
    /// the class means any payload is accepted.
    pub fn validate_result(&self, class: &str, payload: &Value) -> Result<()> {
        let def = self.class_def(class)?;
        match &def.result_schema {
            Some(schema) => validate_against(schema, payload),
            None => Ok(()),
        }
    }

    pub fn timeout(&self, class: &str) -> Result<Duration> {
        Ok(self.class_def(class)?.timeout)
    }
}

fn validate_against(schema: &JSONSchema, payload: &Value) -> Result<()> {
    schema.validate(payload).map_err(|errors| {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        Error::validation(messages.join("; "))
    })
}

pub fn default_timeout_minutes() -> u64 {
    DEFAULT_TIMEOUT_MINUTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_spec() -> ClassSpec {
        ClassSpec {
            class: "TEST".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"id": {"type": "number"}},
                "required": ["id"],
                "additionalProperties": false,
            }),
            result_schema: Some(json!({
                "type": "object",
                "properties": {"ok": {"type": "boolean"}},
                "required": ["ok"],
            })),
            timeout_minutes: 30,
        }
    }

    #[test]
    fn accepts_a_conforming_payload() {
        let registry = PayloadRegistry::new(vec![test_spec()]).unwrap();
        assert!(registry.validate_input("TEST", &json!({"id": 7})).is_ok());
    }

    #[test]
    fn rejects_unknown_fields() {
        let registry = PayloadRegistry::new(vec![test_spec()]).unwrap();
        let result = registry.validate_input("TEST", &json!({"id": 7, "extra": true}));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_class() {
        let registry = PayloadRegistry::new(vec![test_spec()]).unwrap();
        assert!(registry.validate_input("NOPE", &json!({})).is_err());
    }

    #[test]
    fn missing_result_schema_accepts_any_payload() {
        let mut spec = test_spec();
        spec.result_schema = None;
        let registry = PayloadRegistry::new(vec![spec]).unwrap();
        assert!(registry
            .validate_result("TEST", &json!({"anything": "goes"}))
            .is_ok());
    }

    #[test]
    fn result_schema_is_enforced_when_present() {
        let registry = PayloadRegistry::new(vec![test_spec()]).unwrap();
        assert!(registry.validate_result("TEST", &json!({"ok": true})).is_ok());
        assert!(registry.validate_result("TEST", &json!({"ok": "yes"})).is_err());
    }

    #[test]
    fn timeout_reflects_configured_value() {
        let registry = PayloadRegistry::new(vec![test_spec()]).unwrap();
        assert_eq!(registry.timeout("TEST").unwrap(), Duration::from_secs(30 * 60));
    }
}
