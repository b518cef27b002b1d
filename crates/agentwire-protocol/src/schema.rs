//! Output schemas for structured results
//!
//! [`JsonSchema`] builds the document passed with `--json-schema` and
//! compiles it once as a draft 2020-12 validator, so every keyword the
//! caller writes is enforced on the structured payload.

use crate::error::{ProtocolError, Result};
use jsonschema::Validator;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;

/// An output schema and its compiled validator
#[derive(Clone)]
pub struct JsonSchema {
    value: Value,
    compiled: std::result::Result<Arc<Validator>, String>,
}

impl JsonSchema {
    fn compile(value: Value) -> Self {
        let compiled = jsonschema::draft202012::options()
            .build(&value)
            .map(Arc::new)
            .map_err(|e| e.to_string());
        Self { value, compiled }
    }

    /// Object schema with the given property schemas and required keys
    ///
    /// Property schemas that do not compile are reported by [`check`](Self::check)
    /// and by every [`validate`](Self::validate) call.
    ///
    /// ```
    /// use agentwire_protocol::schema::JsonSchema;
    /// use serde_json::json;
    ///
    /// let schema = JsonSchema::of_object(
    ///     [("answer", json!({"type": "number"})), ("explanation", json!({"type": "string"}))],
    ///     ["answer", "explanation"],
    /// );
    /// assert_eq!(schema.to_value()["required"][1], "explanation");
    /// assert!(schema.check().is_ok());
    /// ```
    pub fn of_object<P, K, R, S>(properties: P, required: R) -> Self
    where
        P: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let properties: Map<String, Value> = properties
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();
        let required: Vec<String> = required.into_iter().map(Into::into).collect();

        Self::compile(json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }))
    }

    /// Wrap and compile an existing schema document
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ProtocolError::InvalidMessage(
                "JSON schema must be an object".into(),
            ));
        }
        let schema = Self::compile(value);
        schema.check()?;
        Ok(schema)
    }

    /// Whether the schema document compiled
    pub fn check(&self) -> Result<()> {
        match &self.compiled {
            Ok(_) => Ok(()),
            Err(e) => Err(ProtocolError::InvalidMessage(format!("invalid JSON schema: {e}"))),
        }
    }

    /// The schema document
    pub fn to_value(&self) -> Value {
        self.value.clone()
    }

    /// Borrow the schema document
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Validate a payload, collecting every violation
    pub fn validate(&self, instance: &Value) -> Result<()> {
        let validator = match &self.compiled {
            Ok(validator) => validator,
            Err(e) => {
                return Err(ProtocolError::InvalidMessage(format!("invalid JSON schema: {e}")));
            }
        };
        let errors: Vec<String> = validator
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::SchemaViolation(errors))
        }
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("value", &self.value)
            .field("compiled", &self.compiled.is_ok())
            .finish()
    }
}

impl PartialEq for JsonSchema {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// Compile `schema` and validate `instance` against it
pub fn validate(schema: &Value, instance: &Value) -> Result<()> {
    JsonSchema::from_value(schema.clone())?.validate(instance)
}
