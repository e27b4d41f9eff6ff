use async_trait::async_trait;
use serde_json::{Map, Value};

use super::context::ToolCallContext;
use crate::llm::ToolSchema;
use crate::permission::PermissionTier;

/// Uniform success/failure envelope returned by every tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolResult {
    pub success: bool,
    pub data: Map<String, Value>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Map::new(),
            error: Some(error.into()),
        }
    }

    /// Flat JSON used as the tool-observation turn content.
    pub fn to_json(&self) -> String {
        let mut map = Map::new();
        map.insert("success".to_string(), Value::Bool(self.success));
        for (k, v) in &self.data {
            map.insert(k.clone(), v.clone());
        }
        if let Some(error) = &self.error {
            map.insert("error".to_string(), Value::String(error.clone()));
        }
        Value::Object(map).to_string()
    }
}

/// One tool callable by the model.
///
/// Names are snake_case and globally unique within a registry. The schema
/// is a JSON-schema-like object (`properties` + `required`); arguments are
/// validated against it before `execute` runs.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Natural language description for model tool selection.
    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    fn permission_tier(&self) -> PermissionTier;

    /// Execute with validated parameters. Failures come back as a failed
    /// `ToolResult`, never as a panic; the loop folds them into an
    /// observation and keeps going.
    async fn execute(&self, params: Value, ctx: &ToolCallContext) -> ToolResult;

    /// Compact schema handed to providers.
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Validate `params` against the input schema. Returns the list of
    /// problems; empty means valid.
    fn validate_input(&self, params: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let schema = self.input_schema();

        let params_map = match params.as_object() {
            Some(map) => map,
            None => {
                errors.push("parameters must be an object".to_string());
                return errors;
            }
        };

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !params_map.contains_key(field) {
                    errors.push(format!("missing required field: {}", field));
                }
            }
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, value) in params_map {
                let Some(expected) = properties
                    .get(name)
                    .and_then(|p| p.get("type"))
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                if !type_matches(value, expected) {
                    errors.push(format!("field '{}' expected type '{}'", name, expected));
                }
            }
        }

        errors
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}
