//! JSON schema validation of plan documents.
//!
//! The schema is generated from the [`Plan`] shape by `schemars` once per
//! process and shared by reference. Validation walks the raw document against
//! it and collects every violation instead of stopping at the first one.

use schemars::schema_for;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::error;

use super::model::Plan;

static PLAN_SCHEMA: LazyLock<PlanSchema> = LazyLock::new(PlanSchema::generate);

/// A single schema or validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value.
    pub location: String,
    /// What is wrong with it.
    pub message: String,
}

impl SchemaViolation {
    /// Creates a violation at the given location.
    #[must_use]
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            location: if location.is_empty() { String::from("/") } else { location },
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// The plan document schema.
#[derive(Debug)]
pub struct PlanSchema {
    root: Value,
    /// Set when the schema could not be generated; every document is rejected.
    failure: Option<String>,
}

impl PlanSchema {
    /// Returns the process-wide schema.
    #[must_use]
    pub fn global() -> &'static Self {
        &PLAN_SCHEMA
    }

    fn generate() -> Self {
        Self::from_generated(serde_json::to_value(schema_for!(Plan)))
    }

    fn from_generated(generated: serde_json::Result<Value>) -> Self {
        match generated {
            Ok(root) => Self { root, failure: None },
            Err(e) => {
                error!("Failed to generate the plan schema: {e}");
                Self {
                    root: Value::Bool(false),
                    failure: Some(e.to_string()),
                }
            }
        }
    }

    /// Returns the schema as JSON.
    #[must_use]
    pub const fn as_json(&self) -> &Value {
        &self.root
    }

    /// Validates a document and returns every violation found.
    #[must_use]
    pub fn validate(&self, document: &Value) -> Vec<SchemaViolation> {
        if let Some(failure) = &self.failure {
            return vec![SchemaViolation::new("/", format!("plan schema is unavailable: {failure}"))];
        }
        let mut violations = Vec::new();
        self.check(&self.root, document, "", &mut violations);
        violations
    }

    fn check(&self, schema: &Value, value: &Value, location: &str, out: &mut Vec<SchemaViolation>) {
        let rules = match schema {
            Value::Bool(true) => return,
            Value::Bool(false) => {
                out.push(SchemaViolation::new(location, "value is not allowed here"));
                return;
            }
            Value::Object(rules) => rules,
            _ => return,
        };

        if let Some(target) = rules.get("$ref").and_then(Value::as_str) {
            match self.resolve(target) {
                Some(resolved) => self.check(resolved, value, location, out),
                None => out.push(SchemaViolation::new(
                    location,
                    format!("unresolvable schema reference '{target}'"),
                )),
            }
        }

        if let Some(all) = rules.get("allOf").and_then(Value::as_array) {
            for sub in all {
                self.check(sub, value, location, out);
            }
        }

        for keyword in ["anyOf", "oneOf"] {
            if let Some(options) = rules.get(keyword).and_then(Value::as_array) {
                let matched = options.iter().any(|sub| {
                    let mut scratch = Vec::new();
                    self.check(sub, value, location, &mut scratch);
                    scratch.is_empty()
                });
                if !matched {
                    out.push(SchemaViolation::new(location, "value does not match any allowed shape"));
                }
            }
        }

        if let Some(expected) = rules.get("type")
            && !type_matches(expected, value)
        {
            out.push(SchemaViolation::new(
                location,
                format!("expected {}, found {}", describe_type(expected), kind_of(value)),
            ));
            return;
        }

        if let Some(allowed) = rules.get("enum").and_then(Value::as_array)
            && !allowed.contains(value)
        {
            out.push(SchemaViolation::new(location, format!("value {value} is not one of the allowed values")));
        }

        Self::check_number(rules, value, location, out);

        match value {
            Value::Object(fields) => self.check_object(rules, fields, location, out),
            Value::Array(items) => {
                if let Some(item_schema) = rules.get("items") {
                    for (i, item) in items.iter().enumerate() {
                        self.check(item_schema, item, &format!("{location}/{i}"), out);
                    }
                }
            }
            _ => {}
        }
    }

    fn check_object(
        &self,
        rules: &Map<String, Value>,
        fields: &Map<String, Value>,
        location: &str,
        out: &mut Vec<SchemaViolation>,
    ) {
        if let Some(required) = rules.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    out.push(SchemaViolation::new(
                        location,
                        format!("missing required property '{name}'"),
                    ));
                }
            }
        }

        let properties = rules.get("properties").and_then(Value::as_object);

        for (name, field) in fields {
            let field_location = format!("{location}/{name}");
            match properties.and_then(|p| p.get(name)) {
                Some(sub) => self.check(sub, field, &field_location, out),
                None => match rules.get("additionalProperties") {
                    Some(Value::Bool(false)) => out.push(SchemaViolation::new(
                        field_location,
                        format!("unknown property '{name}'"),
                    )),
                    Some(extra @ Value::Object(_)) => self.check(extra, field, &field_location, out),
                    _ => {}
                },
            }
        }
    }

    fn check_number(rules: &Map<String, Value>, value: &Value, location: &str, out: &mut Vec<SchemaViolation>) {
        let Some(number) = value.as_f64() else {
            return;
        };

        if let Some(minimum) = rules.get("minimum").and_then(Value::as_f64)
            && number < minimum
        {
            out.push(SchemaViolation::new(location, format!("value must be at least {minimum}")));
        }

        if rules.get("format").and_then(Value::as_str) == Some("uint32")
            && value.as_u64().is_none_or(|n| n > u64::from(u32::MAX))
        {
            out.push(SchemaViolation::new(location, "value must be a 32-bit unsigned integer"));
        }
    }

    fn resolve(&self, target: &str) -> Option<&Value> {
        let pointer = target.strip_prefix('#')?;
        self.root.pointer(pointer)
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => is_kind(name, value),
        Value::Array(names) => names.iter().filter_map(Value::as_str).any(|n| is_kind(n, value)),
        _ => true,
    }
}

fn is_kind(name: &str, value: &Value) -> bool {
    match name {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
