//! Parameter validation against a tool's declared input schema.
//!
//! Supports the JSON Schema keywords tool manifests use in practice:
//! `type`, `enum`, `const`, `required`, `properties`,
//! `additionalProperties`, `items`, the numeric bounds, and the string and
//! array length bounds. Unsupported keywords are ignored. Every violation is
//! collected so callers can fix all of them in one round trip.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Path label used for the parameter object itself.
const ROOT_FIELD: &str = "$";

/// One parameter that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    field: String,
    reason: String,
}

impl FieldViolation {
    /// Creates a violation for a field path.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the dotted field path, or `$` for the parameter object.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns what is wrong with the field.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.field, self.reason)
    }
}

/// Validates call parameters against an input schema.
///
/// # Errors
///
/// Returns every violation found, in schema order.
pub fn validate_parameters(schema: &Value, parameters: &Value) -> Result<(), Vec<FieldViolation>> {
    let mut violations = Vec::new();
    check(schema, parameters, ROOT_FIELD, &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check(schema: &Value, value: &Value, path: &str, out: &mut Vec<FieldViolation>) {
    let Some(rules) = schema.as_object() else {
        if schema == &Value::Bool(false) {
            out.push(FieldViolation::new(path, "no value is allowed here"));
        }
        return;
    };

    if let Some(expected) = rules.get("type")
        && !matches_type(expected, value)
    {
        out.push(FieldViolation::new(
            path,
            format!("expected {}, got {}", describe_type(expected), json_type(value)),
        ));
        return;
    }

    if let Some(Value::Array(allowed)) = rules.get("enum")
        && !allowed.contains(value)
    {
        out.push(FieldViolation::new(
            path,
            format!("must be one of {}", Value::Array(allowed.clone())),
        ));
    }

    if let Some(expected) = rules.get("const")
        && expected != value
    {
        out.push(FieldViolation::new(path, format!("must equal {expected}")));
    }

    match value {
        Value::Number(number) => {
            if let Some(actual) = number.as_f64() {
                check_bounds(rules, actual, path, out);
            }
        }
        Value::String(text) => {
            let length = Bounds::new("minLength", "maxLength", "characters");
            length.check(rules, text.chars().count(), path, out);
        }
        Value::Array(items) => {
            Bounds::new("minItems", "maxItems", "items").check(rules, items.len(), path, out);
            if let Some(item_schema) = rules.get("items") {
                for (index, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{path}[{index}]"), out);
                }
            }
        }
        Value::Object(fields) => check_object(rules, fields, path, out),
        Value::Null | Value::Bool(_) => {}
    }
}

fn check_object(rules: &Map<String, Value>, fields: &Map<String, Value>, path: &str, out: &mut Vec<FieldViolation>) {
    if let Some(Value::Array(required)) = rules.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                out.push(FieldViolation::new(child_path(path, name), "required field is missing"));
            }
        }
    }

    let properties = rules.get("properties").and_then(Value::as_object);
    for (name, field_value) in fields {
        let field_path = child_path(path, name);
        match properties.and_then(|props| props.get(name)) {
            Some(field_schema) => check(field_schema, field_value, &field_path, out),
            None => match rules.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    out.push(FieldViolation::new(field_path, "unexpected field"));
                }
                Some(extra @ Value::Object(_)) => check(extra, field_value, &field_path, out),
                _ => {}
            },
        }
    }
}

fn check_bounds(rules: &Map<String, Value>, actual: f64, path: &str, out: &mut Vec<FieldViolation>) {
    let bound = |keyword: &str| rules.get(keyword).and_then(Value::as_f64);
    if let Some(minimum) = bound("minimum")
        && actual < minimum
    {
        out.push(FieldViolation::new(path, format!("must be at least {minimum}")));
    }
    if let Some(maximum) = bound("maximum")
        && actual > maximum
    {
        out.push(FieldViolation::new(path, format!("must be at most {maximum}")));
    }
    if let Some(minimum) = bound("exclusiveMinimum")
        && actual <= minimum
    {
        out.push(FieldViolation::new(path, format!("must be greater than {minimum}")));
    }
    if let Some(maximum) = bound("exclusiveMaximum")
        && actual >= maximum
    {
        out.push(FieldViolation::new(path, format!("must be less than {maximum}")));
    }
}

/// Length keywords for one kind of value.
struct Bounds<'a> {
    min_keyword: &'a str,
    max_keyword: &'a str,
    unit: &'a str,
}

impl<'a> Bounds<'a> {
    const fn new(min_keyword: &'a str, max_keyword: &'a str, unit: &'a str) -> Self {
        Self {
            min_keyword,
            max_keyword,
            unit,
        }
    }

    fn check(&self, rules: &Map<String, Value>, actual: usize, path: &str, out: &mut Vec<FieldViolation>) {
        let limit = |keyword: &str| {
            rules
                .get(keyword)
                .and_then(Value::as_u64)
                .and_then(|value| usize::try_from(value).ok())
        };
        let unit = self.unit;
        if let Some(minimum) = limit(self.min_keyword)
            && actual < minimum
        {
            out.push(FieldViolation::new(path, format!("must have at least {minimum} {unit}")));
        }
        if let Some(maximum) = limit(self.max_keyword)
            && actual > maximum
        {
            out.push(FieldViolation::new(path, format!("must have at most {maximum} {unit}")));
        }
    }
}

fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_named_type(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_named_type(name, value)),
        _ => true,
    }
}

fn matches_named_type(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => is_integer(value),
        _ => true,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(number) => {
            number.is_i64() || number.is_u64() || number
                    .as_f64()
                    .is_some_and(|float| float.fract().abs() < f64::EPSILON)
        }
        _ => false,
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

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_FIELD {
        name.to_owned()
    } else {
        format!("{parent}.{name}")
    }
}
