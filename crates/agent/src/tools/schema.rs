//! Argument validation against a tool's JSON schema.
//!
//! Only the subset tools actually declare is checked: the top-level
//! object shape, `required` properties, primitive `type`s and `enum`s.

use serde_json::{Map, Value};

/// Validate `args` against `schema`, returning the normalised arguments.
///
/// `null` arguments are treated as an empty object.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<Value, String> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        Value::Object(_) => args.clone(),
        Value::String(raw) => {
            return Err(format!("arguments are not valid JSON: {}", raw));
        }
        other => {
            return Err(format!(
                "arguments must be an object, got {}",
                type_name(other)
            ))
        }
    };

    let Some(object) = args.as_object() else {
        return Ok(args);
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                return Err(format!("missing required parameter '{}'", name));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, value) in object {
            if let Some(prop) = properties.get(name) {
                check_property(name, prop, value)?;
            }
        }
    }

    Ok(args)
}

fn check_property(name: &str, prop: &Value, value: &Value) -> Result<(), String> {
    if let Some(expected) = prop.get("type") {
        let matches = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value)),
            _ => true,
        };
        if !matches {
            return Err(format!(
                "parameter '{}' must be of type {}, got {}",
                name,
                expected,
                type_name(value)
            ));
        }
    }

    if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!(
                "parameter '{}' must be one of {}",
                name,
                Value::Array(allowed.clone())
            ));
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "enum": ["success", "failure"] },
                "count": { "type": "integer" },
                "ratio": { "type": "number" },
                "tags": { "type": "array" }
            },
            "required": ["status"]
        })
    }

    #[test]
    fn test_valid_arguments_pass_through() {
        let args = json!({"status": "success", "count": 3, "ratio": 0.5});
        assert_eq!(validate_arguments(&schema(), &args).unwrap(), args);
    }

    #[test]
    fn test_null_is_empty_object() {
        let schema = json!({"type": "object", "properties": {}});
        assert_eq!(validate_arguments(&schema, &Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn test_missing_required() {
        let err = validate_arguments(&schema(), &json!({})).unwrap_err();
        assert!(err.contains("missing required parameter 'status'"));
    }

    #[test]
    fn test_wrong_type() {
        let err = validate_arguments(&schema(), &json!({"status": "success", "count": "3"}))
            .unwrap_err();
        assert!(err.contains("'count'"));
        assert!(err.contains("integer"));
    }

    #[test]
    fn test_integer_accepted_as_number() {
        assert!(validate_arguments(&schema(), &json!({"status": "success", "ratio": 1})).is_ok());
    }

    #[test]
    fn test_enum_violation() {
        let err = validate_arguments(&schema(), &json!({"status": "maybe"})).unwrap_err();
        assert!(err.contains("must be one of"));
    }

    #[test]
    fn test_unparsed_string_rejected() {
        let err = validate_arguments(&schema(), &json!("{not json")).unwrap_err();
        assert!(err.contains("not valid JSON"));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = validate_arguments(&schema(), &json!([1, 2])).unwrap_err();
        assert!(err.contains("must be an object"));
    }

    #[test]
    fn test_undeclared_properties_allowed() {
        assert!(validate_arguments(&schema(), &json!({"status": "failure", "extra": true})).is_ok());
    }
}
