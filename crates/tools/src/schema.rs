//! Validation for the JSON-Schema subset tools declare.
//!
//! Supported: `type: object` with typed `properties` (`string`, `integer`,
//! `number`, `boolean`, `array`, `object`), a `required` list, and `enum`
//! constraints on string properties. Unknown properties are accepted; the
//! point is to reject inputs a tool cannot run with, before it runs.

use serde_json::Value;

/// Validate `input` against `schema`. Returns the first violation found.
pub fn validate(input: &Value, schema: &Value) -> Result<(), String> {
    let Some(obj) = input.as_object() else {
        return Err("tool input must be a JSON object".into());
    };

    let properties = schema.get("properties").and_then(Value::as_object);

    // Required fields first.
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("missing required field '{name}'"));
            }
        }
    }

    // Per-property type and enum checks.
    if let Some(props) = properties {
        for (name, value) in obj {
            let Some(prop_schema) = props.get(name) else {
                continue;
            };
            if let Some(expected) = prop_schema.get("type").and_then(Value::as_str) {
                if !type_matches(value, expected) {
                    return Err(format!(
                        "field '{name}' must be of type {expected}, got {}",
                        type_name(value)
                    ));
                }
            }
            if let Some(allowed) = prop_schema.get("enum").and_then(Value::as_array) {
                if !allowed.contains(value) {
                    let options: Vec<String> =
                        allowed.iter().map(|v| v.to_string()).collect();
                    return Err(format!(
                        "field '{name}' must be one of [{}], got {value}",
                        options.join(", ")
                    ));
                }
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
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
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cmd_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" },
                "timeout_sec": { "type": "integer" },
                "mode": { "type": "string", "enum": ["read", "write"] }
            },
            "required": ["command"]
        })
    }

    #[test]
    fn accepts_valid_input() {
        let input = json!({ "command": "ls", "timeout_sec": 5 });
        assert!(validate(&input, &cmd_schema()).is_ok());
    }

    #[test]
    fn rejects_missing_required() {
        let input = json!({ "timeout_sec": 5 });
        let err = validate(&input, &cmd_schema()).unwrap_err();
        assert!(err.contains("command"));
    }

    #[test]
    fn rejects_wrong_type() {
        let input = json!({ "command": 42 });
        let err = validate(&input, &cmd_schema()).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn rejects_float_for_integer() {
        let input = json!({ "command": "ls", "timeout_sec": 1.5 });
        assert!(validate(&input, &cmd_schema()).is_err());
    }

    #[test]
    fn rejects_enum_violation() {
        let input = json!({ "command": "ls", "mode": "append" });
        let err = validate(&input, &cmd_schema()).unwrap_err();
        assert!(err.contains("mode"));
    }

    #[test]
    fn rejects_non_object_input() {
        assert!(validate(&json!("just a string"), &cmd_schema()).is_err());
        assert!(validate(&json!([1, 2]), &cmd_schema()).is_err());
    }

    #[test]
    fn unknown_properties_pass_through() {
        let input = json!({ "command": "ls", "extra": true });
        assert!(validate(&input, &cmd_schema()).is_ok());
    }
}
