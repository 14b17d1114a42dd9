//! Coercion of user-supplied parameter text into a function call payload.

use super::DeviceFunction;
use crate::error::{Error, Result};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// How a declared input type tag is sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Boolean,
    Number,
    Json,
    Text,
}

impl InputKind {
    /// Type tags are matched case-insensitively; unknown tags are text.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => InputKind::Boolean,
            "number" | "int" | "integer" | "float" => InputKind::Number,
            "json" | "object" | "array" => InputKind::Json,
            _ => InputKind::Text,
        }
    }
}

/// Build the JSON body for calling `function` from raw `name -> text` values.
///
/// - booleans are always sent (absent means `false`)
/// - other inputs that are absent or empty are omitted
/// - JSON inputs that fail to parse are sent as the raw string
/// - values for names the function does not declare are ignored
pub fn coerce_inputs(
    function: &DeviceFunction,
    raw: &BTreeMap<String, String>,
) -> Result<Map<String, Value>> {
    let mut inputs = Map::new();

    for input in &function.inputs {
        let value = raw.get(&input.name).map(String::as_str);

        match InputKind::from_tag(&input.kind) {
            InputKind::Boolean => {
                inputs.insert(input.name.clone(), Value::Bool(parse_flag(value)));
            }
            kind => {
                let Some(text) = value.filter(|v| !v.is_empty()) else {
                    continue;
                };
                let coerced = match kind {
                    InputKind::Number => parse_number(&input.name, text)?,
                    InputKind::Json => serde_json::from_str(text).unwrap_or_else(|_| {
                        tracing::debug!(
                            "Input '{}' is not valid JSON, sending it as a string",
                            input.name
                        );
                        Value::String(text.to_string())
                    }),
                    _ => Value::String(text.to_string()),
                };
                inputs.insert(input.name.clone(), coerced);
            }
        }
    }

    Ok(inputs)
}

fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        )
    })
}

fn parse_number(name: &str, text: &str) -> Result<Value> {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Ok(Value::Number(int.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| Error::Invalid(format!("parameter '{}' must be a number, got '{}'", name, text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FunctionInput;
    use serde_json::json;

    fn input(name: &str, kind: &str) -> FunctionInput {
        FunctionInput {
            name: name.to_string(),
            kind: kind.to_string(),
            description: None,
            required: false,
        }
    }

    fn function(inputs: Vec<FunctionInput>) -> DeviceFunction {
        DeviceFunction {
            id: "f".to_string(),
            name: "F".to_string(),
            description: String::new(),
            inputs,
        }
    }

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_kind_from_tag() {
        assert_eq!(InputKind::from_tag("Boolean"), InputKind::Boolean);
        assert_eq!(InputKind::from_tag("BOOL"), InputKind::Boolean);
        assert_eq!(InputKind::from_tag("integer"), InputKind::Number);
        assert_eq!(InputKind::from_tag("float"), InputKind::Number);
        assert_eq!(InputKind::from_tag("array"), InputKind::Json);
        assert_eq!(InputKind::from_tag("string"), InputKind::Text);
        assert_eq!(InputKind::from_tag("color"), InputKind::Text);
    }

    #[test]
    fn test_coerces_each_kind() {
        let f = function(vec![
            input("on", "boolean"),
            input("level", "number"),
            input("ratio", "float"),
            input("payload", "json"),
            input("label", "string"),
        ]);
        let body = coerce_inputs(
            &f,
            &raw(&[
                ("on", "yes"),
                ("level", "42"),
                ("ratio", "0.5"),
                ("payload", r#"{"a": [1, 2]}"#),
                ("label", "kitchen"),
            ]),
        )
        .unwrap();

        assert_eq!(
            Value::Object(body),
            json!({
                "on": true,
                "level": 42,
                "ratio": 0.5,
                "payload": {"a": [1, 2]},
                "label": "kitchen",
            })
        );
    }

    #[test]
    fn test_absent_values() {
        let f = function(vec![input("on", "bool"), input("level", "int"), input("label", "string")]);
        let body = coerce_inputs(&f, &raw(&[("label", "")])).unwrap();
        assert_eq!(Value::Object(body), json!({"on": false}));
    }

    #[test]
    fn test_invalid_json_falls_back_to_string() {
        let f = function(vec![input("payload", "object")]);
        let body = coerce_inputs(&f, &raw(&[("payload", "{not json")])).unwrap();
        assert_eq!(body["payload"], json!("{not json"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let f = function(vec![input("level", "number")]);
        let err = coerce_inputs(&f, &raw(&[("level", "bright")])).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn test_undeclared_values_are_ignored() {
        let f = function(vec![input("label", "string")]);
        let body = coerce_inputs(&f, &raw(&[("label", "a"), ("extra", "b")])).unwrap();
        assert_eq!(Value::Object(body), json!({"label": "a"}));
    }
}
