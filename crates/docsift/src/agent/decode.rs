use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::TaskError;

static RE_JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Pulls a JSON object out of a model reply.
///
/// The whole reply is tried first, then the span from the first `{` to the
/// last `}` (models like to wrap JSON in prose or code fences).
pub fn extract_json_object(raw: &str) -> Result<serde_json::Value, TaskError> {
    let trimmed = raw.trim();
    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Ok(value);
    }

    let candidate = RE_JSON_OBJECT
        .find(trimmed)
        .ok_or_else(|| TaskError::MalformedOutput("no JSON object in model reply".to_string()))?;

    match serde_json::from_str::<serde_json::Value>(candidate.as_str()) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(_) => Err(TaskError::MalformedOutput(
            "model reply is not a JSON object".to_string(),
        )),
        Err(e) => Err(TaskError::MalformedOutput(format!(
            "invalid JSON in model reply: {}",
            e
        ))),
    }
}

/// Deserializes a decoded reply into the agent's raw reply shape.
pub fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, TaskError> {
    serde_json::from_value(value)
        .map_err(|e| TaskError::MalformedOutput(format!("unexpected reply shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let value = extract_json_object(r#" {"a": 1} "#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_object_inside_prose_and_fences() {
        let raw = "Here you go:\n```json\n{\"keywords\": [\"a\", \"b\"]}\n```\nAnything else?";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["keywords"][1], "b");
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(matches!(
            extract_json_object("[1, 2, 3]"),
            Err(TaskError::MalformedOutput(_))
        ));
        assert!(matches!(
            extract_json_object("no braces here"),
            Err(TaskError::MalformedOutput(_))
        ));
        assert!(matches!(
            extract_json_object("{ broken: }"),
            Err(TaskError::MalformedOutput(_))
        ));
    }
}
