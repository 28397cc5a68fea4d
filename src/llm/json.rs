//! Reply Parsing
//!
//! Models wrap JSON in code fences or chatter. Try the whole reply, then a
//! fenced block, then the outermost bracketed slice.

use regex::Regex;
use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

lazy_static::lazy_static! {
    static ref FENCE: Regex = Regex::new(r"(?is)```(?:json)?\s*\n(.*?)\n\s*```").unwrap();
}

fn extract_between(text: &str, open: char, close: char) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        return Some(v);
    }
    if let Some(body) = FENCE.captures(text).and_then(|c| c.get(1)) {
        if let Ok(v) = serde_json::from_str::<Value>(body.as_str()) {
            return Some(v);
        }
    }
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end]).ok()
}

/// A JSON object from a model reply.
pub fn extract_json_object(text: &str) -> PipelineResult<Value> {
    match extract_between(text, '{', '}') {
        Some(v @ Value::Object(_)) => Ok(v),
        Some(other) => Err(PipelineError::MalformedReply(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
        None => Err(PipelineError::MalformedReply(
            "model did not return a valid JSON payload".into(),
        )),
    }
}

/// A JSON array from a model reply.
pub fn extract_json_array(text: &str) -> PipelineResult<Vec<Value>> {
    match extract_between(text, '[', ']') {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(PipelineError::MalformedReply(format!(
            "expected a JSON array, got {}",
            kind_of(&other)
        ))),
        None => Err(PipelineError::MalformedReply(
            "model did not return a valid JSON array".into(),
        )),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
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

    #[test]
    fn test_plain_object() {
        assert_eq!(extract_json_object(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_fenced_object() {
        let reply = "Here you go:\n```json\n{\"pa_result\": \"walk\"}\n```\nDone.";
        assert_eq!(extract_json_object(reply).unwrap()["pa_result"], "walk");
    }

    #[test]
    fn test_object_inside_prose() {
        let reply = "Sure! {\"outs_added\": 1} hope that helps";
        assert_eq!(extract_json_object(reply).unwrap()["outs_added"], 1);
    }

    #[test]
    fn test_array_reply() {
        let items = extract_json_array("Segments: [\"a\", \"b\"]").unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_wrong_shape_and_garbage() {
        assert!(matches!(
            extract_json_object("[1, 2]"),
            Err(PipelineError::MalformedReply(_))
        ));
        assert!(extract_json_array("no json here").is_err());
    }
}
