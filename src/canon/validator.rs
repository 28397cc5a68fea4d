//! Record Validator
//!
//! Two layers, both required: structural checks against the shipped schema,
//! then domain invariants on the typed record. Every failure is collected and
//! reported with the JSON pointer of the offending field.

use serde::Serialize;
use serde_json::Value;

use super::schema::canonical_schema;
use super::types::{PaResult, PlateAppearanceCanonical};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Validate an untrusted JSON value and, on success, return the typed record.
pub fn validate_value(value: &Value) -> Result<PlateAppearanceCanonical, Vec<String>> {
    let mut errors = Vec::new();
    check_against(canonical_schema(), value, "", &mut errors);
    if !errors.is_empty() {
        // Invariants still apply to whatever fields did parse
        errors.extend(check_value_invariants(value));
        return Err(errors);
    }

    let record: PlateAppearanceCanonical = serde_json::from_value(integral_numbers(value))
        .map_err(|e| vec![format!("/ could not be read as a record: {}", e)])?;

    let invariant_errors = check_domain_invariants(&record);
    if invariant_errors.is_empty() {
        Ok(record)
    } else {
        Err(invariant_errors)
    }
}

/// Re-check a typed record, as emitted, against the same contract.
pub fn validate_record(record: &PlateAppearanceCanonical) -> ValidationReport {
    let errors = match serde_json::to_value(record) {
        Ok(value) => validate_value(&value).err().unwrap_or_default(),
        Err(e) => vec![format!("/ could not be serialized: {}", e)],
    };
    ValidationReport {
        ok: errors.is_empty(),
        errors,
    }
}

pub fn check_domain_invariants(record: &PlateAppearanceCanonical) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(required) = record.pa_result.fixed_outs() {
        if record.outs_added != required {
            errors.push(format!(
                "/outs_added must be {} for {} (got {})",
                required, record.pa_result, record.outs_added
            ));
        }
    }
    errors
}

/// Domain invariants on raw JSON, for values that fail structurally but
/// still carry a readable result and outs count.
fn check_value_invariants(value: &Value) -> Vec<String> {
    let result = value
        .get("pa_result")
        .and_then(|v| serde_json::from_value::<PaResult>(v.clone()).ok());
    let outs = value.get("outs_added").and_then(Value::as_f64);
    match (result.and_then(|r| r.fixed_outs().map(|req| (r, req))), outs) {
        (Some((result, required)), Some(outs)) if outs != required as f64 => vec![format!(
            "/outs_added must be {} for {} (got {})",
            required, result, outs
        )],
        _ => Vec::new(),
    }
}

/// `1.0` is an integer to the schema but not to serde; rewrite such numbers.
fn integral_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= 0.0 && f <= u32::MAX as f64 => Value::from(f as u64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(integral_numbers).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), integral_numbers(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn pointer(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
    }
}

fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Interpreter for the Draft-07 keywords the record schema uses.
fn check_against(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
            errors.push(format!("{} must be {}", pointer(path), allowed.join(",")));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.iter().any(|o| json_equal(o, value)) {
            errors.push(format!(
                "{} must be equal to one of the allowed values ({})",
                pointer(path),
                value
            ));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                errors.push(format!("{} must be >= {}", pointer(path), min));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                errors.push(format!("{} must be <= {}", pointer(path), max));
            }
        }
    }

    if let Value::Array(items) = value {
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                check_against(item_schema, item, &format!("{}/{}", path, i), errors);
            }
        }
    }

    if let Value::Object(obj) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(key) {
                    errors.push(format!("{} must have required property '{}'", pointer(path), key));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (key, child) in obj {
            match properties.and_then(|p| p.get(key)) {
                Some(child_schema) => {
                    check_against(child_schema, child, &format!("{}/{}", path, key), errors)
                }
                None if closed => errors.push(format!(
                    "{} must NOT have additional properties ('{}')",
                    pointer(path),
                    key
                )),
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::types::{PaResult, PitchEvent};
    use serde_json::json;

    fn demo() -> Value {
        json!({
            "pa_result": "fb",
            "pitches": ["ball", "called_strike", "in_play"],
            "batter": "A L",
            "pitcher": "R S",
            "fielder_num": 8,
            "outs_added": 1,
            "explicit_runner_actions": [],
            "notes": ["In play. flies out to center fielder"],
            "confidence": 0.92
        })
    }

    #[test]
    fn test_valid_record_passes() {
        let record = validate_value(&demo()).unwrap();
        assert_eq!(record.pa_result, PaResult::Fb);
        assert_eq!(record.pitches.last(), Some(&PitchEvent::InPlay));
        assert!(validate_record(&record).ok);
    }

    #[test]
    fn test_nulls_allowed_for_identity_fields() {
        let mut v = demo();
        v["batter"] = Value::Null;
        v["fielder_num"] = Value::Null;
        assert!(validate_value(&v).is_ok());
    }

    #[test]
    fn test_collects_multiple_structural_errors() {
        let mut v = demo();
        v["pa_result"] = json!("single");
        v["pitches"] = json!(["ball", "knuckler"]);
        v["fielder_num"] = json!(11);
        v["confidence"] = json!(1.5);
        v["extra"] = json!(true);
        let errs = validate_value(&v).unwrap_err();
        assert!(errs.iter().any(|e| e.starts_with("/pa_result must be equal")));
        assert!(errs.iter().any(|e| e.starts_with("/pitches/1 must be equal")));
        assert!(errs.iter().any(|e| e == "/fielder_num must be <= 9"));
        assert!(errs.iter().any(|e| e == "/confidence must be <= 1"));
        assert!(errs.iter().any(|e| e.contains("additional properties ('extra')")));
    }

    #[test]
    fn test_missing_required_and_nested_actions() {
        let v = json!({
            "pa_result": "walk",
            "pitches": [],
            "explicit_runner_actions": [{ "runner": "J M", "action": "fly", "to": 5 }],
            "confidence": 0.5
        });
        let errs = validate_value(&v).unwrap_err();
        assert!(errs.contains(&"/ must have required property 'outs_added'".to_string()));
        assert!(errs.iter().any(|e| e.starts_with("/explicit_runner_actions/0/action")));
        assert!(errs.iter().any(|e| e.starts_with("/explicit_runner_actions/0/to")));
    }

    #[test]
    fn test_domain_invariants() {
        let mut v = demo();
        v["pa_result"] = json!("walk");
        v["outs_added"] = json!(1);
        assert_eq!(
            validate_value(&v).unwrap_err(),
            vec!["/outs_added must be 0 for walk (got 1)".to_string()]
        );

        v["pa_result"] = json!("strikeout");
        v["outs_added"] = json!(0);
        assert!(validate_value(&v).is_err());

        v["outs_added"] = json!(1);
        assert!(validate_value(&v).is_ok());
    }

    #[test]
    fn test_invariants_reported_alongside_structural_errors() {
        let mut v = demo();
        v["pa_result"] = json!("walk");
        v["outs_added"] = json!(1);
        v["pitches"] = json!(["ball", "knuckler"]);
        v["extra"] = json!(true);
        let errs = validate_value(&v).unwrap_err();
        assert!(errs.iter().any(|e| e.starts_with("/pitches/1 must be equal")));
        assert!(errs.iter().any(|e| e.contains("additional properties ('extra')")));
        assert!(errs.contains(&"/outs_added must be 0 for walk (got 1)".to_string()));

        // An unreadable result leaves nothing to check the outs against
        v["pa_result"] = json!("single");
        let errs = validate_value(&v).unwrap_err();
        assert!(!errs.iter().any(|e| e.starts_with("/outs_added")));
    }

    #[test]
    fn test_integer_typed_floats() {
        let mut v = demo();
        v["outs_added"] = json!(1.0);
        assert!(validate_value(&v).is_ok());
        v["outs_added"] = json!(1.5);
        assert!(validate_value(&v).is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        let errs = validate_value(&json!(["fb"])).unwrap_err();
        assert_eq!(errs, vec!["/ must be object".to_string()]);
    }
}
