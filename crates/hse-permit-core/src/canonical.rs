//! Ordered key/value maps and their canonical text form.
//!
//! Permit free-form maps (preconditions, prevention measures, atmospheric test
//! results, attachments) are kept as `BTreeMap`s so iteration order is always
//! key order. Values are arbitrary JSON; [`canonical_json`] renders them with
//! object keys sorted at every depth so the rendered document never depends on
//! insertion order.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::Value;

/// An ordered map of free-form permit fields.
pub type FieldMap = BTreeMap<String, Value>;

/// Merge `patch` into `target`.
///
/// Each key from the patch replaces the existing entry; a `null` value removes
/// the key instead.
pub fn merge_fields(target: &mut FieldMap, patch: FieldMap) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

/// Compact JSON with object keys sorted recursively.
///
/// Strings stay quoted at every depth, so `"0"` and `0` never render alike.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => {
            out.push_str(&Value::String(s.clone()).to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_inserts_replaces_and_removes() {
        let mut target = FieldMap::new();
        target.insert("gants".into(), json!(true));
        target.insert("casque".into(), json!(true));

        let mut patch = FieldMap::new();
        patch.insert("casque".into(), Value::Null);
        patch.insert("harnais".into(), json!("obligatoire"));
        patch.insert("gants".into(), json!(false));

        merge_fields(&mut target, patch);

        let keys: Vec<_> = target.keys().cloned().collect();
        assert_eq!(keys, vec!["gants", "harnais"]);
        assert_eq!(target["gants"], json!(false));
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"z": 1, "a": {"y": [1, 2], "b": null}});
        assert_eq!(canonical_json(&a), r#"{"a":{"b":null,"y":[1,2]},"z":1}"#);
    }

    #[test]
    fn test_canonical_json_keeps_scalar_types_apart() {
        assert_eq!(canonical_json(&json!("20.9%")), r#""20.9%""#);
        assert_ne!(canonical_json(&json!("0")), canonical_json(&json!(0)));
        assert_ne!(canonical_json(&json!("true")), canonical_json(&json!(true)));
        assert_ne!(canonical_json(&json!("null")), canonical_json(&Value::Null));
        assert_eq!(canonical_json(&json!(["a"])), r#"["a"]"#);
    }
}
