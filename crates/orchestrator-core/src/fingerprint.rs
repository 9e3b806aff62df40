//! Deterministic content hash of a normalized job payload (C2).

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use once_cell::sync::Lazy;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Recursively normalize a JSON value per spec §4.2 step 1: drop
/// undefined/NaN/Infinity (already impossible in `serde_json::Value`, so
/// this only has null/string/array/object work to do), trim and collapse
/// whitespace in strings, sort object keys, and preserve array order.
///
/// Also the normalization the Payload Registry applies to an accepted
/// payload before it is stored, so two requests that only differ in
/// whitespace or key order are persisted in one canonical form.
pub(crate) fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(collapse_whitespace(s)),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => {
            let mut sorted: Vec<(String, Value)> = map
                .iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(sorted.into_iter().collect())
        }
        other => other.clone(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// Compute the stable 256-bit fingerprint of (class, payload) as a hex
/// digest (spec §4.2). Canonical JSON serialization is guaranteed here by
/// the normalize step sorting object keys before `serde_json` serializes
/// them in insertion order.
pub fn fingerprint(class: &str, payload: &Value) -> String {
    let normalized = normalize(payload);
    let canonical = serde_json::to_string(&normalized).expect("normalized value always encodes");

    let mut hasher = Sha256::new();
    hasher.update(class.as_bytes());
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deterministic_for_identical_input() {
        let payload = json!({"id": 7, "name": "widget"});
        assert_eq!(fingerprint("TEST", &payload), fingerprint("TEST", &payload));
    }

    #[test]
    fn class_participates_in_the_hash() {
        let payload = json!({"id": 7});
        assert_ne!(fingerprint("TEST", &payload), fingerprint("OTHER", &payload));
    }

    #[test]
    fn key_order_does_not_affect_the_hash() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(fingerprint("TEST", &a), fingerprint("TEST", &b));
    }

    #[test]
    fn array_order_does_affect_the_hash() {
        let a = json!({"items": [1, 2, 3]});
        let b = json!({"items": [3, 2, 1]});
        assert_ne!(fingerprint("TEST", &a), fingerprint("TEST", &b));
    }

    #[test]
    fn whitespace_only_string_differences_hash_identically() {
        let a = json!({"name": "  widget   deluxe "});
        let b = json!({"name": "widget deluxe"});
        assert_eq!(fingerprint("TEST", &a), fingerprint("TEST", &b));
    }

    #[test]
    fn nested_objects_are_normalized_recursively() {
        let a = json!({"outer": {"z": 1, "a": "  padded  "}});
        let b = json!({"outer": {"a": "padded", "z": 1}});
        assert_eq!(fingerprint("TEST", &a), fingerprint("TEST", &b));
    }
}
