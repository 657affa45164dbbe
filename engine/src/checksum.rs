//! Checksum and field-level diff utilities.
//!
//! Checksums are the engine's cheap equality test: every change-detection
//! decision (did this field move, did the remote drift, is this edit a
//! no-op) compares fingerprints instead of deep structures.
//!
//! The fingerprint is a crc32 over a canonical encoding of the value tree.
//! Object keys are sorted recursively before encoding, so two structurally
//! equal values always fingerprint identically regardless of key order.
//! Collision resistance only needs to hold within one working set; 32 bits
//! is adequate and keeps fingerprints cheap to store on every record.

use crate::{FieldName, Fingerprint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Compute the order-independent fingerprint of a JSON value.
pub fn checksum(value: &serde_json::Value) -> Fingerprint {
    let mut buf = Vec::with_capacity(64);
    write_canonical(value, &mut buf);
    crc32fast::hash(&buf)
}

/// Checksum-based structural equality.
pub fn values_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    checksum(a) == checksum(b)
}

/// Canonical encoding: type-prefixed, NUL-terminated atoms, object keys
/// sorted. The encoding is unambiguous so distinct trees cannot collide by
/// concatenation.
fn write_canonical(value: &serde_json::Value, buf: &mut Vec<u8>) {
    match value {
        serde_json::Value::Null => buf.push(b'n'),
        serde_json::Value::Bool(true) => buf.push(b't'),
        serde_json::Value::Bool(false) => buf.push(b'f'),
        serde_json::Value::Number(n) => {
            buf.push(b'#');
            buf.extend_from_slice(n.to_string().as_bytes());
            buf.push(0);
        }
        serde_json::Value::String(s) => {
            buf.push(b'"');
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
        serde_json::Value::Array(items) => {
            buf.push(b'[');
            for item in items {
                write_canonical(item, buf);
            }
            buf.push(b']');
        }
        serde_json::Value::Object(map) => {
            buf.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                buf.push(b'k');
                buf.extend_from_slice(key.as_bytes());
                buf.push(0);
                write_canonical(&map[key], buf);
            }
            buf.push(b'}');
        }
    }
}

/// How a field changed between two value sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldChange {
    Added,
    Removed,
    Modified,
}

/// A single field-level difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiff {
    /// Field name
    pub field: FieldName,
    /// Value before (absent for added fields)
    pub before: Option<serde_json::Value>,
    /// Value after (absent for removed fields)
    pub after: Option<serde_json::Value>,
    /// Kind of change
    pub change: FieldChange,
}

/// Compute field-level differences between two map-like values.
///
/// Works over the union of both sides' field names with a checksum equality
/// test per field. Fields equal under checksum are omitted. Non-object
/// inputs contribute no fields. Output is sorted by field name so repeated
/// runs are deterministic.
pub fn diff_fields(before: &serde_json::Value, after: &serde_json::Value) -> Vec<FieldDiff> {
    let empty = serde_json::Map::new();
    let before_map = before.as_object().unwrap_or(&empty);
    let after_map = after.as_object().unwrap_or(&empty);

    let names: BTreeSet<&String> = before_map.keys().chain(after_map.keys()).collect();

    let mut diffs = Vec::new();
    for name in names {
        match (before_map.get(name), after_map.get(name)) {
            (None, Some(a)) => diffs.push(FieldDiff {
                field: name.clone(),
                before: None,
                after: Some(a.clone()),
                change: FieldChange::Added,
            }),
            (Some(b), None) => diffs.push(FieldDiff {
                field: name.clone(),
                before: Some(b.clone()),
                after: None,
                change: FieldChange::Removed,
            }),
            (Some(b), Some(a)) if !values_equal(b, a) => diffs.push(FieldDiff {
                field: name.clone(),
                before: Some(b.clone()),
                after: Some(a.clone()),
                change: FieldChange::Modified,
            }),
            _ => {}
        }
    }

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checksum_deterministic() {
        let v = json!({"name": "Alice", "age": 30});
        assert_eq!(checksum(&v), checksum(&v));
    }

    #[test]
    fn checksum_key_order_independent() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"name": "Alice", "age": 30, "tags": ["x", "y"]}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"tags": ["x", "y"], "age": 30, "name": "Alice"}"#).unwrap();
        assert_eq!(checksum(&a), checksum(&b));
    }

    #[test]
    fn checksum_nested_key_order_independent() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"outer": {"x": 1, "y": 2}}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"outer": {"y": 2, "x": 1}}"#).unwrap();
        assert_eq!(checksum(&a), checksum(&b));
    }

    #[test]
    fn checksum_distinguishes_values() {
        assert_ne!(checksum(&json!({"a": 1})), checksum(&json!({"a": 2})));
        assert_ne!(checksum(&json!("1")), checksum(&json!(1)));
        assert_ne!(checksum(&json!(null)), checksum(&json!(false)));
        assert_ne!(checksum(&json!([1, 2])), checksum(&json!([2, 1])));
        assert_ne!(checksum(&json!({"a": null})), checksum(&json!({})));
    }

    #[test]
    fn checksum_array_order_matters() {
        // Arrays are positional; only object keys are order-free
        assert_ne!(checksum(&json!(["a", "b"])), checksum(&json!(["b", "a"])));
    }

    #[test]
    fn diff_added_removed_modified() {
        let before = json!({"name": "Alice", "role": "admin", "age": 30});
        let after = json!({"name": "Alicia", "age": 30, "email": "a@example.com"});

        let diffs = diff_fields(&before, &after);
        assert_eq!(diffs.len(), 3);

        // Sorted by field name: email, name, role
        assert_eq!(diffs[0].field, "email");
        assert_eq!(diffs[0].change, FieldChange::Added);
        assert_eq!(diffs[1].field, "name");
        assert_eq!(diffs[1].change, FieldChange::Modified);
        assert_eq!(diffs[1].before, Some(json!("Alice")));
        assert_eq!(diffs[1].after, Some(json!("Alicia")));
        assert_eq!(diffs[2].field, "role");
        assert_eq!(diffs[2].change, FieldChange::Removed);
    }

    #[test]
    fn diff_equal_values_empty() {
        let v = json!({"a": 1, "b": [1, 2, 3]});
        assert!(diff_fields(&v, &v).is_empty());
    }

    #[test]
    fn diff_non_object_inputs() {
        // Non-objects contribute no field names
        assert!(diff_fields(&json!(null), &json!(null)).is_empty());

        let diffs = diff_fields(&json!(null), &json!({"a": 1}));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].change, FieldChange::Added);
    }

    #[test]
    fn diff_nested_change_detected() {
        let before = json!({"config": {"retries": 3}});
        let after = json!({"config": {"retries": 5}});
        let diffs = diff_fields(&before, &after);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "config");
        assert_eq!(diffs[0].change, FieldChange::Modified);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_value() -> impl Strategy<Value = serde_json::Value> {
            let leaf = prop_oneof![
                Just(serde_json::Value::Null),
                any::<bool>().prop_map(serde_json::Value::from),
                any::<i64>().prop_map(serde_json::Value::from),
                "[a-z]{0,8}".prop_map(serde_json::Value::from),
            ];
            leaf.prop_recursive(3, 16, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4)
                        .prop_map(serde_json::Value::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(|m| {
                        serde_json::Value::Object(m.into_iter().collect())
                    }),
                ]
            })
        }

        proptest! {
            #[test]
            fn prop_checksum_stable(v in arb_value()) {
                prop_assert_eq!(checksum(&v), checksum(&v));
            }

            #[test]
            fn prop_checksum_survives_reserialization(v in arb_value()) {
                // serde_json round-trips may reorder object keys internally;
                // the fingerprint must not care
                let text = serde_json::to_string(&v).unwrap();
                let reparsed: serde_json::Value = serde_json::from_str(&text).unwrap();
                prop_assert_eq!(checksum(&v), checksum(&reparsed));
            }

            #[test]
            fn prop_diff_self_is_empty(v in arb_value()) {
                prop_assert!(diff_fields(&v, &v).is_empty());
            }

            #[test]
            fn prop_diff_symmetric_fields(a in arb_value(), b in arb_value()) {
                let forward = diff_fields(&a, &b);
                let backward = diff_fields(&b, &a);
                prop_assert_eq!(forward.len(), backward.len());
            }
        }
    }
}
