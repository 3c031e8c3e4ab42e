//! Canonical JSON form for signing.
//!
//! Two implementations agree on signable bytes only if they render the
//! message identically. The canonical form is compact JSON with object
//! keys sorted lexicographically at every level and non-ASCII text
//! passed through as UTF-8. Absent optional fields are omitted, never
//! rendered as `null`, so "no correlation id" has exactly one encoding.

use serde_json::Value;

use crate::envelope::Message;
use crate::Result;

/// Render a JSON value in canonical form.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(value, &mut out)?;
    Ok(out)
}

/// The exact bytes a signature over `message` covers.
///
/// Covers the envelope and payload only; the signature itself and any
/// transport wrapper fields are outside the canonical form.
pub fn signable_content(message: &Message) -> Result<Vec<u8>> {
    let value = serde_json::to_value(message)?;
    canonical_bytes(&value)
}

/// Signable bytes of a message still in wire (JSON value) form.
///
/// Verification uses this on the received value directly, so a peer's
/// formatting choices (timestamp precision, field order) cannot break
/// signature agreement.
pub fn signable_content_of_value(message: &Value) -> Result<Vec<u8>> {
    let mut signable = serde_json::Map::new();
    for field in ["envelope", "payload"] {
        if let Some(part) = message.get(field) {
            signable.insert(field.to_string(), part.clone());
        }
    }
    canonical_bytes(&Value::Object(signable))
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String((*key).clone()), out)?;
                out.push(b':');
                write_value(&map[*key], out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out)?,
    }
    Ok(())
}

// Scalars (and string keys) use serde_json's own compact rendering,
// which escapes control characters and quotes but passes non-ASCII
// through unescaped.
fn write_scalar(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    serde_json::to_writer(out, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonical_str(value: &Value) -> String {
        String::from_utf8(canonical_bytes(value).unwrap()).unwrap()
    }

    #[test]
    fn test_keys_sorted_at_every_level() {
        let value = json!({
            "zebra": 1,
            "alpha": {"nested_z": true, "nested_a": false},
            "mid": [{"b": 2, "a": 1}]
        });
        assert_eq!(
            canonical_str(&value),
            r#"{"alpha":{"nested_a":false,"nested_z":true},"mid":[{"a":1,"b":2}],"zebra":1}"#
        );
    }

    #[test]
    fn test_no_whitespace() {
        let value = json!({"a": [1, 2, 3], "b": {"c": "d"}});
        let rendered = canonical_str(&value);
        assert!(!rendered.contains(' '));
        assert!(!rendered.contains('\n'));
    }

    #[test]
    fn test_unicode_passthrough() {
        let value = json!({"greeting": "héllo 世界"});
        assert_eq!(canonical_str(&value), "{\"greeting\":\"héllo 世界\"}");
    }

    #[test]
    fn test_control_characters_escaped() {
        let value = json!({"text": "line1\nline2\t\"quoted\""});
        assert_eq!(
            canonical_str(&value),
            r#"{"text":"line1\nline2\t\"quoted\""}"#
        );
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let mut forward = serde_json::Map::new();
        forward.insert("a".into(), json!(1));
        forward.insert("b".into(), json!(2));

        let mut reverse = serde_json::Map::new();
        reverse.insert("b".into(), json!(2));
        reverse.insert("a".into(), json!(1));

        assert_eq!(
            canonical_bytes(&Value::Object(forward)).unwrap(),
            canonical_bytes(&Value::Object(reverse)).unwrap()
        );
    }

    #[test]
    fn test_signable_content_excludes_wrapper_fields() {
        let wire = json!({
            "envelope": {"id": "msg_1", "sender": "vault_a"},
            "payload": {"intent": "ping", "body": {}},
            "signature": "c2lnbmF0dXJl",
            "received_at": "2026-01-01T00:00:00Z"
        });
        let rendered =
            String::from_utf8(signable_content_of_value(&wire).unwrap()).unwrap();
        assert!(rendered.starts_with(r#"{"envelope":"#));
        assert!(!rendered.contains("signature"));
        assert!(!rendered.contains("received_at"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| json!(n)),
                "[a-zA-Z0-9 _\u{e9}\u{4e16}]{0,12}".prop_map(Value::String),
            ];
            leaf.prop_recursive(depth, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            #[test]
            fn canonical_form_is_deterministic(value in arb_json(3)) {
                let first = canonical_bytes(&value).unwrap();
                let second = canonical_bytes(&value).unwrap();
                prop_assert_eq!(first, second);
            }

            #[test]
            fn canonical_form_survives_reparse(value in arb_json(3)) {
                let rendered = canonical_bytes(&value).unwrap();
                let reparsed: Value = serde_json::from_slice(&rendered).unwrap();
                prop_assert_eq!(canonical_bytes(&reparsed).unwrap(), rendered);
            }
        }
    }
}
