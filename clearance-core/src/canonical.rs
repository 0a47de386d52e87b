//! JSON canonicalization for signing.
//!
//! Produces a deterministic byte representation of a JSON value by
//! sorting object keys lexicographically and eliding insignificant
//! whitespace, so the same logical document always signs to the same
//! bytes regardless of field insertion order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn canonicalize<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize_value(&value))
}

pub fn canonicalize_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize_value).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    let key = serde_json::to_string(k).unwrap_or_else(|_| "\"\"".to_string());
                    format!("{key}:{}", canonicalize_value(&map[k]))
                })
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

pub fn hash_canonical(canonical: &str) -> String {
    sha256_hex(canonical.as_bytes())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// HMAC-SHA-256 over the canonical bytes, hex-encoded. Used to sign the
/// registry snapshot and the re-encryption engine's internal attestations.
pub fn hmac_sign(key: &[u8], message: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_verify(key: &[u8], message: &[u8], expected_hex: &str) -> bool {
    use subtle::ConstantTimeEq;
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let computed = hmac_sign(key, message);
    let Ok(computed_bytes) = hex::decode(&computed) else {
        return false;
    };
    if computed_bytes.len() != expected.len() {
        return false;
    }
    computed_bytes.ct_eq(&expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let v = json!({"b": 1, "a": 2});
        assert_eq!(canonicalize_value(&v), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn sorts_nested_keys() {
        let v = json!({"z": {"y": 1, "x": 2}, "a": 1});
        assert_eq!(canonicalize_value(&v), r#"{"a":1,"z":{"x":2,"y":1}}"#);
    }

    #[test]
    fn deterministic_hash() {
        let v1 = json!({"a": 1, "b": 2});
        let v2 = json!({"b": 2, "a": 1});
        assert_eq!(
            hash_canonical(&canonicalize_value(&v1)),
            hash_canonical(&canonicalize_value(&v2))
        );
    }

    #[test]
    fn escapes_strings() {
        let v = json!({"k": "hello \"world\""});
        assert_eq!(canonicalize_value(&v), r#"{"k":"hello \"world\""}"#);
    }

    #[test]
    fn arrays_keep_order() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonicalize_value(&v), "[3,1,2]");
    }

    #[test]
    fn hmac_round_trip() {
        let key = b"signing-key";
        let sig = hmac_sign(key, b"payload");
        assert!(hmac_verify(key, b"payload", &sig));
        assert!(!hmac_verify(key, b"tampered", &sig));
    }
}
