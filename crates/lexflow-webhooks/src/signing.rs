//! Canonical-JSON HMAC signing.
//!
//! The signature covers the canonical JSON (sorted object keys, no
//! insignificant whitespace) of the payload object *without* its
//! `signature` field. Canonicalization makes the signature independent
//! of serializer key order on either side.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Render a JSON value canonically: object keys sorted, compact
/// separators, arrays in order.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key encoding goes through serde_json for correct escaping.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex HMAC-SHA256 over a canonical payload string.
#[must_use]
pub fn signature_for(secret: &str, canonical: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Sign a payload object in place: compute the signature over the object
/// without its `signature` field, then set the field.
pub fn sign_payload(secret: &str, payload: &mut Value) {
    if let Value::Object(map) = payload {
        map.remove("signature");
        let canonical = canonical_json(payload);
        let signature = signature_for(secret, &canonical);
        if let Value::Object(map) = payload {
            map.insert("signature".to_string(), Value::String(signature));
        }
    }
}

/// Verify a signed payload: recompute over the object without the
/// `signature` field and compare constant-time.
#[must_use]
pub fn verify_payload(secret: &str, payload: &Value) -> bool {
    let Value::Object(map) = payload else {
        return false;
    };
    let Some(Value::String(presented)) = map.get("signature") else {
        return false;
    };

    let mut unsigned = payload.clone();
    if let Value::Object(m) = &mut unsigned {
        m.remove("signature");
    }
    let expected = signature_for(secret, &canonical_json(&unsigned));

    use subtle::ConstantTimeEq;
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
