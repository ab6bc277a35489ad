// ── Content fingerprints ──
//
// SHA-256 over a canonical JSON rendering: object keys sorted, no
// insignificant whitespace. Only equality of the resulting strings is
// meaningful to callers.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::DhcpOption;

/// Fingerprint a configuration tree independently of key order.
pub fn config_hash(config: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(config, &mut canonical);
    digest(&canonical)
}

/// Fingerprint an option set independently of option order.
pub fn option_set_hash(options: &[DhcpOption]) -> String {
    if options.is_empty() {
        return String::new();
    }
    let mut sorted: Vec<&DhcpOption> = options.iter().collect();
    sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    let values: Vec<Value> = sorted.iter().map(|o| o.to_kea()).collect();
    config_hash(&Value::Array(values))
}

fn digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
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
