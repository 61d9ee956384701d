//! Canonical text encoding for equality checks
//!
//! Object keys are emitted in lexical order, array order is kept, strings
//! use JSON escaping. An absent value encodes to a bare token that no JSON
//! document can produce, so it never collides with `null`.

use serde_json::Value;

const UNDEFINED_TOKEN: &str = "~undefined~";

/// Deterministic encoding of a portable tree
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Like [`stable_stringify`], with `None` standing for an absent value
pub fn stable_stringify_opt(value: Option<&Value>) -> String {
    match value {
        Some(value) => stable_stringify(value),
        None => UNDEFINED_TOKEN.to_string(),
    }
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[key], out);
            }
            out.push('}');
        }
    }
}
