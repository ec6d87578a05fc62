//! Canonical fingerprints of tool calls.
//!
//! Two calls with the same tool name and the same arguments produce the same
//! fingerprint regardless of object key order, at any nesting depth.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable identity of a `(tool name, arguments)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a call.
    #[must_use]
    pub fn of(tool_name: &str, args: &BTreeMap<String, Value>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(tool_name.as_bytes());
        hasher.update(b"\0");
        let mut encoded = String::new();
        write_object(&mut encoded, args.iter());
        hasher.update(encoded.as_bytes());
        Self(format!("{tool_name}:{}", hex::encode(hasher.finalize().as_bytes())))
    }

    /// The string form, `<tool>:<blake3 hex>`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize `value` as JSON with every object's keys sorted.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            write_object(out, entries.into_iter());
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        },
        scalar => {
            let _ = write!(out, "{scalar}");
        },
    }
}

/// Entries must already be in key order.
fn write_object<'a>(out: &mut String, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    out.push('{');
    for (i, (key, value)) in entries.enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_value(out, &Value::String(key.clone()));
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}
