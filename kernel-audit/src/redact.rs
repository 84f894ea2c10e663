//! Secret redaction for audit parameters.

use serde_json::{Map, Value};

/// Placeholder written in place of sensitive values.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_FRAGMENTS: [&str; 7] = [
    "key",
    "token",
    "secret",
    "password",
    "credential",
    "auth",
    "bearer",
];

/// Returns `true` when an object key names a value that must never be
/// persisted. Matching is a case-insensitive substring test.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Returns a copy of `value` with every sensitive key's value replaced by
/// [`REDACTED`], at any depth and inside arrays.
#[must_use]
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted: Map<String, Value> = map
                .iter()
                .map(|(key, inner)| {
                    let inner = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_owned())
                    } else {
                        redact(inner)
                    };
                    (key.clone(), inner)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
