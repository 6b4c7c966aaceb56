//! Reserved-key escaping for the task-record wire format.
//!
//! Document stores commonly reserve keys that start with `$` (operators) or
//! contain `.` (path separators). User-supplied conditions, data, and options
//! are embedded verbatim inside the persisted task record, so any such key is
//! token-encoded when a step is queued and decoded again immediately before
//! the step executes. The tokens are defined in [`crate::core::constants`];
//! keys that contain a token string verbatim are reserved (see there).

use serde_json::{Map, Value};

use crate::core::constants::{DOLLAR_TOKEN, DOT_TOKEN};

/// Encodes reserved characters in every object key, recursively.
pub fn encode_keys(value: &Value) -> Value {
    transcode(value, false)
}

/// Reverses [`encode_keys`], restoring the original keys.
pub fn decode_keys(value: &Value) -> Value {
    transcode(value, true)
}

fn transcode(value: &Value, decode: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                let new_key = if decode { decode_key(key) } else { encode_key(key) };
                out.insert(new_key, transcode(val, decode));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| transcode(v, decode)).collect()),
        other => other.clone(),
    }
}

fn encode_key(key: &str) -> String {
    let mut new_key = if let Some(rest) = key.strip_prefix('$') {
        format!("{}{}", DOLLAR_TOKEN, rest)
    } else {
        key.to_string()
    };

    if new_key.contains('.') {
        new_key = new_key.replace('.', DOT_TOKEN);
    }

    new_key
}

fn decode_key(key: &str) -> String {
    let mut new_key = key.replace(DOT_TOKEN, ".");

    if let Some(rest) = new_key.strip_prefix(DOLLAR_TOKEN) {
        new_key = format!("${}", rest);
    }

    new_key
}
