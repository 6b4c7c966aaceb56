//! Document helpers shared by the execution engine and the in-memory backend:
//! dotted-path access, condition matching, and operator-style update application.

use serde_json::{Map, Value};

use crate::core::errors::*;

/// Looks up a dotted path in a document. Numeric segments index into arrays.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;

    for seg in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(seg)?,
            Value::Array(items) => {
                let idx: usize = seg.parse().ok()?;
                current = items.get(idx)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// Sets a dotted path in a document, creating intermediate objects as needed.
/// Numeric segments index into existing arrays; indexing past the end of an
/// array is an error because the caller would silently lose the write.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let segs: Vec<&str> = path.split('.').collect();
    let mut current = doc;

    for (i, seg) in segs.iter().enumerate() {
        let last = i == segs.len() - 1;

        match current {
            Value::Object(map) => {
                if last {
                    map.insert((*seg).to_string(), value);
                    return Ok(());
                }
                current = map
                    .entry((*seg).to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            Value::Array(items) => {
                let idx: usize = seg.parse().map_err(|_| {
                    Error::StoreFailure(format!("array segment '{}' in path '{}' is not numeric", seg, path))
                })?;
                let slot = items.get_mut(idx).ok_or_else(|| {
                    Error::StoreFailure(format!("index {} out of bounds in path '{}'", idx, path))
                })?;
                if last {
                    *slot = value;
                    return Ok(());
                }
                current = slot;
            }
            other => {
                *other = Value::Object(Map::new());
                if let Value::Object(map) = other {
                    if last {
                        map.insert((*seg).to_string(), value);
                        return Ok(());
                    }
                    current = map
                        .entry((*seg).to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                } else {
                    unreachable!()
                }
            }
        }
    }

    Ok(())
}

/// Removes a dotted path from a document. Missing paths are a no-op.
pub fn unset_path(doc: &mut Value, path: &str) {
    let Some((parent_path, leaf)) = path.rsplit_once('.') else {
        if let Value::Object(map) = doc {
            map.remove(path);
        }
        return;
    };

    let mut current = doc;
    for seg in parent_path.split('.') {
        let next = match current {
            Value::Object(map) => map.get_mut(seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return,
        }
    }

    if let Value::Object(map) = current {
        map.remove(leaf);
    }
}

/// Checks a document against an equality condition. Every key in the condition
/// is a dotted path that must resolve to a value equal to the condition's
/// value. An empty condition matches every document.
pub fn matches(doc: &Value, condition: &Value) -> bool {
    let Value::Object(cond) = condition else {
        return false;
    };

    cond.iter().all(|(path, expected)| match get_path(doc, path) {
        Some(actual) => values_equal(actual, expected),
        None => expected.is_null(),
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        // 1 and 1.0 should compare equal the way stores compare them
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Normalizes an update document into operator form: keys already starting
/// with `$` pass through, bare keys are gathered under `$set`.
pub fn format_update(update: &Value) -> Value {
    let Value::Object(map) = update else {
        return update.clone();
    };

    let mut formatted = Map::new();
    for (key, value) in map {
        if key.starts_with('$') {
            formatted.insert(key.clone(), value.clone());
        } else {
            let set = formatted
                .entry("$set".to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(set_map) = set {
                set_map.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(formatted)
}

/// Applies an operator-form update (`$set`, `$inc`, `$unset`) to a document.
/// Unknown operators are rejected so a typo cannot silently drop a write.
pub fn apply_update(doc: &mut Value, update: &Value) -> Result<()> {
    let formatted = format_update(update);
    let Value::Object(ops) = &formatted else {
        return Err(Error::StoreFailure("update must be a document".to_string()));
    };

    for (op, fields) in ops {
        let Value::Object(fields) = fields else {
            return Err(Error::StoreFailure(format!("{} expects a document", op)));
        };

        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone())?;
                }
            }
            "$inc" => {
                for (path, value) in fields {
                    let delta = value.as_f64().ok_or_else(|| {
                        Error::StoreFailure(format!("$inc value for '{}' is not numeric", path))
                    })?;
                    let current = get_path(doc, path).and_then(Value::as_f64).unwrap_or(0.0);
                    let sum = current + delta;
                    let num = if sum.fract() == 0.0 && sum.abs() < i64::MAX as f64 {
                        Value::from(sum as i64)
                    } else {
                        Value::from(sum)
                    };
                    set_path(doc, path, num)?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(doc, path);
                }
            }
            other => {
                return Err(Error::StoreFailure(format!("unsupported update operator: {}", other)));
            }
        }
    }

    Ok(())
}
