//! Forward references between steps.
//!
//! A step's condition, data, or options may embed `{"$txFuture": "1.name"}` to
//! mean "the `name` field of step 1's result". References are modelled as a
//! typed [`FutureRef`] and resolved in a single pass immediately before the
//! referencing step executes, so a bad reference fails before any write.

use serde_json::Value;

use crate::core::constants::FUTURE_KEY;
use crate::core::errors::*;

/// A parsed forward reference: a result index plus a dot-separated path into
/// that result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FutureRef {
    pub index: usize,
    pub path: Vec<String>,
}

impl FutureRef {
    /// Parses the `"<index>.<segment>..."` marker string.
    pub fn parse(marker: &str) -> Result<Self> {
        let mut parts = marker.split('.');
        let head = parts.next().unwrap_or("");

        let index: usize = head
            .parse()
            .map_err(|_| Error::InvalidReference(format!("step index '{}' is not a number", head)))?;

        Ok(FutureRef {
            index,
            path: parts.map(str::to_string).collect(),
        })
    }

    /// Navigates this reference through the results produced so far.
    pub fn resolve(&self, results: &[Value]) -> Result<Value> {
        let mut current = results
            .get(self.index)
            .ok_or(Error::UnresolvedReference { index: self.index })?;

        for seg in &self.path {
            current = match current {
                Value::Array(items) => {
                    let idx: usize = seg.parse().map_err(|_| {
                        Error::TypeMismatch(format!("array index '{}' is not a number", seg))
                    })?;
                    items.get(idx).ok_or_else(|| {
                        Error::InvalidReference(format!(
                            "index {} is out of bounds in result {}",
                            idx, self.index
                        ))
                    })?
                }
                Value::Object(map) => map.get(seg).ok_or_else(|| {
                    Error::InvalidReference(format!(
                        "no key '{}' in result {}",
                        seg, self.index
                    ))
                })?,
                _ if seg.parse::<usize>().is_ok() => {
                    return Err(Error::TypeMismatch(format!(
                        "numeric segment '{}' used on a non-array value in result {}",
                        seg, self.index
                    )));
                }
                _ => {
                    return Err(Error::InvalidReference(format!(
                        "segment '{}' used on a non-container value in result {}",
                        seg, self.index
                    )));
                }
            };
        }

        Ok(current.clone())
    }
}

/// Replaces every embedded future marker in `value` with the referenced data.
/// The entire `{"$txFuture": ...}` object is replaced by the resolved value.
pub fn resolve_futures(value: &mut Value, results: &[Value]) -> Result<()> {
    match value {
        Value::Object(map) => {
            if let Some(marker) = map.get(FUTURE_KEY).and_then(Value::as_str) {
                let resolved = FutureRef::parse(marker)?.resolve(results)?;
                *value = resolved;
                return Ok(());
            }

            for val in map.values_mut() {
                resolve_futures(val, results)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_futures(item, results)?;
            }
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_marker() {
        let fref = FutureRef::parse("2.user.name").unwrap();
        assert_eq!(fref.index, 2);
        assert_eq!(fref.path, vec!["user", "name"]);
    }

    #[test]
    fn test_parse_rejects_non_numeric_index() {
        assert!(matches!(
            FutureRef::parse("abc.name"),
            Err(Error::InvalidReference(_))
        ));
    }

    #[test]
    fn test_resolves_simple_reference() {
        let results = vec![json!({"name": "Bob"})];
        let mut obj = json!({"name": {"$txFuture": "0.name"}});

        resolve_futures(&mut obj, &results).unwrap();
        assert_eq!(obj, json!({"name": "Bob"}));
    }

    #[test]
    fn test_resolves_nested_and_array_paths() {
        let results = vec![json!({}), json!({"tags": ["a", "b"], "meta": {"n": 5}})];
        let mut obj = json!({
            "tag": {"$txFuture": "1.tags.1"},
            "deep": {"inner": {"$txFuture": "1.meta.n"}}
        });

        resolve_futures(&mut obj, &results).unwrap();
        assert_eq!(obj, json!({"tag": "b", "deep": {"inner": 5}}));
    }

    #[test]
    fn test_unresolved_index() {
        let mut obj = json!({"v": {"$txFuture": "3.name"}});
        let err = resolve_futures(&mut obj, &[json!({})]).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { index: 3 }));
    }

    #[test]
    fn test_missing_key_is_invalid_reference() {
        let results = vec![json!({"name": "Bob"})];
        let mut obj = json!({"v": {"$txFuture": "0.missing"}});
        assert!(matches!(
            resolve_futures(&mut obj, &results),
            Err(Error::InvalidReference(_))
        ));
    }

    #[test]
    fn test_non_numeric_array_index_is_type_mismatch() {
        let results = vec![json!(["a", "b"])];
        let mut obj = json!({"v": {"$txFuture": "0.first"}});
        assert!(matches!(
            resolve_futures(&mut obj, &results),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_numeric_segment_on_scalar_is_type_mismatch() {
        let results = vec![json!({"n": 42})];
        let mut obj = json!({"v": {"$txFuture": "0.n.0"}});
        assert!(matches!(
            resolve_futures(&mut obj, &results),
            Err(Error::TypeMismatch(_))
        ));
    }
}
