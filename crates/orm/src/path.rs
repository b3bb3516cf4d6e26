//! Dotted path helpers
//!
//! Paths address nested fields with `.` separated segments (`images.0.name`).
//! Numeric segments index into arrays and collections. Schema paths use `*`
//! in place of a dynamic key or index (`images.*.name`).

use crate::error::{OrmError, OrmResult};
use crate::value::{Map, Value};

/// Wildcard segment used in schema paths
pub const WILDCARD: &str = "*";

/// Split a dotted path into its segments
pub fn split(path: &str) -> OrmResult<Vec<String>> {
    if path.is_empty() {
        return Err(OrmError::EmptyFieldName);
    }
    Ok(path.split('.').map(str::to_string).collect())
}

/// Split off the first segment of a path
pub fn head(path: &str) -> OrmResult<(&str, Option<&str>)> {
    if path.is_empty() {
        return Err(OrmError::EmptyFieldName);
    }
    Ok(match path.split_once('.') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    })
}

/// Join a base path and a field, either side may be empty
pub fn join(base: &str, field: &str) -> String {
    match (base.is_empty(), field.is_empty()) {
        (true, _) => field.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}.{field}"),
    }
}

/// Replace the last segment of a path with the wildcard
pub fn wildcard(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((parent, _)) => format!("{parent}.{WILDCARD}"),
        None => WILDCARD.to_string(),
    }
}

/// Normalize a concrete path into its schema form, numeric segments become `*`
pub fn schema_path(path: &str) -> String {
    path.split('.')
        .map(|segment| if index(segment).is_some() { WILDCARD } else { segment })
        .collect::<Vec<_>>()
        .join(".")
}

/// Parse an index segment
pub fn index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Read a value inside a raw `Object`/`Array` tree
pub fn get<'a>(root: &'a Value, path: &str) -> OrmResult<Option<&'a Value>> {
    let mut current = root;
    for segment in split(path)? {
        current = match child(current, &segment) {
            Some(value) => value,
            None if is_container(current) => return Ok(None),
            None => {
                return Err(OrmError::InvalidPathSegment {
                    path: path.to_string(),
                    segment,
                })
            }
        };
    }
    Ok(Some(current))
}

/// Check whether a path exists inside a raw tree
pub fn has(root: &Value, path: &str) -> bool {
    matches!(get(root, path), Ok(Some(_)))
}

/// Write a value inside a raw tree, creating intermediate objects
pub fn set(root: &mut Value, path: &str, value: Value) -> OrmResult<()> {
    let segments = split(path)?;
    let (last, parents) = segments
        .split_last()
        .ok_or(OrmError::EmptyFieldName)?;

    let mut current = root;
    for segment in parents {
        current = child_mut_or_insert(current, segment, path)?;
    }
    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let idx = index(last).ok_or_else(|| OrmError::InvalidPathSegment {
                path: path.to_string(),
                segment: last.clone(),
            })?;
            if idx < items.len() {
                items[idx] = value;
            } else {
                items.resize(idx, Value::Null);
                items.push(value);
            }
            Ok(())
        }
        _ => Err(OrmError::InvalidPathSegment {
            path: path.to_string(),
            segment: last.clone(),
        }),
    }
}

/// Remove a value from a raw tree, returning it
pub fn unset(root: &mut Value, path: &str) -> OrmResult<Option<Value>> {
    let segments = split(path)?;
    let (last, parents) = segments
        .split_last()
        .ok_or(OrmError::EmptyFieldName)?;

    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => match map.get_mut(segment.as_str()) {
                Some(value) => value,
                None => return Ok(None),
            },
            Value::Array(items) => match index(segment).and_then(|i| items.get_mut(i)) {
                Some(value) => value,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
    }
    Ok(match current {
        Value::Object(map) => map.shift_remove(last.as_str()),
        Value::Array(items) => match index(last) {
            Some(i) if i < items.len() => Some(items.remove(i)),
            _ => None,
        },
        _ => None,
    })
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => index(segment).and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut_or_insert<'a>(value: &'a mut Value, segment: &str, path: &str) -> OrmResult<&'a mut Value> {
    match value {
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let idx = index(segment).ok_or_else(|| OrmError::InvalidPathSegment {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
            if idx >= items.len() {
                items.resize(idx + 1, Value::Null);
            }
            let slot = &mut items[idx];
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            Ok(slot)
        }
        _ => Err(OrmError::InvalidPathSegment {
            path: path.to_string(),
            segment: segment.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_and_join() {
        assert_eq!(split("a.b.0").unwrap(), vec!["a", "b", "0"]);
        assert_eq!(split("").unwrap_err(), OrmError::EmptyFieldName);
        assert_eq!(join("data", "name"), "data.name");
        assert_eq!(join("", "name"), "name");
        assert_eq!(join("data", ""), "data");
    }

    #[test]
    fn test_wildcard_forms() {
        assert_eq!(wildcard("data.key"), "data.*");
        assert_eq!(wildcard("key"), "*");
        assert_eq!(schema_path("images.0.tags.12"), "images.*.tags.*");
        assert_eq!(index("12"), Some(12));
        assert_eq!(index("-1"), None);
        assert_eq!(index("a1"), None);
    }

    #[test]
    fn test_raw_get_and_has() {
        let root = Value::from(json!({"field1": {"field2": [10, 20]}}));
        assert_eq!(get(&root, "field1.field2.1").unwrap(), Some(&Value::Integer(20)));
        assert!(has(&root, "field1.field2.0"));
        assert!(!has(&root, "field1.field2.5"));
        assert!(!has(&root, "field1.other"));

        let err = get(&root, "field1.field2.0.deeper").unwrap_err();
        assert!(matches!(err, OrmError::InvalidPathSegment { .. }));
    }

    #[test]
    fn test_raw_set_creates_intermediates() {
        let mut root = Value::Object(Map::new());
        set(&mut root, "a.b.c", Value::from(1)).unwrap();
        assert_eq!(root.to_json(), json!({"a": {"b": {"c": 1}}}));

        let mut list = Value::from(json!({"items": []}));
        set(&mut list, "items.1", Value::from("x")).unwrap();
        assert_eq!(list.to_json(), json!({"items": [null, "x"]}));
    }

    #[test]
    fn test_raw_unset() {
        let mut root = Value::from(json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]}));
        assert_eq!(unset(&mut root, "a.b").unwrap(), Some(Value::Integer(1)));
        assert_eq!(unset(&mut root, "list.0").unwrap(), Some(Value::Integer(1)));
        assert_eq!(unset(&mut root, "missing.x").unwrap(), None);
        assert_eq!(root.to_json(), json!({"a": {"c": 2}, "list": [2, 3]}));
    }
}
