//! Deep-merge helpers for JSON configuration trees.

use serde_json::Value;

/// Merge `other` into `base` without overwriting anything `base` already has.
///
/// Objects merge key by key and arrays index by index; wherever both sides
/// hold a container at the same position the merge recurses. Values only
/// present in `other` are copied over.
pub fn merge_tree(base: &mut Value, other: &Value) {
    match (base, other) {
        (Value::Object(base), Value::Object(other)) => {
            for (key, value) in other {
                match base.get_mut(key) {
                    Some(existing) if is_container(existing) && is_container(value) => {
                        merge_tree(existing, value)
                    }
                    Some(_) => {}
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(other)) => {
            for (index, value) in other.iter().enumerate() {
                match base.get_mut(index) {
                    Some(existing) if is_container(existing) && is_container(value) => {
                        merge_tree(existing, value)
                    }
                    Some(_) => {}
                    None => base.push(value.clone()),
                }
            }
        }
        _ => {}
    }
}

/// Merge `patch` into `base`, accumulating values that collide.
///
/// Objects merge key by key. When a key exists on both sides and the values
/// are not both objects, the result is a list holding the values of both
/// sides, in order (`{"a": 1}` + `{"a": 2}` gives `{"a": [1, 2]}`). Lists are
/// concatenated.
pub fn merge_recursive(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => merge_recursive_value(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => merge_recursive_value(base, patch),
    }
}

fn merge_recursive_value(existing: &mut Value, value: &Value) {
    if existing.is_object() && value.is_object() {
        merge_recursive(existing, value);
        return;
    }

    let mut items = into_list(existing.take());
    items.extend(into_list(value.clone()));
    *existing = Value::Array(items);
}

fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Remove from `base` everything that `remove` contributed to it.
///
/// Scalars under a key present in `remove` are dropped; list entries equal to
/// a value of the matching list in `remove` are dropped; nested containers
/// recurse and disappear once empty. Lists are re-indexed.
pub fn recursive_diff(base: &Value, remove: &Value) -> Value {
    match base {
        Value::Array(items) => {
            let mut kept = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                if is_container(item) {
                    match remove.get(index) {
                        Some(nested) if !nested.is_null() => {
                            let diff = recursive_diff(item, nested);
                            if !is_empty_container(&diff) {
                                kept.push(diff);
                            }
                        }
                        _ => kept.push(item.clone()),
                    }
                } else if !contains_value(remove, item) {
                    kept.push(item.clone());
                }
            }
            Value::Array(kept)
        }
        Value::Object(map) => {
            let mut kept = serde_json::Map::new();
            for (key, item) in map {
                let counterpart = remove
                    .as_object()
                    .and_then(|r| r.get(key))
                    .filter(|v| !v.is_null());

                match counterpart {
                    None => {
                        kept.insert(key.clone(), item.clone());
                    }
                    Some(_) if !is_container(item) => {}
                    Some(nested) => {
                        let diff = recursive_diff(item, nested);
                        if !is_empty_container(&diff) {
                            kept.insert(key.clone(), diff);
                        }
                    }
                }
            }
            Value::Object(kept)
        }
        other => other.clone(),
    }
}

fn contains_value(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::Object(map) => map.values().any(|v| v == needle),
        _ => false,
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
