//! Parameter override
//!
//! Patches applied to the already serialized upstream body. Two forms are
//! accepted:
//!
//! - a plain object: each top-level key replaces or adds the body key;
//! - an object with an `operations` array, each entry editing one dotted
//!   path (`set`, `delete`, `move`, `append`, `prepend`), optionally gated
//!   by conditions on the body.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    path: String,
    mode: OperationMode,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    keep_origin: bool,
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default)]
    logic: Logic,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OperationMode {
    Set,
    Delete,
    Move,
    Append,
    Prepend,
}

#[derive(Debug, Deserialize)]
struct Condition {
    path: String,
    mode: MatchMode,
    value: Value,
    #[serde(default)]
    invert: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MatchMode {
    Full,
    Prefix,
    Suffix,
    Contains,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
enum Logic {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Apply `overrides` to a serialized JSON object body
pub fn apply_param_override(body: &[u8], overrides: &Map<String, Value>) -> Result<Vec<u8>> {
    let mut root: Value = serde_json::from_slice(body).context("Request body is not valid JSON")?;
    if !root.is_object() {
        anyhow::bail!("Request body must be a JSON object to apply overrides");
    }

    match overrides.get("operations") {
        Some(operations) => {
            let operations: Vec<Operation> = serde_json::from_value(operations.clone())
                .context("Invalid override operations")?;
            for (index, operation) in operations.iter().enumerate() {
                apply_operation(&mut root, operation)
                    .with_context(|| format!("Override operation #{} failed", index))?;
            }
        }
        None => {
            if let Value::Object(object) = &mut root {
                for (key, value) in overrides {
                    object.insert(key.clone(), value.clone());
                }
            }
        }
    }

    serde_json::to_vec(&root).context("Failed to serialize overridden body")
}

fn apply_operation(root: &mut Value, operation: &Operation) -> Result<()> {
    if !conditions_hold(root, &operation.conditions, operation.logic) {
        return Ok(());
    }

    match operation.mode {
        OperationMode::Set => {
            let value = required_value(operation)?;
            if operation.keep_origin && get_path(root, &operation.path).is_some() {
                return Ok(());
            }
            set_path(root, &operation.path, value.clone())
        }
        OperationMode::Delete => {
            remove_path(root, &operation.path);
            Ok(())
        }
        OperationMode::Move => {
            let from = operation.from.as_deref().context("move requires 'from'")?;
            let to = operation.to.as_deref().context("move requires 'to'")?;
            match remove_path(root, from) {
                Some(value) => set_path(root, to, value),
                None => Ok(()),
            }
        }
        OperationMode::Append | OperationMode::Prepend => {
            let value = required_value(operation)?.clone();
            let front = matches!(operation.mode, OperationMode::Prepend);
            match get_path_mut(root, &operation.path) {
                None => set_path(root, &operation.path, value),
                Some(Value::Array(items)) => {
                    let new_items = match value {
                        Value::Array(values) => values,
                        other => vec![other],
                    };
                    if front {
                        let tail = std::mem::replace(items, new_items);
                        items.extend(tail);
                    } else {
                        items.extend(new_items);
                    }
                    Ok(())
                }
                Some(Value::String(existing)) => {
                    let Value::String(addition) = value else {
                        anyhow::bail!("Only strings can be joined to string field '{}'", operation.path);
                    };
                    if front {
                        existing.insert_str(0, &addition);
                    } else {
                        existing.push_str(&addition);
                    }
                    Ok(())
                }
                Some(_) => anyhow::bail!("Field '{}' is neither an array nor a string", operation.path),
            }
        }
    }
}

fn required_value(operation: &Operation) -> Result<&Value> {
    operation
        .value
        .as_ref()
        .with_context(|| format!("Operation on '{}' requires 'value'", operation.path))
}

fn conditions_hold(root: &Value, conditions: &[Condition], logic: Logic) -> bool {
    if conditions.is_empty() {
        return true;
    }

    let mut results = conditions.iter().map(|condition| {
        let matched = get_path(root, &condition.path)
            .map(|target| value_matches(target, &condition.value, condition.mode))
            .unwrap_or(false);
        matched != condition.invert
    });

    match logic {
        Logic::And => results.all(|r| r),
        Logic::Or => results.any(|r| r),
    }
}

fn value_matches(target: &Value, expected: &Value, mode: MatchMode) -> bool {
    match (mode, target, expected) {
        (MatchMode::Full, _, _) => target == expected,
        (MatchMode::Prefix, Value::String(t), Value::String(e)) => t.starts_with(e.as_str()),
        (MatchMode::Suffix, Value::String(t), Value::String(e)) => t.ends_with(e.as_str()),
        (MatchMode::Contains, Value::String(t), Value::String(e)) => t.contains(e.as_str()),
        _ => false,
    }
}

fn segments(path: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = path.split('.').collect();
    if path.is_empty() || parts.iter().any(|p| p.is_empty()) {
        anyhow::bail!("Invalid override path '{}'", path);
    }
    Ok(parts)
}

fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments(path).ok()? {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn get_path_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments(path).ok()? {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let parts = segments(path)?;
    let (last, parents) = parts
        .split_last()
        .with_context(|| format!("Invalid override path '{}'", path))?;

    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .with_context(|| format!("'{}' is not an array index", segment))?;
                items
                    .get_mut(index)
                    .with_context(|| format!("Index {} out of bounds in '{}'", index, path))?
            }
            _ => anyhow::bail!("Cannot descend into scalar at '{}' in '{}'", segment, path),
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
        }
        Value::Array(items) => {
            let index: usize = last
                .parse()
                .with_context(|| format!("'{}' is not an array index", last))?;
            let slot = items
                .get_mut(index)
                .with_context(|| format!("Index {} out of bounds in '{}'", index, path))?;
            *slot = value;
        }
        _ => anyhow::bail!("Cannot set '{}' on a scalar", path),
    }
    Ok(())
}

fn remove_path(root: &mut Value, path: &str) -> Option<Value> {
    let parts = segments(path).ok()?;
    let (last, parents) = parts.split_last()?;

    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => map.get_mut(*segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Object(map) => map.remove(*last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(body: Value, overrides: Value) -> Result<Value> {
        let overrides = overrides.as_object().cloned().unwrap();
        let out = apply_param_override(&serde_json::to_vec(&body).unwrap(), &overrides)?;
        Ok(serde_json::from_slice(&out).unwrap())
    }

    #[test]
    fn test_plain_merge() {
        let out = apply(
            json!({"model": "gpt-image-1", "n": 1}),
            json!({"n": 4, "watermark": false}),
        )
        .unwrap();
        assert_eq!(out, json!({"model": "gpt-image-1", "n": 4, "watermark": false}));
    }

    #[test]
    fn test_non_object_body_is_error() {
        assert!(apply(json!([1, 2]), json!({"a": 1})).is_err());
        let overrides = json!({"a": 1}).as_object().cloned().unwrap();
        assert!(apply_param_override(b"not json", &overrides).is_err());
    }

    #[test]
    fn test_set_nested_and_keep_origin() {
        let out = apply(
            json!({"model": "m", "extra": {"seed": 1}}),
            json!({"operations": [
                {"path": "extra.seed", "mode": "set", "value": 9, "keep_origin": true},
                {"path": "extra.style.name", "mode": "set", "value": "vivid"}
            ]}),
        )
        .unwrap();
        assert_eq!(out["extra"]["seed"], json!(1));
        assert_eq!(out["extra"]["style"]["name"], json!("vivid"));
    }

    #[test]
    fn test_delete_and_move() {
        let out = apply(
            json!({"quality": "hd", "size": "1024x1024", "tags": ["a", "b"]}),
            json!({"operations": [
                {"path": "quality", "mode": "delete"},
                {"path": "tags.0", "mode": "delete"},
                {"mode": "move", "from": "size", "to": "resolution"},
                {"mode": "move", "from": "missing", "to": "elsewhere"}
            ]}),
        )
        .unwrap();
        assert_eq!(out, json!({"resolution": "1024x1024", "tags": ["b"]}));
    }

    #[test]
    fn test_append_prepend() {
        let out = apply(
            json!({"prompt": "a cat", "stop": ["x"]}),
            json!({"operations": [
                {"path": "prompt", "mode": "append", "value": ", watercolor"},
                {"path": "prompt", "mode": "prepend", "value": "Draw "},
                {"path": "stop", "mode": "prepend", "value": ["w"]},
                {"path": "stop", "mode": "append", "value": "y"},
                {"path": "fresh", "mode": "append", "value": [1]}
            ]}),
        )
        .unwrap();
        assert_eq!(out["prompt"], json!("Draw a cat, watercolor"));
        assert_eq!(out["stop"], json!(["w", "x", "y"]));
        assert_eq!(out["fresh"], json!([1]));
    }

    #[test]
    fn test_conditions() {
        let overrides = json!({"operations": [
            {
                "path": "watermark", "mode": "set", "value": false,
                "conditions": [{"path": "model", "mode": "prefix", "value": "seedream"}]
            },
            {
                "path": "quality", "mode": "set", "value": "standard",
                "conditions": [
                    {"path": "model", "mode": "contains", "value": "dall"},
                    {"path": "size", "mode": "full", "value": "256x256"}
                ],
                "logic": "OR"
            },
            {
                "path": "style", "mode": "set", "value": "natural",
                "conditions": [{"path": "model", "mode": "suffix", "value": "3-0", "invert": true}]
            }
        ]});

        let out = apply(json!({"model": "seedream-3-0"}), overrides.clone()).unwrap();
        assert_eq!(out["watermark"], json!(false));
        assert!(out.get("quality").is_none());
        assert!(out.get("style").is_none());

        let out = apply(json!({"model": "flux", "size": "256x256"}), overrides).unwrap();
        assert!(out.get("watermark").is_none());
        assert_eq!(out["quality"], json!("standard"));
        assert_eq!(out["style"], json!("natural"));
    }

    #[test]
    fn test_invalid_operations() {
        assert!(apply(json!({}), json!({"operations": [{"path": "a", "mode": "explode"}]})).is_err());
        assert!(apply(json!({}), json!({"operations": [{"path": "a", "mode": "set"}]})).is_err());
        assert!(apply(json!({}), json!({"operations": [{"path": "a..b", "mode": "set", "value": 1}]})).is_err());
        assert!(apply(json!({"n": 1}), json!({"operations": [{"path": "n", "mode": "append", "value": 2}]})).is_err());
        assert!(apply(json!({}), json!({"operations": "nope"})).is_err());
    }
}
