//! Flattened attribute view of resource state
//!
//! `{"action_point": [{"point": "X"}], "tags": {"k": "v"}}` flattens to
//! `action_point.# = 1`, `action_point.0.point = X`, `tags.% = 1`, `tags.k = v`.
//! Arrays (lists and sets) get a `#` count; objects under an attribute are maps
//! and get a `%` count; objects inside arrays are nested blocks and get none.

use serde_json::Value;
use std::collections::BTreeMap;

pub type FlatMap = BTreeMap<String, String>;

/// Flatten a state object
pub fn flatten(state: &Value) -> FlatMap {
    let mut out = FlatMap::new();
    if let Value::Object(fields) = state {
        for (key, value) in fields {
            flatten_into(&mut out, key, value);
        }
    }
    out
}

/// Flatten the fields of one nested block element
pub fn flatten_block(block: &Value) -> FlatMap {
    flatten(block)
}

fn flatten_into(out: &mut FlatMap, prefix: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            out.insert(format!("{prefix}.#"), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                let item_prefix = format!("{prefix}.{i}");
                match item {
                    Value::Object(fields) => {
                        for (key, v) in fields {
                            flatten_into(out, &format!("{item_prefix}.{key}"), v);
                        }
                    }
                    other => flatten_into(out, &item_prefix, other),
                }
            }
        }
        Value::Object(fields) => {
            out.insert(format!("{prefix}.%"), fields.len().to_string());
            for (key, v) in fields {
                flatten_into(out, &format!("{prefix}.{key}"), v);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar_string(scalar));
        }
    }
}

/// Render a scalar the way configuration text would spell it
pub fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolve a wildcard path like `action_point.*.action.*` to the matching
/// nested block elements
pub fn select<'a>(state: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![state];
    for part in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match (part, value) {
                ("*", Value::Array(items)) => next.extend(items.iter()),
                (index, Value::Array(items)) => {
                    if let Some(v) = index.parse::<usize>().ok().and_then(|i| items.get(i)) {
                        next.push(v);
                    }
                }
                (key, Value::Object(fields)) => {
                    if let Some(v) = fields.get(key) {
                        next.push(v);
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_blocks_and_maps() {
        let state = json!({
            "name": "ext",
            "version": 2,
            "action_point": [
                {"point": "ON_DEPLOYMENT_COMPLETE", "action": [{"name": "test", "description": null}]}
            ],
            "parameter": [],
            "tags": {"key1": "value1"}
        });
        let flat = flatten(&state);
        assert_eq!(flat["name"], "ext");
        assert_eq!(flat["version"], "2");
        assert_eq!(flat["action_point.#"], "1");
        assert_eq!(flat["action_point.0.point"], "ON_DEPLOYMENT_COMPLETE");
        assert_eq!(flat["action_point.0.action.#"], "1");
        assert_eq!(flat["action_point.0.action.0.name"], "test");
        assert!(!flat.contains_key("action_point.0.action.0.description"));
        assert_eq!(flat["parameter.#"], "0");
        assert_eq!(flat["tags.%"], "1");
        assert_eq!(flat["tags.key1"], "value1");
    }

    #[test]
    fn test_flatten_scalar_lists() {
        let flat = flatten(&json!({"subnet_ids": ["a", "b"], "required": true}));
        assert_eq!(flat["subnet_ids.#"], "2");
        assert_eq!(flat["subnet_ids.1"], "b");
        assert_eq!(flat["required"], "true");
    }

    #[test]
    fn test_select_wildcards() {
        let state = json!({
            "action_point": [
                {"point": "A", "action": [{"name": "a1"}, {"name": "a2"}]},
                {"point": "B", "action": [{"name": "b1"}]}
            ]
        });
        assert_eq!(select(&state, "action_point.*").len(), 2);
        let actions = select(&state, "action_point.*.action.*");
        assert_eq!(actions.len(), 3);
        assert_eq!(select(&state, "action_point.1.action.*").len(), 1);
        assert!(select(&state, "parameter.*").is_empty());
    }
}
