//! Resource schemas
//!
//! A [`Schema`] describes every attribute of a resource: its type, whether the
//! user sets it, whether the API computes it, and whether changing it forces
//! replacement. Typed configs carry the data; the schema carries the policy the
//! lifecycle planner needs and what `awsprov schema` prints.
//!
//! # Module Structure
//!
//! - [`diag`] - Validation diagnostics
//! - [`flatmap`] - Flattened `a.#` / `m.%` view of state used by checks
//! - [`validate`] - Reusable validators for typed configs
//! - [`single_block`] - Serde helper for nested blocks with at most one element

pub mod diag;
pub mod flatmap;
pub mod single_block;
pub mod validate;

pub use diag::{Diagnostic, Diagnostics, Severity};
pub use validate::Validate;

use serde::Serialize;
use serde_json::Value;

/// Attribute value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    String,
    Bool,
    Int,
    Map,
    List,
    Set,
}

/// One attribute or nested block
#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub attr_type: AttrType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "no_values")]
    pub valid_values: &'static [&'static str],
    /// Nested block attributes for list/set blocks
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub block: Vec<Attribute>,
    #[serde(skip_serializing_if = "no_description")]
    pub description: &'static str,
}

fn no_values(values: &&'static [&'static str]) -> bool {
    values.is_empty()
}

fn no_description(description: &&'static str) -> bool {
    description.is_empty()
}

impl Attribute {
    fn new(name: &'static str, attr_type: AttrType) -> Self {
        Self {
            name,
            attr_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            min_items: None,
            max_items: None,
            valid_values: &[],
            block: Vec::new(),
            description: "",
        }
    }

    pub fn required(name: &'static str, attr_type: AttrType) -> Self {
        Self {
            required: true,
            ..Self::new(name, attr_type)
        }
    }

    pub fn optional(name: &'static str, attr_type: AttrType) -> Self {
        Self {
            optional: true,
            ..Self::new(name, attr_type)
        }
    }

    pub fn computed(name: &'static str, attr_type: AttrType) -> Self {
        Self {
            computed: true,
            ..Self::new(name, attr_type)
        }
    }

    /// Optional attribute the API fills in when omitted
    pub fn optional_computed(name: &'static str, attr_type: AttrType) -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::new(name, attr_type)
        }
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn items(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self
    }

    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.valid_values = values;
        self
    }

    pub fn with_block(mut self, attributes: Vec<Attribute>) -> Self {
        self.block = attributes;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Whether the user can set this attribute
    pub fn is_configurable(&self) -> bool {
        self.required || self.optional
    }
}

/// Full schema of one resource type
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    pub version: u32,
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self {
            version: 0,
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Configurable attributes whose desired value differs from prior state.
    ///
    /// Optional+computed attributes left unset in `desired` keep whatever the API
    /// assigned and never count as changed.
    pub fn changed_attributes(&self, prior: &Value, desired: &Value) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|attr| attr.is_configurable())
            .filter(|attr| {
                let want = desired.get(attr.name).unwrap_or(&Value::Null);
                if attr.computed && is_empty_value(want) {
                    return false;
                }
                let have = prior.get(attr.name).unwrap_or(&Value::Null);
                !values_equal(have, want)
            })
            .collect()
    }

    /// Names of changed attributes that force replacement
    pub fn replace_triggers(&self, prior: &Value, desired: &Value) -> Vec<&'static str> {
        self.changed_attributes(prior, desired)
            .into_iter()
            .filter(|a| a.force_new)
            .map(|a| a.name)
            .collect()
    }
}

/// Null, empty string and empty collections are the same "unset" value
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Structural equality that treats all unset forms as equal, recursively
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if is_empty_value(a) && is_empty_value(b) {
        return true;
    }
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            let keys: std::collections::BTreeSet<&String> = x.keys().chain(y.keys()).collect();
            keys.into_iter().all(|k| {
                values_equal(
                    x.get(k).unwrap_or(&Value::Null),
                    y.get(k).unwrap_or(&Value::Null),
                )
            })
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            Attribute::required("name", AttrType::String).force_new(),
            Attribute::optional("description", AttrType::String),
            Attribute::optional_computed("engine_version", AttrType::String),
            Attribute::computed("arn", AttrType::String),
            Attribute::optional("tags", AttrType::Map),
        ])
    }

    #[test]
    fn test_no_changes() {
        let prior = json!({"name": "a", "description": null, "engine_version": "1.0", "arn": "x", "tags": {}});
        let desired = json!({"name": "a", "description": "", "engine_version": null, "tags": null});
        assert!(schema().changed_attributes(&prior, &desired).is_empty());
    }

    #[test]
    fn test_update_in_place() {
        let prior = json!({"name": "a", "description": "one"});
        let desired = json!({"name": "a", "description": "two"});
        let s = schema();
        let changed: Vec<_> = s
            .changed_attributes(&prior, &desired)
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(changed, vec!["description"]);
        assert!(s.replace_triggers(&prior, &desired).is_empty());
    }

    #[test]
    fn test_force_new() {
        let prior = json!({"name": "a"});
        let desired = json!({"name": "b"});
        assert_eq!(schema().replace_triggers(&prior, &desired), vec!["name"]);
    }

    #[test]
    fn test_computed_attribute_set_explicitly() {
        let prior = json!({"name": "a", "engine_version": "1.0"});
        let desired = json!({"name": "a", "engine_version": "2.0"});
        assert_eq!(schema().changed_attributes(&prior, &desired).len(), 1);
    }

    #[test]
    fn test_nested_null_equals_missing() {
        let a = json!([{"name": "p", "description": null}]);
        let b = json!([{"name": "p"}]);
        assert!(values_equal(&a, &b));
    }
}
