//! Item validation against a compiled schema.
//!
//! Validation stops at the first violation and reports its path.
//! The validator never mutates the item.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use super::errors::{SchemaResult, ValidationDetails};
use super::types::{AdditionalProperties, JsonType, SchemaNode};
use crate::expression::values_equal;

/// A compiled schema with a usage counter.
///
/// The counter counts successful validations; once it reaches the refresh
/// threshold the owner should recompile from the stored document.
#[derive(Debug)]
pub struct SchemaValidator {
    root: SchemaNode,
    uses: AtomicU64,
    refresh_after: u64,
}

impl SchemaValidator {
    pub fn compile(document: &Value, refresh_after: u64) -> SchemaResult<Self> {
        Ok(Self {
            root: SchemaNode::compile(document)?,
            uses: AtomicU64::new(0),
            refresh_after,
        })
    }

    pub fn validate(&self, item: &Value) -> SchemaResult<()> {
        check(&self.root, item, "$")?;
        self.uses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn uses(&self) -> u64 {
        self.uses.load(Ordering::Relaxed)
    }

    pub fn needs_refresh(&self) -> bool {
        self.uses() >= self.refresh_after
    }
}

/// Validates `value` against `node`; `path` names `value` in errors
pub fn check(node: &SchemaNode, value: &Value, path: &str) -> SchemaResult<()> {
    match node.constant {
        Some(true) => return Ok(()),
        Some(false) => return Err(ValidationDetails::new(path, "no value", "a value").into()),
        None => {}
    }

    if !node.types.is_empty() && !node.types.iter().any(|t| t.matches(value)) {
        let expected = node
            .types
            .iter()
            .map(JsonType::type_name)
            .collect::<Vec<_>>()
            .join(" or ");
        return Err(ValidationDetails::new(path, expected, JsonType::of(value)).into());
    }

    if let Some(allowed) = &node.enum_values {
        if !allowed.iter().any(|a| values_equal(a, value)) {
            return Err(ValidationDetails::new(path, "one of the enumerated values", value.to_string()).into());
        }
    }
    if let Some(expected) = &node.const_value {
        if !values_equal(expected, value) {
            return Err(ValidationDetails::new(path, expected.to_string(), value.to_string()).into());
        }
    }

    match value {
        Value::Object(object) => {
            for name in &node.required {
                if !object.contains_key(name) {
                    return Err(ValidationDetails::missing_field(format!("{}.{}", path, name)).into());
                }
            }
            for (name, member) in object {
                let member_path = format!("{}.{}", path, name);
                let mut declared = false;
                if let Some(child) = node.properties.get(name) {
                    check(child, member, &member_path)?;
                    declared = true;
                }
                for (pattern, child) in &node.pattern_properties {
                    if pattern.is_match(name) {
                        check(child, member, &member_path)?;
                        declared = true;
                    }
                }
                if !declared {
                    match &node.additional_properties {
                        AdditionalProperties::Allowed => {}
                        AdditionalProperties::Denied => {
                            return Err(ValidationDetails::extra_field(member_path).into())
                        }
                        AdditionalProperties::Schema(child) => check(child, member, &member_path)?,
                    }
                }
            }
            bounds(path, "properties", object.len(), node.min_properties, node.max_properties)?;
        }
        Value::Array(list) => {
            if let Some(items) = &node.items {
                for (i, element) in list.iter().enumerate() {
                    check(items, element, &format!("{}[{}]", path, i))?;
                }
            }
            bounds(path, "items", list.len(), node.min_items, node.max_items)?;
            if node.unique_items {
                for (i, a) in list.iter().enumerate() {
                    if list[i + 1..].iter().any(|b| values_equal(a, b)) {
                        return Err(ValidationDetails::new(path, "unique items", "duplicates").into());
                    }
                }
            }
        }
        Value::String(s) => {
            bounds(path, "characters", s.chars().count(), node.min_length, node.max_length)?;
            if let Some(pattern) = &node.pattern {
                if !pattern.is_match(s) {
                    return Err(ValidationDetails::new(
                        path,
                        format!("string matching {}", pattern.as_str()),
                        format!("{:?}", s),
                    )
                    .into());
                }
            }
        }
        Value::Number(n) => {
            if let Some(x) = n.as_f64() {
                check_number(node, x, path)?;
            }
        }
        Value::Null | Value::Bool(_) => {}
    }

    for child in &node.all_of {
        check(child, value, path)?;
    }
    if !node.any_of.is_empty() && !node.any_of.iter().any(|child| check(child, value, path).is_ok()) {
        return Err(ValidationDetails::new(path, "a match for anyOf", "no match").into());
    }
    if !node.one_of.is_empty() {
        let matched = node
            .one_of
            .iter()
            .filter(|child| check(child, value, path).is_ok())
            .count();
        if matched != 1 {
            return Err(ValidationDetails::new(
                path,
                "exactly one match for oneOf",
                format!("{} matches", matched),
            )
            .into());
        }
    }
    if let Some(not) = &node.not {
        if check(not, value, path).is_ok() {
            return Err(ValidationDetails::new(path, "no match for not", "a match").into());
        }
    }

    Ok(())
}

fn check_number(node: &SchemaNode, x: f64, path: &str) -> SchemaResult<()> {
    let violated = |expected: String| -> SchemaResult<()> {
        Err(ValidationDetails::new(path, expected, x.to_string()).into())
    };
    if let Some(min) = node.minimum {
        if x < min {
            return violated(format!(">= {}", min));
        }
    }
    if let Some(max) = node.maximum {
        if x > max {
            return violated(format!("<= {}", max));
        }
    }
    if let Some(min) = node.exclusive_minimum {
        if x <= min {
            return violated(format!("> {}", min));
        }
    }
    if let Some(max) = node.exclusive_maximum {
        if x >= max {
            return violated(format!("< {}", max));
        }
    }
    if let Some(step) = node.multiple_of {
        let ratio = x / step;
        if (ratio - ratio.round()).abs() > 1e-9 {
            return violated(format!("multiple of {}", step));
        }
    }
    Ok(())
}

fn bounds(path: &str, unit: &str, len: usize, min: Option<usize>, max: Option<usize>) -> SchemaResult<()> {
    if let Some(min) = min {
        if len < min {
            return Err(ValidationDetails::new(path, format!("at least {} {}", min, unit), len.to_string()).into());
        }
    }
    if let Some(max) = max {
        if len > max {
            return Err(ValidationDetails::new(path, format!("at most {} {}", max, unit), len.to_string()).into());
        }
    }
    Ok(())
}
