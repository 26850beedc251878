//! Compiled JSON Schema subset
//!
//! Supported keywords:
//! - type (single name or list), enum, const
//! - properties, patternProperties, required, additionalProperties,
//!   minProperties, maxProperties
//! - items, minItems, maxItems, uniqueItems
//! - minLength, maxLength, pattern
//! - minimum, maximum, exclusiveMinimum, exclusiveMaximum, multipleOf
//! - allOf, anyOf, oneOf, not
//!
//! Annotation keywords ($schema, $id, title, description, format, default,
//! examples, $comment) are accepted and ignored. Any other keyword fails
//! compilation, so a stored schema never validates less than it states.
//! Boolean schemas are supported.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};

use super::errors::{SchemaError, SchemaResult};

const KEYWORDS: &[&str] = &[
    "type",
    "enum",
    "const",
    "properties",
    "patternProperties",
    "required",
    "additionalProperties",
    "minProperties",
    "maxProperties",
    "items",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minLength",
    "maxLength",
    "pattern",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
];

const ANNOTATIONS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "title",
    "description",
    "format",
    "default",
    "examples",
];

/// JSON value types named by the `type` keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl JsonType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "null" => Some(JsonType::Null),
            "boolean" => Some(JsonType::Boolean),
            "object" => Some(JsonType::Object),
            "array" => Some(JsonType::Array),
            "number" => Some(JsonType::Number),
            "integer" => Some(JsonType::Integer),
            "string" => Some(JsonType::String),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::String => "string",
        }
    }

    /// Whether `value` is an instance of this type. Integral floats are integers.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::Null => value.is_null(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::Number => value.is_number(),
            JsonType::String => value.is_string(),
            JsonType::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
                }
                _ => false,
            },
        }
    }

    /// Type name of an arbitrary value, for error messages
    pub fn of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_f64() => "number",
            Value::Number(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Policy for object members not named in `properties`
#[derive(Debug, Clone)]
pub enum AdditionalProperties {
    Allowed,
    Denied,
    Schema(Box<SchemaNode>),
}

/// One compiled schema node
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// `Some(false)` for the `false` schema, `Some(true)` for `true`
    pub constant: Option<bool>,
    pub types: Vec<JsonType>,
    pub enum_values: Option<Vec<Value>>,
    pub const_value: Option<Value>,

    pub properties: BTreeMap<String, SchemaNode>,
    pub pattern_properties: Vec<(Regex, SchemaNode)>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
    pub min_properties: Option<usize>,
    pub max_properties: Option<usize>,

    pub items: Option<Box<SchemaNode>>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,

    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,

    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,

    pub all_of: Vec<SchemaNode>,
    pub any_of: Vec<SchemaNode>,
    pub one_of: Vec<SchemaNode>,
    pub not: Option<Box<SchemaNode>>,
}

impl SchemaNode {
    fn empty() -> Self {
        Self {
            constant: None,
            types: Vec::new(),
            enum_values: None,
            const_value: None,
            properties: BTreeMap::new(),
            pattern_properties: Vec::new(),
            required: Vec::new(),
            additional_properties: AdditionalProperties::Allowed,
            min_properties: None,
            max_properties: None,
            items: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            min_length: None,
            max_length: None,
            pattern: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            multiple_of: None,
            all_of: Vec::new(),
            any_of: Vec::new(),
            one_of: Vec::new(),
            not: None,
        }
    }

    /// Compiles a schema document
    pub fn compile(document: &Value) -> SchemaResult<Self> {
        compile_node(document, "$")
    }
}

fn compile_node(document: &Value, path: &str) -> SchemaResult<SchemaNode> {
    let object = match document {
        Value::Bool(b) => {
            let mut node = SchemaNode::empty();
            node.constant = Some(*b);
            return Ok(node);
        }
        Value::Object(object) => object,
        other => {
            return Err(SchemaError::invalid(
                path,
                format!("schema must be an object or boolean, got {}", JsonType::of(other)),
            ))
        }
    };

    if let Some(unsupported) = object
        .keys()
        .find(|k| !KEYWORDS.contains(&k.as_str()) && !ANNOTATIONS.contains(&k.as_str()))
    {
        return Err(SchemaError::invalid(
            path,
            format!("unsupported keyword {}", unsupported),
        ));
    }

    let mut node = SchemaNode::empty();

    if let Some(kind) = object.get("type") {
        node.types = compile_types(kind, path)?;
    }
    if let Some(values) = object.get("enum") {
        match values {
            Value::Array(list) if !list.is_empty() => node.enum_values = Some(list.clone()),
            _ => return Err(SchemaError::invalid(path, "enum must be a non-empty array")),
        }
    }
    node.const_value = object.get("const").cloned();

    if let Some(properties) = object.get("properties") {
        let properties = properties
            .as_object()
            .ok_or_else(|| SchemaError::invalid(path, "properties must be an object"))?;
        for (name, child) in properties {
            let child_path = format!("{}.properties.{}", path, name);
            node.properties.insert(name.clone(), compile_node(child, &child_path)?);
        }
    }
    if let Some(patterns) = object.get("patternProperties") {
        let patterns = patterns
            .as_object()
            .ok_or_else(|| SchemaError::invalid(path, "patternProperties must be an object"))?;
        for (pattern, child) in patterns {
            let compiled = compile_pattern(pattern, path)?;
            let child_path = format!("{}.patternProperties.{}", path, pattern);
            node.pattern_properties.push((compiled, compile_node(child, &child_path)?));
        }
    }
    if let Some(required) = object.get("required") {
        node.required = string_list(required)
            .ok_or_else(|| SchemaError::invalid(path, "required must be an array of strings"))?;
    }
    if let Some(additional) = object.get("additionalProperties") {
        node.additional_properties = match additional {
            Value::Bool(true) => AdditionalProperties::Allowed,
            Value::Bool(false) => AdditionalProperties::Denied,
            other => AdditionalProperties::Schema(Box::new(compile_node(
                other,
                &format!("{}.additionalProperties", path),
            )?)),
        };
    }
    node.min_properties = count(object, "minProperties", path)?;
    node.max_properties = count(object, "maxProperties", path)?;

    if let Some(items) = object.get("items") {
        node.items = Some(Box::new(compile_node(items, &format!("{}.items", path))?));
    }
    node.min_items = count(object, "minItems", path)?;
    node.max_items = count(object, "maxItems", path)?;
    if let Some(unique) = object.get("uniqueItems") {
        node.unique_items = unique
            .as_bool()
            .ok_or_else(|| SchemaError::invalid(path, "uniqueItems must be a boolean"))?;
    }

    node.min_length = count(object, "minLength", path)?;
    node.max_length = count(object, "maxLength", path)?;
    if let Some(pattern) = object.get("pattern") {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| SchemaError::invalid(path, "pattern must be a string"))?;
        node.pattern = Some(compile_pattern(pattern, path)?);
    }

    node.minimum = number(object, "minimum", path)?;
    node.maximum = number(object, "maximum", path)?;
    node.exclusive_minimum = number(object, "exclusiveMinimum", path)?;
    node.exclusive_maximum = number(object, "exclusiveMaximum", path)?;
    node.multiple_of = number(object, "multipleOf", path)?;
    if matches!(node.multiple_of, Some(m) if m <= 0.0) {
        return Err(SchemaError::invalid(path, "multipleOf must be positive"));
    }

    node.all_of = subschemas(object, "allOf", path)?;
    node.any_of = subschemas(object, "anyOf", path)?;
    node.one_of = subschemas(object, "oneOf", path)?;
    if let Some(not) = object.get("not") {
        node.not = Some(Box::new(compile_node(not, &format!("{}.not", path))?));
    }

    Ok(node)
}

fn compile_pattern(pattern: &str, path: &str) -> SchemaResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| SchemaError::invalid(path, format!("pattern does not compile: {}", e)))
}

fn compile_types(kind: &Value, path: &str) -> SchemaResult<Vec<JsonType>> {
    let names = match kind {
        Value::String(name) => vec![name.clone()],
        other => string_list(other)
            .ok_or_else(|| SchemaError::invalid(path, "type must be a string or array of strings"))?,
    };
    names
        .iter()
        .map(|name| {
            JsonType::parse(name)
                .ok_or_else(|| SchemaError::invalid(path, format!("unknown type {}", name)))
        })
        .collect()
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn count(object: &Map<String, Value>, keyword: &str, path: &str) -> SchemaResult<Option<usize>> {
    match object.get(keyword) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| SchemaError::invalid(path, format!("{} must be a non-negative integer", keyword))),
    }
}

fn number(object: &Map<String, Value>, keyword: &str, path: &str) -> SchemaResult<Option<f64>> {
    match object.get(keyword) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| SchemaError::invalid(path, format!("{} must be a number", keyword))),
    }
}

fn subschemas(object: &Map<String, Value>, keyword: &str, path: &str) -> SchemaResult<Vec<SchemaNode>> {
    match object.get(keyword) {
        None => Ok(Vec::new()),
        Some(Value::Array(list)) if !list.is_empty() => list
            .iter()
            .enumerate()
            .map(|(i, child)| compile_node(child, &format!("{}.{}[{}]", path, keyword, i)))
            .collect(),
        Some(_) => Err(SchemaError::invalid(path, format!("{} must be a non-empty array", keyword))),
    }
}
