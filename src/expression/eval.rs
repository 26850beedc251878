//! Update expression evaluation.
//!
//! Grammar (top-level attributes only):
//!
//! ```text
//! SET    path = :value [, ...]
//! REMOVE path [, ...]
//! ADD    path :value [, ...]
//!
//! path := #name | identifier
//! ```
//!
//! `ADD` on a number adds numerically (absent counts as zero); on an array
//! it appends elements not already present.

use std::collections::BTreeMap;

use serde_json::{Number, Value};
use thiserror::Error;

use super::condition::values_equal;
use super::update::{ClauseKind, UpdateExpressionBuilder};
use crate::storage::Item;

#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    #[error("Invalid UpdateExpression: {0}")]
    Syntax(String),

    #[error("An expression attribute name used in the document path is not defined: {0}")]
    UndefinedName(String),

    #[error("An expression attribute value used in expression is not defined: {0}")]
    UndefinedValue(String),

    #[error("Incorrect operand type for operator or function; attribute: {0}")]
    OperandType(String),

    #[error("Two document paths overlap with each other: {0}")]
    OverlappingPaths(String),
}

pub type ExpressionResult<T> = Result<T, ExpressionError>;

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set(String, Value),
    Remove(String),
    Add(String, Value),
}

impl UpdateAction {
    pub fn attribute(&self) -> &str {
        match self {
            UpdateAction::Set(a, _) | UpdateAction::Remove(a) | UpdateAction::Add(a, _) => a,
        }
    }
}

/// A resolved update: placeholders substituted, ready to apply
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledUpdate {
    actions: Vec<UpdateAction>,
}

impl CompiledUpdate {
    pub fn compile(
        expression: &str,
        names: &BTreeMap<String, String>,
        values: &BTreeMap<String, Value>,
    ) -> ExpressionResult<Self> {
        let builder = UpdateExpressionBuilder::parse(expression);
        if builder.is_empty() && !expression.trim().is_empty() {
            return Err(ExpressionError::Syntax(expression.to_string()));
        }
        let resolver = Resolver { names, values };
        let mut actions = Vec::new();

        for kind in ClauseKind::ALL {
            let Some(clause) = builder.clause(kind) else {
                continue;
            };
            for part in clause.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    return Err(ExpressionError::Syntax(clause.to_string()));
                }
                actions.push(match kind {
                    ClauseKind::Set => resolver.set_action(part)?,
                    ClauseKind::Remove => UpdateAction::Remove(resolver.path(part)?),
                    ClauseKind::Add => resolver.add_action(part)?,
                });
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for action in &actions {
            if !seen.insert(action.attribute()) {
                return Err(ExpressionError::OverlappingPaths(action.attribute().to_string()));
            }
        }
        Ok(Self { actions })
    }

    pub fn actions(&self) -> &[UpdateAction] {
        &self.actions
    }

    /// Attributes written or removed by this update
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(UpdateAction::attribute)
    }

    /// Applies every action to `item`. `ADD` reads the pre-update image;
    /// on error `item` is left unchanged.
    pub fn apply(&self, item: &mut Item) -> ExpressionResult<()> {
        let before = item.clone();
        let mut next = item.clone();
        for action in &self.actions {
            match action {
                UpdateAction::Set(attribute, value) => {
                    next.insert(attribute.clone(), value.clone());
                }
                UpdateAction::Remove(attribute) => {
                    next.remove(attribute);
                }
                UpdateAction::Add(attribute, value) => {
                    let merged = add_values(before.get(attribute), value, attribute)?;
                    next.insert(attribute.clone(), merged);
                }
            }
        }
        *item = next;
        Ok(())
    }
}

struct Resolver<'a> {
    names: &'a BTreeMap<String, String>,
    values: &'a BTreeMap<String, Value>,
}

impl Resolver<'_> {
    fn path(&self, token: &str) -> ExpressionResult<String> {
        let token = token.trim();
        if let Some(stripped) = token.strip_prefix('#') {
            if stripped.is_empty() {
                return Err(ExpressionError::Syntax(token.to_string()));
            }
            return self
                .names
                .get(token)
                .cloned()
                .ok_or_else(|| ExpressionError::UndefinedName(token.to_string()));
        }
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(token.to_string())
        } else {
            Err(ExpressionError::Syntax(format!("unsupported document path {}", token)))
        }
    }

    fn value(&self, token: &str) -> ExpressionResult<Value> {
        let token = token.trim();
        self.values
            .get(token)
            .cloned()
            .ok_or_else(|| ExpressionError::UndefinedValue(token.to_string()))
    }

    fn set_action(&self, part: &str) -> ExpressionResult<UpdateAction> {
        let (lhs, rhs) = part
            .split_once('=')
            .ok_or_else(|| ExpressionError::Syntax(part.to_string()))?;
        let rhs = rhs.trim();
        if !rhs.starts_with(':') {
            return Err(ExpressionError::Syntax(part.to_string()));
        }
        Ok(UpdateAction::Set(self.path(lhs)?, self.value(rhs)?))
    }

    fn add_action(&self, part: &str) -> ExpressionResult<UpdateAction> {
        let mut tokens = part.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(path), Some(value), None) if value.starts_with(':') => {
                Ok(UpdateAction::Add(self.path(path)?, self.value(value)?))
            }
            _ => Err(ExpressionError::Syntax(part.to_string())),
        }
    }
}

fn add_numbers(x: &Number, y: &Number) -> Value {
    if let Some(n) = x.as_i64().zip(y.as_i64()).and_then(|(a, b)| a.checked_add(b)) {
        return Value::from(n);
    }
    let n = x.as_f64().unwrap_or(0.0) + y.as_f64().unwrap_or(0.0);
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn add_values(current: Option<&Value>, delta: &Value, attribute: &str) -> ExpressionResult<Value> {
    match (current, delta) {
        (None, Value::Number(_)) | (None, Value::Array(_)) => Ok(delta.clone()),
        (Some(Value::Number(x)), Value::Number(y)) => Ok(add_numbers(x, y)),
        (Some(Value::Array(existing)), Value::Array(more)) => {
            let mut merged = existing.clone();
            for v in more {
                if !merged.iter().any(|e| values_equal(e, v)) {
                    merged.push(v.clone());
                }
            }
            Ok(Value::Array(merged))
        }
        _ => Err(ExpressionError::OperandType(attribute.to_string())),
    }
}
