//! Update expression assembly.
//!
//! An update expression holds up to three clauses, rendered in fixed order:
//!
//! ```text
//! SET #a0 = :a0, #lud = :lud REMOVE #a1 ADD #ItemVersion :incr
//! ```
//!
//! Repeated contributions to the same clause are merged with `", "`.
//! Attribute names and values are bound through `#name` and `:value`
//! placeholders carried alongside the expression.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::condition::Condition;
use crate::storage::{ItemKey, UpdateRequest};

/// Clause kinds, ordered as they render
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClauseKind {
    Set,
    Remove,
    Add,
}

impl ClauseKind {
    pub const ALL: [ClauseKind; 3] = [ClauseKind::Set, ClauseKind::Remove, ClauseKind::Add];

    pub fn keyword(&self) -> &'static str {
        match self {
            ClauseKind::Set => "SET",
            ClauseKind::Remove => "REMOVE",
            ClauseKind::Add => "ADD",
        }
    }

    fn from_keyword(word: &str) -> Option<ClauseKind> {
        match word.to_ascii_uppercase().as_str() {
            "SET" => Some(ClauseKind::Set),
            "REMOVE" => Some(ClauseKind::Remove),
            "ADD" => Some(ClauseKind::Add),
            _ => None,
        }
    }
}

/// Byte spans of whitespace-delimited clause keywords in `expression`
fn keyword_spans(expression: &str) -> Vec<(usize, usize, ClauseKind)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in expression.char_indices().chain(std::iter::once((expression.len(), ' '))) {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                if let Some(kind) = ClauseKind::from_keyword(&expression[s..i]) {
                    spans.push((s, i, kind));
                }
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    spans
}

/// Accumulates SET/REMOVE/ADD clauses and their placeholder bindings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpressionBuilder {
    clauses: BTreeMap<ClauseKind, String>,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, Value>,
    next_placeholder: usize,
}

impl UpdateExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits an existing expression back into per-kind clauses.
    ///
    /// Text before the first keyword is ignored. A kind that appears twice
    /// keeps both contributions, merged.
    pub fn parse(expression: &str) -> Self {
        let mut builder = Self::new();
        let mut current: Option<ClauseKind> = None;
        let mut cursor = 0;

        for (start, end, kind) in keyword_spans(expression) {
            if let Some(previous) = current {
                builder.add_clause(previous, &expression[cursor..start]);
            }
            current = Some(kind);
            cursor = end;
        }
        if let Some(kind) = current {
            builder.add_clause(kind, &expression[cursor..]);
        }
        builder
    }

    /// Merges a raw clause fragment into `kind`
    pub fn add_clause(&mut self, kind: ClauseKind, clause: &str) -> &mut Self {
        let clause = clause.trim();
        if clause.is_empty() {
            return self;
        }
        self.clauses
            .entry(kind)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(clause);
            })
            .or_insert_with(|| clause.to_string());
        self
    }

    pub fn bind_name(&mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> &mut Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }

    pub fn bind_value(&mut self, placeholder: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    fn placeholders(&mut self) -> (String, String) {
        let n = self.next_placeholder;
        self.next_placeholder += 1;
        (format!("#a{}", n), format!(":a{}", n))
    }

    /// `SET attribute = value`
    pub fn set(&mut self, attribute: &str, value: Value) -> &mut Self {
        let (name, val) = self.placeholders();
        self.bind_name(name.clone(), attribute);
        self.bind_value(val.clone(), value);
        self.add_clause(ClauseKind::Set, &format!("{} = {}", name, val))
    }

    /// `REMOVE attribute`
    pub fn remove(&mut self, attribute: &str) -> &mut Self {
        let (name, _) = self.placeholders();
        self.bind_name(name.clone(), attribute);
        self.add_clause(ClauseKind::Remove, &name)
    }

    /// `ADD attribute value`
    pub fn add(&mut self, attribute: &str, value: Value) -> &mut Self {
        let (name, val) = self.placeholders();
        self.bind_name(name.clone(), attribute);
        self.bind_value(val.clone(), value);
        self.add_clause(ClauseKind::Add, &format!("{} {}", name, val))
    }

    pub fn clause(&self, kind: ClauseKind) -> Option<&str> {
        self.clauses.get(&kind).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.names
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Renders `SET ... REMOVE ... ADD ...`, omitting empty clauses
    pub fn render(&self) -> String {
        ClauseKind::ALL
            .iter()
            .filter_map(|kind| {
                self.clauses
                    .get(kind)
                    .map(|clause| format!("{} {}", kind.keyword(), clause))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Packages the expression, bindings and condition for the backend
    pub fn into_request(self, key: ItemKey, condition: Option<Condition>) -> UpdateRequest {
        UpdateRequest {
            key,
            expression: self.render(),
            names: self.names,
            values: self.values,
            condition,
        }
    }
}

impl fmt::Display for UpdateExpressionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_order_is_fixed() {
        let mut builder = UpdateExpressionBuilder::new();
        builder.add_clause(ClauseKind::Add, "#v :incr");
        builder.add_clause(ClauseKind::Remove, "#d");
        builder.add_clause(ClauseKind::Set, "#a = :a");
        assert_eq!(builder.render(), "SET #a = :a REMOVE #d ADD #v :incr");
    }

    #[test]
    fn test_repeated_contributions_merge() {
        let mut builder = UpdateExpressionBuilder::new();
        builder.add_clause(ClauseKind::Set, "#a = :a");
        builder.add_clause(ClauseKind::Set, "#b = :b");
        assert_eq!(builder.clause(ClauseKind::Set), Some("#a = :a, #b = :b"));
    }

    #[test]
    fn test_parse_splits_clauses() {
        let builder = UpdateExpressionBuilder::parse("SET #a = :a, #b = :b REMOVE #c ADD #v :incr");
        assert_eq!(builder.clause(ClauseKind::Set), Some("#a = :a, #b = :b"));
        assert_eq!(builder.clause(ClauseKind::Remove), Some("#c"));
        assert_eq!(builder.clause(ClauseKind::Add), Some("#v :incr"));
    }

    #[test]
    fn test_parse_then_extend() {
        let mut builder = UpdateExpressionBuilder::parse("remove #c set #a = :a");
        builder.add_clause(ClauseKind::Set, "#lud = :lud");
        assert_eq!(builder.render(), "SET #a = :a, #lud = :lud REMOVE #c");
    }

    #[test]
    fn test_parse_ignores_keywords_inside_names() {
        let builder = UpdateExpressionBuilder::parse("SET #address = :address");
        assert_eq!(builder.clause(ClauseKind::Set), Some("#address = :address"));
        assert!(builder.clause(ClauseKind::Add).is_none());
    }

    #[test]
    fn test_typed_helpers_bind_placeholders() {
        let mut builder = UpdateExpressionBuilder::new();
        builder.set("color", json!("red")).remove("size").add("count", json!(2));
        assert_eq!(builder.render(), "SET #a0 = :a0 REMOVE #a1 ADD #a2 :a2");
        assert_eq!(builder.names().get("#a1").map(String::as_str), Some("size"));
        assert_eq!(builder.values().get(":a2"), Some(&json!(2)));
        assert!(builder.values().get(":a1").is_none());
    }

    #[test]
    fn test_empty_builder() {
        let builder = UpdateExpressionBuilder::new();
        assert!(builder.is_empty());
        assert_eq!(builder.render(), "");
    }
}
