//! Secondary indexes.
//!
//! Each index maps an attribute value to the set of item keys carrying it.
//! BTree ordering keeps query pages deterministic: within one value, items
//! come back in primary key order.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::{IndexSpec, Item, ItemKey};

/// Index key representing a serialized attribute value.
///
/// Ordering is deterministic: Bool < Int < Float < String.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Bool(bool),
    Int(i64),
    /// Stored as ordered bits for total ordering
    Float(u64),
    String(String),
}

impl IndexKey {
    pub fn from_float(v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Float(ordered)
    }

    /// Key for a JSON scalar. Integral floats normalize to `Int` so that
    /// `3` and `3.0` land on the same key. Arrays, objects and null are not indexed.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(IndexKey::Int(i));
                }
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Some(IndexKey::Int(f as i64))
                } else {
                    Some(IndexKey::from_float(f))
                }
            }
            Value::String(s) => Some(IndexKey::String(s.clone())),
            _ => None,
        }
    }
}

/// One secondary index over a table
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    spec: IndexSpec,
    tree: BTreeMap<IndexKey, BTreeSet<ItemKey>>,
}

impl SecondaryIndex {
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            tree: BTreeMap::new(),
        }
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Index key for `item`, if it carries the attribute with the indexed type
    fn key_for(&self, item: &Item) -> Option<IndexKey> {
        let value = item.get(&self.spec.attribute)?;
        if !self.spec.attribute_type.accepts(value) {
            return None;
        }
        IndexKey::from_json(value)
    }

    pub fn insert(&mut self, key: &ItemKey, item: &Item) {
        if let Some(index_key) = self.key_for(item) {
            self.tree.entry(index_key).or_default().insert(key.clone());
        }
    }

    pub fn remove(&mut self, key: &ItemKey, item: &Item) {
        if let Some(index_key) = self.key_for(item) {
            if let Some(keys) = self.tree.get_mut(&index_key) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tree.remove(&index_key);
                }
            }
        }
    }

    /// Moves `key` from its old value to its new one
    pub fn replace(&mut self, key: &ItemKey, old: Option<&Item>, new: &Item) {
        if let Some(old) = old {
            self.remove(key, old);
        }
        self.insert(key, new);
    }

    /// Item keys whose attribute equals `value`, in primary key order
    pub fn lookup_eq(&self, value: &Value) -> Vec<ItemKey> {
        IndexKey::from_json(value)
            .and_then(|k| self.tree.get(&k))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct indexed values
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }
}
