//! In-process backing store.
//!
//! All tables live behind one `RwLock`. A conditional write evaluates its
//! condition and applies its update under the same write guard, so
//! concurrent writers to one item serialize.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::index::SecondaryIndex;
use super::stream::ChangeStream;
use super::{
    item_size, segment_of, BackendError, BackendResult, BackupDescription, IndexSpec, Item,
    ItemKey, Page, QueryRequest, ScanRequest, StorageBackend, StreamRecord, TableDescription,
    TableSpec, TableStatus, UpdateOutput, UpdateRequest,
};
use crate::expression::{CompiledUpdate, Condition};
use crate::params;

struct Table {
    spec: TableSpec,
    table_id: String,
    created_at: DateTime<Utc>,
    items: BTreeMap<ItemKey, Item>,
    indexes: BTreeMap<String, SecondaryIndex>,
    stream: ChangeStream,
}

impl Table {
    fn new(spec: TableSpec) -> Self {
        let created_at = Utc::now();
        let indexes = spec
            .indexes
            .iter()
            .map(|i| (i.name.clone(), SecondaryIndex::new(i.clone())))
            .collect();
        Self {
            stream: ChangeStream::new(&spec.name, created_at),
            spec,
            table_id: Uuid::new_v4().to_string(),
            created_at,
            items: BTreeMap::new(),
            indexes,
        }
    }

    fn describe(&self) -> TableDescription {
        TableDescription {
            spec: self.spec.clone(),
            status: TableStatus::Active,
            table_id: self.table_id.clone(),
            created_at: self.created_at,
            item_count: self.items.len(),
            size_bytes: self.items.values().map(item_size).sum(),
            latest_stream_id: self.stream.label().to_string(),
        }
    }

    /// Stores `item` under `key`, maintaining indexes. Returns the old image.
    fn put(&mut self, key: &ItemKey, item: Item) -> Option<Item> {
        let old = self.items.insert(key.clone(), item);
        if let Some(new) = self.items.get(key) {
            for index in self.indexes.values_mut() {
                index.replace(key, old.as_ref(), new);
            }
        }
        old
    }

    fn take(&mut self, key: &ItemKey) -> Option<Item> {
        let old = self.items.remove(key)?;
        for index in self.indexes.values_mut() {
            index.remove(key, &old);
        }
        Some(old)
    }

    fn index(&self, name: &str) -> BackendResult<&SecondaryIndex> {
        self.indexes.get(name).ok_or_else(|| BackendError::IndexNotFound {
            table: self.spec.name.clone(),
            index: name.to_string(),
        })
    }
}

fn check_condition(condition: Option<&Condition>, current: Option<&Item>) -> BackendResult<()> {
    match condition {
        Some(c) if !c.evaluate(current) => Err(BackendError::ConditionalCheckFailed(c.to_string())),
        _ => Ok(()),
    }
}

fn effective_limit(requested: Option<usize>, page_size: usize) -> usize {
    requested.unwrap_or(page_size).clamp(1, page_size.max(1))
}

/// Evaluates up to `limit` candidates in order, keeping those passing `filter`
fn collect_page<'a>(
    candidates: impl Iterator<Item = (&'a ItemKey, &'a Item)>,
    filter: Option<&Condition>,
    limit: usize,
) -> Page {
    let mut page = Page::default();
    let mut last = None;
    let mut candidates = candidates.peekable();
    while let Some((key, item)) = candidates.next() {
        page.scanned_count += 1;
        if filter.map_or(true, |f| f.evaluate(Some(item))) {
            page.items.push(item.clone());
        }
        last = Some(key.clone());
        if page.scanned_count == limit {
            if candidates.peek().is_some() {
                page.last_evaluated_key = last.take();
            }
            break;
        }
    }
    page
}

/// Process-memory backend
pub struct MemoryBackend {
    tables: RwLock<BTreeMap<String, Table>>,
    backups: RwLock<BTreeMap<String, Vec<Item>>>,
    page_size: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_page_size(params::DEFAULT_BACKEND_PAGE_SIZE)
    }

    /// Backend whose scans and queries evaluate at most `page_size` items per call
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            backups: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Items captured by a completed backup
    pub fn backup_items(&self, backup_name: &str) -> BackendResult<Option<Vec<Item>>> {
        Ok(self.backups.read()?.get(backup_name).cloned())
    }

    /// Stores an item without conditions or stream records. Used by log replay.
    pub(crate) fn load_item(&self, table: &str, item: Item) -> BackendResult<()> {
        let mut tables = self.tables.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        let key = ItemKey::from_item(&t.spec, &item).ok_or_else(|| {
            BackendError::validation(format!("Item in {} is missing its key attributes", table))
        })?;
        t.put(&key, item);
        Ok(())
    }

    /// Removes an item without conditions or stream records. Used by log replay.
    pub(crate) fn unload_item(&self, table: &str, key: &ItemKey) -> BackendResult<()> {
        let mut tables = self.tables.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        t.take(key);
        Ok(())
    }

    /// Current items of a table, in key order
    pub(crate) fn table_items(&self, table: &str) -> BackendResult<Vec<Item>> {
        let tables = self.tables.read()?;
        let t = tables
            .get(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        Ok(t.items.values().cloned().collect())
    }

    /// Conditional update whose new image goes to `persist` before it is
    /// applied. The table write guard is held throughout, so readers see
    /// either the old image or a persisted new one; a `persist` error
    /// leaves the table and its stream unchanged.
    pub(crate) fn update_item_then<F>(
        &self,
        table: &str,
        request: &UpdateRequest,
        persist: F,
    ) -> BackendResult<UpdateOutput>
    where
        F: FnOnce(&Item) -> BackendResult<()>,
    {
        let update = CompiledUpdate::compile(&request.expression, &request.names, &request.values)
            .map_err(|e| BackendError::validation(e.to_string()))?;

        let mut tables = self.tables.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;

        if let Some(attribute) = update.attributes().find(|a| t.spec.is_key_attribute(a)) {
            return Err(BackendError::validation(format!(
                "Cannot update attribute {}. This attribute is part of the key",
                attribute
            )));
        }

        let current = t.items.get(&request.key);
        check_condition(request.condition.as_ref(), current)?;

        let mut next = current
            .cloned()
            .unwrap_or_else(|| request.key.to_attributes(&t.spec));
        update
            .apply(&mut next)
            .map_err(|e| BackendError::validation(e.to_string()))?;
        persist(&next)?;

        let old = t.put(&request.key, next.clone());
        t.stream.emit(&request.key, old.clone(), Some(next.clone()));
        Ok(UpdateOutput { old, new: next })
    }

    /// Conditional delete; `persist` runs before an existing item is removed
    pub(crate) fn delete_item_then<F>(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<&Condition>,
        persist: F,
    ) -> BackendResult<Option<Item>>
    where
        F: FnOnce() -> BackendResult<()>,
    {
        let mut tables = self.tables.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;

        check_condition(condition, t.items.get(key))?;
        if !t.items.contains_key(key) {
            return Ok(None);
        }
        persist()?;

        let old = t.take(key);
        if old.is_some() {
            t.stream.emit(key, old.clone(), None);
        }
        Ok(old)
    }

    /// Key and specs of every table, for persistence
    pub(crate) fn table_specs(&self) -> BackendResult<Vec<TableSpec>> {
        Ok(self.tables.read()?.values().map(|t| t.spec.clone()).collect())
    }
}

impl StorageBackend for MemoryBackend {
    fn create_table(&self, spec: &TableSpec) -> BackendResult<TableDescription> {
        let mut tables = self.tables.write()?;
        if tables.contains_key(&spec.name) {
            return Err(BackendError::TableExists(spec.name.clone()));
        }
        let table = Table::new(spec.clone());
        let description = table.describe();
        tables.insert(spec.name.clone(), table);
        Ok(description)
    }

    fn describe_table(&self, table: &str) -> BackendResult<TableDescription> {
        let tables = self.tables.read()?;
        tables
            .get(table)
            .map(Table::describe)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))
    }

    fn list_tables(&self) -> BackendResult<Vec<String>> {
        Ok(self.tables.read()?.keys().cloned().collect())
    }

    fn create_index(&self, table: &str, index: &IndexSpec) -> BackendResult<()> {
        let mut tables = self.tables.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        if t.indexes.contains_key(&index.name) {
            return Err(BackendError::validation(format!(
                "Index {} already exists on {}",
                index.name, table
            )));
        }
        let mut secondary = SecondaryIndex::new(index.clone());
        for (key, item) in &t.items {
            secondary.insert(key, item);
        }
        t.indexes.insert(index.name.clone(), secondary);
        t.spec.indexes.push(index.clone());
        Ok(())
    }

    fn delete_table(&self, table: &str) -> BackendResult<()> {
        self.tables
            .write()?
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))
    }

    fn create_backup(&self, table: &str, backup_name: &str) -> BackendResult<BackupDescription> {
        let items = self.table_items(table)?;
        let description = BackupDescription {
            backup_name: backup_name.to_string(),
            table: table.to_string(),
            item_count: items.len(),
            created_at: Utc::now(),
        };
        self.backups.write()?.insert(backup_name.to_string(), items);
        Ok(description)
    }

    fn get_item(&self, table: &str, key: &ItemKey) -> BackendResult<Option<Item>> {
        let tables = self.tables.read()?;
        let t = tables
            .get(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        Ok(t.items.get(key).cloned())
    }

    fn update_item(&self, table: &str, request: &UpdateRequest) -> BackendResult<UpdateOutput> {
        self.update_item_then(table, request, |_| Ok(()))
    }

    fn delete_item(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<&Condition>,
    ) -> BackendResult<Option<Item>> {
        self.delete_item_then(table, key, condition, || Ok(()))
    }

    fn scan(&self, table: &str, request: &ScanRequest) -> BackendResult<Page> {
        if let Some((segment, total)) = request.segment {
            if total == 0 || segment >= total {
                return Err(BackendError::validation(format!(
                    "Segment {} is out of range for {} total segments",
                    segment, total
                )));
            }
        }

        let tables = self.tables.read()?;
        let t = tables
            .get(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;

        let start = match &request.exclusive_start_key {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        let candidates = t
            .items
            .range((start, Bound::Unbounded))
            .filter(|(key, _)| match request.segment {
                Some((segment, total)) => segment_of(&key.hash, total) == segment,
                None => true,
            });

        Ok(collect_page(
            candidates,
            request.filter.as_ref(),
            effective_limit(request.limit, self.page_size),
        ))
    }

    fn query(&self, table: &str, request: &QueryRequest) -> BackendResult<Page> {
        let tables = self.tables.read()?;
        let t = tables
            .get(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        let index = t.index(&request.index)?;

        let keys = index.lookup_eq(&request.value);
        let candidates = keys
            .iter()
            .filter(|key| match &request.exclusive_start_key {
                Some(start) => *key > start,
                None => true,
            })
            .filter_map(|key| t.items.get(key).map(|item| (key, item)));

        Ok(collect_page(
            candidates,
            request.filter.as_ref(),
            effective_limit(request.limit, self.page_size),
        ))
    }

    fn stream_records(
        &self,
        table: &str,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> BackendResult<Vec<StreamRecord>> {
        let tables = self.tables.read()?;
        let t = tables
            .get(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        Ok(t.stream.read(after_sequence, limit))
    }
}
