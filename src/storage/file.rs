//! Durable backing store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/tables.json          table definitions
//! <root>/tables/<table>.log   checksummed append-only log per table
//! <root>/backups/<name>.json  table backups
//! ```
//!
//! Reads are served from memory. A mutation's result is appended to the
//! table log before it is applied in memory, under the memory table's write
//! guard, so no reader sees a write the log does not hold. One writer lock
//! keeps log order equal to apply order. Backups live only on disk. Change
//! streams are not persisted and restart empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::log::{replay, TableLog};
use super::memory::MemoryBackend;
use super::record::{LogOp, LogRecord};
use super::{
    BackendError, BackendResult, BackupDescription, IndexSpec, Item, ItemKey, Page, QueryRequest,
    ScanRequest, StorageBackend, StreamRecord, TableDescription, TableSpec, UpdateOutput,
    UpdateRequest,
};
use crate::expression::Condition;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

const MANIFEST_FILE: &str = "tables.json";

pub struct FileBackend {
    root: PathBuf,
    inner: MemoryBackend,
    logs: Mutex<BTreeMap<String, TableLog>>,
    metrics: Arc<MetricsRegistry>,
}

fn file_stem(table: &str) -> String {
    table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

impl FileBackend {
    /// Opens the store at `root`, replaying every table log
    pub fn open(root: &Path, metrics: Arc<MetricsRegistry>) -> BackendResult<Self> {
        fs::create_dir_all(root)
            .map_err(|e| BackendError::io(format!("Failed to create {}", root.display()), e))?;

        let backend = Self {
            root: root.to_path_buf(),
            inner: MemoryBackend::new(),
            logs: Mutex::new(BTreeMap::new()),
            metrics,
        };

        let specs = backend.read_manifest()?;
        let mut replayed = 0usize;
        {
            let mut logs = backend.logs.lock()?;
            for spec in &specs {
                backend.inner.create_table(spec)?;
                let path = backend.log_path(&spec.name);
                let records = replay(&path).map_err(|e| {
                    if e.is_fatal() {
                        log_event_with_fields(
                            Event::BackendCorruption,
                            &[("table", spec.name.as_str()), ("error", e.to_string().as_str())],
                        );
                    }
                    e
                })?;
                replayed += records.len();
                for record in records {
                    backend.apply_record(&spec.name, record)?;
                }
                logs.insert(spec.name.clone(), TableLog::open(&path)?);
            }
        }

        log_event_with_fields(
            Event::BackendRecovered,
            &[
                ("root", root.display().to_string().as_str()),
                ("tables", specs.len().to_string().as_str()),
                ("records", replayed.to_string().as_str()),
            ],
        );
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_path(&self, table: &str) -> PathBuf {
        self.root.join("tables").join(format!("{}.log", file_stem(table)))
    }

    fn backup_path(&self, backup_name: &str) -> PathBuf {
        self.root.join("backups").join(format!("{}.json", file_stem(backup_name)))
    }

    fn apply_record(&self, table: &str, record: LogRecord) -> BackendResult<()> {
        match record.op {
            LogOp::Put => {
                let item: Item = serde_json::from_slice(&record.body).map_err(|e| {
                    BackendError::corruption(
                        self.log_path(table).display().to_string(),
                        0,
                        format!("Unreadable item image for {}: {}", record.key, e),
                    )
                })?;
                self.inner.load_item(table, item)
            }
            LogOp::Remove => self.inner.unload_item(table, &record.key),
        }
    }

    fn read_manifest(&self) -> BackendResult<Vec<TableSpec>> {
        let path = self.root.join(MANIFEST_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                BackendError::corruption(path.display().to_string(), 0, e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(BackendError::io(format!("Failed to read {}", path.display()), e)),
        }
    }

    /// Rewrites the manifest through a temporary file and rename
    fn write_manifest(&self) -> BackendResult<()> {
        let specs = self.inner.table_specs()?;
        let bytes = serde_json::to_vec_pretty(&specs)
            .map_err(|e| BackendError::validation(format!("Failed to encode table definitions: {}", e)))?;
        let path = self.root.join(MANIFEST_FILE);
        let tmp = self.root.join(format!("{}.tmp", MANIFEST_FILE));
        fs::write(&tmp, bytes)
            .map_err(|e| BackendError::io(format!("Failed to write {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .map_err(|e| BackendError::io(format!("Failed to replace {}", path.display()), e))
    }

    fn append(
        &self,
        logs: &mut BTreeMap<String, TableLog>,
        table: &str,
        record: &LogRecord,
    ) -> BackendResult<()> {
        let log = logs
            .get_mut(table)
            .ok_or_else(|| BackendError::TableNotFound(table.to_string()))?;
        let written = log.append(record)?;
        self.metrics.add_log_record(written);
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn create_table(&self, spec: &TableSpec) -> BackendResult<TableDescription> {
        let mut logs = self.logs.lock()?;
        let description = self.inner.create_table(spec)?;
        logs.insert(spec.name.clone(), TableLog::create(&self.log_path(&spec.name))?);
        self.write_manifest()?;
        Ok(description)
    }

    fn describe_table(&self, table: &str) -> BackendResult<TableDescription> {
        self.inner.describe_table(table)
    }

    fn list_tables(&self) -> BackendResult<Vec<String>> {
        self.inner.list_tables()
    }

    fn create_index(&self, table: &str, index: &IndexSpec) -> BackendResult<()> {
        let _logs = self.logs.lock()?;
        self.inner.create_index(table, index)?;
        self.write_manifest()
    }

    fn delete_table(&self, table: &str) -> BackendResult<()> {
        let mut logs = self.logs.lock()?;
        self.inner.delete_table(table)?;
        if let Some(log) = logs.remove(table) {
            let path = log.path().to_path_buf();
            drop(log);
            fs::remove_file(&path)
                .map_err(|e| BackendError::io(format!("Failed to remove {}", path.display()), e))?;
        }
        self.write_manifest()
    }

    fn create_backup(&self, table: &str, backup_name: &str) -> BackendResult<BackupDescription> {
        let _logs = self.logs.lock()?;
        let items = self.inner.table_items(table)?;
        let bytes = serde_json::to_vec(&items)
            .map_err(|e| BackendError::validation(format!("Failed to encode backup: {}", e)))?;
        let path = self.backup_path(backup_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BackendError::io(format!("Failed to create {}", parent.display()), e))?;
        }
        fs::write(&path, bytes)
            .map_err(|e| BackendError::io(format!("Failed to write {}", path.display()), e))?;
        Ok(BackupDescription {
            backup_name: backup_name.to_string(),
            table: table.to_string(),
            item_count: items.len(),
            created_at: Utc::now(),
        })
    }

    fn get_item(&self, table: &str, key: &ItemKey) -> BackendResult<Option<Item>> {
        self.inner.get_item(table, key)
    }

    fn update_item(&self, table: &str, request: &UpdateRequest) -> BackendResult<UpdateOutput> {
        let mut logs = self.logs.lock()?;
        self.inner.update_item_then(table, request, |new| {
            let body = serde_json::to_vec(new)
                .map_err(|e| BackendError::validation(format!("Failed to encode item: {}", e)))?;
            self.append(&mut logs, table, &LogRecord::put(request.key.clone(), body))
        })
    }

    fn delete_item(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<&Condition>,
    ) -> BackendResult<Option<Item>> {
        let mut logs = self.logs.lock()?;
        self.inner.delete_item_then(table, key, condition, || {
            self.append(&mut logs, table, &LogRecord::remove(key.clone()))
        })
    }

    fn scan(&self, table: &str, request: &ScanRequest) -> BackendResult<Page> {
        self.inner.scan(table, request)
    }

    fn query(&self, table: &str, request: &QueryRequest) -> BackendResult<Page> {
        self.inner.query(table, request)
    }

    fn stream_records(
        &self,
        table: &str,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> BackendResult<Vec<StreamRecord>> {
        self.inner.stream_records(table, after_sequence, limit)
    }
}
