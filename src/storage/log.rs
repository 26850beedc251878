//! Append-only table log with fsync on every append.
//!
//! A table's state is the replay of its log in file order: a put stores
//! the full image, a remove drops the key. Any checksum or framing failure
//! while replaying halts the open.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::errors::{BackendError, BackendResult};
use super::record::LogRecord;

pub struct TableLog {
    path: PathBuf,
    file: File,
    offset: u64,
}

impl TableLog {
    /// Opens `path` for append, creating it if missing
    pub fn open(path: &Path) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BackendError::io(format!("Failed to create {}", parent.display()), e)
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BackendError::io(format!("Failed to open log {}", path.display()), e))?;
        let offset = file
            .metadata()
            .map_err(|e| BackendError::io("Failed to read log metadata", e))?
            .len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset,
        })
    }

    /// Creates an empty log at `path`, discarding any previous content
    pub fn create(path: &Path) -> BackendResult<Self> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BackendError::io(format!("Failed to reset log {}", path.display()), e))
            }
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Appends and fsyncs one record. Returns the bytes written.
    pub fn append(&mut self, record: &LogRecord) -> BackendResult<u64> {
        let bytes = record.serialize();
        self.file.write_all(&bytes).map_err(|e| {
            BackendError::io(format!("Failed to append to {}", self.path.display()), e)
        })?;
        self.file.sync_all().map_err(|e| {
            BackendError::io(format!("fsync failed for {}", self.path.display()), e)
        })?;
        self.offset += bytes.len() as u64;
        Ok(bytes.len() as u64)
    }
}

/// Reads every record of the log at `path`. A missing file is an empty log.
pub fn replay(path: &Path) -> BackendResult<Vec<LogRecord>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(BackendError::io(format!("Failed to read log {}", path.display()), e))
        }
    };

    let mut records = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        let (record, consumed) = LogRecord::deserialize(&data[offset..]).map_err(|e| {
            BackendError::corruption(path.display().to_string(), offset as u64, e.to_string())
        })?;
        records.push(record);
        offset += consumed;
    }
    Ok(records)
}
