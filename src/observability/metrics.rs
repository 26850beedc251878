//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe but lock-minimal

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one process
///
/// All counters use Relaxed atomics; values are exact once writers quiesce.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    items_read: AtomicU64,
    items_updated: AtomicU64,
    items_deleted: AtomicU64,
    items_restored: AtomicU64,
    queries_executed: AtomicU64,
    conditional_check_failures: AtomicU64,
    validation_failures: AtomicU64,
    schema_cache_hits: AtomicU64,
    schema_cache_loads: AtomicU64,
    instance_cache_hits: AtomicU64,
    instance_cache_misses: AtomicU64,
    instance_evictions: AtomicU64,
    log_records_written: AtomicU64,
    log_bytes_written: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Item operations

    pub fn increment_items_read(&self) {
        self.items_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_items_updated(&self) {
        self.items_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_items_deleted(&self) {
        self.items_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_items_restored(&self) {
        self.items_restored.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts list and find calls
    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conditional_check_failures(&self) {
        self.conditional_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Caches

    pub fn increment_schema_cache_hits(&self) {
        self.schema_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_schema_cache_loads(&self) {
        self.schema_cache_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_instance_cache_hits(&self) {
        self.instance_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_instance_cache_misses(&self) {
        self.instance_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_instance_evictions(&self) {
        self.instance_evictions.fetch_add(1, Ordering::Relaxed);
    }

    // File backend

    /// Records one appended log record of `bytes` length
    pub fn add_log_record(&self, bytes: u64) {
        self.log_records_written.fetch_add(1, Ordering::Relaxed);
        self.log_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_read: self.items_read.load(Ordering::Relaxed),
            items_updated: self.items_updated.load(Ordering::Relaxed),
            items_deleted: self.items_deleted.load(Ordering::Relaxed),
            items_restored: self.items_restored.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            conditional_check_failures: self.conditional_check_failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            schema_cache_hits: self.schema_cache_hits.load(Ordering::Relaxed),
            schema_cache_loads: self.schema_cache_loads.load(Ordering::Relaxed),
            instance_cache_hits: self.instance_cache_hits.load(Ordering::Relaxed),
            instance_cache_misses: self.instance_cache_misses.load(Ordering::Relaxed),
            instance_evictions: self.instance_evictions.load(Ordering::Relaxed),
            log_records_written: self.log_records_written.load(Ordering::Relaxed),
            log_bytes_written: self.log_bytes_written.load(Ordering::Relaxed),
        }
    }

    /// Current snapshot rendered as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub items_read: u64,
    pub items_updated: u64,
    pub items_deleted: u64,
    pub items_restored: u64,
    pub queries_executed: u64,
    pub conditional_check_failures: u64,
    pub validation_failures: u64,
    pub schema_cache_hits: u64,
    pub schema_cache_loads: u64,
    pub instance_cache_hits: u64,
    pub instance_cache_misses: u64,
    pub instance_evictions: u64,
    pub log_records_written: u64,
    pub log_bytes_written: u64,
}
