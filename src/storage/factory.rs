//! Backend selection from configuration.

use std::sync::Arc;

use super::{BackendResult, FileBackend, MemoryBackend, StorageBackend};
use crate::config::BackendConfig;
use crate::observability::MetricsRegistry;

/// Opens the configured backend variant
pub fn open_backend(
    config: &BackendConfig,
    metrics: Arc<MetricsRegistry>,
) -> BackendResult<Arc<dyn StorageBackend>> {
    Ok(match config {
        BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        BackendConfig::File { path } => Arc::new(FileBackend::open(path, metrics)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TableSpec;
    use tempfile::TempDir;

    #[test]
    fn test_open_each_variant() {
        let metrics = Arc::new(MetricsRegistry::new());
        let memory = open_backend(&BackendConfig::Memory, Arc::clone(&metrics)).unwrap();
        memory.create_table(&TableSpec::new("t", "id")).unwrap();
        assert_eq!(memory.list_tables().unwrap(), vec!["t".to_string()]);

        let dir = TempDir::new().unwrap();
        let file = open_backend(
            &BackendConfig::File {
                path: dir.path().to_path_buf(),
            },
            metrics,
        )
        .unwrap();
        file.create_table(&TableSpec::new("t", "id")).unwrap();
        assert!(dir.path().join("tables.json").exists());
    }
}
