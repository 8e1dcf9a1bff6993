//! Snapshot-file persistence.
//!
//! One JSON document `{"gauge": {...}, "counter": {...}}`, overwritten whole
//! on every dump. A missing or unreadable file at restore time means the
//! server simply starts empty.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::PersistenceError;
use crate::store::MetricStore;
use crate::store::StoreSnapshot;

pub struct FileBackend {
    path: PathBuf,
    store: Arc<MetricStore>,
}

impl FileBackend {
    pub fn new(path: PathBuf, store: Arc<MetricStore>) -> Self {
        Self { path, store }
    }

    /// Serialize the current snapshot and overwrite the storage file,
    /// creating parent directories on first use.
    pub async fn dump(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let snapshot = self.store.snapshot();
        let data = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(&self.path, data).await?;
        debug!(path = %self.path.display(), "metric snapshot written");
        Ok(())
    }

    /// Replace the store contents from the storage file. Absence or
    /// corruption is not an error: there is nothing to restore.
    pub async fn restore(&self) -> Result<(), PersistenceError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) => {
                info!(path = %self.path.display(), "no snapshot to restore: {e}");
                return Ok(());
            }
        };

        match serde_json::from_slice::<StoreSnapshot>(&data) {
            Ok(snapshot) => {
                self.store.replace(snapshot);
                info!(path = %self.path.display(), "metrics restored from snapshot file");
            }
            Err(e) => {
                warn!(path = %self.path.display(), "snapshot file unreadable, starting empty: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use telemetry_types::MetricKind;

    use super::*;

    fn backend_in(dir: &tempfile::TempDir, store: Arc<MetricStore>) -> FileBackend {
        FileBackend::new(dir.path().join("metrics-db.json"), store)
    }

    #[tokio::test]
    async fn dump_then_restore_round_trips() {
        let dir = tempfile::tempdir().expect("should create tempdir");
        let store = Arc::new(MetricStore::new());
        store.update_gauge("Alloc", 123.5);
        store.update_counter("PollCount", 7);
        let backend = backend_in(&dir, Arc::clone(&store));

        backend.dump().await.expect("dump should succeed");

        let restored_store = Arc::new(MetricStore::new());
        let restorer = backend_in(&dir, Arc::clone(&restored_store));
        restorer.restore().await.expect("restore should succeed");

        assert_eq!(
            restored_store.snapshot(),
            store.snapshot(),
            "restored store should equal the dumped one"
        );
    }

    #[tokio::test]
    async fn dump_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("should create tempdir");
        let store = Arc::new(MetricStore::new());
        store.update_gauge("Alloc", 1.0);
        let backend = FileBackend::new(dir.path().join("nested/deeper/metrics.json"), store);

        backend.dump().await.expect("dump should create parent directories");

        assert!(dir.path().join("nested/deeper/metrics.json").exists());
    }

    #[tokio::test]
    async fn restore_of_missing_file_leaves_store_empty() {
        let dir = tempfile::tempdir().expect("should create tempdir");
        let store = Arc::new(MetricStore::new());
        let backend = backend_in(&dir, Arc::clone(&store));

        backend.restore().await.expect("missing file should not be an error");

        assert_eq!(store.snapshot(), StoreSnapshot::default(), "store should stay empty");
    }

    #[tokio::test]
    async fn restore_of_corrupt_file_leaves_store_empty() {
        let dir = tempfile::tempdir().expect("should create tempdir");
        let path = dir.path().join("metrics-db.json");
        tokio::fs::write(&path, b"{not json").await.expect("should write fixture");
        let store = Arc::new(MetricStore::new());
        let backend = FileBackend::new(path, Arc::clone(&store));

        backend.restore().await.expect("corrupt file should not be an error");

        assert_eq!(store.snapshot(), StoreSnapshot::default());
    }

    #[tokio::test]
    async fn dump_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().expect("should create tempdir");
        let store = Arc::new(MetricStore::new());
        let backend = backend_in(&dir, Arc::clone(&store));

        store.update_gauge("Alloc", 1.0);
        backend.dump().await.expect("first dump should succeed");
        store.update_gauge("Alloc", 2.0);
        backend.dump().await.expect("second dump should succeed");

        let fresh = Arc::new(MetricStore::new());
        backend_in(&dir, Arc::clone(&fresh)).restore().await.expect("restore should succeed");
        assert_eq!(
            fresh.value(MetricKind::Gauge, "Alloc"),
            Some("2".to_string()),
            "the file should hold only the latest snapshot"
        );
    }
}
