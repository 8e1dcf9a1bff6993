//! Pluggable persistence for the metric store.
//!
//! Exactly one backend runs at a time, chosen once at bootstrap: a database
//! DSN (when configured) wins over the snapshot file. The backend is a
//! tagged variant rather than a trait object so call sites dispatch in one
//! place and the two implementations stay independently testable.

mod database;
mod file;

use std::time::Duration;

pub use database::DatabaseBackend;
pub use file::FileBackend;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

/// Errors surfaced by dump/restore/liveness operations. All of them are
/// non-fatal to the server; callers log and carry on.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("liveness probe not applicable to the file backend")]
    NotSupported,

    #[error("database backend has no live connection")]
    NotConnected,

    #[error("snapshot file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("database operation failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// The selected persistence strategy.
pub enum StorageBackend {
    File(FileBackend),
    Database(DatabaseBackend),
}

impl StorageBackend {
    /// Persist the current store contents.
    pub async fn dump(&self) -> Result<(), PersistenceError> {
        match self {
            StorageBackend::File(backend) => backend.dump().await,
            StorageBackend::Database(backend) => backend.dump().await,
        }
    }

    /// Load persisted contents into the store.
    pub async fn restore(&self) -> Result<(), PersistenceError> {
        match self {
            StorageBackend::File(backend) => backend.restore().await,
            StorageBackend::Database(backend) => backend.restore().await,
        }
    }

    /// Liveness probe backing `GET /ping`.
    pub async fn check(&self) -> Result<(), PersistenceError> {
        match self {
            StorageBackend::File(_) => Err(PersistenceError::NotSupported),
            StorageBackend::Database(backend) => backend.check().await,
        }
    }

    /// Final flush on shutdown, then release backend resources.
    pub async fn close(&self) -> Result<(), PersistenceError> {
        let result = self.dump().await;
        if let StorageBackend::Database(backend) = self {
            backend.shutdown().await;
        }
        result
    }

    /// Dump on a fixed cadence until cancelled. A failed dump is logged and
    /// retried only on the next tick.
    pub async fn interval_dump(&self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick of a tokio interval fires immediately; skip it so
        // the first dump lands one interval after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("interval dump task cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.dump().await {
                        warn!("scheduled dump failed, retrying on next tick: {e}");
                    }
                }
            }
        }
    }
}
