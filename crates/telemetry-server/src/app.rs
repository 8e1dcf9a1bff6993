//! Server bootstrap, background tasks, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::api::ApiServer;
use crate::config::ServerArgs;
use crate::config::StorageKind;
use crate::persistence::DatabaseBackend;
use crate::persistence::FileBackend;
use crate::persistence::StorageBackend;
use crate::store::MetricStore;

/// Grace period for background task drain after cancellation.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct App {
    args: ServerArgs,
    store: Arc<MetricStore>,
    backend: Arc<StorageBackend>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Build the store and the configured backend, and run the startup
    /// restore. Restore problems are logged, never fatal.
    pub async fn bootstrap(args: ServerArgs) -> Result<Self> {
        let store = Arc::new(MetricStore::new());

        let backend = match args.storage_kind() {
            StorageKind::Database => {
                let dsn = args.database_dsn.as_deref().unwrap_or_default();
                StorageBackend::Database(DatabaseBackend::connect(dsn, Arc::clone(&store)).await)
            }
            StorageKind::File => StorageBackend::File(FileBackend::new(
                args.file_storage_path.clone(),
                Arc::clone(&store),
            )),
        };
        let backend = Arc::new(backend);

        if args.restore {
            if let Err(e) = backend.restore().await {
                warn!("startup restore failed, serving from an empty store: {e}");
            }
        }

        Ok(Self {
            args,
            store,
            backend,
            token: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Spawn the background tasks and serve until a termination signal.
    pub async fn run(mut self) -> Result<()> {
        if self.args.store_interval > 0 {
            let backend = Arc::clone(&self.backend);
            let interval = Duration::from_secs(self.args.store_interval);
            let token = self.token.clone();
            self.tasks.push(tokio::spawn(async move {
                info!("starting interval dump task every {interval:?}");
                backend.interval_dump(interval, token).await;
            }));
        }

        let api_server = ApiServer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.backend),
            self.args.listen_addr.clone(),
            self.args.sign_key.clone(),
        );
        let token = self.token.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = api_server.run(token).await {
                error!("HTTP server failed: {e}");
            }
        }));

        self.wait_for_shutdown_signal().await?;
        self.token.cancel();
        self.drain_tasks(TASK_SHUTDOWN_TIMEOUT).await;

        // Final flush so nothing since the last scheduled dump is lost.
        if let Err(e) = self.backend.close().await {
            warn!("final persistence flush failed: {e}");
        }
        info!("shutdown complete");
        Ok(())
    }

    async fn wait_for_shutdown_signal(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::signal;
            use tokio::signal::unix::SignalKind;
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            info!("received Ctrl+C, shutting down");
        }
        Ok(())
    }

    async fn drain_tasks(&mut self, timeout: Duration) {
        let drain = async {
            for task in &mut self.tasks {
                if let Err(e) = task.await {
                    error!("task failed during shutdown: {e}");
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("task shutdown timed out after {timeout:?}");
        }
    }
}
