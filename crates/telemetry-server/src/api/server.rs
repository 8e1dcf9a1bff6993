use std::sync::Arc;
use std::time::Duration;

use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::post;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handlers;
use super::middleware::DecodeRequest;
use crate::persistence::StorageBackend;
use crate::store::MetricStore;

/// Grace period for in-flight requests once shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Build the full route table with shared state and inbound decoding.
pub fn routes(
    store: Arc<MetricStore>,
    backend: Arc<StorageBackend>,
    sign_key: Option<String>,
) -> impl Endpoint {
    Route::new()
        .at("/", get(handlers::list_metrics))
        .at("/ping", get(handlers::ping))
        .at("/value/", post(handlers::value_json))
        .at("/value/:kind/:name", get(handlers::value_path))
        .at("/update/", post(handlers::update_json))
        .at("/update/:kind/:name/:value", post(handlers::update_path))
        .at("/updates/", post(handlers::update_batch))
        .data(store)
        .data(backend)
        .with(DecodeRequest::new(sign_key))
        .with(Tracing)
}

/// HTTP server for the ingest and read endpoints.
pub struct ApiServer {
    store: Arc<MetricStore>,
    backend: Arc<StorageBackend>,
    listen_addr: String,
    sign_key: Option<String>,
}

impl ApiServer {
    pub fn new(
        store: Arc<MetricStore>,
        backend: Arc<StorageBackend>,
        listen_addr: String,
        sign_key: Option<String>,
    ) -> Self {
        Self {
            store,
            backend,
            listen_addr,
            sign_key,
        }
    }

    /// Serve until the token fires, then stop accepting connections and
    /// give in-flight requests a bounded grace period.
    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        info!("starting HTTP server on {}", self.listen_addr);

        let app = routes(self.store, self.backend, self.sign_key);
        let listener = TcpListener::bind(self.listen_addr);

        Server::new(listener)
            .run_with_graceful_shutdown(app, token.cancelled_owned(), Some(SHUTDOWN_GRACE))
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
