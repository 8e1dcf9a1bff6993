//! Report delivery.
//!
//! On every report tick a cycle pushes the buffered gauges as one JSON batch
//! to `/updates/` and the poll-count delta as a single counter update to
//! `/update/`. Bodies are signed over the raw JSON, gzip-compressed, then
//! sealed. Cycles run concurrently up to the configured rate limit; a tick
//! that finds the limit saturated is skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::CONTENT_ENCODING;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use telemetry_types::codec;
use telemetry_types::signing;
use telemetry_types::MetricPayload;
use telemetry_types::SIGNATURE_HEADER;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::collector::MetricBuffer;
use crate::config::AgentArgs;
use crate::crypto::BodyCipher;
use crate::retry::RetryPolicy;

/// Grace period for in-flight report cycles once shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(StatusCode),
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("payload compression failed: {0}")]
    Compress(#[from] std::io::Error),
}

impl TransmitError {
    /// Transport failures and server-side errors are worth another attempt;
    /// a 4xx means the payload itself is wrong and will not improve.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(code) => code.is_server_error(),
            Self::Encode(_) | Self::Compress(_) => false,
        }
    }
}

struct Inner {
    client: reqwest::Client,
    buffer: Arc<MetricBuffer>,
    cipher: BodyCipher,
    sign_key: Option<String>,
    update_url: String,
    updates_url: String,
    policy: RetryPolicy,
    limiter: Arc<Semaphore>,
}

#[derive(Clone)]
pub struct Transmitter {
    inner: Arc<Inner>,
}

impl Transmitter {
    pub fn new(
        args: &AgentArgs,
        buffer: Arc<MetricBuffer>,
        cipher: BodyCipher,
    ) -> Result<Self, TransmitError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                buffer,
                cipher,
                sign_key: args.sign_key.clone(),
                update_url: args.update_url(),
                updates_url: args.updates_url(),
                policy: RetryPolicy::default(),
                limiter: Arc::new(Semaphore::new(args.rate_limit.max(1))),
            }),
        })
    }

    /// Report on the given interval until cancelled, then flush once more.
    pub async fn run(self, report_interval: Duration, token: CancellationToken) {
        info!("starting transmitter with report interval {report_interval:?}");
        let mut ticker = tokio::time::interval(report_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; there is nothing
        // collected yet, so swallow it.
        ticker.tick().await;

        let mut cycles: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while cycles.try_join_next().is_some() {}
                    self.spawn_cycle(&mut cycles);
                }
                _ = token.cancelled() => break,
            }
        }

        self.drain(&mut cycles).await;
        // Final flush so the last poll ticks are not lost on shutdown.
        if tokio::time::timeout(SHUTDOWN_GRACE, self.report_cycle()).await.is_err() {
            warn!("final report timed out");
        }
        info!("transmitter stopped");
    }

    fn spawn_cycle(&self, cycles: &mut JoinSet<()>) {
        match Arc::clone(&self.inner.limiter).try_acquire_owned() {
            Ok(permit) => {
                let this = self.clone();
                cycles.spawn(async move {
                    this.report_cycle().await;
                    drop(permit);
                });
            }
            Err(_) => warn!("skipping report tick, all report slots are busy"),
        }
    }

    async fn drain(&self, cycles: &mut JoinSet<()>) {
        let deadline = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while cycles.join_next().await.is_some() {}
        });
        if deadline.await.is_err() {
            warn!("aborting report cycles still in flight after {SHUTDOWN_GRACE:?}");
            cycles.abort_all();
        }
    }

    /// One full report: the gauge batch, the random gauge on its own, then
    /// the poll-count delta. The delta is subtracted from the buffer only
    /// after the server accepted it, so a failed report carries its ticks
    /// into the next cycle.
    pub async fn report_cycle(&self) {
        let (gauges, poll_delta) = self.inner.buffer.report_view();
        let random = MetricPayload::gauge("RandomValue", rand::thread_rng().gen::<f64>());
        let batch = build_batch(&gauges, &random);

        if let Err(e) = self.post(&self.inner.updates_url, &batch).await {
            error!("gauge batch report failed: {e}");
        }

        if let Err(e) = self.post(&self.inner.update_url, &random).await {
            error!("random gauge report failed: {e}");
        }

        if poll_delta > 0 {
            let counter = MetricPayload::counter("PollCount", poll_delta);
            match self.post(&self.inner.update_url, &counter).await {
                Ok(()) => self.inner.buffer.confirm_reported(poll_delta),
                Err(e) => error!("poll count report failed: {e}"),
            }
        }
        debug!("report cycle finished");
    }

    async fn post<P: serde::Serialize>(&self, url: &str, payload: &P) -> Result<(), TransmitError> {
        let json = serde_json::to_vec(payload)?;
        let signature = self
            .inner
            .sign_key
            .as_ref()
            .map(|key| signing::sign(&json, key.as_bytes()));
        let body = self.inner.cipher.seal(codec::compress(&json)?);

        self.inner
            .policy
            .run(
                || {
                    let mut req = self
                        .inner
                        .client
                        .post(url)
                        .header(CONTENT_TYPE, "application/json")
                        .header(CONTENT_ENCODING, "gzip")
                        .body(body.clone());
                    if let Some(signature) = &signature {
                        req = req.header(SIGNATURE_HEADER, signature.clone());
                    }
                    async move {
                        let resp = req.send().await?;
                        let status = resp.status();
                        if status.is_success() {
                            Ok(())
                        } else {
                            Err(TransmitError::Status(status))
                        }
                    }
                },
                TransmitError::is_retryable,
            )
            .await
    }
}

/// Batch for `/updates/`: every cached gauge plus this cycle's `RandomValue`.
fn build_batch(gauges: &[(String, f64)], random: &MetricPayload) -> Vec<MetricPayload> {
    let mut batch: Vec<MetricPayload> = gauges
        .iter()
        .map(|(name, value)| MetricPayload::gauge(name, *value))
        .collect();
    batch.push(random.clone());
    batch
}
