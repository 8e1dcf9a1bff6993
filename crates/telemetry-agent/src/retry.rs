//! Bounded retry with doubling backoff for report delivery.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff schedule: doubling from the minimum, clamped to the maximum,
    /// one entry per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut next = self.min_backoff;
        std::iter::from_fn(move || {
            let current = next.min(self.max_backoff);
            next = next.saturating_mul(2);
            Some(current)
        })
        .take(self.max_retries as usize)
    }

    /// Run `op`, retrying on errors `retryable` accepts. The final error is
    /// returned once the attempt budget is spent.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut last = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        for (attempt, delay) in self.delays().enumerate() {
            if !retryable(&last) {
                return Err(last);
            }
            warn!(
                "attempt {} failed, retrying in {delay:?}: {last}",
                attempt + 1
            );
            tokio::time::sleep(delay).await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}
