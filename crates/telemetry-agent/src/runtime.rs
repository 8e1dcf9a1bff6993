//! Agent bootstrap and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::collector::Collector;
use crate::collector::MetricBuffer;
use crate::config::AgentArgs;
use crate::crypto::BodyCipher;
use crate::transmitter::Transmitter;

/// Grace period for the collector and transmitter to wind down.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Agent {
    args: AgentArgs,
    collector: Collector,
    transmitter: Transmitter,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Agent {
    pub fn bootstrap(args: AgentArgs) -> Result<Self> {
        let buffer = Arc::new(MetricBuffer::new());
        let collector = Collector::new(Arc::clone(&buffer))?;
        let cipher = BodyCipher::from_key_file(args.crypto_key.clone())?;
        let transmitter = Transmitter::new(&args, buffer, cipher)?;

        Ok(Self {
            args,
            collector,
            transmitter,
            token: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Run the poll and report loops until a termination signal.
    pub async fn run(self) -> Result<()> {
        let Agent {
            args,
            collector,
            transmitter,
            token,
            mut tasks,
        } = self;

        info!("reporting to {}", args.updates_url());

        let poll_interval = Duration::from_secs(args.poll_interval.max(1));
        let report_interval = Duration::from_secs(args.report_interval.max(1));

        tasks.push(tokio::spawn(collector.run(poll_interval, token.clone())));
        tasks.push(tokio::spawn(transmitter.run(report_interval, token.clone())));

        wait_for_shutdown_signal().await?;
        token.cancel();
        drain_tasks(&mut tasks, TASK_SHUTDOWN_TIMEOUT).await;
        info!("shutdown complete");
        Ok(())
    }
}

async fn drain_tasks(tasks: &mut Vec<JoinHandle<()>>, timeout: Duration) {
    let drain = async {
        for task in tasks {
            if let Err(e) = task.await {
                error!("task failed during shutdown: {e}");
            }
        }
    };
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!("task shutdown timed out after {timeout:?}");
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
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
