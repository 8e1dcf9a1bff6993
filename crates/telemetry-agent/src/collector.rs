//! Metric collection.
//!
//! Two samplers feed one shared buffer: a process sampler for the agent's
//! own runtime footprint and a system sampler for host memory and CPU.
//! Each poll tick runs both off the async runtime and folds whatever they
//! produced into the buffer under a single lock, so a report never sees a
//! half-written tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use sysinfo::Pid;
use sysinfo::System;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("current process id is unavailable: {0}")]
    CurrentPid(String),
    #[error("process {0} is not visible to the sampler")]
    ProcessGone(Pid),
}

#[derive(Debug, Default)]
struct BufferState {
    gauges: HashMap<String, f64>,
    poll_count: i64,
}

/// Shared accumulation point between the poll loop and the report loop.
///
/// Gauges keep only the latest observation. The poll counter accumulates
/// across ticks and is trimmed by [`confirm_reported`](Self::confirm_reported)
/// once a report lands, so ticks that happen mid-report are never lost.
#[derive(Debug, Default)]
pub struct MetricBuffer {
    state: Mutex<BufferState>,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one poll tick into the buffer. A sampler that failed this tick
    /// passes `None` and its previous gauge values stay cached; the poll
    /// counter advances regardless.
    pub fn record_tick(
        &self,
        process: Option<Vec<(String, f64)>>,
        system: Option<Vec<(String, f64)>>,
    ) {
        let mut state = self.lock();
        for (name, value) in process.into_iter().flatten() {
            state.gauges.insert(name, value);
        }
        for (name, value) in system.into_iter().flatten() {
            state.gauges.insert(name, value);
        }
        state.poll_count += 1;
    }

    /// Snapshot for one report: every cached gauge plus the current
    /// poll-count delta.
    pub fn report_view(&self) -> (Vec<(String, f64)>, i64) {
        let state = self.lock();
        let mut gauges: Vec<_> = state
            .gauges
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));
        (gauges, state.poll_count)
    }

    /// Subtract a delivered poll-count delta. Ticks recorded while the
    /// report was in flight survive into the next one.
    pub fn confirm_reported(&self, delivered: i64) {
        let mut state = self.lock();
        state.poll_count = (state.poll_count - delivered).max(0);
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().expect("metric buffer lock poisoned")
    }
}

/// Gauges describing the agent process itself.
pub struct ProcessSampler {
    pid: Pid,
    system: Mutex<System>,
}

impl ProcessSampler {
    pub fn new() -> Result<Self, SampleError> {
        let pid = sysinfo::get_current_pid().map_err(|e| SampleError::CurrentPid(e.to_string()))?;
        Ok(Self {
            pid,
            system: Mutex::new(System::new()),
        })
    }

    pub fn sample(&self) -> Result<Vec<(String, f64)>, SampleError> {
        let mut system = self.system.lock().expect("process sampler lock poisoned");
        if !system.refresh_process(self.pid) {
            return Err(SampleError::ProcessGone(self.pid));
        }
        let process = system
            .process(self.pid)
            .ok_or(SampleError::ProcessGone(self.pid))?;

        Ok(vec![
            ("Alloc".to_string(), process.memory() as f64),
            ("Sys".to_string(), process.virtual_memory() as f64),
            ("RunTime".to_string(), process.run_time() as f64),
        ])
    }
}

/// Host-wide memory and per-core CPU gauges.
pub struct SystemSampler {
    system: Mutex<System>,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    pub fn sample(&self) -> Result<Vec<(String, f64)>, SampleError> {
        let mut system = self.system.lock().expect("system sampler lock poisoned");
        system.refresh_memory();
        system.refresh_cpu();

        let mut gauges = vec![
            ("TotalMemory".to_string(), system.total_memory() as f64),
            ("FreeMemory".to_string(), system.free_memory() as f64),
            ("UsedMemory".to_string(), system.used_memory() as f64),
        ];
        for (index, cpu) in system.cpus().iter().enumerate() {
            gauges.push((
                format!("CPUutilization{}", index + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }
        Ok(gauges)
    }
}

/// Drives both samplers on the poll interval until cancelled.
pub struct Collector {
    buffer: Arc<MetricBuffer>,
    process: Arc<ProcessSampler>,
    system: Arc<SystemSampler>,
}

impl Collector {
    pub fn new(buffer: Arc<MetricBuffer>) -> Result<Self, SampleError> {
        Ok(Self {
            buffer,
            process: Arc::new(ProcessSampler::new()?),
            system: Arc::new(SystemSampler::new()),
        })
    }

    pub async fn run(self, poll_interval: Duration, token: CancellationToken) {
        info!("starting collector with poll interval {poll_interval:?}");
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = token.cancelled() => {
                    info!("collector stopped");
                    return;
                }
            }
        }
    }

    /// One poll tick. Sampling is blocking work, so both samplers run on
    /// the blocking pool and their results join back here.
    async fn tick(&self) {
        let process = Arc::clone(&self.process);
        let system = Arc::clone(&self.system);
        let (process_samples, system_samples) = tokio::join!(
            tokio::task::spawn_blocking(move || process.sample()),
            tokio::task::spawn_blocking(move || system.sample()),
        );

        let process_samples = flatten_sample("process", process_samples);
        let system_samples = flatten_sample("system", system_samples);
        self.buffer.record_tick(process_samples, system_samples);
        debug!("recorded poll tick");
    }
}

fn flatten_sample(
    which: &str,
    joined: Result<Result<Vec<(String, f64)>, SampleError>, tokio::task::JoinError>,
) -> Option<Vec<(String, f64)>> {
    match joined {
        Ok(Ok(samples)) => Some(samples),
        Ok(Err(e)) => {
            warn!("{which} sampler failed, keeping cached values: {e}");
            None
        }
        Err(e) => {
            warn!("{which} sampler task failed, keeping cached values: {e}");
            None
        }
    }
}
