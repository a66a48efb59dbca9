use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hygro_core::{Endpoint, Sample};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ErrorKind;
use crate::fetcher::{FetchError, Fetcher};
use crate::normalize::{NormalizeError, normalize};
use crate::sink::Sink;

/// Cadence and bounds of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Must be non-zero.
    pub interval: Duration,
    /// Lifetime of the loop, measured from the start of `run`.
    pub deadline: Option<Duration>,
    pub write_timeout: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            deadline: None,
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Why polling one endpoint failed in a tick. Never fatal to the loop.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("payload carries no deviceId")]
    MissingDeviceId,
    #[error("sink write failed: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("sink write timed out after {0:?}")]
    SinkTimeout(Duration),
    #[error("endpoint task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PollError::Fetch(e) => e.kind(),
            PollError::Normalize(_) | PollError::MissingDeviceId => ErrorKind::Protocol,
            PollError::Sink(_) | PollError::SinkTimeout(_) => ErrorKind::Sink,
            PollError::Task(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug)]
pub struct EndpointOutcome {
    pub endpoint: Endpoint,
    pub result: Result<Sample, PollError>,
}

/// Per-endpoint results of one tick, in configuration order.
#[derive(Debug, Default)]
pub struct TickReport {
    pub outcomes: Vec<EndpointOutcome>,
}

impl TickReport {
    pub fn written(&self) -> u64 {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count() as u64
    }

    pub fn failed(&self) -> u64 {
        self.outcomes.iter().filter(|o| o.result.is_err()).count() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub written: u64,
    pub failed: u64,
    pub reason: StopReason,
}

/// Fixed-cadence polling loop over a static set of endpoints.
///
/// A `Scheduler` is idle until [`Scheduler::run`] is awaited; the returned
/// [`RunSummary`] describes the stopped loop.
pub struct Scheduler<S: Sink> {
    config: ScheduleConfig,
    endpoints: Arc<[Endpoint]>,
    fetcher: Fetcher,
    sink: S,
}

impl<S: Sink> Scheduler<S> {
    pub fn new(
        config: ScheduleConfig,
        endpoints: impl Into<Arc<[Endpoint]>>,
        fetcher: Fetcher,
        sink: S,
    ) -> Self {
        Self {
            config,
            endpoints: endpoints.into(),
            fetcher,
            sink,
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Tick every `interval` until the deadline passes or `cancel` fires.
    ///
    /// The first tick happens one full interval after start. Both stop
    /// conditions interrupt a tick that is still in flight.
    pub async fn run(&self, cancel: CancellationToken) -> RunSummary {
        let start = Instant::now();
        // A deadline or first tick past the clock's range never arrives.
        let deadline =
            deadline_reached(self.config.deadline.and_then(|d| start.checked_add(d)));
        tokio::pin!(deadline);

        let mut ticker = start.checked_add(self.config.interval).map(|first| {
            let mut ticker = tokio::time::interval_at(first, self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        info!(
            endpoints = self.endpoints.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            deadline_ms = ?self.config.deadline.map(|d| d.as_millis() as u64),
            "scheduler running"
        );

        let mut ticks = 0;
        let mut written = 0;
        let mut failed = 0;

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = &mut deadline => break StopReason::Deadline,
                _ = next_tick(&mut ticker) => {}
            }

            ticks += 1;
            debug!(tick = ticks, "tick started");

            tokio::select! {
                report = self.tick_once() => {
                    written += report.written();
                    failed += report.failed();
                }
                _ = cancel.cancelled() => {
                    warn!(tick = ticks, "tick interrupted by cancellation");
                    break StopReason::Cancelled;
                }
                _ = &mut deadline => {
                    warn!(tick = ticks, "tick interrupted by deadline");
                    break StopReason::Deadline;
                }
            }
        };

        let summary = RunSummary {
            ticks,
            written,
            failed,
            reason,
        };
        info!(
            ticks = summary.ticks,
            written = summary.written,
            failed = summary.failed,
            reason = ?summary.reason,
            "scheduler stopped"
        );
        summary
    }

    /// Poll every endpoint once, concurrently. One endpoint failing leaves
    /// the others untouched.
    pub async fn tick_once(&self) -> TickReport {
        let mut tasks = JoinSet::new();
        let mut index = HashMap::with_capacity(self.endpoints.len());

        for (position, endpoint) in self.endpoints.iter().enumerate() {
            let handle = tasks.spawn(poll_endpoint(
                self.fetcher.clone(),
                self.sink.clone(),
                endpoint.clone(),
                self.config.write_timeout,
            ));
            index.insert(handle.id(), position);
        }

        let mut outcomes: Vec<(usize, EndpointOutcome)> = Vec::with_capacity(index.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(PollError::Task(e))),
            };
            let Some(&position) = index.get(&id) else {
                continue;
            };
            let endpoint = self.endpoints[position].clone();
            log_outcome(&endpoint, &result);
            outcomes.push((position, EndpointOutcome { endpoint, result }));
        }

        outcomes.sort_by_key(|(position, _)| *position);
        TickReport {
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }
}

async fn poll_endpoint<S: Sink>(
    fetcher: Fetcher,
    sink: S,
    endpoint: Endpoint,
    write_timeout: Duration,
) -> Result<Sample, PollError> {
    let payload = fetcher.fetch(&endpoint.url).await?;
    let sample = normalize(&payload, endpoint.profile)?;

    if sample.device_id.is_empty() {
        return Err(PollError::MissingDeviceId);
    }

    match tokio::time::timeout(write_timeout, sink.write(&sample)).await {
        Ok(Ok(())) => Ok(sample),
        Ok(Err(e)) => Err(PollError::Sink(Box::new(e))),
        Err(_) => Err(PollError::SinkTimeout(write_timeout)),
    }
}

fn log_outcome(endpoint: &Endpoint, result: &Result<Sample, PollError>) {
    match result {
        Ok(sample) => debug!(
            endpoint = %endpoint.url,
            profile = %endpoint.profile,
            device_id = %sample.device_id,
            "sample written"
        ),
        Err(e) if e.kind() == ErrorKind::Transient => warn!(
            endpoint = %endpoint.url,
            profile = %endpoint.profile,
            kind = %e.kind(),
            error = %e,
            "endpoint skipped this tick"
        ),
        Err(e) => error!(
            endpoint = %endpoint.url,
            profile = %endpoint.profile,
            kind = %e.kind(),
            error = %e,
            "endpoint poll failed"
        ),
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
