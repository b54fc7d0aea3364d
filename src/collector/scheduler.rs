use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::forwarder::Forwarder;
use super::seen::RecentlySeen;
use super::source::{Source, SourceRegistry};
use crate::config::{Config, ConfigError};
use crate::feed::{dedupe_key, extract, looks_like_feed, Fetcher, FetcherOptions};

/// Granularity at which the inter-cycle sleep re-checks the stop flag.
const STOP_CHECK_STEP: Duration = Duration::from_secs(1);
/// Pause after a cycle fails unexpectedly.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

const SERVICE_NAME: &str = "CollectorService";

/// Lifecycle of the collection loop. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl CollectorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => CollectorState::Idle,
            1 => CollectorState::Running,
            2 => CollectorState::Stopping,
            _ => CollectorState::Stopped,
        }
    }
}

/// Why a source produced nothing this cycle. The source is skipped until
/// the next cycle; other sources are unaffected.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("fetch failed with status {status}")]
    Transport { status: u16 },
    #[error("no items found in feed")]
    EmptyFeed,
}

/// Failures that prevent a collector from being built.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SourceOutcome {
    extracted: usize,
    forwarded: usize,
    failed: usize,
    suppressed: usize,
}

/// Counters for one pass over the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources_visited: usize,
    pub sources_failed: usize,
    pub items_extracted: usize,
    pub items_forwarded: usize,
    pub items_failed: usize,
    /// Items skipped by the recently-seen cache
    pub items_suppressed: usize,
    /// Stop was requested before every source was visited
    pub interrupted: bool,
}

impl CycleReport {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            sources_visited: 0,
            sources_failed: 0,
            items_extracted: 0,
            items_forwarded: 0,
            items_failed: 0,
            items_suppressed: 0,
            interrupted: false,
        }
    }

    fn absorb(&mut self, outcome: SourceOutcome) {
        self.items_extracted += outcome.extracted;
        self.items_forwarded += outcome.forwarded;
        self.items_failed += outcome.failed;
        self.items_suppressed += outcome.suppressed;
    }
}

/// Snapshot behind the external status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub service: &'static str,
    pub status: CollectorState,
    pub running: bool,
    pub sources: usize,
    pub interval_seconds: u64,
    pub cycles_completed: u64,
    /// Keys held by the recently-seen cache; `None` when it is disabled
    pub recently_seen: Option<usize>,
    pub last_cycle: Option<CycleReport>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// State shared between the [`Collector`] handle and its background task.
struct Inner {
    registry: SourceRegistry,
    fetcher: Arc<Fetcher>,
    forwarder: Forwarder,
    fetch_timeout: Duration,
    interval: Duration,
    seen: Option<RecentlySeen>,
    stop: AtomicBool,
    state: AtomicU8,
    cycles_completed: AtomicU64,
    last_cycle: Mutex<Option<CycleReport>>,
}

impl Inner {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: CollectorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> CollectorState {
        CollectorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn run_cycle(&self) -> CycleReport {
        tracing::info!(sources = self.registry.len(), "Starting collection cycle");
        let mut report = CycleReport::begin();

        for source in self.registry.iter() {
            if self.stop_requested() {
                tracing::info!("Stop requested, skipping remaining sources");
                report.interrupted = true;
                break;
            }

            report.sources_visited += 1;
            match self.collect_source(source).await {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    tracing::warn!(
                        source = %source.name,
                        url = %source.url,
                        error = %e,
                        "Skipping source for this cycle"
                    );
                    report.sources_failed += 1;
                }
            }
        }

        report.finished_at = Utc::now();
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        *self.last_cycle.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
        report
    }

    /// Fetch, extract, and forward one source. Always runs to completion once
    /// started; the stop flag is only consulted between sources.
    async fn collect_source(&self, source: &Source) -> Result<SourceOutcome, CollectError> {
        tracing::info!(source = %source.name, url = %source.url, "Collecting from source");

        let response = self.fetcher.fetch(&source.url, self.fetch_timeout).await;
        if !response.succeeded {
            return Err(CollectError::Transport {
                status: response.status_code,
            });
        }

        if !looks_like_feed(&response.body) {
            tracing::warn!(
                source = %source.name,
                "Response does not look like RSS/Atom, extracting anyway"
            );
        }

        let feed = extract(&response.body, &source.url);
        if feed.items.is_empty() {
            return Err(CollectError::EmptyFeed);
        }

        let mut outcome = SourceOutcome {
            extracted: feed.items.len(),
            ..Default::default()
        };

        for item in &feed.items {
            let key = self.seen.as_ref().map(|_| dedupe_key(item));
            if let (Some(seen), Some(key)) = (&self.seen, &key) {
                if seen.contains(key) {
                    tracing::debug!(source = %source.name, title = %item.title, "Already forwarded, skipping");
                    outcome.suppressed += 1;
                    continue;
                }
            }

            if self.forwarder.forward(source, item).await {
                outcome.forwarded += 1;
                if let (Some(seen), Some(key)) = (&self.seen, key) {
                    seen.insert(key);
                }
            } else {
                outcome.failed += 1;
            }
        }

        tracing::info!(
            source = %source.name,
            extracted = outcome.extracted,
            forwarded = outcome.forwarded,
            failed = outcome.failed,
            suppressed = outcome.suppressed,
            "Source collected"
        );
        Ok(outcome)
    }

    /// Sleeps in one-second steps so a stop request lands within a step.
    async fn sleep_unless_stopped(&self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() && !self.stop_requested() {
            let step = remaining.min(STOP_CHECK_STEP);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }
}

/// Drives `cycle` until the stop flag is set. A cycle that panics is logged
/// and followed by [`ERROR_BACKOFF`] instead of the regular interval.
async fn run_loop<F, Fut>(inner: Arc<Inner>, cycle: F)
where
    F: Fn(Arc<Inner>) -> Fut,
    Fut: Future<Output = CycleReport>,
{
    tracing::info!("Collection loop started");

    while !inner.stop_requested() {
        match AssertUnwindSafe(cycle(Arc::clone(&inner))).catch_unwind().await {
            Ok(report) => {
                tracing::info!(
                    visited = report.sources_visited,
                    failed = report.sources_failed,
                    forwarded = report.items_forwarded,
                    interval_secs = inner.interval.as_secs(),
                    "Collection cycle completed, sleeping"
                );
                inner.sleep_unless_stopped(inner.interval).await;
            }
            Err(panic) => {
                tracing::error!(
                    error = %panic_message(panic.as_ref()),
                    backoff_secs = ERROR_BACKOFF.as_secs(),
                    "Collection cycle failed, backing off"
                );
                inner.sleep_unless_stopped(ERROR_BACKOFF).await;
            }
        }
    }

    tracing::info!("Collection loop stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Periodic feed collector.
///
/// Owns exactly one background task once [`Collector::start`] is called.
/// Sources are processed one after another on that task; cancellation is
/// cooperative through a single stop flag checked before each source and
/// during the inter-cycle sleep.
pub struct Collector {
    inner: Arc<Inner>,
    task: Option<JoinHandle<()>>,
}

impl Collector {
    /// Validates `config` and builds the HTTP client, registry, and forwarder.
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        config.validate()?;
        let registry = SourceRegistry::new(config.sources.clone())?;

        let fetcher = Arc::new(Fetcher::new(FetcherOptions {
            user_agent: config.user_agent.clone(),
            default_timeout: config.fetch_timeout().max(config.forward_timeout()),
            max_redirects: config.max_redirects,
            ..Default::default()
        })?);
        let forwarder = Forwarder::new(
            Arc::clone(&fetcher),
            config.sink_url.clone(),
            config.forward_timeout(),
        );

        tracing::info!(
            sources = registry.len(),
            interval_secs = config.collection_interval_seconds,
            sink = %forwarder.sink_url(),
            dedupe_capacity = config.dedupe_capacity,
            "Collector initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                fetcher,
                forwarder,
                fetch_timeout: config.fetch_timeout(),
                interval: config.collection_interval(),
                seen: RecentlySeen::new(config.dedupe_capacity),
                stop: AtomicBool::new(false),
                state: AtomicU8::new(CollectorState::Idle as u8),
                cycles_completed: AtomicU64::new(0),
                last_cycle: Mutex::new(None),
            }),
            task: None,
        })
    }

    /// Spawns the background loop. Only the first call from `Idle` has any
    /// effect. Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.inner.state() != CollectorState::Idle {
            tracing::warn!(state = ?self.inner.state(), "Collector already started");
            return;
        }

        self.inner.set_state(CollectorState::Running);
        self.task = Some(tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            |inner| async move { inner.run_cycle().await },
        )));
    }

    /// Signals the loop to stop and waits for it to exit. The source being
    /// processed when the signal arrives is finished first.
    pub async fn stop(&mut self) {
        let Some(handle) = self.task.take() else {
            self.inner.stop.store(true, Ordering::SeqCst);
            self.inner.set_state(CollectorState::Stopped);
            return;
        };

        tracing::info!("Stopping collection loop");
        self.inner.set_state(CollectorState::Stopping);
        self.inner.stop.store(true, Ordering::SeqCst);

        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Collection task ended abnormally");
        }
        self.inner.set_state(CollectorState::Stopped);
    }

    /// Runs a single cycle on the caller's task, independent of the loop.
    pub async fn run_cycle(&self) -> CycleReport {
        self.inner.run_cycle().await
    }

    pub fn state(&self) -> CollectorState {
        self.inner.state()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state() == CollectorState::Running
    }

    pub fn status(&self) -> CollectorStatus {
        CollectorStatus {
            service: SERVICE_NAME,
            status: self.inner.state(),
            running: self.is_running(),
            sources: self.inner.registry.len(),
            interval_seconds: self.inner.interval.as_secs(),
            cycles_completed: self.inner.cycles_completed.load(Ordering::SeqCst),
            recently_seen: self.inner.seen.as_ref().map(RecentlySeen::len),
            last_cycle: self
                .inner
                .last_cycle
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        // Let a still-running loop wind down on its own
        self.inner.stop.store(true, Ordering::SeqCst);
    }
}
