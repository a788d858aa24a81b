//! Periodic and on-demand capture.
//!
//! A [`Scheduler`] is an explicit handle owned by whoever composes the
//! daemon. Scheduled ticks and manual triggers run the same capture-persist
//! routine behind one async mutex: a trigger that finds a capture running is
//! rejected with [`Error::CaptureInProgress`], a tick that finds one running
//! is skipped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{Error, Result};
use crate::store::SnapshotStore;
use crate::system::collector::{SkipReason, SnapshotSource};
use crate::system::snapshot::SnapshotId;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub auto_snapshot_enabled: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct CaptureOutcome {
    pub snapshot: SnapshotId,
    pub captured_at: DateTime<Utc>,
    pub processes: usize,
    pub skipped: usize,
    pub evicted: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub auto_snapshot_enabled: bool,
    pub interval_secs: u64,
    pub next_run: Option<DateTime<Utc>>,
    pub capture_in_progress: bool,
    pub last_capture_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct RunState {
    running: bool,
    next_run: Option<DateTime<Utc>>,
    last_capture_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct Inner {
    source: Arc<dyn SnapshotSource>,
    store: Arc<SnapshotStore>,
    settings: SchedulerSettings,
    capture_lock: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<RunState>,
    shutdown: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        store: Arc<SnapshotStore>,
        settings: SchedulerSettings,
    ) -> Self {
        Scheduler {
            inner: Arc::new(Inner {
                source,
                store,
                settings,
                capture_lock: Arc::new(tokio::sync::Mutex::new(())),
                state: Mutex::new(RunState::default()),
                shutdown: Notify::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Marks the scheduler running and, when auto capture is enabled, spawns
    /// the interval loop. The first scheduled capture happens one interval
    /// after start. Calling it twice is a no-op.
    pub fn start(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.running {
                warn!("scheduler already started");
                return;
            }
            state.running = true;
        }

        if !self.inner.settings.auto_snapshot_enabled {
            info!("auto snapshot disabled, manual triggers only");
            return;
        }

        let period = self.inner.settings.interval;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            inner.set_next_run(Instant::now() + period);

            loop {
                tokio::select! {
                    tick = ticker.tick() => {
                        inner.scheduled_capture().await;
                        inner.set_next_run(tick + period);
                    }
                    _ = inner.shutdown.notified() => break,
                }
            }
        });
        *self.inner.lock_task() = Some(task);
        info!(interval_secs = period.as_secs(), "scheduler started");
    }

    /// Captures now. Rejected immediately if a capture is already running.
    ///
    /// The capture runs on its own task holding the lock, so dropping the
    /// returned future does not let a second capture start before it ends.
    pub async fn trigger(&self) -> Result<CaptureOutcome> {
        let Ok(guard) = Arc::clone(&self.inner.capture_lock).try_lock_owned() else {
            return Err(Error::CaptureInProgress);
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _guard = guard;
            inner.capture_and_persist().await
        })
        .await
        .map_err(|e| Error::Internal(format!("capture task failed: {e}")))?
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.lock_state();
        SchedulerStatus {
            running: state.running,
            auto_snapshot_enabled: self.inner.settings.auto_snapshot_enabled,
            interval_secs: self.inner.settings.interval.as_secs(),
            next_run: if state.running { state.next_run } else { None },
            capture_in_progress: self.inner.capture_lock.try_lock().is_err(),
            last_capture_at: state.last_capture_at,
            last_error: state.last_error.clone(),
        }
    }

    /// Stops the interval loop and waits for it to exit. An in-flight
    /// scheduled capture finishes first.
    pub async fn shutdown(&self) {
        let task = self.inner.lock_task().take();
        if let Some(task) = task {
            self.inner.shutdown.notify_one();
            if let Err(err) = task.await {
                error!(error = %err, "scheduler task ended abnormally");
            }
        }
        let mut state = self.inner.lock_state();
        state.running = false;
        state.next_run = None;
        info!("scheduler stopped");
    }
}

impl Inner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_next_run(&self, at: Instant) {
        let wait = at.saturating_duration_since(Instant::now());
        let next = Utc::now() + TimeDelta::from_std(wait).unwrap_or_default();
        self.lock_state().next_run = Some(next);
    }

    async fn scheduled_capture(&self) {
        let Ok(_guard) = self.capture_lock.try_lock() else {
            debug!("capture already running, skipping scheduled tick");
            return;
        };
        // Failures are recorded in the status and retried on the next tick.
        let _ = self.capture_and_persist().await;
    }

    /// Caller must hold `capture_lock`.
    async fn capture_and_persist(&self) -> Result<CaptureOutcome> {
        let result = self
            .run_capture()
            .instrument(info_span!("capture"))
            .await;
        let mut state = self.lock_state();
        match &result {
            Ok(outcome) => {
                state.last_capture_at = Some(outcome.captured_at);
                state.last_error = None;
            }
            Err(err) => {
                error!(error = %err, "capture failed");
                state.last_error = Some(err.to_string());
            }
        }
        result
    }

    async fn run_capture(&self) -> Result<CaptureOutcome> {
        let report = self.source.capture().await?;
        if !report.skipped.is_empty() {
            let exited = report
                .skipped
                .iter()
                .filter(|s| s.reason == SkipReason::Exited)
                .count();
            info!(
                skipped = report.skipped.len(),
                exited,
                inaccessible = report.skipped.len() - exited,
                "capture degraded, some processes were not inspected"
            );
        }

        let snapshot = report.snapshot;
        let captured_at = snapshot.captured_at;
        let processes = snapshot.processes.len();
        let store = Arc::clone(&self.store);
        let persisted = tokio::task::spawn_blocking(move || store.persist(&snapshot))
            .await
            .map_err(|e| Error::Internal(format!("persist task panicked: {e}")))??;

        info!(
            snapshot = %persisted.id,
            processes,
            evicted = persisted.evicted.len(),
            "snapshot captured"
        );
        Ok(CaptureOutcome {
            snapshot: persisted.id,
            captured_at,
            processes,
            skipped: report.skipped.len(),
            evicted: persisted.evicted.len(),
        })
    }
}
