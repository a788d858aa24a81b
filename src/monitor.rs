//! Read-only query surface over the snapshot store, plus capture control.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::{
    Drift, ProcessAlert, ResourceReport, RiskLevel, StuckProcess, Thresholds, analyze_resources,
    collect_alerts, detect_stuck, drift_of_latest, risk_level,
};
use crate::error::{Error, Result};
use crate::scheduler::{CaptureOutcome, Scheduler, SchedulerStatus};
use crate::store::{SnapshotStore, TimelineEntry};
use crate::system::process::ProcessRecord;
use crate::system::snapshot::{Snapshot, SnapshotId};

#[derive(Clone, Copy, Debug)]
pub struct AnalysisSettings {
    pub thresholds: Thresholds,
    pub stuck_window: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResourceAnalysis {
    pub snapshot: SnapshotId,
    pub captured_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: ResourceReport,
    pub stuck_processes: Vec<StuckProcess>,
    pub risk_level: RiskLevel,
}

#[derive(Clone, Debug, Serialize)]
pub struct DriftReport {
    pub old_snapshot: SnapshotId,
    pub new_snapshot: SnapshotId,
    #[serde(flatten)]
    pub drift: Drift,
}

#[derive(Clone, Debug, Serialize)]
pub struct SnapshotInfo {
    pub total_snapshots: usize,
    pub latest_snapshot: Option<SnapshotId>,
    pub latest_captured_at: Option<DateTime<Utc>>,
    pub seconds_since_last: Option<i64>,
    pub next_scheduled_snapshot: Option<DateTime<Utc>>,
}

/// Everything the request-serving layer can ask for.
///
/// Read operations are synchronous file reads; async callers should run
/// them on a blocking thread.
pub struct Monitor {
    store: Arc<SnapshotStore>,
    scheduler: Scheduler,
    settings: AnalysisSettings,
}

impl Monitor {
    pub fn new(store: Arc<SnapshotStore>, scheduler: Scheduler, settings: AnalysisSettings) -> Self {
        Monitor {
            store,
            scheduler,
            settings,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn latest_snapshot(&self) -> Result<Snapshot> {
        self.store.latest()
    }

    pub fn current_processes(&self) -> Result<Vec<ProcessRecord>> {
        Ok(self.store.latest()?.processes)
    }

    pub fn process(&self, pid: u32) -> Result<ProcessRecord> {
        let snapshot = self.store.latest()?;
        snapshot
            .process(pid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("process {pid}")))
    }

    pub fn stuck_processes(&self) -> Result<Vec<StuckProcess>> {
        let window = self.settings.stuck_window;
        let history = self.store.history(window)?;
        Ok(detect_stuck(&history, window, self.settings.thresholds.cpu))
    }

    pub fn resource_analysis(&self) -> Result<ResourceAnalysis> {
        let latest = self.store.latest()?;
        let report = analyze_resources(&latest.processes, &self.settings.thresholds);
        let stuck = self.stuck_processes()?;
        let risk_level = risk_level(&report, &stuck);
        Ok(ResourceAnalysis {
            snapshot: latest.id(),
            captured_at: latest.captured_at,
            report,
            stuck_processes: stuck,
            risk_level,
        })
    }

    /// All active alerts; empty when nothing has been captured yet.
    pub fn alerts(&self) -> Result<Vec<ProcessAlert>> {
        let latest = match self.store.latest() {
            Ok(snapshot) => snapshot,
            Err(Error::NotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let stuck = self.stuck_processes()?;
        Ok(collect_alerts(&latest, &stuck, &self.settings.thresholds))
    }

    /// Drift between the two newest captures. An unreadable newest snapshot
    /// is an error rather than a silently older pair.
    pub fn drift(&self) -> Result<DriftReport> {
        let history = self.store.history(2)?;
        if let Some(newest) = self.store.list()?.last()
            && history.last().map(Snapshot::id).as_ref() != Some(newest)
        {
            self.store.read(newest)?;
        }
        let drift = drift_of_latest(&history)?;
        Ok(DriftReport {
            old_snapshot: history[0].id(),
            new_snapshot: history[1].id(),
            drift,
        })
    }

    pub fn timeline(&self, count: usize) -> Result<Vec<TimelineEntry>> {
        self.store.timeline(count)
    }

    pub fn snapshot_info(&self) -> Result<SnapshotInfo> {
        let ids = self.store.list()?;
        let latest = ids.last().cloned();
        let latest_captured_at = latest.as_ref().and_then(SnapshotId::timestamp);
        Ok(SnapshotInfo {
            total_snapshots: ids.len(),
            latest_snapshot: latest,
            latest_captured_at,
            seconds_since_last: latest_captured_at.map(|at| (Utc::now() - at).num_seconds()),
            next_scheduled_snapshot: self.scheduler.status().next_run,
        })
    }

    pub async fn trigger_capture(&self) -> Result<CaptureOutcome> {
        self.scheduler.trigger().await
    }

    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }
}
