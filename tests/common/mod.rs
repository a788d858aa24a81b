#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeDelta, TimeZone, Utc};
use tokio::sync::Notify;

use driftx::error::{Error, Result};
use driftx::store::{RetentionPolicy, SnapshotStore};
use driftx::system::collector::{CaptureReport, SkipReason, SkippedProcess, SnapshotSource};
use driftx::system::{ProcessRecord, ProcessStatus, Snapshot, SystemMetrics};

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(seconds)
}

pub fn process(pid: u32, name: &str, cpu: f64, memory: f64) -> ProcessRecord {
    ProcessRecord {
        pid,
        name: name.to_string(),
        cpu_percent: cpu,
        memory_percent: memory,
        memory_mb: memory * 80.0,
        status: ProcessStatus::Running,
        user: "svc".to_string(),
        command: format!("/usr/bin/{name} --serve"),
        created_at: None,
        alert: None,
    }
}

pub fn snapshot(captured_at: DateTime<Utc>, processes: Vec<ProcessRecord>) -> Snapshot {
    Snapshot {
        captured_at,
        system_metrics: SystemMetrics {
            cpu_percent: 12.5,
            memory_percent: 40.25,
            disk_usage: "Filesystem Size Used Avail Use% Mounted on".to_string(),
            logged_users: "ops pts/0".to_string(),
        },
        processes,
    }
}

pub fn open_store(dir: &Path, max_snapshots: usize) -> SnapshotStore {
    SnapshotStore::open(dir, RetentionPolicy { max_snapshots }).unwrap()
}

/// Capture stand-in that returns the same process list every time.
pub struct ScriptedSource {
    processes: Vec<ProcessRecord>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
    fail: bool,
}

impl ScriptedSource {
    pub fn new(processes: Vec<ProcessRecord>) -> Self {
        ScriptedSource {
            processes,
            calls: AtomicUsize::new(0),
            gate: None,
            fail: false,
        }
    }

    /// Each capture waits for one `notify_one` on `gate` before returning.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn capture(&self) -> Result<CaptureReport> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(Error::Capture("scripted failure".to_string()));
        }
        let captured_at = Utc::now().trunc_subsecs(6) + TimeDelta::microseconds(n as i64);
        Ok(CaptureReport {
            snapshot: snapshot(captured_at, self.processes.clone()),
            skipped: vec![SkippedProcess {
                pid: 4242,
                reason: SkipReason::Inaccessible,
            }],
        })
    }
}
