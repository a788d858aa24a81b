use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus as OsStatus, ProcessesToUpdate, System, Uid,
    UpdateKind, Users,
};
use tracing::debug;

use super::command::run_with_timeout;
use super::process::{ProcessRecord, ProcessStatus};
use super::snapshot::{Snapshot, SystemMetrics};
use crate::analysis::{Thresholds, classify_process};
use crate::error::{Error, Result};
use crate::format::{bytes_to_mb, round2, truncate_unicode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The process ended between enumeration and inspection.
    Exited,
    /// The process could not be read, usually for lack of permission.
    Inaccessible,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedProcess {
    pub pid: u32,
    pub reason: SkipReason,
}

/// A snapshot plus the processes that had to be left out of it.
#[derive(Clone, Debug)]
pub struct CaptureReport {
    pub snapshot: Snapshot,
    pub skipped: Vec<SkippedProcess>,
}

/// Produces one fully populated snapshot per call.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn capture(&self) -> Result<CaptureReport>;
}

#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub thresholds: Thresholds,
    pub command_timeout: Duration,
    pub command_max_len: usize,
    pub cpu_sample: Duration,
}

struct Probe {
    sys: System,
    users: Users,
}

/// Live collector backed by `sysinfo` plus `df -h` and `who`.
pub struct SysinfoSource {
    probe: Arc<Mutex<Probe>>,
    settings: CollectorSettings,
}

impl SysinfoSource {
    pub fn new(settings: CollectorSettings) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
        SysinfoSource {
            probe: Arc::new(Mutex::new(Probe {
                sys,
                users: Users::new_with_refreshed_list(),
            })),
            settings,
        }
    }
}

#[async_trait]
impl SnapshotSource for SysinfoSource {
    async fn capture(&self) -> Result<CaptureReport> {
        let probe = Arc::clone(&self.probe);
        let settings = self.settings.clone();
        let sample = tokio::task::spawn_blocking(move || {
            let mut probe = probe.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            probe.sample(&settings)
        });

        let timeout = self.settings.command_timeout;
        let (sample, disk_usage, logged_users) = tokio::join!(
            sample,
            run_with_timeout("df", &["-h"], timeout),
            run_with_timeout("who", &[], timeout),
        );
        let sample = sample.map_err(|e| Error::Capture(format!("process scan panicked: {e}")))?;

        debug!(
            processes = sample.processes.len(),
            skipped = sample.skipped.len(),
            "process scan finished"
        );

        Ok(CaptureReport {
            snapshot: Snapshot {
                captured_at: sample.captured_at,
                system_metrics: SystemMetrics {
                    cpu_percent: sample.cpu_percent,
                    memory_percent: sample.memory_percent,
                    disk_usage,
                    logged_users,
                },
                processes: sample.processes,
            },
            skipped: sample.skipped,
        })
    }
}

struct Sample {
    captured_at: DateTime<Utc>,
    cpu_percent: f64,
    memory_percent: f64,
    processes: Vec<ProcessRecord>,
    skipped: Vec<SkippedProcess>,
}

impl Probe {
    fn sample(&mut self, settings: &CollectorSettings) -> Sample {
        // Per-process CPU is a delta between two refreshes.
        self.sys.refresh_cpu_all();
        self.sys
            .refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
        std::thread::sleep(settings.cpu_sample.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        self.sys.refresh_memory();
        self.sys.refresh_cpu_all();
        self.sys
            .refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
        self.users.refresh();

        let captured_at = Utc::now().trunc_subsecs(6);
        let total_memory = self.sys.total_memory();

        let mut processes = Vec::with_capacity(self.sys.processes().len());
        let mut skipped = Vec::new();
        for (pid, process) in self.sys.processes() {
            match self.inspect(*pid, process, total_memory, settings) {
                Ok(record) => processes.push(record),
                Err(reason) => skipped.push(SkippedProcess {
                    pid: pid.as_u32(),
                    reason,
                }),
            }
        }
        processes.sort_by_key(|p| p.pid);

        Sample {
            captured_at,
            cpu_percent: round2(f64::from(self.sys.global_cpu_usage())),
            memory_percent: percent_of(self.sys.used_memory(), total_memory),
            processes,
            skipped,
        }
    }

    fn inspect(
        &self,
        pid: Pid,
        process: &Process,
        total_memory: u64,
        settings: &CollectorSettings,
    ) -> std::result::Result<ProcessRecord, SkipReason> {
        let status = map_status(process.status()).ok_or(SkipReason::Exited)?;
        let name = process.name().to_string_lossy().to_string();
        if name.is_empty() {
            return Err(SkipReason::Inaccessible);
        }

        let command = process
            .cmd()
            .iter()
            .map(|s| s.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let user = process
            .user_id()
            .map(|uid| user_name(&self.users, uid))
            .unwrap_or_default();
        let created_at = i64::try_from(process.start_time())
            .ok()
            .filter(|&secs| secs > 0)
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        let mut record = ProcessRecord {
            pid: pid.as_u32(),
            name,
            cpu_percent: round2(f64::from(process.cpu_usage())),
            memory_percent: percent_of(process.memory(), total_memory),
            memory_mb: bytes_to_mb(process.memory()),
            status,
            user,
            command: truncate_unicode(&command, settings.command_max_len),
            created_at,
            alert: None,
        };
        record.alert = classify_process(&record, &settings.thresholds);
        Ok(record)
    }
}

/// Account name for `uid`, or the bare numeric id when it has none.
fn user_name(users: &Users, uid: &Uid) -> String {
    match users.get_user_by_id(uid) {
        Some(user) => user.name().to_string(),
        None => (**uid).to_string(),
    }
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_memory()
        .with_cpu()
        .with_user(UpdateKind::OnlyIfNotSet)
        .with_cmd(UpdateKind::OnlyIfNotSet)
}

/// `None` means the process is already gone.
fn map_status(status: OsStatus) -> Option<ProcessStatus> {
    match status {
        OsStatus::Dead => None,
        OsStatus::Run | OsStatus::Waking | OsStatus::Wakekill => Some(ProcessStatus::Running),
        OsStatus::Sleep | OsStatus::UninterruptibleDiskSleep | OsStatus::LockBlocked => {
            Some(ProcessStatus::Sleeping)
        }
        OsStatus::Idle | OsStatus::Parked => Some(ProcessStatus::Idle),
        OsStatus::Stop | OsStatus::Tracing => Some(ProcessStatus::Stopped),
        OsStatus::Zombie => Some(ProcessStatus::Zombie),
        _ => Some(ProcessStatus::Unknown),
    }
}

fn percent_of(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}
