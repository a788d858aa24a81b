use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::process::ProcessRecord;

const FILE_PREFIX: &str = "snapshot_";
const FILE_SUFFIX: &str = ".json";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_usage: String,
    pub logged_users: String,
}

/// Immutable point-in-time capture of host and process state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub system_metrics: SystemMetrics,
    pub processes: Vec<ProcessRecord>,
}

impl Snapshot {
    pub fn id(&self) -> SnapshotId {
        SnapshotId::from_timestamp(self.captured_at)
    }

    pub fn process(&self, pid: u32) -> Option<&ProcessRecord> {
        self.processes.iter().find(|p| p.pid == pid)
    }
}

/// Store key for a snapshot: `snapshot_YYYYMMDD_HHMMSS_micros.json`.
///
/// Fixed-width UTC fields make lexicographic order equal chronological order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        SnapshotId(format!(
            "{FILE_PREFIX}{}{FILE_SUFFIX}",
            at.format(STAMP_FORMAT)
        ))
    }

    /// Accepts only names this module could have produced.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stamp = file_name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?;
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
        Some(SnapshotId(file_name.to_string()))
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let stamp = self
            .0
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?;
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
