//! Directory-backed snapshot store.
//!
//! One pretty-printed JSON file per snapshot, named by [`SnapshotId`]. Files
//! are written to a dot-prefixed temp name, fsynced, then renamed into place,
//! so a listing only ever sees complete snapshots. Retention unlinks the
//! oldest files; on Unix a reader that already opened one keeps reading it,
//! and a reader that lists before the unlink and opens after gets `NotFound`
//! for that entry, which multi-snapshot reads skip.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::system::snapshot::{Snapshot, SnapshotId};

const TEMP_SUFFIX: &str = ".tmp";

/// Upper bound on how many snapshots stay on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_snapshots: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub snapshot: SnapshotId,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Persisted {
    pub id: SnapshotId,
    pub evicted: Vec<SnapshotId>,
}

pub struct SnapshotStore {
    dir: PathBuf,
    retention: RetentionPolicy,
}

impl SnapshotStore {
    pub fn open(dir: impl Into<PathBuf>, retention: RetentionPolicy) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let store = SnapshotStore { dir, retention };
        store.sweep_temp_files();
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// All snapshot ids, oldest first.
    pub fn list(&self) -> Result<Vec<SnapshotId>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let mut ids: Vec<SnapshotId> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().and_then(SnapshotId::parse))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    pub fn read(&self, id: &SnapshotId) -> Result<Snapshot> {
        let path = self.path_of(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("snapshot {id}")));
            }
            Err(e) => return Err(Error::io(path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| Error::Corrupt { path, source })
    }

    pub fn latest(&self) -> Result<Snapshot> {
        let ids = self.list()?;
        let id = ids
            .last()
            .ok_or_else(|| Error::NotFound("snapshot".to_string()))?;
        self.read(id)
    }

    /// The last `n` readable snapshots, oldest first.
    ///
    /// Unreadable entries are logged and skipped, and older entries are read
    /// in their place. Short history yields fewer than `n`.
    pub fn history(&self, n: usize) -> Result<Vec<Snapshot>> {
        let ids = self.list()?;
        let mut recent = Vec::with_capacity(n);
        for id in ids.iter().rev() {
            if recent.len() == n {
                break;
            }
            match self.read(id) {
                Ok(snapshot) => recent.push(snapshot),
                Err(err) => warn!(snapshot = %id, error = %err, "skipping unreadable snapshot"),
            }
        }
        recent.reverse();
        Ok(recent)
    }

    /// Ids and capture times of the last `count` snapshots, oldest first.
    pub fn timeline(&self, count: usize) -> Result<Vec<TimelineEntry>> {
        let ids = self.list()?;
        let start = ids.len().saturating_sub(count);
        Ok(ids[start..]
            .iter()
            .filter_map(|id| {
                id.timestamp().map(|captured_at| TimelineEntry {
                    snapshot: id.clone(),
                    captured_at,
                })
            })
            .collect())
    }

    /// Writes `snapshot` atomically, then evicts the oldest surplus entries.
    ///
    /// Eviction is best effort: a failed delete is logged and the persist
    /// still succeeds.
    pub fn persist(&self, snapshot: &Snapshot) -> Result<Persisted> {
        let id = snapshot.id();
        let final_path = self.path_of(&id);
        let temp_path = self.dir.join(format!(".{id}{TEMP_SUFFIX}"));

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| Error::io(&final_path, std::io::Error::other(e)))?;
        write_synced(&temp_path, &json).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::io(&temp_path, e)
        })?;
        fs::rename(&temp_path, &final_path).map_err(|e| Error::io(&final_path, e))?;
        debug!(snapshot = %id, bytes = json.len(), "snapshot persisted");

        let evicted = self.enforce_retention(&id);
        Ok(Persisted { id, evicted })
    }

    /// Deletes the oldest entries beyond the cap, never `written`. A
    /// backdated snapshot (the clock stepped back) therefore survives and
    /// the oldest other entry goes instead.
    fn enforce_retention(&self, written: &SnapshotId) -> Vec<SnapshotId> {
        let ids = match self.list() {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "retention skipped, snapshot directory unreadable");
                return Vec::new();
            }
        };
        let keep = self.retention.max_snapshots.max(1);
        let surplus = ids.len().saturating_sub(keep);

        let mut evicted = Vec::with_capacity(surplus);
        for id in ids.iter().filter(|id| *id != written).take(surplus) {
            match fs::remove_file(self.path_of(id)) {
                Ok(()) => evicted.push(id.clone()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(snapshot = %id, error = %e, "failed to evict snapshot"),
            }
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted old snapshots");
        }
        evicted
    }

    /// Removes temp files left behind by an interrupted persist.
    fn sweep_temp_files(&self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(".snapshot_")
                && name.ends_with(TEMP_SUFFIX)
                && let Err(e) = fs::remove_file(entry.path())
            {
                warn!(file = name, error = %e, "failed to remove stale temp file");
            }
        }
    }

    fn path_of(&self, id: &SnapshotId) -> PathBuf {
        self.dir.join(id.as_str())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
