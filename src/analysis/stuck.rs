use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ThresholdPair;
use crate::format::round2;
use crate::system::snapshot::Snapshot;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StuckProcess {
    pub pid: u32,
    pub name: String,
    pub user: String,
    pub command: String,
    pub avg_cpu: f64,
    pub min_cpu: f64,
    pub max_cpu: f64,
    pub duration_snapshots: usize,
}

/// Best-effort process identity across snapshots.
///
/// With a start time, a reused pid becomes a different key. Without one the
/// key is the bare pid and two unrelated processes sharing it inside the
/// window are merged.
type IdentityKey = (u32, Option<DateTime<Utc>>);

struct CpuTrail {
    values: Vec<f64>,
    last_snapshot: usize,
    name: String,
    user: String,
    command: String,
}

/// Flags processes pegged above the CPU thresholds for the whole window.
///
/// Looks at the last `window` snapshots of `history` (oldest first). A
/// process is stuck when it is present in every one of them, its average
/// exceeds `cpu.critical` and its minimum exceeds `cpu.warning`. Returns
/// nothing when history is shorter than the window. Output is ordered by pid.
pub fn detect_stuck(history: &[Snapshot], window: usize, cpu: ThresholdPair) -> Vec<StuckProcess> {
    if window == 0 || history.len() < window {
        return Vec::new();
    }
    let recent = &history[history.len() - window..];

    let mut trails: BTreeMap<IdentityKey, CpuTrail> = BTreeMap::new();
    for (index, snapshot) in recent.iter().enumerate() {
        for process in &snapshot.processes {
            let trail = trails
                .entry((process.pid, process.created_at))
                .or_insert_with(|| CpuTrail {
                    values: Vec::with_capacity(window),
                    last_snapshot: usize::MAX,
                    name: String::new(),
                    user: String::new(),
                    command: String::new(),
                });
            // A duplicated pid inside one snapshot counts once.
            if trail.last_snapshot == index {
                continue;
            }
            trail.last_snapshot = index;
            trail.values.push(process.cpu_percent);
            trail.name.clone_from(&process.name);
            trail.user.clone_from(&process.user);
            trail.command.clone_from(&process.command);
        }
    }

    trails
        .into_iter()
        .filter(|(_, trail)| trail.values.len() == window)
        .filter_map(|((pid, _), trail)| {
            let count = trail.values.len();
            let avg = trail.values.iter().sum::<f64>() / count as f64;
            let min = trail.values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = trail.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            (avg > cpu.critical && min > cpu.warning).then(|| StuckProcess {
                pid,
                name: trail.name,
                user: trail.user,
                command: trail.command,
                avg_cpu: round2(avg),
                min_cpu: round2(min),
                max_cpu: round2(max),
                duration_snapshots: count,
            })
        })
        .collect()
}
