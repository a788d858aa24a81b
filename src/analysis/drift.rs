use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::system::snapshot::Snapshot;

/// Process names that appeared or disappeared between two snapshots.
///
/// Names, not pids: a program restarted under a new pid is "no change", and
/// so is a program that restarted between captures.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drift {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl Drift {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn detect_drift(old: &Snapshot, new: &Snapshot) -> Drift {
    let old_names = names(old);
    let new_names = names(new);
    Drift {
        added: new_names.difference(&old_names).map(|s| s.to_string()).collect(),
        removed: old_names.difference(&new_names).map(|s| s.to_string()).collect(),
    }
}

/// Drift between the last two entries of a chronologically ordered history.
pub fn drift_of_latest(history: &[Snapshot]) -> Result<Drift> {
    match history {
        [.., old, new] => Ok(detect_drift(old, new)),
        _ => Err(Error::InsufficientHistory {
            required: 2,
            available: history.len(),
        }),
    }
}

fn names(snapshot: &Snapshot) -> BTreeSet<&str> {
    snapshot.processes.iter().map(|p| p.name.as_str()).collect()
}
