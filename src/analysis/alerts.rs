use serde::{Deserialize, Serialize};

use super::{StuckProcess, ThresholdPair, Thresholds, classify_process};
use crate::system::process::{Alert, AlertKind, Severity};
use crate::system::snapshot::Snapshot;

/// An alert tagged with the process it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessAlert {
    pub pid: u32,
    pub name: String,
    #[serde(flatten)]
    pub alert: Alert,
}

/// Flattens per-process alerts of `latest` and one alert per stuck process.
///
/// Alerts stored at capture time are used as-is; processes persisted without
/// one are classified against `thresholds`.
pub fn collect_alerts(
    latest: &Snapshot,
    stuck: &[StuckProcess],
    thresholds: &Thresholds,
) -> Vec<ProcessAlert> {
    let per_process = latest.processes.iter().filter_map(|p| {
        p.alert
            .clone()
            .or_else(|| classify_process(p, thresholds))
            .map(|alert| ProcessAlert {
                pid: p.pid,
                name: p.name.clone(),
                alert,
            })
    });

    let stuck_alerts = stuck.iter().map(|s| ProcessAlert {
        pid: s.pid,
        name: s.name.clone(),
        alert: stuck_alert(s, thresholds.cpu),
    });

    per_process.chain(stuck_alerts).collect()
}

fn stuck_alert(stuck: &StuckProcess, cpu: ThresholdPair) -> Alert {
    Alert {
        kind: AlertKind::Stuck,
        severity: Severity::Critical,
        message: format!(
            "CPU above {:.0}% for {} consecutive snapshots (avg {:.2}%)",
            cpu.warning, stuck.duration_snapshots, stuck.avg_cpu
        ),
        value: Some(stuck.avg_cpu),
        threshold: Some(cpu.critical),
    }
}
