//! Pure analyzers over already-captured snapshots.
//!
//! Nothing in here performs I/O. Every function is total over its input and
//! returns empty or zero results for empty input.

pub mod alerts;
pub mod drift;
pub mod resource;
pub mod stuck;

pub use alerts::{ProcessAlert, collect_alerts};
pub use drift::{Drift, detect_drift, drift_of_latest};
pub use resource::{ResourceReport, analyze_resources};
pub use stuck::{StuckProcess, detect_stuck};

use serde::{Deserialize, Serialize};

use crate::system::process::{Alert, AlertKind, ProcessRecord, Severity};

/// Ordered pair of percentages. Comparisons are strict: a value equal to a
/// threshold falls into the lower bucket.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

impl ThresholdPair {
    pub fn classify(&self, value: f64) -> Option<Severity> {
        if value > self.critical {
            Some(Severity::Critical)
        } else if value > self.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }

    pub fn threshold_for(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Warning => self.warning,
            Severity::Critical => self.critical,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu: ThresholdPair,
    pub memory: ThresholdPair,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            cpu: ThresholdPair {
                warning: 50.0,
                critical: 80.0,
            },
            memory: ThresholdPair {
                warning: 10.0,
                critical: 20.0,
            },
        }
    }
}

/// The single alert a process carries in a snapshot.
///
/// Zombies win outright. Otherwise the more severe of the CPU and memory
/// breaches is kept, CPU first when both have the same severity.
pub fn classify_process(process: &ProcessRecord, thresholds: &Thresholds) -> Option<Alert> {
    if process.status.is_zombie() {
        return Some(Alert {
            kind: AlertKind::Zombie,
            severity: Severity::Warning,
            message: format!("Process {} ({}) is a zombie", process.name, process.pid),
            value: None,
            threshold: None,
        });
    }

    let cpu = thresholds
        .cpu
        .classify(process.cpu_percent)
        .map(|severity| Alert {
            kind: AlertKind::HighCpu,
            severity,
            message: format!("High CPU usage: {:.1}%", process.cpu_percent),
            value: Some(process.cpu_percent),
            threshold: Some(thresholds.cpu.threshold_for(severity)),
        });
    let memory = thresholds
        .memory
        .classify(process.memory_percent)
        .map(|severity| Alert {
            kind: AlertKind::HighMemory,
            severity,
            message: format!(
                "High memory usage: {:.1}% ({:.1} MB)",
                process.memory_percent, process.memory_mb
            ),
            value: Some(process.memory_percent),
            threshold: Some(thresholds.memory.threshold_for(severity)),
        });

    match (cpu, memory) {
        (Some(cpu), Some(memory)) if memory.severity > cpu.severity => Some(memory),
        (Some(cpu), _) => Some(cpu),
        (None, memory) => memory,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Combines a resource report with stuck-process results.
///
/// Stuck processes count as critical, zombies as warnings.
pub fn risk_level(report: &ResourceReport, stuck: &[StuckProcess]) -> RiskLevel {
    let critical = report.critical_count() + stuck.len();
    if critical > 0 {
        return RiskLevel::High;
    }
    if report.warning_count() > 2 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
