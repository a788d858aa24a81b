use serde::{Deserialize, Serialize};

use super::Thresholds;
use crate::format::round2;
use crate::system::process::{ProcessRecord, ProcessStatus, Severity};

pub const TOP_CONSUMERS: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighCpuEntry {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub severity: Severity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighMemoryEntry {
    pub pid: u32,
    pub name: String,
    pub memory_percent: f64,
    pub memory_mb: f64,
    pub severity: Severity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZombieEntry {
    pub pid: u32,
    pub name: String,
    pub status: ProcessStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpuConsumer {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryConsumer {
    pub pid: u32,
    pub name: String,
    pub memory_percent: f64,
    pub memory_mb: f64,
}

/// Resource health of one snapshot.
///
/// `total_cpu_usage` is the raw sum of per-process CPU and can exceed 100 on
/// multi-core hosts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub total_processes: usize,
    pub high_cpu_processes: Vec<HighCpuEntry>,
    pub high_memory_processes: Vec<HighMemoryEntry>,
    pub zombie_processes: Vec<ZombieEntry>,
    pub total_cpu_usage: f64,
    pub total_memory_usage: f64,
    pub top_cpu_consumers: Vec<CpuConsumer>,
    pub top_memory_consumers: Vec<MemoryConsumer>,
}

impl ResourceReport {
    pub fn critical_count(&self) -> usize {
        self.count(Severity::Critical)
    }

    /// Warning-level CPU/memory entries plus zombies.
    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning) + self.zombie_processes.len()
    }

    fn count(&self, severity: Severity) -> usize {
        let cpu = self
            .high_cpu_processes
            .iter()
            .filter(|p| p.severity == severity)
            .count();
        let memory = self
            .high_memory_processes
            .iter()
            .filter(|p| p.severity == severity)
            .count();
        cpu + memory
    }
}

pub fn analyze_resources(processes: &[ProcessRecord], thresholds: &Thresholds) -> ResourceReport {
    let high_cpu_processes = processes
        .iter()
        .filter_map(|p| {
            thresholds
                .cpu
                .classify(p.cpu_percent)
                .map(|severity| HighCpuEntry {
                    pid: p.pid,
                    name: p.name.clone(),
                    cpu_percent: p.cpu_percent,
                    severity,
                })
        })
        .collect();

    let high_memory_processes = processes
        .iter()
        .filter_map(|p| {
            thresholds
                .memory
                .classify(p.memory_percent)
                .map(|severity| HighMemoryEntry {
                    pid: p.pid,
                    name: p.name.clone(),
                    memory_percent: p.memory_percent,
                    memory_mb: p.memory_mb,
                    severity,
                })
        })
        .collect();

    let zombie_processes = processes
        .iter()
        .filter(|p| p.status.is_zombie())
        .map(|p| ZombieEntry {
            pid: p.pid,
            name: p.name.clone(),
            status: p.status,
        })
        .collect();

    let total_cpu: f64 = processes.iter().map(|p| p.cpu_percent).sum();
    let total_memory: f64 = processes.iter().map(|p| p.memory_percent).sum();

    ResourceReport {
        total_processes: processes.len(),
        high_cpu_processes,
        high_memory_processes,
        zombie_processes,
        total_cpu_usage: round2(total_cpu),
        total_memory_usage: round2(total_memory),
        top_cpu_consumers: top_by(processes, |p| p.cpu_percent)
            .map(|p| CpuConsumer {
                pid: p.pid,
                name: p.name.clone(),
                cpu_percent: p.cpu_percent,
            })
            .collect(),
        top_memory_consumers: top_by(processes, |p| p.memory_percent)
            .map(|p| MemoryConsumer {
                pid: p.pid,
                name: p.name.clone(),
                memory_percent: p.memory_percent,
                memory_mb: p.memory_mb,
            })
            .collect(),
    }
}

/// Highest `TOP_CONSUMERS` entries by `metric`, descending. `sort_by` is
/// stable, so equal values keep snapshot order.
fn top_by<'a>(
    processes: &'a [ProcessRecord],
    metric: impl Fn(&ProcessRecord) -> f64,
) -> impl Iterator<Item = &'a ProcessRecord> {
    let mut sorted: Vec<&ProcessRecord> = processes.iter().collect();
    sorted.sort_by(|a, b| metric(b).total_cmp(&metric(a)));
    sorted.into_iter().take(TOP_CONSUMERS)
}
