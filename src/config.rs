use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Result, bail};
use serde::Deserialize;

use crate::analysis::{ThresholdPair, Thresholds};
use crate::store::RetentionPolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
    pub thresholds: ThresholdsConfig,
    pub analysis: AnalysisConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub snapshot_dir: PathBuf,
    pub listen_addr: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            snapshot_dir: PathBuf::from("./snapshots"),
            listen_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub auto_snapshot_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            interval_secs: 300,
            auto_snapshot_enabled: true,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_snapshots: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            max_snapshots: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub cpu_warning: f64,
    pub cpu_critical: f64,
    pub memory_warning: f64,
    pub memory_critical: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        ThresholdsConfig {
            cpu_warning: 50.0,
            cpu_critical: 80.0,
            memory_warning: 10.0,
            memory_critical: 20.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub stuck_window: usize,
    pub timeline_count: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            stuck_window: 3,
            timeline_count: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub command_timeout_secs: u64,
    pub command_max_len: usize,
    pub cpu_sample_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            command_timeout_secs: 5,
            command_max_len: 200,
            cpu_sample_ms: 1000,
        }
    }
}

impl Config {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            cpu: ThresholdPair {
                warning: self.thresholds.cpu_warning,
                critical: self.thresholds.cpu_critical,
            },
            memory: ThresholdPair {
                warning: self.thresholds.memory_warning,
                critical: self.thresholds.memory_critical,
            },
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_snapshots: self.retention.max_snapshots,
        }
    }

    /// Rejects settings the analyzers cannot work with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if t.cpu_warning >= t.cpu_critical {
            bail!(
                "cpu_warning ({}) must be below cpu_critical ({})",
                t.cpu_warning,
                t.cpu_critical
            );
        }
        if t.memory_warning >= t.memory_critical {
            bail!(
                "memory_warning ({}) must be below memory_critical ({})",
                t.memory_warning,
                t.memory_critical
            );
        }
        if self.analysis.stuck_window == 0 {
            bail!("stuck_window must be greater than 0");
        }
        // Drift needs the last two snapshots, the stuck scan the last window.
        let floor = self.analysis.stuck_window.max(2);
        if self.retention.max_snapshots < floor {
            bail!(
                "max_snapshots ({}) must be at least {floor} to keep the analysis window",
                self.retention.max_snapshots
            );
        }
        if self.scheduler.interval_secs == 0 {
            bail!("interval_secs must be greater than 0");
        }
        Ok(())
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("driftx").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), error = %err, "invalid config, using defaults");
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}
