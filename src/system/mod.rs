pub mod collector;
pub mod command;
pub mod process;
pub mod snapshot;

pub use collector::{CaptureReport, CollectorSettings, SnapshotSource, SysinfoSource};
pub use process::{Alert, AlertKind, ProcessRecord, ProcessStatus, Severity};
pub use snapshot::{Snapshot, SnapshotId, SystemMetrics};
