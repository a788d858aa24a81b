use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use tracing::info;

use driftx::api;
use driftx::config::{Config, load_config, load_config_from_path};
use driftx::logging::init_logging;
use driftx::monitor::{AnalysisSettings, Monitor};
use driftx::scheduler::{Scheduler, SchedulerSettings};
use driftx::store::SnapshotStore;
use driftx::system::{CollectorSettings, SysinfoSource};

#[derive(Parser)]
#[command(
    name = "driftx",
    about = "Snapshot daemon with process health and drift analysis"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding snapshot files
    #[arg(long, env = "SNAPSHOT_DIR")]
    snapshot_dir: Option<PathBuf>,

    /// Address the HTTP API listens on
    #[arg(long, env = "DRIFTX_LISTEN")]
    listen: Option<String>,

    /// Capture interval in minutes
    #[arg(long, env = "SNAPSHOT_INTERVAL")]
    interval_minutes: Option<u64>,

    /// Enable or disable scheduled captures
    #[arg(long, env = "AUTO_SNAPSHOT_ENABLED")]
    auto_snapshot: Option<bool>,

    /// Maximum number of snapshots kept on disk
    #[arg(long, env = "MAX_SNAPSHOTS")]
    max_snapshots: Option<usize>,

    /// Take one snapshot, print its id, and exit.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let config = load_config_for_cli(&cli);
    config.validate().wrap_err("invalid configuration")?;

    let store = Arc::new(
        SnapshotStore::open(&config.general.snapshot_dir, config.retention())
            .wrap_err("failed to open snapshot store")?,
    );
    let source = Arc::new(SysinfoSource::new(collector_settings(&config)));
    let scheduler = Scheduler::new(
        source,
        Arc::clone(&store),
        SchedulerSettings {
            interval: config.scheduler.interval(),
            auto_snapshot_enabled: config.scheduler.auto_snapshot_enabled,
        },
    );

    if cli.once {
        let outcome = scheduler.trigger().await?;
        println!("{}", outcome.snapshot);
        return Ok(());
    }

    let monitor = Arc::new(Monitor::new(
        Arc::clone(&store),
        scheduler.clone(),
        AnalysisSettings {
            thresholds: config.thresholds(),
            stuck_window: config.analysis.stuck_window,
        },
    ));

    scheduler.start();

    let listener = tokio::net::TcpListener::bind(&config.general.listen_addr)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.general.listen_addr))?;
    info!(
        addr = %config.general.listen_addr,
        snapshot_dir = %store.dir().display(),
        "api listening"
    );

    let app = api::router(monitor, config.analysis.timeline_count);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(ref dir) = cli.snapshot_dir {
        config.general.snapshot_dir = dir.clone();
    }
    if let Some(ref listen) = cli.listen {
        config.general.listen_addr = listen.clone();
    }
    if let Some(minutes) = cli.interval_minutes {
        config.scheduler.interval_secs = minutes.saturating_mul(60);
    }
    if let Some(enabled) = cli.auto_snapshot {
        config.scheduler.auto_snapshot_enabled = enabled;
    }
    if let Some(max) = cli.max_snapshots {
        config.retention.max_snapshots = max;
    }

    config
}

fn collector_settings(config: &Config) -> CollectorSettings {
    CollectorSettings {
        thresholds: config.thresholds(),
        command_timeout: Duration::from_secs(config.capture.command_timeout_secs),
        command_max_len: config.capture.command_max_len,
        cpu_sample: Duration::from_millis(config.capture.cpu_sample_ms),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
