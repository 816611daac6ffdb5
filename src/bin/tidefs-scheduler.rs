//! Scheduler entry point.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tidefs::config::SchedulerConfig;
use tidefs::scheduler::{
    run_scheduler_server, spawn_tick_task, ClusterState, FailureDetector, LifecycleManager,
    ShellActuator,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tidefs-scheduler", about = "TideFS cluster scheduler", version)]
struct Cli {
    /// Path to the scheduler config file.
    #[arg(long)]
    config: PathBuf,

    /// Override the listen address from the config file.
    #[arg(long)]
    listen_addr: Option<String>,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();

    let mut config = SchedulerConfig::from_file(&cli.config)?;
    if let Some(listen_addr) = cli.listen_addr {
        config.listen_addr = listen_addr;
    }

    let detector = FailureDetector::new(config.suspect_timeout_ms, config.dead_timeout_ms);
    let state = Arc::new(ClusterState::new(detector));
    let actuator = ShellActuator::new(
        config.start_cmd_template.clone(),
        config.stop_cmd_template.clone(),
        config.reboot_cmd_template.clone(),
    );
    let lifecycle = Arc::new(LifecycleManager::new(state.clone(), Box::new(actuator)));

    let (stop_tx, stop_rx) = watch::channel(false);
    let tick = spawn_tick_task(
        state.clone(),
        Duration::from_millis(config.tick_interval_ms.max(1)),
        stop_rx,
    );

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        addr = %config.listen_addr,
        suspect_ms = config.suspect_timeout_ms,
        dead_ms = config.dead_timeout_ms,
        "scheduler starting"
    );

    tokio::select! {
        result = run_scheduler_server(state, lifecycle, listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    let _ = stop_tx.send(true);
    let _ = tick.await;
    Ok(())
}
