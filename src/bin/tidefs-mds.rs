//! Metadata service entry point.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tidefs::config::MdsConfig;
use tidefs::mds::{
    build_static_node_infos, spawn_archive_task, spawn_view_refresher, ArchiveManager,
    ArchiveOptions, ChunkAllocator, MdsService, MetaStore, NodeStateCache,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tidefs-mds", about = "TideFS metadata service", version)]
struct Cli {
    /// Path to the MDS config file.
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

    let mut config = MdsConfig::from_file(&cli.config)?;
    if let Some(listen_addr) = cli.listen_addr {
        config.listen_addr = listen_addr;
    }

    let store = Arc::new(MetaStore::open(&config.db_path)?);
    let cache = Arc::new(NodeStateCache::new(build_static_node_infos(&config.nodes)));
    let allocator = Arc::new(ChunkAllocator::new(cache.clone()));
    let service = Arc::new(MdsService::new(
        store.clone(),
        allocator,
        config.chunk_size,
        config.replica,
    )?);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if !config.scheduler_addr.is_empty() {
        tasks.push(spawn_view_refresher(
            cache.clone(),
            config.scheduler_addr.clone(),
            Duration::from_millis(config.scheduler_refresh_ms.max(1)),
            stop_rx.clone(),
        ));
    }
    if config.enable_optical_archive {
        let manager = Arc::new(ArchiveManager::new(
            store,
            cache,
            ArchiveOptions {
                archive_trigger_bytes: config.archive_trigger_bytes,
                archive_target_bytes: config.archive_target_bytes,
                cold_file_ttl_sec: config.cold_file_ttl_sec,
                max_chunks_per_round: config.archive_max_chunks_per_round,
                default_chunk_size: config.chunk_size,
            },
        ));
        tasks.push(spawn_archive_task(
            manager,
            Duration::from_millis(config.archive_scan_interval_ms.max(1)),
            stop_rx,
        ));
    }

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, db = %config.db_path, "mds starting");

    tokio::select! {
        result = tidefs::mds::run_mds_server(service, listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    let _ = stop_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
