//! Storage node entry point. `NODE_TYPE` in the config selects the backend.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tidefs::config::StorageNodeConfig;
use tidefs::storage::{
    run_storage_server, ChunkStore, DiskManager, HeartbeatReporter, ImageStore, RealStore,
    StorageService, VirtStore,
};
use tidefs::storage::virt::VirtStoreOptions;
use tidefs::types::NodeType;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tidefs-node", about = "TideFS storage node", version)]
struct Cli {
    /// Path to the storage node config file.
    #[arg(long)]
    config: PathBuf,

    /// Override the listen address from the config file.
    #[arg(long)]
    listen_addr: Option<String>,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn build_store(config: &StorageNodeConfig) -> tidefs::Result<ChunkStore> {
    match config.node_type {
        NodeType::Real => {
            let disks = if !config.disks.is_empty() {
                DiskManager::from_spec(&config.disks)?
            } else {
                DiskManager::from_data_root(Path::new(&config.data_root))?
            };
            Ok(ChunkStore::Real(RealStore::new(disks)))
        }
        NodeType::Virtual => Ok(ChunkStore::Virt(VirtStore::new(VirtStoreOptions {
            disk_ids: config.disk_ids.clone(),
            read_bytes_per_sec: config.read_bytes_per_sec,
            write_bytes_per_sec: config.write_bytes_per_sec,
            read_base_latency_ms: config.read_base_latency_ms,
            write_base_latency_ms: config.write_base_latency_ms,
            jitter_ms: config.jitter_ms,
            disk_capacity_bytes: config.disk_capacity_bytes,
            mount_point_prefix: config.mount_point_prefix.clone(),
        }))),
        NodeType::Optical => {
            let store = ImageStore::open(
                Path::new(&config.archive_root),
                &config.disk_ids,
                config.max_image_size_bytes,
                config.disk_capacity_bytes,
                &config.mount_point_prefix,
            )?;
            Ok(ChunkStore::Optical(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();

    let mut config = StorageNodeConfig::from_file(&cli.config)?;
    if let Some(listen_addr) = cli.listen_addr {
        config.listen_addr = listen_addr;
    }
    if config.node_id.is_empty() {
        config.node_id = format!("node-{}", config.listen_addr.replace(':', "-"));
    }
    if config.node_address.is_empty() {
        config.node_address = config.listen_addr.clone();
    }

    let store = build_store(&config)?;
    let service = Arc::new(StorageService::new(
        store,
        Duration::from_millis(config.replication_timeout_ms.max(1)),
    ));
    service.configure_replication(&config);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut reporter_task = None;
    if !config.scheduler_addr.is_empty() {
        let reporter = Arc::new(HeartbeatReporter::new(&config, service.clone()));
        reporter_task = Some(tokio::spawn(reporter.run(stop_rx)));
    }

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        node_id = %config.node_id,
        node_type = ?config.node_type,
        addr = %config.listen_addr,
        "storage node starting"
    );

    tokio::select! {
        result = run_storage_server(service, listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    let _ = stop_tx.send(true);
    if let Some(task) = reporter_task {
        let _ = task.await;
    }
    Ok(())
}
