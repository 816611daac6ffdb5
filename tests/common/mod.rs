//! Shared fixtures for integration tests: in-process servers on ephemeral
//! ports and canned configs.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tidefs::config::StorageNodeConfig;
use tidefs::storage::{self, ChunkStore, DiskManager, RealStore, StorageService};
use tidefs::types::NodeRole;
use tokio::net::TcpListener;

/// Bind an ephemeral port and serve the given storage service on it.
pub async fn spawn_storage_server(service: Arc<StorageService>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = storage::router(service);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A real (disk-backed) storage service over a single tempdir-mounted disk.
pub fn real_service(mount: &Path, disk_id: &str) -> Arc<StorageService> {
    let spec = format!("{}:{}", disk_id, mount.display());
    let store = ChunkStore::Real(RealStore::new(DiskManager::from_spec(&spec).unwrap()));
    Arc::new(StorageService::new(store, Duration::from_millis(1000)))
}

/// Replication config for a storage node, peer optional.
pub fn replication_config(
    node_id: &str,
    is_primary: bool,
    peer_node_id: &str,
    peer_address: &str,
) -> StorageNodeConfig {
    let mut config = StorageNodeConfig::default();
    config.node_id = node_id.to_string();
    config.group_id = "g1".to_string();
    config.replication_enabled = true;
    config.node_role = if is_primary { NodeRole::Primary } else { NodeRole::Secondary };
    config.peer_node_id = peer_node_id.to_string();
    config.peer_address = peer_address.to_string();
    config
}
