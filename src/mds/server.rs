//! HTTP server exposing the MDS RPC surface, plus the background tasks that
//! keep the node cache fresh and drive the archive loop.

use super::cache::{DiskInfo, NodeInfo, NodeStateCache};
use super::{ArchiveManager, MdsService};
use crate::client::SchedulerClient;
use crate::config::StaticNodeEntry;
use crate::error::TideError;
use crate::rpc::{
    AttrReply, CloseRequest, CommitWriteRequest, CreateRequest, GetattrRequest, LayoutReply,
    LayoutRequest, MdsStatus, MkdirRequest, OpenReply, OpenRequest, PathRequest, ReaddirReply,
    RenameRequest, StatusReply,
};
use crate::types::{Generation, NodeRole, NodeType, NodeView};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Build the MDS router.
pub fn router(service: Arc<MdsService>) -> Router {
    Router::new()
        .route("/mds/lookup", post(handle_lookup))
        .route("/mds/getattr", post(handle_getattr))
        .route("/mds/open", post(handle_open))
        .route("/mds/close", post(handle_close))
        .route("/mds/create", post(handle_create))
        .route("/mds/mkdir", post(handle_mkdir))
        .route("/mds/readdir", post(handle_readdir))
        .route("/mds/rename", post(handle_rename))
        .route("/mds/unlink", post(handle_unlink))
        .route("/mds/rmdir", post(handle_rmdir))
        .route("/mds/allocate_write", post(handle_allocate_write))
        .route("/mds/get_layout", post(handle_get_layout))
        .route("/mds/commit_write", post(handle_commit_write))
        .route("/health", get(health_check))
        .with_state(service)
}

/// Serve the MDS on an already-bound listener.
pub async fn run_mds_server(service: Arc<MdsService>, listener: TcpListener) -> crate::error::Result<()> {
    info!(addr = %listener.local_addr()?, "mds listening");
    axum::serve(listener, router(service))
        .await
        .map_err(|e| TideError::Network(e.to_string()))?;
    Ok(())
}

/// Poll the scheduler's cluster view and swap the cache when the generation
/// advances.
pub fn spawn_view_refresher(
    cache: Arc<NodeStateCache>,
    scheduler_addr: String,
    refresh_interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = SchedulerClient::new(&scheduler_addr);
        let mut min_generation: Generation = 0;
        info!(scheduler = %scheduler_addr, "cluster view refresher starting");
        loop {
            if *stop.borrow() {
                break;
            }
            match client.cluster_view(min_generation + 1).await {
                Ok(reply) if reply.status.is_ok() => {
                    if !reply.nodes.is_empty() {
                        let nodes = build_node_infos(&reply.nodes);
                        debug!(
                            generation = reply.generation,
                            nodes = nodes.len(),
                            "cluster view refreshed"
                        );
                        cache.replace_nodes(nodes);
                        min_generation = reply.generation;
                    }
                }
                Ok(reply) => {
                    warn!(message = %reply.status.message, "cluster view rejected");
                }
                Err(err) => {
                    warn!(scheduler = %scheduler_addr, error = %err, "cluster view fetch failed");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(refresh_interval) => {}
                _ = stop.changed() => break,
            }
        }
        info!("cluster view refresher stopped");
    })
}

/// Run archive rounds at `scan_interval` until stopped.
pub fn spawn_archive_task(
    manager: Arc<ArchiveManager>,
    scan_interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = scan_interval.as_millis() as u64, "archive loop starting");
        loop {
            if *stop.borrow() {
                break;
            }
            if let Err(err) = manager.run_once().await {
                // Failed rounds retry at the next scan with no backoff.
                warn!(error = %err, "archive round failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(scan_interval) => {}
                _ = stop.changed() => break,
            }
        }
        info!("archive loop stopped");
    })
}

/// Fold the scheduler's per-node view into one allocatable entry per group:
/// the primary carries placement, the secondary contributes the pairing.
pub fn build_node_infos(views: &[NodeView]) -> Vec<NodeInfo> {
    let mut order: Vec<String> = Vec::new();
    let mut primary_by_group: HashMap<String, &NodeView> = HashMap::new();
    let mut secondary_by_group: HashMap<String, &NodeView> = HashMap::new();

    for view in views {
        let group_id = if view.group_id.is_empty() {
            view.node_id.clone()
        } else {
            view.group_id.clone()
        };
        if !primary_by_group.contains_key(&group_id) && !secondary_by_group.contains_key(&group_id) {
            order.push(group_id.clone());
        }
        match view.role {
            NodeRole::Primary => {
                primary_by_group.insert(group_id, view);
            }
            NodeRole::Secondary => {
                secondary_by_group.insert(group_id, view);
            }
            NodeRole::Unknown => {
                primary_by_group.entry(group_id).or_insert(view);
            }
        }
    }

    let mut nodes = Vec::with_capacity(order.len());
    for group_id in order {
        let mut primary = primary_by_group.get(&group_id).copied();
        let mut secondary = secondary_by_group.get(&group_id).copied();
        if primary.is_none() {
            primary = secondary.take();
        }
        let Some(primary) = primary else {
            continue;
        };

        let disks: Vec<DiskInfo> = primary
            .disks
            .iter()
            .filter(|d| d.is_healthy)
            .map(|d| DiskInfo {
                disk_id: d.disk_id.clone(),
                capacity_bytes: d.capacity_bytes,
                free_bytes: d.free_bytes,
                is_healthy: d.is_healthy,
            })
            .collect();

        let allocatable = primary.health == crate::types::NodeHealth::Healthy
            && primary.admin == crate::types::AdminState::Enabled
            && primary.power == crate::types::PowerState::On
            && !disks.is_empty();

        nodes.push(NodeInfo {
            node_id: primary.node_id.clone(),
            address: primary.address.clone(),
            group_id,
            node_type: primary.node_type,
            weight: primary.weight.max(1),
            virtual_node_count: primary.virtual_node_count.max(1),
            next_virtual_index: 0,
            allocatable,
            is_primary: true,
            sync_ready: primary.sync_ready,
            epoch: primary.epoch.max(1),
            secondary_node_id: secondary.map(|s| s.node_id.clone()).unwrap_or_default(),
            secondary_address: secondary.map(|s| s.address.clone()).unwrap_or_default(),
            disks,
            next_disk_index: 0,
        });
    }
    nodes
}

/// Seed the cache from static `NODES`/`DISKS` config when no scheduler runs.
pub fn build_static_node_infos(entries: &[StaticNodeEntry]) -> Vec<NodeInfo> {
    entries
        .iter()
        .map(|entry| {
            let disks = entry
                .disks
                .iter()
                .map(|disk_id| DiskInfo {
                    disk_id: disk_id.clone(),
                    capacity_bytes: 0,
                    free_bytes: 0,
                    is_healthy: true,
                })
                .collect();
            NodeInfo {
                node_id: entry.node_id.clone(),
                address: entry.address.clone(),
                group_id: entry.node_id.clone(),
                node_type: entry.node_type,
                weight: entry.weight.max(1),
                virtual_node_count: if entry.node_type == NodeType::Virtual {
                    entry.virtual_node_count.max(1)
                } else {
                    1
                },
                next_virtual_index: 0,
                allocatable: true,
                is_primary: true,
                sync_ready: false,
                epoch: 1,
                secondary_node_id: String::new(),
                secondary_address: String::new(),
                disks,
                next_disk_index: 0,
            }
        })
        .collect()
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handle_lookup(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<PathRequest>,
) -> Json<AttrReply> {
    Json(match service.lookup(&request.path) {
        Ok(attr) => AttrReply { status: MdsStatus::ok(), attr: Some(attr) },
        Err(e) => AttrReply { status: MdsStatus::from(&e), attr: None },
    })
}

async fn handle_getattr(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<GetattrRequest>,
) -> Json<AttrReply> {
    Json(match service.getattr(request.inode_id) {
        Ok(attr) => AttrReply { status: MdsStatus::ok(), attr: Some(attr) },
        Err(e) => AttrReply { status: MdsStatus::from(&e), attr: None },
    })
}

async fn handle_open(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<OpenRequest>,
) -> Json<OpenReply> {
    Json(match service.open(&request.path) {
        Ok((handle_id, attr)) => OpenReply {
            status: MdsStatus::ok(),
            handle_id,
            attr: Some(attr),
        },
        Err(e) => OpenReply { status: MdsStatus::from(&e), handle_id: 0, attr: None },
    })
}

async fn handle_close(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<CloseRequest>,
) -> Json<StatusReply> {
    Json(match service.close(request.handle_id) {
        Ok(()) => StatusReply { status: MdsStatus::ok() },
        Err(e) => StatusReply { status: MdsStatus::from(&e) },
    })
}

async fn handle_create(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<CreateRequest>,
) -> Json<AttrReply> {
    let result = service.create(
        &request.path,
        request.mode,
        request.uid,
        request.gid,
        request.replica,
        request.chunk_size,
    );
    Json(match result {
        Ok(attr) => AttrReply { status: MdsStatus::ok(), attr: Some(attr) },
        Err(e) => AttrReply { status: MdsStatus::from(&e), attr: None },
    })
}

async fn handle_mkdir(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<MkdirRequest>,
) -> Json<AttrReply> {
    Json(match service.mkdir(&request.path, request.mode, request.uid, request.gid) {
        Ok(attr) => AttrReply { status: MdsStatus::ok(), attr: Some(attr) },
        Err(e) => AttrReply { status: MdsStatus::from(&e), attr: None },
    })
}

async fn handle_readdir(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<PathRequest>,
) -> Json<ReaddirReply> {
    Json(match service.readdir(&request.path) {
        Ok(entries) => ReaddirReply { status: MdsStatus::ok(), entries },
        Err(e) => ReaddirReply { status: MdsStatus::from(&e), entries: Vec::new() },
    })
}

async fn handle_rename(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<RenameRequest>,
) -> Json<StatusReply> {
    Json(match service.rename(&request.old_path, &request.new_path) {
        Ok(()) => StatusReply { status: MdsStatus::ok() },
        Err(e) => StatusReply { status: MdsStatus::from(&e) },
    })
}

async fn handle_unlink(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<PathRequest>,
) -> Json<StatusReply> {
    Json(match service.unlink(&request.path) {
        Ok(()) => StatusReply { status: MdsStatus::ok() },
        Err(e) => StatusReply { status: MdsStatus::from(&e) },
    })
}

async fn handle_rmdir(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<PathRequest>,
) -> Json<StatusReply> {
    Json(match service.rmdir(&request.path) {
        Ok(()) => StatusReply { status: MdsStatus::ok() },
        Err(e) => StatusReply { status: MdsStatus::from(&e) },
    })
}

async fn handle_allocate_write(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<LayoutRequest>,
) -> Json<LayoutReply> {
    Json(match service.allocate_write(request.inode_id, request.offset, request.size) {
        Ok(layout) => LayoutReply { status: MdsStatus::ok(), layout: Some(layout) },
        Err(e) => LayoutReply { status: MdsStatus::from(&e), layout: None },
    })
}

async fn handle_get_layout(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<LayoutRequest>,
) -> Json<LayoutReply> {
    Json(match service.get_layout(request.inode_id, request.offset, request.size) {
        Ok(layout) => LayoutReply { status: MdsStatus::ok(), layout: Some(layout) },
        Err(e) => LayoutReply { status: MdsStatus::from(&e), layout: None },
    })
}

async fn handle_commit_write(
    State(service): State<Arc<MdsService>>,
    Json(request): Json<CommitWriteRequest>,
) -> Json<StatusReply> {
    Json(match service.commit_write(request.inode_id, request.new_size) {
        Ok(()) => StatusReply { status: MdsStatus::ok() },
        Err(e) => StatusReply { status: MdsStatus::from(&e) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AdminState, DiskReport, NodeHealth, PowerState};

    fn view(node_id: &str, group_id: &str, role: NodeRole) -> NodeView {
        NodeView {
            node_id: node_id.to_string(),
            node_type: NodeType::Real,
            address: format!("{}:9500", node_id),
            weight: 1,
            virtual_node_count: 1,
            group_id: group_id.to_string(),
            role,
            epoch: 2,
            applied_lsn: 0,
            peer_node_id: String::new(),
            peer_address: String::new(),
            sync_ready: true,
            health: NodeHealth::Healthy,
            admin: AdminState::Enabled,
            power: PowerState::On,
            desired_admin: AdminState::Enabled,
            desired_power: PowerState::On,
            last_heartbeat_ms: 0,
            disks: vec![DiskReport {
                disk_id: "disk-01".to_string(),
                mount_point: String::new(),
                capacity_bytes: 100,
                free_bytes: 50,
                is_healthy: true,
            }],
        }
    }

    #[test]
    fn test_group_folds_to_primary_with_pairing() {
        let views = vec![
            view("a", "g1", NodeRole::Primary),
            view("b", "g1", NodeRole::Secondary),
        ];
        let nodes = build_node_infos(&views);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, "a");
        assert_eq!(nodes[0].secondary_node_id, "b");
        assert_eq!(nodes[0].secondary_address, "b:9500");
        assert!(nodes[0].allocatable);
        assert_eq!(nodes[0].epoch, 2);
    }

    #[test]
    fn test_secondary_only_group_promotes_for_placement() {
        let views = vec![view("b", "g1", NodeRole::Secondary)];
        let nodes = build_node_infos(&views);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, "b");
        assert!(nodes[0].secondary_node_id.is_empty());
    }

    #[test]
    fn test_unhealthy_primary_not_allocatable() {
        let mut unhealthy = view("a", "g1", NodeRole::Primary);
        unhealthy.health = NodeHealth::Dead;
        let nodes = build_node_infos(&[unhealthy]);
        assert!(!nodes[0].allocatable);
    }

    #[test]
    fn test_node_without_healthy_disks_not_allocatable() {
        let mut diskless = view("a", "g1", NodeRole::Primary);
        diskless.disks[0].is_healthy = false;
        let nodes = build_node_infos(&[diskless]);
        assert!(!nodes[0].allocatable);
        assert!(nodes[0].disks.is_empty());
    }

    #[test]
    fn test_empty_group_id_defaults_to_node_id() {
        let views = vec![view("a", "", NodeRole::Unknown)];
        let nodes = build_node_infos(&views);
        assert_eq!(nodes[0].group_id, "a");
    }
}
