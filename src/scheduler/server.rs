//! HTTP server exposing the scheduler RPC surface, plus the health tick task.

use super::{ClusterState, LifecycleManager};
use crate::error::TideError;
use crate::rpc::{
    ClusterViewParams, ClusterViewReply, GenerationReply, Heartbeat, HeartbeatReply,
    OperationReply, RebootNodeRequest, SchedCode, SchedStatus, SetAdminStateRequest,
    StartNodeRequest, StopNodeRequest,
};
use crate::util::now_ms;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Clone)]
struct SchedulerContext {
    state: Arc<ClusterState>,
    lifecycle: Arc<LifecycleManager>,
}

/// Build the scheduler router.
pub fn router(state: Arc<ClusterState>, lifecycle: Arc<LifecycleManager>) -> Router {
    let context = SchedulerContext { state, lifecycle };
    Router::new()
        .route("/scheduler/heartbeat", post(handle_heartbeat))
        .route("/scheduler/cluster_view", get(handle_cluster_view))
        .route("/scheduler/admin_state", post(handle_set_admin_state))
        .route("/scheduler/start_node", post(handle_start_node))
        .route("/scheduler/stop_node", post(handle_stop_node))
        .route("/scheduler/reboot_node", post(handle_reboot_node))
        .route("/scheduler/operations/:operation_id", get(handle_get_operation))
        .route("/health", get(health_check))
        .with_state(context)
}

/// Serve the scheduler on an already-bound listener.
pub async fn run_scheduler_server(
    state: Arc<ClusterState>,
    lifecycle: Arc<LifecycleManager>,
    listener: TcpListener,
) -> crate::error::Result<()> {
    info!(addr = %listener.local_addr()?, "scheduler listening");
    axum::serve(listener, router(state, lifecycle))
        .await
        .map_err(|e| TideError::Network(e.to_string()))?;
    Ok(())
}

/// Spawn the periodic health tick. The task exits when the stop flag flips.
pub fn spawn_tick_task(
    state: Arc<ClusterState>,
    tick_interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = tick_interval.as_millis() as u64, "health tick task starting");
        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(tick_interval) => {
                    state.tick_health(now_ms());
                }
                _ = stop.changed() => break,
            }
        }
        info!("health tick task stopped");
    })
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handle_heartbeat(
    State(context): State<SchedulerContext>,
    Json(heartbeat): Json<Heartbeat>,
) -> Json<HeartbeatReply> {
    if heartbeat.node_id.is_empty() {
        return Json(HeartbeatReply {
            status: SchedStatus::new(SchedCode::InvalidArgument, "node_id is empty"),
            generation: 0,
            group_id: String::new(),
            assigned_role: crate::types::NodeRole::Unknown,
            epoch: 0,
            primary_node_id: String::new(),
            primary_address: String::new(),
            secondary_node_id: String::new(),
            secondary_address: String::new(),
            sync_ready: false,
        });
    }

    let assignment = context.state.report_heartbeat(&heartbeat, now_ms());
    Json(HeartbeatReply {
        status: SchedStatus::ok(),
        generation: assignment.generation,
        group_id: assignment.group_id,
        assigned_role: assignment.assigned_role,
        epoch: assignment.epoch,
        primary_node_id: assignment.primary_node_id,
        primary_address: assignment.primary_address,
        secondary_node_id: assignment.secondary_node_id,
        secondary_address: assignment.secondary_address,
        sync_ready: assignment.sync_ready,
    })
}

async fn handle_cluster_view(
    State(context): State<SchedulerContext>,
    Query(params): Query<ClusterViewParams>,
) -> Json<ClusterViewReply> {
    let (generation, nodes) = context.state.snapshot(params.min_generation);
    Json(ClusterViewReply { status: SchedStatus::ok(), generation, nodes })
}

async fn handle_set_admin_state(
    State(context): State<SchedulerContext>,
    Json(request): Json<SetAdminStateRequest>,
) -> Json<GenerationReply> {
    if request.node_id.is_empty() {
        return Json(GenerationReply {
            status: SchedStatus::new(SchedCode::InvalidArgument, "node_id is empty"),
            generation: 0,
        });
    }
    match context.state.set_admin_state(&request.node_id, request.admin) {
        Ok(generation) => Json(GenerationReply { status: SchedStatus::ok(), generation }),
        Err(e) => Json(GenerationReply {
            status: SchedStatus::new(SchedCode::NotFound, e.to_string()),
            generation: 0,
        }),
    }
}

async fn handle_start_node(
    State(context): State<SchedulerContext>,
    Json(request): Json<StartNodeRequest>,
) -> Json<OperationReply> {
    operation_reply(request.node_id.as_str(), || {
        context.lifecycle.start_node(&request.node_id, &request.reason)
    })
}

async fn handle_stop_node(
    State(context): State<SchedulerContext>,
    Json(request): Json<StopNodeRequest>,
) -> Json<OperationReply> {
    operation_reply(request.node_id.as_str(), || {
        context
            .lifecycle
            .stop_node(&request.node_id, request.force, &request.reason)
    })
}

async fn handle_reboot_node(
    State(context): State<SchedulerContext>,
    Json(request): Json<RebootNodeRequest>,
) -> Json<OperationReply> {
    operation_reply(request.node_id.as_str(), || {
        context.lifecycle.reboot_node(&request.node_id, &request.reason)
    })
}

async fn handle_get_operation(
    State(context): State<SchedulerContext>,
    Path(operation_id): Path<String>,
) -> Json<OperationReply> {
    match context.state.get_operation(&operation_id) {
        Some(operation) => Json(OperationReply {
            status: SchedStatus::ok(),
            operation: Some(operation),
        }),
        None => Json(OperationReply {
            status: SchedStatus::new(SchedCode::NotFound, "operation not found"),
            operation: None,
        }),
    }
}

fn operation_reply<F>(node_id: &str, run: F) -> Json<OperationReply>
where
    F: FnOnce() -> crate::error::Result<crate::types::OperationRecord>,
{
    if node_id.is_empty() {
        return Json(OperationReply {
            status: SchedStatus::new(SchedCode::InvalidArgument, "node_id is empty"),
            operation: None,
        });
    }
    match run() {
        Ok(operation) => Json(OperationReply {
            status: SchedStatus::ok(),
            operation: Some(operation),
        }),
        Err(TideError::NodeNotFound(id)) => Json(OperationReply {
            status: SchedStatus::new(SchedCode::NotFound, format!("node not found: {}", id)),
            operation: None,
        }),
        Err(e) => Json(OperationReply {
            status: SchedStatus::new(SchedCode::InternalError, e.to_string()),
            operation: None,
        }),
    }
}
