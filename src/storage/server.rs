//! HTTP server exposing the uniform storage node RPC surface.
//!
//! Control replies are JSON with an embedded [`StorageStatus`]; chunk reads
//! return the raw bytes and signal failure through the HTTP status code.

use super::StorageService;
use crate::error::TideError;
use crate::rpc::{
    DeleteChunkReply, DiskReportReply, ReadChunkParams, ReplicationStatusReply, StorageStatus,
    WriteChunkParams, WriteChunkReply,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Build the storage node router.
pub fn router(service: Arc<StorageService>) -> Router {
    Router::new()
        .route("/chunks/:disk_id/:chunk_id", put(handle_write_chunk))
        .route("/chunks/:disk_id/:chunk_id", get(handle_read_chunk))
        .route("/chunks/:disk_id/:chunk_id", delete(handle_delete_chunk))
        .route("/disks", get(handle_disk_report))
        .route("/status", get(handle_status))
        .route("/health", get(health_check))
        .with_state(service)
}

/// Serve the storage RPC surface on an already-bound listener.
pub async fn run_storage_server(
    service: Arc<StorageService>,
    listener: TcpListener,
) -> crate::error::Result<()> {
    info!(addr = %listener.local_addr()?, "storage server listening");
    axum::serve(listener, router(service))
        .await
        .map_err(|e| TideError::Network(e.to_string()))?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handle_write_chunk(
    State(service): State<Arc<StorageService>>,
    Path((disk_id, chunk_id)): Path<(String, String)>,
    Query(params): Query<WriteChunkParams>,
    body: Bytes,
) -> Json<WriteChunkReply> {
    match service.write_chunk(&disk_id, &chunk_id, &params, &body).await {
        Ok(bytes) => Json(WriteChunkReply { status: StorageStatus::ok(), bytes }),
        Err(e) => Json(WriteChunkReply { status: StorageStatus::from(&e), bytes: 0 }),
    }
}

async fn handle_read_chunk(
    State(service): State<Arc<StorageService>>,
    Path((disk_id, chunk_id)): Path<(String, String)>,
    Query(params): Query<ReadChunkParams>,
) -> Result<Bytes, (StatusCode, String)> {
    match service.read_chunk(&disk_id, &chunk_id, params.offset, params.size) {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) => {
            let code = match &e {
                TideError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                TideError::ChunkNotFound(_) | TideError::DiskNotFound(_) | TideError::NotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((code, e.to_string()))
        }
    }
}

async fn handle_delete_chunk(
    State(service): State<Arc<StorageService>>,
    Path((disk_id, chunk_id)): Path<(String, String)>,
) -> Json<DeleteChunkReply> {
    match service.delete_chunk(&disk_id, &chunk_id) {
        Ok(()) => Json(DeleteChunkReply { status: StorageStatus::ok() }),
        Err(e) => Json(DeleteChunkReply { status: StorageStatus::from(&e) }),
    }
}

async fn handle_disk_report(
    State(service): State<Arc<StorageService>>,
) -> Json<DiskReportReply> {
    Json(DiskReportReply {
        status: StorageStatus::ok(),
        reports: service.disk_report(),
    })
}

async fn handle_status(
    State(service): State<Arc<StorageService>>,
) -> Json<ReplicationStatusReply> {
    Json(service.status_reply())
}
