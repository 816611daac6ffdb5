//! Wire-level request and reply types for the three RPC surfaces.
//!
//! Every reply carries a typed status struct; transport-level HTTP errors are
//! reserved for the raw-byte chunk read path. The status code sets are stable:
//! clients switch on codes, never on message text. `NotLeader` and
//! `StaleEpoch` are dedicated storage codes so the write path can react to
//! fencing without string matching.

use crate::error::TideError;
use crate::types::{
    AdminState, Dentry, DiskReport, Epoch, FileLayout, Generation, HandleId, InodeAttr, InodeId,
    NodeRole, NodeType, NodeView, OperationRecord,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MDS surface
// ---------------------------------------------------------------------------

/// Status codes for metadata operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdsCode {
    Ok,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    NotEmpty,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdsStatus {
    pub code: MdsCode,
    pub message: String,
}

impl MdsStatus {
    pub fn ok() -> Self {
        Self { code: MdsCode::Ok, message: "OK".to_string() }
    }

    pub fn new(code: MdsCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.code == MdsCode::Ok
    }

    /// Client-side translation back into a crate error.
    pub fn into_result(self) -> crate::error::Result<()> {
        match self.code {
            MdsCode::Ok => Ok(()),
            MdsCode::InvalidArgument => Err(TideError::InvalidArgument(self.message)),
            MdsCode::NotFound => Err(TideError::NotFound(self.message)),
            MdsCode::AlreadyExists => Err(TideError::AlreadyExists(self.message)),
            MdsCode::NotEmpty => Err(TideError::NotEmpty(self.message)),
            MdsCode::InternalError => Err(TideError::Internal(self.message)),
        }
    }
}

impl From<&TideError> for MdsStatus {
    fn from(err: &TideError) -> Self {
        let code = match err {
            TideError::InvalidArgument(_) | TideError::InvalidPath(_) => MdsCode::InvalidArgument,
            TideError::NotFound(_)
            | TideError::InodeNotFound(_)
            | TideError::ChunkNotFound(_)
            | TideError::NodeNotFound(_)
            | TideError::DiskNotFound(_) => MdsCode::NotFound,
            TideError::AlreadyExists(_) => MdsCode::AlreadyExists,
            TideError::NotEmpty(_) => MdsCode::NotEmpty,
            _ => MdsCode::InternalError,
        };
        MdsStatus::new(code, err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrReply {
    pub status: MdsStatus,
    pub attr: Option<InodeAttr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetattrRequest {
    pub inode_id: InodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRequest {
    pub path: String,
    #[serde(default)]
    pub flags: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenReply {
    pub status: MdsStatus,
    pub handle_id: HandleId,
    pub attr: Option<InodeAttr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequest {
    pub handle_id: HandleId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub path: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// 0 selects the MDS default.
    #[serde(default)]
    pub replica: u32,
    /// 0 selects the MDS default.
    #[serde(default)]
    pub chunk_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaddirReply {
    pub status: MdsStatus,
    pub entries: Vec<Dentry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: MdsStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutRequest {
    pub inode_id: InodeId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutReply {
    pub status: MdsStatus,
    pub layout: Option<FileLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitWriteRequest {
    pub inode_id: InodeId,
    pub new_size: u64,
}

// ---------------------------------------------------------------------------
// Storage node surface (uniform across real / virtual / optical)
// ---------------------------------------------------------------------------

/// Status codes for chunk operations.
///
/// `NotLeader` and `StaleEpoch` are first-class fencing outcomes rather than
/// sentinel message strings inside `IoError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageCode {
    Ok,
    InvalidArgument,
    NotFound,
    IoError,
    InternalError,
    NotLeader,
    StaleEpoch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStatus {
    pub code: StorageCode,
    pub message: String,
}

impl StorageStatus {
    pub fn ok() -> Self {
        Self { code: StorageCode::Ok, message: "OK".to_string() }
    }

    pub fn new(code: StorageCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StorageCode::Ok
    }

    pub fn into_result(self) -> crate::error::Result<()> {
        match self.code {
            StorageCode::Ok => Ok(()),
            StorageCode::InvalidArgument => Err(TideError::InvalidArgument(self.message)),
            StorageCode::NotFound => Err(TideError::ChunkNotFound(self.message)),
            StorageCode::IoError => Err(TideError::IoFailed(self.message)),
            StorageCode::InternalError => Err(TideError::Internal(self.message)),
            StorageCode::NotLeader => Err(TideError::NotLeader { group_id: self.message }),
            StorageCode::StaleEpoch => Err(TideError::StaleEpoch { request: 0, local: 0 }),
        }
    }
}

impl From<&TideError> for StorageStatus {
    fn from(err: &TideError) -> Self {
        let code = match err {
            TideError::InvalidArgument(_) | TideError::InvalidPath(_) => StorageCode::InvalidArgument,
            TideError::ChunkNotFound(_) | TideError::DiskNotFound(_) | TideError::NotFound(_) => {
                StorageCode::NotFound
            }
            TideError::NotLeader { .. } => StorageCode::NotLeader,
            TideError::StaleEpoch { .. } => StorageCode::StaleEpoch,
            TideError::IoFailed(_)
            | TideError::ReplicationFailed(_)
            | TideError::Network(_)
            | TideError::Timeout(_)
            | TideError::Io(_) => StorageCode::IoError,
            _ => StorageCode::InternalError,
        };
        StorageStatus::new(code, err.to_string())
    }
}

/// Query parameters for `PUT /chunks/{disk_id}/{chunk_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteChunkParams {
    #[serde(default)]
    pub offset: u64,
    /// Set by a primary forwarding to its secondary.
    #[serde(default)]
    pub replication: bool,
    /// Fencing epoch stamped by the forwarding primary; 0 means unfenced.
    #[serde(default)]
    pub epoch: Epoch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteChunkReply {
    pub status: StorageStatus,
    pub bytes: u64,
}

/// Query parameters for `GET /chunks/{disk_id}/{chunk_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadChunkParams {
    #[serde(default)]
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteChunkReply {
    pub status: StorageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskReportReply {
    pub status: StorageStatus,
    pub reports: Vec<DiskReport>,
}

/// Operator-facing snapshot of a node's replication state (`GET /status`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationStatusReply {
    pub node_id: String,
    pub group_id: String,
    pub replication_enabled: bool,
    pub is_primary: bool,
    pub epoch: Epoch,
    pub peer_node_id: String,
    pub peer_address: String,
    pub sync_ready: bool,
    pub applied_lsn: u64,
}

// ---------------------------------------------------------------------------
// Scheduler surface
// ---------------------------------------------------------------------------

/// Status codes for scheduler operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedCode {
    Ok,
    InvalidArgument,
    NotFound,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedStatus {
    pub code: SchedCode,
    pub message: String,
}

impl SchedStatus {
    pub fn ok() -> Self {
        Self { code: SchedCode::Ok, message: "OK".to_string() }
    }

    pub fn new(code: SchedCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.code == SchedCode::Ok
    }

    pub fn into_result(self) -> crate::error::Result<()> {
        match self.code {
            SchedCode::Ok => Ok(()),
            SchedCode::InvalidArgument => Err(TideError::InvalidArgument(self.message)),
            SchedCode::NotFound => Err(TideError::NotFound(self.message)),
            SchedCode::InternalError => Err(TideError::Internal(self.message)),
        }
    }
}

/// Periodic liveness and capacity report from a storage node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_id: String,
    pub node_type: NodeType,
    pub address: String,
    pub weight: u32,
    pub virtual_node_count: u32,
    pub report_ts_ms: u64,
    /// Empty defaults to the node's own id.
    #[serde(default)]
    pub group_id: String,
    pub role: NodeRole,
    #[serde(default)]
    pub peer_node_id: String,
    #[serde(default)]
    pub peer_address: String,
    pub applied_lsn: u64,
    pub disks: Vec<DiskReport>,
}

/// Authoritative role/epoch assignment returned on every heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub status: SchedStatus,
    pub generation: Generation,
    pub group_id: String,
    pub assigned_role: NodeRole,
    pub epoch: Epoch,
    pub primary_node_id: String,
    pub primary_address: String,
    pub secondary_node_id: String,
    pub secondary_address: String,
    /// Whether the group's secondary is currently eligible; primaries skip
    /// forwarding while it is false.
    #[serde(default)]
    pub sync_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterViewParams {
    #[serde(default)]
    pub min_generation: Generation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterViewReply {
    pub status: SchedStatus,
    pub generation: Generation,
    /// Empty when `generation < min_generation` (unchanged snapshot skipped).
    pub nodes: Vec<NodeView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAdminStateRequest {
    pub node_id: String,
    pub admin: AdminState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReply {
    pub status: SchedStatus,
    pub generation: Generation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartNodeRequest {
    pub node_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopNodeRequest {
    pub node_id: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebootNodeRequest {
    pub node_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReply {
    pub status: SchedStatus,
    pub operation: Option<OperationRecord>,
}
