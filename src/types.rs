//! Core type definitions for the TideFS distributed file system.
//!
//! This module contains the fundamental data types shared by the metadata
//! service, the scheduler, the storage nodes, and the clients: inode
//! attributes, chunk/replica metadata, and cluster node views.
//!
//! # Type Aliases
//!
//! Common identifiers are defined as type aliases for clarity:
//!
//! - [`InodeId`] = `u64`: inode number, root is [`ROOT_INODE_ID`]
//! - [`HandleId`] = `u64`: open-file handle, portable across reconnects
//! - [`ChunkIndex`] = `u32`: chunk position within a file
//! - [`Epoch`] = `u64`: per-group fencing token, bumped on failover
//! - [`Generation`] = `u64`: cluster-view version at the scheduler
//!
//! # Examples
//!
//! ```rust
//! use tidefs::types::{FileType, InodeAttr};
//!
//! let attr = InodeAttr::new_file(7, 0o644, 1000, 1000, 4 << 20, 2, 0);
//! assert_eq!(attr.file_type, FileType::File);
//! assert_eq!(attr.size, 0);
//! ```

use serde::{Deserialize, Serialize};

/// Inode number.
pub type InodeId = u64;

/// Open-file handle identifier.
pub type HandleId = u64;

/// Chunk position within a file.
pub type ChunkIndex = u32;

/// Per-group replication fencing token.
pub type Epoch = u64;

/// Cluster-view version counter at the scheduler.
pub type Generation = u64;

/// The root directory inode id. Always exists and is always a directory.
pub const ROOT_INODE_ID: InodeId = 1;

/// Inode kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    File,
    Dir,
}

/// POSIX-ish inode attributes as stored by the MDS.
///
/// `extra` captures fields written by newer versions so a read-modify-write
/// cycle never drops them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InodeAttr {
    pub inode_id: InodeId,
    pub file_type: FileType,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub nlink: u32,
    /// Immutable after create.
    pub chunk_size: u64,
    /// Desired replica count for newly allocated chunks.
    pub replica: u32,
    pub version: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InodeAttr {
    /// Build a fresh file inode stamped with `now` (seconds).
    pub fn new_file(
        inode_id: InodeId,
        mode: u32,
        uid: u32,
        gid: u32,
        chunk_size: u64,
        replica: u32,
        now: u64,
    ) -> Self {
        Self {
            inode_id,
            file_type: FileType::File,
            mode,
            uid,
            gid,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            nlink: 1,
            chunk_size,
            replica,
            version: 1,
            extra: serde_json::Map::new(),
        }
    }

    /// Build a fresh directory inode stamped with `now` (seconds).
    pub fn new_dir(
        inode_id: InodeId,
        mode: u32,
        uid: u32,
        gid: u32,
        chunk_size: u64,
        now: u64,
    ) -> Self {
        Self {
            inode_id,
            file_type: FileType::Dir,
            mode,
            uid,
            gid,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            nlink: 2,
            chunk_size,
            replica: 1,
            version: 1,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }
}

/// Storage tier a replica lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    Disk,
    Optical,
}

/// Readiness of a single replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaState {
    Ready,
    Building,
    Failed,
}

/// One storage-side copy of a chunk, stamped at allocation time.
///
/// `epoch` is frozen when the placement is minted and used by storage nodes
/// to reject forwarded writes from a deposed primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaLocation {
    pub node_id: String,
    pub node_address: String,
    pub disk_id: String,
    /// Stable 128-bit lowercase hex id addressing the bytes on the node.
    pub chunk_id: String,
    /// Bytes written, known for archived replicas; 0 when unknown.
    #[serde(default)]
    pub size: u64,
    pub group_id: String,
    pub epoch: Epoch,
    pub primary_node_id: String,
    pub primary_address: String,
    pub secondary_node_id: String,
    pub secondary_address: String,
    pub sync_ready: bool,
    pub storage_tier: StorageTier,
    pub replica_state: ReplicaState,
}

/// Per-chunk metadata row: `(inode, index) -> replicas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub index: ChunkIndex,
    pub replicas: Vec<ReplicaLocation>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChunkMeta {
    pub fn new(index: ChunkIndex) -> Self {
        Self {
            index,
            replicas: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Chunked layout for a byte range of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLayout {
    pub inode_id: InodeId,
    pub chunk_size: u64,
    pub chunks: Vec<ChunkMeta>,
}

/// One directory entry returned by readdir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dentry {
    pub name: String,
    pub inode_id: InodeId,
    pub file_type: FileType,
}

/// Storage node flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Real,
    Virtual,
    Optical,
}

/// Role of a node within its replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Unknown,
    Primary,
    Secondary,
}

/// Failure-detector verdict for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    Healthy,
    Suspect,
    Dead,
}

/// Operator-controlled availability of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminState {
    Enabled,
    Draining,
    Disabled,
}

/// Observed or desired power state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Unknown,
    On,
    Off,
    Starting,
    Stopping,
}

/// Capacity and health report for one disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskReport {
    pub disk_id: String,
    #[serde(default)]
    pub mount_point: String,
    pub capacity_bytes: u64,
    pub free_bytes: u64,
    pub is_healthy: bool,
}

/// A node as seen in the scheduler's cluster view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: String,
    pub node_type: NodeType,
    pub address: String,
    pub weight: u32,
    pub virtual_node_count: u32,
    pub group_id: String,
    pub role: NodeRole,
    pub epoch: Epoch,
    pub applied_lsn: u64,
    pub peer_node_id: String,
    pub peer_address: String,
    pub sync_ready: bool,
    pub health: NodeHealth,
    pub admin: AdminState,
    pub power: PowerState,
    pub desired_admin: AdminState,
    pub desired_power: PowerState,
    pub last_heartbeat_ms: u64,
    pub disks: Vec<DiskReport>,
}

/// Administrative operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Start,
    Stop,
    Reboot,
}

/// Lifecycle of an administrative operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Succeeded | OperationStatus::Failed)
    }
}

/// Record of an administrative start/stop/reboot operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: String,
    pub node_id: String,
    pub op_type: OperationType,
    pub status: OperationStatus,
    pub message: String,
    pub start_ts_ms: u64,
    pub finish_ts_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_attr_constructors() {
        let f = InodeAttr::new_file(5, 0o644, 0, 0, 1 << 20, 2, 100);
        assert!(f.is_file());
        assert_eq!(f.nlink, 1);
        assert_eq!(f.replica, 2);

        let d = InodeAttr::new_dir(6, 0o755, 0, 0, 1 << 20, 100);
        assert!(d.is_dir());
        assert_eq!(d.nlink, 2);
    }

    #[test]
    fn test_inode_attr_preserves_unknown_fields() {
        let json = r#"{
            "inode_id": 9, "file_type": "file", "mode": 420, "uid": 0,
            "gid": 0, "size": 0, "atime": 1, "mtime": 1, "ctime": 1,
            "nlink": 1, "chunk_size": 1048576, "replica": 1, "version": 1,
            "shard_hint": "zone-b"
        }"#;
        let mut attr: InodeAttr = serde_json::from_str(json).unwrap();
        attr.size = 42;
        let round = serde_json::to_string(&attr).unwrap();
        assert!(round.contains("shard_hint"));
        assert!(round.contains("zone-b"));
    }

    #[test]
    fn test_operation_status_terminal() {
        assert!(OperationStatus::Succeeded.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
    }
}
