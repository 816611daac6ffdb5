//! Error types for the TideFS distributed file system.
//!
//! This module provides a unified error type [`TideError`] for all TideFS
//! operations, along with a convenient [`Result`] type alias.
//!
//! Errors fall into the categories the RPC surface exposes:
//!
//! - **Client input**: empty paths, zero sizes, malformed ids
//! - **Missing object**: path, inode, handle, disk, chunk, operation
//! - **Conflict**: create over an existing name, rmdir on a populated dir
//! - **Replication fencing**: writes rejected by role or epoch
//! - **Backend I/O**: disk, image, manifest, and peer RPC failures
//! - **Internal invariant**: decode failures and uninitialized services
//!
//! Errors never cross an RPC boundary as `TideError`; handlers translate them
//! to the wire status codes in [`crate::rpc`] and clients translate back.

use std::io;
use thiserror::Error;

/// Main error type for TideFS operations.
#[derive(Error, Debug)]
pub enum TideError {
    // Client input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // Missing objects
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Inode not found: {0}")]
    InodeNotFound(u64),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("Disk not found or unhealthy: {0}")]
    DiskNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Conflicts
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    // Replication fencing
    #[error("Not the leader for group {group_id}")]
    NotLeader { group_id: String },

    #[error("Stale epoch: request {request} < local {local}")]
    StaleEpoch { request: u64, local: u64 },

    // Backend I/O
    #[error("I/O error: {0}")]
    IoFailed(String),

    #[error("Replication to secondary failed: {0}")]
    ReplicationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),

    // Storage engine / encoding
    #[error("Metadata store error: {0}")]
    MetaStore(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TideError {
    /// Convert to a POSIX errno for the FUSE bridge.
    pub fn to_errno(&self) -> i32 {
        match self {
            TideError::InvalidArgument(_) | TideError::InvalidPath(_) => libc::EINVAL,
            TideError::NotFound(_)
            | TideError::InodeNotFound(_)
            | TideError::ChunkNotFound(_)
            | TideError::DiskNotFound(_)
            | TideError::NodeNotFound(_) => libc::ENOENT,
            TideError::AlreadyExists(_) => libc::EEXIST,
            TideError::NotEmpty(_) => libc::ENOTEMPTY,
            TideError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            _ => libc::EIO,
        }
    }

    /// Check if the error is worth retrying after refreshing cluster state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TideError::NotLeader { .. }
                | TideError::StaleEpoch { .. }
                | TideError::Network(_)
                | TideError::Timeout(_)
        )
    }
}

impl From<rocksdb::Error> for TideError {
    fn from(e: rocksdb::Error) -> Self {
        TideError::MetaStore(e.to_string())
    }
}

impl From<serde_json::Error> for TideError {
    fn from(e: serde_json::Error) -> Self {
        TideError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for TideError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TideError::Timeout(e.to_string())
        } else {
            TideError::Network(e.to_string())
        }
    }
}

/// Result type alias for TideFS operations.
pub type Result<T> = std::result::Result<T, TideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(TideError::InodeNotFound(7).to_errno(), libc::ENOENT);
        assert_eq!(TideError::AlreadyExists("/a".into()).to_errno(), libc::EEXIST);
        assert_eq!(TideError::NotEmpty("/a".into()).to_errno(), libc::ENOTEMPTY);
        assert_eq!(TideError::InvalidPath(String::new()).to_errno(), libc::EINVAL);
        assert_eq!(
            TideError::NotLeader { group_id: "g1".into() }.to_errno(),
            libc::EIO
        );
    }

    #[test]
    fn test_retryable() {
        assert!(TideError::NotLeader { group_id: "g".into() }.is_retryable());
        assert!(TideError::StaleEpoch { request: 1, local: 2 }.is_retryable());
        assert!(!TideError::NotEmpty("/d".into()).is_retryable());
    }
}
