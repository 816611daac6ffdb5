//! Role- and epoch-fenced storage service.
//!
//! Wraps a [`ChunkStore`] with the single-writer-per-group-per-epoch
//! invariant. The local replication state is bootstrapped from config and
//! overwritten by scheduler assignments arriving on heartbeat replies; an
//! assignment is authoritative.
//!
//! Write ordering: the local chunk write lands first, `applied_lsn` is
//! incremented, then a primary synchronously forwards to its secondary with
//! the current epoch stamped. A forward failure surfaces as the write's
//! failure and the local write is not rolled back; the client's retry against
//! a fresh layout is the recovery mechanism.

use super::ChunkStore;
use crate::config::StorageNodeConfig;
use crate::error::{Result, TideError};
use crate::rpc::{HeartbeatReply, ReplicationStatusReply, WriteChunkParams, WriteChunkReply};
use crate::types::{DiskReport, Epoch, NodeRole};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Local replication view of this node.
#[derive(Debug, Clone, Default)]
pub struct ReplState {
    pub enabled: bool,
    pub is_primary: bool,
    pub epoch: Epoch,
    pub node_id: String,
    pub group_id: String,
    pub peer_node_id: String,
    pub peer_address: String,
    pub primary_node_id: String,
    pub primary_address: String,
    pub secondary_node_id: String,
    pub secondary_address: String,
    /// Forwarding gate: false while the secondary is ineligible.
    pub sync_ready: bool,
    pub applied_lsn: u64,
}

pub struct StorageService {
    store: ChunkStore,
    repl: Mutex<ReplState>,
    http: reqwest::Client,
}

impl StorageService {
    pub fn new(store: ChunkStore, replication_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(replication_timeout)
            .timeout(replication_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { store, repl: Mutex::new(ReplState::default()), http }
    }

    /// Bootstrap replication state from static config. A later scheduler
    /// assignment overrides everything set here.
    pub fn configure_replication(&self, config: &StorageNodeConfig) {
        let is_primary = config.node_role == NodeRole::Primary;
        let mut repl = self.repl.lock();
        repl.enabled = config.replication_enabled;
        repl.is_primary = is_primary;
        repl.epoch = 1;
        repl.node_id = config.node_id.clone();
        repl.group_id = config.effective_group_id();
        repl.peer_node_id = config.peer_node_id.clone();
        repl.peer_address = config.peer_address.clone();
        // Optimistic until the scheduler says otherwise.
        repl.sync_ready = !config.peer_address.is_empty();
        if is_primary {
            repl.primary_node_id = config.node_id.clone();
            repl.primary_address = String::new();
            repl.secondary_node_id = config.peer_node_id.clone();
            repl.secondary_address = config.peer_address.clone();
        } else {
            repl.primary_node_id = config.peer_node_id.clone();
            repl.primary_address = config.peer_address.clone();
            repl.secondary_node_id = config.node_id.clone();
            repl.secondary_address = String::new();
        }
    }

    /// Apply a scheduler heartbeat assignment. The reply is authoritative for
    /// role, epoch, and the primary/secondary pairing.
    pub fn apply_assignment(&self, assignment: &HeartbeatReply) {
        let mut repl = self.repl.lock();
        repl.is_primary = assignment.assigned_role == NodeRole::Primary;
        if assignment.epoch > 0 {
            repl.epoch = assignment.epoch;
        }
        if !assignment.group_id.is_empty() {
            repl.group_id = assignment.group_id.clone();
        }
        repl.primary_node_id = assignment.primary_node_id.clone();
        repl.primary_address = assignment.primary_address.clone();
        repl.secondary_node_id = assignment.secondary_node_id.clone();
        repl.secondary_address = assignment.secondary_address.clone();
        repl.sync_ready = assignment.sync_ready;
        if repl.node_id == assignment.primary_node_id {
            repl.peer_node_id = assignment.secondary_node_id.clone();
            repl.peer_address = assignment.secondary_address.clone();
        } else if repl.node_id == assignment.secondary_node_id {
            repl.peer_node_id = assignment.primary_node_id.clone();
            repl.peer_address = assignment.primary_address.clone();
        }
        debug!(
            node_id = %repl.node_id,
            is_primary = repl.is_primary,
            epoch = repl.epoch,
            peer = %repl.peer_address,
            "applied scheduler assignment"
        );
    }

    pub fn repl_snapshot(&self) -> ReplState {
        self.repl.lock().clone()
    }

    pub fn status_reply(&self) -> ReplicationStatusReply {
        let repl = self.repl.lock();
        ReplicationStatusReply {
            node_id: repl.node_id.clone(),
            group_id: repl.group_id.clone(),
            replication_enabled: repl.enabled,
            is_primary: repl.is_primary,
            epoch: repl.epoch,
            peer_node_id: repl.peer_node_id.clone(),
            peer_address: repl.peer_address.clone(),
            sync_ready: repl.sync_ready,
            applied_lsn: repl.applied_lsn,
        }
    }

    /// Handle a chunk write, client-originated or forwarded.
    pub async fn write_chunk(
        &self,
        disk_id: &str,
        chunk_id: &str,
        params: &WriteChunkParams,
        data: &[u8],
    ) -> Result<u64> {
        if disk_id.is_empty() || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "disk_id or chunk_id is empty".to_string(),
            ));
        }

        let snapshot = {
            let mut repl = self.repl.lock();
            if repl.enabled && params.replication && params.epoch > repl.epoch {
                // A lagging secondary catches up from a freshly promoted
                // primary.
                repl.epoch = params.epoch;
            }
            repl.clone()
        };

        if snapshot.enabled && !params.replication && !snapshot.is_primary {
            return Err(TideError::NotLeader { group_id: snapshot.group_id });
        }
        if snapshot.enabled && params.replication && params.epoch > 0 && params.epoch < snapshot.epoch
        {
            return Err(TideError::StaleEpoch {
                request: params.epoch,
                local: snapshot.epoch,
            });
        }

        let bytes = self.store.write(disk_id, chunk_id, params.offset, data)?;
        self.repl.lock().applied_lsn += 1;

        if snapshot.enabled
            && snapshot.is_primary
            && !params.replication
            && snapshot.sync_ready
            && !snapshot.peer_address.is_empty()
        {
            self.forward_to_secondary(disk_id, chunk_id, params.offset, data, snapshot.epoch, &snapshot.peer_address)
                .await?;
        }
        Ok(bytes)
    }

    /// Reads are oblivious to role: any replica that holds the chunk serves.
    pub fn read_chunk(&self, disk_id: &str, chunk_id: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        if disk_id.is_empty() || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "disk_id or chunk_id is empty".to_string(),
            ));
        }
        self.store.read(disk_id, chunk_id, offset, size)
    }

    /// Idempotent: deleting a missing chunk succeeds.
    pub fn delete_chunk(&self, disk_id: &str, chunk_id: &str) -> Result<()> {
        if disk_id.is_empty() || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "disk_id or chunk_id is empty".to_string(),
            ));
        }
        match self.store.delete(disk_id, chunk_id) {
            Ok(()) => Ok(()),
            Err(TideError::ChunkNotFound(_)) | Err(TideError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn disk_report(&self) -> Vec<DiskReport> {
        self.store.disk_report()
    }

    pub fn applied_lsn(&self) -> u64 {
        self.repl.lock().applied_lsn
    }

    async fn forward_to_secondary(
        &self,
        disk_id: &str,
        chunk_id: &str,
        offset: u64,
        data: &[u8],
        epoch: Epoch,
        peer_address: &str,
    ) -> Result<()> {
        let url = format!(
            "http://{}/chunks/{}/{}?offset={}&replication=true&epoch={}",
            peer_address, disk_id, chunk_id, offset, epoch
        );
        let response = self
            .http
            .put(&url)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| {
                warn!(peer = %peer_address, error = %e, "replication rpc failed");
                TideError::ReplicationFailed(format!("rpc to {}: {}", peer_address, e))
            })?;

        let reply: WriteChunkReply = response
            .json()
            .await
            .map_err(|e| TideError::ReplicationFailed(format!("decode reply: {}", e)))?;
        if !reply.status.is_ok() {
            return Err(TideError::ReplicationFailed(format!(
                "secondary rejected write: {}",
                reply.status.message
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::SchedStatus;
    use crate::storage::virt::{VirtStore, VirtStoreOptions};
    use crate::types::NodeType;

    fn virt_service(replication_enabled: bool, is_primary: bool) -> StorageService {
        let store = ChunkStore::Virt(VirtStore::new(VirtStoreOptions {
            disk_ids: vec!["disk-01".to_string()],
            read_bytes_per_sec: 0,
            write_bytes_per_sec: 0,
            read_base_latency_ms: 0,
            write_base_latency_ms: 0,
            jitter_ms: 0,
            disk_capacity_bytes: 1024,
            mount_point_prefix: "/virt".to_string(),
        }));
        let service = StorageService::new(store, Duration::from_millis(500));
        let mut config = StorageNodeConfig::default();
        config.node_type = NodeType::Virtual;
        config.node_id = "n1".to_string();
        config.replication_enabled = replication_enabled;
        config.node_role = if is_primary { NodeRole::Primary } else { NodeRole::Secondary };
        // No peer address: the primary path skips forwarding.
        service.configure_replication(&config);
        service
    }

    fn assignment(role: NodeRole, epoch: Epoch) -> HeartbeatReply {
        HeartbeatReply {
            status: SchedStatus::ok(),
            generation: 1,
            group_id: "g1".to_string(),
            assigned_role: role,
            epoch,
            primary_node_id: "n2".to_string(),
            primary_address: "127.0.0.1:1".to_string(),
            secondary_node_id: "n1".to_string(),
            secondary_address: "127.0.0.1:2".to_string(),
            sync_ready: true,
        }
    }

    #[tokio::test]
    async fn test_secondary_rejects_client_write() {
        let service = virt_service(true, false);
        let err = service
            .write_chunk("disk-01", "c1", &WriteChunkParams::default(), b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, TideError::NotLeader { .. }));
    }

    #[tokio::test]
    async fn test_stale_epoch_rejected() {
        let service = virt_service(true, false);
        service.apply_assignment(&assignment(NodeRole::Secondary, 3));

        let params = WriteChunkParams { offset: 0, replication: true, epoch: 2 };
        let err = service
            .write_chunk("disk-01", "c1", &params, b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, TideError::StaleEpoch { request: 2, local: 3 }));
    }

    #[tokio::test]
    async fn test_equal_epoch_accepted() {
        let service = virt_service(true, false);
        service.apply_assignment(&assignment(NodeRole::Secondary, 3));

        let params = WriteChunkParams { offset: 0, replication: true, epoch: 3 };
        assert_eq!(
            service.write_chunk("disk-01", "c1", &params, b"data").await.unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn test_higher_epoch_advances_local() {
        let service = virt_service(true, false);
        service.apply_assignment(&assignment(NodeRole::Secondary, 2));

        let params = WriteChunkParams { offset: 0, replication: true, epoch: 5 };
        service.write_chunk("disk-01", "c1", &params, b"data").await.unwrap();
        assert_eq!(service.repl_snapshot().epoch, 5);

        // The previously valid epoch is now stale.
        let params = WriteChunkParams { offset: 0, replication: true, epoch: 2 };
        let err = service
            .write_chunk("disk-01", "c1", &params, b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, TideError::StaleEpoch { .. }));
    }

    #[tokio::test]
    async fn test_applied_lsn_increments_on_write() {
        let service = virt_service(false, true);
        assert_eq!(service.applied_lsn(), 0);
        service
            .write_chunk("disk-01", "c1", &WriteChunkParams::default(), b"data")
            .await
            .unwrap();
        service
            .write_chunk("disk-01", "c1", &WriteChunkParams::default(), b"data")
            .await
            .unwrap();
        assert_eq!(service.applied_lsn(), 2);
    }

    #[tokio::test]
    async fn test_zero_length_write_is_noop_but_fenced() {
        let service = virt_service(true, false);
        let err = service
            .write_chunk("disk-01", "c1", &WriteChunkParams::default(), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, TideError::NotLeader { .. }));

        let primary = virt_service(true, true);
        assert_eq!(
            primary
                .write_chunk("disk-01", "c1", &WriteChunkParams::default(), b"")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_primary_skips_forward_when_sync_not_ready() {
        let service = virt_service(true, true);
        // Pair with an unreachable peer, then learn that the secondary is
        // out: writes must succeed without attempting the forward.
        let mut reply = assignment(NodeRole::Primary, 2);
        reply.primary_node_id = "n1".to_string();
        reply.secondary_node_id = "n2".to_string();
        reply.secondary_address = "127.0.0.1:1".to_string();
        reply.sync_ready = false;
        service.apply_assignment(&reply);

        assert_eq!(
            service
                .write_chunk("disk-01", "c1", &WriteChunkParams::default(), b"data")
                .await
                .unwrap(),
            4
        );
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let service = virt_service(false, true);
        assert!(service.delete_chunk("disk-01", "missing").is_ok());
    }

    #[test]
    fn test_assignment_updates_peer() {
        let service = virt_service(true, true);
        service.apply_assignment(&assignment(NodeRole::Secondary, 2));
        let repl = service.repl_snapshot();
        assert!(!repl.is_primary);
        assert_eq!(repl.peer_node_id, "n2");
        assert_eq!(repl.peer_address, "127.0.0.1:1");
    }
}
