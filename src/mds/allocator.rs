//! Chunk replica placement.
//!
//! Picks `replica` placements among allocatable disk-tier primaries and
//! stamps each with the group/epoch/secondary pairing frozen at allocation
//! time. The epoch stamp is what lets storage nodes reject forwarded writes
//! from a deposed primary later on.

use super::cache::NodeStateCache;
use crate::error::{Result, TideError};
use crate::types::{NodeType, ReplicaLocation, ReplicaState, StorageTier};
use std::sync::Arc;

pub struct ChunkAllocator {
    cache: Arc<NodeStateCache>,
}

impl ChunkAllocator {
    pub fn new(cache: Arc<NodeStateCache>) -> Self {
        Self { cache }
    }

    /// Allocate `replica` placements for a new chunk.
    ///
    /// Optical nodes are excluded; only eligible primaries are considered.
    /// Fails when no allocatable primary exists at all.
    pub fn allocate_chunk(&self, replica: u32, chunk_id: &str) -> Result<Vec<ReplicaLocation>> {
        if replica == 0 || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "replica or chunk_id is empty".to_string(),
            ));
        }

        let selections = self.cache.pick_nodes(replica, NodeType::Optical, false);
        if selections.is_empty() {
            return Err(TideError::Internal(
                "no allocatable primary for chunk placement".to_string(),
            ));
        }

        Ok(selections
            .into_iter()
            .map(|sel| ReplicaLocation {
                primary_node_id: sel.node_id.clone(),
                primary_address: sel.address.clone(),
                node_id: sel.node_id,
                node_address: sel.address,
                disk_id: sel.disk_id,
                chunk_id: chunk_id.to_string(),
                size: 0,
                group_id: sel.group_id,
                epoch: sel.epoch,
                secondary_node_id: sel.secondary_node_id,
                secondary_address: sel.secondary_address,
                sync_ready: sel.sync_ready,
                storage_tier: StorageTier::Disk,
                replica_state: ReplicaState::Ready,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mds::cache::{DiskInfo, NodeInfo};

    fn disk_node(node_id: &str) -> NodeInfo {
        let mut info = NodeInfo::new(node_id, format!("{}:9500", node_id));
        info.epoch = 3;
        info.secondary_node_id = format!("{}-peer", node_id);
        info.secondary_address = format!("{}-peer:9500", node_id);
        info.sync_ready = true;
        info.disks = vec![DiskInfo {
            disk_id: "disk-01".to_string(),
            capacity_bytes: 100,
            free_bytes: 100,
            is_healthy: true,
        }];
        info
    }

    #[test]
    fn test_allocation_stamps_fencing_fields() {
        let cache = Arc::new(NodeStateCache::new(vec![disk_node("n1"), disk_node("n2")]));
        let allocator = ChunkAllocator::new(cache);

        let replicas = allocator.allocate_chunk(2, "cafebabe").unwrap();
        assert_eq!(replicas.len(), 2);
        for replica in &replicas {
            assert_eq!(replica.chunk_id, "cafebabe");
            assert_eq!(replica.epoch, 3);
            assert_eq!(replica.primary_node_id, replica.node_id);
            assert_eq!(replica.secondary_node_id, format!("{}-peer", replica.node_id));
            assert!(replica.sync_ready);
            assert_eq!(replica.storage_tier, StorageTier::Disk);
            assert_eq!(replica.replica_state, ReplicaState::Ready);
        }
        // Distinct primaries while enough allocatable nodes exist.
        assert_ne!(replicas[0].node_id, replicas[1].node_id);
    }

    #[test]
    fn test_allocation_excludes_optical() {
        let mut optical = disk_node("opt1");
        optical.node_type = NodeType::Optical;
        let cache = Arc::new(NodeStateCache::new(vec![disk_node("n1"), optical]));
        let allocator = ChunkAllocator::new(cache);

        let replicas = allocator.allocate_chunk(2, "cafebabe").unwrap();
        assert!(replicas.iter().all(|r| r.node_id == "n1"));
    }

    #[test]
    fn test_allocation_fails_without_primaries() {
        let mut down = disk_node("n1");
        down.allocatable = false;
        let cache = Arc::new(NodeStateCache::new(vec![down]));
        let allocator = ChunkAllocator::new(cache);
        assert!(allocator.allocate_chunk(1, "cafebabe").is_err());
    }

    #[test]
    fn test_zero_replica_rejected() {
        let cache = Arc::new(NodeStateCache::new(vec![disk_node("n1")]));
        let allocator = ChunkAllocator::new(cache);
        assert!(matches!(
            allocator.allocate_chunk(0, "cafebabe"),
            Err(TideError::InvalidArgument(_))
        ));
    }
}
