//! Optical archive manager.
//!
//! A background loop that, under disk pressure, copies disk-tier chunks to an
//! optical node and later evicts the disk replicas of cold files. Pressure is
//! hysteretic: archiving starts when any eligible primary's most-used disk
//! crosses `archive_trigger_bytes` and stops only once usage falls back to
//! `archive_target_bytes`. Every step is idempotent, so partial rounds are
//! simply picked up again by the next scan.

use super::cache::{NodeInfo, NodeSelection, NodeStateCache};
use super::{codec, schema, store::MetaStore};
use crate::client::StorageClient;
use crate::error::{Result, TideError};
use crate::types::{ChunkMeta, InodeAttr, NodeType, ReplicaLocation, ReplicaState, StorageTier};
use crate::util::now_secs;
use parking_lot::Mutex;
use rocksdb::WriteBatch;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub archive_trigger_bytes: u64,
    pub archive_target_bytes: u64,
    pub cold_file_ttl_sec: u64,
    pub max_chunks_per_round: u32,
    pub default_chunk_size: u64,
}

pub struct ArchiveManager {
    store: Arc<MetaStore>,
    cache: Arc<NodeStateCache>,
    options: ArchiveOptions,
    archive_mode: Mutex<bool>,
    storage: StorageClient,
}

impl ArchiveManager {
    pub fn new(store: Arc<MetaStore>, cache: Arc<NodeStateCache>, mut options: ArchiveOptions) -> Self {
        if options.archive_target_bytes > options.archive_trigger_bytes {
            options.archive_target_bytes = options.archive_trigger_bytes;
        }
        if options.max_chunks_per_round == 0 {
            options.max_chunks_per_round = 1;
        }
        Self {
            store,
            cache,
            options,
            archive_mode: Mutex::new(false),
            storage: StorageClient::new(),
        }
    }

    /// One archive round: copy under pressure, then evict cold disk replicas
    /// that already have a ready optical copy. All chunk-meta updates commit
    /// as a single batch at round end.
    pub async fn run_once(&self) -> Result<()> {
        let nodes = self.cache.snapshot();
        let do_archive = self.evaluate_pressure(&nodes);
        let optical_target = self
            .cache
            .pick_nodes(1, NodeType::Optical, true)
            .into_iter()
            .next();

        if !do_archive && self.options.cold_file_ttl_sec == 0 {
            return Ok(());
        }

        let now = now_secs();
        let mut archived = 0u32;
        let mut batch = WriteBatch::default();
        let mut batch_rows = 0usize;

        for (key, value) in self.store.prefix_scan(schema::CHUNK_SCAN_PREFIX)? {
            let Some((inode_id, _)) = schema::parse_chunk_key(&key) else {
                continue;
            };
            let Ok(mut meta) = codec::decode_chunk_meta(&value) else {
                warn!(key = %key, "skipping undecodable chunk meta");
                continue;
            };
            let Ok(inode) = self.load_inode(inode_id) else {
                continue;
            };

            let mut changed = false;
            let has_disk = meta.replicas.iter().any(is_disk_replica);
            let mut has_optical_ready = meta.replicas.iter().any(is_ready_optical_replica);

            if do_archive
                && has_disk
                && !has_optical_ready
                && archived < self.options.max_chunks_per_round
            {
                if let Some(optical) = &optical_target {
                    let source = meta
                        .replicas
                        .iter()
                        .find(|r| is_disk_replica(r))
                        .cloned()
                        .expect("disk replica present");
                    match self.copy_to_optical(&inode, &source, optical).await {
                        Ok(replica) => {
                            meta.replicas.push(replica);
                            has_optical_ready = true;
                            archived += 1;
                            changed = true;
                        }
                        Err(err) => {
                            warn!(
                                inode_id,
                                chunk_id = %source.chunk_id,
                                error = %err,
                                "archive copy failed, retrying next round"
                            );
                        }
                    }
                }
            }

            let cold = self.options.cold_file_ttl_sec > 0
                && inode.atime > 0
                && inode.atime + self.options.cold_file_ttl_sec <= now;
            if cold && has_optical_ready && has_disk {
                let evicted = self.evict_disk_replicas(&mut meta).await;
                changed = changed || evicted;
            }

            if changed {
                batch.put(key.as_bytes(), &codec::encode_chunk_meta(&meta)?);
                batch_rows += 1;
            }

            if archived >= self.options.max_chunks_per_round && self.options.cold_file_ttl_sec == 0 {
                break;
            }
        }

        if batch_rows > 0 {
            self.store.write(batch)?;
            info!(archived, updated = batch_rows, "archive round committed");
        }
        Ok(())
    }

    /// Hysteresis on the max per-disk usage across eligible disk-tier
    /// primaries. Returns whether this round should archive.
    fn evaluate_pressure(&self, nodes: &[NodeInfo]) -> bool {
        let mut max_used = 0u64;
        let mut found = false;
        for node in nodes {
            if !node.allocatable || !node.is_primary || node.node_type == NodeType::Optical {
                continue;
            }
            for disk in &node.disks {
                if !disk.is_healthy || disk.capacity_bytes == 0 {
                    continue;
                }
                found = true;
                max_used = max_used.max(disk.capacity_bytes.saturating_sub(disk.free_bytes));
            }
        }

        let mut mode = self.archive_mode.lock();
        if !found {
            return false;
        }
        if max_used >= self.options.archive_trigger_bytes {
            if !*mode {
                info!(max_used, trigger = self.options.archive_trigger_bytes, "archive mode on");
            }
            *mode = true;
        } else if max_used <= self.options.archive_target_bytes {
            if *mode {
                info!(max_used, target = self.options.archive_target_bytes, "archive mode off");
            }
            *mode = false;
        }
        *mode
    }

    /// Exposed for observability.
    pub fn archive_mode(&self) -> bool {
        *self.archive_mode.lock()
    }

    fn load_inode(&self, inode_id: u64) -> Result<InodeAttr> {
        let data = self
            .store
            .get(&schema::inode_key(inode_id))?
            .ok_or(TideError::InodeNotFound(inode_id))?;
        codec::decode_inode(&data)
    }

    /// Copy a whole chunk from a disk replica to the optical node and return
    /// the new replica record.
    async fn copy_to_optical(
        &self,
        inode: &InodeAttr,
        source: &ReplicaLocation,
        optical: &NodeSelection,
    ) -> Result<ReplicaLocation> {
        let chunk_size = if inode.chunk_size > 0 {
            inode.chunk_size
        } else {
            self.options.default_chunk_size
        };
        let data = self
            .storage
            .read_chunk(&source.node_address, &source.disk_id, &source.chunk_id, 0, chunk_size)
            .await?;
        let size = data.len() as u64;
        self.storage
            .write_chunk(&optical.address, &optical.disk_id, &source.chunk_id, 0, data)
            .await?;

        debug!(chunk_id = %source.chunk_id, optical = %optical.node_id, size, "chunk archived");
        Ok(ReplicaLocation {
            node_id: optical.node_id.clone(),
            node_address: optical.address.clone(),
            disk_id: optical.disk_id.clone(),
            chunk_id: source.chunk_id.clone(),
            size,
            group_id: optical.group_id.clone(),
            epoch: optical.epoch,
            primary_node_id: optical.node_id.clone(),
            primary_address: optical.address.clone(),
            secondary_node_id: optical.secondary_node_id.clone(),
            secondary_address: optical.secondary_address.clone(),
            sync_ready: optical.sync_ready,
            storage_tier: StorageTier::Optical,
            replica_state: ReplicaState::Ready,
        })
    }

    /// Delete each disk replica at its hosting node; drop the ones that
    /// confirmed, keep the rest for retry next round.
    async fn evict_disk_replicas(&self, meta: &mut ChunkMeta) -> bool {
        let mut kept = Vec::with_capacity(meta.replicas.len());
        let mut changed = false;
        for replica in meta.replicas.drain(..) {
            if !is_disk_replica(&replica) {
                kept.push(replica);
                continue;
            }
            match self
                .storage
                .delete_chunk(&replica.node_address, &replica.disk_id, &replica.chunk_id)
                .await
            {
                Ok(()) => {
                    debug!(chunk_id = %replica.chunk_id, node = %replica.node_id, "disk replica evicted");
                    changed = true;
                }
                Err(err) => {
                    warn!(
                        chunk_id = %replica.chunk_id,
                        node = %replica.node_id,
                        error = %err,
                        "disk replica eviction failed, keeping"
                    );
                    kept.push(replica);
                }
            }
        }
        meta.replicas = kept;
        changed
    }
}

fn is_disk_replica(replica: &ReplicaLocation) -> bool {
    replica.storage_tier == StorageTier::Disk
}

fn is_ready_optical_replica(replica: &ReplicaLocation) -> bool {
    replica.storage_tier == StorageTier::Optical && replica.replica_state == ReplicaState::Ready
}
