//! Chunked file write/read path.
//!
//! Writes resolve a layout at the MDS, fan the buffer out chunk by chunk
//! across each chunk's replica set, and commit the new size. One successful
//! write per replica record is sufficient: the receiving primary propagates
//! to its secondary synchronously. Reads clip against the inode size, fetch
//! the layout, and take the first replica that answers; unwritten holes read
//! as zeroes.

use super::{MdsClient, StorageClient};
use crate::error::{Result, TideError};
use crate::types::{ChunkMeta, FileLayout, InodeId, ReplicaLocation};
use tracing::{debug, warn};

pub struct FileClient {
    mds: MdsClient,
    storage: StorageClient,
}

impl FileClient {
    pub fn new(mds: MdsClient) -> Self {
        Self { mds, storage: StorageClient::new() }
    }

    pub fn mds(&self) -> &MdsClient {
        &self.mds
    }

    /// Write `buf` at `offset`, returning the committed file size.
    pub async fn write(&self, inode_id: InodeId, offset: u64, buf: &[u8]) -> Result<u64> {
        if buf.is_empty() {
            return Err(TideError::InvalidArgument("empty write buffer".to_string()));
        }
        let layout = self
            .mds
            .allocate_write(inode_id, offset, buf.len() as u64)
            .await?;

        if let Err(err) = self.write_chunks(&layout, offset, buf).await {
            // A failed replication leg surfaces as an I/O error; the retry
            // against a fresh layout is the recovery mechanism.
            if !err.is_retryable() && !matches!(err, TideError::IoFailed(_)) {
                return Err(err);
            }
            // Roles may have moved underneath us; one retry against a fresh
            // layout picks up the new primary and pairing.
            warn!(inode_id, error = %err, "chunk write failed, refetching layout");
            let layout = self
                .mds
                .allocate_write(inode_id, offset, buf.len() as u64)
                .await?;
            self.write_chunks(&layout, offset, buf).await?;
        }

        let new_size = offset + buf.len() as u64;
        self.mds.commit_write(inode_id, new_size).await?;
        Ok(new_size)
    }

    /// Read up to `len` bytes at `offset`, clipped to the file size.
    pub async fn read(&self, inode_id: InodeId, offset: u64, len: u64) -> Result<Vec<u8>> {
        let attr = self.mds.getattr(inode_id).await?;
        if offset >= attr.size || len == 0 {
            return Ok(Vec::new());
        }
        let clipped = len.min(attr.size - offset);
        let layout = self.mds.get_layout(inode_id, offset, clipped).await?;

        let mut out = vec![0u8; clipped as usize];
        for chunk in &layout.chunks {
            let chunk_start = chunk.index as u64 * layout.chunk_size;
            let chunk_end = chunk_start + layout.chunk_size;
            let read_start = chunk_start.max(offset);
            let read_end = chunk_end.min(offset + clipped);
            if read_end <= read_start {
                continue;
            }
            let chunk_off = read_start - chunk_start;
            let read_len = read_end - read_start;

            let data = self.read_chunk_replicas(chunk, chunk_off, read_len).await?;
            let dst = (read_start - offset) as usize;
            let take = data.len().min(read_len as usize);
            out[dst..dst + take].copy_from_slice(&data[..take]);
        }
        Ok(out)
    }

    async fn write_chunks(&self, layout: &FileLayout, offset: u64, buf: &[u8]) -> Result<()> {
        let write_end_total = offset + buf.len() as u64;
        for chunk in &layout.chunks {
            let chunk_start = chunk.index as u64 * layout.chunk_size;
            let chunk_end = chunk_start + layout.chunk_size;
            let write_start = chunk_start.max(offset);
            let write_end = chunk_end.min(write_end_total);
            if write_end <= write_start {
                continue;
            }
            let chunk_off = write_start - chunk_start;
            let payload_start = (write_start - offset) as usize;
            let payload = &buf[payload_start..payload_start + (write_end - write_start) as usize];

            for replica in &chunk.replicas {
                self.write_chunk_replica(replica, chunk_off, payload).await?;
            }
        }
        Ok(())
    }

    /// Write one replica record, preferring the stamped primary and falling
    /// back to the hosting node, then the secondary.
    async fn write_chunk_replica(
        &self,
        replica: &ReplicaLocation,
        chunk_off: u64,
        payload: &[u8],
    ) -> Result<()> {
        let mut last_err = TideError::Internal("replica has no address".to_string());
        for address in address_order(&[
            &replica.primary_address,
            &replica.node_address,
            &replica.secondary_address,
        ]) {
            match self
                .storage
                .write_chunk(&address, &replica.disk_id, &replica.chunk_id, chunk_off, payload.to_vec())
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) => {
                    debug!(address = %address, chunk_id = %replica.chunk_id, error = %err, "replica write failed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    async fn read_chunk_replicas(
        &self,
        chunk: &ChunkMeta,
        chunk_off: u64,
        read_len: u64,
    ) -> Result<Vec<u8>> {
        let mut last_err = TideError::Internal("chunk has no replicas".to_string());
        for replica in &chunk.replicas {
            for address in address_order(&[
                &replica.node_address,
                &replica.primary_address,
                &replica.secondary_address,
            ]) {
                match self
                    .storage
                    .read_chunk(&address, &replica.disk_id, &replica.chunk_id, chunk_off, read_len)
                    .await
                {
                    Ok(data) => return Ok(data),
                    Err(err) => {
                        debug!(address = %address, chunk_id = %replica.chunk_id, error = %err, "replica read failed");
                        last_err = err;
                    }
                }
            }
        }
        Err(last_err)
    }
}

/// Deduplicated, non-empty addresses in preference order.
fn address_order(candidates: &[&String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !candidate.is_empty() && !out.iter().any(|a| a == *candidate) {
            out.push((*candidate).clone());
        }
    }
    out
}
