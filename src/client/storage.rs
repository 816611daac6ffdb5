//! Client for storage nodes.
//!
//! Stateless over a shared connection pool; every call names the target
//! node's address, which is how the archive manager and the file I/O path
//! talk to many nodes through one client.

use super::build_http_client;
use crate::error::{Result, TideError};
use crate::rpc::{DeleteChunkReply, DiskReportReply, WriteChunkReply};
use crate::types::DiskReport;
use bytes::Bytes;
use std::time::Duration;

const STORAGE_RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
}

impl StorageClient {
    pub fn new() -> Self {
        Self::with_timeout(STORAGE_RPC_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { http: build_http_client(timeout, timeout) }
    }

    /// Client-originated chunk write (never a replication forward).
    pub async fn write_chunk(
        &self,
        address: &str,
        disk_id: &str,
        chunk_id: &str,
        offset: u64,
        data: impl Into<Bytes>,
    ) -> Result<u64> {
        let url = format!(
            "http://{}/chunks/{}/{}?offset={}",
            address, disk_id, chunk_id, offset
        );
        let response = self.http.put(&url).body(data.into()).send().await?;
        let reply: WriteChunkReply = response.json().await?;
        reply.status.into_result()?;
        Ok(reply.bytes)
    }

    /// Read up to `size` bytes; a short return means EOF, not an error.
    pub async fn read_chunk(
        &self,
        address: &str,
        disk_id: &str,
        chunk_id: &str,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>> {
        let url = format!(
            "http://{}/chunks/{}/{}?offset={}&size={}",
            address, disk_id, chunk_id, offset, size
        );
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.bytes().await?.to_vec());
        }
        let message = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(TideError::ChunkNotFound(message)),
            400 => Err(TideError::InvalidArgument(message)),
            _ => Err(TideError::IoFailed(message)),
        }
    }

    pub async fn delete_chunk(&self, address: &str, disk_id: &str, chunk_id: &str) -> Result<()> {
        let url = format!("http://{}/chunks/{}/{}", address, disk_id, chunk_id);
        let response = self.http.delete(&url).send().await?;
        let reply: DeleteChunkReply = response.json().await?;
        reply.status.into_result()
    }

    pub async fn disk_report(&self, address: &str) -> Result<Vec<DiskReport>> {
        let url = format!("http://{}/disks", address);
        let response = self.http.get(&url).send().await?;
        let reply: DiskReportReply = response.json().await?;
        reply.status.into_result()?;
        Ok(reply.reports)
    }
}

impl Default for StorageClient {
    fn default() -> Self {
        Self::new()
    }
}
