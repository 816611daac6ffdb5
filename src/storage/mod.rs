//! Storage node subsystem: chunk stores, the epoch-fenced service wrapper,
//! the heartbeat reporter, and the HTTP server.
//!
//! Three backends share one operation set behind [`ChunkStore`]; the backend
//! is chosen once at service construction and never changes.

pub mod heartbeat;
pub mod optical;
pub mod real;
pub mod server;
pub mod service;
pub mod virt;

pub use heartbeat::HeartbeatReporter;
pub use optical::ImageStore;
pub use real::{DiskManager, RealStore};
pub use server::{router, run_storage_server};
pub use service::{ReplState, StorageService};
pub use virt::VirtStore;

use crate::error::Result;
use crate::types::DiskReport;

/// Uniform chunk operations over the three storage backends.
pub enum ChunkStore {
    Real(RealStore),
    Virt(VirtStore),
    Optical(ImageStore),
}

impl ChunkStore {
    /// Write `data` at `offset` within the chunk, returning bytes written.
    pub fn write(&self, disk_id: &str, chunk_id: &str, offset: u64, data: &[u8]) -> Result<u64> {
        match self {
            ChunkStore::Real(s) => s.write(disk_id, chunk_id, offset, data),
            ChunkStore::Virt(s) => s.write(disk_id, chunk_id, offset, data),
            ChunkStore::Optical(s) => s.write(disk_id, chunk_id, data),
        }
    }

    /// Read up to `size` bytes at `offset`; fewer bytes than requested is not
    /// an error.
    pub fn read(&self, disk_id: &str, chunk_id: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        match self {
            ChunkStore::Real(s) => s.read(disk_id, chunk_id, offset, size),
            ChunkStore::Virt(s) => s.read(disk_id, chunk_id, offset, size),
            ChunkStore::Optical(s) => s.read(disk_id, chunk_id, offset, size),
        }
    }

    /// Delete a chunk. Missing chunks surface as `ChunkNotFound`; the service
    /// layer translates that to success to keep deletes idempotent.
    pub fn delete(&self, disk_id: &str, chunk_id: &str) -> Result<()> {
        match self {
            ChunkStore::Real(s) => s.delete(disk_id, chunk_id),
            ChunkStore::Virt(s) => s.delete(disk_id, chunk_id),
            ChunkStore::Optical(s) => s.delete(disk_id, chunk_id),
        }
    }

    /// Per-disk capacity and health.
    pub fn disk_report(&self) -> Vec<DiskReport> {
        match self {
            ChunkStore::Real(s) => s.disk_report(),
            ChunkStore::Virt(s) => s.disk_report(),
            ChunkStore::Optical(s) => s.disk_report(),
        }
    }
}
