//! Simulated chunk store for scale testing.
//!
//! Accepts writes without persisting anything and synthesizes read content as
//! a constant byte. I/O latency is modeled as
//! `base_latency + ceil(bytes / throughput) + uniform_jitter`.

use crate::error::{Result, TideError};
use crate::types::DiskReport;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Duration;

const FILL_BYTE: u8 = b'x';

/// Latency model and disk inventory for the simulated backend.
#[derive(Debug, Clone)]
pub struct VirtStoreOptions {
    pub disk_ids: Vec<String>,
    pub read_bytes_per_sec: u64,
    pub write_bytes_per_sec: u64,
    pub read_base_latency_ms: u64,
    pub write_base_latency_ms: u64,
    pub jitter_ms: u64,
    pub disk_capacity_bytes: u64,
    pub mount_point_prefix: String,
}

pub struct VirtStore {
    options: VirtStoreOptions,
    disk_set: HashSet<String>,
    rng: Mutex<StdRng>,
}

impl VirtStore {
    pub fn new(mut options: VirtStoreOptions) -> Self {
        options.disk_ids.retain(|d| !d.is_empty());
        if options.disk_ids.is_empty() {
            options.disk_ids.push("disk-01".to_string());
        }
        let disk_set = options.disk_ids.iter().cloned().collect();
        Self {
            options,
            disk_set,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn write(&self, disk_id: &str, chunk_id: &str, _offset: u64, data: &[u8]) -> Result<u64> {
        self.validate(disk_id, chunk_id)?;
        self.simulate_io(data.len() as u64, false);
        Ok(data.len() as u64)
    }

    pub fn read(&self, disk_id: &str, chunk_id: &str, _offset: u64, size: u64) -> Result<Vec<u8>> {
        self.validate(disk_id, chunk_id)?;
        self.simulate_io(size, true);
        Ok(vec![FILL_BYTE; size as usize])
    }

    pub fn delete(&self, disk_id: &str, chunk_id: &str) -> Result<()> {
        self.validate(disk_id, chunk_id)
    }

    pub fn disk_report(&self) -> Vec<DiskReport> {
        self.options
            .disk_ids
            .iter()
            .map(|disk_id| DiskReport {
                disk_id: disk_id.clone(),
                mount_point: format!("{}/{}", self.options.mount_point_prefix, disk_id),
                capacity_bytes: self.options.disk_capacity_bytes,
                free_bytes: self.options.disk_capacity_bytes,
                is_healthy: true,
            })
            .collect()
    }

    fn validate(&self, disk_id: &str, chunk_id: &str) -> Result<()> {
        if disk_id.is_empty() || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "disk_id or chunk_id is empty".to_string(),
            ));
        }
        if !self.disk_set.contains(disk_id) {
            return Err(TideError::DiskNotFound(disk_id.to_string()));
        }
        Ok(())
    }

    fn simulate_io(&self, bytes: u64, is_read: bool) {
        let (bytes_per_sec, base_ms) = if is_read {
            (self.options.read_bytes_per_sec, self.options.read_base_latency_ms)
        } else {
            (self.options.write_bytes_per_sec, self.options.write_base_latency_ms)
        };

        let transfer_ms = if bytes_per_sec > 0 && bytes > 0 {
            (bytes as f64 / bytes_per_sec as f64 * 1000.0).ceil() as u64
        } else {
            0
        };

        let jitter_ms = if self.options.jitter_ms > 0 {
            self.rng.lock().gen_range(0..=self.options.jitter_ms)
        } else {
            0
        };

        let delay = base_ms + transfer_ms + jitter_ms;
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
    }
}
