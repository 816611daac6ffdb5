//! Disk-backed chunk store.
//!
//! Each `disk_id` maps to a filesystem mount point. A chunk lands at
//! `<mount>/<hex[0:2]>/<hex[2:4]>/<chunk_id>`, where the prefix is built from
//! the first four hex characters of the chunk id, zero-padded when the id has
//! fewer. Writes go to arbitrary offsets, creating the file on demand; reads
//! truncate at EOF; capacity numbers are queried live from the filesystem.

use crate::error::{Result, TideError};
use crate::types::DiskReport;
use nix::sys::statvfs::statvfs;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
struct DiskContext {
    disk_id: String,
    mount_point: PathBuf,
    is_healthy: bool,
}

/// Maps disk ids to mount points and reports their live capacity.
pub struct DiskManager {
    disks: RwLock<HashMap<String, DiskContext>>,
}

impl DiskManager {
    /// Build from a `disk_id:mount_point;disk_id:mount_point` spec string.
    pub fn from_spec(spec: &str) -> Result<Self> {
        if spec.trim().is_empty() {
            return Err(TideError::InvalidArgument("empty disk spec".to_string()));
        }
        let mut disks = HashMap::new();
        for token in spec.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let Some(sep) = token.find(':') else {
                return Err(TideError::InvalidArgument(format!(
                    "invalid disk spec entry: {}",
                    token
                )));
            };
            let disk_id = token[..sep].trim().to_string();
            let mount_point = token[sep + 1..].trim().to_string();
            if disk_id.is_empty() || mount_point.is_empty() {
                return Err(TideError::InvalidArgument(format!(
                    "invalid disk spec entry (empty field): {}",
                    token
                )));
            }
            let mount = PathBuf::from(mount_point);
            let is_healthy = mount.is_dir();
            disks.insert(
                disk_id.clone(),
                DiskContext { disk_id, mount_point: mount, is_healthy },
            );
        }
        if disks.is_empty() {
            return Err(TideError::InvalidArgument(
                "no valid disk entries in spec".to_string(),
            ));
        }
        Ok(Self { disks: RwLock::new(disks) })
    }

    /// Build by scanning a data root: one subdirectory per disk, with an
    /// optional `.disk_id` file overriding the directory name.
    pub fn from_data_root(data_root: &Path) -> Result<Self> {
        if !data_root.is_dir() {
            return Err(TideError::NotFound(format!(
                "data root not found: {}",
                data_root.display()
            )));
        }
        let mut disks = HashMap::new();
        for entry in fs::read_dir(data_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let mount_point = entry.path();
            let disk_id = load_disk_id_file(&mount_point)
                .unwrap_or_else(|| entry.file_name().to_string_lossy().to_string());
            disks.insert(
                disk_id.clone(),
                DiskContext { disk_id, mount_point, is_healthy: true },
            );
        }
        if disks.is_empty() {
            return Err(TideError::NotFound(format!(
                "no disks found under data root: {}",
                data_root.display()
            )));
        }
        Ok(Self { disks: RwLock::new(disks) })
    }

    /// Mount point for a healthy disk; `None` for unknown or unhealthy ids.
    pub fn mount_point(&self, disk_id: &str) -> Option<PathBuf> {
        let disks = self.disks.read();
        disks
            .get(disk_id)
            .filter(|d| d.is_healthy)
            .map(|d| d.mount_point.clone())
    }

    /// Live capacity report for every disk. A disk whose filesystem cannot be
    /// queried is reported unhealthy with zeroed numbers.
    pub fn report(&self) -> Vec<DiskReport> {
        let mut disks = self.disks.write();
        let mut reports: Vec<DiskReport> = Vec::with_capacity(disks.len());
        for disk in disks.values_mut() {
            let (capacity, free, healthy) = match query_fs_space(&disk.mount_point) {
                Ok(pair) => (pair.0, pair.1, true),
                Err(err) => {
                    warn!(disk_id = %disk.disk_id, error = %err, "disk stat failed");
                    (0, 0, false)
                }
            };
            disk.is_healthy = healthy;
            reports.push(DiskReport {
                disk_id: disk.disk_id.clone(),
                mount_point: disk.mount_point.to_string_lossy().to_string(),
                capacity_bytes: capacity,
                free_bytes: free,
                is_healthy: healthy,
            });
        }
        reports.sort_by(|a, b| a.disk_id.cmp(&b.disk_id));
        reports
    }
}

fn load_disk_id_file(mount_point: &Path) -> Option<String> {
    let id = fs::read_to_string(mount_point.join(".disk_id")).ok()?;
    let id = id.lines().next()?.trim().to_string();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

fn query_fs_space(mount_point: &Path) -> Result<(u64, u64)> {
    let stat = statvfs(mount_point)
        .map_err(|e| TideError::IoFailed(format!("statvfs {}: {}", mount_point.display(), e)))?;
    let frsize = stat.fragment_size() as u64;
    Ok((stat.blocks() as u64 * frsize, stat.blocks_available() as u64 * frsize))
}

/// Disk-backed store: `DiskManager` + hex-prefix layout + offset file I/O.
pub struct RealStore {
    disks: DiskManager,
    created_dirs: Mutex<HashSet<PathBuf>>,
}

impl RealStore {
    pub fn new(disks: DiskManager) -> Self {
        Self { disks, created_dirs: Mutex::new(HashSet::new()) }
    }

    pub fn disk_manager(&self) -> &DiskManager {
        &self.disks
    }

    pub fn write(&self, disk_id: &str, chunk_id: &str, offset: u64, data: &[u8]) -> Result<u64> {
        let path = self.resolve(disk_id, chunk_id, true)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| TideError::IoFailed(format!("open {}: {}", path.display(), e)))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| TideError::IoFailed(format!("seek {}: {}", path.display(), e)))?;
        file.write_all(data)
            .map_err(|e| TideError::IoFailed(format!("write {}: {}", path.display(), e)))?;
        Ok(data.len() as u64)
    }

    pub fn read(&self, disk_id: &str, chunk_id: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        let path = self.resolve(disk_id, chunk_id, false)?;
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TideError::ChunkNotFound(chunk_id.to_string()))
            }
            Err(e) => return Err(TideError::IoFailed(format!("open {}: {}", path.display(), e))),
        };
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| TideError::IoFailed(format!("seek {}: {}", path.display(), e)))?;
        let mut out = vec![0u8; size as usize];
        let mut filled = 0usize;
        while filled < out.len() {
            let n = file
                .read(&mut out[filled..])
                .map_err(|e| TideError::IoFailed(format!("read {}: {}", path.display(), e)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out.truncate(filled);
        Ok(out)
    }

    pub fn delete(&self, disk_id: &str, chunk_id: &str) -> Result<()> {
        let path = self.resolve(disk_id, chunk_id, false)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TideError::ChunkNotFound(chunk_id.to_string()))
            }
            Err(e) => Err(TideError::IoFailed(format!("delete {}: {}", path.display(), e))),
        }
    }

    pub fn disk_report(&self) -> Vec<DiskReport> {
        self.disks.report()
    }

    fn resolve(&self, disk_id: &str, chunk_id: &str, create_dirs: bool) -> Result<PathBuf> {
        if disk_id.is_empty() || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "disk_id or chunk_id is empty".to_string(),
            ));
        }
        let mount = self
            .disks
            .mount_point(disk_id)
            .ok_or_else(|| TideError::DiskNotFound(disk_id.to_string()))?;

        let prefix = hex_prefix(chunk_id);
        let dir = mount.join(&prefix[0..2]).join(&prefix[2..4]);
        if create_dirs {
            self.ensure_dir(&dir)?;
        }
        Ok(dir.join(chunk_id))
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        {
            let cache = self.created_dirs.lock();
            if cache.contains(dir) {
                return Ok(());
            }
        }
        fs::create_dir_all(dir)
            .map_err(|e| TideError::IoFailed(format!("mkdir {}: {}", dir.display(), e)))?;
        self.created_dirs.lock().insert(dir.to_path_buf());
        Ok(())
    }
}

/// First four hex characters of the chunk id, lowercased and zero-padded.
fn hex_prefix(chunk_id: &str) -> String {
    let mut prefix = String::with_capacity(4);
    for ch in chunk_id.chars() {
        if prefix.len() >= 4 {
            break;
        }
        if ch.is_ascii_hexdigit() {
            prefix.push(ch.to_ascii_lowercase());
        }
    }
    while prefix.len() < 4 {
        prefix.push('0');
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with_one_disk(dir: &Path) -> RealStore {
        let spec = format!("disk-01:{}", dir.display());
        RealStore::new(DiskManager::from_spec(&spec).unwrap())
    }

    #[test]
    fn test_hex_prefix() {
        assert_eq!(hex_prefix("abcdef0123"), "abcd");
        assert_eq!(hex_prefix("AB"), "ab00");
        assert_eq!(hex_prefix("zz12x34"), "1234");
        assert_eq!(hex_prefix(""), "0000");
    }

    #[test]
    fn test_write_read_at_offset() {
        let dir = tempdir().unwrap();
        let store = store_with_one_disk(dir.path());

        store.write("disk-01", "cafe0001", 0, b"hello world").unwrap();
        store.write("disk-01", "cafe0001", 6, b"tide!").unwrap();

        let data = store.read("disk-01", "cafe0001", 0, 64).unwrap();
        assert_eq!(&data, b"hello tide!");

        // Short read past EOF.
        let tail = store.read("disk-01", "cafe0001", 6, 64).unwrap();
        assert_eq!(&tail, b"tide!");
    }

    #[test]
    fn test_chunk_lands_under_hex_prefix() {
        let dir = tempdir().unwrap();
        let store = store_with_one_disk(dir.path());
        store.write("disk-01", "beef1234", 0, b"x").unwrap();
        assert!(dir.path().join("be").join("ef").join("beef1234").is_file());
    }

    #[test]
    fn test_read_missing_chunk() {
        let dir = tempdir().unwrap();
        let store = store_with_one_disk(dir.path());
        let err = store.read("disk-01", "00000000", 0, 4).unwrap_err();
        assert!(matches!(err, TideError::ChunkNotFound(_)));
    }

    #[test]
    fn test_delete_missing_chunk_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store_with_one_disk(dir.path());
        let err = store.delete("disk-01", "00000000").unwrap_err();
        assert!(matches!(err, TideError::ChunkNotFound(_)));
    }

    #[test]
    fn test_unknown_disk() {
        let dir = tempdir().unwrap();
        let store = store_with_one_disk(dir.path());
        let err = store.write("disk-99", "cafe0001", 0, b"x").unwrap_err();
        assert!(matches!(err, TideError::DiskNotFound(_)));
    }

    #[test]
    fn test_disk_report_live_capacity() {
        let dir = tempdir().unwrap();
        let store = store_with_one_disk(dir.path());
        let reports = store.disk_report();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_healthy);
        assert!(reports[0].capacity_bytes > 0);
        assert!(reports[0].free_bytes <= reports[0].capacity_bytes);
    }

    #[test]
    fn test_data_root_scan() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("d1")).unwrap();
        fs::create_dir(dir.path().join("d2")).unwrap();
        fs::write(dir.path().join("d2").join(".disk_id"), "disk-two\n").unwrap();

        let manager = DiskManager::from_data_root(dir.path()).unwrap();
        assert!(manager.mount_point("d1").is_some());
        assert!(manager.mount_point("disk-two").is_some());
        assert!(manager.mount_point("d2").is_none());
    }
}
