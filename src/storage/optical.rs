//! Optical archive chunk store.
//!
//! Each disk holds a monotonically numbered sequence of append-only images
//! (`image_<N>.iso`) plus a textual `manifest.log`. The manifest is the
//! source of truth across restarts: replaying it top to bottom rebuilds the
//! `chunk_id -> (image, offset, length)` index, with later `W` records
//! overriding earlier ones and `D` records dropping the mapping. The current
//! image is the highest-numbered one; it rotates when an append would exceed
//! `max_image_size_bytes`.

use crate::error::{Result, TideError};
use crate::types::DiskReport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const IMAGE_SUFFIX: &str = ".iso";
const MANIFEST_NAME: &str = "manifest.log";

#[derive(Debug, Clone)]
struct ChunkRecord {
    image_id: String,
    offset: u64,
    length: u64,
}

struct DiskContext {
    disk_id: String,
    root_path: PathBuf,
    mount_point: String,
    manifest_path: PathBuf,
    capacity_bytes: u64,
    used_bytes: u64,
    next_image_index: u64,
    current_image_id: String,
    current_image_size: u64,
    chunks: HashMap<String, ChunkRecord>,
}

impl DiskContext {
    fn image_path(&self, image_id: &str) -> PathBuf {
        self.root_path.join(format!("{}{}", image_id, IMAGE_SUFFIX))
    }
}

/// Per-disk image store with a replayable manifest index.
pub struct ImageStore {
    max_image_size_bytes: u64,
    disks: Mutex<HashMap<String, DiskContext>>,
}

impl ImageStore {
    /// Open (or create) the store under `root`, one directory per disk id,
    /// rebuilding each in-memory index by manifest replay.
    pub fn open(
        root: &Path,
        disk_ids: &[String],
        max_image_size_bytes: u64,
        disk_capacity_bytes: u64,
        mount_point_prefix: &str,
    ) -> Result<Self> {
        let max_image_size_bytes = if max_image_size_bytes == 0 {
            1024 * 1024 * 1024
        } else {
            max_image_size_bytes
        };
        let disk_capacity_bytes = if disk_capacity_bytes == 0 {
            10 * 1024 * 1024 * 1024
        } else {
            disk_capacity_bytes
        };

        fs::create_dir_all(root)
            .map_err(|e| TideError::IoFailed(format!("create archive root: {}", e)))?;

        let mut disks = HashMap::new();
        for disk_id in disk_ids.iter().filter(|d| !d.is_empty()) {
            let root_path = root.join(disk_id);
            fs::create_dir_all(&root_path)
                .map_err(|e| TideError::IoFailed(format!("create disk dir {}: {}", disk_id, e)))?;

            let mut ctx = DiskContext {
                disk_id: disk_id.clone(),
                manifest_path: root_path.join(MANIFEST_NAME),
                mount_point: format!("{}/{}", mount_point_prefix, disk_id),
                root_path,
                capacity_bytes: disk_capacity_bytes,
                used_bytes: 0,
                next_image_index: 1,
                current_image_id: String::new(),
                current_image_size: 0,
                chunks: HashMap::new(),
            };
            scan_images(&mut ctx)?;
            replay_manifest(&mut ctx)?;

            if ctx.current_image_id.is_empty() {
                ctx.current_image_id = image_id_for(1);
                ctx.current_image_size = 0;
                ctx.next_image_index = ctx.next_image_index.max(2);
            }

            info!(
                disk_id = %ctx.disk_id,
                chunks = ctx.chunks.len(),
                current_image = %ctx.current_image_id,
                "optical disk ready"
            );
            disks.insert(ctx.disk_id.clone(), ctx);
        }

        if disks.is_empty() {
            return Err(TideError::InvalidArgument(
                "optical store requires at least one disk id".to_string(),
            ));
        }

        Ok(Self { max_image_size_bytes, disks: Mutex::new(disks) })
    }

    /// Append the chunk to the current image and record it in the manifest.
    /// Optical chunks are whole objects; offsets apply only to reads.
    pub fn write(&self, disk_id: &str, chunk_id: &str, data: &[u8]) -> Result<u64> {
        if disk_id.is_empty() || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "disk_id or chunk_id is empty".to_string(),
            ));
        }
        let mut disks = self.disks.lock();
        let ctx = disks
            .get_mut(disk_id)
            .ok_or_else(|| TideError::DiskNotFound(disk_id.to_string()))?;

        if !ctx.current_image_id.is_empty()
            && ctx.current_image_size + data.len() as u64 > self.max_image_size_bytes
        {
            let next = ctx.next_image_index;
            ctx.next_image_index += 1;
            ctx.current_image_id = image_id_for(next);
            ctx.current_image_size = 0;
        }

        let image_path = ctx.image_path(&ctx.current_image_id);
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&image_path)
            .map_err(|e| TideError::IoFailed(format!("open image {}: {}", image_path.display(), e)))?;
        let offset = file
            .metadata()
            .map_err(|e| TideError::IoFailed(format!("stat image: {}", e)))?
            .len();
        file.write_all(data)
            .map_err(|e| TideError::IoFailed(format!("append image: {}", e)))?;
        file.flush()
            .map_err(|e| TideError::IoFailed(format!("flush image: {}", e)))?;

        let record = ChunkRecord {
            image_id: ctx.current_image_id.clone(),
            offset,
            length: data.len() as u64,
        };
        append_manifest(
            &ctx.manifest_path,
            &format!(
                "W|{}|{}|{}|{}|{}",
                chunk_id, record.image_id, record.offset, record.length, disk_id
            ),
        )?;

        ctx.current_image_size = offset + record.length;
        ctx.used_bytes += record.length;
        ctx.chunks.insert(chunk_id.to_string(), record);
        Ok(data.len() as u64)
    }

    /// Read within the recorded extent; the returned byte count is less than
    /// requested when the range runs past the chunk's length.
    pub fn read(&self, disk_id: &str, chunk_id: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        if disk_id.is_empty() || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "disk_id or chunk_id is empty".to_string(),
            ));
        }
        let (image_path, image_offset, read_len) = {
            let disks = self.disks.lock();
            let ctx = disks
                .get(disk_id)
                .ok_or_else(|| TideError::DiskNotFound(disk_id.to_string()))?;
            let record = ctx
                .chunks
                .get(chunk_id)
                .ok_or_else(|| TideError::ChunkNotFound(chunk_id.to_string()))?;
            if offset >= record.length {
                return Ok(Vec::new());
            }
            let read_len = size.min(record.length - offset);
            (ctx.image_path(&record.image_id), record.offset + offset, read_len)
        };

        let mut file = File::open(&image_path)
            .map_err(|e| TideError::IoFailed(format!("open image {}: {}", image_path.display(), e)))?;
        file.seek(SeekFrom::Start(image_offset))
            .map_err(|e| TideError::IoFailed(format!("seek image: {}", e)))?;
        let mut out = vec![0u8; read_len as usize];
        let mut filled = 0usize;
        while filled < out.len() {
            let n = file
                .read(&mut out[filled..])
                .map_err(|e| TideError::IoFailed(format!("read image: {}", e)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out.truncate(filled);
        Ok(out)
    }

    /// Drop the mapping and write a tombstone. Image bytes are reclaimed only
    /// by image compaction, which this store does not do.
    pub fn delete(&self, disk_id: &str, chunk_id: &str) -> Result<()> {
        if disk_id.is_empty() || chunk_id.is_empty() {
            return Err(TideError::InvalidArgument(
                "disk_id or chunk_id is empty".to_string(),
            ));
        }
        let mut disks = self.disks.lock();
        let ctx = disks
            .get_mut(disk_id)
            .ok_or_else(|| TideError::DiskNotFound(disk_id.to_string()))?;
        if ctx.chunks.remove(chunk_id).is_none() {
            return Err(TideError::ChunkNotFound(chunk_id.to_string()));
        }
        append_manifest(&ctx.manifest_path, &format!("D|{}", chunk_id))
    }

    pub fn disk_report(&self) -> Vec<DiskReport> {
        let disks = self.disks.lock();
        let mut reports: Vec<DiskReport> = disks
            .values()
            .map(|ctx| DiskReport {
                disk_id: ctx.disk_id.clone(),
                mount_point: ctx.mount_point.clone(),
                capacity_bytes: ctx.capacity_bytes,
                free_bytes: ctx.capacity_bytes.saturating_sub(ctx.used_bytes),
                is_healthy: true,
            })
            .collect();
        reports.sort_by(|a, b| a.disk_id.cmp(&b.disk_id));
        reports
    }

    /// Index lookup for tests and introspection.
    pub fn locate(&self, disk_id: &str, chunk_id: &str) -> Option<(String, u64, u64)> {
        let disks = self.disks.lock();
        let ctx = disks.get(disk_id)?;
        let record = ctx.chunks.get(chunk_id)?;
        Some((record.image_id.clone(), record.offset, record.length))
    }
}

fn image_id_for(index: u64) -> String {
    format!("image_{}", index)
}

fn parse_image_index(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(IMAGE_SUFFIX)?;
    let number = stem.strip_prefix("image_")?;
    number.parse().ok()
}

fn scan_images(ctx: &mut DiskContext) -> Result<()> {
    let mut highest: Option<(u64, u64)> = None;
    for entry in fs::read_dir(&ctx.root_path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(index) = parse_image_index(&name) else {
            continue;
        };
        let size = entry.metadata()?.len();
        ctx.used_bytes += size;
        ctx.next_image_index = ctx.next_image_index.max(index + 1);
        if highest.map(|(i, _)| index > i).unwrap_or(true) {
            highest = Some((index, size));
        }
    }
    if let Some((index, size)) = highest {
        ctx.current_image_id = image_id_for(index);
        ctx.current_image_size = size;
    }
    Ok(())
}

fn replay_manifest(ctx: &mut DiskContext) -> Result<()> {
    let file = match File::open(&ctx.manifest_path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(TideError::IoFailed(format!("open manifest: {}", e))),
    };

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| TideError::IoFailed(format!("read manifest: {}", e)))?;
        let parts: Vec<&str> = line.split('|').collect();
        match parts.first() {
            Some(&"W") if parts.len() == 6 => {
                let (Ok(offset), Ok(length)) = (parts[3].parse(), parts[4].parse()) else {
                    warn!(disk_id = %ctx.disk_id, line = %line, "skipping malformed manifest record");
                    continue;
                };
                ctx.chunks.insert(
                    parts[1].to_string(),
                    ChunkRecord { image_id: parts[2].to_string(), offset, length },
                );
            }
            Some(&"D") if parts.len() >= 2 => {
                ctx.chunks.remove(parts[1]);
            }
            _ => {
                warn!(disk_id = %ctx.disk_id, line = %line, "skipping malformed manifest record");
            }
        }
    }
    Ok(())
}

fn append_manifest(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| TideError::IoFailed(format!("open manifest {}: {}", path.display(), e)))?;
    writeln!(file, "{}", line)
        .map_err(|e| TideError::IoFailed(format!("append manifest: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(root: &Path, max_image_size: u64) -> ImageStore {
        ImageStore::open(root, &["disk-01".to_string()], max_image_size, 1 << 30, "/optical")
            .unwrap()
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1 << 20);

        store.write("disk-01", "aaaa", b"first chunk").unwrap();
        store.write("disk-01", "bbbb", b"second chunk").unwrap();

        assert_eq!(store.read("disk-01", "aaaa", 0, 64).unwrap(), b"first chunk");
        assert_eq!(store.read("disk-01", "bbbb", 7, 64).unwrap(), b"chunk");
    }

    #[test]
    fn test_read_clipped_to_extent() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1 << 20);
        store.write("disk-01", "aaaa", b"0123456789").unwrap();

        assert_eq!(store.read("disk-01", "aaaa", 8, 64).unwrap(), b"89");
        assert!(store.read("disk-01", "aaaa", 10, 4).unwrap().is_empty());
        assert!(store.read("disk-01", "aaaa", 99, 4).unwrap().is_empty());
    }

    #[test]
    fn test_rotation_at_max_image_size() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1024 * 1024);
        let chunk = vec![7u8; 200 * 1024];

        // 200 KiB appends against a 1 MiB cap: five fit per image, the
        // sixth would exceed it and rotates.
        for i in 0..12 {
            store.write("disk-01", &format!("c{:02}", i), &chunk).unwrap();
        }

        let image_of = |i: usize| {
            let (image, _, _) = store.locate("disk-01", &format!("c{:02}", i)).unwrap();
            image
        };
        for i in 0..5 {
            assert_eq!(image_of(i), "image_1");
        }
        for i in 5..10 {
            assert_eq!(image_of(i), "image_2");
        }
        for i in 10..12 {
            assert_eq!(image_of(i), "image_3");
        }

        let manifest = fs::read_to_string(dir.path().join("disk-01").join(MANIFEST_NAME)).unwrap();
        assert_eq!(manifest.lines().filter(|l| l.starts_with("W|")).count(), 12);
    }

    #[test]
    fn test_restart_reproduces_index() {
        let dir = tempdir().unwrap();
        let mut locations = HashMap::new();
        {
            let store = open_store(dir.path(), 1024 * 1024);
            let chunk = vec![3u8; 200 * 1024];
            for i in 0..12 {
                let id = format!("c{:02}", i);
                store.write("disk-01", &id, &chunk).unwrap();
                locations.insert(id.clone(), store.locate("disk-01", &id).unwrap());
            }
        }

        let reopened = open_store(dir.path(), 1024 * 1024);
        for (id, expected) in &locations {
            assert_eq!(&reopened.locate("disk-01", id).unwrap(), expected);
        }
        assert_eq!(
            reopened.read("disk-01", "c07", 0, 200 * 1024).unwrap(),
            vec![3u8; 200 * 1024]
        );
    }

    #[test]
    fn test_later_write_wins_on_replay() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(dir.path(), 1 << 20);
            store.write("disk-01", "aaaa", b"old contents").unwrap();
            store.write("disk-01", "aaaa", b"new").unwrap();
        }
        let reopened = open_store(dir.path(), 1 << 20);
        assert_eq!(reopened.read("disk-01", "aaaa", 0, 64).unwrap(), b"new");
    }

    #[test]
    fn test_delete_tombstone_survives_restart() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(dir.path(), 1 << 20);
            store.write("disk-01", "aaaa", b"payload").unwrap();
            store.delete("disk-01", "aaaa").unwrap();
            assert!(matches!(
                store.delete("disk-01", "aaaa"),
                Err(TideError::ChunkNotFound(_))
            ));
        }
        let reopened = open_store(dir.path(), 1 << 20);
        assert!(matches!(
            reopened.read("disk-01", "aaaa", 0, 4),
            Err(TideError::ChunkNotFound(_))
        ));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(dir.path(), 1 << 20);
            store.write("disk-01", "aaaa", b"one").unwrap();
            store.write("disk-01", "bbbb", b"two").unwrap();
            store.delete("disk-01", "aaaa").unwrap();
        }

        let first = open_store(dir.path(), 1 << 20);
        let second = open_store(dir.path(), 1 << 20);
        assert_eq!(first.locate("disk-01", "bbbb"), second.locate("disk-01", "bbbb"));
        assert!(first.locate("disk-01", "aaaa").is_none());
        assert!(second.locate("disk-01", "aaaa").is_none());
    }

    #[test]
    fn test_disk_report_accounts_used_bytes() {
        let dir = tempdir().unwrap();
        let store = ImageStore::open(
            dir.path(),
            &["disk-01".to_string()],
            1 << 20,
            1000,
            "/optical",
        )
        .unwrap();
        store.write("disk-01", "aaaa", &[0u8; 300]).unwrap();
        let report = &store.disk_report()[0];
        assert_eq!(report.capacity_bytes, 1000);
        assert_eq!(report.free_bytes, 700);
    }
}
