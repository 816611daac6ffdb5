//! Metadata operations: path resolution, namespace mutations, and write
//! layout allocation.
//!
//! Every mutating operation commits as a single `WriteBatch`, with two
//! exceptions called out inline (unlink's chunk-meta sweep follows the
//! namespace batch, and counter allocation is a read-increment-put on the
//! single-MDS assumption).

use super::allocator::ChunkAllocator;
use super::{codec, schema, store::MetaStore};
use crate::error::{Result, TideError};
use crate::types::{
    ChunkIndex, ChunkMeta, Dentry, FileLayout, HandleId, InodeAttr, InodeId, ROOT_INODE_ID,
};
use crate::util::now_secs;
use rocksdb::WriteBatch;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct MdsService {
    store: Arc<MetaStore>,
    allocator: Arc<ChunkAllocator>,
    default_chunk_size: u64,
    default_replica: u32,
}

impl MdsService {
    pub fn new(
        store: Arc<MetaStore>,
        allocator: Arc<ChunkAllocator>,
        default_chunk_size: u64,
        default_replica: u32,
    ) -> Result<Self> {
        let service = Self {
            store,
            allocator,
            default_chunk_size,
            default_replica: default_replica.max(1),
        };
        service.ensure_root()?;
        Ok(service)
    }

    /// Create the root directory if this is a fresh store.
    fn ensure_root(&self) -> Result<()> {
        if self.store.exists(&schema::inode_key(ROOT_INODE_ID))? {
            return Ok(());
        }
        let root = InodeAttr::new_dir(ROOT_INODE_ID, 0o755, 0, 0, self.default_chunk_size, now_secs());
        self.store
            .put(&schema::inode_key(ROOT_INODE_ID), &codec::encode_inode(&root)?)?;
        info!("initialized root inode");
        Ok(())
    }

    // -- namespace reads ---------------------------------------------------

    pub fn lookup(&self, path: &str) -> Result<InodeAttr> {
        if path.is_empty() {
            return Err(TideError::InvalidArgument("path is empty".to_string()));
        }
        let inode_id = self.resolve_path(path)?;
        self.get_inode(inode_id)
    }

    pub fn getattr(&self, inode_id: InodeId) -> Result<InodeAttr> {
        if inode_id == 0 {
            return Err(TideError::InvalidArgument("inode_id is empty".to_string()));
        }
        self.get_inode(inode_id)
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<Dentry>> {
        if path.is_empty() {
            return Err(TideError::InvalidArgument("path is empty".to_string()));
        }
        let inode_id = self.resolve_path(path)?;
        let attr = self.get_inode(inode_id)?;
        if !attr.is_dir() {
            return Err(TideError::InvalidArgument("not a directory".to_string()));
        }

        let prefix = schema::dentry_prefix(inode_id);
        let mut entries = Vec::new();
        for (key, value) in self.store.prefix_scan(&prefix)? {
            let name = key[prefix.len()..].to_string();
            let child_inode = codec::decode_u64(&value)?;
            let child_attr = match self.get_inode(child_inode) {
                Ok(attr) => attr,
                Err(TideError::InodeNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            entries.push(Dentry {
                name,
                inode_id: child_inode,
                file_type: child_attr.file_type,
            });
        }
        Ok(entries)
    }

    // -- handles -----------------------------------------------------------

    pub fn open(&self, path: &str) -> Result<(HandleId, InodeAttr)> {
        if path.is_empty() {
            return Err(TideError::InvalidArgument("path is empty".to_string()));
        }
        let inode_id = self.resolve_path(path)?;
        let attr = self.get_inode(inode_id)?;

        let handle_id = self.allocate_counter(schema::NEXT_HANDLE_KEY, 1)?;
        self.store
            .put(&schema::handle_key(handle_id), &codec::encode_u64(inode_id))?;
        Ok((handle_id, attr))
    }

    pub fn close(&self, handle_id: HandleId) -> Result<()> {
        if handle_id == 0 {
            return Err(TideError::InvalidArgument("handle_id is empty".to_string()));
        }
        let mut batch = WriteBatch::default();
        batch.delete(schema::handle_key(handle_id).as_bytes());
        self.store.write(batch)
    }

    /// Handle-to-inode translation, used by handle-based callers.
    pub fn resolve_handle(&self, handle_id: HandleId) -> Result<InodeId> {
        let data = self
            .store
            .get(&schema::handle_key(handle_id))?
            .ok_or_else(|| TideError::NotFound(format!("handle not found: {}", handle_id)))?;
        codec::decode_u64(&data)
    }

    // -- namespace mutations -----------------------------------------------

    pub fn create(
        &self,
        path: &str,
        mode: u32,
        uid: u32,
        gid: u32,
        replica: u32,
        chunk_size: u64,
    ) -> Result<InodeAttr> {
        let (parent_inode, name) = self.prepare_new_entry(path)?;

        let inode_id = self.allocate_counter(schema::NEXT_INODE_KEY, ROOT_INODE_ID + 1)?;
        let attr = InodeAttr::new_file(
            inode_id,
            mode,
            uid,
            gid,
            if chunk_size > 0 { chunk_size } else { self.default_chunk_size },
            if replica > 0 { replica } else { self.default_replica },
            now_secs(),
        );

        let mut batch = WriteBatch::default();
        batch.put(
            schema::dentry_key(parent_inode, &name).as_bytes(),
            &codec::encode_u64(inode_id),
        );
        batch.put(schema::inode_key(inode_id).as_bytes(), &codec::encode_inode(&attr)?);
        self.store.write(batch)?;

        debug!(path, inode_id, "created file");
        Ok(attr)
    }

    pub fn mkdir(&self, path: &str, mode: u32, uid: u32, gid: u32) -> Result<InodeAttr> {
        let (parent_inode, name) = self.prepare_new_entry(path)?;

        let inode_id = self.allocate_counter(schema::NEXT_INODE_KEY, ROOT_INODE_ID + 1)?;
        let attr = InodeAttr::new_dir(inode_id, mode, uid, gid, self.default_chunk_size, now_secs());

        let mut batch = WriteBatch::default();
        batch.put(
            schema::dentry_key(parent_inode, &name).as_bytes(),
            &codec::encode_u64(inode_id),
        );
        batch.put(schema::inode_key(inode_id).as_bytes(), &codec::encode_inode(&attr)?);
        self.store.write(batch)?;

        debug!(path, inode_id, "created directory");
        Ok(attr)
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        if old_path.is_empty() || new_path.is_empty() {
            return Err(TideError::InvalidArgument("path is empty".to_string()));
        }
        let (old_parent, old_name) = self.resolve_parent(old_path)?;
        let (new_parent, new_name) = self.resolve_parent(new_path)?;

        let inode_value = self
            .store
            .get(&schema::dentry_key(old_parent, &old_name))?
            .ok_or_else(|| TideError::NotFound(format!("source not found: {}", old_path)))?;

        if self.store.exists(&schema::dentry_key(new_parent, &new_name))? {
            return Err(TideError::AlreadyExists(format!("target exists: {}", new_path)));
        }

        let mut batch = WriteBatch::default();
        batch.delete(schema::dentry_key(old_parent, &old_name).as_bytes());
        batch.put(schema::dentry_key(new_parent, &new_name).as_bytes(), &inode_value);
        self.store.write(batch)
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(TideError::InvalidArgument("path is empty".to_string()));
        }
        let (parent_inode, name) = self.resolve_parent(path)?;
        let inode_id = self.child_inode(parent_inode, &name, path)?;
        let attr = self.get_inode(inode_id)?;
        if !attr.is_file() {
            return Err(TideError::InvalidArgument(format!("not a file: {}", path)));
        }

        let mut batch = WriteBatch::default();
        batch.delete(schema::dentry_key(parent_inode, &name).as_bytes());
        batch.delete(schema::inode_key(inode_id).as_bytes());
        self.store.write(batch)?;

        // Chunk metadata follows in its own batch; a crash between the two
        // leaves orphaned chunk rows that the next unlink of the same inode
        // id cannot reach, but never a reachable file with missing meta.
        // Chunk bytes on storage nodes are not reclaimed here.
        self.delete_chunk_rows(inode_id)?;
        debug!(path, inode_id, "unlinked file");
        Ok(())
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(TideError::InvalidArgument("path is empty".to_string()));
        }
        if path == "/" {
            return Err(TideError::InvalidArgument("cannot remove root".to_string()));
        }
        let (parent_inode, name) = self.resolve_parent(path)?;
        let inode_id = self.child_inode(parent_inode, &name, path)?;
        let attr = self.get_inode(inode_id)?;
        if !attr.is_dir() {
            return Err(TideError::InvalidArgument(format!("not a directory: {}", path)));
        }
        if self.store.prefix_exists(&schema::dentry_prefix(inode_id))? {
            return Err(TideError::NotEmpty(path.to_string()));
        }

        let mut batch = WriteBatch::default();
        batch.delete(schema::dentry_key(parent_inode, &name).as_bytes());
        batch.delete(schema::inode_key(inode_id).as_bytes());
        self.store.write(batch)
    }

    // -- write layout ------------------------------------------------------

    /// Resolve (and lazily allocate) the chunk layout covering
    /// `[offset, offset + size)`. Already-allocated indices are returned
    /// as-is; their replica sets are not re-planned on overwrite.
    pub fn allocate_write(&self, inode_id: InodeId, offset: u64, size: u64) -> Result<FileLayout> {
        if inode_id == 0 || size == 0 {
            return Err(TideError::InvalidArgument("invalid inode or size".to_string()));
        }
        let mut attr = self.get_inode(inode_id)?;
        let chunk_size = if attr.chunk_size > 0 {
            attr.chunk_size
        } else {
            // Legacy rows without a chunk size adopt the default, once.
            attr.chunk_size = self.default_chunk_size;
            self.put_inode(&attr)?;
            self.default_chunk_size
        };

        let start = offset / chunk_size;
        let end = (offset + size - 1) / chunk_size;

        let mut layout = FileLayout { inode_id, chunk_size, chunks: Vec::new() };
        let mut batch = WriteBatch::default();
        let mut allocated = 0u32;
        for index in start..=end {
            let index = index as ChunkIndex;
            let key = schema::chunk_key(inode_id, index);
            let meta = match self.store.get(&key)? {
                Some(data) => codec::decode_chunk_meta(&data)?,
                None => {
                    let replica = attr.replica.max(1);
                    let chunk_id = generate_chunk_id();
                    let mut meta = ChunkMeta::new(index);
                    meta.replicas = self.allocator.allocate_chunk(replica, &chunk_id)?;
                    batch.put(key.as_bytes(), &codec::encode_chunk_meta(&meta)?);
                    allocated += 1;
                    meta
                }
            };
            layout.chunks.push(meta);
        }

        if allocated > 0 {
            self.store.write(batch)?;
            debug!(inode_id, allocated, "allocated chunk placements");
        }
        Ok(layout)
    }

    /// The read-side counterpart of `allocate_write`: same ranging, no
    /// allocation. Holes stay holes.
    pub fn get_layout(&self, inode_id: InodeId, offset: u64, size: u64) -> Result<FileLayout> {
        if inode_id == 0 || size == 0 {
            return Err(TideError::InvalidArgument("invalid inode or size".to_string()));
        }
        let attr = self.get_inode(inode_id)?;
        let chunk_size = if attr.chunk_size > 0 { attr.chunk_size } else { self.default_chunk_size };

        let start = offset / chunk_size;
        let end = (offset + size - 1) / chunk_size;

        let mut layout = FileLayout { inode_id, chunk_size, chunks: Vec::new() };
        for index in start..=end {
            let key = schema::chunk_key(inode_id, index as ChunkIndex);
            if let Some(data) = self.store.get(&key)? {
                layout.chunks.push(codec::decode_chunk_meta(&data)?);
            }
        }
        Ok(layout)
    }

    /// Commit a completed write: the size only grows, mtime is stamped.
    pub fn commit_write(&self, inode_id: InodeId, new_size: u64) -> Result<()> {
        if inode_id == 0 {
            return Err(TideError::InvalidArgument("inode_id is empty".to_string()));
        }
        let mut attr = self.get_inode(inode_id)?;
        if new_size > attr.size {
            attr.size = new_size;
        }
        attr.mtime = now_secs();
        self.put_inode(&attr)
    }

    // -- resolution helpers ------------------------------------------------

    /// Walk the path left to right from the root. Empty and `/` resolve to
    /// the root itself.
    fn resolve_path(&self, path: &str) -> Result<InodeId> {
        let mut current = ROOT_INODE_ID;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let data = self
                .store
                .get(&schema::dentry_key(current, part))?
                .ok_or_else(|| TideError::NotFound(format!("path not found: {}", path)))?;
            current = codec::decode_u64(&data)?;
        }
        Ok(current)
    }

    /// Resolve everything but the final component; returns the parent inode
    /// and the trailing name for the mutation that follows.
    fn resolve_parent(&self, path: &str) -> Result<(InodeId, String)> {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some(name) = parts.pop() else {
            return Err(TideError::InvalidPath(path.to_string()));
        };
        let mut current = ROOT_INODE_ID;
        for part in parts {
            let data = self
                .store
                .get(&schema::dentry_key(current, part))?
                .ok_or_else(|| TideError::NotFound(format!("parent not found: {}", path)))?;
            current = codec::decode_u64(&data)?;
        }
        Ok((current, name.to_string()))
    }

    /// Shared create/mkdir precondition checks.
    fn prepare_new_entry(&self, path: &str) -> Result<(InodeId, String)> {
        if path.is_empty() {
            return Err(TideError::InvalidArgument("path is empty".to_string()));
        }
        let (parent_inode, name) = self.resolve_parent(path)?;
        if self.store.exists(&schema::dentry_key(parent_inode, &name))? {
            return Err(TideError::AlreadyExists(path.to_string()));
        }
        let parent_attr = self.get_inode(parent_inode)?;
        if !parent_attr.is_dir() {
            return Err(TideError::InvalidArgument("parent is not a directory".to_string()));
        }
        Ok((parent_inode, name))
    }

    fn child_inode(&self, parent_inode: InodeId, name: &str, path: &str) -> Result<InodeId> {
        let data = self
            .store
            .get(&schema::dentry_key(parent_inode, name))?
            .ok_or_else(|| TideError::NotFound(format!("path not found: {}", path)))?;
        codec::decode_u64(&data)
    }

    fn get_inode(&self, inode_id: InodeId) -> Result<InodeAttr> {
        let data = self
            .store
            .get(&schema::inode_key(inode_id))?
            .ok_or(TideError::InodeNotFound(inode_id))?;
        codec::decode_inode(&data)
    }

    fn put_inode(&self, attr: &InodeAttr) -> Result<()> {
        self.store
            .put(&schema::inode_key(attr.inode_id), &codec::encode_inode(attr)?)
    }

    fn delete_chunk_rows(&self, inode_id: InodeId) -> Result<()> {
        let rows = self.store.prefix_scan(&schema::chunk_prefix(inode_id))?;
        if rows.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for (key, _) in rows {
            batch.delete(key.as_bytes());
        }
        self.store.write(batch)
    }

    /// Monotonic counter: read, hand out, write back incremented.
    fn allocate_counter(&self, key: &str, first: u64) -> Result<u64> {
        let next = match self.store.get(key)? {
            Some(data) => codec::decode_u64(&data)?,
            None => first,
        };
        self.store.put(key, &codec::encode_u64(next + 1))?;
        Ok(next)
    }
}

fn generate_chunk_id() -> String {
    Uuid::new_v4().simple().to_string()
}
