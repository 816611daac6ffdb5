//! Persistent ordered key-value store for MDS metadata.
//!
//! A thin RocksDB wrapper: point gets and puts, atomic batched writes, and
//! ordered prefix scans. All higher-level atomicity in the metadata service
//! is expressed as one `WriteBatch` per operation.

use crate::error::Result;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;

pub struct MetaStore {
    db: DB,
}

impl MetaStore {
    /// Open or create the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?)
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Commit a batch atomically.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }

    /// All `(key, value)` pairs under `prefix`, in key order.
    pub fn prefix_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            out.push((String::from_utf8_lossy(&key).to_string(), value.to_vec()));
        }
        Ok(out)
    }

    /// Whether any key exists under `prefix`.
    pub fn prefix_exists(&self, prefix: &str) -> Result<bool> {
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            return Ok(key.starts_with(prefix.as_bytes()));
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_point_ops() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path()).unwrap();

        assert!(store.get("k").unwrap().is_none());
        store.put("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"v");
        assert!(store.exists("k").unwrap());
    }

    #[test]
    fn test_batch_is_atomic_unit() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path()).unwrap();

        let mut batch = WriteBatch::default();
        batch.put(b"a", b"1");
        batch.put(b"b", b"2");
        batch.delete(b"a");
        store.write(batch).unwrap();

        assert!(store.get("a").unwrap().is_none());
        assert_eq!(store.get("b").unwrap().unwrap(), b"2");
    }

    #[test]
    fn test_prefix_scan_ordered_and_bounded() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path()).unwrap();

        store.put("D/1/b", b"2").unwrap();
        store.put("D/1/a", b"1").unwrap();
        store.put("D/10/x", b"3").unwrap();
        store.put("E/1/c", b"4").unwrap();

        let rows = store.prefix_scan("D/1/").unwrap();
        let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["D/1/a", "D/1/b"]);
    }

    #[test]
    fn test_prefix_exists() {
        let dir = tempdir().unwrap();
        let store = MetaStore::open(dir.path()).unwrap();
        assert!(!store.prefix_exists("D/1/").unwrap());
        store.put("D/1/a", b"1").unwrap();
        assert!(store.prefix_exists("D/1/").unwrap());
        assert!(!store.prefix_exists("D/2/").unwrap());
    }
}
