//! Metadata keyspace layout.
//!
//! | Prefix | Key                    | Value                    |
//! |--------|------------------------|--------------------------|
//! | `I/`   | `I/<inode_id>`         | JSON inode attributes    |
//! | `D/`   | `D/<parent_id>/<name>` | u64 child inode id       |
//! | `C/`   | `C/<inode_id>/<index>` | JSON chunk metadata      |
//! | `H/`   | `H/<handle_id>`        | u64 inode id             |
//! | `X/`   | `X/next_inode` etc.    | u64 counters             |

use crate::types::{ChunkIndex, HandleId, InodeId};

pub const NEXT_INODE_KEY: &str = "X/next_inode";
pub const NEXT_HANDLE_KEY: &str = "X/next_handle";
pub const CHUNK_SCAN_PREFIX: &str = "C/";

pub fn inode_key(inode_id: InodeId) -> String {
    format!("I/{}", inode_id)
}

pub fn dentry_key(parent_inode: InodeId, name: &str) -> String {
    format!("D/{}/{}", parent_inode, name)
}

pub fn dentry_prefix(parent_inode: InodeId) -> String {
    format!("D/{}/", parent_inode)
}

pub fn chunk_key(inode_id: InodeId, index: ChunkIndex) -> String {
    format!("C/{}/{}", inode_id, index)
}

pub fn chunk_prefix(inode_id: InodeId) -> String {
    format!("C/{}/", inode_id)
}

pub fn handle_key(handle_id: HandleId) -> String {
    format!("H/{}", handle_id)
}

/// Split a `C/<inode>/<index>` key back into its components.
pub fn parse_chunk_key(key: &str) -> Option<(InodeId, ChunkIndex)> {
    let rest = key.strip_prefix(CHUNK_SCAN_PREFIX)?;
    let slash = rest.find('/')?;
    let inode_id = rest[..slash].parse().ok()?;
    let index = rest[slash + 1..].parse().ok()?;
    Some((inode_id, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(inode_key(7), "I/7");
        assert_eq!(dentry_key(1, "etc"), "D/1/etc");
        assert_eq!(chunk_key(9, 3), "C/9/3");
        assert_eq!(handle_key(12), "H/12");
    }

    #[test]
    fn test_parse_chunk_key() {
        assert_eq!(parse_chunk_key("C/42/7"), Some((42, 7)));
        assert_eq!(parse_chunk_key("C/42/"), None);
        assert_eq!(parse_chunk_key("D/42/7"), None);
        assert_eq!(parse_chunk_key("C/x/7"), None);
    }
}
