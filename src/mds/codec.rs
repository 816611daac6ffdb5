//! Value encoding for the metadata store.
//!
//! Counters and dentry values are 8-byte little-endian `u64`. Inode
//! attributes and chunk metadata are JSON documents; both structs flatten an
//! `extra` map, so fields written by a newer version survive a
//! read-modify-write cycle here.

use crate::error::{Result, TideError};
use crate::types::{ChunkMeta, InodeAttr};

pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_u64(data: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| TideError::Serialization(format!("expected 8 bytes, got {}", data.len())))?;
    Ok(u64::from_le_bytes(bytes))
}

pub fn encode_inode(attr: &InodeAttr) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(attr)?)
}

pub fn decode_inode(data: &[u8]) -> Result<InodeAttr> {
    Ok(serde_json::from_slice(data)?)
}

pub fn encode_chunk_meta(meta: &ChunkMeta) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(meta)?)
}

pub fn decode_chunk_meta(data: &[u8]) -> Result<ChunkMeta> {
    Ok(serde_json::from_slice(data)?)
}
