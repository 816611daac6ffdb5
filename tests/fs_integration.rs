//! End-to-end filesystem path: MDS + one disk-backed storage node + the
//! chunked client.

mod common;

use common::{real_service, spawn_storage_server};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::tempdir;
use tidefs::client::{FileClient, MdsClient};
use tidefs::error::TideError;
use tidefs::mds::{
    self, ChunkAllocator, DiskInfo, MdsService, MetaStore, NodeInfo, NodeStateCache,
};
use tidefs::types::FileType;
use tokio::net::TcpListener;

const CHUNK_SIZE: u64 = 1 << 20;

fn storage_node_info(node_id: &str, addr: SocketAddr) -> NodeInfo {
    let mut info = NodeInfo::new(node_id, addr.to_string());
    info.disks = vec![DiskInfo {
        disk_id: "disk-01".to_string(),
        capacity_bytes: 1 << 30,
        free_bytes: 1 << 30,
        is_healthy: true,
    }];
    info
}

async fn spawn_mds(nodes: Vec<NodeInfo>, db_dir: &std::path::Path) -> SocketAddr {
    let store = Arc::new(MetaStore::open(db_dir).unwrap());
    let cache = Arc::new(NodeStateCache::new(nodes));
    let allocator = Arc::new(ChunkAllocator::new(cache));
    let service = Arc::new(MdsService::new(store, allocator, CHUNK_SIZE, 1).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = mds::router(service);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_filesystem_happy_path() {
    let disk_dir = tempdir().unwrap();
    let db_dir = tempdir().unwrap();

    let storage = real_service(disk_dir.path(), "disk-01");
    let storage_addr = spawn_storage_server(storage).await;
    let mds_addr = spawn_mds(vec![storage_node_info("n1", storage_addr)], db_dir.path()).await;

    let client = FileClient::new(MdsClient::new(&mds_addr.to_string()));

    let dir_attr = client.mds().mkdir("/a", 0o755, 0, 0).await.unwrap();
    assert_eq!(dir_attr.file_type, FileType::Dir);
    assert_eq!(dir_attr.mode, 0o755);
    assert_eq!(dir_attr.nlink, 2);

    let file_attr = client
        .mds()
        .create("/a/f", 0o644, 0, 0, 1, CHUNK_SIZE)
        .await
        .unwrap();
    assert_eq!(file_attr.file_type, FileType::File);

    let new_size = client.write(file_attr.inode_id, 0, b"hello").await.unwrap();
    assert_eq!(new_size, 5);
    assert_eq!(client.mds().getattr(file_attr.inode_id).await.unwrap().size, 5);

    let data = client.read(file_attr.inode_id, 1, 3).await.unwrap();
    assert_eq!(&data, b"ell");
}

#[tokio::test]
async fn test_write_spanning_chunk_boundary() {
    let disk_dir = tempdir().unwrap();
    let db_dir = tempdir().unwrap();

    let storage = real_service(disk_dir.path(), "disk-01");
    let storage_addr = spawn_storage_server(storage).await;
    let mds_addr = spawn_mds(vec![storage_node_info("n1", storage_addr)], db_dir.path()).await;

    let client = FileClient::new(MdsClient::new(&mds_addr.to_string()));
    let attr = client
        .mds()
        .create("/f", 0o644, 0, 0, 1, CHUNK_SIZE)
        .await
        .unwrap();

    // Straddle the first chunk boundary.
    let offset = CHUNK_SIZE - 2;
    let payload = b"boundary!";
    client.write(attr.inode_id, offset, payload).await.unwrap();

    let layout = client
        .mds()
        .get_layout(attr.inode_id, offset, payload.len() as u64)
        .await
        .unwrap();
    assert_eq!(layout.chunks.len(), 2);

    let read = client
        .read(attr.inode_id, offset, payload.len() as u64)
        .await
        .unwrap();
    assert_eq!(&read, payload);

    // A hole before the written range reads as zeroes.
    let with_hole = client.read(attr.inode_id, offset - 4, 6).await.unwrap();
    assert_eq!(&with_hole, b"\0\0\0\0bo");
}

#[tokio::test]
async fn test_namespace_operations_over_rpc() {
    let disk_dir = tempdir().unwrap();
    let db_dir = tempdir().unwrap();

    let storage = real_service(disk_dir.path(), "disk-01");
    let storage_addr = spawn_storage_server(storage).await;
    let mds_addr = spawn_mds(vec![storage_node_info("n1", storage_addr)], db_dir.path()).await;
    let mds = MdsClient::new(&mds_addr.to_string());

    mds.mkdir("/dir", 0o755, 0, 0).await.unwrap();
    mds.create("/dir/f", 0o644, 0, 0, 0, 0).await.unwrap();

    let entries = mds.readdir("/dir").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "f");

    let (handle, attr) = mds.open("/dir/f", 0).await.unwrap();
    assert!(handle > 0);
    mds.close(handle).await.unwrap();

    mds.rename("/dir/f", "/dir/g").await.unwrap();
    assert!(matches!(mds.lookup("/dir/f").await, Err(TideError::NotFound(_))));
    assert_eq!(mds.lookup("/dir/g").await.unwrap().inode_id, attr.inode_id);

    assert!(matches!(mds.rmdir("/dir").await, Err(TideError::NotEmpty(_))));
    mds.unlink("/dir/g").await.unwrap();
    mds.rmdir("/dir").await.unwrap();
    assert!(matches!(mds.lookup("/dir").await, Err(TideError::NotFound(_))));
}
