//! Primary -> secondary replication over real HTTP servers: synchronous
//! forwarding, role fencing, epoch fencing, and forward-failure semantics.

mod common;

use common::{real_service, replication_config, spawn_storage_server};
use tempfile::tempdir;
use tidefs::client::StorageClient;
use tidefs::error::TideError;
use tidefs::rpc::{HeartbeatReply, SchedStatus, StorageCode, WriteChunkReply};
use tidefs::types::NodeRole;

fn assignment_for(
    node_role: NodeRole,
    epoch: u64,
    primary: (&str, &str),
    secondary: (&str, &str),
) -> HeartbeatReply {
    HeartbeatReply {
        status: SchedStatus::ok(),
        generation: 1,
        group_id: "g1".to_string(),
        assigned_role: node_role,
        epoch,
        primary_node_id: primary.0.to_string(),
        primary_address: primary.1.to_string(),
        secondary_node_id: secondary.0.to_string(),
        secondary_address: secondary.1.to_string(),
        sync_ready: true,
    }
}

#[tokio::test]
async fn test_primary_forwards_to_secondary() {
    let primary_dir = tempdir().unwrap();
    let secondary_dir = tempdir().unwrap();

    let secondary = real_service(secondary_dir.path(), "disk-01");
    secondary.configure_replication(&replication_config("b", false, "a", ""));
    let secondary_addr = spawn_storage_server(secondary.clone()).await;

    let primary = real_service(primary_dir.path(), "disk-01");
    primary.configure_replication(&replication_config(
        "a",
        true,
        "b",
        &secondary_addr.to_string(),
    ));
    let primary_addr = spawn_storage_server(primary.clone()).await;

    let client = StorageClient::new();
    let payload = b"replicated payload".to_vec();
    let written = client
        .write_chunk(&primary_addr.to_string(), "disk-01", "cafe0001", 0, payload.clone())
        .await
        .unwrap();
    assert_eq!(written, payload.len() as u64);

    // The same bytes are readable on the secondary.
    let mirrored = client
        .read_chunk(&secondary_addr.to_string(), "disk-01", "cafe0001", 0, 64)
        .await
        .unwrap();
    assert_eq!(mirrored, payload);

    // Both sides applied exactly one write.
    assert_eq!(primary.applied_lsn(), 1);
    assert_eq!(secondary.applied_lsn(), 1);
}

#[tokio::test]
async fn test_secondary_rejects_client_writes() {
    let dir = tempdir().unwrap();
    let secondary = real_service(dir.path(), "disk-01");
    secondary.configure_replication(&replication_config("b", false, "a", ""));
    let addr = spawn_storage_server(secondary).await;

    let client = StorageClient::new();
    let err = client
        .write_chunk(&addr.to_string(), "disk-01", "cafe0001", 0, b"data".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, TideError::NotLeader { .. }));
}

#[tokio::test]
async fn test_stale_forward_fenced_and_catchup_accepted() {
    let dir = tempdir().unwrap();
    let secondary = real_service(dir.path(), "disk-01");
    secondary.configure_replication(&replication_config("b", false, "a", ""));
    secondary.apply_assignment(&assignment_for(
        NodeRole::Secondary,
        2,
        ("a", "127.0.0.1:1"),
        ("b", "127.0.0.1:2"),
    ));
    let addr = spawn_storage_server(secondary.clone()).await;

    let http = reqwest::Client::new();

    // A delayed forward from a deposed primary carries the old epoch.
    let url = format!(
        "http://{}/chunks/disk-01/cafe0001?offset=0&replication=true&epoch=1",
        addr
    );
    let reply: WriteChunkReply = http
        .put(&url)
        .body(b"stale".to_vec())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply.status.code, StorageCode::StaleEpoch);

    // The current epoch is accepted.
    let url = format!(
        "http://{}/chunks/disk-01/cafe0001?offset=0&replication=true&epoch=2",
        addr
    );
    let reply: WriteChunkReply = http
        .put(&url)
        .body(b"fresh".to_vec())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply.status.code, StorageCode::Ok);

    // A higher epoch advances the lagging secondary.
    let url = format!(
        "http://{}/chunks/disk-01/cafe0001?offset=0&replication=true&epoch=5",
        addr
    );
    let reply: WriteChunkReply = http
        .put(&url)
        .body(b"newer".to_vec())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply.status.code, StorageCode::Ok);
    assert_eq!(secondary.repl_snapshot().epoch, 5);
}

#[tokio::test]
async fn test_forward_failure_surfaces_without_rollback() {
    // Reserve a port and release it so the forward target refuses.
    let dead_addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let dir = tempdir().unwrap();
    let primary = real_service(dir.path(), "disk-01");
    primary.configure_replication(&replication_config("a", true, "b", &dead_addr.to_string()));
    let addr = spawn_storage_server(primary).await;

    let client = StorageClient::new();
    let err = client
        .write_chunk(&addr.to_string(), "disk-01", "cafe0001", 0, b"doomed?".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, TideError::IoFailed(_)));

    // The local write stuck: the bytes are served from the primary.
    let data = client
        .read_chunk(&addr.to_string(), "disk-01", "cafe0001", 0, 64)
        .await
        .unwrap();
    assert_eq!(data, b"doomed?");
}
