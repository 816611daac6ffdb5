//! Metadata service subsystem: the persistent metadata store, path and inode
//! operations, the allocatable-node cache, chunk placement, and the optical
//! archive loop.

pub mod allocator;
pub mod archive;
pub mod cache;
pub mod codec;
pub mod schema;
pub mod server;
pub mod service;
pub mod store;

pub use allocator::ChunkAllocator;
pub use archive::{ArchiveManager, ArchiveOptions};
pub use cache::{DiskInfo, NodeInfo, NodeSelection, NodeStateCache};
pub use server::{
    build_node_infos, build_static_node_infos, router, run_mds_server, spawn_archive_task,
    spawn_view_refresher,
};
pub use service::MdsService;
pub use store::MetaStore;
