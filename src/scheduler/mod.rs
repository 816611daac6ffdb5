//! Scheduler subsystem: cluster membership, failure detection, primary and
//! secondary role assignment, and administrative node lifecycle.

pub mod cluster;
pub mod detector;
pub mod lifecycle;
pub mod server;

pub use cluster::{ClusterState, HeartbeatAssignment};
pub use detector::FailureDetector;
pub use lifecycle::{LifecycleManager, NodeActuator, ShellActuator};
pub use server::{router, run_scheduler_server, spawn_tick_task};
