//! Periodic heartbeat reporter.
//!
//! Each tick ships liveness, the live disk report, and the applied LSN to the
//! scheduler, then applies the returned role/epoch assignment to the local
//! replication state. RPC failures are logged and retried next tick; the
//! reporter never takes the node process down with it.

use super::StorageService;
use crate::client::SchedulerClient;
use crate::config::StorageNodeConfig;
use crate::rpc::Heartbeat;
use crate::types::{NodeRole, NodeType};
use crate::util::now_ms;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct HeartbeatReporter {
    scheduler_addr: String,
    node_id: String,
    node_type: NodeType,
    node_address: String,
    group_id: String,
    role: Mutex<NodeRole>,
    peer_node_id: String,
    peer_address: String,
    weight: u32,
    virtual_node_count: u32,
    interval: Duration,
    service: Arc<StorageService>,
    scheduler: SchedulerClient,
}

impl HeartbeatReporter {
    pub fn new(config: &StorageNodeConfig, service: Arc<StorageService>) -> Self {
        let interval_ms = if config.heartbeat_interval_ms == 0 {
            2000
        } else {
            config.heartbeat_interval_ms
        };

        Self {
            scheduler_addr: config.scheduler_addr.clone(),
            node_id: config.node_id.clone(),
            node_type: config.node_type,
            node_address: config.node_address.clone(),
            group_id: config.effective_group_id(),
            role: Mutex::new(config.node_role),
            peer_node_id: config.peer_node_id.clone(),
            peer_address: config.peer_address.clone(),
            weight: config.node_weight.max(1),
            virtual_node_count: config.virtual_node_count.max(1),
            interval: Duration::from_millis(interval_ms),
            service,
            scheduler: SchedulerClient::new(&config.scheduler_addr),
        }
    }

    /// Run until the stop flag flips. One heartbeat per tick.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        info!(
            node_id = %self.node_id,
            scheduler = %self.scheduler_addr,
            interval_ms = self.interval.as_millis() as u64,
            "heartbeat reporter starting"
        );
        loop {
            if *stop.borrow() {
                break;
            }
            self.tick_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.changed() => break,
            }
        }
        info!(node_id = %self.node_id, "heartbeat reporter stopped");
    }

    async fn tick_once(&self) {
        let heartbeat = self.build_heartbeat();
        let reply = match self.scheduler.report_heartbeat(&heartbeat).await {
            Ok(r) => r,
            Err(e) => {
                warn!(scheduler = %self.scheduler_addr, error = %e, "heartbeat rpc failed");
                return;
            }
        };
        if !reply.status.is_ok() {
            warn!(
                scheduler = %self.scheduler_addr,
                message = %reply.status.message,
                "heartbeat rejected"
            );
            return;
        }

        *self.role.lock() = reply.assigned_role;
        self.service.apply_assignment(&reply);
        debug!(
            node_id = %self.node_id,
            role = ?reply.assigned_role,
            epoch = reply.epoch,
            generation = reply.generation,
            "heartbeat applied"
        );
    }

    fn build_heartbeat(&self) -> Heartbeat {
        Heartbeat {
            node_id: self.node_id.clone(),
            node_type: self.node_type,
            address: self.node_address.clone(),
            weight: self.weight,
            virtual_node_count: self.virtual_node_count,
            report_ts_ms: now_ms(),
            group_id: self.group_id.clone(),
            role: *self.role.lock(),
            peer_node_id: self.peer_node_id.clone(),
            peer_address: self.peer_address.clone(),
            applied_lsn: self.service.applied_lsn(),
            disks: self.service.disk_report(),
        }
    }
}
