//! Authoritative cluster state.
//!
//! One mutex guards the maps of nodes, groups, and operation records; every
//! heartbeat, health tick, admin command, and snapshot serializes on it.
//! `generation` increments whenever an observable field changes, letting
//! subscribers skip unchanged snapshots. Failover is the sole operation that
//! bumps a group's epoch.

use super::FailureDetector;
use crate::error::{Result, TideError};
use crate::rpc::Heartbeat;
use crate::types::{
    AdminState, DiskReport, Epoch, Generation, NodeHealth, NodeRole, NodeType, NodeView,
    OperationRecord, OperationStatus, OperationType, PowerState,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct DiskState {
    disk_id: String,
    mount_point: String,
    capacity_bytes: u64,
    free_bytes: u64,
    is_healthy: bool,
}

#[derive(Debug, Clone)]
struct NodeState {
    node_id: String,
    node_type: NodeType,
    address: String,
    weight: u32,
    virtual_node_count: u32,
    group_id: String,
    role: NodeRole,
    epoch: Epoch,
    applied_lsn: u64,
    peer_node_id: String,
    peer_address: String,
    sync_ready: bool,
    health: NodeHealth,
    admin: AdminState,
    power: PowerState,
    desired_admin: AdminState,
    desired_power: PowerState,
    last_heartbeat_ms: u64,
    disks: HashMap<String, DiskState>,
}

impl NodeState {
    fn new(node_id: String) -> Self {
        Self {
            node_id,
            node_type: NodeType::Real,
            address: String::new(),
            weight: 1,
            virtual_node_count: 1,
            group_id: String::new(),
            role: NodeRole::Unknown,
            epoch: 1,
            applied_lsn: 0,
            peer_node_id: String::new(),
            peer_address: String::new(),
            sync_ready: false,
            health: NodeHealth::Healthy,
            admin: AdminState::Enabled,
            power: PowerState::On,
            desired_admin: AdminState::Enabled,
            desired_power: PowerState::On,
            last_heartbeat_ms: 0,
            disks: HashMap::new(),
        }
    }

    fn to_view(&self) -> NodeView {
        let mut disks: Vec<DiskReport> = self
            .disks
            .values()
            .map(|d| DiskReport {
                disk_id: d.disk_id.clone(),
                mount_point: d.mount_point.clone(),
                capacity_bytes: d.capacity_bytes,
                free_bytes: d.free_bytes,
                is_healthy: d.is_healthy,
            })
            .collect();
        disks.sort_by(|a, b| a.disk_id.cmp(&b.disk_id));
        NodeView {
            node_id: self.node_id.clone(),
            node_type: self.node_type,
            address: self.address.clone(),
            weight: self.weight,
            virtual_node_count: self.virtual_node_count,
            group_id: self.group_id.clone(),
            role: self.role,
            epoch: self.epoch,
            applied_lsn: self.applied_lsn,
            peer_node_id: self.peer_node_id.clone(),
            peer_address: self.peer_address.clone(),
            sync_ready: self.sync_ready,
            health: self.health,
            admin: self.admin,
            power: self.power,
            desired_admin: self.desired_admin,
            desired_power: self.desired_power,
            last_heartbeat_ms: self.last_heartbeat_ms,
            disks,
        }
    }
}

#[derive(Debug, Clone)]
struct GroupState {
    group_id: String,
    primary_node_id: String,
    secondary_node_id: String,
    epoch: Epoch,
    sync_ready: bool,
}

/// Role/epoch assignment composed for a heartbeat reply.
#[derive(Debug, Clone)]
pub struct HeartbeatAssignment {
    pub generation: Generation,
    pub group_id: String,
    pub assigned_role: NodeRole,
    pub epoch: Epoch,
    pub primary_node_id: String,
    pub primary_address: String,
    pub secondary_node_id: String,
    pub secondary_address: String,
    pub sync_ready: bool,
}

struct Inner {
    generation: Generation,
    next_operation_id: u64,
    nodes: HashMap<String, NodeState>,
    groups: HashMap<String, GroupState>,
    operations: HashMap<String, OperationRecord>,
}

/// Sole mutable authority on membership and roles.
pub struct ClusterState {
    detector: FailureDetector,
    inner: Mutex<Inner>,
}

impl ClusterState {
    pub fn new(detector: FailureDetector) -> Self {
        Self {
            detector,
            inner: Mutex::new(Inner {
                generation: 1,
                next_operation_id: 1,
                nodes: HashMap::new(),
                groups: HashMap::new(),
                operations: HashMap::new(),
            }),
        }
    }

    /// Ingest a heartbeat: insert-or-update the node, make it healthy and
    /// powered on, settle group membership, and compose the assignment.
    pub fn report_heartbeat(&self, heartbeat: &Heartbeat, now_ms: u64) -> HeartbeatAssignment {
        let mut inner = self.inner.lock();
        let stamp = heartbeat.report_ts_ms.max(now_ms);

        let node = inner
            .nodes
            .entry(heartbeat.node_id.clone())
            .or_insert_with(|| {
                info!(node_id = %heartbeat.node_id, "node joined");
                NodeState::new(heartbeat.node_id.clone())
            });
        node.node_type = heartbeat.node_type;
        node.address = heartbeat.address.clone();
        node.weight = heartbeat.weight.max(1);
        node.virtual_node_count = heartbeat.virtual_node_count.max(1);
        node.group_id = if heartbeat.group_id.is_empty() {
            heartbeat.node_id.clone()
        } else {
            heartbeat.group_id.clone()
        };
        node.role = heartbeat.role;
        node.peer_node_id = heartbeat.peer_node_id.clone();
        node.peer_address = heartbeat.peer_address.clone();
        node.applied_lsn = heartbeat.applied_lsn;
        node.last_heartbeat_ms = stamp;
        node.health = NodeHealth::Healthy;
        node.power = PowerState::On;

        node.disks.clear();
        for disk in &heartbeat.disks {
            node.disks.insert(
                disk.disk_id.clone(),
                DiskState {
                    disk_id: disk.disk_id.clone(),
                    mount_point: disk.mount_point.clone(),
                    capacity_bytes: disk.capacity_bytes,
                    free_bytes: disk.free_bytes,
                    is_healthy: disk.is_healthy,
                },
            );
        }

        let group_id = node.group_id.clone();
        let node_id = node.node_id.clone();
        let announced_secondary = heartbeat.role == NodeRole::Secondary;

        ensure_group(&mut inner, &group_id);
        let group = inner.groups.get_mut(&group_id).expect("group just ensured");
        if group.primary_node_id.is_empty() {
            if announced_secondary {
                // The node waits for a peer rather than self-promoting.
                group.secondary_node_id = node_id.clone();
            } else {
                group.primary_node_id = node_id.clone();
            }
        } else if group.primary_node_id != node_id
            && (group.secondary_node_id.is_empty() || group.secondary_node_id == node_id)
        {
            group.secondary_node_id = node_id.clone();
        }

        let mut changed = true;
        reconcile_group(&mut inner, &group_id, &mut changed);
        if changed {
            inner.generation += 1;
        }

        build_assignment(&inner, &node_id)
    }

    /// Scheduled tick: re-evaluate health and power for every node, then run
    /// failover and reconciliation for every group.
    pub fn tick_health(&self, now_ms: u64) -> Generation {
        let mut inner = self.inner.lock();
        let mut changed = false;

        for node in inner.nodes.values_mut() {
            let health = self
                .detector
                .evaluate(now_ms, node.last_heartbeat_ms, node.desired_power);
            if health != node.health {
                if health == NodeHealth::Dead {
                    warn!(node_id = %node.node_id, "node declared dead");
                }
                node.health = health;
                changed = true;
            }

            let original_power = node.power;
            if node.desired_power == PowerState::Off {
                if node.last_heartbeat_ms == 0
                    || now_ms.saturating_sub(node.last_heartbeat_ms) >= self.detector.dead_timeout_ms()
                {
                    node.power = PowerState::Off;
                }
            } else if node.health == NodeHealth::Healthy {
                node.power = PowerState::On;
            }
            if node.power != original_power {
                changed = true;
            }
        }

        let group_ids: Vec<String> = inner.groups.keys().cloned().collect();
        for group_id in &group_ids {
            maybe_failover_group(&mut inner, group_id, &mut changed);
            reconcile_group(&mut inner, group_id, &mut changed);
        }

        if changed {
            inner.generation += 1;
        }
        inner.generation
    }

    pub fn set_admin_state(&self, node_id: &str, admin: AdminState) -> Result<Generation> {
        let mut inner = self.inner.lock();
        let group_id = {
            let node = inner
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| TideError::NodeNotFound(node_id.to_string()))?;
            node.admin = admin;
            node.desired_admin = admin;
            node.group_id.clone()
        };

        let mut changed = true;
        maybe_failover_group(&mut inner, &group_id, &mut changed);
        reconcile_group(&mut inner, &group_id, &mut changed);
        inner.generation += 1;
        Ok(inner.generation)
    }

    pub fn set_desired_power(&self, node_id: &str, power: PowerState) -> Result<Generation> {
        let mut inner = self.inner.lock();
        let group_id = {
            let node = inner
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| TideError::NodeNotFound(node_id.to_string()))?;
            node.desired_power = power;
            node.group_id.clone()
        };

        let mut changed = true;
        maybe_failover_group(&mut inner, &group_id, &mut changed);
        reconcile_group(&mut inner, &group_id, &mut changed);
        inner.generation += 1;
        Ok(inner.generation)
    }

    /// Internal transition used by the lifecycle manager.
    pub fn set_current_power(&self, node_id: &str, power: PowerState) -> Result<Generation> {
        let mut inner = self.inner.lock();
        let group_id = {
            let node = inner
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| TideError::NodeNotFound(node_id.to_string()))?;
            node.power = power;
            node.group_id.clone()
        };

        let mut changed = true;
        maybe_failover_group(&mut inner, &group_id, &mut changed);
        reconcile_group(&mut inner, &group_id, &mut changed);
        inner.generation += 1;
        Ok(inner.generation)
    }

    /// Consistent snapshot of the cluster view. Nodes are omitted when the
    /// caller's view is already current (`generation < min_generation`).
    pub fn snapshot(&self, min_generation: Generation) -> (Generation, Vec<NodeView>) {
        let inner = self.inner.lock();
        if inner.generation < min_generation {
            return (inner.generation, Vec::new());
        }
        let mut nodes: Vec<NodeView> = inner.nodes.values().map(NodeState::to_view).collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        (inner.generation, nodes)
    }

    pub fn get_node(&self, node_id: &str) -> Option<NodeView> {
        let inner = self.inner.lock();
        inner.nodes.get(node_id).map(NodeState::to_view)
    }

    pub fn create_operation(
        &self,
        node_id: &str,
        op_type: OperationType,
        message: &str,
        now_ms: u64,
    ) -> Result<OperationRecord> {
        let mut inner = self.inner.lock();
        if !inner.nodes.contains_key(node_id) {
            return Err(TideError::NodeNotFound(node_id.to_string()));
        }
        let operation_id = format!("op-{}", inner.next_operation_id);
        inner.next_operation_id += 1;
        let record = OperationRecord {
            operation_id: operation_id.clone(),
            node_id: node_id.to_string(),
            op_type,
            status: OperationStatus::Pending,
            message: message.to_string(),
            start_ts_ms: now_ms,
            finish_ts_ms: 0,
        };
        inner.operations.insert(operation_id, record.clone());
        Ok(record)
    }

    pub fn update_operation(
        &self,
        operation_id: &str,
        status: OperationStatus,
        message: &str,
        now_ms: u64,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| TideError::NotFound(format!("operation not found: {}", operation_id)))?;
        record.status = status;
        record.message = message.to_string();
        if status.is_terminal() {
            record.finish_ts_ms = now_ms;
        }
        Ok(())
    }

    pub fn get_operation(&self, operation_id: &str) -> Option<OperationRecord> {
        let inner = self.inner.lock();
        inner.operations.get(operation_id).cloned()
    }
}

fn primary_eligible(node: &NodeState) -> bool {
    node.health == NodeHealth::Healthy
        && node.admin == AdminState::Enabled
        && node.power == PowerState::On
}

fn secondary_eligible(node: &NodeState) -> bool {
    node.health == NodeHealth::Healthy
        && node.power == PowerState::On
        && node.admin != AdminState::Disabled
}

fn ensure_group(inner: &mut Inner, group_id: &str) {
    if !inner.groups.contains_key(group_id) {
        inner.groups.insert(
            group_id.to_string(),
            GroupState {
                group_id: group_id.to_string(),
                primary_node_id: String::new(),
                secondary_node_id: String::new(),
                epoch: 1,
                sync_ready: false,
            },
        );
    }
}

/// Settle membership and propagate role/epoch/sync_ready to every member.
fn reconcile_group(inner: &mut Inner, group_id: &str, changed: &mut bool) {
    let Some(mut group) = inner.groups.get(group_id).cloned() else {
        return;
    };

    if !group.primary_node_id.is_empty() && !inner.nodes.contains_key(&group.primary_node_id) {
        group.primary_node_id.clear();
        *changed = true;
    }
    if !group.secondary_node_id.is_empty() && !inner.nodes.contains_key(&group.secondary_node_id) {
        group.secondary_node_id.clear();
        *changed = true;
    }

    if group.primary_node_id.is_empty() {
        if let Some(candidate) = member_ids_sorted(inner, group_id)
            .into_iter()
            .next()
        {
            group.primary_node_id = candidate;
            *changed = true;
        }
    }

    if group.secondary_node_id.is_empty() {
        if let Some(candidate) = member_ids_sorted(inner, group_id)
            .into_iter()
            .find(|id| *id != group.primary_node_id)
        {
            group.secondary_node_id = candidate;
            *changed = true;
        }
    }

    if group.primary_node_id == group.secondary_node_id {
        group.secondary_node_id.clear();
        *changed = true;
    }

    group.sync_ready = inner
        .nodes
        .get(&group.secondary_node_id)
        .map(secondary_eligible)
        .unwrap_or(false);

    for node in inner.nodes.values_mut() {
        if node.group_id != group_id {
            continue;
        }
        let new_role = if node.node_id == group.primary_node_id {
            NodeRole::Primary
        } else if node.node_id == group.secondary_node_id {
            NodeRole::Secondary
        } else {
            NodeRole::Unknown
        };
        if node.role != new_role {
            node.role = new_role;
            *changed = true;
        }
        if node.epoch != group.epoch {
            node.epoch = group.epoch;
            *changed = true;
        }
        if node.sync_ready != group.sync_ready {
            node.sync_ready = group.sync_ready;
            *changed = true;
        }
    }

    inner.groups.insert(group_id.to_string(), group);
}

/// Swap roles and bump the epoch when the primary lost eligibility and the
/// secondary can take over. Never fails over into an ineligible secondary.
fn maybe_failover_group(inner: &mut Inner, group_id: &str, changed: &mut bool) {
    let Some(group) = inner.groups.get(group_id) else {
        return;
    };
    let primary_ok = inner
        .nodes
        .get(&group.primary_node_id)
        .map(primary_eligible)
        .unwrap_or(false);
    let secondary_ok = inner
        .nodes
        .get(&group.secondary_node_id)
        .map(secondary_eligible)
        .unwrap_or(false);
    if primary_ok || !secondary_ok {
        return;
    }

    let group = inner.groups.get_mut(group_id).expect("group exists");
    info!(
        group_id = %group.group_id,
        old_primary = %group.primary_node_id,
        new_primary = %group.secondary_node_id,
        epoch = group.epoch + 1,
        "group failover"
    );
    std::mem::swap(&mut group.primary_node_id, &mut group.secondary_node_id);
    group.epoch += 1;
    *changed = true;
}

/// Group member ids in deterministic order for elections.
fn member_ids_sorted(inner: &Inner, group_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = inner
        .nodes
        .values()
        .filter(|n| n.group_id == group_id)
        .map(|n| n.node_id.clone())
        .collect();
    ids.sort();
    ids
}

fn build_assignment(inner: &Inner, node_id: &str) -> HeartbeatAssignment {
    let node = &inner.nodes[node_id];
    let mut assignment = HeartbeatAssignment {
        generation: inner.generation,
        group_id: node.group_id.clone(),
        assigned_role: node.role,
        epoch: node.epoch,
        primary_node_id: String::new(),
        primary_address: String::new(),
        secondary_node_id: String::new(),
        secondary_address: String::new(),
        sync_ready: node.sync_ready,
    };

    let Some(group) = inner.groups.get(&node.group_id) else {
        return assignment;
    };
    assignment.epoch = group.epoch;
    assignment.sync_ready = group.sync_ready;
    assignment.primary_node_id = group.primary_node_id.clone();
    assignment.secondary_node_id = group.secondary_node_id.clone();
    if let Some(primary) = inner.nodes.get(&group.primary_node_id) {
        assignment.primary_address = primary.address.clone();
    }
    if let Some(secondary) = inner.nodes.get(&group.secondary_node_id) {
        assignment.secondary_address = secondary.address.clone();
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(node_id: &str, group_id: &str, role: NodeRole, ts: u64) -> Heartbeat {
        Heartbeat {
            node_id: node_id.to_string(),
            node_type: NodeType::Real,
            address: format!("127.0.0.1:9{}", node_id.len()),
            weight: 1,
            virtual_node_count: 1,
            report_ts_ms: ts,
            group_id: group_id.to_string(),
            role,
            peer_node_id: String::new(),
            peer_address: String::new(),
            applied_lsn: 0,
            disks: vec![DiskReport {
                disk_id: "disk-01".to_string(),
                mount_point: String::new(),
                capacity_bytes: 100,
                free_bytes: 50,
                is_healthy: true,
            }],
        }
    }

    fn cluster() -> ClusterState {
        ClusterState::new(FailureDetector::new(100, 300))
    }

    #[test]
    fn test_first_reporter_becomes_primary() {
        let state = cluster();
        let assignment = state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        assert_eq!(assignment.assigned_role, NodeRole::Primary);
        assert_eq!(assignment.epoch, 1);
        assert_eq!(assignment.primary_node_id, "a");
    }

    #[test]
    fn test_second_reporter_becomes_secondary() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        let assignment = state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Unknown, 1001), 1001);
        assert_eq!(assignment.assigned_role, NodeRole::Secondary);
        assert_eq!(assignment.primary_node_id, "a");
        assert_eq!(assignment.secondary_node_id, "b");
    }

    #[test]
    fn test_announced_secondary_waits_for_peer() {
        let state = cluster();
        let assignment =
            state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Secondary, 1000), 1000);
        assert_eq!(assignment.assigned_role, NodeRole::Secondary);
        assert!(assignment.primary_node_id.is_empty());

        let assignment = state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1001), 1001);
        assert_eq!(assignment.assigned_role, NodeRole::Primary);
        assert_eq!(assignment.secondary_node_id, "b");
    }

    #[test]
    fn test_sync_ready_with_healthy_secondary() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Unknown, 1001), 1001);
        let (_, nodes) = state.snapshot(0);
        assert!(nodes.iter().all(|n| n.sync_ready));
    }

    #[test]
    fn test_failover_on_dead_primary() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Unknown, 1000), 1000);

        // Keep b alive, let a cross the dead timeout.
        state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Secondary, 1350), 1350);
        state.tick_health(1400);

        let a = state.get_node("a").unwrap();
        let b = state.get_node("b").unwrap();
        assert_eq!(a.health, NodeHealth::Dead);
        assert_eq!(a.role, NodeRole::Secondary);
        assert_eq!(b.role, NodeRole::Primary);
        assert_eq!(b.epoch, 2);
    }

    #[test]
    fn test_no_failover_into_ineligible_secondary() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Unknown, 1000), 1000);

        // Both cross the dead timeout: roles must not swap, epoch must hold.
        state.tick_health(2000);
        let a = state.get_node("a").unwrap();
        let b = state.get_node("b").unwrap();
        assert_eq!(a.role, NodeRole::Primary);
        assert_eq!(b.role, NodeRole::Secondary);
        assert_eq!(a.epoch, 1);
    }

    #[test]
    fn test_returning_primary_demoted_with_new_epoch() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Unknown, 1350), 1350);
        state.tick_health(1400);

        // Until a returns, the new primary must not wait on it.
        let reply = state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Primary, 1450), 1450);
        assert!(!reply.sync_ready);

        // a comes back and learns it is now the secondary at epoch 2.
        let assignment = state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Primary, 1500), 1500);
        assert_eq!(assignment.assigned_role, NodeRole::Secondary);
        assert_eq!(assignment.epoch, 2);
        assert_eq!(assignment.primary_node_id, "b");
        assert!(assignment.sync_ready);
    }

    #[test]
    fn test_generation_monotonic() {
        let state = cluster();
        let mut last = 0;
        for ts in [1000u64, 1010, 1020] {
            let assignment = state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, ts), ts);
            assert!(assignment.generation >= last);
            last = assignment.generation;
        }
        assert!(state.tick_health(1030) >= last);
    }

    #[test]
    fn test_snapshot_skips_unchanged_generation() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        let (generation, nodes) = state.snapshot(0);
        assert!(!nodes.is_empty());

        let (same_generation, empty) = state.snapshot(generation + 1);
        assert_eq!(same_generation, generation);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_admin_disable_triggers_failover() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        state.report_heartbeat(&heartbeat("b", "g1", NodeRole::Unknown, 1000), 1000);

        state.set_admin_state("a", AdminState::Disabled).unwrap();
        let a = state.get_node("a").unwrap();
        let b = state.get_node("b").unwrap();
        assert_eq!(b.role, NodeRole::Primary);
        assert_eq!(b.epoch, 2);
        // Disabled nodes cannot serve as secondary either.
        assert_eq!(a.role, NodeRole::Secondary);
        assert!(!b.sync_ready);
    }

    #[test]
    fn test_admin_state_unknown_node() {
        let state = cluster();
        assert!(matches!(
            state.set_admin_state("ghost", AdminState::Disabled),
            Err(TideError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_desired_power_off_silences_detector() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);
        state.set_desired_power("a", PowerState::Off).unwrap();

        state.tick_health(5000);
        let a = state.get_node("a").unwrap();
        assert_eq!(a.health, NodeHealth::Healthy);
        assert_eq!(a.power, PowerState::Off);
    }

    #[test]
    fn test_operation_lifecycle() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 1000);

        let op = state
            .create_operation("a", OperationType::Stop, "maintenance", 1000)
            .unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.operation_id, "op-1");

        state
            .update_operation(&op.operation_id, OperationStatus::Running, "running", 1001)
            .unwrap();
        let running = state.get_operation(&op.operation_id).unwrap();
        assert_eq!(running.status, OperationStatus::Running);
        assert_eq!(running.finish_ts_ms, 0);

        state
            .update_operation(&op.operation_id, OperationStatus::Succeeded, "done", 1002)
            .unwrap();
        let done = state.get_operation(&op.operation_id).unwrap();
        assert_eq!(done.finish_ts_ms, 1002);
    }

    #[test]
    fn test_operation_for_unknown_node() {
        let state = cluster();
        assert!(state
            .create_operation("ghost", OperationType::Start, "", 0)
            .is_err());
    }

    #[test]
    fn test_heartbeat_stamp_uses_max_of_report_and_now() {
        let state = cluster();
        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 5000), 1000);
        assert_eq!(state.get_node("a").unwrap().last_heartbeat_ms, 5000);

        state.report_heartbeat(&heartbeat("a", "g1", NodeRole::Unknown, 1000), 6000);
        assert_eq!(state.get_node("a").unwrap().last_heartbeat_ms, 6000);
    }
}
