//! Administrative node lifecycle: start, stop, reboot.
//!
//! Operations drive the node's admin/power axes around a pluggable actuator.
//! Stop: drain, actuate, then disable with power off. Start: enable with
//! power starting; the node returns to `on` through its own heartbeat.
//! Reboot: drain with power stopping, actuate, then enable with power
//! starting. Every operation materializes as a record moving
//! `pending -> running -> succeeded | failed`.

use super::ClusterState;
use crate::error::{Result, TideError};
use crate::types::{AdminState, OperationRecord, OperationStatus, OperationType, PowerState};
use crate::util::now_ms;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one actuator invocation.
#[derive(Debug, Clone)]
pub struct ActuatorResult {
    pub success: bool,
    pub message: String,
}

/// Executes the node-level side effect of an administrative operation.
pub trait NodeActuator: Send + Sync {
    fn start_node(&self, node_id: &str, address: &str) -> ActuatorResult;
    fn stop_node(&self, node_id: &str, address: &str, force: bool) -> ActuatorResult;
    fn reboot_node(&self, node_id: &str, address: &str) -> ActuatorResult;
}

/// Shell-command actuator with `{node_id}`, `{address}`, `{force}`
/// substitution. An empty template is an accepted no-op.
pub struct ShellActuator {
    start_template: String,
    stop_template: String,
    reboot_template: String,
}

impl ShellActuator {
    pub fn new(start_template: String, stop_template: String, reboot_template: String) -> Self {
        Self { start_template, stop_template, reboot_template }
    }

    fn execute(&self, template: &str, node_id: &str, address: &str, force: bool) -> ActuatorResult {
        if template.is_empty() {
            return ActuatorResult {
                success: true,
                message: "no command template configured, operation accepted".to_string(),
            };
        }
        let cmd = template
            .replace("{node_id}", node_id)
            .replace("{address}", address)
            .replace("{force}", if force { "true" } else { "false" });

        match std::process::Command::new("sh").arg("-c").arg(&cmd).status() {
            Ok(status) if status.success() => ActuatorResult {
                success: true,
                message: format!("command executed: {}", cmd),
            },
            Ok(status) => ActuatorResult {
                success: false,
                message: format!("command failed with exit code {:?}: {}", status.code(), cmd),
            },
            Err(e) => ActuatorResult {
                success: false,
                message: format!("failed to spawn command: {}", e),
            },
        }
    }
}

impl NodeActuator for ShellActuator {
    fn start_node(&self, node_id: &str, address: &str) -> ActuatorResult {
        self.execute(&self.start_template, node_id, address, false)
    }

    fn stop_node(&self, node_id: &str, address: &str, force: bool) -> ActuatorResult {
        self.execute(&self.stop_template, node_id, address, force)
    }

    fn reboot_node(&self, node_id: &str, address: &str) -> ActuatorResult {
        self.execute(&self.reboot_template, node_id, address, false)
    }
}

pub struct LifecycleManager {
    state: Arc<ClusterState>,
    actuator: Box<dyn NodeActuator>,
}

impl LifecycleManager {
    pub fn new(state: Arc<ClusterState>, actuator: Box<dyn NodeActuator>) -> Self {
        Self { state, actuator }
    }

    pub fn start_node(&self, node_id: &str, reason: &str) -> Result<OperationRecord> {
        self.run_operation(node_id, OperationType::Start, false, reason)
    }

    pub fn stop_node(&self, node_id: &str, force: bool, reason: &str) -> Result<OperationRecord> {
        self.run_operation(node_id, OperationType::Stop, force, reason)
    }

    pub fn reboot_node(&self, node_id: &str, reason: &str) -> Result<OperationRecord> {
        self.run_operation(node_id, OperationType::Reboot, false, reason)
    }

    fn run_operation(
        &self,
        node_id: &str,
        op_type: OperationType,
        force: bool,
        reason: &str,
    ) -> Result<OperationRecord> {
        let node = self
            .state
            .get_node(node_id)
            .ok_or_else(|| TideError::NodeNotFound(node_id.to_string()))?;

        let operation = self
            .state
            .create_operation(node_id, op_type, reason, now_ms())?;
        info!(
            operation_id = %operation.operation_id,
            node_id,
            op = ?op_type,
            "starting node operation"
        );

        match op_type {
            OperationType::Stop => {
                self.state.set_admin_state(node_id, AdminState::Draining)?;
                self.state.set_desired_power(node_id, PowerState::Off)?;
                self.state.set_current_power(node_id, PowerState::Stopping)?;
            }
            OperationType::Start => {
                self.state.set_desired_power(node_id, PowerState::On)?;
                self.state.set_current_power(node_id, PowerState::Starting)?;
                self.state.set_admin_state(node_id, AdminState::Enabled)?;
            }
            OperationType::Reboot => {
                self.state.set_desired_power(node_id, PowerState::On)?;
                self.state.set_current_power(node_id, PowerState::Stopping)?;
                self.state.set_admin_state(node_id, AdminState::Draining)?;
            }
        }

        self.state.update_operation(
            &operation.operation_id,
            OperationStatus::Running,
            reason,
            now_ms(),
        )?;

        let result = match op_type {
            OperationType::Start => self.actuator.start_node(node_id, &node.address),
            OperationType::Stop => self.actuator.stop_node(node_id, &node.address, force),
            OperationType::Reboot => self.actuator.reboot_node(node_id, &node.address),
        };

        if !result.success {
            warn!(
                operation_id = %operation.operation_id,
                node_id,
                message = %result.message,
                "node operation failed"
            );
            self.state.update_operation(
                &operation.operation_id,
                OperationStatus::Failed,
                &result.message,
                now_ms(),
            )?;
            return self
                .state
                .get_operation(&operation.operation_id)
                .ok_or_else(|| TideError::Internal("operation record vanished".to_string()));
        }

        match op_type {
            OperationType::Stop => {
                self.state.set_current_power(node_id, PowerState::Off)?;
                self.state.set_admin_state(node_id, AdminState::Disabled)?;
            }
            OperationType::Start => {
                // Stays `starting`; the node's next heartbeat flips it on.
                self.state.set_current_power(node_id, PowerState::Starting)?;
            }
            OperationType::Reboot => {
                self.state.set_current_power(node_id, PowerState::Starting)?;
                self.state.set_admin_state(node_id, AdminState::Enabled)?;
            }
        }

        self.state.update_operation(
            &operation.operation_id,
            OperationStatus::Succeeded,
            &result.message,
            now_ms(),
        )?;
        self.state
            .get_operation(&operation.operation_id)
            .ok_or_else(|| TideError::Internal("operation record vanished".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::Heartbeat;
    use crate::scheduler::FailureDetector;
    use crate::types::{NodeRole, NodeType};

    struct RecordingActuator {
        succeed: bool,
    }

    impl NodeActuator for RecordingActuator {
        fn start_node(&self, _node_id: &str, _address: &str) -> ActuatorResult {
            ActuatorResult { success: self.succeed, message: "start".to_string() }
        }
        fn stop_node(&self, _node_id: &str, _address: &str, _force: bool) -> ActuatorResult {
            ActuatorResult { success: self.succeed, message: "stop".to_string() }
        }
        fn reboot_node(&self, _node_id: &str, _address: &str) -> ActuatorResult {
            ActuatorResult { success: self.succeed, message: "reboot".to_string() }
        }
    }

    fn cluster_with_node(node_id: &str) -> Arc<ClusterState> {
        let state = Arc::new(ClusterState::new(FailureDetector::new(100, 300)));
        state.report_heartbeat(
            &Heartbeat {
                node_id: node_id.to_string(),
                node_type: NodeType::Real,
                address: "127.0.0.1:9501".to_string(),
                weight: 1,
                virtual_node_count: 1,
                report_ts_ms: 1000,
                group_id: String::new(),
                role: NodeRole::Unknown,
                peer_node_id: String::new(),
                peer_address: String::new(),
                applied_lsn: 0,
                disks: Vec::new(),
            },
            1000,
        );
        state
    }

    #[test]
    fn test_stop_disables_and_powers_off() {
        let state = cluster_with_node("a");
        let manager = LifecycleManager::new(state.clone(), Box::new(RecordingActuator { succeed: true }));

        let op = manager.stop_node("a", false, "maintenance").unwrap();
        assert_eq!(op.status, OperationStatus::Succeeded);
        assert!(op.finish_ts_ms >= op.start_ts_ms);

        let node = state.get_node("a").unwrap();
        assert_eq!(node.admin, AdminState::Disabled);
        assert_eq!(node.power, PowerState::Off);
        assert_eq!(node.desired_power, PowerState::Off);
    }

    #[test]
    fn test_start_leaves_node_starting() {
        let state = cluster_with_node("a");
        let manager = LifecycleManager::new(state.clone(), Box::new(RecordingActuator { succeed: true }));
        manager.stop_node("a", false, "").unwrap();

        let op = manager.start_node("a", "bring back").unwrap();
        assert_eq!(op.status, OperationStatus::Succeeded);

        let node = state.get_node("a").unwrap();
        assert_eq!(node.admin, AdminState::Enabled);
        assert_eq!(node.power, PowerState::Starting);
        assert_eq!(node.desired_power, PowerState::On);
    }

    #[test]
    fn test_reboot_reenables() {
        let state = cluster_with_node("a");
        let manager = LifecycleManager::new(state.clone(), Box::new(RecordingActuator { succeed: true }));

        let op = manager.reboot_node("a", "kernel update").unwrap();
        assert_eq!(op.status, OperationStatus::Succeeded);

        let node = state.get_node("a").unwrap();
        assert_eq!(node.admin, AdminState::Enabled);
        assert_eq!(node.power, PowerState::Starting);
    }

    #[test]
    fn test_failed_actuator_marks_operation_failed() {
        let state = cluster_with_node("a");
        let manager = LifecycleManager::new(state.clone(), Box::new(RecordingActuator { succeed: false }));

        let op = manager.stop_node("a", true, "").unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert!(op.finish_ts_ms > 0);

        // The drain happened before the actuator ran and is not undone.
        let node = state.get_node("a").unwrap();
        assert_eq!(node.admin, AdminState::Draining);
    }

    #[test]
    fn test_unknown_node_rejected() {
        let state = cluster_with_node("a");
        let manager = LifecycleManager::new(state, Box::new(RecordingActuator { succeed: true }));
        assert!(matches!(
            manager.start_node("ghost", ""),
            Err(TideError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_shell_actuator_empty_template_is_noop() {
        let actuator = ShellActuator::new(String::new(), String::new(), String::new());
        let result = actuator.start_node("a", "127.0.0.1:1");
        assert!(result.success);
    }

    #[test]
    fn test_shell_actuator_substitutes_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let actuator = ShellActuator::new(
            String::new(),
            format!("echo {{node_id}} {{address}} {{force}} > {}", out.display()),
            String::new(),
        );
        let result = actuator.stop_node("n7", "10.0.0.1:9500", true);
        assert!(result.success);
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.trim(), "n7 10.0.0.1:9500 true");
    }

    #[test]
    fn test_shell_actuator_reports_failure() {
        let actuator = ShellActuator::new("exit 3".to_string(), String::new(), String::new());
        let result = actuator.start_node("a", "addr");
        assert!(!result.success);
        assert!(result.message.contains("exit code"));
    }
}
