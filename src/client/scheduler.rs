//! Client for the scheduler.

use super::build_http_client;
use crate::error::Result;
use crate::rpc::{
    ClusterViewReply, GenerationReply, Heartbeat, HeartbeatReply, OperationReply,
    RebootNodeRequest, SetAdminStateRequest, StartNodeRequest, StopNodeRequest,
};
use crate::types::{AdminState, Generation};
use std::time::Duration;

const SCHEDULER_RPC_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct SchedulerClient {
    base_url: String,
    http: reqwest::Client,
}

impl SchedulerClient {
    pub fn new(address: &str) -> Self {
        Self {
            base_url: format!("http://{}", address),
            http: build_http_client(SCHEDULER_RPC_TIMEOUT, SCHEDULER_RPC_TIMEOUT),
        }
    }

    pub async fn report_heartbeat(&self, heartbeat: &Heartbeat) -> Result<HeartbeatReply> {
        let url = format!("{}/scheduler/heartbeat", self.base_url);
        let response = self.http.post(&url).json(heartbeat).send().await?;
        Ok(response.json().await?)
    }

    pub async fn cluster_view(&self, min_generation: Generation) -> Result<ClusterViewReply> {
        let url = format!(
            "{}/scheduler/cluster_view?min_generation={}",
            self.base_url, min_generation
        );
        let response = self.http.get(&url).send().await?;
        Ok(response.json().await?)
    }

    pub async fn set_admin_state(&self, node_id: &str, admin: AdminState) -> Result<GenerationReply> {
        let url = format!("{}/scheduler/admin_state", self.base_url);
        let request = SetAdminStateRequest { node_id: node_id.to_string(), admin };
        let response = self.http.post(&url).json(&request).send().await?;
        Ok(response.json().await?)
    }

    pub async fn start_node(&self, node_id: &str, reason: &str) -> Result<OperationReply> {
        let url = format!("{}/scheduler/start_node", self.base_url);
        let request = StartNodeRequest { node_id: node_id.to_string(), reason: reason.to_string() };
        let response = self.http.post(&url).json(&request).send().await?;
        Ok(response.json().await?)
    }

    pub async fn stop_node(&self, node_id: &str, force: bool, reason: &str) -> Result<OperationReply> {
        let url = format!("{}/scheduler/stop_node", self.base_url);
        let request = StopNodeRequest {
            node_id: node_id.to_string(),
            force,
            reason: reason.to_string(),
        };
        let response = self.http.post(&url).json(&request).send().await?;
        Ok(response.json().await?)
    }

    pub async fn reboot_node(&self, node_id: &str, reason: &str) -> Result<OperationReply> {
        let url = format!("{}/scheduler/reboot_node", self.base_url);
        let request = RebootNodeRequest { node_id: node_id.to_string(), reason: reason.to_string() };
        let response = self.http.post(&url).json(&request).send().await?;
        Ok(response.json().await?)
    }

    pub async fn get_operation(&self, operation_id: &str) -> Result<OperationReply> {
        let url = format!("{}/scheduler/operations/{}", self.base_url, operation_id);
        let response = self.http.get(&url).send().await?;
        Ok(response.json().await?)
    }
}
