//! Client for the metadata service.

use super::{build_http_client, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{Result, TideError};
use crate::rpc::{
    AttrReply, CloseRequest, CommitWriteRequest, CreateRequest, GetattrRequest, LayoutReply,
    LayoutRequest, MkdirRequest, OpenReply, OpenRequest, PathRequest, ReaddirReply, RenameRequest,
    StatusReply,
};
use crate::types::{Dentry, FileLayout, HandleId, InodeAttr, InodeId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct MdsClient {
    base_url: String,
    http: reqwest::Client,
}

impl MdsClient {
    pub fn new(address: &str) -> Self {
        Self::with_timeouts(address, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(address: &str, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            base_url: format!("http://{}", address),
            http: build_http_client(connect_timeout, request_timeout),
        }
    }

    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.http.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    pub async fn lookup(&self, path: &str) -> Result<InodeAttr> {
        let reply: AttrReply = self
            .post("mds/lookup", &PathRequest { path: path.to_string() })
            .await?;
        reply.status.into_result()?;
        reply
            .attr
            .ok_or_else(|| TideError::Internal("lookup reply missing attr".to_string()))
    }

    pub async fn getattr(&self, inode_id: InodeId) -> Result<InodeAttr> {
        let reply: AttrReply = self.post("mds/getattr", &GetattrRequest { inode_id }).await?;
        reply.status.into_result()?;
        reply
            .attr
            .ok_or_else(|| TideError::Internal("getattr reply missing attr".to_string()))
    }

    pub async fn open(&self, path: &str, flags: u32) -> Result<(HandleId, InodeAttr)> {
        let reply: OpenReply = self
            .post("mds/open", &OpenRequest { path: path.to_string(), flags })
            .await?;
        reply.status.into_result()?;
        let attr = reply
            .attr
            .ok_or_else(|| TideError::Internal("open reply missing attr".to_string()))?;
        Ok((reply.handle_id, attr))
    }

    pub async fn close(&self, handle_id: HandleId) -> Result<()> {
        let reply: StatusReply = self.post("mds/close", &CloseRequest { handle_id }).await?;
        reply.status.into_result()
    }

    pub async fn create(
        &self,
        path: &str,
        mode: u32,
        uid: u32,
        gid: u32,
        replica: u32,
        chunk_size: u64,
    ) -> Result<InodeAttr> {
        let reply: AttrReply = self
            .post(
                "mds/create",
                &CreateRequest { path: path.to_string(), mode, uid, gid, replica, chunk_size },
            )
            .await?;
        reply.status.into_result()?;
        reply
            .attr
            .ok_or_else(|| TideError::Internal("create reply missing attr".to_string()))
    }

    pub async fn mkdir(&self, path: &str, mode: u32, uid: u32, gid: u32) -> Result<InodeAttr> {
        let reply: AttrReply = self
            .post("mds/mkdir", &MkdirRequest { path: path.to_string(), mode, uid, gid })
            .await?;
        reply.status.into_result()?;
        reply
            .attr
            .ok_or_else(|| TideError::Internal("mkdir reply missing attr".to_string()))
    }

    pub async fn readdir(&self, path: &str) -> Result<Vec<Dentry>> {
        let reply: ReaddirReply = self
            .post("mds/readdir", &PathRequest { path: path.to_string() })
            .await?;
        reply.status.into_result()?;
        Ok(reply.entries)
    }

    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let reply: StatusReply = self
            .post(
                "mds/rename",
                &RenameRequest { old_path: old_path.to_string(), new_path: new_path.to_string() },
            )
            .await?;
        reply.status.into_result()
    }

    pub async fn unlink(&self, path: &str) -> Result<()> {
        let reply: StatusReply = self
            .post("mds/unlink", &PathRequest { path: path.to_string() })
            .await?;
        reply.status.into_result()
    }

    pub async fn rmdir(&self, path: &str) -> Result<()> {
        let reply: StatusReply = self
            .post("mds/rmdir", &PathRequest { path: path.to_string() })
            .await?;
        reply.status.into_result()
    }

    pub async fn allocate_write(&self, inode_id: InodeId, offset: u64, size: u64) -> Result<FileLayout> {
        let reply: LayoutReply = self
            .post("mds/allocate_write", &LayoutRequest { inode_id, offset, size })
            .await?;
        reply.status.into_result()?;
        reply
            .layout
            .ok_or_else(|| TideError::Internal("allocate_write reply missing layout".to_string()))
    }

    pub async fn get_layout(&self, inode_id: InodeId, offset: u64, size: u64) -> Result<FileLayout> {
        let reply: LayoutReply = self
            .post("mds/get_layout", &LayoutRequest { inode_id, offset, size })
            .await?;
        reply.status.into_result()?;
        reply
            .layout
            .ok_or_else(|| TideError::Internal("get_layout reply missing layout".to_string()))
    }

    pub async fn commit_write(&self, inode_id: InodeId, new_size: u64) -> Result<()> {
        let reply: StatusReply = self
            .post("mds/commit_write", &CommitWriteRequest { inode_id, new_size })
            .await?;
        reply.status.into_result()
    }

    async fn post<Req: Serialize, Reply: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: &Req,
    ) -> Result<Reply> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.http.post(&url).json(request).send().await?;
        Ok(response.json().await?)
    }
}
