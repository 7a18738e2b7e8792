//! Collaborator seams. The backend share API and the HTTP upload machinery
//! live outside this crate; the core only consumes these contracts.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::share::FilePayload;

/// What the backend hands back when a share is created: the public identifier
/// and the private proof of ownership required for heartbeat and revocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareGrant {
    pub share_id: String,
    pub owner_credential: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
}

#[async_trait]
pub trait ShareApi: Send + Sync {
    async fn create_share(&self, file_name: &str, file_size: u64) -> Result<ShareGrant, ApiError>;

    async fn revoke_share(&self, share_id: &str, owner_credential: &str) -> Result<(), ApiError>;

    async fn get_file_info(&self, share_id: &str) -> Result<Option<FileInfo>, ApiError>;
}

/// Progress report from an in-flight upload. Exactly one terminal event
/// (`Succeeded` or `Failed`) follows zero or more `Progress` events.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Percent complete in `[0, 100]`.
    Progress(f32),
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub payload: FilePayload,
    pub share_id: String,
    pub stream_id: String,
    pub owner_credential: String,
}

/// Fire-and-forget upload operation. Implementations spawn the transfer and
/// report through `events`; the caller never awaits completion directly.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, request: UploadRequest, events: mpsc::Sender<UploadEvent>);
}
