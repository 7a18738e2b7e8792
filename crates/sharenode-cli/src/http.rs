//! HTTP implementations of the backend collaborators.

use async_trait::async_trait;
use sharenode_core::{
    ApiError, FileInfo, ShareApi, ShareGrant, UploadEvent, UploadRequest, Uploader,
};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

const UPLOAD_CHUNK: usize = 256 * 1024;

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

#[derive(Debug, Deserialize)]
struct ShareCreatedBody {
    #[serde(rename = "shareHash")]
    share_id: String,
    #[serde(rename = "ownerHash")]
    owner_credential: String,
}

#[derive(Debug, Deserialize)]
struct FileInfoBody {
    filename: String,
    size: u64,
    #[serde(rename = "fileType", default)]
    file_type: String,
}

#[derive(Clone)]
pub struct HttpShareApi {
    base_url: String,
    http: reqwest::Client,
}

impl HttpShareApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ShareApi for HttpShareApi {
    async fn create_share(&self, file_name: &str, file_size: u64) -> Result<ShareGrant, ApiError> {
        let response = self
            .http
            .post(format!("{}/file/share", self.base_url))
            .json(&serde_json::json!({ "filename": file_name, "size": file_size }))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(ApiError::Rejected(response.status().to_string()));
        }
        let body: ShareCreatedBody = response.json().await.map_err(transport)?;
        Ok(ShareGrant {
            share_id: body.share_id,
            owner_credential: body.owner_credential,
        })
    }

    async fn revoke_share(&self, share_id: &str, owner_credential: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/file/unshare", self.base_url))
            .json(&serde_json::json!({
                "shareHash": share_id,
                "ownerHash": owner_credential,
            }))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(ApiError::Rejected(response.status().to_string()));
        }
        Ok(())
    }

    async fn get_file_info(&self, share_id: &str) -> Result<Option<FileInfo>, ApiError> {
        let response = self
            .http
            .get(format!("{}/file/info/{}", self.base_url, share_id))
            .send()
            .await
            .map_err(transport)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ApiError::Rejected(response.status().to_string()));
        }
        let body: FileInfoBody = response.json().await.map_err(transport)?;
        Ok(Some(FileInfo {
            file_name: body.filename,
            file_size: body.size,
            file_type: body.file_type,
        }))
    }
}

/// Multipart upload against the backend's per-stream endpoint. Progress is
/// reported while the file is read; the terminal event follows the response.
#[derive(Clone)]
pub struct HttpUploader {
    base_url: String,
    http: reqwest::Client,
}

impl HttpUploader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn run(
        &self,
        request: &UploadRequest,
        events: &mpsc::Sender<UploadEvent>,
    ) -> anyhow::Result<()> {
        let path = &request.payload.path;
        let total = tokio::fs::metadata(path).await?.len();
        let mut file = tokio::fs::File::open(path).await?;

        let mut content = Vec::with_capacity(total as usize);
        let mut buf = vec![0u8; UPLOAD_CHUNK];
        let mut read = 0u64;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&buf[..n]);
            read += n as u64;
            if total > 0 {
                let percent = (read as f32 / total as f32) * 100.0;
                let _ = events.send(UploadEvent::Progress(percent.min(99.0))).await;
            }
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(content).file_name(file_name));

        let url = format!(
            "{}/file/upload/{}/{}",
            self.base_url, request.share_id, request.stream_id
        );
        let response = self
            .http
            .post(&url)
            .header("X-Owner-Hash", &request.owner_credential)
            .multipart(form)
            .send()
            .await?;
        anyhow::ensure!(
            response.status().is_success(),
            "upload rejected: {}",
            response.status()
        );
        let _ = events.send(UploadEvent::Progress(100.0)).await;
        Ok(())
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, request: UploadRequest, events: mpsc::Sender<UploadEvent>) {
        let uploader = self.clone();
        tokio::spawn(async move {
            match uploader.run(&request, &events).await {
                Ok(()) => {
                    let _ = events.send(UploadEvent::Succeeded).await;
                }
                Err(e) => {
                    tracing::warn!(
                        share_id = %request.share_id,
                        stream_id = %request.stream_id,
                        error = %e,
                        "upload failed"
                    );
                    let _ = events.send(UploadEvent::Failed(e.to_string())).await;
                }
            }
        });
    }
}
