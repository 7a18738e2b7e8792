//! High-level client wiring the gateway, session, orchestrator and liveness
//! scheduler together behind the collaborator seams.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use gateway_core::{connect_with_retry, ConnectionStatus, Gateway, MessageChannel};
use storage::SnapshotStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::{FileInfo, ShareApi, Uploader};
use crate::config::ClientConfig;
use crate::error::{ApiError, SessionError};
use crate::liveness;
use crate::notice::Notice;
use crate::orchestrator::Orchestrator;
use crate::registry::RegistrySnapshot;
use crate::session::{Session, SessionHandle};
use crate::share::{FilePayload, ShareEntry};
use crate::wire::share_topic;

pub struct ShareClient {
    cfg: ClientConfig,
    session: SessionHandle,
    gateway: Arc<Gateway>,
    channel: Arc<dyn MessageChannel>,
    api: Arc<dyn ShareApi>,
    orchestrator: Arc<Orchestrator>,
    liveness: JoinHandle<()>,
}

impl ShareClient {
    pub fn new(
        cfg: ClientConfig,
        channel: Arc<dyn MessageChannel>,
        api: Arc<dyn ShareApi>,
        uploader: Arc<dyn Uploader>,
        store: Arc<dyn SnapshotStore>,
        notices: mpsc::Sender<Notice>,
    ) -> Arc<Self> {
        let gateway = Gateway::new();
        let session = Session::new(store, notices);
        let orchestrator = Orchestrator::new(Arc::clone(&session), uploader);
        let liveness = liveness::spawn(
            Arc::clone(&session),
            Arc::clone(&gateway),
            cfg.heartbeat_period(),
        );
        Arc::new(Self {
            cfg,
            session,
            gateway,
            channel,
            api,
            orchestrator,
            liveness,
        })
    }

    /// Establish the channel under the configured bounded retry. On
    /// exhaustion the status goes terminal `Error`; shares can still be
    /// created afterwards, but downloads against them go unobserved.
    pub async fn connect(&self) -> Result<()> {
        connect_with_retry(
            &self.gateway,
            self.channel.as_ref(),
            self.cfg.retry_policy(),
        )
        .await
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.gateway.status()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Recover the previous session from storage. Returns how many shares
    /// now await file re-selection.
    pub async fn restore(&self) -> usize {
        self.session.restore().await
    }

    /// Offer a local file: register it with the backend, record the share,
    /// and start observing its topic.
    pub async fn share_file(&self, path: &Path) -> Result<String, SessionError> {
        let (file_name, file_size) = file_identity(path).await?;
        let grant = self.api.create_share(&file_name, file_size).await?;
        let share_id = grant.share_id.clone();

        let entry = ShareEntry::new(file_name.clone(), file_size, grant, FilePayload::new(path));
        self.session.add_share(entry).await;
        self.observe_share(&share_id).await;
        self.session
            .notify(Notice::ShareCreated {
                share_id: share_id.clone(),
                file_name,
            })
            .await;
        tracing::info!(share_id = %share_id, "file shared");
        Ok(share_id)
    }

    /// Withdraw a share. The registry entry is removed only after the
    /// backend acknowledges the revocation.
    pub async fn unshare_file(&self, share_id: &str) -> Result<(), SessionError> {
        let credential = self
            .session
            .owner_credential(share_id)
            .await
            .ok_or_else(|| SessionError::ShareNotFound(share_id.to_string()))?;
        self.api.revoke_share(share_id, &credential).await?;
        self.session.remove_share(share_id).await;
        self.gateway.unsubscribe(&share_topic(share_id)).await;
        tracing::info!(share_id, "share revoked");
        Ok(())
    }

    /// Supply the local file for a recovered share. On an exact name/size
    /// match the payload is attached and a fresh subscription is established
    /// for the share's topic.
    pub async fn reattach(&self, share_id: &str, path: &Path) -> Result<(), SessionError> {
        let (file_name, file_size) = file_identity(path).await?;
        self.session
            .attach_file(share_id, &file_name, file_size, FilePayload::new(path))
            .await?;
        self.observe_share(share_id).await;
        Ok(())
    }

    pub async fn file_info(&self, share_id: &str) -> Result<Option<FileInfo>, ApiError> {
        self.api.get_file_info(share_id).await
    }

    pub fn download_url(&self, share_id: &str) -> String {
        self.cfg.download_url(share_id)
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.session.snapshot().await
    }

    pub async fn shutdown(&self) {
        self.gateway.disconnect().await;
    }

    async fn observe_share(&self, share_id: &str) {
        match self.gateway.subscribe(&share_topic(share_id)).await {
            Some(subscription) => {
                self.orchestrator.spawn_topic_listener(subscription);
            }
            None => {
                tracing::warn!(
                    share_id,
                    "channel not connected, downloads for this share will not be observed"
                );
            }
        }
    }
}

impl Drop for ShareClient {
    fn drop(&mut self) {
        self.liveness.abort();
    }
}

/// Name and size of a local file, the identity pair used for share creation
/// and re-attachment matching.
async fn file_identity(path: &Path) -> Result<(String, u64), SessionError> {
    let meta = tokio::fs::metadata(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;
    Ok((file_name, meta.len()))
}
