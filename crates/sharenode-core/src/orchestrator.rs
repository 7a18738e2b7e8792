//! Bridges inbound download-request frames to upload operations and registry
//! mutations. One dispatcher task per transfer consumes the upload's event
//! stream; every mutation re-reads live state by correlation key, so late or
//! duplicate events land as no-ops instead of corrupting anything.

use std::sync::Arc;

use gateway_core::Subscription;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{UploadEvent, UploadRequest, Uploader};
use crate::notice::{Notice, REASON_AWAITING_FILE};
use crate::session::{SessionHandle, TransferAdmission};
use crate::share::{TransferKey, TransferStatus};
use crate::wire::DownloadRequest;

const UPLOAD_EVENT_BUFFER: usize = 32;

pub struct Orchestrator {
    session: SessionHandle,
    uploader: Arc<dyn Uploader>,
}

impl Orchestrator {
    pub fn new(session: SessionHandle, uploader: Arc<dyn Uploader>) -> Arc<Self> {
        Arc::new(Self { session, uploader })
    }

    /// Parse-or-reject, then handle. Malformed frames never reach the
    /// registry.
    pub async fn handle_frame(self: &Arc<Self>, body: &str) {
        match DownloadRequest::parse(body) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed download request");
            }
        }
    }

    pub async fn handle_request(self: &Arc<Self>, request: DownloadRequest) {
        let key = request.key();
        match self.session.admit_transfer(&request).await {
            TransferAdmission::UnknownShare => {
                tracing::debug!(
                    share_id = %request.share_id,
                    "download request for unknown share, discarding"
                );
            }
            TransferAdmission::Duplicate => {
                tracing::debug!(
                    share_id = %request.share_id,
                    peer = %request.peer_addr,
                    stream = %request.stream_id,
                    "duplicate download request, discarding"
                );
            }
            TransferAdmission::MissingPayload => {
                tracing::warn!(
                    share_id = %request.share_id,
                    peer = %request.peer_addr,
                    "download request for share awaiting re-selection"
                );
                self.session
                    .notify(Notice::TransferFailed {
                        share_id: request.share_id.clone(),
                        peer_addr: request.peer_addr.clone(),
                        reason: REASON_AWAITING_FILE.to_string(),
                    })
                    .await;
            }
            TransferAdmission::Admitted {
                payload,
                owner_credential,
            } => {
                tracing::info!(
                    share_id = %request.share_id,
                    peer = %request.peer_addr,
                    stream = %request.stream_id,
                    "starting upload"
                );
                self.session
                    .notify(Notice::TransferStarted {
                        share_id: request.share_id.clone(),
                        peer_addr: request.peer_addr.clone(),
                    })
                    .await;

                let (events_tx, events_rx) = mpsc::channel(UPLOAD_EVENT_BUFFER);
                self.uploader
                    .upload(
                        UploadRequest {
                            payload,
                            share_id: request.share_id.clone(),
                            stream_id: request.stream_id.clone(),
                            owner_credential,
                        },
                        events_tx,
                    )
                    .await;

                let session = Arc::clone(&self.session);
                tokio::spawn(dispatch_upload_events(session, key, events_rx));
            }
        }
    }

    /// Pump every frame from a per-share subscription through the handler.
    pub fn spawn_topic_listener(self: &Arc<Self>, mut subscription: Subscription) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(frame) = subscription.recv().await {
                orchestrator.handle_frame(&frame.body).await;
            }
            tracing::debug!(topic = %subscription.topic(), "topic listener ended");
        })
    }
}

/// The single place upload events turn into registry mutations. An upload
/// failure is terminal for its one transfer only; siblings and the parent
/// share are untouched.
async fn dispatch_upload_events(
    session: SessionHandle,
    key: TransferKey,
    mut events: mpsc::Receiver<UploadEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Progress(percent) => {
                session.update_progress(&key, percent).await;
            }
            UploadEvent::Succeeded => {
                if session.update_status(&key, TransferStatus::Succeeded).await {
                    session
                        .notify(Notice::TransferComplete {
                            share_id: key.share_id.clone(),
                            peer_addr: key.peer_addr.clone(),
                        })
                        .await;
                }
                break;
            }
            UploadEvent::Failed(reason) => {
                if session.update_status(&key, TransferStatus::Failed).await {
                    session
                        .notify(Notice::TransferFailed {
                            share_id: key.share_id.clone(),
                            peer_addr: key.peer_addr.clone(),
                            reason,
                        })
                        .await;
                }
                break;
            }
        }
    }
}
