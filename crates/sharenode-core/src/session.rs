//! The session owns the registry. Every mutation goes through one of the
//! methods here, which take the lock, apply the change, and mirror the new
//! snapshot to durable storage before returning.

use std::sync::Arc;

use storage::SnapshotStore;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::SessionError;
use crate::notice::Notice;
use crate::registry::{Registry, RegistrySnapshot};
use crate::share::{FilePayload, ShareEntry, TransferEntry, TransferKey, TransferStatus};
use crate::wire::{DownloadRequest, StoredSession};

/// Outcome of the admission check for one inbound download request. The
/// whole decision runs under a single registry lock so concurrent deliveries
/// cannot race each other into duplicate entries.
#[derive(Debug)]
pub enum TransferAdmission {
    /// The share is gone (likely just removed). Expected, not an error.
    UnknownShare,
    /// Same correlation key already tracked: a redelivered notification.
    Duplicate,
    /// Share exists but has no local bytes; recorded as failed immediately.
    MissingPayload,
    /// Transfer registered as in-progress; the upload may start.
    Admitted {
        payload: FilePayload,
        owner_credential: String,
    },
}

pub struct Session {
    registry: Mutex<Registry>,
    store: Arc<dyn SnapshotStore>,
    notices: mpsc::Sender<Notice>,
    revision: watch::Sender<u64>,
}

pub type SessionHandle = Arc<Session>;

impl Session {
    pub fn new(store: Arc<dyn SnapshotStore>, notices: mpsc::Sender<Notice>) -> SessionHandle {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            registry: Mutex::new(Registry::new()),
            store,
            notices,
            revision,
        })
    }

    /// Bumped whenever the set of shares changes; the liveness scheduler
    /// re-arms on it.
    pub fn revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|v| *v += 1);
    }

    pub async fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice).await;
    }

    /// Rebuild the session from the stored snapshot. Every recovered share
    /// comes back without its payload handle and is marked pending; a single
    /// aggregate notice reports how many files need re-selection. A missing,
    /// unreadable, or corrupt snapshot starts an empty session.
    pub async fn restore(&self) -> usize {
        let stored = match self.store.load().await {
            Ok(Some(bytes)) => match StoredSession::decode(&bytes) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(error = %e, "stored session is corrupt, starting empty");
                    return 0;
                }
            },
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored session, starting empty");
                return 0;
            }
        };

        let count = stored.shared_files.len();
        {
            let mut reg = self.registry.lock().await;
            for record in stored.shared_files {
                // No payload can survive a restart: every recovered entry is
                // pending until the user re-selects its file.
                reg.add_share(ShareEntry {
                    file_name: record.file_name,
                    file_size: record.file_size,
                    share_id: record.share_id,
                    owner_credential: record.owner_credential,
                    payload: None,
                    transfers: record.transfers,
                });
            }
        }

        if count > 0 {
            self.bump_revision();
            self.persist().await;
            self.notify(Notice::FilesAwaitingReselection { count }).await;
            tracing::info!(count, "recovered shares, awaiting file re-selection");
        }
        count
    }

    pub async fn add_share(&self, entry: ShareEntry) {
        {
            let mut reg = self.registry.lock().await;
            reg.add_share(entry);
        }
        self.bump_revision();
        self.persist().await;
    }

    pub async fn remove_share(&self, share_id: &str) -> Option<ShareEntry> {
        let removed = {
            let mut reg = self.registry.lock().await;
            reg.remove_share(share_id)
        };
        if removed.is_some() {
            self.bump_revision();
            self.persist().await;
        }
        removed
    }

    /// Steps 1-4 of handling an inbound download request, atomically:
    /// unknown shares and duplicate keys are discarded, a share without bytes
    /// gets an immediately-failed transfer, and an admitted request is
    /// recorded in-progress before any upload starts.
    pub async fn admit_transfer(&self, req: &DownloadRequest) -> TransferAdmission {
        enum Decision {
            Unknown,
            Duplicate,
            NoPayload,
            Start(FilePayload, String),
        }

        let key = req.key();
        let (admission, mutated) = {
            let mut reg = self.registry.lock().await;
            let decision = match reg.share(&req.share_id) {
                None => Decision::Unknown,
                Some(share) if share.transfer(&key).is_some() => Decision::Duplicate,
                Some(share) => match share.payload.clone() {
                    None => Decision::NoPayload,
                    Some(payload) => Decision::Start(payload, share.owner_credential.clone()),
                },
            };
            match decision {
                Decision::Unknown => (TransferAdmission::UnknownShare, false),
                Decision::Duplicate => (TransferAdmission::Duplicate, false),
                Decision::NoPayload => {
                    reg.add_transfer(
                        &req.share_id,
                        TransferEntry::failed(&req.peer_addr, &req.stream_id),
                    );
                    (TransferAdmission::MissingPayload, true)
                }
                Decision::Start(payload, owner_credential) => {
                    reg.add_transfer(
                        &req.share_id,
                        TransferEntry::started(&req.peer_addr, &req.stream_id),
                    );
                    (
                        TransferAdmission::Admitted {
                            payload,
                            owner_credential,
                        },
                        true,
                    )
                }
            }
        };

        if mutated {
            self.persist().await;
        }
        admission
    }

    pub async fn update_progress(&self, key: &TransferKey, progress: f32) -> bool {
        let changed = {
            let mut reg = self.registry.lock().await;
            reg.update_progress(key, progress)
        };
        if changed {
            self.persist().await;
        }
        changed
    }

    pub async fn update_status(&self, key: &TransferKey, status: TransferStatus) -> bool {
        let changed = {
            let mut reg = self.registry.lock().await;
            reg.update_status(key, status)
        };
        if changed {
            self.persist().await;
        }
        changed
    }

    /// Re-attach a local file to a recovered share. The supplied file must
    /// match the recorded name and size exactly; anything else is rejected
    /// with a diagnostic naming both files, and the share stays pending.
    pub async fn attach_file(
        &self,
        share_id: &str,
        actual_name: &str,
        actual_size: u64,
        payload: FilePayload,
    ) -> Result<(), SessionError> {
        let mismatch = {
            let mut reg = self.registry.lock().await;
            let (expected_name, expected_size, awaiting) = {
                let share = reg
                    .share(share_id)
                    .ok_or_else(|| SessionError::ShareNotFound(share_id.to_string()))?;
                (
                    share.file_name.clone(),
                    share.file_size,
                    share.awaiting_payload(),
                )
            };
            if !awaiting {
                return Err(SessionError::NotPending(share_id.to_string()));
            }
            if expected_name == actual_name && expected_size == actual_size {
                if let Some(share) = reg.share_mut(share_id) {
                    share.payload = Some(payload);
                }
                reg.clear_pending(share_id);
                None
            } else {
                Some((expected_name, expected_size))
            }
        };

        match mismatch {
            None => {
                self.persist().await;
                tracing::info!(share_id, "file re-attached");
                Ok(())
            }
            Some((expected_name, expected_size)) => {
                self.notify(Notice::FileMismatch {
                    expected_name: expected_name.clone(),
                    expected_size,
                    actual_name: actual_name.to_string(),
                    actual_size,
                })
                .await;
                Err(SessionError::FileMismatch {
                    expected_name,
                    expected_size,
                    actual_name: actual_name.to_string(),
                    actual_size,
                })
            }
        }
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.registry.lock().await.snapshot()
    }

    pub async fn share_count(&self) -> usize {
        self.registry.lock().await.share_count()
    }

    pub async fn pending_count(&self) -> usize {
        self.registry.lock().await.pending_count()
    }

    pub async fn is_pending(&self, share_id: &str) -> bool {
        self.registry.lock().await.is_pending(share_id)
    }

    pub async fn owner_credential(&self, share_id: &str) -> Option<String> {
        self.registry
            .lock()
            .await
            .share(share_id)
            .map(|s| s.owner_credential.clone())
    }

    pub async fn transfer(&self, key: &TransferKey) -> Option<TransferEntry> {
        self.registry.lock().await.transfer(key).cloned()
    }

    /// Mirror the current snapshot to storage wholesale. Persistence failures
    /// are logged, never fatal: the in-memory session stays authoritative.
    async fn persist(&self) {
        let stored = self.registry.lock().await.snapshot().to_stored();
        let bytes = match stored.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode session snapshot");
                return;
            }
        };
        if let Err(e) = self.store.save(&bytes).await {
            tracing::warn!(error = %e, "failed to persist session snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ShareGrant;
    use storage::MemoryStore;

    fn entry(share_id: &str) -> ShareEntry {
        ShareEntry::new(
            "report.pdf",
            2048,
            ShareGrant {
                share_id: share_id.into(),
                owner_credential: format!("owner-{}", share_id),
            },
            FilePayload::new("/tmp/report.pdf"),
        )
    }

    fn request(share_id: &str, peer: &str, stream: &str) -> DownloadRequest {
        DownloadRequest {
            peer_addr: peer.into(),
            share_id: share_id.into(),
            stream_id: stream.into(),
        }
    }

    async fn new_session() -> (SessionHandle, Arc<MemoryStore>, mpsc::Receiver<Notice>) {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(16);
        let session = Session::new(store.clone(), tx);
        (session, store, rx)
    }

    #[tokio::test]
    async fn test_every_mutation_persists() {
        let (session, store, _rx) = new_session().await;

        session.add_share(entry("s1")).await;
        let stored = StoredSession::decode(&store.load().await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.shared_files.len(), 1);

        session
            .admit_transfer(&request("s1", "10.0.0.5", "str-1"))
            .await;
        let stored = StoredSession::decode(&store.load().await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.shared_files[0].transfers.len(), 1);

        session.remove_share("s1").await;
        let stored = StoredSession::decode(&store.load().await.unwrap().unwrap()).unwrap();
        assert!(stored.shared_files.is_empty());
    }

    #[tokio::test]
    async fn test_restore_marks_every_share_pending() {
        let (session, store, _rx) = new_session().await;
        session.add_share(entry("s1")).await;
        session.add_share(entry("s2")).await;

        // A fresh process over the same store.
        let (tx, mut rx) = mpsc::channel(16);
        let restored = Session::new(store, tx);
        let count = restored.restore().await;

        assert_eq!(count, 2);
        let snap = restored.snapshot().await;
        assert_eq!(snap.shares.len(), 2);
        assert!(snap.shares.iter().all(|s| s.payload.is_none()));
        assert_eq!(snap.pending, vec!["s1".to_string(), "s2".to_string()]);

        // One aggregate notice, not one per file.
        assert_eq!(
            rx.recv().await,
            Some(Notice::FilesAwaitingReselection { count: 2 })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restore_from_empty_store() {
        let (session, _store, _rx) = new_session().await;
        assert_eq!(session.restore().await, 0);
        assert_eq!(session.share_count().await, 0);
        assert_eq!(session.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_restore_accepts_legacy_format() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(br#"[{"filename":"a.txt","size":7,"shareHash":"s1","ownerHash":"o1"}]"#)
            .await
            .unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let session = Session::new(store, tx);
        assert_eq!(session.restore().await, 1);
        assert!(session.is_pending("s1").await);
    }

    #[tokio::test]
    async fn test_admission_outcomes() {
        let (session, _store, _rx) = new_session().await;
        session.add_share(entry("s1")).await;

        assert!(matches!(
            session.admit_transfer(&request("gone", "10.0.0.5", "str-1")).await,
            TransferAdmission::UnknownShare
        ));

        assert!(matches!(
            session.admit_transfer(&request("s1", "10.0.0.5", "str-1")).await,
            TransferAdmission::Admitted { .. }
        ));

        // Redelivery of the same key is suppressed.
        assert!(matches!(
            session.admit_transfer(&request("s1", "10.0.0.5", "str-1")).await,
            TransferAdmission::Duplicate
        ));

        let snap = session.snapshot().await;
        assert_eq!(snap.shares[0].transfers.len(), 1);
    }

    #[tokio::test]
    async fn test_admission_without_payload_records_failure() {
        let (session, _store, _rx) = new_session().await;
        let mut e = entry("s1");
        e.payload = None;
        session.add_share(e).await;

        assert!(matches!(
            session.admit_transfer(&request("s1", "10.0.0.5", "str-1")).await,
            TransferAdmission::MissingPayload
        ));

        let key = request("s1", "10.0.0.5", "str-1").key();
        let transfer = session.transfer(&key).await.unwrap();
        assert_eq!(transfer.status, TransferStatus::Failed);

        // Even the failed entry dedups later deliveries.
        assert!(matches!(
            session.admit_transfer(&request("s1", "10.0.0.5", "str-1")).await,
            TransferAdmission::Duplicate
        ));
    }

    #[tokio::test]
    async fn test_attach_rejects_mismatch_and_stays_pending() {
        let (session, store, _rx) = new_session().await;
        session.add_share(entry("s1")).await;

        let (tx, mut rx) = mpsc::channel(16);
        let restored = Session::new(store, tx);
        restored.restore().await;
        rx.recv().await; // aggregate notice

        // Wrong file, any number of times.
        for _ in 0..3 {
            let result = restored
                .attach_file("s1", "wrong.pdf", 10, FilePayload::new("/tmp/wrong.pdf"))
                .await;
            assert!(matches!(result, Err(SessionError::FileMismatch { .. })));
            assert!(restored.is_pending("s1").await);
            assert!(matches!(
                rx.recv().await,
                Some(Notice::FileMismatch { .. })
            ));
        }

        // The right file clears the pending state.
        restored
            .attach_file("s1", "report.pdf", 2048, FilePayload::new("/tmp/report.pdf"))
            .await
            .unwrap();
        assert!(!restored.is_pending("s1").await);
        assert_eq!(restored.pending_count().await, 0);
        let snap = restored.snapshot().await;
        assert!(snap.shares[0].payload.is_some());
    }

    #[tokio::test]
    async fn test_attach_unknown_or_not_pending() {
        let (session, _store, _rx) = new_session().await;
        session.add_share(entry("s1")).await;

        assert!(matches!(
            session
                .attach_file("nope", "report.pdf", 2048, FilePayload::new("/tmp/x"))
                .await,
            Err(SessionError::ShareNotFound(_))
        ));

        // s1 still has its payload; re-attaching makes no sense.
        assert!(matches!(
            session
                .attach_file("s1", "report.pdf", 2048, FilePayload::new("/tmp/x"))
                .await,
            Err(SessionError::NotPending(_))
        ));
    }
}
