//! The authoritative table of shares and their transfers. Pure state: no IO,
//! no locking. Exclusive access is enforced by the session that owns it.

use std::collections::HashSet;

use crate::share::{ShareEntry, TransferEntry, TransferKey, TransferStatus};
use crate::wire::{HeartbeatPayload, ShareRef, StoredSession, StoredShare};

#[derive(Debug, Default)]
pub struct Registry {
    shares: Vec<ShareEntry>,
    pending: HashSet<String>,
}

/// A consistent point-in-time copy, safe to read outside the lock.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub shares: Vec<ShareEntry>,
    pub pending: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shares(&self) -> &[ShareEntry] {
        &self.shares
    }

    pub fn share_count(&self) -> usize {
        self.shares.len()
    }

    pub fn share(&self, share_id: &str) -> Option<&ShareEntry> {
        self.shares.iter().find(|s| s.share_id == share_id)
    }

    pub fn share_mut(&mut self, share_id: &str) -> Option<&mut ShareEntry> {
        self.shares.iter_mut().find(|s| s.share_id == share_id)
    }

    /// Insert a new share. A share id is unique for the life of the process;
    /// a second insert with the same id is ignored.
    pub fn add_share(&mut self, entry: ShareEntry) {
        if self.share(&entry.share_id).is_some() {
            tracing::warn!(share_id = %entry.share_id, "share already registered, ignoring");
            return;
        }
        if entry.awaiting_payload() {
            self.pending.insert(entry.share_id.clone());
        }
        self.shares.push(entry);
    }

    pub fn remove_share(&mut self, share_id: &str) -> Option<ShareEntry> {
        self.pending.remove(share_id);
        let idx = self.shares.iter().position(|s| s.share_id == share_id)?;
        Some(self.shares.remove(idx))
    }

    /// Idempotent insert: a transfer already present at this correlation key
    /// means a duplicate notification, and nothing changes.
    /// Returns whether the transfer was actually added.
    pub fn add_transfer(&mut self, share_id: &str, transfer: TransferEntry) -> bool {
        let key = TransferKey {
            share_id: share_id.to_string(),
            peer_addr: transfer.peer_addr.clone(),
            stream_id: transfer.stream_id.clone(),
        };
        let Some(share) = self.share_mut(share_id) else {
            return false;
        };
        if share.transfer(&key).is_some() {
            return false;
        }
        share.transfers.push(transfer);
        true
    }

    pub fn transfer(&self, key: &TransferKey) -> Option<&TransferEntry> {
        self.share(&key.share_id)?.transfer(key)
    }

    /// No-op when the transfer is unknown or already terminal.
    pub fn update_progress(&mut self, key: &TransferKey, progress: f32) -> bool {
        match self.live_transfer_mut(key) {
            Some(transfer) => {
                transfer.progress = progress.clamp(0.0, 100.0);
                true
            }
            None => false,
        }
    }

    /// No-op when the transfer is unknown or already terminal: a terminal
    /// status is never reopened or overwritten by a late event.
    pub fn update_status(&mut self, key: &TransferKey, status: TransferStatus) -> bool {
        match self.live_transfer_mut(key) {
            Some(transfer) => {
                transfer.status = status;
                true
            }
            None => false,
        }
    }

    fn live_transfer_mut(&mut self, key: &TransferKey) -> Option<&mut TransferEntry> {
        let transfer = self.share_mut(&key.share_id)?.transfer_mut(key)?;
        if transfer.status.is_terminal() {
            return None;
        }
        Some(transfer)
    }

    pub fn mark_pending(&mut self, share_id: &str) {
        self.pending.insert(share_id.to_string());
    }

    pub fn clear_pending(&mut self, share_id: &str) -> bool {
        self.pending.remove(share_id)
    }

    pub fn is_pending(&self, share_id: &str) -> bool {
        self.pending.contains(share_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut pending: Vec<String> = self.pending.iter().cloned().collect();
        pending.sort();
        RegistrySnapshot {
            shares: self.shares.clone(),
            pending,
        }
    }
}

impl RegistrySnapshot {
    pub fn to_stored(&self) -> StoredSession {
        StoredSession {
            shared_files: self
                .shares
                .iter()
                .map(|s| StoredShare {
                    file_name: s.file_name.clone(),
                    file_size: s.file_size,
                    share_id: s.share_id.clone(),
                    owner_credential: s.owner_credential.clone(),
                    transfers: s.transfers.clone(),
                })
                .collect(),
            pending_files: self.pending.clone(),
        }
    }

    pub fn heartbeat(&self) -> HeartbeatPayload {
        HeartbeatPayload {
            shares: self
                .shares
                .iter()
                .map(|s| ShareRef {
                    share_id: s.share_id.clone(),
                    owner_credential: s.owner_credential.clone(),
                })
                .collect(),
        }
    }
}
