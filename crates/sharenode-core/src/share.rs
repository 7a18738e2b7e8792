use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::api::ShareGrant;

/// Local handle to the bytes behind a share. Never serialized: after a
/// process restart every share comes back without one and must be re-attached
/// by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub path: PathBuf,
}

impl FilePayload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// State of one peer's pull attempt. Once terminal it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    #[serde(rename = "progress")]
    InProgress,
    #[serde(rename = "success")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Succeeded | TransferStatus::Failed)
    }
}

/// The triple identifying one unique pull attempt. A repeat delivery with the
/// same key is a duplicate, not a new transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub share_id: String,
    pub peer_addr: String,
    pub stream_id: String,
}

/// One peer's attempt to pull a share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEntry {
    #[serde(rename = "ip")]
    pub peer_addr: String,
    #[serde(rename = "streamHash")]
    pub stream_id: String,
    pub progress: f32,
    pub status: TransferStatus,
}

impl TransferEntry {
    pub fn started(peer_addr: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            peer_addr: peer_addr.into(),
            stream_id: stream_id.into(),
            progress: 0.0,
            status: TransferStatus::InProgress,
        }
    }

    pub fn failed(peer_addr: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            peer_addr: peer_addr.into(),
            stream_id: stream_id.into(),
            progress: 0.0,
            status: TransferStatus::Failed,
        }
    }

    pub fn matches(&self, key: &TransferKey) -> bool {
        self.peer_addr == key.peer_addr && self.stream_id == key.stream_id
    }
}

/// One file the local node has offered, plus every pull attempt against it
/// in arrival order.
#[derive(Debug, Clone)]
pub struct ShareEntry {
    pub file_name: String,
    pub file_size: u64,
    pub share_id: String,
    pub owner_credential: String,
    pub payload: Option<FilePayload>,
    pub transfers: Vec<TransferEntry>,
}

impl ShareEntry {
    pub fn new(
        file_name: impl Into<String>,
        file_size: u64,
        grant: ShareGrant,
        payload: FilePayload,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
            share_id: grant.share_id,
            owner_credential: grant.owner_credential,
            payload: Some(payload),
            transfers: Vec::new(),
        }
    }

    /// True when the share has no local bytes and is awaiting re-selection.
    pub fn awaiting_payload(&self) -> bool {
        self.payload.is_none()
    }

    pub fn transfer(&self, key: &TransferKey) -> Option<&TransferEntry> {
        self.transfers.iter().find(|t| t.matches(key))
    }

    pub fn transfer_mut(&mut self, key: &TransferKey) -> Option<&mut TransferEntry> {
        self.transfers.iter_mut().find(|t| t.matches(key))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ({} bytes, {} transfers)",
            self.file_name,
            self.file_size,
            self.transfers.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!TransferStatus::InProgress.is_terminal());
        assert!(TransferStatus::Succeeded.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::InProgress).unwrap(),
            "\"progress\""
        );
        assert_eq!(
            serde_json::to_string(&TransferStatus::Succeeded).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&TransferStatus::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[test]
    fn test_transfer_lookup_by_key() {
        let grant = ShareGrant {
            share_id: "s1".into(),
            owner_credential: "o1".into(),
        };
        let mut entry = ShareEntry::new("report.pdf", 2048, grant, FilePayload::new("/tmp/report.pdf"));
        entry.transfers.push(TransferEntry::started("10.0.0.5", "str-1"));

        let key = TransferKey {
            share_id: "s1".into(),
            peer_addr: "10.0.0.5".into(),
            stream_id: "str-1".into(),
        };
        assert!(entry.transfer(&key).is_some());

        let other = TransferKey {
            share_id: "s1".into(),
            peer_addr: "10.0.0.5".into(),
            stream_id: "str-2".into(),
        };
        assert!(entry.transfer(&other).is_none());
    }
}
