//! Wire and storage shapes. Everything this node reads or writes is JSON;
//! inbound frames go through an explicit parse-or-reject step before they can
//! touch any state.

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::share::{TransferEntry, TransferKey};

/// Fixed topic for liveness announcements, distinct from per-share topics.
pub const LIVENESS_TOPIC: &str = "/app/alive";

/// Subscription topic carrying download requests for one share.
pub fn share_topic(share_id: &str) -> String {
    format!("/topic/{}", share_id)
}

/// A peer's download request, pushed by the backend on the share's topic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadRequest {
    #[serde(rename = "ip")]
    pub peer_addr: String,
    #[serde(rename = "shareHash")]
    pub share_id: String,
    #[serde(rename = "streamHash")]
    pub stream_id: String,
}

impl DownloadRequest {
    pub fn parse(body: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn key(&self) -> TransferKey {
        TransferKey {
            share_id: self.share_id.clone(),
            peer_addr: self.peer_addr.clone(),
            stream_id: self.stream_id.clone(),
        }
    }
}

/// One owned share as announced in a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRef {
    #[serde(rename = "shareHash")]
    pub share_id: String,
    #[serde(rename = "ownerHash")]
    pub owner_credential: String,
}

/// Liveness payload: the full set of currently owned shares with their
/// credentials, so the backend does not expire them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub shares: Vec<ShareRef>,
}

impl HeartbeatPayload {
    pub fn encode(&self) -> String {
        // A struct of strings cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"shares\":[]}"))
    }
}

/// One share as persisted. The payload handle is deliberately absent: it
/// cannot survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredShare {
    #[serde(rename = "filename")]
    pub file_name: String,
    #[serde(rename = "size")]
    pub file_size: u64,
    #[serde(rename = "shareHash")]
    pub share_id: String,
    #[serde(rename = "ownerHash", default)]
    pub owner_credential: String,
    #[serde(rename = "downloads", default)]
    pub transfers: Vec<TransferEntry>,
}

/// The durable session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(rename = "sharedFiles")]
    pub shared_files: Vec<StoredShare>,
    #[serde(rename = "pendingFiles", default)]
    pub pending_files: Vec<String>,
}

impl StoredSession {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Accepts the current object form and the legacy form: a bare array of
    /// share records, in which case every record is treated as pending.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if let Ok(session) = serde_json::from_slice::<StoredSession>(data) {
            return Ok(session);
        }
        let legacy: Vec<StoredShare> = serde_json::from_slice(data)?;
        let pending_files = legacy.iter().map(|s| s.share_id.clone()).collect();
        Ok(Self {
            shared_files: legacy,
            pending_files,
        })
    }
}
