//! The transport seam: anything that can open a duplex message channel.

use crate::model::Frame;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// The two halves of an established channel. Implementations run their own
/// pump tasks behind these; dropping both halves tears the connection down.
pub struct ChannelLink {
    /// Frames handed here are delivered to the backend.
    pub outbound: mpsc::Sender<Frame>,
    /// Frames arriving from the backend. The stream ending means the
    /// connection is gone.
    pub inbound: mpsc::Receiver<Frame>,
}

/// A factory for one connection attempt. The gateway calls `open` once per
/// attempt; retries are the caller's business.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn open(&self) -> Result<ChannelLink>;
}
