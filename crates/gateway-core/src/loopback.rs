//! In-process channel pair: a `MessageChannel` whose far end is held by the
//! test (or an embedder running client and backend in one process).

use crate::channel::{ChannelLink, MessageChannel};
use crate::model::Frame;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

const LOOPBACK_BUFFER: usize = 64;

pub struct LoopbackChannel {
    link: Mutex<Option<ChannelLink>>,
}

/// The backend side of a loopback pair.
pub struct LoopbackRemote {
    inject: mpsc::Sender<Frame>,
    observed: mpsc::Receiver<Frame>,
}

impl LoopbackChannel {
    pub fn new() -> (Self, LoopbackRemote) {
        let (out_tx, out_rx) = mpsc::channel(LOOPBACK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LOOPBACK_BUFFER);
        let channel = Self {
            link: Mutex::new(Some(ChannelLink {
                outbound: out_tx,
                inbound: in_rx,
            })),
        };
        let remote = LoopbackRemote {
            inject: in_tx,
            observed: out_rx,
        };
        (channel, remote)
    }
}

#[async_trait]
impl MessageChannel for LoopbackChannel {
    async fn open(&self) -> Result<ChannelLink> {
        self.link
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow::anyhow!("loopback channel already opened"))
    }
}

impl LoopbackRemote {
    /// Deliver a frame to the client as if the backend pushed it.
    pub async fn send(&self, frame: Frame) {
        let _ = self.inject.send(frame).await;
    }

    /// Next frame the client published, if any.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.observed.recv().await
    }

    /// Drop the injection side, simulating the backend closing the channel.
    pub fn close(self) {
        drop(self.inject);
    }
}
