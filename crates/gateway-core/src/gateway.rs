//! The gateway owns the single long-lived channel to the backend and fans
//! inbound frames out to per-topic subscriptions.

use crate::channel::MessageChannel;
use crate::model::{ConnectionStatus, Frame};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

const SUBSCRIPTION_BUFFER: usize = 64;

/// A live subscription to one topic. Frames stop arriving once the topic is
/// unsubscribed or the channel goes away.
pub struct Subscription {
    topic: String,
    receiver: mpsc::Receiver<Frame>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }
}

pub struct Gateway {
    status_tx: watch::Sender<ConnectionStatus>,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    subscriptions: Arc<Mutex<HashMap<String, mpsc::Sender<Frame>>>>,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    pub fn new() -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Connecting);
        Arc::new(Self {
            status_tx,
            outbound: Mutex::new(None),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            router: Mutex::new(None),
        })
    }

    /// Watch the connection status. The receiver observes every transition,
    /// including `Connecting -> Connecting` retries.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status_tx.borrow().is_connected()
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }

    /// One connection attempt over `channel`. On success the gateway routes
    /// inbound frames until the link dies; on failure the caller decides
    /// whether to retry (see [`crate::connect::connect_with_retry`]).
    pub async fn connect(self: &Arc<Self>, channel: &dyn MessageChannel) -> Result<()> {
        let link = channel.open().await?;

        if let Some(old) = self.router.lock().await.take() {
            old.abort();
        }
        *self.outbound.lock().await = Some(link.outbound);

        let gateway = Arc::clone(self);
        let mut inbound = link.inbound;
        let router = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                gateway.route(frame).await;
            }
            // Inbound stream ended: the backend closed on us.
            tracing::warn!("channel closed by remote");
            *gateway.outbound.lock().await = None;
            if gateway.is_connected() {
                gateway.set_status(ConnectionStatus::Connecting);
            }
        });
        *self.router.lock().await = Some(router);

        self.set_status(ConnectionStatus::Connected);
        tracing::info!("channel connected");
        Ok(())
    }

    async fn route(&self, frame: Frame) {
        let handler = {
            let subs = self.subscriptions.lock().await;
            subs.get(&frame.destination).cloned()
        };
        match handler {
            Some(tx) => {
                if tx.send(frame).await.is_err() {
                    tracing::debug!("subscription receiver dropped");
                }
            }
            None => {
                tracing::debug!(topic = %frame.destination, "no subscription for inbound frame, dropping");
            }
        }
    }

    /// Register a handler for `topic`. Returns `None` when the channel is not
    /// connected: delivery cannot be assumed, and the caller must not treat
    /// this as silent success.
    pub async fn subscribe(&self, topic: &str) -> Option<Subscription> {
        if !self.is_connected() {
            return None;
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscriptions.lock().await.insert(topic.to_string(), tx);
        Some(Subscription {
            topic: topic.to_string(),
            receiver: rx,
        })
    }

    pub async fn unsubscribe(&self, topic: &str) {
        self.subscriptions.lock().await.remove(topic);
    }

    /// Best-effort send. When the channel is down the frame is dropped with a
    /// log line rather than an error: liveness pings are allowed to be lost.
    pub async fn publish(&self, destination: &str, body: impl Into<String>) {
        let sender = self.outbound.lock().await.clone();
        match sender {
            Some(tx) => {
                let frame = Frame::new(destination, body);
                if tx.send(frame).await.is_err() {
                    tracing::warn!(topic = %destination, "channel gone, dropping outbound frame");
                }
            }
            None => {
                tracing::warn!(topic = %destination, "not connected, dropping outbound frame");
            }
        }
    }

    /// Graceful teardown. Completes even if the channel was never connected.
    pub async fn disconnect(&self) {
        if let Some(router) = self.router.lock().await.take() {
            router.abort();
        }
        *self.outbound.lock().await = None;
        self.subscriptions.lock().await.clear();
        self.set_status(ConnectionStatus::Connecting);
        tracing::info!("channel disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackChannel;

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let gateway = Gateway::new();
        assert!(gateway.subscribe("/topic/a").await.is_none());
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_is_a_quiet_drop() {
        let gateway = Gateway::new();
        // Must not panic or error.
        gateway.publish("/app/alive", "{}").await;
    }

    #[tokio::test]
    async fn test_inbound_frames_reach_subscriber() {
        let (channel, remote) = LoopbackChannel::new();
        let gateway = Gateway::new();
        gateway.connect(&channel).await.unwrap();

        let mut sub = gateway.subscribe("/topic/abc").await.unwrap();
        remote.send(Frame::new("/topic/abc", r#"{"n":1}"#)).await;

        let frame = sub.recv().await.unwrap();
        assert_eq!(frame.body, r#"{"n":1}"#);
    }

    #[tokio::test]
    async fn test_frames_for_other_topics_are_not_delivered() {
        let (channel, remote) = LoopbackChannel::new();
        let gateway = Gateway::new();
        gateway.connect(&channel).await.unwrap();

        let mut sub = gateway.subscribe("/topic/abc").await.unwrap();
        remote.send(Frame::new("/topic/other", "x")).await;
        remote.send(Frame::new("/topic/abc", "y")).await;

        let frame = sub.recv().await.unwrap();
        assert_eq!(frame.body, "y");
    }

    #[tokio::test]
    async fn test_publish_reaches_remote() {
        let (channel, mut remote) = LoopbackChannel::new();
        let gateway = Gateway::new();
        gateway.connect(&channel).await.unwrap();

        gateway.publish("/app/alive", "ping").await;
        let frame = remote.recv().await.unwrap();
        assert_eq!(frame.destination, "/app/alive");
        assert_eq!(frame.body, "ping");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (channel, remote) = LoopbackChannel::new();
        let gateway = Gateway::new();
        gateway.connect(&channel).await.unwrap();

        let mut sub = gateway.subscribe("/topic/abc").await.unwrap();
        gateway.unsubscribe("/topic/abc").await;
        remote.send(Frame::new("/topic/abc", "late")).await;

        // The subscription sender is gone, so the receiver ends.
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_completes_when_never_connected() {
        let gateway = Gateway::new();
        gateway.disconnect().await;
        assert!(!gateway.is_connected());
    }
}
