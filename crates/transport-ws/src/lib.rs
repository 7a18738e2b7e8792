//! WebSocket transport for the gateway channel contract.
//!
//! Frames travel as JSON text messages carrying a destination and a body.
//! Two pump tasks bridge the socket to the channel link; when either side
//! closes, the pumps end and the link's streams terminate, which the gateway
//! observes as a disconnect.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use gateway_core::{ChannelLink, Frame, MessageChannel};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const LINK_BUFFER: usize = 64;

/// On-the-wire envelope for one frame.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    destination: String,
    body: String,
}

impl From<Frame> for Envelope {
    fn from(frame: Frame) -> Self {
        Self {
            destination: frame.destination,
            body: frame.body,
        }
    }
}

impl From<Envelope> for Frame {
    fn from(envelope: Envelope) -> Self {
        Frame::new(envelope.destination, envelope.body)
    }
}

pub struct WsChannel {
    url: String,
}

impl WsChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl MessageChannel for WsChannel {
    async fn open(&self) -> Result<ChannelLink> {
        let (socket, _response) = connect_async(&self.url)
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        tracing::debug!(url = %self.url, "websocket connected");

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel::<Frame>(LINK_BUFFER);

        // Writer pump: outbound frames become text messages.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match serde_json::to_string(&Envelope::from(frame)) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode outbound frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
            tracing::debug!("websocket writer ended");
        });

        // Reader pump: text messages become inbound frames.
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                if in_tx.send(envelope.into()).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "discarding unparseable message");
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            tracing::debug!("websocket reader ended");
        });

        Ok(ChannelLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let frame = Frame::new("/topic/abc", r#"{"n":1}"#);
        let text = serde_json::to_string(&Envelope::from(frame.clone())).unwrap();
        let back: Frame = serde_json::from_str::<Envelope>(&text).unwrap().into();
        assert_eq!(back, frame);
    }

    #[tokio::test]
    async fn test_open_fails_when_nothing_listens() {
        let channel = WsChannel::new("ws://127.0.0.1:1");
        assert!(channel.open().await.is_err());
    }
}
