//! Periodic liveness announcements. While the channel is connected and at
//! least one share exists, the backend hears about the full owned set
//! immediately and then on a fixed period; otherwise the timer is cancelled.
//! Any change to the share set or the connection re-arms the loop from
//! scratch, so the payload always reflects the latest set.

use std::sync::Arc;
use std::time::Duration;

use gateway_core::Gateway;
use tokio::task::JoinHandle;

use crate::session::SessionHandle;
use crate::wire::LIVENESS_TOPIC;

pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

pub fn spawn(session: SessionHandle, gateway: Arc<Gateway>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(run(session, gateway, period))
}

async fn run(session: SessionHandle, gateway: Arc<Gateway>, period: Duration) {
    let mut status = gateway.status();
    let mut revision = session.revision();

    loop {
        let connected = status.borrow_and_update().is_connected();
        revision.borrow_and_update();
        let active = connected && session.share_count().await > 0;

        if !active {
            // Idle until either condition can have changed.
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = revision.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        }

        // Both conditions hold: announce now, then on the period, until
        // anything changes and the outer loop re-arms.
        send_heartbeat(&session, &gateway).await;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    if gateway.is_connected() && session.share_count().await > 0 {
                        send_heartbeat(&session, &gateway).await;
                    } else {
                        break;
                    }
                }
                changed = status.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
                changed = revision.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
            }
        }
    }
    tracing::debug!("liveness scheduler stopped");
}

/// The payload is built from a fresh snapshot at send time, never from state
/// captured when the timer was armed.
async fn send_heartbeat(session: &SessionHandle, gateway: &Arc<Gateway>) {
    let payload = session.snapshot().await.heartbeat();
    tracing::debug!(shares = payload.shares.len(), "sending heartbeat");
    gateway.publish(LIVENESS_TOPIC, payload.encode()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ShareGrant;
    use crate::session::Session;
    use crate::share::{FilePayload, ShareEntry};
    use gateway_core::{Frame, LoopbackChannel, LoopbackRemote};
    use storage::MemoryStore;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

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

    async fn connected_pair() -> (SessionHandle, Arc<Gateway>, LoopbackRemote) {
        let (channel, remote) = LoopbackChannel::new();
        let gateway = Gateway::new();
        gateway.connect(&channel).await.unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let session = Session::new(Arc::new(MemoryStore::new()), tx);
        (session, gateway, remote)
    }

    async fn expect_heartbeat(remote: &mut LoopbackRemote) -> Frame {
        let frame = timeout(Duration::from_secs(2), remote.recv())
            .await
            .expect("expected a heartbeat")
            .expect("channel closed");
        assert_eq!(frame.destination, LIVENESS_TOPIC);
        frame
    }

    async fn expect_silence(remote: &mut LoopbackRemote) {
        match timeout(Duration::from_millis(150), remote.recv()).await {
            Err(_) => {}
            Ok(None) => {}
            Ok(Some(frame)) => panic!("expected no heartbeat, got {:?}", frame),
        }
    }

    #[tokio::test]
    async fn test_no_heartbeat_without_shares() {
        let (session, gateway, mut remote) = connected_pair().await;
        let _task = spawn(session, gateway, Duration::from_millis(50));
        expect_silence(&mut remote).await;
    }

    #[tokio::test]
    async fn test_adding_a_share_triggers_immediate_heartbeat() {
        let (session, gateway, mut remote) = connected_pair().await;
        let _task = spawn(Arc::clone(&session), gateway, Duration::from_secs(60));

        session.add_share(entry("s1")).await;
        let frame = expect_heartbeat(&mut remote).await;
        assert!(frame.body.contains("s1"));
        assert!(frame.body.contains("owner-s1"));

        // A second share re-arms the loop: a fresh immediate announcement
        // carrying the whole current set, not the one captured at timer start.
        session.add_share(entry("s2")).await;
        let frame = expect_heartbeat(&mut remote).await;
        assert!(frame.body.contains("s1"));
        assert!(frame.body.contains("s2"));
    }

    #[tokio::test]
    async fn test_periodic_heartbeats() {
        let (session, gateway, mut remote) = connected_pair().await;
        session.add_share(entry("s1")).await;
        let _task = spawn(Arc::clone(&session), gateway, Duration::from_millis(40));

        expect_heartbeat(&mut remote).await;
        expect_heartbeat(&mut remote).await;
        expect_heartbeat(&mut remote).await;
    }

    #[tokio::test]
    async fn test_heartbeat_stops_when_last_share_removed() {
        let (session, gateway, mut remote) = connected_pair().await;
        let _task = spawn(Arc::clone(&session), gateway, Duration::from_secs(60));

        session.add_share(entry("s1")).await;
        expect_heartbeat(&mut remote).await;

        session.remove_share("s1").await;
        expect_silence(&mut remote).await;
    }

    #[tokio::test]
    async fn test_heartbeat_stops_on_disconnect() {
        let (session, gateway, mut remote) = connected_pair().await;
        let _task = spawn(Arc::clone(&session), Arc::clone(&gateway), Duration::from_secs(60));

        session.add_share(entry("s1")).await;
        expect_heartbeat(&mut remote).await;

        gateway.disconnect().await;
        session.add_share(entry("s2")).await;
        expect_silence(&mut remote).await;
    }
}
