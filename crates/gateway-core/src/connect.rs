//! Caller-owned reconnect loop around [`Gateway::connect`].

use crate::channel::MessageChannel;
use crate::gateway::Gateway;
use crate::model::{ConnectionStatus, RetryPolicy};
use anyhow::Result;
use std::sync::Arc;

/// Attempt to connect up to `policy.max_attempts` times, waiting
/// `policy.delay` between failures. On exhaustion the gateway is left in the
/// terminal `Error` status and no further attempts are made; the liveness
/// scheduler halts on that status and new shares become unobservable until
/// something re-drives this function.
pub async fn connect_with_retry(
    gateway: &Arc<Gateway>,
    channel: &dyn MessageChannel,
    policy: RetryPolicy,
) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=policy.max_attempts {
        match gateway.connect(channel).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "channel connect failed"
                );
                last_err = Some(e);
                // Still under budget: stay in (or re-enter) Connecting.
                if attempt < policy.max_attempts {
                    gateway.set_status(ConnectionStatus::Connecting);
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
    gateway.set_status(ConnectionStatus::Error);
    tracing::error!(
        attempts = policy.max_attempts,
        "channel connect failed, retry budget exhausted"
    );
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("connect failed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelLink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct AlwaysDown {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl MessageChannel for AlwaysDown {
        async fn open(&self) -> Result<ChannelLink> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_is_terminal() {
        let gateway = Gateway::new();
        let channel = AlwaysDown {
            attempts: AtomicU32::new(0),
        };
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        };

        let result = connect_with_retry(&gateway, &channel, policy).await;
        assert!(result.is_err());
        assert_eq!(channel.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(*gateway.status().borrow(), ConnectionStatus::Error);

        // No automatic retries after exhaustion.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(channel.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_succeeds_first_try() {
        let (channel, _remote) = crate::loopback::LoopbackChannel::new();
        let gateway = Gateway::new();
        connect_with_retry(&gateway, &channel, RetryPolicy::default())
            .await
            .unwrap();
        assert!(gateway.is_connected());
    }
}
