use gateway_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Directory for the session snapshot and config
    pub data_dir: PathBuf,

    /// HTTP base URL of the backend share API
    pub backend_url: String,

    /// URL of the backend message channel
    pub channel_url: String,

    /// Bounded connect retry budget
    pub connect_attempts: u32,
    pub connect_retry_delay_secs: u64,

    /// Liveness announcement period
    pub heartbeat_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let backend_url = "http://localhost:8080".to_string();
        Self {
            data_dir: std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".sharenode"),
            channel_url: format!("{}/gs-guide-websocket", backend_url.replace("http", "ws")),
            backend_url,
            connect_attempts: 3,
            connect_retry_delay_secs: 2,
            heartbeat_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            delay: Duration::from_secs(self.connect_retry_delay_secs),
        }
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Public link a peer follows to pull a share.
    pub fn download_url(&self, share_id: &str) -> String {
        format!("{}/file/download/{}", self.backend_url, share_id)
    }

    pub fn ensure_data_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.connect_attempts, 3);
        assert_eq!(cfg.connect_retry_delay_secs, 2);
        assert_eq!(cfg.heartbeat_secs, 30);
        assert_eq!(
            cfg.download_url("abc"),
            "http://localhost:8080/file/download/abc"
        );
    }
}
