//! Sharenode Core - ephemeral file-sharing client sessions
//!
//! Tracks which local files are on offer, which peers are pulling them, and
//! keeps the whole session alive across backend heartbeats and process
//! restarts. Transports, the backend API and the upload machinery plug in
//! behind traits.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod liveness;
pub mod notice;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod share;
pub mod wire;

// Re-export commonly used types
pub use api::{FileInfo, ShareApi, ShareGrant, UploadEvent, UploadRequest, Uploader};
pub use client::ShareClient;
pub use config::ClientConfig;
pub use error::{ApiError, SessionError, WireError};
pub use notice::Notice;
pub use orchestrator::Orchestrator;
pub use registry::{Registry, RegistrySnapshot};
pub use session::{Session, SessionHandle, TransferAdmission};
pub use share::{FilePayload, ShareEntry, TransferEntry, TransferKey, TransferStatus};
pub use wire::{share_topic, DownloadRequest, HeartbeatPayload, StoredSession, LIVENESS_TOPIC};
