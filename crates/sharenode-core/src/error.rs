use thiserror::Error;

/// Errors from the backend share API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Malformed inbound data. Frames that fail to parse never reach the
/// registry.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("share {0} not found")]
    ShareNotFound(String),

    #[error("share {0} is not awaiting re-selection")]
    NotPending(String),

    #[error(
        "selected file does not match: expected {expected_name} ({expected_size} bytes), \
         got {actual_name} ({actual_size} bytes)"
    )]
    FileMismatch {
        expected_name: String,
        expected_size: u64,
        actual_name: String,
        actual_size: u64,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
