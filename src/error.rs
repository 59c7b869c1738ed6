use thiserror::Error;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors from filesystem or socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The filesystem watch could not be established or failed at runtime.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// An HTTP request to the snapshot server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an unexpected status or payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The broadcaster task is no longer running.
    #[error("Snapshot hub is closed")]
    HubClosed,

    /// Terminal initialization or rendering errors.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}
