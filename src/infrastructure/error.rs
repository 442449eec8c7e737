use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Sync cycle already running")]
    SyncBusy,
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
