//! Error types shared across the runtime core.

use thiserror::Error;

/// Agent loop failures. Tool failures are not here: they become failed
/// `ToolResult` observations and the loop continues.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("llm router: {0}")]
    Router(#[from] crate::llm::RouterError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("chat cancelled")]
    Cancelled,

    #[error("chat exceeded {0} seconds")]
    TimedOut(u64),

    #[error("{0}")]
    Other(String),
}

/// Persistence failures from the sqlite store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(String),

    #[error("join: {0}")]
    Join(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Join(e.to_string())
    }
}

/// Vault failures. `WrongPassword` is distinct so callers can prompt again
/// instead of treating the vault as corrupt.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("no vault found at {0}; run `noctua vault init` to create one")]
    NotFound(String),

    #[error("wrong password")]
    WrongPassword,

    #[error("vault data is corrupted: {0}")]
    Corrupted(String),

    #[error("vault io: {0}")]
    Io(#[from] std::io::Error),

    #[error("vault is locked")]
    Locked,
}
