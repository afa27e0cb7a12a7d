use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no secret with id(s) {}", join_ids(.0))]
    NotFound(Vec<u64>),

    #[error("authentication failed (wrong key or tampered store)")]
    Authentication,

    #[error("store is corrupted: {0}")]
    Corrupted(String),

    #[error("unsupported store format version {0}")]
    UnsupportedVersion(u32),

    #[error("store already exists at {}", .0.display())]
    PathExists(PathBuf),

    #[error("no store at {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("key cache error: {0}")]
    KeyCache(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub(crate) fn corrupted(msg: impl Into<String>) -> Self {
        StoreError::Corrupted(msg.into())
    }
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
