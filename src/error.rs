//! Error types for todo-ledger
//!
//! The taxonomy distinguishes the three failure classes a user remediates
//! differently: ledger rejections (`Unauthorized`, `OutOfRange`,
//! `ChainTransactionFailed`), content-store transport failures
//! (`ContentStoreUnavailable`), and content that came back but failed
//! schema validation (`MalformedContent`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: caller {caller} is not the ledger owner")]
    Unauthorized { caller: String },

    #[error("Index out of range: {index} (ledger has {count} records)")]
    OutOfRange { index: u64, count: u64 },

    #[error("Content store unavailable: {0}")]
    ContentStoreUnavailable(String),

    #[error("Ledger transaction failed: {0}")]
    ChainTransactionFailed(String),

    #[error("Malformed content for ref {0}")]
    MalformedContent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Record encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Record decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
