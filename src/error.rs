use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("index directory error: {0}")]
    OpenDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid language pair: {0}")]
    InvalidLanguagePair(String),

    #[error("invalid context vector: {0}")]
    InvalidContextVector(String),

    #[error("corrupt channel ledger: {0}")]
    CorruptLedger(String),

    #[error("corrupt stored document: {0}")]
    CorruptDocument(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
