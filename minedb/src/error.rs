use std::path::PathBuf;

use minecore::error::MineError;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to read {path:?}.")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Failed to write {path:?}.")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse config file at {path:?}.")]
    ParseConfig { path: PathBuf, source: toml::de::Error },
    #[error("{message}")]
    Validation { message: String },
    #[error("Malformed {format} input at line {line}: {message}")]
    Parse { format: &'static str, line: usize, message: String },
    #[error("Malformed mzXML document.")]
    Xml(#[from] roxmltree::Error),
    #[error("SQLite operation failed.")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON encoding failed.")]
    Json(#[from] serde_json::Error),
    #[error("Binary encoding failed.")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("Binary decoding failed.")]
    Decode(#[from] bincode::error::DecodeError),
    #[error(transparent)]
    Mine(#[from] MineError),
}
