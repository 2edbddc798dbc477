use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("archive is malformed, no entries recovered: {}", .0.display())]
    ArchiveMalformed(PathBuf),

    #[error("output directory exists and is not empty: {}", .0.display())]
    OutputConflict(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}
