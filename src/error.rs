use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a run. Per-address provider failures never end up here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid credentials file '{}': {message}", .path.display())]
    Credentials { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
