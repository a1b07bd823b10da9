//! Crate-wide error type.

use crate::thermal::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid thermal configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
