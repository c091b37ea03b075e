//! Crate error type.
//!
//! Almost every resolution failure is a *value*, not an error: the engine
//! answers "unresolvable" and keeps going. `ExtractError` covers the few
//! places where something outside the analyzed code went wrong.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse { path: PathBuf },

    #[error("unsupported file type: {path}")]
    UnsupportedFile { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// An object reached the literal constructor.
    #[error("{0}")]
    MalformedLiteral(String),
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;
