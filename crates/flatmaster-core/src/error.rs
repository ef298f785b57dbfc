use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("Access denied: {0}")]
    AccessDenied(PathBuf),

    #[error("Malformed header in {path}: {detail}")]
    MalformedHeader { path: PathBuf, detail: String },

    #[error("Truncated header: {0}")]
    TruncatedHeader(PathBuf),

    #[error("Unsupported sample format in {path}: {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },

    #[error("Bad geometry in {path}: expected {expected}, got {actual}")]
    BadGeometry {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("No matching dark for exposure {exposure}s")]
    NoMatchingDark { exposure: f64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Empty frame stack")]
    EmptyStack,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FlatError>;
