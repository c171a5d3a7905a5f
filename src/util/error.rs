//! Crate-wide error type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // ---- source documents ----
    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Cycle or dangling reference met during a walk.
    #[error("traversal failed: {0}")]
    Traversal(String),

    // ---- container constructs ----
    /// File, group or array exists and truncation was not requested.
    #[error("{0} already exists")]
    ContainerCreateConflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("operation not allowed in current state: {0}")]
    InvalidState(String),

    #[error("expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Text value wider than its fixed-width column.
    #[error("{value:?} is {len} bytes, column holds at most {max}")]
    ValueTooLong { value: String, len: usize, max: usize },

    #[error("container opened read-only")]
    ReadOnly,

    #[error("container already closed")]
    Closed,

    // ---- variable-length buffers ----
    #[error("{allocated} vlen buffers allocated but only {released} released")]
    ResourceLeak { allocated: usize, released: usize },

    #[error("vlen buffer of row {row} released twice")]
    DoubleRelease { row: usize },

    // ---- file format ----
    #[error("not a CTREE container (bad magic)")]
    InvalidMagic,

    #[error("container version {0} is not supported")]
    UnsupportedVersion(u16),

    /// Read past the end of a truncated file.
    #[error("unexpected end of file at byte {0}")]
    UnexpectedEof(u64),

    #[error("corrupt container: {0}")]
    InvalidStructure(String),

    // ---- wrapped ----
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("stored text is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Corrupt on-disk structure.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    pub fn parse(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Parse { path: path.into(), message: msg.into() }
    }

    /// Per-construct conflict; an export records it and carries on.
    pub fn is_create_conflict(&self) -> bool {
        matches!(self, Self::ContainerCreateConflict(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
