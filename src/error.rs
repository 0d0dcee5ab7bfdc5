use thiserror::Error;

use crate::path::Path;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_NOT_A_CONTAINER: &str = "Z-ERR-STORE-001";
pub const ERR_NOT_AN_ARRAY: &str = "Z-ERR-STORE-002";
pub const ERR_INDEX_OUT_OF_RANGE: &str = "Z-ERR-STORE-003";
pub const ERR_PARSE: &str = "Z-ERR-PARSE-001";
pub const ERR_LOAD_NOT_FOUND: &str = "Z-ERR-LOAD-001";
pub const ERR_LOAD_IO: &str = "Z-ERR-LOAD-002";
pub const ERR_LOAD_ABORTED: &str = "Z-ERR-LOAD-003";
pub const ERR_INVALID_TAG: &str = "Z-ERR-COMPONENT-001";
pub const ERR_DETACHED: &str = "Z-ERR-COMPONENT-002";
pub const ERR_OPTIONS: &str = "Z-ERR-OPTIONS-001";

/// Failure while resolving markup for a tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("no markup found for <{tag}>")]
    NotFound { tag: String },

    #[error("failed to read markup for <{tag}>: {message}")]
    Io { tag: String, message: String },

    #[error("markup load for <{tag}> was aborted")]
    Aborted { tag: String },
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::NotFound { .. } => ERR_LOAD_NOT_FOUND,
            LoadError::Io { .. } => ERR_LOAD_IO,
            LoadError::Aborted { .. } => ERR_LOAD_ABORTED,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    /// A write or read descended through a primitive value.
    #[error("cannot address {path}: parent is not an object or array")]
    NotAContainer { path: Path },

    /// An array operation targeted something other than an array.
    #[error("array operation on {path}, which is not an array")]
    NotAnArray { path: Path },

    /// An array index that the write may not create.
    #[error("index {index} of {path} is out of range for length {len}")]
    IndexOutOfRange { path: Path, index: usize, len: usize },

    #[error("failed to parse markup from {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("'{tag}' is not a two-part hyphenated component name")]
    InvalidTag { tag: String },

    #[error("component {key} is no longer attached")]
    Detached { key: String },

    #[error("invalid runtime options: {message}")]
    Options { message: String },
}

impl RuntimeError {
    /// Stable code for hosts that surface errors to users or tooling.
    pub fn code(&self) -> &'static str {
        match self {
            RuntimeError::NotAContainer { .. } => ERR_NOT_A_CONTAINER,
            RuntimeError::NotAnArray { .. } => ERR_NOT_AN_ARRAY,
            RuntimeError::IndexOutOfRange { .. } => ERR_INDEX_OUT_OF_RANGE,
            RuntimeError::Parse { .. } => ERR_PARSE,
            RuntimeError::Load(inner) => inner.code(),
            RuntimeError::InvalidTag { .. } => ERR_INVALID_TAG,
            RuntimeError::Detached { .. } => ERR_DETACHED,
            RuntimeError::Options { .. } => ERR_OPTIONS,
        }
    }
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
