#![forbid(unsafe_code)]

//! Error types for nested conversion.

use thiserror::Error;

/// How a leaf conversion failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertErrorKind {
    /// The value's kind cannot be represented (mapping, text, dtype clash).
    Type,
    /// The value has the right kind but an unusable layout (ragged, mixed).
    Value,
    /// The converter itself failed; never retried.
    Fatal,
}

/// Failure reported by a `LeafConverter`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} error: {detail}")]
pub struct ConvertError {
    pub kind: ConvertErrorKind,
    pub detail: String,
}

impl ConvertError {
    #[must_use]
    pub fn type_error(detail: impl Into<String>) -> Self {
        Self {
            kind: ConvertErrorKind::Type,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn value_error(detail: impl Into<String>) -> Self {
        Self {
            kind: ConvertErrorKind::Value,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn fatal(detail: impl Into<String>) -> Self {
        Self {
            kind: ConvertErrorKind::Fatal,
            detail: detail.into(),
        }
    }

    /// Type and value errors let the engine retry child by child.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind, ConvertErrorKind::Fatal)
    }
}

impl From<nx_core::ValueError> for ConvertError {
    fn from(err: nx_core::ValueError) -> Self {
        match err {
            nx_core::ValueError::ShapeOverflow { .. } => Self::fatal(err.to_string()),
            other => Self::value_error(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NestError {
    #[error("conversion failed at path '{path}': {source}")]
    Conversion {
        path: String,
        #[source]
        source: ConvertError,
    },
    #[error("structure mismatch at path '{path}': expected {expected}, got {actual}")]
    ShapeMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error(
        "cannot convert a structure of typed values to a single value; saw {value} at path '{path}'"
    )]
    ImplicitStack { path: String, value: String },
    #[error("{callee}() takes {expected} argument(s) but {actual} were given")]
    ArgumentCount {
        callee: String,
        expected: usize,
        actual: usize,
    },
    #[error("{callee}() got an unexpected keyword argument '{keyword}'")]
    UnknownKeyword { callee: String, keyword: String },
    #[error("{callee}() missing required keyword argument '{keyword}'")]
    MissingKeyword { callee: String, keyword: String },
    #[error("duplicate key '{key}'")]
    DuplicateKey { key: String },
    #[error("nesting depth {depth} exceeds the limit of {limit}")]
    DepthExceeded { depth: usize, limit: usize },
    #[error("invalid JSON structure at path '{path}': {detail}")]
    InvalidJson { path: String, detail: String },
}

pub type Result<T> = std::result::Result<T, NestError>;
