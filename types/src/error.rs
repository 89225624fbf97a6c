//! Shared error type for wire-format handling.

use thiserror::Error;

/// Errors produced while encoding or decoding canonical byte forms.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("truncated input: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("trailing bytes after a complete record")]
    TrailingBytes,

    #[error("serialization error: {0}")]
    Serialization(String),
}
