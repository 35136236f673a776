//! Codec error types

use thiserror::Error;

/// Longest input excerpt kept in an error message
const MAX_EXCERPT_LEN: usize = 64;

/// Codec error
#[derive(Error, Debug)]
pub enum CodecError {
    /// Bytes are not valid UTF-8 text
    #[error("invalid UTF-8 text: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Text does not parse as the expected scalar type
    #[error("invalid {kind} value {input:?}: {reason}")]
    InvalidScalar {
        kind: &'static str,
        input: String,
        reason: String,
    },

    /// JSON encoding or decoding failed
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode encoding or decoding failed
    #[error("bincode codec error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl CodecError {
    /// Build an [`CodecError::InvalidScalar`] for the given input text
    pub fn invalid_scalar(kind: &'static str, input: &str, reason: impl ToString) -> Self {
        let input = if input.len() > MAX_EXCERPT_LEN {
            let mut end = MAX_EXCERPT_LEN;
            while !input.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &input[..end])
        } else {
            input.to_string()
        };
        Self::InvalidScalar {
            kind,
            input,
            reason: reason.to_string(),
        }
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
