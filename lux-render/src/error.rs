//! Error type shared by the render core

use crate::color::ColorSpace;
use thiserror::Error;

/// Errors raised by structural mutation or by a failed frame
#[derive(Error, Debug)]
pub enum RenderError {
    /// A structural invariant would be violated; state is unchanged
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    /// Blend or copy between buffers that do not line up
    #[error("Buffer mismatch: expected {expected:?}x{expected_len}, got {actual:?}x{actual_len}")]
    BufferMismatch {
        expected: ColorSpace,
        expected_len: usize,
        actual: ColorSpace,
        actual_len: usize,
    },
    /// A pattern, layer or effect failed while rendering
    #[error("{name} failed: {message}")]
    Node { name: String, message: String },
    #[error("Output {name} failed: {source}")]
    Output {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Unknown node kind: {0}")]
    UnknownKind(String),
    #[error("Thread error: {0}")]
    Thread(String),
}

impl RenderError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn node(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Node {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn output(
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Output {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Check an index against a collection length
    pub(crate) fn check_index(index: usize, len: usize) -> Result<(), RenderError> {
        if index < len {
            Ok(())
        } else {
            Err(Self::IndexOutOfRange { index, len })
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
