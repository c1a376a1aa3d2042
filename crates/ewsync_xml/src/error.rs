//! Error types for the XML cursor.

use thiserror::Error;

/// Result type for XML read/write operations.
pub type XmlResult<T> = Result<T, XmlError>;

/// Errors that can occur while reading or writing XML.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// Input ended inside an element or token.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The cursor was positioned at a different element than expected.
    #[error("expected element <{expected}>, found <{found}>")]
    UnexpectedElement {
        /// The element the caller asked for.
        expected: String,
        /// The element actually under the cursor.
        found: String,
    },

    /// The cursor was positioned at a different kind of event than expected.
    #[error("expected {expected}, found {found}")]
    UnexpectedEvent {
        /// Description of the expected event.
        expected: String,
        /// Description of the event actually under the cursor.
        found: String,
    },

    /// Structurally broken markup.
    #[error("malformed markup: {message}")]
    MalformedMarkup {
        /// Description of the structural problem.
        message: String,
    },

    /// Element text could not be converted to the requested type.
    #[error("invalid {kind} value: {text:?}")]
    InvalidValue {
        /// The target type name.
        kind: &'static str,
        /// The offending text.
        text: String,
    },
}

impl XmlError {
    /// Create a malformed markup error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMarkup {
            message: message.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(kind: &'static str, text: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            text: text.into(),
        }
    }
}
