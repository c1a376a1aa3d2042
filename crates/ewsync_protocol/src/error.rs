//! Protocol-level error types.

use std::collections::BTreeMap;
use std::fmt;

use ewsync_xml::XmlError;
use thiserror::Error;

use crate::envelope::{OffendingField, ResponseCode};

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors surfaced while reading service responses.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The response document was not well formed.
    #[error(transparent)]
    Xml(#[from] XmlError),
    /// The service reported an error-class response.
    #[error("{0}")]
    Service(Box<ServiceFault>),
    /// The response class attribute held an unknown value.
    #[error("unknown response class {0:?}")]
    UnknownResponseClass(String),
    /// A payload named an object type no schema is registered for.
    #[error("no schema registered for element {0:?}")]
    UnknownObject(String),
}

/// Everything the service reported about a failed operation.
///
/// Carried boxed inside [`ProtocolError::Service`] so the error enum stays
/// small on the happy path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    /// Machine-readable error code.
    pub code: ResponseCode,
    /// Human-readable message, if the service sent one.
    pub message: Option<String>,
    /// Named diagnostic values from the error detail block.
    pub detail: BTreeMap<String, String>,
    /// Field references the service blamed for the failure.
    pub offending_fields: Vec<OffendingField>,
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.code.as_str()),
            None => f.write_str(self.code.as_str()),
        }
    }
}
