//! Client-level error types.

use ewsync_protocol::ProtocolError;
use thiserror::Error;

use crate::transport::TransportError;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the streaming client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// A document off the wire could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The client already went through its terminal disconnect.
    #[error("client already disposed")]
    AlreadyDisposed,
}
