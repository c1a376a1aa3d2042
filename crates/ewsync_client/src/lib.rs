//! # ewsync Client
//!
//! Long-poll streaming notification client.
//!
//! A [`StreamingClient`] owns one connection on a background thread,
//! decodes the documents it delivers into
//! [`StreamingPayload`](ewsync_protocol::StreamingPayload)s and hands them
//! to a [`StreamingHandler`]. The connection lives once: it goes through
//! `Disconnected -> Connecting -> Connected -> Disconnected`, fires the
//! disconnect callback exactly once with the first recorded
//! [`DisconnectReason`], and is disposed afterwards.
//!
//! The network layer sits behind [`StreamingTransport`];
//! [`MockStreamingTransport`] scripts connections deterministically for
//! tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod streaming;
mod transport;

pub use config::StreamingConfig;
pub use error::{ClientError, ClientResult};
pub use streaming::{ConnectionState, DisconnectReason, StreamingClient, StreamingHandler};
pub use transport::{
    MockStep, MockStreamingTransport, StreamingConnection, StreamingTransport, TransportError,
    TransportResult,
};
