//! # ewsync Protocol
//!
//! Response-frame and change-stream readers.
//!
//! This crate decodes the three server-facing frames:
//! - [`ResponseEnvelope`], the per-operation success/warning/error frame
//!   with a payload hook for the operation's own children
//! - [`read_changes`], one round of the incremental sync stream with its
//!   continuation token and completeness flag
//! - [`StreamingPayload`], one document off a streaming notification
//!   connection
//!
//! Service failures surface as [`ProtocolError::Service`] carrying the
//! full [`ServiceFault`]; callers that treat certain codes as empty
//! results suppress them through
//! [`ResponseEnvelope::throw_if_error_unless`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod item_id;
mod streaming;
mod sync;

pub use envelope::{OffendingField, ResponseClass, ResponseCode, ResponseEnvelope};
pub use error::{ProtocolError, ProtocolResult, ServiceFault};
pub use item_id::ItemId;
pub use streaming::{
    ConnectionStatus, EventKind, Notification, NotificationEvent, StreamingPayload,
};
pub use sync::{read_changes, Change, ChangeCollection, ChangeKind};
