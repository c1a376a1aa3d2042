//! Transport layer abstraction for streaming connections.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors a streaming transport can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No document arrived within the read timeout.
    #[error("read timed out")]
    Timeout,
    /// The underlying channel failed.
    #[error("transport failure: {message}")]
    Io {
        /// Description of the failure.
        message: String,
    },
    /// The connection was already closed locally.
    #[error("connection disposed")]
    Disposed,
}

impl TransportError {
    /// Create an I/O failure from a message.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

/// Opens streaming connections to the server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP long-poll, mock for testing, etc.).
pub trait StreamingTransport: Send + Sync {
    /// Open a new streaming connection.
    fn open(&self) -> TransportResult<Box<dyn StreamingConnection>>;
}

/// One open streaming connection delivering whole documents.
pub trait StreamingConnection: Send {
    /// Block until the server delivers the next whole document or the
    /// timeout elapses. `Ok(None)` means the server closed cleanly.
    fn read_document(&mut self, timeout: Duration) -> TransportResult<Option<Bytes>>;

    /// Close the connection. Further reads report [`TransportError::Disposed`].
    fn close(&mut self);
}

/// One scripted behavior of a [`MockStreamingTransport`] read.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Deliver a document that "arrived" after the given delay. If the
    /// delay exceeds the read timeout the read times out instead.
    Document {
        /// Simulated time until the document arrives.
        after: Duration,
        /// The document body.
        body: Bytes,
    },
    /// Block until the test calls [`MockStreamingTransport::release`],
    /// then report a timed-out read.
    Stall,
    /// Close the connection cleanly.
    Close,
    /// Fail the read with an I/O error.
    Fault(String),
}

impl MockStep {
    /// A document delivered immediately.
    pub fn document(body: impl Into<Bytes>) -> Self {
        MockStep::Document {
            after: Duration::ZERO,
            body: body.into(),
        }
    }

    /// A document that arrives only after the given delay.
    pub fn document_after(after: Duration, body: impl Into<Bytes>) -> Self {
        MockStep::Document {
            after,
            body: body.into(),
        }
    }
}

#[derive(Default)]
struct MockState {
    steps: Mutex<VecDeque<MockStep>>,
    released: Mutex<bool>,
    release_signal: Condvar,
    opens: Mutex<usize>,
    closes: Mutex<usize>,
}

/// A deterministic scripted transport for testing.
///
/// Delays are compared against the read timeout instead of sleeping, so
/// tests never depend on wall-clock time. An exhausted script reads as a
/// clean close.
#[derive(Default)]
pub struct MockStreamingTransport {
    state: Arc<MockState>,
}

impl MockStreamingTransport {
    /// Create a transport that plays the given steps in order.
    pub fn new(steps: Vec<MockStep>) -> Self {
        let transport = Self::default();
        *transport.state.steps.lock() = steps.into();
        transport
    }

    /// How many connections have been opened.
    pub fn opens(&self) -> usize {
        *self.state.opens.lock()
    }

    /// How many connections have been closed.
    pub fn closes(&self) -> usize {
        *self.state.closes.lock()
    }

    /// Unblock a connection waiting on a [`MockStep::Stall`].
    pub fn release(&self) {
        let mut released = self.state.released.lock();
        *released = true;
        self.state.release_signal.notify_all();
    }
}

impl StreamingTransport for MockStreamingTransport {
    fn open(&self) -> TransportResult<Box<dyn StreamingConnection>> {
        *self.state.opens.lock() += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
    closed: bool,
}

impl StreamingConnection for MockConnection {
    fn read_document(&mut self, timeout: Duration) -> TransportResult<Option<Bytes>> {
        if self.closed {
            return Err(TransportError::Disposed);
        }
        let step = self.state.steps.lock().pop_front();
        match step {
            None | Some(MockStep::Close) => Ok(None),
            Some(MockStep::Document { after, body }) => {
                if after <= timeout {
                    Ok(Some(body))
                } else {
                    Err(TransportError::Timeout)
                }
            }
            Some(MockStep::Stall) => {
                let mut released = self.state.released.lock();
                while !*released {
                    self.state.release_signal.wait(&mut released);
                }
                Err(TransportError::Timeout)
            }
            Some(MockStep::Fault(message)) => Err(TransportError::Io { message }),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            *self.state.closes.lock() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_within_timeout_is_delivered() {
        let transport = MockStreamingTransport::new(vec![MockStep::document_after(
            Duration::from_secs(1),
            "<doc/>",
        )]);
        let mut connection = transport.open().unwrap();
        let body = connection
            .read_document(Duration::from_secs(2))
            .unwrap()
            .unwrap();
        assert_eq!(&body[..], b"<doc/>");
        assert_eq!(transport.opens(), 1);
    }

    #[test]
    fn late_document_reads_as_timeout() {
        let transport = MockStreamingTransport::new(vec![MockStep::document_after(
            Duration::from_secs(5),
            "<doc/>",
        )]);
        let mut connection = transport.open().unwrap();
        let err = connection.read_document(Duration::from_secs(2)).unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[test]
    fn exhausted_script_reads_as_clean_close() {
        let transport = MockStreamingTransport::new(vec![]);
        let mut connection = transport.open().unwrap();
        assert_eq!(connection.read_document(Duration::from_secs(1)).unwrap(), None);
    }

    #[test]
    fn closed_connection_reports_disposed() {
        let transport = MockStreamingTransport::new(vec![MockStep::document("<doc/>")]);
        let mut connection = transport.open().unwrap();
        connection.close();
        assert_eq!(
            connection.read_document(Duration::from_secs(1)).unwrap_err(),
            TransportError::Disposed
        );
    }
}
