//! The streaming notification client.
//!
//! A [`StreamingClient`] owns one long-lived connection on a background
//! thread, decodes each document it delivers and hands payloads to a
//! caller-supplied handler. The connection goes through
//! `Disconnected -> Connecting -> Connected -> Disconnected` exactly
//! once; after the terminal disconnect the client is disposed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ewsync_protocol::{ConnectionStatus, StreamingPayload};
use ewsync_xml::XmlError;
use parking_lot::Mutex;

use crate::config::StreamingConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::{StreamingConnection, StreamingTransport, TransportError};

/// Lifecycle state of a streaming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection is open.
    Disconnected,
    /// A connection is being opened.
    Connecting,
    /// The background reader is running.
    Connected,
}

/// Why a streaming connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the connection as part of normal operation.
    Clean,
    /// The caller asked for the disconnect.
    UserInitiated,
    /// No document arrived within the read timeout.
    Timeout,
    /// The connection failed.
    Exception,
}

/// Receives payloads and the disconnect notification.
///
/// Both callbacks run on the client's background thread.
pub trait StreamingHandler: Send + Sync {
    /// One decoded document arrived.
    fn on_payload(&self, payload: StreamingPayload);

    /// The connection ended. Called exactly once per connection;
    /// `error` is set only when the reason is [`DisconnectReason::Exception`].
    fn on_disconnect(&self, reason: DisconnectReason, error: Option<ClientError>);
}

struct Inner {
    state: ConnectionState,
    reason: Option<DisconnectReason>,
    callback_fired: bool,
    disposed: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    cancelled: AtomicBool,
    handler: Arc<dyn StreamingHandler>,
    config: StreamingConfig,
}

impl Shared {
    /// Record the disconnect reason; the first recorded reason wins.
    ///
    /// A timeout or failure observed while the caller is already tearing
    /// the connection down is a consequence of that teardown, so it folds
    /// into [`DisconnectReason::UserInitiated`].
    fn record_reason(&self, reason: DisconnectReason) {
        let mut inner = self.inner.lock();
        if inner.reason.is_some() {
            return;
        }
        let reason = if self.cancelled.load(Ordering::SeqCst)
            && matches!(reason, DisconnectReason::Timeout | DisconnectReason::Exception)
        {
            DisconnectReason::UserInitiated
        } else {
            reason
        };
        inner.reason = Some(reason);
    }
}

/// Long-poll streaming notification client.
///
/// The client is single-use: once its connection ends for any reason it
/// is disposed, and [`StreamingClient::connect`] reports
/// [`ClientError::AlreadyDisposed`]. Open a fresh client to reconnect.
pub struct StreamingClient {
    shared: Arc<Shared>,
    transport: Arc<dyn StreamingTransport>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingClient {
    /// Create a client over the given transport.
    pub fn new(
        transport: Arc<dyn StreamingTransport>,
        handler: Arc<dyn StreamingHandler>,
        config: StreamingConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    reason: None,
                    callback_fired: false,
                    disposed: false,
                }),
                cancelled: AtomicBool::new(false),
                handler,
                config,
            }),
            transport,
            worker: Mutex::new(None),
        }
    }

    /// The client's current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Open the connection and start the background reader.
    ///
    /// Calling connect on a client that is already connecting or
    /// connected is a no-op. A disposed client reports
    /// [`ClientError::AlreadyDisposed`].
    pub fn connect(&self) -> ClientResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.disposed {
                return Err(ClientError::AlreadyDisposed);
            }
            match inner.state {
                ConnectionState::Connecting | ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => inner.state = ConnectionState::Connecting,
            }
        }

        let connection = match self.transport.open() {
            Ok(connection) => connection,
            Err(err) => {
                // Nothing was established, so the client stays reusable.
                self.shared.inner.lock().state = ConnectionState::Disconnected;
                return Err(err.into());
            }
        };
        self.shared.inner.lock().state = ConnectionState::Connected;
        tracing::debug!("streaming connection established");

        let shared = Arc::clone(&self.shared);
        let guard = ConnectionGuard { connection };
        match thread::Builder::new()
            .name("ewsync-streaming".to_string())
            .spawn(move || run_reader(shared, guard))
        {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                Ok(())
            }
            Err(err) => {
                // The guard was dropped with the rejected closure, so the
                // connection is already closed; the client stays reusable.
                self.shared.inner.lock().state = ConnectionState::Disconnected;
                Err(TransportError::io(err.to_string()).into())
            }
        }
    }

    /// Request a disconnect without waiting for the reader to stop.
    ///
    /// Records [`DisconnectReason::UserInitiated`] unless the connection
    /// already ended for another reason.
    pub fn begin_disconnect(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state == ConnectionState::Disconnected {
                return;
            }
            if inner.reason.is_none() {
                inner.reason = Some(DisconnectReason::UserInitiated);
            }
        }
        self.shared.cancelled.store(true, Ordering::SeqCst);
        tracing::debug!("streaming disconnect requested");
    }

    /// Disconnect and wait for the background reader to finish.
    ///
    /// Idempotent; a second call is a no-op. May block up to the read
    /// timeout while the reader notices the request.
    pub fn disconnect(&self) {
        self.begin_disconnect();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("streaming reader thread panicked");
            }
        }
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Closes the connection whenever it goes out of scope, so no exit path
/// can leak a half-open stream.
struct ConnectionGuard {
    connection: Box<dyn StreamingConnection>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// The background read loop. Reads documents until the connection ends,
/// then runs the epilogue: close the connection, flip to disconnected and
/// fire the disconnect callback exactly once.
fn run_reader(shared: Arc<Shared>, mut guard: ConnectionGuard) {
    let timeout = shared.config.read_timeout();
    let mut failure: Option<ClientError> = None;

    loop {
        if shared.cancelled.load(Ordering::SeqCst) {
            shared.record_reason(DisconnectReason::UserInitiated);
            break;
        }
        match guard.connection.read_document(timeout) {
            Ok(Some(body)) => match decode_document(&shared, &body) {
                Ok(payload) => {
                    if payload.envelope.is_error() {
                        match payload.envelope.throw_if_error() {
                            Ok(()) => {}
                            Err(err) => failure = Some(err.into()),
                        }
                        shared.record_reason(DisconnectReason::Exception);
                        break;
                    }
                    let closing = payload.connection_status == ConnectionStatus::Closed;
                    shared.handler.on_payload(payload);
                    if closing {
                        shared.record_reason(DisconnectReason::Clean);
                        break;
                    }
                }
                Err(err) => {
                    failure = Some(err);
                    shared.record_reason(DisconnectReason::Exception);
                    break;
                }
            },
            Ok(None) => {
                shared.record_reason(DisconnectReason::Clean);
                break;
            }
            Err(TransportError::Timeout) => {
                shared.record_reason(DisconnectReason::Timeout);
                break;
            }
            Err(err) => {
                failure = Some(err.into());
                shared.record_reason(DisconnectReason::Exception);
                break;
            }
        }
    }

    drop(guard);

    let reason = {
        let mut inner = shared.inner.lock();
        inner.state = ConnectionState::Disconnected;
        inner.disposed = true;
        if inner.callback_fired {
            return;
        }
        inner.callback_fired = true;
        inner.reason.unwrap_or(DisconnectReason::Clean)
    };
    let failure = if reason == DisconnectReason::Exception {
        failure
    } else {
        None
    };
    if reason == DisconnectReason::Exception {
        tracing::warn!(?reason, error = ?failure, "streaming connection failed");
    } else {
        tracing::debug!(?reason, "streaming connection closed");
    }
    shared.handler.on_disconnect(reason, failure);
}

fn decode_document(shared: &Shared, body: &[u8]) -> Result<StreamingPayload, ClientError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| ewsync_protocol::ProtocolError::Xml(XmlError::malformed(
            "document is not valid UTF-8",
        )))?;
    if shared.config.trace_documents {
        tracing::trace!(document = text, "streaming document received");
    }
    Ok(StreamingPayload::read_document(text)?)
}
