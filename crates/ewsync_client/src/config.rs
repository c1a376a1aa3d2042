//! Configuration for the streaming client.

use std::time::Duration;

/// Configuration for a streaming notification connection.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// How often the server promises a document even when nothing
    /// happened. The read timeout derives from this.
    pub heartbeat: Duration,
    /// Whether to log every document off the wire at trace level.
    pub trace_documents: bool,
}

impl StreamingConfig {
    /// Create a configuration with the given heartbeat interval.
    pub fn new(heartbeat: Duration) -> Self {
        Self {
            heartbeat,
            trace_documents: false,
        }
    }

    /// Create a configuration from a heartbeat frequency in minutes,
    /// the unit the subscription API speaks.
    pub fn with_heartbeat_minutes(minutes: u64) -> Self {
        Self::new(Duration::from_secs(minutes * 60))
    }

    /// Enable or disable wire-document tracing.
    pub fn with_trace_documents(mut self, trace: bool) -> Self {
        self.trace_documents = trace;
        self
    }

    /// How long one read may block before the connection counts as dead.
    ///
    /// Twice the heartbeat, so a single delayed heartbeat never kills a
    /// healthy connection.
    pub fn read_timeout(&self) -> Duration {
        self.heartbeat * 2
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self::with_heartbeat_minutes(1)
    }
}
