//! End-to-end tests for the streaming client over a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use ewsync_client::{
    ClientError, ConnectionState, DisconnectReason, MockStep, MockStreamingTransport,
    StreamingClient, StreamingConfig, StreamingHandler,
};
use ewsync_protocol::StreamingPayload;
use parking_lot::{Condvar, Mutex};

const HEARTBEAT_DOC: &str = "<m:GetStreamingEventsResponseMessage ResponseClass=\"Success\">\
    <m:ResponseCode>NoError</m:ResponseCode>\
    <m:Notifications><m:Notification>\
    <t:SubscriptionId>sub-1</t:SubscriptionId>\
    <t:StatusEvent><t:Watermark>wm-1</t:Watermark></t:StatusEvent>\
    </m:Notification></m:Notifications>\
    <m:ConnectionStatus>OK</m:ConnectionStatus>\
    </m:GetStreamingEventsResponseMessage>";

const CLOSING_DOC: &str = "<m:GetStreamingEventsResponseMessage ResponseClass=\"Success\">\
    <m:ResponseCode>NoError</m:ResponseCode>\
    <m:ConnectionStatus>Closed</m:ConnectionStatus>\
    </m:GetStreamingEventsResponseMessage>";

const ERROR_DOC: &str = "<m:GetStreamingEventsResponseMessage ResponseClass=\"Error\">\
    <m:MessageText>Subscription expired.</m:MessageText>\
    <m:ResponseCode>ErrorSubscriptionNotFound</m:ResponseCode>\
    </m:GetStreamingEventsResponseMessage>";

#[derive(Default)]
struct Recording {
    payloads: Mutex<Vec<StreamingPayload>>,
    disconnects: Mutex<Vec<(DisconnectReason, Option<String>)>>,
    signal: Condvar,
}

impl Recording {
    fn wait_for_disconnect(&self) -> (DisconnectReason, Option<String>) {
        let mut disconnects = self.disconnects.lock();
        while disconnects.is_empty() {
            self.signal.wait(&mut disconnects);
        }
        disconnects[0].clone()
    }

    fn disconnect_count(&self) -> usize {
        self.disconnects.lock().len()
    }

    fn payload_count(&self) -> usize {
        self.payloads.lock().len()
    }
}

impl StreamingHandler for Recording {
    fn on_payload(&self, payload: StreamingPayload) {
        self.payloads.lock().push(payload);
    }

    fn on_disconnect(&self, reason: DisconnectReason, error: Option<ClientError>) {
        self.disconnects
            .lock()
            .push((reason, error.map(|e| e.to_string())));
        self.signal.notify_all();
    }
}

fn client_over(
    steps: Vec<MockStep>,
    config: StreamingConfig,
) -> (StreamingClient, Arc<MockStreamingTransport>, Arc<Recording>) {
    let transport = Arc::new(MockStreamingTransport::new(steps));
    let handler = Arc::new(Recording::default());
    let client = StreamingClient::new(transport.clone(), handler.clone(), config);
    (client, transport, handler)
}

fn short_config() -> StreamingConfig {
    StreamingConfig::new(Duration::from_secs(30))
}

#[test]
fn delivers_payloads_then_disconnects_cleanly() {
    let steps = vec![MockStep::document(HEARTBEAT_DOC), MockStep::Close];
    let (client, transport, handler) = client_over(steps, short_config());

    client.connect().unwrap();
    let (reason, error) = handler.wait_for_disconnect();
    assert_eq!(reason, DisconnectReason::Clean);
    assert_eq!(error, None);
    assert_eq!(handler.payload_count(), 1);

    let payloads = handler.payloads.lock();
    let notification = &payloads[0].notifications[0];
    assert_eq!(notification.subscription_id.as_deref(), Some("sub-1"));
    drop(payloads);

    // A disconnect after the connection already ended is a no-op.
    client.disconnect();
    assert_eq!(handler.disconnect_count(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    // The reader released the connection exactly once on its way out.
    assert_eq!(transport.closes(), 1);
}

#[test]
fn server_closing_status_delivers_then_ends() {
    let steps = vec![MockStep::document(CLOSING_DOC)];
    let (client, _transport, handler) = client_over(steps, short_config());

    client.connect().unwrap();
    let (reason, _) = handler.wait_for_disconnect();
    assert_eq!(reason, DisconnectReason::Clean);
    // The closing document itself still reaches the handler.
    assert_eq!(handler.payload_count(), 1);
}

#[test]
fn stalled_connection_times_out() {
    // The document "arrives" after three heartbeats; the read timeout is
    // two, so the reader gives up.
    let steps = vec![MockStep::document_after(
        Duration::from_secs(90),
        HEARTBEAT_DOC,
    )];
    let (client, _transport, handler) = client_over(steps, short_config());

    client.connect().unwrap();
    let (reason, error) = handler.wait_for_disconnect();
    assert_eq!(reason, DisconnectReason::Timeout);
    assert_eq!(error, None);
    assert_eq!(handler.payload_count(), 0);
    assert_eq!(handler.disconnect_count(), 1);
}

#[test]
fn user_disconnect_folds_the_trailing_timeout() {
    let steps = vec![MockStep::Stall];
    let (client, transport, handler) = client_over(steps, short_config());

    client.connect().unwrap();
    client.begin_disconnect();
    transport.release();
    client.disconnect();

    let (reason, error) = handler.wait_for_disconnect();
    assert_eq!(reason, DisconnectReason::UserInitiated);
    assert_eq!(error, None);
    assert_eq!(handler.disconnect_count(), 1);

    // A second disconnect stays a no-op.
    client.disconnect();
    assert_eq!(handler.disconnect_count(), 1);
}

#[test]
fn transport_fault_surfaces_as_exception() {
    let steps = vec![MockStep::Fault("connection reset".to_string())];
    let (client, transport, handler) = client_over(steps, short_config());

    client.connect().unwrap();
    let (reason, error) = handler.wait_for_disconnect();
    assert_eq!(reason, DisconnectReason::Exception);
    let error = error.unwrap();
    assert!(error.contains("connection reset"), "got {error:?}");

    client.disconnect();
    assert_eq!(transport.closes(), 1);
}

#[test]
fn error_document_surfaces_as_exception() {
    let steps = vec![MockStep::document(ERROR_DOC)];
    let (client, _transport, handler) = client_over(steps, short_config());

    client.connect().unwrap();
    let (reason, error) = handler.wait_for_disconnect();
    assert_eq!(reason, DisconnectReason::Exception);
    let error = error.unwrap();
    assert!(error.contains("ErrorSubscriptionNotFound"), "got {error:?}");
    // Error documents never reach the payload callback.
    assert_eq!(handler.payload_count(), 0);
}

#[test]
fn connect_is_single_use() {
    let steps = vec![MockStep::Close];
    let (client, _transport, handler) = client_over(steps, short_config());

    client.connect().unwrap();
    handler.wait_for_disconnect();
    client.disconnect();

    assert!(matches!(
        client.connect(),
        Err(ClientError::AlreadyDisposed)
    ));
}

#[test]
fn connect_while_connected_is_a_no_op() {
    let steps = vec![MockStep::Stall];
    let (client, transport, _handler) = client_over(steps, short_config());

    client.connect().unwrap();
    client.connect().unwrap();
    assert_eq!(transport.opens(), 1);

    client.begin_disconnect();
    transport.release();
    client.disconnect();
}
