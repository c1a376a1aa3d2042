//! Streaming notification payloads.
//!
//! A streaming connection delivers whole XML documents, each wrapping one
//! response message with zero or more notifications and the connection
//! status. [`StreamingPayload::read_document`] decodes one such document.

use ewsync_xml::{Namespace, XmlError, XmlReader};

use crate::envelope::ResponseEnvelope;
use crate::error::{ProtocolError, ProtocolResult};
use crate::item_id::ItemId;

/// Connection state reported inside a streaming document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The connection stays open; more documents may follow.
    Ok,
    /// The server is closing the connection after this document.
    Closed,
}

impl ConnectionStatus {
    fn parse(text: &str) -> ProtocolResult<Self> {
        match text {
            "OK" => Ok(ConnectionStatus::Ok),
            "Closed" => Ok(ConnectionStatus::Closed),
            other => Err(ProtocolError::Xml(XmlError::invalid_value(
                "connection status",
                other,
            ))),
        }
    }
}

/// The kind of one notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Periodic heartbeat carrying only a watermark.
    Status,
    /// New mail arrived.
    NewMail,
    /// An object was created.
    Created,
    /// An object was modified.
    Modified,
    /// An object was moved.
    Moved,
    /// An object was copied.
    Copied,
    /// An object was deleted.
    Deleted,
    /// Free/busy data changed.
    FreeBusyChanged,
}

impl EventKind {
    fn from_element(name: &str) -> Option<Self> {
        match name {
            "StatusEvent" => Some(EventKind::Status),
            "NewMailEvent" => Some(EventKind::NewMail),
            "CreatedEvent" => Some(EventKind::Created),
            "ModifiedEvent" => Some(EventKind::Modified),
            "MovedEvent" => Some(EventKind::Moved),
            "CopiedEvent" => Some(EventKind::Copied),
            "DeletedEvent" => Some(EventKind::Deleted),
            "FreeBusyChangedEvent" => Some(EventKind::FreeBusyChanged),
            _ => None,
        }
    }
}

/// One event inside a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// What happened.
    pub kind: EventKind,
    /// Resume point covering this event.
    pub watermark: Option<String>,
    /// The affected object, when the event names one.
    pub item_id: Option<ItemId>,
}

/// One notification block: the subscription it belongs to and its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The subscription this notification belongs to.
    pub subscription_id: Option<String>,
    /// Resume point preceding the events in this block.
    pub previous_watermark: Option<String>,
    /// Whether the server held back further events.
    pub more_events: Option<bool>,
    /// Events in server order.
    pub events: Vec<NotificationEvent>,
}

/// The decoded content of one streaming document.
#[derive(Debug, Clone)]
pub struct StreamingPayload {
    /// The response frame; error documents carry the fault here.
    pub envelope: ResponseEnvelope,
    /// Notifications in server order; empty on heartbeat documents.
    pub notifications: Vec<Notification>,
    /// Whether the server keeps the connection open.
    pub connection_status: ConnectionStatus,
}

impl StreamingPayload {
    /// Decode one streaming document from its text.
    pub fn read_document(document: &str) -> ProtocolResult<Self> {
        let mut reader = XmlReader::new(document)?;
        Self::read(&mut reader)
    }

    /// Decode one streaming response message under the cursor.
    pub fn read(reader: &mut XmlReader<'_>) -> ProtocolResult<Self> {
        let mut notifications = Vec::new();
        let mut connection_status = ConnectionStatus::Ok;
        let envelope = ResponseEnvelope::read(
            reader,
            Namespace::Messages,
            "GetStreamingEventsResponseMessage",
            |r| {
                loop {
                    if r.is_start_element(Namespace::Messages, "Notifications") {
                        r.read_start_element(Namespace::Messages, "Notifications")?;
                        while !r.is_end_element(Namespace::Messages, "Notifications") {
                            if r.is_start_element(Namespace::Messages, "Notification") {
                                notifications.push(read_notification(r)?);
                            } else if r.is_any_start_element() {
                                r.skip_element()?;
                            } else {
                                r.advance()?;
                            }
                        }
                        r.read_end_element(Namespace::Messages, "Notifications")?;
                    } else if r.is_start_element(Namespace::Messages, "ConnectionStatus") {
                        let text =
                            r.read_element_text(Namespace::Messages, "ConnectionStatus")?;
                        connection_status = ConnectionStatus::parse(&text)?;
                    } else {
                        return Ok(());
                    }
                }
            },
        )?;
        Ok(Self {
            envelope,
            notifications,
            connection_status,
        })
    }
}

fn read_notification(reader: &mut XmlReader<'_>) -> ProtocolResult<Notification> {
    reader.read_start_element(Namespace::Messages, "Notification")?;
    let mut notification = Notification {
        subscription_id: None,
        previous_watermark: None,
        more_events: None,
        events: Vec::new(),
    };
    loop {
        if reader.is_end_element(Namespace::Messages, "Notification") {
            reader.read_end_element(Namespace::Messages, "Notification")?;
            return Ok(notification);
        }
        if !reader.is_any_start_element() {
            reader.advance()?;
            continue;
        }
        if reader.is_start_element(Namespace::Types, "SubscriptionId") {
            let text = reader.read_element_text(Namespace::Types, "SubscriptionId")?;
            notification.subscription_id = Some(text);
        } else if reader.is_start_element(Namespace::Types, "PreviousWatermark") {
            let text = reader.read_element_text(Namespace::Types, "PreviousWatermark")?;
            notification.previous_watermark = Some(text);
        } else if reader.is_start_element(Namespace::Types, "MoreEvents") {
            notification.more_events =
                Some(reader.read_bool_element(Namespace::Types, "MoreEvents")?);
        } else {
            let kind = reader
                .local_name()
                .and_then(EventKind::from_element);
            match kind {
                Some(kind) => notification.events.push(read_event(reader, kind)?),
                None => reader.skip_element()?,
            }
        }
    }
}

fn read_event(reader: &mut XmlReader<'_>, kind: EventKind) -> ProtocolResult<NotificationEvent> {
    let name = reader
        .local_name()
        .ok_or(XmlError::UnexpectedEof)?
        .to_string();
    reader.read_start_element(Namespace::Types, &name)?;
    let mut event = NotificationEvent {
        kind,
        watermark: None,
        item_id: None,
    };
    loop {
        if reader.is_end_element(Namespace::Types, &name) {
            reader.read_end_element(Namespace::Types, &name)?;
            return Ok(event);
        }
        if !reader.is_any_start_element() {
            reader.advance()?;
            continue;
        }
        if reader.is_start_element(Namespace::Types, "Watermark") {
            let text = reader.read_element_text(Namespace::Types, "Watermark")?;
            event.watermark = Some(text);
        } else if reader.is_start_element(Namespace::Types, "ItemId") {
            event.item_id = Some(ItemId::read(reader, Namespace::Types, "ItemId")?);
        } else {
            reader.skip_element()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ResponseCode;

    #[test]
    fn reads_notifications_and_status() {
        let doc = "<m:GetStreamingEventsResponseMessage ResponseClass=\"Success\">\
            <m:ResponseCode>NoError</m:ResponseCode>\
            <m:Notifications><m:Notification>\
            <t:SubscriptionId>sub-1</t:SubscriptionId>\
            <t:PreviousWatermark>wm-0</t:PreviousWatermark>\
            <t:MoreEvents>false</t:MoreEvents>\
            <t:NewMailEvent>\
            <t:Watermark>wm-1</t:Watermark>\
            <t:TimeStamp>2024-01-01T00:00:00Z</t:TimeStamp>\
            <t:ItemId Id=\"id-1\" ChangeKey=\"ck-1\"/>\
            </t:NewMailEvent>\
            <t:StatusEvent><t:Watermark>wm-2</t:Watermark></t:StatusEvent>\
            </m:Notification></m:Notifications>\
            <m:ConnectionStatus>OK</m:ConnectionStatus>\
            </m:GetStreamingEventsResponseMessage>";
        let payload = StreamingPayload::read_document(doc).unwrap();
        assert!(payload.envelope.is_success());
        assert_eq!(payload.connection_status, ConnectionStatus::Ok);
        assert_eq!(payload.notifications.len(), 1);

        let notification = &payload.notifications[0];
        assert_eq!(notification.subscription_id.as_deref(), Some("sub-1"));
        assert_eq!(notification.previous_watermark.as_deref(), Some("wm-0"));
        assert_eq!(notification.more_events, Some(false));
        assert_eq!(notification.events.len(), 2);

        let mail = &notification.events[0];
        assert_eq!(mail.kind, EventKind::NewMail);
        assert_eq!(mail.watermark.as_deref(), Some("wm-1"));
        assert_eq!(
            mail.item_id,
            Some(ItemId::with_change_key("id-1", "ck-1"))
        );

        let status = &notification.events[1];
        assert_eq!(status.kind, EventKind::Status);
        assert_eq!(status.item_id, None);
    }

    #[test]
    fn closed_status_is_surfaced() {
        let doc = "<m:GetStreamingEventsResponseMessage ResponseClass=\"Success\">\
            <m:ConnectionStatus>Closed</m:ConnectionStatus>\
            </m:GetStreamingEventsResponseMessage>";
        let payload = StreamingPayload::read_document(doc).unwrap();
        assert_eq!(payload.connection_status, ConnectionStatus::Closed);
        assert!(payload.notifications.is_empty());
    }

    #[test]
    fn error_document_carries_the_fault() {
        let doc = "<m:GetStreamingEventsResponseMessage ResponseClass=\"Error\">\
            <m:MessageText>Subscription expired.</m:MessageText>\
            <m:ResponseCode>ErrorSubscriptionNotFound</m:ResponseCode>\
            </m:GetStreamingEventsResponseMessage>";
        let payload = StreamingPayload::read_document(doc).unwrap();
        assert!(payload.envelope.is_error());
        assert_eq!(
            payload.envelope.code,
            ResponseCode::Other("ErrorSubscriptionNotFound".to_string())
        );
        assert!(payload.notifications.is_empty());
        assert!(payload.envelope.throw_if_error().is_err());
    }
}
