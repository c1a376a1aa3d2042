//! The per-operation response envelope.
//!
//! Every service operation answers with a response message element whose
//! `ResponseClass` attribute classifies the outcome. [`ResponseEnvelope::read`]
//! drives the shared frame and hands the payload to a caller-supplied hook,
//! so operation readers only ever deal with their own children.

use std::collections::BTreeMap;

use ewsync_xml::{Namespace, XmlError, XmlReader};

use crate::error::{ProtocolError, ProtocolResult, ServiceFault};

/// Outcome classification of one response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The operation succeeded.
    Success,
    /// The operation partially succeeded or was skipped.
    Warning,
    /// The operation failed.
    Error,
}

impl ResponseClass {
    fn parse(text: &str) -> ProtocolResult<Self> {
        match text {
            "Success" => Ok(ResponseClass::Success),
            "Warning" => Ok(ResponseClass::Warning),
            "Error" => Ok(ResponseClass::Error),
            other => Err(ProtocolError::UnknownResponseClass(other.to_string())),
        }
    }
}

/// Machine-readable service result code.
///
/// Codes the reader reacts to get their own variants; everything else is
/// carried verbatim in [`ResponseCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// The operation completed without incident.
    NoError,
    /// A batch stopped early; operations after the failing one were not
    /// attempted and their response messages carry no payload.
    BatchProcessingStopped,
    /// A resolution query matched nothing.
    NameResolutionNoResults,
    /// Any code this crate does not interpret.
    Other(String),
}

impl ResponseCode {
    /// Parse the wire form of a response code.
    pub fn parse(text: &str) -> Self {
        match text {
            "NoError" => ResponseCode::NoError,
            "ErrorBatchProcessingStopped" => ResponseCode::BatchProcessingStopped,
            "ErrorNameResolutionNoResults" => ResponseCode::NameResolutionNoResults,
            other => ResponseCode::Other(other.to_string()),
        }
    }

    /// The wire form of this code.
    pub fn as_str(&self) -> &str {
        match self {
            ResponseCode::NoError => "NoError",
            ResponseCode::BatchProcessingStopped => "ErrorBatchProcessingStopped",
            ResponseCode::NameResolutionNoResults => "ErrorNameResolutionNoResults",
            ResponseCode::Other(code) => code,
        }
    }

    /// Whether this code means "the query legitimately matched nothing"
    /// rather than a genuine failure.
    pub fn is_empty_result_code(&self) -> bool {
        matches!(self, ResponseCode::NameResolutionNoResults)
    }
}

/// A field reference the service blamed in an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffendingField {
    /// A plain field identity.
    Simple(String),
    /// A dictionary slot identity.
    Indexed {
        /// The dictionary field identity.
        uri: String,
        /// The slot key within the dictionary.
        index: String,
    },
    /// An extended property identity.
    Extended {
        /// Owning property set, if named.
        property_set: Option<String>,
        /// Property name within the set, if named.
        property_name: Option<String>,
        /// Raw property tag, if named.
        property_tag: Option<String>,
    },
}

/// The decoded frame of one response message.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// Outcome classification.
    pub response_class: ResponseClass,
    /// Result code; [`ResponseCode::NoError`] for success responses.
    pub code: ResponseCode,
    /// Human-readable message for warning and error responses.
    pub message: Option<String>,
    /// Named diagnostic values from the error detail block.
    pub detail: BTreeMap<String, String>,
    /// Field references the service blamed for the failure.
    pub offending_fields: Vec<OffendingField>,
}

impl ResponseEnvelope {
    /// Read one response message element named `ns:name`.
    ///
    /// For success responses and ordinary warnings, `payload` is invoked
    /// exactly once with the cursor inside the element; it must consume its
    /// own children and stop at the first child it does not recognize.
    /// Trailing unrecognized children are skipped here. For error responses
    /// and batch-stop warnings the hook is never invoked, since the service
    /// sends no payload.
    pub fn read(
        reader: &mut XmlReader<'_>,
        ns: Namespace,
        name: &str,
        payload: impl FnOnce(&mut XmlReader<'_>) -> ProtocolResult<()>,
    ) -> ProtocolResult<Self> {
        reader.expect_start_element(ns, name)?;
        let class_text = reader
            .attribute("ResponseClass")
            .ok_or_else(|| XmlError::malformed("response message without ResponseClass"))?
            .to_string();
        let response_class = ResponseClass::parse(&class_text)?;
        reader.advance()?;

        let mut envelope = ResponseEnvelope {
            response_class,
            code: ResponseCode::NoError,
            message: None,
            detail: BTreeMap::new(),
            offending_fields: Vec::new(),
        };

        match response_class {
            ResponseClass::Error => {
                envelope.read_error_children(reader, ns, name)?;
            }
            ResponseClass::Success | ResponseClass::Warning => {
                envelope.read_preamble(reader)?;
                if envelope.code == ResponseCode::BatchProcessingStopped {
                    // The batch stopped before this operation ran, so the
                    // element carries no payload worth decoding.
                    skip_remaining_children(reader, ns, name)?;
                } else {
                    payload(reader)?;
                    skip_remaining_children(reader, ns, name)?;
                }
            }
        }
        reader.read_end_element(ns, name)?;
        Ok(envelope)
    }

    /// Reads the message text, link key and response code children that
    /// precede the payload on warning responses. Each is optional and
    /// order varies across server versions.
    fn read_preamble(&mut self, reader: &mut XmlReader<'_>) -> ProtocolResult<()> {
        loop {
            if reader.is_start_element(Namespace::Messages, "MessageText") {
                let text = reader.read_element_text(Namespace::Messages, "MessageText")?;
                self.message = Some(text);
            } else if reader.is_start_element(Namespace::Messages, "ResponseCode") {
                let text = reader.read_element_text(Namespace::Messages, "ResponseCode")?;
                self.code = ResponseCode::parse(&text);
            } else if reader.is_start_element(Namespace::Messages, "DescriptiveLinkKey") {
                let _ = reader.read_element_text(Namespace::Messages, "DescriptiveLinkKey")?;
            } else {
                return Ok(());
            }
        }
    }

    /// Reads every child of an error response: text, code, and whatever
    /// diagnostic values and field references the detail block carries.
    fn read_error_children(
        &mut self,
        reader: &mut XmlReader<'_>,
        ns: Namespace,
        name: &str,
    ) -> ProtocolResult<()> {
        while !reader.is_end_element(ns, name) {
            if !reader.is_any_start_element() {
                reader.advance()?;
                continue;
            }
            let child_ns = reader.namespace();
            let local = reader.local_name().map(str::to_string);
            match (child_ns, local.as_deref()) {
                (Some(Namespace::Messages), Some("MessageText")) => {
                    let text = reader.read_element_text(Namespace::Messages, "MessageText")?;
                    self.message = Some(text);
                }
                (Some(Namespace::Messages), Some("ResponseCode")) => {
                    let text = reader.read_element_text(Namespace::Messages, "ResponseCode")?;
                    self.code = ResponseCode::parse(&text);
                }
                (Some(Namespace::Messages), Some("DescriptiveLinkKey")) => {
                    let _ =
                        reader.read_element_text(Namespace::Messages, "DescriptiveLinkKey")?;
                }
                (Some(Namespace::Messages), Some("MessageXml")) => {
                    reader.read_start_element(Namespace::Messages, "MessageXml")?;
                    self.read_detail_children(reader)?;
                    reader.read_end_element(Namespace::Messages, "MessageXml")?;
                }
                _ => reader.skip_element()?,
            }
        }
        Ok(())
    }

    /// Reads the detail block: named values and blamed field references.
    fn read_detail_children(&mut self, reader: &mut XmlReader<'_>) -> ProtocolResult<()> {
        loop {
            if !reader.is_any_start_element() {
                if matches!(reader.current(), ewsync_xml::XmlEvent::EndElement { .. }) {
                    return Ok(());
                }
                reader.advance()?;
                continue;
            }
            match reader.local_name() {
                Some("Value") => {
                    let key = reader
                        .attribute("Name")
                        .ok_or_else(|| XmlError::malformed("detail value without Name"))?
                        .to_string();
                    let child_ns = reader
                        .namespace()
                        .ok_or_else(|| XmlError::malformed("detail value in unknown namespace"))?;
                    let value = reader.read_element_text(child_ns, "Value")?;
                    self.detail.insert(key, value);
                }
                Some("FieldURI") => {
                    if let Some(uri) = reader.attribute("FieldURI") {
                        self.offending_fields
                            .push(OffendingField::Simple(uri.to_string()));
                    }
                    reader.skip_element()?;
                }
                Some("IndexedFieldURI") => {
                    if let (Some(uri), Some(index)) =
                        (reader.attribute("FieldURI"), reader.attribute("FieldIndex"))
                    {
                        self.offending_fields.push(OffendingField::Indexed {
                            uri: uri.to_string(),
                            index: index.to_string(),
                        });
                    }
                    reader.skip_element()?;
                }
                Some("ExtendedFieldURI") => {
                    self.offending_fields.push(OffendingField::Extended {
                        property_set: reader.attribute("PropertySetId").map(str::to_string),
                        property_name: reader.attribute("PropertyName").map(str::to_string),
                        property_tag: reader.attribute("PropertyTag").map(str::to_string),
                    });
                    reader.skip_element()?;
                }
                _ => reader.skip_element()?,
            }
        }
    }

    /// Whether the response is classed as success.
    pub fn is_success(&self) -> bool {
        self.response_class == ResponseClass::Success
    }

    /// Whether the response is classed as error.
    pub fn is_error(&self) -> bool {
        self.response_class == ResponseClass::Error
    }

    /// Raise a [`ServiceFault`] if the response is classed as error.
    pub fn throw_if_error(&self) -> ProtocolResult<()> {
        self.throw_if_error_unless(|_| false)
    }

    /// Raise a [`ServiceFault`] if the response is classed as error,
    /// unless `allow` accepts the code.
    ///
    /// Callers that treat certain codes as empty results rather than
    /// failures pass a predicate, typically built on
    /// [`ResponseCode::is_empty_result_code`].
    pub fn throw_if_error_unless(
        &self,
        allow: impl Fn(&ResponseCode) -> bool,
    ) -> ProtocolResult<()> {
        if self.is_error() && !allow(&self.code) {
            return Err(ProtocolError::Service(Box::new(ServiceFault {
                code: self.code.clone(),
                message: self.message.clone(),
                detail: self.detail.clone(),
                offending_fields: self.offending_fields.clone(),
            })));
        }
        Ok(())
    }
}

/// Skips whatever children remain before the element's end tag.
fn skip_remaining_children(
    reader: &mut XmlReader<'_>,
    ns: Namespace,
    name: &str,
) -> ProtocolResult<()> {
    while !reader.is_end_element(ns, name) {
        if reader.is_any_start_element() {
            reader.skip_element()?;
        } else {
            reader.advance()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_envelope(doc: &str, invoked: &mut bool) -> ProtocolResult<ResponseEnvelope> {
        let mut reader = XmlReader::new(doc).unwrap();
        ResponseEnvelope::read(
            &mut reader,
            Namespace::Messages,
            "DeleteItemResponseMessage",
            |r| {
                *invoked = true;
                while r.is_any_start_element() {
                    r.skip_element()?;
                }
                Ok(())
            },
        )
    }

    #[test]
    fn success_invokes_payload_hook() {
        let doc = "<m:DeleteItemResponseMessage ResponseClass=\"Success\">\
                   <m:ResponseCode>NoError</m:ResponseCode>\
                   <m:Payload>x</m:Payload>\
                   </m:DeleteItemResponseMessage>";
        let mut invoked = false;
        let envelope = read_envelope(doc, &mut invoked).unwrap();
        assert!(invoked);
        assert!(envelope.is_success());
        assert_eq!(envelope.code, ResponseCode::NoError);
        assert_eq!(envelope.message, None);
    }

    #[test]
    fn batch_stop_warning_skips_payload() {
        let doc = "<m:DeleteItemResponseMessage ResponseClass=\"Warning\">\
                   <m:MessageText>Batch stopped.</m:MessageText>\
                   <m:ResponseCode>ErrorBatchProcessingStopped</m:ResponseCode>\
                   <m:DescriptiveLinkKey>0</m:DescriptiveLinkKey>\
                   </m:DeleteItemResponseMessage>";
        let mut invoked = false;
        let envelope = read_envelope(doc, &mut invoked).unwrap();
        assert!(!invoked);
        assert_eq!(envelope.response_class, ResponseClass::Warning);
        assert_eq!(envelope.code, ResponseCode::BatchProcessingStopped);
        assert_eq!(envelope.message.as_deref(), Some("Batch stopped."));
    }

    #[test]
    fn ordinary_warning_still_reads_payload() {
        let doc = "<m:DeleteItemResponseMessage ResponseClass=\"Warning\">\
                   <m:MessageText>Partial.</m:MessageText>\
                   <m:ResponseCode>ErrorSomethingMinor</m:ResponseCode>\
                   </m:DeleteItemResponseMessage>";
        let mut invoked = false;
        let envelope = read_envelope(doc, &mut invoked).unwrap();
        assert!(invoked);
        assert_eq!(
            envelope.code,
            ResponseCode::Other("ErrorSomethingMinor".to_string())
        );
    }

    #[test]
    fn error_collects_detail_and_offending_fields() {
        let doc = "<m:DeleteItemResponseMessage ResponseClass=\"Error\">\
                   <m:MessageText>The property is invalid.</m:MessageText>\
                   <m:ResponseCode>ErrorInvalidPropertySet</m:ResponseCode>\
                   <m:DescriptiveLinkKey>0</m:DescriptiveLinkKey>\
                   <m:MessageXml>\
                   <t:Value Name=\"Server\">MBX01</t:Value>\
                   <t:FieldURI FieldURI=\"item:Subject\"/>\
                   <t:IndexedFieldURI FieldURI=\"contacts:EmailAddress\" FieldIndex=\"EmailAddress1\"/>\
                   </m:MessageXml>\
                   </m:DeleteItemResponseMessage>";
        let mut invoked = false;
        let envelope = read_envelope(doc, &mut invoked).unwrap();
        assert!(!invoked);
        assert!(envelope.is_error());
        assert_eq!(
            envelope.code,
            ResponseCode::Other("ErrorInvalidPropertySet".to_string())
        );
        assert_eq!(envelope.detail.get("Server").map(String::as_str), Some("MBX01"));
        assert_eq!(
            envelope.offending_fields,
            vec![
                OffendingField::Simple("item:Subject".to_string()),
                OffendingField::Indexed {
                    uri: "contacts:EmailAddress".to_string(),
                    index: "EmailAddress1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn throw_if_error_raises_a_service_fault() {
        let doc = "<m:DeleteItemResponseMessage ResponseClass=\"Error\">\
                   <m:MessageText>Nope.</m:MessageText>\
                   <m:ResponseCode>ErrorAccessDenied</m:ResponseCode>\
                   </m:DeleteItemResponseMessage>";
        let mut invoked = false;
        let envelope = read_envelope(doc, &mut invoked).unwrap();
        let err = envelope.throw_if_error().unwrap_err();
        match err {
            ProtocolError::Service(fault) => {
                assert_eq!(fault.code, ResponseCode::Other("ErrorAccessDenied".to_string()));
                assert_eq!(fault.to_string(), "ErrorAccessDenied: Nope.");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_result_codes_can_be_suppressed() {
        let doc = "<m:DeleteItemResponseMessage ResponseClass=\"Error\">\
                   <m:ResponseCode>ErrorNameResolutionNoResults</m:ResponseCode>\
                   </m:DeleteItemResponseMessage>";
        let mut invoked = false;
        let envelope = read_envelope(doc, &mut invoked).unwrap();
        assert!(envelope.throw_if_error().is_err());
        envelope
            .throw_if_error_unless(ResponseCode::is_empty_result_code)
            .unwrap();
    }

    #[test]
    fn unknown_response_class_is_rejected() {
        let doc = "<m:DeleteItemResponseMessage ResponseClass=\"Mystery\">\
                   </m:DeleteItemResponseMessage>";
        let mut invoked = false;
        let err = read_envelope(doc, &mut invoked).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownResponseClass(c) if c == "Mystery"));
    }
}
