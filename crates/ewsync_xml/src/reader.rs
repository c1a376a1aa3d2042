//! Pull-based XML reader.

use crate::error::{XmlError, XmlResult};
use crate::name::Namespace;
use crate::text::unescape_text;

/// A single parse event under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// An element start tag.
    StartElement {
        /// Namespace prefix as written on the wire, if any.
        prefix: Option<String>,
        /// Local element name.
        local: String,
        /// Attributes in document order, values already unescaped.
        attributes: Vec<(String, String)>,
        /// Whether the tag was written in `<a/>` form.
        self_closing: bool,
    },
    /// An element end tag.
    EndElement {
        /// Namespace prefix as written on the wire, if any.
        prefix: Option<String>,
        /// Local element name.
        local: String,
    },
    /// Character data between tags, unescaped.
    Text(String),
    /// End of the document.
    Eof,
}

impl XmlEvent {
    fn describe(&self) -> String {
        match self {
            XmlEvent::StartElement { prefix, local, .. } => {
                format!("<{}>", qname(prefix.as_deref(), local))
            }
            XmlEvent::EndElement { prefix, local } => {
                format!("</{}>", qname(prefix.as_deref(), local))
            }
            XmlEvent::Text(_) => "text".to_string(),
            XmlEvent::Eof => "end of input".to_string(),
        }
    }
}

fn qname(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// A pull cursor over an XML document.
///
/// The reader tracks open elements so mismatched end tags are rejected,
/// skips prolog, comments and processing instructions, and surfaces
/// self-closing tags as a start event followed by a synthesized end
/// event so consumers never special-case the `<a/>` form.
pub struct XmlReader<'a> {
    input: &'a str,
    pos: usize,
    current: XmlEvent,
    pending_end: Option<(Option<String>, String)>,
    open: Vec<(Option<String>, String)>,
}

impl<'a> XmlReader<'a> {
    /// Create a reader positioned at the document's first event.
    pub fn new(input: &'a str) -> XmlResult<Self> {
        let mut reader = Self {
            input,
            pos: 0,
            current: XmlEvent::Eof,
            pending_end: None,
            open: Vec::new(),
        };
        reader.advance()?;
        Ok(reader)
    }

    /// The event currently under the cursor.
    pub fn current(&self) -> &XmlEvent {
        &self.current
    }

    /// Move the cursor to the next event.
    pub fn advance(&mut self) -> XmlResult<()> {
        if let Some((prefix, local)) = self.pending_end.take() {
            self.current = XmlEvent::EndElement { prefix, local };
            return Ok(());
        }
        self.current = self.lex()?;
        if let XmlEvent::StartElement {
            prefix,
            local,
            self_closing: true,
            ..
        } = &self.current
        {
            self.pending_end = Some((prefix.clone(), local.clone()));
        }
        Ok(())
    }

    /// True if the cursor is at the given start element.
    pub fn is_start_element(&self, ns: Namespace, name: &str) -> bool {
        matches!(
            &self.current,
            XmlEvent::StartElement { prefix, local, .. }
                if local == name && prefix.as_deref() == Some(ns.prefix())
        )
    }

    /// True if the cursor is at any start element.
    pub fn is_any_start_element(&self) -> bool {
        matches!(&self.current, XmlEvent::StartElement { .. })
    }

    /// True if the cursor is at the given end element.
    pub fn is_end_element(&self, ns: Namespace, name: &str) -> bool {
        matches!(
            &self.current,
            XmlEvent::EndElement { prefix, local }
                if local == name && prefix.as_deref() == Some(ns.prefix())
        )
    }

    /// Local name of the current start or end element.
    pub fn local_name(&self) -> Option<&str> {
        match &self.current {
            XmlEvent::StartElement { local, .. } | XmlEvent::EndElement { local, .. } => {
                Some(local)
            }
            _ => None,
        }
    }

    /// Namespace of the current start or end element, if its prefix is known.
    pub fn namespace(&self) -> Option<Namespace> {
        match &self.current {
            XmlEvent::StartElement { prefix, .. } | XmlEvent::EndElement { prefix, .. } => {
                prefix.as_deref().and_then(Namespace::from_prefix)
            }
            _ => None,
        }
    }

    /// Value of the named attribute on the current start element.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.current {
            XmlEvent::StartElement { attributes, .. } => attributes
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    /// Error unless the cursor is at the given start element. Does not move.
    pub fn expect_start_element(&self, ns: Namespace, name: &str) -> XmlResult<()> {
        if self.is_start_element(ns, name) {
            Ok(())
        } else {
            Err(XmlError::UnexpectedElement {
                expected: format!("{}:{}", ns.prefix(), name),
                found: self.current.describe(),
            })
        }
    }

    /// Consume the given start element and move into its content.
    pub fn read_start_element(&mut self, ns: Namespace, name: &str) -> XmlResult<()> {
        self.expect_start_element(ns, name)?;
        self.advance()
    }

    /// Consume the given end element.
    pub fn read_end_element(&mut self, ns: Namespace, name: &str) -> XmlResult<()> {
        if self.is_end_element(ns, name) {
            self.advance()
        } else {
            Err(XmlError::UnexpectedElement {
                expected: format!("/{}:{}", ns.prefix(), name),
                found: self.current.describe(),
            })
        }
    }

    /// Consume the text content under the cursor.
    ///
    /// An immediate end element yields the empty string, so empty and
    /// self-closing elements read uniformly.
    pub fn read_text(&mut self) -> XmlResult<String> {
        match &self.current {
            XmlEvent::Text(text) => {
                let text = text.clone();
                self.advance()?;
                Ok(text)
            }
            XmlEvent::EndElement { .. } => Ok(String::new()),
            other => Err(XmlError::UnexpectedEvent {
                expected: "text".to_string(),
                found: other.describe(),
            }),
        }
    }

    /// Read `<ns:name>text</ns:name>` and return the text.
    pub fn read_element_text(&mut self, ns: Namespace, name: &str) -> XmlResult<String> {
        self.read_start_element(ns, name)?;
        let text = self.read_text()?;
        self.read_end_element(ns, name)?;
        Ok(text)
    }

    /// Read an element whose text is a schema boolean.
    pub fn read_bool_element(&mut self, ns: Namespace, name: &str) -> XmlResult<bool> {
        let text = self.read_element_text(ns, name)?;
        parse_bool(&text)
    }

    /// Read an element whose text is an integer.
    pub fn read_int_element(&mut self, ns: Namespace, name: &str) -> XmlResult<i64> {
        let text = self.read_element_text(ns, name)?;
        text.trim()
            .parse()
            .map_err(|_| XmlError::invalid_value("integer", text))
    }

    /// Discard the element under the cursor together with its whole
    /// subtree, leaving the cursor at the next sibling event.
    pub fn skip_element(&mut self) -> XmlResult<()> {
        if !self.is_any_start_element() {
            return Err(XmlError::UnexpectedEvent {
                expected: "element start".to_string(),
                found: self.current.describe(),
            });
        }
        let mut depth = 0usize;
        loop {
            match &self.current {
                XmlEvent::StartElement { .. } => depth += 1,
                XmlEvent::EndElement { .. } => {
                    depth -= 1;
                    if depth == 0 {
                        return self.advance();
                    }
                }
                XmlEvent::Text(_) => {}
                XmlEvent::Eof => return Err(XmlError::UnexpectedEof),
            }
            self.advance()?;
        }
    }

    fn lex(&mut self) -> XmlResult<XmlEvent> {
        loop {
            let bytes = self.input.as_bytes();
            if self.pos >= bytes.len() {
                if !self.open.is_empty() {
                    return Err(XmlError::UnexpectedEof);
                }
                return Ok(XmlEvent::Eof);
            }
            if bytes[self.pos] == b'<' {
                let rest = &self.input[self.pos..];
                if rest.starts_with("<?") {
                    self.skip_past("?>")?;
                } else if rest.starts_with("<!--") {
                    self.skip_past("-->")?;
                } else if rest.starts_with("<![CDATA[") {
                    return self.lex_cdata();
                } else if rest.starts_with("<!") {
                    self.skip_past(">")?;
                } else if rest.starts_with("</") {
                    return self.lex_end_element();
                } else {
                    return self.lex_start_element();
                }
            } else {
                let start = self.pos;
                while self.pos < bytes.len() && bytes[self.pos] != b'<' {
                    self.pos += 1;
                }
                let raw = self.input[start..self.pos].trim();
                if raw.is_empty() {
                    continue;
                }
                if self.open.is_empty() {
                    return Err(XmlError::malformed("text outside of root element"));
                }
                return Ok(XmlEvent::Text(unescape_text(raw)?));
            }
        }
    }

    fn lex_cdata(&mut self) -> XmlResult<XmlEvent> {
        self.pos += "<![CDATA[".len();
        let end = self.input[self.pos..]
            .find("]]>")
            .ok_or(XmlError::UnexpectedEof)?;
        let text = self.input[self.pos..self.pos + end].to_string();
        self.pos += end + "]]>".len();
        if self.open.is_empty() {
            return Err(XmlError::malformed("text outside of root element"));
        }
        Ok(XmlEvent::Text(text))
    }

    fn lex_start_element(&mut self) -> XmlResult<XmlEvent> {
        self.pos += 1;
        let name = self.read_name()?;
        let mut attributes = Vec::new();
        let self_closing;
        loop {
            self.skip_whitespace();
            let bytes = self.input.as_bytes();
            match bytes.get(self.pos) {
                None => return Err(XmlError::UnexpectedEof),
                Some(b'>') => {
                    self.pos += 1;
                    self_closing = false;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    self.expect_byte(b'>')?;
                    self_closing = true;
                    break;
                }
                Some(_) => {
                    let attr_name = self.read_name()?;
                    self.skip_whitespace();
                    self.expect_byte(b'=')?;
                    self.skip_whitespace();
                    let value = self.read_quoted()?;
                    attributes.push((attr_name, value));
                }
            }
        }
        let (prefix, local) = split_qname(&name);
        let prefix = prefix.map(str::to_string);
        let local = local.to_string();
        if !self_closing {
            self.open.push((prefix.clone(), local.clone()));
        }
        Ok(XmlEvent::StartElement {
            prefix,
            local,
            attributes,
            self_closing,
        })
    }

    fn lex_end_element(&mut self) -> XmlResult<XmlEvent> {
        self.pos += 2;
        let name = self.read_name()?;
        self.skip_whitespace();
        self.expect_byte(b'>')?;
        let (prefix, local) = split_qname(&name);
        match self.open.pop() {
            Some((open_prefix, open_local))
                if open_prefix.as_deref() == prefix && open_local == local => {}
            Some((open_prefix, open_local)) => {
                return Err(XmlError::malformed(format!(
                    "mismatched end tag </{}>, open element is <{}>",
                    name,
                    qname(open_prefix.as_deref(), &open_local)
                )));
            }
            None => {
                return Err(XmlError::malformed(format!(
                    "end tag </{name}> with no open element"
                )));
            }
        }
        Ok(XmlEvent::EndElement {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
        })
    }

    fn skip_past(&mut self, delimiter: &str) -> XmlResult<()> {
        match self.input[self.pos..].find(delimiter) {
            Some(idx) => {
                self.pos += idx + delimiter.len();
                Ok(())
            }
            None => Err(XmlError::UnexpectedEof),
        }
    }

    fn read_name(&mut self) -> XmlResult<String> {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            if b.is_ascii_whitespace() || matches!(b, b'>' | b'/' | b'=') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(XmlError::malformed("expected a name"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn read_quoted(&mut self) -> XmlResult<String> {
        let bytes = self.input.as_bytes();
        let quote = *bytes.get(self.pos).ok_or(XmlError::UnexpectedEof)?;
        if quote != b'"' && quote != b'\'' {
            return Err(XmlError::malformed("expected a quoted attribute value"));
        }
        self.pos += 1;
        let start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos] != quote {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Err(XmlError::UnexpectedEof);
        }
        let raw = &self.input[start..self.pos];
        self.pos += 1;
        unescape_text(raw)
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn expect_byte(&mut self, expected: u8) -> XmlResult<()> {
        match self.input.as_bytes().get(self.pos) {
            Some(&b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(XmlError::malformed(format!(
                "expected {:?}",
                char::from(expected)
            ))),
            None => Err(XmlError::UnexpectedEof),
        }
    }
}

fn parse_bool(text: &str) -> XmlResult<bool> {
    match text.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(XmlError::invalid_value("boolean", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_element_text() {
        let mut reader = XmlReader::new("<t:Subject>Hello &amp; welcome</t:Subject>").unwrap();
        let text = reader
            .read_element_text(Namespace::Types, "Subject")
            .unwrap();
        assert_eq!(text, "Hello & welcome");
        assert_eq!(reader.current(), &XmlEvent::Eof);
    }

    #[test]
    fn skips_prolog_and_comments() {
        let doc = "<?xml version=\"1.0\"?><!-- hi --><m:Root></m:Root>";
        let reader = XmlReader::new(doc).unwrap();
        assert!(reader.is_start_element(Namespace::Messages, "Root"));
    }

    #[test]
    fn skips_doctype_and_inner_comments() {
        let doc = "<!DOCTYPE html><t:A><!-- note --><t:B>1</t:B></t:A>";
        let mut reader = XmlReader::new(doc).unwrap();
        reader.read_start_element(Namespace::Types, "A").unwrap();
        assert_eq!(reader.read_int_element(Namespace::Types, "B").unwrap(), 1);
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        assert!(matches!(
            XmlReader::new("<!-- never closed"),
            Err(XmlError::UnexpectedEof)
        ));
    }

    #[test]
    fn self_closing_surfaces_synthesized_end() {
        let mut reader = XmlReader::new("<t:Outer><t:Inner Id=\"5\"/></t:Outer>").unwrap();
        reader.read_start_element(Namespace::Types, "Outer").unwrap();
        assert!(reader.is_start_element(Namespace::Types, "Inner"));
        assert_eq!(reader.attribute("Id"), Some("5"));
        reader.advance().unwrap();
        assert!(reader.is_end_element(Namespace::Types, "Inner"));
        reader.read_end_element(Namespace::Types, "Inner").unwrap();
        reader.read_end_element(Namespace::Types, "Outer").unwrap();
    }

    #[test]
    fn skip_element_discards_whole_subtree() {
        let doc = "<t:A><t:Unknown><t:Deep>x</t:Deep><t:Also/></t:Unknown><t:B>1</t:B></t:A>";
        let mut reader = XmlReader::new(doc).unwrap();
        reader.read_start_element(Namespace::Types, "A").unwrap();
        reader.skip_element().unwrap();
        assert!(reader.is_start_element(Namespace::Types, "B"));
    }

    #[test]
    fn mismatched_end_tag_is_an_error() {
        let mut reader = XmlReader::new("<t:A><t:B></t:A></t:B>").unwrap();
        reader.read_start_element(Namespace::Types, "A").unwrap();
        // Consuming <t:B> advances onto the mismatched </t:A>, so the
        // error surfaces here.
        assert!(matches!(
            reader.read_start_element(Namespace::Types, "B"),
            Err(XmlError::MalformedMarkup { .. })
        ));
    }

    #[test]
    fn truncated_document_is_an_error() {
        let mut reader = XmlReader::new("<t:A><t:B>text").unwrap();
        reader.read_start_element(Namespace::Types, "A").unwrap();
        reader.read_start_element(Namespace::Types, "B").unwrap();
        assert!(matches!(reader.read_text(), Err(XmlError::UnexpectedEof)));
    }

    #[test]
    fn bool_and_int_helpers() {
        let mut reader =
            XmlReader::new("<m:R><m:Flag>true</m:Flag><m:N>-42</m:N></m:R>").unwrap();
        reader.read_start_element(Namespace::Messages, "R").unwrap();
        assert!(reader.read_bool_element(Namespace::Messages, "Flag").unwrap());
        assert_eq!(reader.read_int_element(Namespace::Messages, "N").unwrap(), -42);
    }

    #[test]
    fn empty_element_reads_as_empty_text() {
        let mut reader = XmlReader::new("<t:A></t:A>").unwrap();
        assert_eq!(reader.read_element_text(Namespace::Types, "A").unwrap(), "");
    }

    #[test]
    fn unexpected_element_reports_both_names() {
        let reader = XmlReader::new("<t:Actual>1</t:Actual>").unwrap();
        let err = reader
            .expect_start_element(Namespace::Types, "Wanted")
            .unwrap_err();
        match err {
            XmlError::UnexpectedElement { expected, found } => {
                assert_eq!(expected, "t:Wanted");
                assert_eq!(found, "<t:Actual>");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn cdata_reads_as_raw_text() {
        let mut reader = XmlReader::new("<t:A><![CDATA[a<b&c]]></t:A>").unwrap();
        reader.read_start_element(Namespace::Types, "A").unwrap();
        assert_eq!(reader.read_text().unwrap(), "a<b&c");
    }
}
