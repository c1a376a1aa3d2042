//! XML document writer.

use crate::error::{XmlError, XmlResult};
use crate::name::Namespace;
use crate::text::escape_text;

/// Builds an XML document symmetric with what [`crate::XmlReader`] accepts.
///
/// Elements left empty collapse to the self-closing form on
/// [`XmlWriter::end_element`].
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
    stack: Vec<String>,
    tag_open: bool,
}

impl XmlWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a namespace-qualified element.
    pub fn start_element(&mut self, ns: Namespace, local: &str) {
        self.close_start_tag();
        let name = format!("{}:{}", ns.prefix(), local);
        self.out.push('<');
        self.out.push_str(&name);
        self.stack.push(name);
        self.tag_open = true;
    }

    /// Write an attribute on the element whose start tag is still open.
    pub fn attribute(&mut self, name: &str, value: &str) -> XmlResult<()> {
        if !self.tag_open {
            return Err(XmlError::malformed("attribute written outside a start tag"));
        }
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        self.out.push_str(&escape_text(value));
        self.out.push('"');
        Ok(())
    }

    /// Declare the protocol namespaces on the element currently open.
    ///
    /// Conventionally called on the document root.
    pub fn declare_namespaces(&mut self) -> XmlResult<()> {
        for ns in [Namespace::Soap, Namespace::Messages, Namespace::Types] {
            self.attribute(&format!("xmlns:{}", ns.prefix()), ns.uri())?;
        }
        Ok(())
    }

    /// Write escaped character data inside the current element.
    pub fn text(&mut self, value: &str) -> XmlResult<()> {
        if self.stack.is_empty() {
            return Err(XmlError::malformed("text outside of root element"));
        }
        self.close_start_tag();
        self.out.push_str(&escape_text(value));
        Ok(())
    }

    /// Close the most recently opened element.
    pub fn end_element(&mut self) -> XmlResult<()> {
        let name = self
            .stack
            .pop()
            .ok_or_else(|| XmlError::malformed("end_element with no open element"))?;
        if self.tag_open {
            self.out.push_str("/>");
            self.tag_open = false;
        } else {
            self.out.push_str("</");
            self.out.push_str(&name);
            self.out.push('>');
        }
        Ok(())
    }

    /// Number of elements currently open.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Consume the writer and return the document.
    ///
    /// # Errors
    ///
    /// Returns an error if any element is still open.
    pub fn finish(self) -> XmlResult<String> {
        if let Some(name) = self.stack.last() {
            return Err(XmlError::malformed(format!("element <{name}> never closed")));
        }
        Ok(self.out)
    }

    fn close_start_tag(&mut self) {
        if self.tag_open {
            self.out.push('>');
            self.tag_open = false;
        }
    }
}
