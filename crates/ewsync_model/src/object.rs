//! The object read/write contract.

use ewsync_xml::{Namespace, XmlError, XmlEvent, XmlReader, XmlResult, XmlWriter};

/// Contract for anything that reads and writes itself as one XML element.
///
/// Implementors supply the four hooks; the load/patch/write drivers are
/// provided. The load loop enforces the forward-compatibility policy: a
/// child the consume hook declines is skipped wholesale and never fails
/// the parse.
pub trait XmlObject {
    /// Read attributes off the element start tag. The cursor has not
    /// moved past the start element yet.
    fn read_attributes(&mut self, reader: &XmlReader<'_>) -> XmlResult<()> {
        let _ = reader;
        Ok(())
    }

    /// Try to interpret the child element under the cursor.
    ///
    /// On `Ok(true)` the implementation has consumed the child's entire
    /// subtree and left the cursor at the next sibling. On `Ok(false)`
    /// the cursor has not moved and the driver skips the child.
    fn try_read_element(&mut self, reader: &mut XmlReader<'_>) -> XmlResult<bool>;

    /// Patch-merge variant of [`XmlObject::try_read_element`], used when a
    /// partial object must merge into this instance instead of replacing
    /// it wholesale.
    fn try_read_element_for_patch(&mut self, reader: &mut XmlReader<'_>) -> XmlResult<bool> {
        self.try_read_element(reader)
    }

    /// Write attributes onto the open start tag.
    fn write_attributes(&self, writer: &mut XmlWriter) -> XmlResult<()> {
        let _ = writer;
        Ok(())
    }

    /// Write child elements.
    fn write_children(&self, writer: &mut XmlWriter) -> XmlResult<()>;

    /// Read this object from the expected start element through its
    /// matching end element.
    fn load_from(&mut self, reader: &mut XmlReader<'_>, ns: Namespace, name: &str) -> XmlResult<()> {
        self.load_loop(reader, ns, name, false)
    }

    /// Merge a partial wire object into this instance.
    fn patch_from(
        &mut self,
        reader: &mut XmlReader<'_>,
        ns: Namespace,
        name: &str,
    ) -> XmlResult<()> {
        self.load_loop(reader, ns, name, true)
    }

    /// Write this object as `<ns:name>…</ns:name>`, symmetric with
    /// [`XmlObject::load_from`].
    fn write_to(&self, writer: &mut XmlWriter, ns: Namespace, name: &str) -> XmlResult<()> {
        writer.start_element(ns, name);
        self.write_attributes(writer)?;
        self.write_children(writer)?;
        writer.end_element()
    }

    /// Shared driver behind load and patch.
    #[doc(hidden)]
    fn load_loop(
        &mut self,
        reader: &mut XmlReader<'_>,
        ns: Namespace,
        name: &str,
        patch: bool,
    ) -> XmlResult<()> {
        reader.expect_start_element(ns, name)?;
        self.read_attributes(reader)?;
        reader.advance()?;
        loop {
            if reader.is_end_element(ns, name) {
                return reader.read_end_element(ns, name);
            }
            if reader.is_any_start_element() {
                let consumed = if patch {
                    self.try_read_element_for_patch(reader)?
                } else {
                    self.try_read_element(reader)?
                };
                if !consumed {
                    reader.skip_element()?;
                }
            } else if matches!(reader.current(), XmlEvent::Text(_)) {
                // Mixed content carries no schema meaning here.
                reader.advance()?;
            } else {
                return Err(XmlError::UnexpectedEvent {
                    expected: format!("content of {}:{}", ns.prefix(), name),
                    found: format!("{:?}", reader.current()),
                });
            }
        }
    }
}
