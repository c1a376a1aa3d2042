//! Opaque remote object identifiers.

use ewsync_xml::{Namespace, XmlError, XmlReader, XmlResult, XmlWriter};

/// A remote object identifier with its optional change key.
///
/// Both parts are opaque server tokens; the change key names the revision
/// the client last saw and guards conditional updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemId {
    /// The stable object identifier.
    pub id: String,
    /// The revision token, if the server sent one.
    pub change_key: Option<String>,
}

impl ItemId {
    /// Create an identifier with no change key.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            change_key: None,
        }
    }

    /// Create an identifier carrying a change key.
    pub fn with_change_key(id: impl Into<String>, change_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            change_key: Some(change_key.into()),
        }
    }

    /// Read an identifier element such as `<t:ItemId Id=".." ChangeKey=".."/>`,
    /// leaving the cursor at the next sibling.
    pub fn read(reader: &mut XmlReader<'_>, ns: Namespace, name: &str) -> XmlResult<Self> {
        reader.expect_start_element(ns, name)?;
        let id = reader
            .attribute("Id")
            .ok_or_else(|| XmlError::malformed(format!("{name} element without Id")))?
            .to_string();
        let change_key = reader.attribute("ChangeKey").map(str::to_string);
        reader.skip_element()?;
        Ok(Self { id, change_key })
    }

    /// Write this identifier as a self-closing element.
    pub fn write(&self, writer: &mut XmlWriter, ns: Namespace, name: &str) -> XmlResult<()> {
        writer.start_element(ns, name);
        writer.attribute("Id", &self.id)?;
        if let Some(change_key) = &self.change_key {
            writer.attribute("ChangeKey", change_key)?;
        }
        writer.end_element()
    }
}
