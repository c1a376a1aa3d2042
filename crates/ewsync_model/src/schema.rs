//! Static field catalogue: descriptors, object schemas and the registry.
//!
//! One generic descriptor record per field replaces per-field subclassing;
//! readers dispatch on the descriptor table by element name.

use ewsync_xml::{Namespace, XmlResult, XmlWriter};

/// How a field's value is represented on the wire and in memory.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Plain text element.
    Text,
    /// Integer element.
    Integer,
    /// Schema boolean element.
    Boolean,
    /// A nested object described by another schema.
    Object(&'static ObjectSchema),
    /// A keyed dictionary of entries.
    Dictionary(&'static DictionarySchema),
}

/// Wire identity and capabilities of one field.
#[derive(Debug)]
pub struct FieldDescriptor {
    /// The registry identity used in set/delete-field fragments,
    /// e.g. `contacts:PhoneNumber`.
    pub field_uri: &'static str,
    /// Namespace of the field's element.
    pub namespace: Namespace,
    /// Local element name.
    pub local_name: &'static str,
    /// Value representation.
    pub kind: FieldKind,
    /// Whether the field belongs to the summary projection.
    pub in_summary: bool,
}

impl FieldDescriptor {
    /// Emit the plain field identity element.
    pub fn write_field_uri(&self, writer: &mut XmlWriter) -> XmlResult<()> {
        writer.start_element(Namespace::Types, "FieldURI");
        writer.attribute("FieldURI", self.field_uri)?;
        writer.end_element()
    }

    /// Emit the indexed field identity element used for dictionary slots.
    pub fn write_indexed_field_uri(&self, writer: &mut XmlWriter, index: &str) -> XmlResult<()> {
        writer.start_element(Namespace::Types, "IndexedFieldURI");
        writer.attribute("FieldURI", self.field_uri)?;
        writer.attribute("FieldIndex", index)?;
        writer.end_element()
    }
}

/// Value representation of one dictionary entry.
#[derive(Debug, Clone, Copy)]
pub enum EntryKind {
    /// Entry content is plain text.
    Text,
    /// Entry content is a nested object.
    Object(&'static ObjectSchema),
}

/// Wire shape of a keyed dictionary field.
#[derive(Debug)]
pub struct DictionarySchema {
    /// Element wrapping the entry list; equals the owning field's element.
    pub entries_name: &'static str,
    /// Element name of one entry.
    pub entry_name: &'static str,
    /// Attribute carrying the entry key.
    pub key_attribute: &'static str,
    /// Entry value representation.
    pub entry_kind: EntryKind,
}

/// Self-description of one object type: element identity, update wrapper
/// names and the field table.
#[derive(Debug)]
pub struct ObjectSchema {
    /// Namespace of the object element.
    pub namespace: Namespace,
    /// Local name of the object element.
    pub element_name: &'static str,
    /// Wrapper element for set-field update fragments.
    pub set_field_element: &'static str,
    /// Wrapper element for delete-field update fragments.
    pub delete_field_element: &'static str,
    /// The object's fields, in wire order.
    pub fields: &'static [FieldDescriptor],
}

impl ObjectSchema {
    /// Look up a field by its element identity.
    pub fn field_by_name(
        &self,
        ns: Namespace,
        local: &str,
    ) -> Option<&'static FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.namespace == ns && f.local_name == local)
    }

    /// Look up a field by its registry identity.
    pub fn field_by_uri(&self, uri: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.field_uri == uri)
    }
}

/// The projection a read honors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyShape {
    /// Identifiers only; no property elements are materialized.
    IdOnly,
    /// Summary fields only.
    Summary,
    /// Every schema field.
    AllProperties,
}

impl PropertyShape {
    /// Whether a field belongs to this projection.
    pub fn includes(self, field: &FieldDescriptor) -> bool {
        match self {
            PropertyShape::IdOnly => false,
            PropertyShape::Summary => field.in_summary,
            PropertyShape::AllProperties => true,
        }
    }
}

/// Maps wire element names to object schemas.
///
/// Used wherever a payload names the concrete type to materialize, e.g.
/// the create/update arms of a sync-changes read.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    schemas: Vec<&'static ObjectSchema>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from a schema list.
    pub fn with_schemas(schemas: &[&'static ObjectSchema]) -> Self {
        Self {
            schemas: schemas.to_vec(),
        }
    }

    /// Register an object schema.
    pub fn register(&mut self, schema: &'static ObjectSchema) {
        self.schemas.push(schema);
    }

    /// Resolve an element name to its schema.
    pub fn resolve(&self, element_name: &str) -> Option<&'static ObjectSchema> {
        self.schemas
            .iter()
            .copied()
            .find(|s| s.element_name == element_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ewsync_xml::XmlWriter;

    static FIELDS: [FieldDescriptor; 2] = [
        FieldDescriptor {
            field_uri: "item:Subject",
            namespace: Namespace::Types,
            local_name: "Subject",
            kind: FieldKind::Text,
            in_summary: true,
        },
        FieldDescriptor {
            field_uri: "item:Size",
            namespace: Namespace::Types,
            local_name: "Size",
            kind: FieldKind::Integer,
            in_summary: false,
        },
    ];

    static ITEM: ObjectSchema = ObjectSchema {
        namespace: Namespace::Types,
        element_name: "Item",
        set_field_element: "SetItemField",
        delete_field_element: "DeleteItemField",
        fields: &FIELDS,
    };

    #[test]
    fn field_lookup() {
        assert!(ITEM.field_by_name(Namespace::Types, "Subject").is_some());
        assert!(ITEM.field_by_name(Namespace::Messages, "Subject").is_none());
        assert!(ITEM.field_by_uri("item:Size").is_some());
        assert!(ITEM.field_by_uri("item:Missing").is_none());
    }

    #[test]
    fn shape_projection() {
        let subject = ITEM.field_by_uri("item:Subject").unwrap();
        let size = ITEM.field_by_uri("item:Size").unwrap();
        assert!(PropertyShape::AllProperties.includes(size));
        assert!(PropertyShape::Summary.includes(subject));
        assert!(!PropertyShape::Summary.includes(size));
        assert!(!PropertyShape::IdOnly.includes(subject));
    }

    #[test]
    fn registry_resolution() {
        let registry = ObjectRegistry::with_schemas(&[&ITEM]);
        assert!(registry.resolve("Item").is_some());
        assert!(registry.resolve("Folder").is_none());
    }

    #[test]
    fn field_uri_fragment() {
        let field = ITEM.field_by_uri("item:Subject").unwrap();
        let mut writer = XmlWriter::new();
        field.write_field_uri(&mut writer).unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            "<t:FieldURI FieldURI=\"item:Subject\"/>"
        );
    }

    #[test]
    fn indexed_field_uri_fragment() {
        let field = ITEM.field_by_uri("item:Subject").unwrap();
        let mut writer = XmlWriter::new();
        field.write_indexed_field_uri(&mut writer, "Slot1").unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            "<t:IndexedFieldURI FieldURI=\"item:Subject\" FieldIndex=\"Slot1\"/>"
        );
    }
}
