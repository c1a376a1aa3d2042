//! The incremental change-stream reader.
//!
//! One sync round answers with a continuation token, a completeness flag
//! and an ordered list of changes. [`read_changes`] decodes that frame
//! and materializes created or updated objects through the caller's
//! [`ObjectRegistry`].

use ewsync_model::{ObjectRegistry, PropertyBag, PropertyShape, XmlObject};
use ewsync_xml::{Namespace, XmlError, XmlReader};

use crate::error::{ProtocolError, ProtocolResult};
use crate::item_id::ItemId;

/// The kind of one remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// An object appeared in the synced range.
    Create,
    /// An object in the range changed.
    Update,
    /// An object left the range.
    Delete,
    /// Only the object's read flag changed.
    ReadFlagChange,
}

impl ChangeKind {
    fn element_name(self) -> &'static str {
        match self {
            ChangeKind::Create => "Create",
            ChangeKind::Update => "Update",
            ChangeKind::Delete => "Delete",
            ChangeKind::ReadFlagChange => "ReadFlagChange",
        }
    }
}

/// One remote change, in server order.
#[derive(Debug, Clone)]
pub struct Change {
    /// What happened.
    pub kind: ChangeKind,
    /// The identifier of the affected object.
    pub item_id: ItemId,
    /// The materialized object; present for creates and updates.
    pub object: Option<PropertyBag>,
    /// The new read flag; present for read-flag changes.
    pub is_read: Option<bool>,
}

/// The result of one sync round.
#[derive(Debug, Clone)]
pub struct ChangeCollection {
    /// Changes in the order the server reported them.
    pub changes: Vec<Change>,
    /// Opaque continuation token to send with the next round.
    pub sync_state: String,
    /// Whether another round would return further changes.
    pub more_available: bool,
}

impl ChangeCollection {
    /// Number of changes in this round.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether this round carried no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterate over the changes in server order.
    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }
}

impl IntoIterator for ChangeCollection {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// Read the payload of one sync round: continuation token, completeness
/// flag and the change list.
///
/// The cursor must be at the `SyncState` child; on return it is at the
/// first sibling after the change container. Change entries naming an
/// unknown kind are skipped; entries naming an unregistered object type
/// fail the read.
pub fn read_changes(
    reader: &mut XmlReader<'_>,
    registry: &ObjectRegistry,
    shape: PropertyShape,
) -> ProtocolResult<ChangeCollection> {
    let sync_state = reader.read_element_text(Namespace::Messages, "SyncState")?;
    let includes_last = reader.read_bool_element(Namespace::Messages, "IncludesLastItemInRange")?;

    let mut changes = Vec::new();
    reader.read_start_element(Namespace::Messages, "Changes")?;
    loop {
        if reader.is_end_element(Namespace::Messages, "Changes") {
            reader.read_end_element(Namespace::Messages, "Changes")?;
            break;
        }
        if !reader.is_any_start_element() {
            reader.advance()?;
            continue;
        }
        if reader.is_start_element(Namespace::Types, "Create") {
            changes.push(read_object_change(reader, registry, shape, ChangeKind::Create)?);
        } else if reader.is_start_element(Namespace::Types, "Update") {
            changes.push(read_object_change(reader, registry, shape, ChangeKind::Update)?);
        } else if reader.is_start_element(Namespace::Types, "Delete") {
            changes.push(read_id_change(reader, ChangeKind::Delete)?);
        } else if reader.is_start_element(Namespace::Types, "ReadFlagChange") {
            changes.push(read_id_change(reader, ChangeKind::ReadFlagChange)?);
        } else {
            reader.skip_element()?;
        }
    }

    Ok(ChangeCollection {
        changes,
        sync_state,
        more_available: !includes_last,
    })
}

/// Reads a create or update entry: the wrapper names the kind, its single
/// child names the concrete object type.
fn read_object_change(
    reader: &mut XmlReader<'_>,
    registry: &ObjectRegistry,
    shape: PropertyShape,
    kind: ChangeKind,
) -> ProtocolResult<Change> {
    let wrapper = kind.element_name();
    reader.read_start_element(Namespace::Types, wrapper)?;
    if !reader.is_any_start_element() {
        return Err(ProtocolError::Xml(XmlError::malformed(format!(
            "{wrapper} change without an object element"
        ))));
    }
    let element = reader
        .local_name()
        .ok_or(XmlError::UnexpectedEof)?
        .to_string();
    let schema = registry
        .resolve(&element)
        .ok_or(ProtocolError::UnknownObject(element))?;

    // The object's identifier travels as an attribute-bearing child, so it
    // is captured here rather than through the schema table.
    let mut bag = PropertyBag::with_shape(schema, shape);
    let mut item_id = None;
    reader.read_start_element(schema.namespace, schema.element_name)?;
    loop {
        if reader.is_end_element(schema.namespace, schema.element_name) {
            reader.read_end_element(schema.namespace, schema.element_name)?;
            break;
        }
        if reader.is_start_element(Namespace::Types, "ItemId") {
            item_id = Some(ItemId::read(reader, Namespace::Types, "ItemId")?);
        } else if reader.is_any_start_element() {
            if !bag.try_read_element(reader)? {
                reader.skip_element()?;
            }
        } else {
            reader.advance()?;
        }
    }
    let item_id = item_id
        .ok_or_else(|| XmlError::malformed(format!("{wrapper} change object without ItemId")))?;

    skip_to_wrapper_end(reader, wrapper)?;
    Ok(Change {
        kind,
        item_id,
        object: Some(bag),
        is_read: None,
    })
}

/// Reads a delete or read-flag entry, which carry a bare identifier.
fn read_id_change(reader: &mut XmlReader<'_>, kind: ChangeKind) -> ProtocolResult<Change> {
    let wrapper = kind.element_name();
    reader.read_start_element(Namespace::Types, wrapper)?;
    let item_id = ItemId::read(reader, Namespace::Types, "ItemId")?;
    let mut is_read = None;
    loop {
        if reader.is_end_element(Namespace::Types, wrapper) {
            reader.read_end_element(Namespace::Types, wrapper)?;
            break;
        }
        if kind == ChangeKind::ReadFlagChange
            && reader.is_start_element(Namespace::Types, "IsRead")
        {
            is_read = Some(reader.read_bool_element(Namespace::Types, "IsRead")?);
        } else if reader.is_any_start_element() {
            reader.skip_element()?;
        } else {
            reader.advance()?;
        }
    }
    Ok(Change {
        kind,
        item_id,
        object: None,
        is_read,
    })
}

fn skip_to_wrapper_end(reader: &mut XmlReader<'_>, wrapper: &str) -> ProtocolResult<()> {
    loop {
        if reader.is_end_element(Namespace::Types, wrapper) {
            reader.read_end_element(Namespace::Types, wrapper)?;
            return Ok(());
        }
        if reader.is_any_start_element() {
            reader.skip_element()?;
        } else {
            reader.advance()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ewsync_model::{FieldDescriptor, FieldKind, ObjectSchema};

    static MESSAGE_FIELDS: [FieldDescriptor; 2] = [
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

    static MESSAGE: ObjectSchema = ObjectSchema {
        namespace: Namespace::Types,
        element_name: "Message",
        set_field_element: "SetItemField",
        delete_field_element: "DeleteItemField",
        fields: &MESSAGE_FIELDS,
    };

    fn registry() -> ObjectRegistry {
        ObjectRegistry::with_schemas(&[&MESSAGE])
    }

    const ROUND: &str = "<m:SyncState>H4sIAAA=</m:SyncState>\
        <m:IncludesLastItemInRange>false</m:IncludesLastItemInRange>\
        <m:Changes>\
        <t:Create><t:Message>\
        <t:ItemId Id=\"id-1\" ChangeKey=\"ck-1\"/>\
        <t:Subject>First</t:Subject><t:Size>120</t:Size>\
        </t:Message></t:Create>\
        <t:Update><t:Message>\
        <t:ItemId Id=\"id-2\"/>\
        <t:Subject>Second</t:Subject>\
        </t:Message></t:Update>\
        <t:Delete><t:ItemId Id=\"id-3\" ChangeKey=\"ck-3\"/></t:Delete>\
        <t:ReadFlagChange><t:ItemId Id=\"id-4\"/><t:IsRead>true</t:IsRead></t:ReadFlagChange>\
        </m:Changes>";

    fn wrap(body: &str) -> String {
        format!("<m:Payload>{body}</m:Payload>")
    }

    fn read(doc: &str, shape: PropertyShape) -> ProtocolResult<ChangeCollection> {
        let mut reader = XmlReader::new(doc).unwrap();
        reader
            .read_start_element(Namespace::Messages, "Payload")
            .unwrap();
        let collection = read_changes(&mut reader, &registry(), shape)?;
        reader
            .read_end_element(Namespace::Messages, "Payload")
            .unwrap();
        Ok(collection)
    }

    #[test]
    fn reads_a_full_round_in_server_order() {
        let doc = wrap(ROUND);
        let collection = read(&doc, PropertyShape::AllProperties).unwrap();
        assert_eq!(collection.sync_state, "H4sIAAA=");
        assert!(collection.more_available);
        assert_eq!(collection.len(), 4);

        let kinds: Vec<ChangeKind> = collection.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Create,
                ChangeKind::Update,
                ChangeKind::Delete,
                ChangeKind::ReadFlagChange,
            ]
        );

        let create = &collection.changes[0];
        assert_eq!(create.item_id, ItemId::with_change_key("id-1", "ck-1"));
        let bag = create.object.as_ref().unwrap();
        let subject = MESSAGE.field_by_uri("item:Subject").unwrap();
        let size = MESSAGE.field_by_uri("item:Size").unwrap();
        assert_eq!(bag.text(subject), Some("First"));
        assert_eq!(bag.integer(size), Some(120));
        assert!(!bag.is_dirty());

        let delete = &collection.changes[2];
        assert!(delete.object.is_none());
        assert_eq!(delete.item_id.id, "id-3");

        let read_flag = &collection.changes[3];
        assert_eq!(read_flag.is_read, Some(true));
        assert_eq!(read_flag.item_id.id, "id-4");
    }

    #[test]
    fn last_round_clears_more_available() {
        let doc = wrap(
            "<m:SyncState>tok</m:SyncState>\
             <m:IncludesLastItemInRange>true</m:IncludesLastItemInRange>\
             <m:Changes></m:Changes>",
        );
        let collection = read(&doc, PropertyShape::AllProperties).unwrap();
        assert!(collection.is_empty());
        assert!(!collection.more_available);
        assert_eq!(collection.sync_state, "tok");
    }

    #[test]
    fn unknown_change_kinds_are_skipped() {
        let doc = wrap(
            "<m:SyncState>tok</m:SyncState>\
             <m:IncludesLastItemInRange>true</m:IncludesLastItemInRange>\
             <m:Changes>\
             <t:Promote><t:ItemId Id=\"x\"/></t:Promote>\
             <t:Delete><t:ItemId Id=\"id-9\"/></t:Delete>\
             </m:Changes>",
        );
        let collection = read(&doc, PropertyShape::AllProperties).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.changes[0].kind, ChangeKind::Delete);
    }

    #[test]
    fn unregistered_object_type_fails_the_read() {
        let doc = wrap(
            "<m:SyncState>tok</m:SyncState>\
             <m:IncludesLastItemInRange>true</m:IncludesLastItemInRange>\
             <m:Changes>\
             <t:Create><t:Appointment><t:ItemId Id=\"x\"/></t:Appointment></t:Create>\
             </m:Changes>",
        );
        let err = read(&doc, PropertyShape::AllProperties).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownObject(name) if name == "Appointment"));
    }

    #[test]
    fn shape_is_forwarded_to_materialized_objects() {
        let doc = wrap(ROUND);
        let collection = read(&doc, PropertyShape::Summary).unwrap();
        let bag = collection.changes[0].object.as_ref().unwrap();
        let subject = MESSAGE.field_by_uri("item:Subject").unwrap();
        let size = MESSAGE.field_by_uri("item:Size").unwrap();
        assert_eq!(bag.text(subject), Some("First"));
        assert_eq!(bag.integer(size), None);
    }
}
