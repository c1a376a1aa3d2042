//! Keyed dictionary property with per-entry change classification.

use std::collections::BTreeMap;

use ewsync_xml::{Namespace, XmlError, XmlReader, XmlResult, XmlWriter};

use crate::object::XmlObject;
use crate::property::PropertyBag;
use crate::schema::{DictionarySchema, EntryKind, FieldDescriptor, ObjectSchema};
use crate::value::PropertyValue;

/// Change classification of one entry since the last clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Untouched since the last clear.
    Unchanged,
    /// Created under a previously absent key.
    Added,
    /// Present before, value replaced.
    Modified,
    /// Present before, removed; excluded from enumeration.
    Removed,
}

#[derive(Debug, Clone)]
struct DictionaryEntry {
    value: PropertyValue,
    state: EntryState,
}

/// A keyed collection of entries that buckets every mutation into
/// added/modified/removed, so an update can resend only the touched slots.
#[derive(Debug, Clone)]
pub struct DictionaryProperty {
    schema: &'static DictionarySchema,
    entries: BTreeMap<String, DictionaryEntry>,
}

impl DictionaryProperty {
    /// Create an empty dictionary.
    pub fn new(schema: &'static DictionarySchema) -> Self {
        Self {
            schema,
            entries: BTreeMap::new(),
        }
    }

    /// The dictionary's wire shape.
    pub fn schema(&self) -> &'static DictionarySchema {
        self.schema
    }

    /// The value under `key`, unless absent or removed.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries
            .get(key)
            .filter(|e| e.state != EntryState::Removed)
            .map(|e| &e.value)
    }

    /// Assign or remove a slot.
    ///
    /// `Some(value)` inserts or replaces; `None` removes. Returns whether
    /// anything actually changed, which is what the owning bag uses to
    /// propagate dirtiness. Assigning an equal scalar value is not a
    /// change. A key added and then removed between two clears vanishes
    /// without ever being classified as removed.
    pub fn set(&mut self, key: &str, value: Option<PropertyValue>) -> bool {
        match value {
            Some(value) => match self.entries.get_mut(key) {
                None => {
                    self.entries.insert(
                        key.to_string(),
                        DictionaryEntry {
                            value,
                            state: EntryState::Added,
                        },
                    );
                    true
                }
                Some(entry) if entry.state == EntryState::Removed => {
                    entry.value = value;
                    entry.state = EntryState::Modified;
                    true
                }
                Some(entry) => {
                    if entry.value.same_as(&value) {
                        return false;
                    }
                    entry.value = value;
                    if entry.state != EntryState::Added {
                        entry.state = EntryState::Modified;
                    }
                    true
                }
            },
            None => match self.entries.get_mut(key) {
                None => false,
                Some(entry) => match entry.state {
                    EntryState::Added => {
                        self.entries.remove(key);
                        true
                    }
                    EntryState::Removed => false,
                    _ => {
                        entry.state = EntryState::Removed;
                        true
                    }
                },
            },
        }
    }

    /// Remove the slot under `key`. Equivalent to `set(key, None)`.
    pub fn remove(&mut self, key: &str) -> bool {
        self.set(key, None)
    }

    /// Current classification of `key`, if the key is known at all.
    pub fn entry_state(&self, key: &str) -> Option<EntryState> {
        self.entries.get(key).map(|e| e.state)
    }

    /// Keys of live entries, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.live_entries().map(|(key, _)| key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live_entries().count()
    }

    /// True if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if any entry changed since the last clear.
    pub fn is_dirty(&self) -> bool {
        self.entries.values().any(|e| {
            e.state != EntryState::Unchanged
                || matches!(&e.value, PropertyValue::Object(bag) if bag.is_dirty())
        })
    }

    /// Reset every entry to unchanged, dropping removed ones for good.
    ///
    /// Normally invoked after a successful write-back.
    pub fn clear_change_log(&mut self) {
        self.entries.retain(|_, e| e.state != EntryState::Removed);
        for entry in self.entries.values_mut() {
            entry.state = EntryState::Unchanged;
            if let PropertyValue::Object(bag) = &mut entry.value {
                bag.clear_change_log();
            }
        }
    }

    /// Write the full entry list in its wire form.
    pub fn write_entries(&self, writer: &mut XmlWriter) -> XmlResult<()> {
        writer.start_element(Namespace::Types, self.schema.entries_name);
        for (key, entry) in self
            .entries
            .iter()
            .filter(|(_, e)| e.state != EntryState::Removed)
        {
            self.write_entry(writer, key, &entry.value)?;
        }
        writer.end_element()
    }

    /// Replace all entries from the wire. Loaded entries arrive clean.
    pub fn load_entries(&mut self, reader: &mut XmlReader<'_>) -> XmlResult<()> {
        self.entries.clear();
        self.merge_entries(reader)
    }

    /// Merge wire entries into the existing set, used on the patch path.
    ///
    /// Wire values are server truth: merged keys land clean, untouched
    /// keys keep their local classification.
    pub fn merge_entries(&mut self, reader: &mut XmlReader<'_>) -> XmlResult<()> {
        reader.read_start_element(Namespace::Types, self.schema.entries_name)?;
        loop {
            if reader.is_end_element(Namespace::Types, self.schema.entries_name) {
                return reader.read_end_element(Namespace::Types, self.schema.entries_name);
            }
            if reader.is_start_element(Namespace::Types, self.schema.entry_name) {
                let (key, value) = self.read_entry(reader)?;
                self.entries.insert(
                    key,
                    DictionaryEntry {
                        value,
                        state: EntryState::Unchanged,
                    },
                );
            } else if reader.is_any_start_element() {
                reader.skip_element()?;
            } else {
                reader.advance()?;
            }
        }
    }

    /// Emit the minimal patch for this dictionary.
    ///
    /// One set-field fragment per added or modified entry (field identity
    /// plus exactly that entry, wrapped in the owner's set element), one
    /// delete-field fragment per removed entry. Untouched slots are never
    /// resent.
    pub fn serialize_update(
        &self,
        writer: &mut XmlWriter,
        owner: &ObjectSchema,
        field: &FieldDescriptor,
    ) -> XmlResult<()> {
        for (key, entry) in &self.entries {
            match entry.state {
                EntryState::Added | EntryState::Modified => {
                    writer.start_element(Namespace::Messages, owner.set_field_element);
                    field.write_indexed_field_uri(writer, key)?;
                    writer.start_element(owner.namespace, owner.element_name);
                    writer.start_element(Namespace::Types, self.schema.entries_name);
                    self.write_entry(writer, key, &entry.value)?;
                    writer.end_element()?;
                    writer.end_element()?;
                    writer.end_element()?;
                }
                EntryState::Removed => {
                    writer.start_element(Namespace::Messages, owner.delete_field_element);
                    field.write_indexed_field_uri(writer, key)?;
                    writer.end_element()?;
                }
                EntryState::Unchanged => {}
            }
        }
        Ok(())
    }

    fn live_entries(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.state != EntryState::Removed)
            .map(|(key, e)| (key.as_str(), &e.value))
    }

    fn write_entry(
        &self,
        writer: &mut XmlWriter,
        key: &str,
        value: &PropertyValue,
    ) -> XmlResult<()> {
        writer.start_element(Namespace::Types, self.schema.entry_name);
        writer.attribute(self.schema.key_attribute, key)?;
        if let Some(text) = value.write_text() {
            writer.text(&text)?;
        } else if let PropertyValue::Object(bag) = value {
            bag.write_attributes(writer)?;
            bag.write_children(writer)?;
        } else {
            return Err(XmlError::malformed(
                "dictionary entries cannot nest dictionaries",
            ));
        }
        writer.end_element()
    }

    fn read_entry(&self, reader: &mut XmlReader<'_>) -> XmlResult<(String, PropertyValue)> {
        reader.expect_start_element(Namespace::Types, self.schema.entry_name)?;
        let key = reader
            .attribute(self.schema.key_attribute)
            .ok_or_else(|| {
                XmlError::malformed(format!(
                    "entry missing {} attribute",
                    self.schema.key_attribute
                ))
            })?
            .to_string();
        let value = match self.schema.entry_kind {
            EntryKind::Text => {
                reader.advance()?;
                let text = reader.read_text()?;
                reader.read_end_element(Namespace::Types, self.schema.entry_name)?;
                PropertyValue::Text(text)
            }
            EntryKind::Object(schema) => {
                let mut bag = PropertyBag::new(schema);
                bag.load_from(reader, Namespace::Types, self.schema.entry_name)?;
                PropertyValue::Object(Box::new(bag))
            }
        };
        Ok((key, value))
    }
}

// Structural equality over live entries only; classification state is not
// part of it.
impl PartialEq for DictionaryProperty {
    fn eq(&self, other: &Self) -> bool {
        self.live_entries().eq(other.live_entries())
    }
}
