//! The self-describing property bag.

use std::collections::BTreeMap;

use ewsync_xml::{XmlError, XmlReader, XmlResult, XmlWriter};

use crate::dictionary::DictionaryProperty;
use crate::object::XmlObject;
use crate::schema::{FieldDescriptor, FieldKind, ObjectSchema, PropertyShape};
use crate::value::PropertyValue;

#[derive(Debug, Clone)]
struct Slot {
    value: PropertyValue,
    dirty: bool,
}

/// A mutable, self-describing unit of the object graph.
///
/// The bag is driven entirely by its [`ObjectSchema`]: reads dispatch child
/// elements through the schema's field table, writes walk it in wire order.
/// Mutations through [`PropertyBag::set`] track dirtiness per slot so an
/// owner can tell what changed since the last clear; values arriving from
/// the wire land clean.
#[derive(Debug, Clone)]
pub struct PropertyBag {
    schema: &'static ObjectSchema,
    shape: PropertyShape,
    slots: BTreeMap<&'static str, Slot>,
    dirty: bool,
}

impl PropertyBag {
    /// Create an empty bag reading every schema field.
    pub fn new(schema: &'static ObjectSchema) -> Self {
        Self::with_shape(schema, PropertyShape::AllProperties)
    }

    /// Create an empty bag honoring the given projection on reads.
    pub fn with_shape(schema: &'static ObjectSchema, shape: PropertyShape) -> Self {
        Self {
            schema,
            shape,
            slots: BTreeMap::new(),
            dirty: false,
        }
    }

    /// The bag's schema.
    pub fn schema(&self) -> &'static ObjectSchema {
        self.schema
    }

    /// The projection reads honor.
    pub fn shape(&self) -> PropertyShape {
        self.shape
    }

    /// Assign or clear a field.
    ///
    /// Assigns only if the new value differs from the old (per
    /// [`PropertyValue::same_as`]); an actual change marks the slot and
    /// the bag dirty exactly once and returns true. Equal-value
    /// assignment returns false and marks nothing.
    pub fn set(&mut self, field: &'static FieldDescriptor, value: Option<PropertyValue>) -> bool {
        match value {
            Some(value) => match self.slots.get_mut(field.field_uri) {
                Some(slot) => {
                    if slot.value.same_as(&value) {
                        return false;
                    }
                    slot.value = value;
                    slot.dirty = true;
                    self.dirty = true;
                    true
                }
                None => {
                    self.slots
                        .insert(field.field_uri, Slot { value, dirty: true });
                    self.dirty = true;
                    true
                }
            },
            None => {
                if self.slots.remove(field.field_uri).is_some() {
                    self.dirty = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// The value of a field, if populated.
    pub fn get(&self, field: &FieldDescriptor) -> Option<&PropertyValue> {
        self.slots.get(field.field_uri).map(|slot| &slot.value)
    }

    /// Text content of a field.
    pub fn text(&self, field: &FieldDescriptor) -> Option<&str> {
        self.get(field).and_then(PropertyValue::as_text)
    }

    /// Integer content of a field.
    pub fn integer(&self, field: &FieldDescriptor) -> Option<i64> {
        self.get(field).and_then(PropertyValue::as_integer)
    }

    /// Boolean content of a field.
    pub fn boolean(&self, field: &FieldDescriptor) -> Option<bool> {
        self.get(field).and_then(PropertyValue::as_boolean)
    }

    /// The dictionary under a field, if populated.
    pub fn dictionary(&self, field: &FieldDescriptor) -> Option<&DictionaryProperty> {
        self.get(field).and_then(PropertyValue::as_dictionary)
    }

    /// Run a mutation against a dictionary field, creating the empty
    /// dictionary on first touch.
    ///
    /// Dirtiness propagates to this bag only if the dictionary reports a
    /// change afterwards, so read-only closures leave the bag clean.
    /// Returns `None` if the field is not a dictionary field.
    pub fn update_dictionary<R>(
        &mut self,
        field: &'static FieldDescriptor,
        f: impl FnOnce(&mut DictionaryProperty) -> R,
    ) -> Option<R> {
        let FieldKind::Dictionary(schema) = field.kind else {
            return None;
        };
        let slot = self.slots.entry(field.field_uri).or_insert_with(|| Slot {
            value: PropertyValue::Dictionary(DictionaryProperty::new(schema)),
            dirty: false,
        });
        let PropertyValue::Dictionary(dict) = &mut slot.value else {
            return None;
        };
        let result = f(dict);
        if dict.is_dirty() {
            slot.dirty = true;
            self.dirty = true;
        }
        Some(result)
    }

    /// Run a mutation against a nested object field, creating the empty
    /// object on first touch. Mirrors [`PropertyBag::update_dictionary`].
    pub fn update_object<R>(
        &mut self,
        field: &'static FieldDescriptor,
        f: impl FnOnce(&mut PropertyBag) -> R,
    ) -> Option<R> {
        let FieldKind::Object(schema) = field.kind else {
            return None;
        };
        let shape = self.shape;
        let slot = self.slots.entry(field.field_uri).or_insert_with(|| Slot {
            value: PropertyValue::Object(Box::new(PropertyBag::with_shape(schema, shape))),
            dirty: false,
        });
        let PropertyValue::Object(bag) = &mut slot.value else {
            return None;
        };
        let result = f(bag);
        if bag.is_dirty() {
            slot.dirty = true;
            self.dirty = true;
        }
        Some(result)
    }

    /// True if anything in this bag or a nested value changed since the
    /// last clear.
    pub fn is_dirty(&self) -> bool {
        self.dirty
            || self.slots.values().any(|slot| match &slot.value {
                PropertyValue::Object(bag) => bag.is_dirty(),
                PropertyValue::Dictionary(dict) => dict.is_dirty(),
                _ => false,
            })
    }

    /// Field identities whose slots were assigned through the setter path
    /// since the last clear.
    pub fn dirty_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.dirty)
            .map(|(uri, _)| *uri)
    }

    /// Reset all change tracking, recursively.
    pub fn clear_change_log(&mut self) {
        self.dirty = false;
        for slot in self.slots.values_mut() {
            slot.dirty = false;
            match &mut slot.value {
                PropertyValue::Object(bag) => bag.clear_change_log(),
                PropertyValue::Dictionary(dict) => dict.clear_change_log(),
                _ => {}
            }
        }
    }

    fn insert_clean(&mut self, field: &'static FieldDescriptor, value: PropertyValue) {
        self.slots
            .insert(field.field_uri, Slot { value, dirty: false });
    }

    fn consume_element(&mut self, reader: &mut XmlReader<'_>, patch: bool) -> XmlResult<bool> {
        let field = {
            let ns = match reader.namespace() {
                Some(ns) => ns,
                None => return Ok(false),
            };
            let local = match reader.local_name() {
                Some(local) => local,
                None => return Ok(false),
            };
            match self.schema.field_by_name(ns, local) {
                Some(field) => field,
                None => return Ok(false),
            }
        };
        // Projection enforcement: out-of-shape fields are skipped exactly
        // like unknown elements.
        if !self.shape.includes(field) {
            return Ok(false);
        }
        match field.kind {
            FieldKind::Text => {
                let text = reader.read_element_text(field.namespace, field.local_name)?;
                self.insert_clean(field, PropertyValue::Text(text));
            }
            FieldKind::Integer => {
                let n = reader.read_int_element(field.namespace, field.local_name)?;
                self.insert_clean(field, PropertyValue::Integer(n));
            }
            FieldKind::Boolean => {
                let b = reader.read_bool_element(field.namespace, field.local_name)?;
                self.insert_clean(field, PropertyValue::Boolean(b));
            }
            FieldKind::Object(schema) => {
                if patch {
                    if let Some(Slot {
                        value: PropertyValue::Object(bag),
                        ..
                    }) = self.slots.get_mut(field.field_uri)
                    {
                        bag.patch_from(reader, field.namespace, field.local_name)?;
                        return Ok(true);
                    }
                }
                let mut bag = PropertyBag::with_shape(schema, self.shape);
                bag.load_from(reader, field.namespace, field.local_name)?;
                self.insert_clean(field, PropertyValue::Object(Box::new(bag)));
            }
            FieldKind::Dictionary(schema) => {
                if patch {
                    if !matches!(
                        self.slots.get(field.field_uri),
                        Some(Slot {
                            value: PropertyValue::Dictionary(_),
                            ..
                        })
                    ) {
                        self.insert_clean(
                            field,
                            PropertyValue::Dictionary(DictionaryProperty::new(schema)),
                        );
                    }
                    if let Some(Slot {
                        value: PropertyValue::Dictionary(dict),
                        ..
                    }) = self.slots.get_mut(field.field_uri)
                    {
                        dict.merge_entries(reader)?;
                    }
                    return Ok(true);
                }
                let mut dict = DictionaryProperty::new(schema);
                dict.load_entries(reader)?;
                self.insert_clean(field, PropertyValue::Dictionary(dict));
            }
        }
        Ok(true)
    }
}

impl XmlObject for PropertyBag {
    fn try_read_element(&mut self, reader: &mut XmlReader<'_>) -> XmlResult<bool> {
        self.consume_element(reader, false)
    }

    fn try_read_element_for_patch(&mut self, reader: &mut XmlReader<'_>) -> XmlResult<bool> {
        self.consume_element(reader, true)
    }

    fn write_children(&self, writer: &mut XmlWriter) -> XmlResult<()> {
        for field in self.schema.fields {
            let Some(slot) = self.slots.get(field.field_uri) else {
                continue;
            };
            match &slot.value {
                PropertyValue::Object(bag) => {
                    bag.write_to(writer, field.namespace, field.local_name)?;
                }
                PropertyValue::Dictionary(dict) => dict.write_entries(writer)?,
                scalar => {
                    let text = scalar.write_text().ok_or_else(|| {
                        XmlError::malformed(format!(
                            "field {} holds a non-scalar value",
                            field.field_uri
                        ))
                    })?;
                    writer.start_element(field.namespace, field.local_name);
                    writer.text(&text)?;
                    writer.end_element()?;
                }
            }
        }
        Ok(())
    }
}

// Field-for-field structural equality; dirty state is not part of it.
impl PartialEq for PropertyBag {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.schema, other.schema)
            && self.slots.len() == other.slots.len()
            && self
                .slots
                .iter()
                .all(|(uri, slot)| other.slots.get(uri).is_some_and(|o| o.value == slot.value))
    }
}
