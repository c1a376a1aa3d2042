//! Slot values.

use crate::dictionary::DictionaryProperty;
use crate::property::PropertyBag;

/// The closed set of values a property slot can hold.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Plain text.
    Text(String),
    /// Integer.
    Integer(i64),
    /// Boolean.
    Boolean(bool),
    /// A nested object.
    Object(Box<PropertyBag>),
    /// A keyed dictionary.
    Dictionary(DictionaryProperty),
}

impl PropertyValue {
    /// Equality used by the setter path to decide whether an assignment
    /// is a real change.
    ///
    /// Nested graphs have no cheap comparison, so `Object` and
    /// `Dictionary` always count as changed.
    pub fn same_as(&self, other: &PropertyValue) -> bool {
        match (self, other) {
            (PropertyValue::Text(a), PropertyValue::Text(b)) => a == b,
            (PropertyValue::Integer(a), PropertyValue::Integer(b)) => a == b,
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => a == b,
            _ => false,
        }
    }

    /// Wire text for scalar variants; `None` for nested values.
    pub fn write_text(&self) -> Option<String> {
        match self {
            PropertyValue::Text(text) => Some(text.clone()),
            PropertyValue::Integer(n) => Some(n.to_string()),
            PropertyValue::Boolean(true) => Some("true".to_string()),
            PropertyValue::Boolean(false) => Some("false".to_string()),
            _ => None,
        }
    }

    /// Text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Integer content, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean content, if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The dictionary, if this is a dictionary value.
    pub fn as_dictionary(&self) -> Option<&DictionaryProperty> {
        match self {
            PropertyValue::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// The nested object, if this is an object value.
    pub fn as_object(&self) -> Option<&PropertyBag> {
        match self {
            PropertyValue::Object(bag) => Some(bag),
            _ => None,
        }
    }
}

// Structural equality for tests and round-trip checks; change-tracking
// state is deliberately not part of it.
impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyValue::Text(a), PropertyValue::Text(b)) => a == b,
            (PropertyValue::Integer(a), PropertyValue::Integer(b)) => a == b,
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => a == b,
            (PropertyValue::Object(a), PropertyValue::Object(b)) => a == b,
            (PropertyValue::Dictionary(a), PropertyValue::Dictionary(b)) => a == b,
            _ => false,
        }
    }
}
