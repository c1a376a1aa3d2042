//! # ewsync Model
//!
//! Self-describing property graph with dirty tracking.
//!
//! This crate provides:
//! - [`PropertyBag`], the schema-driven object node with symmetric XML
//!   read/write and per-slot change tracking
//! - [`DictionaryProperty`], keyed entries bucketed into
//!   added/modified/removed for minimal patch updates
//! - The static field catalogue ([`FieldDescriptor`], [`ObjectSchema`],
//!   [`ObjectRegistry`]) readers dispatch through
//! - The [`XmlObject`] read/write contract shared with the protocol layer
//!
//! ## Design
//!
//! There is no per-field type hierarchy. Every field is one
//! [`FieldDescriptor`] record in a schema table; reads look child elements
//! up in that table and skip whatever the table does not know. Dirtiness
//! flows upward by ownership: a bag is dirty if any of its slots was set
//! or any nested value reports dirty, so no subscriber callbacks or back
//! references are needed.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dictionary;
mod object;
mod property;
mod schema;
mod value;

pub use dictionary::{DictionaryProperty, EntryState};
pub use object::XmlObject;
pub use property::PropertyBag;
pub use schema::{
    DictionarySchema, EntryKind, FieldDescriptor, FieldKind, ObjectRegistry, ObjectSchema,
    PropertyShape,
};
pub use value::PropertyValue;
