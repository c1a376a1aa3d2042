//! # ewsync XML
//!
//! Streaming XML cursor for the ewsync protocol stack.
//!
//! This crate provides the read/write contract every schema object in the
//! stack is built on:
//! - A pull [`XmlReader`] that walks one document left to right, validates
//!   tag balance, and can discard an unrecognized subtree wholesale.
//! - An [`XmlWriter`] that emits documents the reader accepts back.
//! - The closed [`Namespace`] set the wire schema is qualified in.
//!
//! ## Forward compatibility
//!
//! Consumers are expected to probe child elements and call
//! [`XmlReader::skip_element`] for anything they do not recognize, so new
//! server-side schema fields never break parsing.
//!
//! ## Usage
//!
//! ```
//! use ewsync_xml::{Namespace, XmlReader, XmlWriter};
//!
//! let mut writer = XmlWriter::new();
//! writer.start_element(Namespace::Types, "Culture");
//! writer.text("en-US").unwrap();
//! writer.end_element().unwrap();
//! let doc = writer.finish().unwrap();
//!
//! let mut reader = XmlReader::new(&doc).unwrap();
//! let culture = reader.read_element_text(Namespace::Types, "Culture").unwrap();
//! assert_eq!(culture, "en-US");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod name;
mod reader;
mod text;
mod writer;

pub use error::{XmlError, XmlResult};
pub use name::Namespace;
pub use reader::{XmlEvent, XmlReader};
pub use text::{escape_text, unescape_text};
pub use writer::XmlWriter;
