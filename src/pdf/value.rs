//! Structured value helpers on top of `lopdf::Object`
//!
//! `lopdf::Object` already is the closed set of variants a PDF object graph
//! needs (null, boolean, integer/real, string, name, array, dictionary, stream
//! and indirect reference). This module adds the small pieces the builder uses
//! everywhere: constructors that make the name/string distinction explicit,
//! a variant name for diagnostics, and the `Resolvable` trait behind the arena's
//! typed lookups.

use lopdf::{Dictionary, Object, StringFormat, Stream};
use crate::error::Result;

/// Build a name object (`/Value`)
pub fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

/// Build a literal string object (`(value)`)
pub fn text(value: &str) -> Object {
    Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
}

/// Human-readable variant name, used in `TypeMismatch` errors
pub fn kind_name(object: &Object) -> &'static str {
    match object {
        Object::Null => "Null",
        Object::Boolean(_) => "Boolean",
        Object::Integer(_) => "Integer",
        Object::Real(_) => "Real",
        Object::String(..) => "String",
        Object::Name(_) => "Name",
        Object::Array(_) => "Array",
        Object::Dictionary(_) => "Dictionary",
        Object::Stream(_) => "Stream",
        Object::Reference(_) => "Reference",
    }
}

/// Decode a string or name object as UTF-8 text (lossy)
pub fn as_text(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) | Object::Name(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        _ => None,
    }
}

/// A value shape that can be borrowed out of an `Object`
///
/// Call sites usually know the expected shape from protocol position (the
/// catalog's `/Pages` entry is always a dictionary, `/OutputIntents` is always
/// an array), so the arena offers `resolve_as::<T>()` which fails with
/// `TypeMismatch` instead of making every caller match on the variant.
pub trait Resolvable {
    /// Variant name reported on mismatch
    const KIND: &'static str;

    fn from_object(object: &Object) -> Option<&Self>;

    fn from_object_mut(object: &mut Object) -> Option<&mut Self>;
}

impl Resolvable for Dictionary {
    const KIND: &'static str = "Dictionary";

    fn from_object(object: &Object) -> Option<&Self> {
        match object {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    fn from_object_mut(object: &mut Object) -> Option<&mut Self> {
        match object {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }
}

impl Resolvable for Stream {
    const KIND: &'static str = "Stream";

    fn from_object(object: &Object) -> Option<&Self> {
        match object {
            Object::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    fn from_object_mut(object: &mut Object) -> Option<&mut Self> {
        match object {
            Object::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

impl Resolvable for Vec<Object> {
    const KIND: &'static str = "Array";

    fn from_object(object: &Object) -> Option<&Self> {
        match object {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    fn from_object_mut(object: &mut Object) -> Option<&mut Self> {
        match object {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// A `/Metadata` entry, which is a dictionary or a stream and never anything else
#[derive(Debug, Clone, Copy)]
pub enum MetadataValue<'a> {
    Dictionary(&'a Dictionary),
    Stream(&'a Stream),
}

impl<'a> MetadataValue<'a> {
    pub fn from_object(object: &'a Object) -> Option<Self> {
        match object {
            Object::Dictionary(dict) => Some(MetadataValue::Dictionary(dict)),
            Object::Stream(stream) => Some(MetadataValue::Stream(stream)),
            _ => None,
        }
    }
}

/// Stream payload, decoded when a filter is present
pub(crate) fn stream_content(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        Ok(stream.decompressed_content()?)
    } else {
        Ok(stream.content.clone())
    }
}
