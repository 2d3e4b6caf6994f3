//! Object arena: the single owner of every indirect object in a build
//!
//! The arena wraps a `lopdf::Document` and only exposes append and lookup.
//! Identifiers come from the document's monotonically increasing `max_id`, and
//! nothing is ever removed or renumbered, so every reference handed out stays
//! valid until the arena is handed to the writer.

use lopdf::{Document, Object, ObjectId};
use crate::error::{Error, Result};
use crate::pdf::value::{kind_name, Resolvable};

/// PDF version written into the header. PDF/VT-1 and PDF/X-4 both need 1.6 or later.
pub const PDF_VERSION: &str = "1.7";

/// Append-only store of indirect objects for one build
#[derive(Debug)]
pub struct ObjectArena {
    doc: Document,
}

impl Default for ObjectArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectArena {
    /// Create an empty arena (no objects registered)
    pub fn new() -> Self {
        Self {
            doc: Document::with_version(PDF_VERSION),
        }
    }

    /// Wrap an already loaded document, e.g. for auditing a saved file
    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// Store a value and return the reference that addresses it
    pub fn register<T: Into<Object>>(&mut self, value: T) -> ObjectId {
        self.doc.add_object(value)
    }

    /// Look up the object behind a reference
    pub fn resolve(&self, id: ObjectId) -> Result<&Object> {
        self.doc.objects.get(&id).ok_or(Error::DanglingReference(id))
    }

    /// Mutable lookup. Objects may be edited in place but never removed.
    pub fn resolve_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.doc.objects.get_mut(&id).ok_or(Error::DanglingReference(id))
    }

    /// Look up a reference and require a specific shape
    pub fn resolve_as<T: Resolvable>(&self, id: ObjectId) -> Result<&T> {
        let object = self.resolve(id)?;
        T::from_object(object).ok_or(Error::TypeMismatch {
            id,
            expected: T::KIND,
            found: kind_name(object),
        })
    }

    /// Mutable variant of [`ObjectArena::resolve_as`]
    pub fn resolve_as_mut<T: Resolvable>(&mut self, id: ObjectId) -> Result<&mut T> {
        let object = self.resolve_mut(id)?;
        let found = kind_name(object);
        T::from_object_mut(object).ok_or(Error::TypeMismatch {
            id,
            expected: T::KIND,
            found,
        })
    }

    /// Follow a chain of references until a direct value is reached
    ///
    /// `origin` is the object the value was read from and is only used for
    /// error reporting. Chains longer than the number of objects in the arena
    /// are cycles and reported as a type mismatch.
    pub fn follow<'a>(&'a self, origin: ObjectId, mut value: &'a Object) -> Result<&'a Object> {
        let mut hops = 0;
        while let Object::Reference(id) = value {
            if hops > self.doc.objects.len() {
                return Err(Error::TypeMismatch {
                    id: origin,
                    expected: "direct object",
                    found: "reference cycle",
                });
            }
            value = self.resolve(*id)?;
            hops += 1;
        }
        Ok(value)
    }

    /// Read an optional dictionary entry, following references
    ///
    /// Returns `Ok(None)` when the key is absent; fails only when the
    /// dictionary itself is missing or the entry points at nothing.
    pub fn lookup_maybe(&self, dict_id: ObjectId, key: &[u8]) -> Result<Option<&Object>> {
        let dict = self.resolve_as::<lopdf::Dictionary>(dict_id)?;
        match dict.get(key) {
            Ok(value) => self.follow(dict_id, value).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Typed variant of [`ObjectArena::lookup_maybe`]
    pub fn lookup_maybe_as<T: Resolvable>(&self, dict_id: ObjectId, key: &[u8]) -> Result<Option<&T>> {
        match self.lookup_maybe(dict_id, key)? {
            Some(value) => T::from_object(value).map(Some).ok_or(Error::TypeMismatch {
                id: dict_id,
                expected: T::KIND,
                found: kind_name(value),
            }),
            None => Ok(None),
        }
    }

    /// Read a dictionary entry that must hold an indirect reference
    pub fn reference_maybe(&self, dict_id: ObjectId, key: &[u8]) -> Result<Option<ObjectId>> {
        let dict = self.resolve_as::<lopdf::Dictionary>(dict_id)?;
        match dict.get(key) {
            Ok(Object::Reference(id)) => Ok(Some(*id)),
            Ok(other) => Err(Error::TypeMismatch {
                id: dict_id,
                expected: "Reference",
                found: kind_name(other),
            }),
            Err(_) => Ok(None),
        }
    }

    /// Install the document root in the trailer
    pub fn set_root(&mut self, catalog_id: ObjectId) {
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
    }

    /// Install the document information dictionary in the trailer
    pub fn set_info(&mut self, info_id: ObjectId) {
        self.doc.trailer.set("Info", Object::Reference(info_id));
    }

    /// The catalog reference from the trailer, if one was installed
    pub fn root(&self) -> Option<ObjectId> {
        match self.doc.trailer.get(b"Root") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    }

    /// Whether the arena issued this reference
    pub fn contains(&self, id: ObjectId) -> bool {
        self.doc.objects.contains_key(&id)
    }

    /// Number of registered objects
    pub fn len(&self) -> usize {
        self.doc.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.objects.is_empty()
    }

    /// Highest object number issued so far
    pub fn last_id(&self) -> u32 {
        self.doc.max_id
    }

    /// Read access to the underlying document
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Hand the document over to the writer
    pub fn into_document(self) -> Document {
        self.doc
    }
}
