//! Document catalog handle
//!
//! The catalog is a dictionary living in the arena like everything else.
//! `Catalog` is just its identifier plus typed accessors for the entries the
//! builder cares about; every cross-link it stores is a reference.

use lopdf::{Dictionary, Object, ObjectId};
use tracing::debug;
use crate::error::{Error, Result};
use crate::pdf::arena::ObjectArena;
use crate::pdf::value::{kind_name, name, Resolvable};

/// Canonical catalog key for the document-part root
pub const DPART_ROOT_KEY: &[u8] = b"DPartRoot";

/// Older key some producers used for the same entry
pub const LEGACY_DPART_ROOT_KEY: &[u8] = b"DPart";

/// The single root dictionary of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    id: ObjectId,
}

impl Catalog {
    /// Register a fresh catalog pointing at `pages` and install it as the trailer root
    pub fn create(arena: &mut ObjectArena, pages: ObjectId) -> Catalog {
        let mut catalog = Dictionary::new();
        catalog.set("Type", name("Catalog"));
        catalog.set("Pages", Object::Reference(pages));

        let id = arena.register(catalog);
        arena.set_root(id);
        Catalog { id }
    }

    /// Find the catalog of an existing document through its trailer
    pub fn from_arena(arena: &ObjectArena) -> Result<Catalog> {
        let id = arena
            .root()
            .ok_or_else(|| Error::General("No Root in trailer".to_string()))?;
        arena.resolve_as::<Dictionary>(id)?;
        Ok(Catalog { id })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The page tree root (required entry)
    pub fn pages(&self, arena: &ObjectArena) -> Result<ObjectId> {
        arena
            .reference_maybe(self.id, b"Pages")?
            .ok_or_else(|| Error::General("No Pages in catalog".to_string()))
    }

    pub fn acro_form(&self, arena: &ObjectArena) -> Result<Option<ObjectId>> {
        arena.reference_maybe(self.id, b"AcroForm")
    }

    /// Return the interactive form dictionary, registering an empty one if absent
    pub fn get_or_create_acro_form(&self, arena: &mut ObjectArena) -> Result<ObjectId> {
        if let Some(id) = self.acro_form(arena)? {
            return Ok(id);
        }
        let mut form = Dictionary::new();
        form.set("Fields", Object::Array(vec![]));
        let id = arena.register(form);
        self.set(arena, "AcroForm", Object::Reference(id))?;
        Ok(id)
    }

    pub fn viewer_preferences(&self, arena: &ObjectArena) -> Result<Option<ObjectId>> {
        arena.reference_maybe(self.id, b"ViewerPreferences")
    }

    /// Return the viewer preferences dictionary, registering an empty one if absent
    pub fn get_or_create_viewer_preferences(&self, arena: &mut ObjectArena) -> Result<ObjectId> {
        if let Some(id) = self.viewer_preferences(arena)? {
            return Ok(id);
        }
        let id = arena.register(Dictionary::new());
        self.set(arena, "ViewerPreferences", Object::Reference(id))?;
        Ok(id)
    }

    /// The global XMP metadata stream, if attached
    pub fn metadata(&self, arena: &ObjectArena) -> Result<Option<ObjectId>> {
        arena.reference_maybe(self.id, b"Metadata")
    }

    /// Point `/Metadata` at a registered stream, replacing any previous value
    pub fn set_metadata(&self, arena: &mut ObjectArena, stream: ObjectId) -> Result<()> {
        arena.resolve_as::<lopdf::Stream>(stream)?;
        self.set(arena, "Metadata", Object::Reference(stream))
    }

    /// Output intent dictionaries listed in `/OutputIntents`
    ///
    /// Entries may be references or inline dictionaries; both are returned in
    /// array order. Any other entry is a `TypeMismatch`.
    pub fn output_intents<'a>(&self, arena: &'a ObjectArena) -> Result<Vec<&'a Dictionary>> {
        let intents = match arena.lookup_maybe_as::<Vec<Object>>(self.id, b"OutputIntents")? {
            Some(intents) => intents,
            None => return Ok(Vec::new()),
        };
        intents
            .iter()
            .map(|item| {
                let value = arena.follow(self.id, item)?;
                Dictionary::from_object(value).ok_or(Error::TypeMismatch {
                    id: self.id,
                    expected: "Dictionary",
                    found: kind_name(value),
                })
            })
            .collect()
    }

    /// Replace `/OutputIntents` with the given array
    pub fn set_output_intents(&self, arena: &mut ObjectArena, intents: Vec<Object>) -> Result<()> {
        self.set(arena, "OutputIntents", Object::Array(intents))
    }

    /// The document-part root under the canonical key
    pub fn dpart_root(&self, arena: &ObjectArena) -> Result<Option<ObjectId>> {
        arena.reference_maybe(self.id, DPART_ROOT_KEY)
    }

    pub fn set_dpart_root(&self, arena: &mut ObjectArena, root: ObjectId) -> Result<()> {
        self.set(arena, DPART_ROOT_KEY, Object::Reference(root))
    }

    /// Make sure the document-part root is reachable under the canonical key
    ///
    /// Reads the primary key first and the legacy key second. If only the
    /// legacy key holds a value it is copied to the canonical key. Running
    /// this again leaves the catalog untouched, and a catalog without any
    /// document-part root is left alone. Returns whether anything changed.
    pub fn repair_dpart_root(&self, arena: &mut ObjectArena) -> Result<bool> {
        let dict = arena.resolve_as::<Dictionary>(self.id)?;
        if dict.has(DPART_ROOT_KEY) {
            return Ok(false);
        }
        let legacy = match dict.get(LEGACY_DPART_ROOT_KEY) {
            Ok(value) => value.clone(),
            Err(_) => return Ok(false),
        };

        debug!("Moving document-part root from legacy /DPart key to /DPartRoot");
        self.set(arena, DPART_ROOT_KEY, legacy)?;
        Ok(true)
    }

    fn set<K: Into<Vec<u8>>>(&self, arena: &mut ObjectArena, key: K, value: Object) -> Result<()> {
        arena.resolve_as_mut::<Dictionary>(self.id)?.set(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_pages() -> (ObjectArena, Catalog) {
        let mut arena = ObjectArena::new();
        let pages = arena.register(Dictionary::new());
        let catalog = Catalog::create(&mut arena, pages);
        (arena, catalog)
    }

    #[test]
    fn test_create_installs_trailer_root() {
        let (arena, catalog) = catalog_with_pages();
        assert_eq!(arena.root(), Some(catalog.id()));
        assert_eq!(Catalog::from_arena(&arena).unwrap(), catalog);
        assert!(catalog.pages(&arena).is_ok());
    }

    #[test]
    fn test_from_arena_without_root_fails() {
        let arena = ObjectArena::new();
        assert!(Catalog::from_arena(&arena).is_err());
    }

    #[test]
    fn test_get_or_create_acro_form_is_stable() {
        let (mut arena, catalog) = catalog_with_pages();
        assert!(catalog.acro_form(&arena).unwrap().is_none());

        let first = catalog.get_or_create_acro_form(&mut arena).unwrap();
        let second = catalog.get_or_create_acro_form(&mut arena).unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.acro_form(&arena).unwrap(), Some(first));
    }

    #[test]
    fn test_get_or_create_viewer_preferences_is_stable() {
        let (mut arena, catalog) = catalog_with_pages();
        let first = catalog.get_or_create_viewer_preferences(&mut arena).unwrap();
        let count = arena.len();
        let second = catalog.get_or_create_viewer_preferences(&mut arena).unwrap();
        assert_eq!(first, second);
        assert_eq!(arena.len(), count);
    }

    #[test]
    fn test_set_metadata_requires_stream() {
        let (mut arena, catalog) = catalog_with_pages();
        let not_a_stream = arena.register(Dictionary::new());
        assert!(matches!(
            catalog.set_metadata(&mut arena, not_a_stream),
            Err(Error::TypeMismatch { expected: "Stream", .. })
        ));
        assert!(catalog.metadata(&arena).unwrap().is_none());
    }

    #[test]
    fn test_output_intents_accepts_inline_and_referenced_entries() {
        let (mut arena, catalog) = catalog_with_pages();
        let mut inline = Dictionary::new();
        inline.set("S", name("GTS_PDFX"));
        let mut referenced = Dictionary::new();
        referenced.set("S", name("GTS_PDFA1"));
        let referenced = arena.register(referenced);
        catalog
            .set_output_intents(
                &mut arena,
                vec![Object::Dictionary(inline), Object::Reference(referenced)],
            )
            .unwrap();

        let subtypes: Vec<&[u8]> = catalog
            .output_intents(&arena)
            .unwrap()
            .into_iter()
            .map(|intent| intent.get(b"S").unwrap().as_name().unwrap())
            .collect();
        assert_eq!(subtypes, vec![&b"GTS_PDFX"[..], &b"GTS_PDFA1"[..]]);
    }

    #[test]
    fn test_output_intents_rejects_non_dictionary_entries() {
        let (mut arena, catalog) = catalog_with_pages();
        catalog
            .set_output_intents(&mut arena, vec![Object::Integer(7)])
            .unwrap();
        assert!(matches!(
            catalog.output_intents(&arena),
            Err(Error::TypeMismatch { expected: "Dictionary", found: "Integer", .. })
        ));
    }

    #[test]
    fn test_repair_copies_legacy_key() {
        let (mut arena, catalog) = catalog_with_pages();
        let root = arena.register(Dictionary::new());
        arena
            .resolve_as_mut::<Dictionary>(catalog.id())
            .unwrap()
            .set("DPart", Object::Reference(root));

        assert!(catalog.repair_dpart_root(&mut arena).unwrap());
        assert_eq!(catalog.dpart_root(&arena).unwrap(), Some(root));
    }

    #[test]
    fn test_repair_is_idempotent() {
        let (mut arena, catalog) = catalog_with_pages();
        let root = arena.register(Dictionary::new());
        arena
            .resolve_as_mut::<Dictionary>(catalog.id())
            .unwrap()
            .set("DPart", Object::Reference(root));

        catalog.repair_dpart_root(&mut arena).unwrap();
        let once = format!("{:?}", arena.resolve(catalog.id()).unwrap());
        assert!(!catalog.repair_dpart_root(&mut arena).unwrap());
        let twice = format!("{:?}", arena.resolve(catalog.id()).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_repair_without_dpart_root_is_noop() {
        let (mut arena, catalog) = catalog_with_pages();
        let before = format!("{:?}", arena.resolve(catalog.id()).unwrap());
        assert!(!catalog.repair_dpart_root(&mut arena).unwrap());
        let after = format!("{:?}", arena.resolve(catalog.id()).unwrap());
        assert_eq!(before, after);
    }
}
