//! Page tree and the pages a renderer hands back for a record

use lopdf::{Dictionary, Object, ObjectId, Stream};
use crate::error::{Error, Result};
use crate::pdf::arena::ObjectArena;
use crate::pdf::value::name;

/// One page produced by the renderer, not yet committed to the arena
///
/// Content streams are kept as raw bytes so the renderer never needs access
/// to the arena; the assembler registers them in order when it commits the
/// record.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// `[llx lly urx ury]` in points
    pub media_box: [f32; 4],
    /// Page resources (fonts, color spaces, XObjects)
    pub resources: Dictionary,
    /// Content stream payloads, painted in order
    pub contents: Vec<Vec<u8>>,
}

impl RenderedPage {
    pub fn new(media_box: [f32; 4]) -> Self {
        Self {
            media_box,
            resources: Dictionary::new(),
            contents: Vec::new(),
        }
    }

    /// Append a content stream
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.contents.push(content.into());
        self
    }

    pub fn with_resources(mut self, resources: Dictionary) -> Self {
        self.resources = resources;
        self
    }
}

/// Flat page tree: a single `/Pages` node whose `/Kids` lists every page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTree {
    id: ObjectId,
}

impl PageTree {
    /// Register an empty `/Pages` node
    pub fn create(arena: &mut ObjectArena) -> PageTree {
        let mut pages = Dictionary::new();
        pages.set("Type", name("Pages"));
        pages.set("Kids", Object::Array(vec![]));
        pages.set("Count", Object::Integer(0));

        PageTree {
            id: arena.register(pages),
        }
    }

    /// Wrap an existing page tree node
    pub fn from_id(id: ObjectId) -> PageTree {
        PageTree { id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Register a rendered page and append it to `/Kids`
    pub fn append_page(&self, arena: &mut ObjectArena, page: RenderedPage) -> Result<ObjectId> {
        let content_refs: Vec<Object> = page
            .contents
            .into_iter()
            .map(|content| Object::Reference(arena.register(Stream::new(Dictionary::new(), content))))
            .collect();

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", name("Page"));
        page_dict.set("Parent", Object::Reference(self.id));
        page_dict.set(
            "MediaBox",
            Object::Array(page.media_box.iter().map(|v| Object::Real(*v)).collect()),
        );
        page_dict.set("Resources", Object::Dictionary(page.resources));
        page_dict.set("Contents", Object::Array(content_refs));
        let page_id = arena.register(page_dict);

        let pages = arena.resolve_as_mut::<Dictionary>(self.id)?;
        let count = match pages.get(b"Kids") {
            Ok(Object::Array(kids)) => kids.len() + 1,
            _ => 1,
        };
        match pages.get_mut(b"Kids") {
            Ok(Object::Array(kids)) => kids.push(Object::Reference(page_id)),
            _ => {
                pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
            }
        }
        pages.set("Count", Object::Integer(count as i64));

        Ok(page_id)
    }

    /// Page references in document order
    pub fn kids(&self, arena: &ObjectArena) -> Result<Vec<ObjectId>> {
        let kids = arena
            .lookup_maybe_as::<Vec<Object>>(self.id, b"Kids")?
            .map(|kids| {
                kids.iter()
                    .filter_map(|kid| match kid {
                        Object::Reference(id) => Some(*id),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(kids)
    }

    /// The `/Count` entry
    pub fn count(&self, arena: &ObjectArena) -> Result<usize> {
        match arena.lookup_maybe(self.id, b"Count")? {
            Some(Object::Integer(n)) => usize::try_from(*n).map_err(|_| Error::TypeMismatch {
                id: self.id,
                expected: "non-negative Integer",
                found: "negative Integer",
            }),
            _ => Ok(0),
        }
    }
}
