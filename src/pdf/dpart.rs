//! Document-part (DPart) tree
//!
//! The tree groups pages by input record: one leaf per record, every leaf a
//! direct child of a single root. Nodes are plain dictionaries in the arena;
//! `DPartNode` is a handle carrying the node's identifier and its kind.
//!
//! The root keeps its children under `/DParts`, every other node under
//! `/Children`. The kind is fixed when the handle is created and never derived
//! from the shape of the tree, since an empty root and a leaf look the same.

use std::collections::BTreeSet;

use lopdf::{Dictionary, Object, ObjectId};
use tracing::{debug, warn};
use crate::config::{ComplianceConfig, LeafMetadataFormat};
use crate::error::{Error, Result};
use crate::pdf::arena::ObjectArena;
use crate::pdf::catalog::Catalog;
use crate::pdf::value::{as_text, kind_name, name, stream_content, MetadataValue};
use crate::pdf::xmp::{self, LeafMetadata};
use crate::record::Record;

/// Child-list key of the root node
pub const ROOT_CHILDREN_KEY: &[u8] = b"DParts";

/// Child-list key of every non-root node
pub const NODE_CHILDREN_KEY: &[u8] = b"Children";

/// Page entry linking a page to its leaf
pub const PAGE_DPART_KEY: &[u8] = b"DPart";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Node,
}

impl NodeKind {
    /// The dictionary key this kind of node stores its children under
    pub fn children_key(self) -> &'static [u8] {
        match self {
            NodeKind::Root => ROOT_CHILDREN_KEY,
            NodeKind::Node => NODE_CHILDREN_KEY,
        }
    }
}

/// Handle to a node dictionary in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DPartNode {
    id: ObjectId,
    kind: NodeKind,
}

impl DPartNode {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Root
    }
}

/// A leaf found while walking the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafInfo {
    pub node: DPartNode,
    /// Distance from the root (direct children are at depth 1)
    pub depth: usize,
    /// The leaf or one of its ancestors carries `/Metadata`
    pub effective_metadata: bool,
}

/// Derive the metadata payload for record `index`
///
/// The record identifier comes from the field mapped under the configured
/// record-id key; when that is unmapped, absent or empty it falls back to
/// `record-{index}`. Other mapped fields are copied in mapping order and
/// skipped when the record has no value for them.
pub fn leaf_metadata_for(index: usize, record: &Record, config: &ComplianceConfig) -> LeafMetadata {
    let record_id = match config.record_id_field().and_then(|field| record.text(field)) {
        Some(id) => id,
        None => {
            let synthesized = format!("record-{}", index);
            warn!(index, record_id = %synthesized, "Record has no identifier, using synthesized id");
            synthesized
        }
    };

    let fields = config
        .mapping
        .iter()
        .filter(|(output_key, _)| *output_key != config.record_id_key)
        .filter_map(|(output_key, record_key)| {
            record.text(record_key).map(|value| (output_key.to_string(), value))
        })
        .collect();

    LeafMetadata {
        record_id_key: config.record_id_key.clone(),
        record_id,
        fields,
    }
}

/// The document-part tree of one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DPartTree {
    root: DPartNode,
}

impl DPartTree {
    /// Return the tree the catalog already points at, or register a new root and link it
    pub fn get_or_create_root(arena: &mut ObjectArena, catalog: &Catalog) -> Result<DPartTree> {
        if let Some(tree) = Self::from_catalog(arena, catalog)? {
            return Ok(tree);
        }

        let mut root = Dictionary::new();
        root.set("Type", name("DPart"));
        root.set(ROOT_CHILDREN_KEY, Object::Array(vec![]));
        let id = arena.register(root);
        catalog.set_dpart_root(arena, id)?;
        debug!(root = ?id, "Created document-part root");

        Ok(DPartTree {
            root: DPartNode { id, kind: NodeKind::Root },
        })
    }

    /// The tree referenced by the catalog's `/DPartRoot`, if any
    pub fn from_catalog(arena: &ObjectArena, catalog: &Catalog) -> Result<Option<DPartTree>> {
        match catalog.dpart_root(arena)? {
            Some(id) => {
                arena.resolve_as::<Dictionary>(id)?;
                Ok(Some(DPartTree {
                    root: DPartNode { id, kind: NodeKind::Root },
                }))
            }
            None => Ok(None),
        }
    }

    pub fn root(&self) -> DPartNode {
        self.root
    }

    /// Register a new, unlinked non-root node
    pub fn create_node(arena: &mut ObjectArena) -> DPartNode {
        let mut node = Dictionary::new();
        node.set("Type", name("DPart"));
        DPartNode {
            id: arena.register(node),
            kind: NodeKind::Node,
        }
    }

    /// Append `child` to `parent`'s child list
    ///
    /// Only the parent's list changes; the child's `/Parent` is left as is.
    pub fn add_child(arena: &mut ObjectArena, parent: DPartNode, child: DPartNode) -> Result<()> {
        arena.resolve_as::<Dictionary>(child.id)?;
        let key = parent.kind.children_key();
        let dict = arena.resolve_as_mut::<Dictionary>(parent.id)?;

        match dict.get_mut(key) {
            Ok(Object::Array(children)) => children.push(Object::Reference(child.id)),
            Ok(other) => {
                return Err(Error::TypeMismatch {
                    id: parent.id,
                    expected: "Array",
                    found: kind_name(other),
                })
            }
            Err(_) => {
                dict.set(key, Object::Array(vec![Object::Reference(child.id)]));
            }
        }
        Ok(())
    }

    /// Set the diagnostic back-reference from `child` to `parent`
    pub fn set_parent(arena: &mut ObjectArena, child: DPartNode, parent: DPartNode) -> Result<()> {
        arena.resolve_as::<Dictionary>(parent.id)?;
        arena
            .resolve_as_mut::<Dictionary>(child.id)?
            .set("Parent", Object::Reference(parent.id));
        Ok(())
    }

    /// The node's `/Parent`, if one was set
    pub fn parent(arena: &ObjectArena, node: DPartNode) -> Result<Option<ObjectId>> {
        arena.reference_maybe(node.id, b"Parent")
    }

    /// Attach a registered dictionary or stream as the node's `/Metadata` (last write wins)
    pub fn set_leaf_metadata(arena: &mut ObjectArena, node: DPartNode, metadata: ObjectId) -> Result<()> {
        let value = arena.resolve(metadata)?;
        if MetadataValue::from_object(value).is_none() {
            return Err(Error::TypeMismatch {
                id: metadata,
                expected: "Dictionary or Stream",
                found: kind_name(value),
            });
        }
        arena
            .resolve_as_mut::<Dictionary>(node.id)?
            .set("Metadata", Object::Reference(metadata));
        Ok(())
    }

    /// The node's own `/Metadata` reference
    pub fn metadata(arena: &ObjectArena, node: DPartNode) -> Result<Option<ObjectId>> {
        arena.reference_maybe(node.id, b"Metadata")
    }

    /// Point a page at its leaf (a page references exactly one node)
    pub fn link_page(arena: &mut ObjectArena, page: ObjectId, node: DPartNode) -> Result<()> {
        arena
            .resolve_as_mut::<Dictionary>(page)?
            .set(PAGE_DPART_KEY, Object::Reference(node.id));
        Ok(())
    }

    /// Create, describe and link the leaf for one record
    ///
    /// Registers a node, attaches the record's metadata, appends the node to
    /// the root, sets its `/Parent`, and links every page produced for the
    /// record to it.
    pub fn build_record_leaf(
        &self,
        arena: &mut ObjectArena,
        index: usize,
        record: &Record,
        config: &ComplianceConfig,
        pages: &[ObjectId],
    ) -> Result<DPartNode> {
        let node = Self::create_node(arena);

        let metadata = leaf_metadata_for(index, record, config);
        let metadata_id = match config.leaf_metadata {
            LeafMetadataFormat::Xmp => {
                arena.register(xmp::metadata_stream(xmp::build_leaf_packet(&metadata)))
            }
            LeafMetadataFormat::Dictionary => arena.register(xmp::build_leaf_dictionary(&metadata)),
        };
        Self::set_leaf_metadata(arena, node, metadata_id)?;

        Self::add_child(arena, self.root, node)?;
        Self::set_parent(arena, node, self.root)?;

        for page in pages {
            Self::link_page(arena, *page, node)?;
        }

        debug!(
            index,
            record_id = %metadata.record_id,
            fields = metadata.fields.len(),
            pages = pages.len(),
            "Committed document-part leaf"
        );
        Ok(node)
    }

    /// Children of a node, read from the key its kind dictates
    pub fn children(arena: &ObjectArena, node: DPartNode) -> Result<Vec<DPartNode>> {
        let children = match arena.lookup_maybe_as::<Vec<Object>>(node.id, node.kind.children_key())? {
            Some(children) => children,
            None => return Ok(Vec::new()),
        };

        children
            .iter()
            .map(|child| match child {
                Object::Reference(id) => Ok(DPartNode {
                    id: *id,
                    kind: NodeKind::Node,
                }),
                other => Err(Error::TypeMismatch {
                    id: node.id,
                    expected: "Reference",
                    found: kind_name(other),
                }),
            })
            .collect()
    }

    /// Walk the tree from the root and report every leaf in document order
    ///
    /// Metadata is inherited top-down: a leaf has effective metadata when it
    /// or any ancestor on the walk carries `/Metadata`. Parent back-references
    /// are not consulted.
    pub fn leaves(&self, arena: &ObjectArena) -> Result<Vec<LeafInfo>> {
        let mut leaves = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![(self.root, 0usize, false)];

        while let Some((node, depth, inherited)) = stack.pop() {
            if !visited.insert(node.id) {
                return Err(Error::General(format!(
                    "Document-part tree revisits object {:?}",
                    node.id
                )));
            }

            let has_own = arena.resolve_as::<Dictionary>(node.id)?.has(b"Metadata");
            let effective = inherited || has_own;
            let children = Self::children(arena, node)?;

            if children.is_empty() && !node.is_root() {
                leaves.push(LeafInfo {
                    node,
                    depth,
                    effective_metadata: effective,
                });
            }
            // Reverse so the stack pops children in list order
            for child in children.into_iter().rev() {
                stack.push((child, depth + 1, effective));
            }
        }

        Ok(leaves)
    }

    /// The record fields stored in a node's own metadata
    ///
    /// XMP streams yield their `pdfvmeta` elements, dictionaries their text
    /// entries. Returns `None` when the node has no metadata.
    pub fn record_fields(arena: &ObjectArena, node: DPartNode) -> Result<Option<Vec<(String, String)>>> {
        let value = match arena.lookup_maybe(node.id, b"Metadata")? {
            Some(value) => value,
            None => return Ok(None),
        };

        match MetadataValue::from_object(value) {
            Some(MetadataValue::Stream(stream)) => {
                let packet = stream_content(stream)?;
                xmp::read_packet_fields(&packet).map(Some)
            }
            Some(MetadataValue::Dictionary(dict)) => Ok(Some(
                dict.iter()
                    .filter_map(|(key, value)| {
                        as_text(value)
                            .filter(|_| matches!(value, Object::String(..)))
                            .map(|text| (String::from_utf8_lossy(key).into_owned(), text))
                    })
                    .collect(),
            )),
            None => Err(Error::TypeMismatch {
                id: node.id,
                expected: "Dictionary or Stream",
                found: kind_name(value),
            }),
        }
    }

    /// The record identifier stored in a node's metadata under `key`
    pub fn record_id(arena: &ObjectArena, node: DPartNode, key: &str) -> Result<Option<String>> {
        Ok(Self::record_fields(arena, node)?.and_then(|fields| {
            fields
                .into_iter()
                .find(|(field, _)| field == key)
                .map(|(_, value)| value)
        }))
    }
}
