//! PDF object model and document assembly

pub mod arena;
pub mod assemble;
pub mod catalog;
pub mod dpart;
pub mod metadata;
pub mod pages;
pub mod render;
pub mod value;
pub mod xmp;

// Re-export commonly used items
pub use arena::ObjectArena;
pub use assemble::{assemble, AssemblyState, DocumentAssembler, FinishedDocument};
pub use catalog::Catalog;
pub use dpart::{DPartNode, DPartTree, LeafInfo, NodeKind};
pub use metadata::{count_pages, document_metadata, extract_metadata, PdfMetadata};
pub use pages::{PageTree, RenderedPage};
pub use render::{RecordRenderer, RenderContext, TextPageRenderer};
