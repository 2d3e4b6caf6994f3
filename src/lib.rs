//! PDF/VT Builder Library
//!
//! Builds variable-data PDF documents from an ordered list of records.
//! This library provides functionality to:
//! - Render each record to pages through a pluggable renderer
//! - Group the pages of every record under a document-part leaf
//! - Attach record metadata, the PDF/VT XMP packet and an output intent
//! - Read a finished document back for auditing
//!
//! # Example
//!
//! ```no_run
//! use pdfvt_builder::config::ComplianceConfig;
//! use pdfvt_builder::pdf::{assemble, TextPageRenderer};
//! use pdfvt_builder::record::Record;
//! use std::path::Path;
//!
//! let records = vec![
//!     Record::new().with("id", "INV-001"),
//!     Record::new().with("id", "INV-002"),
//! ];
//! let config = ComplianceConfig::enabled().map_field("RecordID", "id");
//!
//! let doc = assemble(&records, config, &TextPageRenderer::default())
//!     .expect("Failed to build document");
//! doc.save(Path::new("statements.pdf")).expect("Failed to save PDF");
//! ```

pub mod config;
pub mod error;
pub mod layout;
pub mod pdf;
pub mod record;

// Re-export commonly used items
pub use config::ComplianceConfig;
pub use error::{Error, Result};
pub use record::{FieldMapping, Record};
