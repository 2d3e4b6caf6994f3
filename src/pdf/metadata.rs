//! PDF metadata extraction
//!
//! Reads a saved document back and reports what an auditor checks: page and
//! record counts, leaves with effective metadata, the output intent and the
//! global XMP markers.

use std::path::Path;
use lopdf::{Dictionary, Document, Object, Stream};
use crate::error::{Error, Result};
use crate::pdf::arena::ObjectArena;
use crate::pdf::catalog::Catalog;
use crate::pdf::dpart::DPartTree;
use crate::pdf::pages::PageTree;
use crate::pdf::value::{as_text, stream_content};
use crate::pdf::xmp::{NS_PDFVT, OUTPUT_INTENT_SUBTYPE, PDFVT_FLAG_ELEMENT};

/// Audit report for one PDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Leaves under the document-part root
    pub record_count: usize,
    /// Leaves that carry metadata themselves or inherit it
    pub records_with_metadata: usize,
    /// A `GTS_PDFX` output intent is attached
    pub has_output_intent: bool,
    /// The catalog metadata stream carries the PDF/VT namespace and flag
    pub has_pdfvt_xmp: bool,
    /// Identifier of each leaf under `record_id_key`, in record order
    pub record_ids: Vec<Option<String>>,
    /// Document title (if present)
    pub title: Option<String>,
    /// Producer entry of the Info dictionary (if present)
    pub producer: Option<String>,
}

/// Extract the audit report from a PDF file
pub fn extract_metadata(path: &Path, record_id_key: &str) -> Result<PdfMetadata> {
    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }
    let doc = Document::load(path)?;
    document_metadata(doc, record_id_key)
}

/// Extract the audit report from an already loaded document
pub fn document_metadata(doc: Document, record_id_key: &str) -> Result<PdfMetadata> {
    let arena = ObjectArena::from_document(doc);
    let catalog = Catalog::from_arena(&arena)?;

    let page_count = PageTree::from_id(catalog.pages(&arena)?).count(&arena)?;

    let mut record_count = 0;
    let mut records_with_metadata = 0;
    let mut record_ids = Vec::new();
    if let Some(tree) = DPartTree::from_catalog(&arena, &catalog)? {
        for leaf in tree.leaves(&arena)? {
            record_count += 1;
            if leaf.effective_metadata {
                records_with_metadata += 1;
            }
            record_ids.push(DPartTree::record_id(&arena, leaf.node, record_id_key)?);
        }
    }

    let has_output_intent = catalog
        .output_intents(&arena)?
        .into_iter()
        .any(|intent| matches!(intent.get(b"S"), Ok(Object::Name(s)) if s == OUTPUT_INTENT_SUBTYPE.as_bytes()));

    let has_pdfvt_xmp = match catalog.metadata(&arena)? {
        Some(id) => {
            let packet = stream_content(arena.resolve_as::<Stream>(id)?)?;
            let packet = String::from_utf8_lossy(&packet);
            packet.contains(NS_PDFVT) && packet.contains(PDFVT_FLAG_ELEMENT)
        }
        None => false,
    };

    let (title, producer) = match info_dictionary(&arena)? {
        Some(info) => (
            info.get(b"Title").ok().and_then(as_text),
            info.get(b"Producer").ok().and_then(as_text),
        ),
        None => (None, None),
    };

    Ok(PdfMetadata {
        page_count,
        record_count,
        records_with_metadata,
        has_output_intent,
        has_pdfvt_xmp,
        record_ids,
        title,
        producer,
    })
}

/// Count the number of pages in a PDF file
///
/// Reads the Count field from the Pages dictionary.
pub fn count_pages(path: &Path) -> Result<usize> {
    let doc = Document::load(path)?;
    let arena = ObjectArena::from_document(doc);
    let catalog = Catalog::from_arena(&arena)?;
    PageTree::from_id(catalog.pages(&arena)?).count(&arena)
}

fn info_dictionary(arena: &ObjectArena) -> Result<Option<&Dictionary>> {
    match arena.document().trailer.get(b"Info") {
        Ok(Object::Reference(id)) => Ok(Some(arena.resolve_as::<Dictionary>(*id)?)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComplianceConfig;
    use crate::error::RenderError;
    use crate::pdf::assemble::assemble;
    use crate::pdf::pages::RenderedPage;
    use crate::pdf::render::RenderContext;
    use crate::record::Record;

    fn one_page(_: &RenderContext, _: usize, _: &Record) -> std::result::Result<Vec<RenderedPage>, RenderError> {
        Ok(vec![RenderedPage::new([0.0, 0.0, 612.0, 792.0]).with_content("q Q")])
    }

    fn reload(config: ComplianceConfig, records: &[Record]) -> Document {
        let mut bytes = Vec::new();
        assemble(records, config, &one_page)
            .unwrap()
            .save_to(&mut bytes)
            .unwrap();
        Document::load_mem(&bytes).unwrap()
    }

    #[test]
    fn test_extract_metadata_nonexistent_file() {
        let result = extract_metadata(Path::new("nonexistent.pdf"), "RecordID");
        assert!(matches!(result.unwrap_err(), Error::Io(_)));
    }

    #[test]
    fn test_report_for_compliant_document() {
        let config = ComplianceConfig {
            title: Some("Run 7".to_string()),
            ..ComplianceConfig::enabled().map_field("RecordID", "id")
        };
        let records = vec![Record::new().with("id", "A"), Record::new().with("id", "B")];
        let report = document_metadata(reload(config, &records), "RecordID").unwrap();

        assert_eq!(report.page_count, 2);
        assert_eq!(report.record_count, 2);
        assert_eq!(report.records_with_metadata, 2);
        assert!(report.has_output_intent);
        assert!(report.has_pdfvt_xmp);
        assert_eq!(report.record_ids, vec![Some("A".to_string()), Some("B".to_string())]);
        assert_eq!(report.title.as_deref(), Some("Run 7"));
        assert!(report.producer.unwrap().starts_with("pdfvt-builder"));
    }

    #[test]
    fn test_inline_output_intent_is_reported() {
        let mut arena = ObjectArena::from_document(reload(ComplianceConfig::default(), &[Record::new()]));
        let catalog = Catalog::from_arena(&arena).unwrap();
        let mut intent = Dictionary::new();
        intent.set("Type", crate::pdf::value::name("OutputIntent"));
        intent.set("S", crate::pdf::value::name(OUTPUT_INTENT_SUBTYPE));
        catalog
            .set_output_intents(&mut arena, vec![Object::Dictionary(intent)])
            .unwrap();

        let report = document_metadata(arena.into_document(), "RecordID").unwrap();
        assert!(report.has_output_intent);
    }

    #[test]
    fn test_report_for_plain_document() {
        let report = document_metadata(reload(ComplianceConfig::default(), &[Record::new()]), "RecordID").unwrap();

        assert_eq!(report.page_count, 1);
        assert_eq!(report.record_count, 0);
        assert!(!report.has_output_intent);
        assert!(!report.has_pdfvt_xmp);
        assert!(report.title.is_none());
    }
}
