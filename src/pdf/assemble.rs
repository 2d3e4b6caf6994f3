//! Build orchestration
//!
//! A build runs `Empty -> BasePrepared -> RecordsProcessing -> Finalized`.
//! Preconditions are checked before the arena sees a single object, records
//! are committed one at a time in input order, and only a finalized build can
//! be turned into a `FinishedDocument` for writing.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use lopdf::{Dictionary, Document, Object, ObjectId};
use rayon::prelude::*;
use tracing::{debug, info};
use crate::config::ComplianceConfig;
use crate::error::{Error, RenderError, Result};
use crate::pdf::arena::ObjectArena;
use crate::pdf::catalog::Catalog;
use crate::pdf::dpart::{DPartNode, DPartTree, LeafInfo};
use crate::pdf::pages::{PageTree, RenderedPage};
use crate::pdf::render::{RecordRenderer, RenderContext};
use crate::pdf::value::text;
use crate::pdf::xmp::{self, ComplianceProfile};
use crate::record::Record;

const PRODUCER: &str = concat!("pdfvt-builder ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Empty,
    BasePrepared,
    RecordsProcessing,
    Finalized,
}

impl AssemblyState {
    pub fn as_str(self) -> &'static str {
        match self {
            AssemblyState::Empty => "Empty",
            AssemblyState::BasePrepared => "BasePrepared",
            AssemblyState::RecordsProcessing => "RecordsProcessing",
            AssemblyState::Finalized => "Finalized",
        }
    }
}

/// Drives one build from records to a finished arena
#[derive(Debug)]
pub struct DocumentAssembler {
    config: ComplianceConfig,
    arena: ObjectArena,
    state: AssemblyState,
    catalog: Option<Catalog>,
    pages: Option<PageTree>,
    tree: Option<DPartTree>,
    record_count: usize,
}

impl DocumentAssembler {
    /// Start a build with an empty arena
    pub fn new(config: ComplianceConfig) -> Self {
        Self {
            config,
            arena: ObjectArena::new(),
            state: AssemblyState::Empty,
            catalog: None,
            pages: None,
            tree: None,
            record_count: 0,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn arena(&self) -> &ObjectArena {
        &self.arena
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// Render and commit every record, one after the other
    pub fn build<R>(&mut self, records: &[Record], renderer: &R) -> Result<()>
    where
        R: RecordRenderer + ?Sized,
    {
        self.check_preconditions(records)?;
        let context = self.render_context(records.len());

        self.prepare_base()?;
        for (index, record) in records.iter().enumerate() {
            let pages = renderer
                .render(&context, index, record)
                .map_err(|source| Error::RenderFailure { index, source })?;
            self.commit_record(index, record, pages)?;
        }
        self.finalize()
    }

    /// Render records on the rayon pool, then commit them in input order
    ///
    /// Object identifiers come out the same as with `build`. If several
    /// records fail to render, the lowest index is reported and nothing is
    /// committed for any record.
    pub fn build_parallel<R>(&mut self, records: &[Record], renderer: &R) -> Result<()>
    where
        R: RecordRenderer + Sync + ?Sized,
    {
        self.check_preconditions(records)?;
        let context = self.render_context(records.len());

        debug!(records = records.len(), "Rendering records in parallel");
        let rendered: Vec<std::result::Result<Vec<RenderedPage>, RenderError>> = records
            .par_iter()
            .enumerate()
            .map(|(index, record)| renderer.render(&context, index, record))
            .collect();

        let mut committed = Vec::with_capacity(rendered.len());
        for (index, pages) in rendered.into_iter().enumerate() {
            committed.push(pages.map_err(|source| Error::RenderFailure { index, source })?);
        }

        self.prepare_base()?;
        for (index, (record, pages)) in records.iter().zip(committed).enumerate() {
            self.commit_record(index, record, pages)?;
        }
        self.finalize()
    }

    /// Hand the arena over for writing
    pub fn finish(self) -> Result<FinishedDocument> {
        self.expect_state(AssemblyState::Finalized)?;
        let catalog = self.catalog.ok_or(Error::InvalidState {
            expected: "catalog",
            actual: self.state.as_str(),
        })?;
        let pages = self.pages.ok_or(Error::InvalidState {
            expected: "page tree",
            actual: self.state.as_str(),
        })?;
        let page_count = pages.count(&self.arena)?;

        Ok(FinishedDocument {
            arena: self.arena,
            catalog,
            tree: self.tree,
            record_count: self.record_count,
            page_count,
        })
    }

    fn render_context(&self, record_count: usize) -> RenderContext {
        RenderContext {
            color_space: self.config.color_space,
            record_count,
        }
    }

    fn expect_state(&self, expected: AssemblyState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    fn check_preconditions(&self, records: &[Record]) -> Result<()> {
        self.expect_state(AssemblyState::Empty)?;
        if records.is_empty() {
            return Err(Error::EmptyInputSet);
        }
        self.config.validate()?;
        for (index, record) in records.iter().enumerate() {
            if let Some(field) = self
                .config
                .required_fields
                .iter()
                .find(|field| record.text(field).is_none())
            {
                return Err(Error::MissingRequiredField {
                    index,
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// `Empty -> BasePrepared`
    fn prepare_base(&mut self) -> Result<()> {
        self.expect_state(AssemblyState::Empty)?;

        let pages = PageTree::create(&mut self.arena);
        let catalog = Catalog::create(&mut self.arena, pages.id());

        let created = self.config.created.unwrap_or_else(Utc::now);
        let mut info_dict = Dictionary::new();
        info_dict.set("Producer", text(PRODUCER));
        info_dict.set("CreationDate", text(&created.format("D:%Y%m%d%H%M%SZ").to_string()));
        if let Some(title) = &self.config.title {
            info_dict.set("Title", text(title));
            let prefs = catalog.get_or_create_viewer_preferences(&mut self.arena)?;
            self.arena
                .resolve_as_mut::<Dictionary>(prefs)?
                .set("DisplayDocTitle", Object::Boolean(true));
        }
        let info_id = self.arena.register(info_dict);
        self.arena.set_info(info_id);

        if self.config.enabled {
            let profile = ComplianceProfile {
                version: self.config.version.clone(),
                conformant: true,
                created,
                title: self.config.title.clone(),
            };
            xmp::attach_global_metadata(
                &mut self.arena,
                &catalog,
                xmp::build_global_descriptor(&profile),
            )?;

            let intent = self.config.output_intent_or_default();
            xmp::attach_output_intents(&mut self.arena, &catalog, xmp::build_output_intent(&intent))?;
            self.tree = Some(DPartTree::get_or_create_root(&mut self.arena, &catalog)?);

            info!(
                version = %self.config.version,
                output_intent = %intent.profile_name,
                "Compliance profile attached"
            );
        }

        self.catalog = Some(catalog);
        self.pages = Some(pages);
        self.state = AssemblyState::BasePrepared;
        Ok(())
    }

    /// One pass of `RecordsProcessing`: append the record's pages, then its leaf
    fn commit_record(&mut self, index: usize, record: &Record, pages: Vec<RenderedPage>) -> Result<Option<DPartNode>> {
        if self.state == AssemblyState::BasePrepared {
            self.state = AssemblyState::RecordsProcessing;
        }
        self.expect_state(AssemblyState::RecordsProcessing)?;

        let page_tree = self.pages.ok_or(Error::InvalidState {
            expected: "page tree",
            actual: self.state.as_str(),
        })?;
        let mut page_ids = Vec::with_capacity(pages.len());
        for page in pages {
            page_ids.push(page_tree.append_page(&mut self.arena, page)?);
        }

        let leaf = match self.tree {
            Some(tree) => Some(tree.build_record_leaf(&mut self.arena, index, record, &self.config, &page_ids)?),
            None => None,
        };

        self.record_count += 1;
        Ok(leaf)
    }

    /// `RecordsProcessing -> Finalized`
    fn finalize(&mut self) -> Result<()> {
        self.expect_state(AssemblyState::RecordsProcessing)?;
        if let Some(catalog) = self.catalog {
            catalog.repair_dpart_root(&mut self.arena)?;
        }
        self.state = AssemblyState::Finalized;

        info!(
            records = self.record_count,
            objects = self.arena.len(),
            "Build finalized"
        );
        Ok(())
    }
}

/// A finalized build, ready for the writer
///
/// Only read access is offered; saving consumes the value.
#[derive(Debug)]
pub struct FinishedDocument {
    arena: ObjectArena,
    catalog: Catalog,
    tree: Option<DPartTree>,
    record_count: usize,
    page_count: usize,
}

impl FinishedDocument {
    pub fn arena(&self) -> &ObjectArena {
        &self.arena
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog
    }

    /// The document-part tree, present when the compliance profile was enabled
    pub fn dpart_tree(&self) -> Option<DPartTree> {
        self.tree
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Leaves of the document-part tree in record order
    pub fn leaves(&self) -> Result<Vec<LeafInfo>> {
        match self.tree {
            Some(tree) => tree.leaves(&self.arena),
            None => Ok(Vec::new()),
        }
    }

    pub fn page_ids(&self) -> Result<Vec<ObjectId>> {
        PageTree::from_id(self.catalog.pages(&self.arena)?).kids(&self.arena)
    }

    /// Compress page content and write the file
    pub fn save(self, path: &Path) -> Result<()> {
        let mut doc = self.into_document();
        doc.compress();
        doc.save(path)?;
        info!(path = %path.display(), "Saved PDF");
        Ok(())
    }

    /// Compress page content and write to any sink
    pub fn save_to<W: Write>(self, writer: &mut W) -> Result<()> {
        let mut doc = self.into_document();
        doc.compress();
        doc.save_to(writer)?;
        Ok(())
    }

    pub fn into_document(self) -> Document {
        self.arena.into_document()
    }
}

/// Build a document from records in one call
pub fn assemble<R>(records: &[Record], config: ComplianceConfig, renderer: &R) -> Result<FinishedDocument>
where
    R: RecordRenderer + ?Sized,
{
    let mut assembler = DocumentAssembler::new(config);
    assembler.build(records, renderer)?;
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LeafMetadataFormat, OutputIntentConfig};
    use crate::pdf::render::TextPageRenderer;

    fn one_page(_: &RenderContext, _: usize, _: &Record) -> std::result::Result<Vec<RenderedPage>, RenderError> {
        Ok(vec![RenderedPage::new([0.0, 0.0, 612.0, 792.0]).with_content("q Q")])
    }

    fn invoice_config() -> ComplianceConfig {
        ComplianceConfig::enabled().map_field("RecordID", "id")
    }

    fn invoices(ids: &[&str]) -> Vec<Record> {
        ids.iter().map(|id| Record::new().with("id", *id)).collect()
    }

    fn record_ids(doc: &FinishedDocument) -> Vec<Option<String>> {
        doc.leaves()
            .unwrap()
            .iter()
            .map(|leaf| DPartTree::record_id(doc.arena(), leaf.node, "RecordID").unwrap())
            .collect()
    }

    fn saved_bytes(doc: FinishedDocument) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|window| window == needle.as_bytes())
    }

    #[test]
    fn test_two_invoices_give_two_leaves_in_order() {
        let doc = assemble(&invoices(&["INV-001", "INV-002"]), invoice_config(), &one_page).unwrap();

        let tree = doc.dpart_tree().unwrap();
        assert_eq!(DPartTree::children(doc.arena(), tree.root()).unwrap().len(), 2);
        assert_eq!(
            record_ids(&doc),
            vec![Some("INV-001".to_string()), Some("INV-002".to_string())]
        );
        assert_eq!(doc.record_count(), 2);
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn test_missing_identifier_falls_back_to_index() {
        let config = ComplianceConfig::enabled().map_field("RecordID", "absent");
        let doc = assemble(&[Record::new()], config, &one_page).unwrap();
        assert_eq!(record_ids(&doc), vec![Some("record-0".to_string())]);
    }

    #[test]
    fn test_empty_input_registers_nothing() {
        let mut assembler = DocumentAssembler::new(invoice_config());
        let result = assembler.build(&[], &one_page);

        assert!(matches!(result, Err(Error::EmptyInputSet)));
        assert_eq!(assembler.arena().len(), 0);
        assert_eq!(assembler.state(), AssemblyState::Empty);
    }

    #[test]
    fn test_output_intent_identifier_drops_whitespace() {
        let config = ComplianceConfig {
            output_intent: Some(OutputIntentConfig {
                profile_name: "Coated FOGRA39".to_string(),
                ..Default::default()
            }),
            ..invoice_config()
        };
        let doc = assemble(&invoices(&["A"]), config, &one_page).unwrap();

        let intents = doc.catalog().output_intents(doc.arena()).unwrap();
        assert_eq!(intents.len(), 1);
        let intent = intents[0];
        assert_eq!(
            intent.get(b"OutputConditionIdentifier").unwrap().as_str().unwrap(),
            b"CoatedFOGRA39"
        );
        assert_eq!(intent.get(b"S").unwrap().as_name().unwrap(), b"GTS_PDFX");
    }

    #[test]
    fn test_every_leaf_carries_metadata() {
        let ids: Vec<String> = (0..25).map(|i| format!("R{:03}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let doc = assemble(&invoices(&refs), invoice_config(), &one_page).unwrap();

        let leaves = doc.leaves().unwrap();
        assert_eq!(leaves.len(), 25);
        assert!(leaves.iter().all(|leaf| leaf.effective_metadata && leaf.depth == 1));
        for leaf in &leaves {
            assert!(DPartTree::metadata(doc.arena(), leaf.node).unwrap().is_some());
        }
    }

    #[test]
    fn test_duplicate_identifiers_are_kept() {
        let doc = assemble(&invoices(&["SAME", "SAME", "SAME"]), invoice_config(), &one_page).unwrap();
        assert_eq!(record_ids(&doc), vec![Some("SAME".to_string()); 3]);
    }

    #[test]
    fn test_pages_link_to_their_leaf() {
        let two_pages = |_: &RenderContext, _: usize, _: &Record| -> std::result::Result<Vec<RenderedPage>, RenderError> {
            Ok(vec![RenderedPage::new([0.0, 0.0, 10.0, 10.0]); 2])
        };
        let doc = assemble(&invoices(&["A", "B"]), invoice_config(), &two_pages).unwrap();

        let leaves = doc.leaves().unwrap();
        let pages = doc.page_ids().unwrap();
        assert_eq!(pages.len(), 4);
        for (i, page) in pages.iter().enumerate() {
            let linked = doc.arena().reference_maybe(*page, b"DPart").unwrap();
            assert_eq!(linked, Some(leaves[i / 2].node.id()));
        }
    }

    #[test]
    fn test_markup_in_record_is_escaped_once() {
        let records = vec![Record::new().with("id", "A&B <x>")];
        let doc = assemble(&records, invoice_config(), &one_page).unwrap();
        let bytes = saved_bytes(doc);

        assert!(contains(&bytes, "A&amp;B &lt;x&gt;"));
        assert!(!contains(&bytes, "&amp;amp;"));
        assert!(!contains(&bytes, "A&B <x>"));
    }

    #[test]
    fn test_wire_markers_are_written() {
        let bytes = saved_bytes(assemble(&invoices(&["INV-001"]), invoice_config(), &one_page).unwrap());

        assert!(contains(&bytes, "/DPartRoot"));
        assert!(contains(&bytes, "/DParts"));
        assert!(contains(&bytes, "<pdfvt:version>PDF/VT-1</pdfvt:version>"));
        assert!(contains(&bytes, "PDF/X-4"));
        assert!(contains(&bytes, "GTS_PDFX"));
        assert!(contains(&bytes, "<pdfvmeta:RecordID>INV-001</pdfvmeta:RecordID>"));
    }

    #[test]
    fn test_disabled_profile_builds_plain_document() {
        let doc = assemble(&invoices(&["A", "B"]), ComplianceConfig::default(), &one_page).unwrap();

        assert!(doc.dpart_tree().is_none());
        assert!(doc.catalog().metadata(doc.arena()).unwrap().is_none());
        assert!(doc.catalog().output_intents(doc.arena()).unwrap().is_empty());
        assert!(doc.catalog().dpart_root(doc.arena()).unwrap().is_none());
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn test_required_field_checked_before_allocation() {
        let config = ComplianceConfig {
            required_fields: vec!["id".to_string()],
            ..invoice_config()
        };
        let records = vec![Record::new().with("id", "A"), Record::new().with("id", "")];
        let mut assembler = DocumentAssembler::new(config);

        match assembler.build(&records, &one_page) {
            Err(Error::MissingRequiredField { index, field }) => {
                assert_eq!(index, 1);
                assert_eq!(field, "id");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(assembler.arena().len(), 0);
    }

    #[test]
    fn test_unwritable_record_id_key_rejected_in_both_formats() {
        for format in [LeafMetadataFormat::Xmp, LeafMetadataFormat::Dictionary] {
            let config = ComplianceConfig {
                record_id_key: "Record ID".to_string(),
                leaf_metadata: format,
                ..ComplianceConfig::enabled().map_field("Record ID", "id")
            };
            let mut assembler = DocumentAssembler::new(config);

            assert!(matches!(
                assembler.build(&invoices(&["INV-1"]), &one_page),
                Err(Error::InvalidMetadataKey(ref key)) if key == "Record ID"
            ));
            assert_eq!(assembler.arena().len(), 0);
        }
    }

    #[test]
    fn test_record_id_reads_back_in_both_formats() {
        for format in [LeafMetadataFormat::Xmp, LeafMetadataFormat::Dictionary] {
            let config = ComplianceConfig {
                record_id_key: "Record_ID".to_string(),
                leaf_metadata: format,
                ..ComplianceConfig::enabled().map_field("Record_ID", "id")
            };
            let doc = assemble(&invoices(&["INV-1"]), config, &one_page).unwrap();
            let leaf = doc.leaves().unwrap()[0].node;

            assert_eq!(
                DPartTree::record_id(doc.arena(), leaf, "Record_ID").unwrap().as_deref(),
                Some("INV-1")
            );
        }
    }

    #[test]
    fn test_render_failure_aborts_build() {
        let fails_on_second = |_: &RenderContext, index: usize, _: &Record| -> std::result::Result<Vec<RenderedPage>, RenderError> {
            if index == 1 {
                Err("template missing".into())
            } else {
                Ok(vec![RenderedPage::new([0.0, 0.0, 10.0, 10.0])])
            }
        };
        let mut assembler = DocumentAssembler::new(invoice_config());
        let result = assembler.build(&invoices(&["A", "B", "C"]), &fails_on_second);

        assert!(matches!(result, Err(Error::RenderFailure { index: 1, .. })));
        assert_ne!(assembler.state(), AssemblyState::Finalized);
        assert!(matches!(assembler.finish(), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_build_twice_is_rejected() {
        let mut assembler = DocumentAssembler::new(invoice_config());
        assembler.build(&invoices(&["A"]), &one_page).unwrap();
        assert!(matches!(
            assembler.build(&invoices(&["B"]), &one_page),
            Err(Error::InvalidState { expected: "Empty", actual: "Finalized" })
        ));
    }

    #[test]
    fn test_finish_before_build_is_rejected() {
        let assembler = DocumentAssembler::new(invoice_config());
        assert!(matches!(
            assembler.finish(),
            Err(Error::InvalidState { expected: "Finalized", actual: "Empty" })
        ));
    }

    #[test]
    fn test_parallel_build_matches_sequential() {
        let records: Vec<Record> = (0..40)
            .map(|i| Record::new().with("id", format!("P{}", i)).with("name", format!("Name {}", i)))
            .collect();
        let created = chrono::DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let config = ComplianceConfig {
            created: Some(created),
            ..invoice_config().map_field("Name", "name")
        };
        let renderer = TextPageRenderer::default();

        let sequential = assemble(&records, config.clone(), &renderer).unwrap();
        let mut assembler = DocumentAssembler::new(config);
        assembler.build_parallel(&records, &renderer).unwrap();
        let parallel = assembler.finish().unwrap();

        assert_eq!(
            format!("{:?}", sequential.arena().document().objects),
            format!("{:?}", parallel.arena().document().objects)
        );
        assert_eq!(record_ids(&parallel)[39], Some("P39".to_string()));
    }

    #[test]
    fn test_parallel_reports_lowest_failing_index() {
        let fails_late = |_: &RenderContext, index: usize, _: &Record| -> std::result::Result<Vec<RenderedPage>, RenderError> {
            if index >= 3 {
                Err(format!("bad record {}", index).into())
            } else {
                Ok(Vec::new())
            }
        };
        let mut assembler = DocumentAssembler::new(invoice_config());
        let records: Vec<Record> = (0..10).map(|_| Record::new()).collect();

        assert!(matches!(
            assembler.build_parallel(&records, &fails_late),
            Err(Error::RenderFailure { index: 3, .. })
        ));
        assert_eq!(assembler.arena().len(), 0);
    }

    #[test]
    fn test_title_sets_info_and_viewer_preferences() {
        let config = ComplianceConfig {
            title: Some("Statements".to_string()),
            ..invoice_config()
        };
        let doc = assemble(&invoices(&["A"]), config, &one_page).unwrap();

        let prefs = doc.catalog().viewer_preferences(doc.arena()).unwrap().unwrap();
        let prefs = doc.arena().resolve_as::<Dictionary>(prefs).unwrap();
        assert!(matches!(prefs.get(b"DisplayDocTitle"), Ok(Object::Boolean(true))));

        let info = match doc.arena().document().trailer.get(b"Info") {
            Ok(Object::Reference(id)) => *id,
            other => panic!("no Info reference: {:?}", other),
        };
        let info = doc.arena().resolve_as::<Dictionary>(info).unwrap();
        assert_eq!(info.get(b"Title").unwrap().as_str().unwrap(), b"Statements");
        assert!(info.has(b"CreationDate"));
    }

    #[test]
    fn test_finalize_repair_is_idempotent_on_finished_catalog() {
        let doc = assemble(&invoices(&["A"]), invoice_config(), &one_page).unwrap();
        let mut arena = ObjectArena::from_document(doc.into_document());
        let catalog = Catalog::from_arena(&arena).unwrap();

        let before = format!("{:?}", arena.resolve(catalog.id()).unwrap());
        assert!(!catalog.repair_dpart_root(&mut arena).unwrap());
        assert!(!catalog.repair_dpart_root(&mut arena).unwrap());
        assert_eq!(before, format!("{:?}", arena.resolve(catalog.id()).unwrap()));
    }
}
