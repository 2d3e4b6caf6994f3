//! XMP packets, output intents and the catalog entries that carry them
//!
//! Auditors look for exact substrings in the written file (`pdfvt:version`,
//! `GTS_PDFX`, `pdfvmeta:RecordID`), so namespace URIs and element names here
//! are part of the output contract and must not drift.

use chrono::{DateTime, SecondsFormat, Utc};
use lopdf::{Dictionary, Object, ObjectId, Stream};
use crate::config::OutputIntentConfig;
use crate::error::{Error, Result};
use crate::pdf::arena::ObjectArena;
use crate::pdf::catalog::Catalog;
use crate::pdf::value::{name, text};

pub const NS_X: &str = "adobe:ns:meta/";
pub const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const NS_PDFVMETA: &str = "http://www.npes.org/pdfvt/ns/id/";
pub const NS_PDFVT: &str = "http://www.gts-1.com/namespace/pdfvt/";
pub const NS_PDFX: &str = "http://ns.adobe.com/pdfx/1.3/";
pub const NS_XMP: &str = "http://ns.adobe.com/xap/1.0/";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";

/// Compliance class of the primary (print) profile
pub const PDFX_VERSION: &str = "PDF/X-4";

/// `/S` value of the output intent dictionary
pub const OUTPUT_INTENT_SUBTYPE: &str = "GTS_PDFX";

/// Marker element present in every packet this crate writes
pub const PDFVT_FLAG_ELEMENT: &str = "GTS_PDFVT";

const PACKET_HEADER: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>"#;
const PACKET_TRAILER: &str = r#"<?xpacket end="w"?>"#;

/// Inputs for the document-level XMP packet
#[derive(Debug, Clone)]
pub struct ComplianceProfile {
    /// PDF/VT version string, e.g. `PDF/VT-1`
    pub version: String,
    /// Whether the document claims conformance
    pub conformant: bool,
    /// Creation and metadata date
    pub created: DateTime<Utc>,
    /// Document title (`dc:title`)
    pub title: Option<String>,
}

/// Per-leaf metadata: the record identifier plus mapped record fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafMetadata {
    /// Output key the identifier is stored under
    pub record_id_key: String,
    pub record_id: String,
    /// `(output_key, value)` in mapping order
    pub fields: Vec<(String, String)>,
}

/// Replace `&`, `<` and `>` with entities
///
/// `&` is handled first so the entities introduced for `<` and `>` are not
/// escaped a second time.
pub fn escape_xml_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Whether an output key can be written as a `pdfvmeta` element unchanged
pub fn is_xml_local_name(key: &str) -> bool {
    xml_local_name(key) == key
}

/// Make an output key usable as an XML element local name
fn xml_local_name(key: &str) -> String {
    let mut out: String = key
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || !out.starts_with(|ch: char| ch.is_ascii_alphabetic() || ch == '_') {
        out.insert(0, '_');
    }
    out
}

/// Build the document-level XMP packet
pub fn build_global_descriptor(profile: &ComplianceProfile) -> String {
    let version = escape_xml_text(&profile.version);
    let date = profile.created.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut out = String::new();
    out.push_str(PACKET_HEADER);
    out.push_str(&format!("\n<x:xmpmeta xmlns:x=\"{}\">\n", NS_X));
    out.push_str(&format!("  <rdf:RDF xmlns:rdf=\"{}\">\n", NS_RDF));
    out.push_str("    <rdf:Description rdf:about=\"\"\n");
    out.push_str(&format!("      xmlns:pdfvmeta=\"{}\"\n", NS_PDFVMETA));
    out.push_str(&format!("      xmlns:pdfvt=\"{}\"\n", NS_PDFVT));
    out.push_str(&format!("      xmlns:pdfx=\"{}\"\n", NS_PDFX));
    out.push_str(&format!("      xmlns:xmp=\"{}\"\n", NS_XMP));
    out.push_str(&format!("      xmlns:dc=\"{}\">\n", NS_DC));
    out.push_str(&format!("      <pdfvt:version>{}</pdfvt:version>\n", version));
    out.push_str(&format!(
        "      <pdfx:GTS_PDFXVersion>{}</pdfx:GTS_PDFXVersion>\n",
        PDFX_VERSION
    ));
    out.push_str(&format!(
        "      <pdfx:GTS_PDFVTVersion>{}</pdfx:GTS_PDFVTVersion>\n",
        version
    ));
    out.push_str(&format!(
        "      <pdfvmeta:GTS_PDFVT>{}</pdfvmeta:GTS_PDFVT>\n",
        profile.conformant
    ));
    out.push_str(&format!("      <xmp:CreateDate>{}</xmp:CreateDate>\n", date));
    out.push_str(&format!("      <xmp:MetadataDate>{}</xmp:MetadataDate>\n", date));
    if let Some(title) = &profile.title {
        out.push_str("      <dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">");
        out.push_str(&escape_xml_text(title));
        out.push_str("</rdf:li></rdf:Alt></dc:title>\n");
    }
    out.push_str("    </rdf:Description>\n");
    out.push_str("  </rdf:RDF>\n");
    out.push_str("</x:xmpmeta>\n");
    out.push_str(PACKET_TRAILER);
    out
}

/// Build the XMP packet attached to one document-part leaf
pub fn build_leaf_packet(metadata: &LeafMetadata) -> String {
    let id_element = xml_local_name(&metadata.record_id_key);

    let mut out = String::new();
    out.push_str(PACKET_HEADER);
    out.push_str(&format!("\n<x:xmpmeta xmlns:x=\"{}\">\n", NS_X));
    out.push_str(&format!("  <rdf:RDF xmlns:rdf=\"{}\">\n", NS_RDF));
    out.push_str("    <rdf:Description rdf:about=\"\"\n");
    out.push_str(&format!("      xmlns:pdfvmeta=\"{}\">\n", NS_PDFVMETA));
    out.push_str("      <pdfvmeta:GTS_PDFVT>true</pdfvmeta:GTS_PDFVT>\n");
    out.push_str(&format!(
        "      <pdfvmeta:{0}>{1}</pdfvmeta:{0}>\n",
        id_element,
        escape_xml_text(&metadata.record_id)
    ));
    for (key, value) in &metadata.fields {
        out.push_str(&format!(
            "      <pdfvmeta:{0}>{1}</pdfvmeta:{0}>\n",
            xml_local_name(key),
            escape_xml_text(value)
        ));
    }
    out.push_str("    </rdf:Description>\n");
    out.push_str("  </rdf:RDF>\n");
    out.push_str("</x:xmpmeta>\n");
    out.push_str(PACKET_TRAILER);
    out
}

/// Dictionary form of leaf metadata: one text entry per field
pub fn build_leaf_dictionary(metadata: &LeafMetadata) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set(metadata.record_id_key.as_bytes(), text(&metadata.record_id));
    for (key, value) in &metadata.fields {
        dict.set(key.as_bytes(), text(value));
    }
    dict
}

/// Wrap an XMP packet in a `/Metadata` stream
///
/// Metadata streams stay uncompressed so the markers remain greppable.
pub fn metadata_stream(packet: String) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", name("Metadata"));
    dict.set("Subtype", name("XML"));

    let mut stream = Stream::new(dict, packet.into_bytes());
    stream.allows_compression = false;
    stream
}

/// Machine identifier for a display name: whitespace removed, otherwise verbatim
pub fn condition_identifier(profile_name: &str) -> String {
    if profile_name.chars().any(char::is_whitespace) {
        profile_name.chars().filter(|ch| !ch.is_whitespace()).collect()
    } else {
        profile_name.to_string()
    }
}

/// Build the output intent dictionary for a printing condition
pub fn build_output_intent(config: &OutputIntentConfig) -> Dictionary {
    let mut intent = Dictionary::new();
    intent.set("Type", name("OutputIntent"));
    intent.set("S", name(OUTPUT_INTENT_SUBTYPE));
    intent.set("OutputCondition", text(&config.profile_name));
    intent.set(
        "OutputConditionIdentifier",
        text(&condition_identifier(&config.profile_name)),
    );
    intent.set("RegistryName", text(&config.registry_name));
    if let Some(info) = &config.info {
        intent.set("Info", text(info));
    }
    intent
}

/// Register the packet as a stream and make it the catalog's `/Metadata`
pub fn attach_global_metadata(
    arena: &mut ObjectArena,
    catalog: &Catalog,
    packet: String,
) -> Result<ObjectId> {
    let stream_id = arena.register(metadata_stream(packet));
    catalog.set_metadata(arena, stream_id)?;
    Ok(stream_id)
}

/// Register the descriptor and set `/OutputIntents` to a one-element array
pub fn attach_output_intents(
    arena: &mut ObjectArena,
    catalog: &Catalog,
    descriptor: Dictionary,
) -> Result<ObjectId> {
    let intent_id = arena.register(descriptor);
    catalog.set_output_intents(arena, vec![Object::Reference(intent_id)])?;
    Ok(intent_id)
}

/// Read the `pdfvmeta` fields of a leaf packet as `(local_name, text)` pairs
///
/// The `GTS_PDFVT` flag is not a record field and is skipped. Entities are
/// decoded, so values come back exactly as they were in the record.
pub fn read_packet_fields(packet: &[u8]) -> Result<Vec<(String, String)>> {
    let packet = std::str::from_utf8(packet)
        .map_err(|e| Error::MalformedMetadata(format!("packet is not UTF-8: {}", e)))?;
    let doc = roxmltree::Document::parse(packet)
        .map_err(|e| Error::MalformedMetadata(e.to_string()))?;

    let fields = doc
        .descendants()
        .filter(|node| node.is_element())
        .filter(|node| node.tag_name().namespace() == Some(NS_PDFVMETA))
        .filter(|node| node.tag_name().name() != PDFVT_FLAG_ELEMENT)
        .map(|node| {
            (
                node.tag_name().name().to_string(),
                node.text().unwrap_or_default().to_string(),
            )
        })
        .collect();
    Ok(fields)
}
