//! Build configuration
//!
//! Deserialized from JSON with camelCase keys, e.g.
//!
//! ```json
//! {
//!   "enabled": true,
//!   "version": "PDF/VT-1",
//!   "mapping": { "RecordID": "id", "CustomerName": "name" },
//!   "outputIntent": { "profileName": "Coated FOGRA39", "registryName": "http://www.color.org" },
//!   "colorSpace": "CMYK"
//! }
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pdf::xmp::is_xml_local_name;
use crate::record::FieldMapping;

/// Default PDF/VT conformance version
pub const DEFAULT_VERSION: &str = "PDF/VT-1";

/// Default output key holding the record identifier
pub const DEFAULT_RECORD_ID_KEY: &str = "RecordID";

/// Default output condition when the caller enables compliance without one
pub const DEFAULT_PROFILE_NAME: &str = "FOGRA39";
pub const DEFAULT_REGISTRY_NAME: &str = "http://www.color.org";
pub const DEFAULT_PROFILE_INFO: &str = "Coated FOGRA39 (ISO 12647-2:2004)";

/// Color model the renderer should paint in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorSpace {
    #[default]
    Rgb,
    Cmyk,
}

/// Shape of the per-record metadata attached to each leaf
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafMetadataFormat {
    /// XMP packet registered as a `/Metadata` stream
    #[default]
    Xmp,
    /// Plain dictionary of text entries
    Dictionary,
}

/// Output condition for the document-level output intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputIntentConfig {
    /// Display name of the characterized printing condition
    pub profile_name: String,
    /// Registry the condition identifier is looked up in
    #[serde(default = "default_registry_name")]
    pub registry_name: String,
    /// Optional free-text description
    #[serde(default)]
    pub info: Option<String>,
}

fn default_registry_name() -> String {
    DEFAULT_REGISTRY_NAME.to_string()
}

impl Default for OutputIntentConfig {
    fn default() -> Self {
        Self {
            profile_name: DEFAULT_PROFILE_NAME.to_string(),
            registry_name: DEFAULT_REGISTRY_NAME.to_string(),
            info: Some(DEFAULT_PROFILE_INFO.to_string()),
        }
    }
}

/// Compliance configuration for one build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComplianceConfig {
    /// Whether to emit the PDF/VT structure (DPart tree, XMP, output intent)
    pub enabled: bool,
    /// Profile version string written into the XMP packet
    pub version: String,
    /// Output metadata key -> record key
    pub mapping: FieldMapping,
    /// Output key whose mapped record field supplies the record identifier
    pub record_id_key: String,
    /// Output intent override; `None` falls back to the built-in default
    pub output_intent: Option<OutputIntentConfig>,
    /// Color space handed to the renderer
    pub color_space: ColorSpace,
    /// How leaf metadata is stored
    pub leaf_metadata: LeafMetadataFormat,
    /// Record keys that must be present and non-empty in every record
    pub required_fields: Vec<String>,
    /// Document title (Info dictionary and viewer preferences)
    pub title: Option<String>,
    /// Pinned creation timestamp; the build time is used when absent
    pub created: Option<DateTime<Utc>>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            version: DEFAULT_VERSION.to_string(),
            mapping: FieldMapping::new(),
            record_id_key: DEFAULT_RECORD_ID_KEY.to_string(),
            output_intent: None,
            color_space: ColorSpace::default(),
            leaf_metadata: LeafMetadataFormat::default(),
            required_fields: Vec::new(),
            title: None,
            created: None,
        }
    }
}

impl ComplianceConfig {
    /// A compliance-enabled configuration with default version and no mapping
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Builder-style mapping entry
    pub fn map_field(mut self, output_key: impl Into<String>, record_key: impl Into<String>) -> Self {
        self.mapping.insert(output_key, record_key);
        self
    }

    /// Record key that supplies the record identifier, if mapped
    pub fn record_id_field(&self) -> Option<&str> {
        self.mapping.get(&self.record_id_key)
    }

    /// The configured output intent, or the built-in default
    pub fn output_intent_or_default(&self) -> OutputIntentConfig {
        self.output_intent.clone().unwrap_or_default()
    }

    /// Check that every output key can be stored as a leaf metadata element
    ///
    /// Keys are written verbatim as `pdfvmeta` element names and read back by
    /// the same name, so a key that is not a valid XML local name is rejected
    /// rather than rewritten.
    pub fn validate(&self) -> Result<()> {
        let keys = std::iter::once(self.record_id_key.as_str())
            .chain(self.mapping.iter().map(|(output_key, _)| output_key));
        for key in keys {
            if !is_xml_local_name(key) {
                return Err(Error::InvalidMetadataKey(key.to_string()));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
