//! Error types for the PDF/VT builder

use lopdf::ObjectId;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error produced by an external record renderer
pub type RenderError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the PDF/VT builder
#[derive(Error, Debug)]
pub enum Error {
    /// The build was started with zero records
    #[error("No input records provided; pass at least one record")]
    EmptyInputSet,

    /// A reference the arena never issued
    #[error("Dangling reference: object {0:?} was never registered")]
    DanglingReference(ObjectId),

    /// A resolved object has a different shape than its protocol position requires
    #[error("Type mismatch at object {id:?}: expected {expected}, found {found}")]
    TypeMismatch {
        id: ObjectId,
        expected: &'static str,
        found: &'static str,
    },

    /// A declared-required record field is absent or empty
    #[error("Record {index} is missing required field '{field}'")]
    MissingRequiredField { index: usize, field: String },

    /// The external renderer failed for a record
    #[error("Rendering record {index} failed: {source}")]
    RenderFailure {
        index: usize,
        #[source]
        source: RenderError,
    },

    /// An assembler operation was called in the wrong build state
    #[error("Invalid build state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// An output metadata key cannot be written as an XMP element name
    #[error("Invalid metadata key '{0}': use letters, digits, '_', '-' or '.', starting with a letter or '_'")]
    InvalidMetadataKey(String),

    /// A metadata packet could not be parsed back
    #[error("Malformed metadata packet: {0}")]
    MalformedMetadata(String),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or record input could not be parsed
    #[error("Invalid JSON input: {0}")]
    Config(#[from] serde_json::Error),

    /// General error
    #[error("{0}")]
    General(String),
}
