//! Error types for the procura-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the procura library.
#[derive(Error, Debug)]
pub enum ProcuraError {
    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Field extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating configuration documents.
///
/// These are fatal: a run never starts with an invalid configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist or cannot be read.
    #[error("configuration file not found: {}", path.display())]
    Missing { path: PathBuf },

    /// The configuration document has no entries.
    #[error("{document} is empty")]
    Empty { document: String },

    /// The document is not valid YAML/JSON or has the wrong shape.
    #[error("failed to parse {document}: {reason}")]
    Parse { document: String, reason: String },

    /// A required key is absent from a field definition.
    #[error("field '{field}' is missing required key '{key}'")]
    MissingKey { field: String, key: &'static str },

    /// A field source is neither manual nor bound to a document type.
    #[error("field '{field}' source must set `manual: true` or a `pdf_type`")]
    InvalidSource { field: String },

    /// A field definition is present but malformed.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// A document type definition is malformed.
    #[error("invalid document type '{name}': {reason}")]
    InvalidDocumentType { name: String, reason: String },
}

/// Errors related to reading a PDF document.
///
/// Fatal for the affected document only.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// The file could not be read from disk.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while extracting a single field.
///
/// Always recovered locally: the field is recorded as null and extraction
/// continues with the next field.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// No page contains the configured table marker(s).
    #[error("no page contains table marker {0:?}")]
    MarkerNotFound(Vec<String>),

    /// A table was found but lacks the requested column.
    #[error("table has no column matching '{0}'")]
    ColumnNotFound(String),

    /// No table row carries the requested identifier.
    #[error("no row with {column} = '{value}'")]
    RowNotFound { column: String, value: String },

    /// A raw value could not be normalized to its declared type.
    #[error("failed to normalize {field} as {kind}: '{value}'")]
    Normalization {
        field: String,
        kind: &'static str,
        value: String,
    },

    /// Any other failure while extracting a field.
    #[error("failed to extract {field}: {reason}")]
    Field { field: String, reason: String },
}

/// Result type for the procura library.
pub type Result<T> = std::result::Result<T, ProcuraError>;
