//! Core library for procurement document field extraction.
//!
//! This crate provides:
//! - PDF reading (flattened text, positioned words, simple tables)
//! - Document type detection from file names and content markers
//! - Config-driven field extraction, spatial (cells) and textual (patterns)
//! - Amount, date and choice normalization
//! - Priority-ordered merge of several documents with fallbacks

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod models;
pub mod pdf;

pub use classify::{BatchDetection, Detection, DetectionMethod, DocumentClassifier};
pub use config::{ConfigStore, FieldMapping};
pub use engine::{Engine, EngineBuilder};
pub use error::{ConfigError, ExtractionError, PdfError, ProcuraError, Result};
pub use extract::{
    CellIndex, DocumentExtractor, ExtractionObserver, FieldEvent, FieldOutcome, Merger,
    RecordingObserver, TracingObserver,
};
pub use models::config::EngineConfig;
pub use models::extraction::{ConfirmationItem, ConfirmationReason, ExtractionResult, FieldValue};
pub use pdf::{DocumentSource, PdfContent, PdfExtractor, PdfPage, PdfProcessor, TextCell};
