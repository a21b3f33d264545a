//! Field extraction: text patterns, spatial cells, normalization and merge.

pub mod cells;
pub mod field;
pub mod merge;
pub mod observer;
pub mod postprocess;
pub mod rules;
pub mod text;

pub use cells::CellIndex;
pub use field::{DocumentExtraction, DocumentExtractor, FieldResolution};
pub use merge::Merger;
pub use observer::{ExtractionObserver, FieldEvent, FieldOutcome, RecordingObserver, TracingObserver};
