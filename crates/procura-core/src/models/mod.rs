//! Data models shared across the engine.

pub mod config;
pub mod extraction;
pub mod field;

pub use config::{CellConfig, EngineConfig, MergeConfig, PathsConfig};
pub use extraction::{
    ConfirmationItem, ConfirmationReason, DocumentFailure, ExtractionResult, FieldValue,
};
pub use field::{
    CellKeyValueSpec, DataType, Direction, DocumentBinding, DocumentTypeConfig, Extraction,
    ExtractionSpec, FieldConfig, FieldSource, HorizontalSpec, KeyedSpec, MultilineSpec,
    PostProcess, RegexSpec, RowIdentifier, TableCellSpec, TableFirstRowSpec, VerticalSpec,
};
