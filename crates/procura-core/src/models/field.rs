//! Strongly-typed field and document-type definitions.
//!
//! These are produced by [`crate::config::ConfigStore`] after validation;
//! every regex is already compiled and every method carries exactly the
//! parameters it needs.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Declared type of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Free text, kept as extracted.
    Text,
    /// Monetary amount, normalized to an exact decimal.
    Amount,
    /// Calendar date, normalized to ISO `YYYY-MM-DD`.
    Date,
    /// One of a closed set of values, resolved through enum mapping.
    Choice,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Amount => "amount",
            DataType::Date => "date",
            DataType::Choice => "choice",
        }
    }
}

/// Where to look for a value relative to its key cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Right,
    Below,
    /// Right first, then below.
    #[default]
    Auto,
}

/// Identifies a table row by the value of one of its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIdentifier {
    pub column: String,
    pub value: String,
}

/// Spatial key/value lookup.
#[derive(Debug, Clone)]
pub struct CellKeyValueSpec {
    pub key: String,
    pub direction: Direction,
    pub fuzzy: bool,
    /// Overrides the engine-wide neighbour distance.
    pub max_distance: Option<f32>,
}

/// `key<delimiter>value<stop>` on a single line of flattened text.
#[derive(Debug, Clone)]
pub struct HorizontalSpec {
    pub key: String,
    /// Compiled `key + delimiter + (value) + stop` expression.
    pub pattern: Regex,
}

/// Key on one line, value on one of the following lines.
#[derive(Debug, Clone)]
pub struct VerticalSpec {
    pub key: String,
    pub max_lines: usize,
    pub value_pattern: Option<Regex>,
}

/// Keyed lookup used by the amount and date methods.
#[derive(Debug, Clone)]
pub struct KeyedSpec {
    pub key: String,
}

/// Free-form regex with an optional second attempt.
#[derive(Debug, Clone)]
pub struct RegexSpec {
    pub pattern: Regex,
    pub fallback_pattern: Option<Regex>,
}

/// Value spanning several lines after `key:`.
#[derive(Debug, Clone)]
pub struct MultilineSpec {
    pub key: String,
    pub end_marker: Option<String>,
    pub max_lines: usize,
}

/// First data row of the table on the page carrying `table_marker`.
#[derive(Debug, Clone)]
pub struct TableFirstRowSpec {
    pub table_marker: String,
    pub column: String,
}

/// Intersection of an identified row and a target column.
#[derive(Debug, Clone)]
pub struct TableCellSpec {
    pub table_markers: Vec<String>,
    pub row_identifier: RowIdentifier,
    pub target_column: String,
}

/// Extraction method with its parameters.
#[derive(Debug, Clone)]
pub enum ExtractionSpec {
    CellKeyValue(CellKeyValueSpec),
    HorizontalKeyValue(HorizontalSpec),
    VerticalKeyValue(VerticalSpec),
    Amount(KeyedSpec),
    Date(KeyedSpec),
    Regex(RegexSpec),
    Multiline(MultilineSpec),
    TableFirstRow(TableFirstRowSpec),
    TableCell(TableCellSpec),
    FixedValue(String),
}

impl ExtractionSpec {
    /// Configuration name of the method.
    pub fn method_name(&self) -> &'static str {
        match self {
            ExtractionSpec::CellKeyValue(_) => "cell_keyvalue",
            ExtractionSpec::HorizontalKeyValue(_) => "horizontal_keyvalue",
            ExtractionSpec::VerticalKeyValue(_) => "vertical_keyvalue",
            ExtractionSpec::Amount(_) => "amount",
            ExtractionSpec::Date(_) => "date",
            ExtractionSpec::Regex(_) => "regex",
            ExtractionSpec::Multiline(_) => "multiline",
            ExtractionSpec::TableFirstRow(_) => "table_first_row",
            ExtractionSpec::TableCell(_) => "table_cell",
            ExtractionSpec::FixedValue(_) => "fixed_value",
        }
    }

    /// Key text for methods that have one.
    pub fn key(&self) -> Option<&str> {
        match self {
            ExtractionSpec::CellKeyValue(s) => Some(&s.key),
            ExtractionSpec::HorizontalKeyValue(s) => Some(&s.key),
            ExtractionSpec::VerticalKeyValue(s) => Some(&s.key),
            ExtractionSpec::Amount(s) | ExtractionSpec::Date(s) => Some(&s.key),
            ExtractionSpec::Multiline(s) => Some(&s.key),
            _ => None,
        }
    }
}

/// An extraction method plus the value used when it finds nothing.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub spec: ExtractionSpec,
    pub default_value: Option<String>,
}

/// Binding of a field to a document type.
#[derive(Debug, Clone)]
pub struct DocumentBinding {
    pub pdf_type: String,
    pub extraction: Extraction,
}

/// Where a field's value comes from.
#[derive(Debug, Clone)]
pub enum FieldSource {
    /// Entered by a person; never extracted.
    Manual,
    /// Extracted from a document of the bound type.
    Document(DocumentBinding),
}

/// One post-processing step applied to a raw value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostProcess {
    RemoveSuffix { suffix: String },
    RemovePrefix { prefix: String },
    Replace {
        old: String,
        #[serde(default)]
        new: String,
    },
    /// Trim whitespace and trailing punctuation.
    Strip,
}

/// A validated field definition.
#[derive(Debug, Clone)]
pub struct FieldConfig {
    pub name: String,
    pub label: String,
    pub data_type: DataType,
    pub source: FieldSource,
    pub fallback_source: Option<DocumentBinding>,
    pub post_process: Vec<PostProcess>,
    pub choices: Vec<String>,
    pub aliases: BTreeMap<String, String>,
    /// Set when `source` was substituted from `fallback_source` for a
    /// document type lookup.
    pub from_fallback: bool,
}

impl FieldConfig {
    pub fn is_manual(&self) -> bool {
        matches!(self.source, FieldSource::Manual)
    }

    /// The document binding currently in effect, if any.
    pub fn binding(&self) -> Option<&DocumentBinding> {
        match &self.source {
            FieldSource::Document(binding) => Some(binding),
            FieldSource::Manual => None,
        }
    }

    /// Document type this field is primarily extracted from.
    pub fn pdf_type(&self) -> Option<&str> {
        self.binding().map(|b| b.pdf_type.as_str())
    }

    /// Copy of this field with the fallback binding as its source.
    pub fn with_fallback_source(&self) -> Option<FieldConfig> {
        let fallback = self.fallback_source.clone()?;
        Some(FieldConfig {
            source: FieldSource::Document(fallback),
            from_fallback: true,
            ..self.clone()
        })
    }
}

/// Filename and content heuristics for one document type.
#[derive(Debug, Clone)]
pub struct DocumentTypeConfig {
    pub name: String,
    /// Case-insensitive expressions matched against the file name.
    pub filename_patterns: Vec<Regex>,
    /// Literal substrings looked up in the flattened text.
    pub content_markers: Vec<String>,
    pub confidence_threshold: f32,
}

impl fmt::Display for DocumentTypeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} filename patterns, {} content markers, threshold {:.2})",
            self.name,
            self.filename_patterns.len(),
            self.content_markers.len(),
            self.confidence_threshold
        )
    }
}
