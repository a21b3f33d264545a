//! Serde shapes of the configuration documents as written by people.
//!
//! Nothing outside `config` sees these; they are compiled into the types in
//! [`crate::models::field`] during validation.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::models::field::{DataType, Direction, PostProcess, RowIdentifier};

#[derive(Debug, Deserialize)]
pub(crate) struct RawFieldConfig {
    pub label: String,
    pub data_type: DataType,
    pub source: RawSource,
    #[serde(default)]
    pub fallback_source: Option<RawBinding>,
    #[serde(default)]
    pub post_process: Vec<PostProcess>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSource {
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub pdf_type: Option<String>,
    #[serde(default)]
    pub extraction: Option<RawExtraction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBinding {
    pub pdf_type: String,
    pub extraction: RawExtraction,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawExtraction {
    #[serde(flatten)]
    pub method: RawMethod,
    #[serde(default)]
    pub default_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "method")]
pub(crate) enum RawMethod {
    #[serde(rename = "cell_keyvalue")]
    CellKeyValue {
        key: String,
        #[serde(default)]
        direction: Direction,
        #[serde(default = "default_fuzzy")]
        fuzzy: bool,
        #[serde(default)]
        max_distance: Option<f32>,
    },
    #[serde(rename = "horizontal_keyvalue")]
    HorizontalKeyValue {
        key: String,
        #[serde(default = "default_delimiter")]
        delimiter: String,
        #[serde(default = "default_stop_pattern")]
        stop_pattern: String,
    },
    #[serde(rename = "vertical_keyvalue")]
    VerticalKeyValue {
        key: String,
        #[serde(default = "default_max_lines")]
        max_lines: usize,
        #[serde(default)]
        value_pattern: Option<String>,
    },
    #[serde(rename = "amount")]
    Amount { key: String },
    #[serde(rename = "date")]
    Date { key: String },
    #[serde(rename = "regex")]
    Regex {
        pattern: String,
        #[serde(default)]
        fallback_pattern: Option<String>,
    },
    #[serde(rename = "multiline")]
    Multiline {
        key: String,
        #[serde(default)]
        end_marker: Option<String>,
        #[serde(default = "default_max_lines")]
        max_lines: usize,
    },
    #[serde(rename = "table_first_row")]
    TableFirstRow {
        table_marker: String,
        #[serde(alias = "column_name")]
        column: String,
    },
    #[serde(rename = "table_cell")]
    TableCell {
        table_markers: Vec<String>,
        row_identifier: RowIdentifier,
        target_column: String,
    },
    #[serde(rename = "fixed_value")]
    FixedValue { value: String },
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDocumentType {
    #[serde(default)]
    pub filename_patterns: Vec<String>,
    #[serde(default)]
    pub content_markers: Vec<String>,
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,
}

fn default_fuzzy() -> bool {
    true
}

pub(crate) fn default_delimiter() -> String {
    r"[:：]?".to_string()
}

pub(crate) fn default_stop_pattern() -> String {
    r"\r?\n|$".to_string()
}

fn default_max_lines() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.5
}
