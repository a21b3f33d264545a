//! Extraction results returned to callers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

/// A normalized field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Amount(Decimal),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            FieldValue::Amount(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Amount(d) => write!(f, "{}", d),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Why a value needs a human to look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationReason {
    /// Resolved through the alias table.
    Alias,
    /// Not a known choice and not an alias; kept verbatim.
    Unmapped,
    /// Taken from a fallback document rather than the primary source.
    Fallback,
}

impl fmt::Display for ConfirmationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfirmationReason::Alias => "alias",
            ConfirmationReason::Unmapped => "unmapped",
            ConfirmationReason::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// A value surfaced for manual confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationItem {
    pub field: String,
    pub extracted_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_value: Option<String>,
    pub reason: ConfirmationReason,
    /// Document type the value was read from.
    pub source_document: String,
}

/// A document that could not be read during a batch.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub document_type: String,
    pub document: String,
    pub error: String,
}

/// Merged outcome of one extraction run over a set of documents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    /// Field name to value; `None` when nothing could be extracted.
    pub values: BTreeMap<String, Option<FieldValue>>,
    /// Field name to the document type that supplied its value.
    pub sources: BTreeMap<String, String>,
    /// Values resolved through a non-exact mechanism.
    pub requires_confirmation: Vec<ConfirmationItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_documents: Vec<DocumentFailure>,
}

impl ExtractionResult {
    /// Non-null value of a field.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field).and_then(|v| v.as_ref())
    }

    /// Document type a field's value came from.
    pub fn source_of(&self, field: &str) -> Option<&str> {
        self.sources.get(field).map(String::as_str)
    }

    pub fn needs_confirmation(&self, field: &str) -> bool {
        self.requires_confirmation.iter().any(|c| c.field == field)
    }

    /// Number of fields with a value.
    pub fn filled(&self) -> usize {
        self.values.values().filter(|v| v.is_some()).count()
    }
}
