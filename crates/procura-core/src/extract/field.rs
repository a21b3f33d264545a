//! Per-document field extraction.
//!
//! [`DocumentExtractor`] owns the [`CellIndex`] of exactly one document and
//! resolves every configured field against it: method dispatch, spatial
//! lookup before text patterns, post-processing, then coercion to the
//! field's data type.

use std::collections::BTreeMap;

use tracing::debug;

use super::cells::CellIndex;
use super::observer::{ExtractionObserver, FieldEvent, FieldOutcome};
use super::postprocess::apply_all;
use super::rules::{map_choice, normalize_amount, normalize_date, MappingMethod};
use super::text::{self, first_group};
use crate::error::ExtractionError;
use crate::models::config::CellConfig;
use crate::models::extraction::{ConfirmationItem, ConfirmationReason, FieldValue};
use crate::models::field::{DataType, Direction, Extraction, ExtractionSpec, FieldConfig};
use crate::pdf::PdfContent;

/// Lines scanned below a key when a text fallback looks downwards.
const FALLBACK_SCAN_LINES: usize = 5;

/// Outcome of resolving one field against one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldResolution {
    pub value: Option<FieldValue>,
    /// Post-processed string the value was made from.
    pub raw: Option<String>,
    pub confirmations: Vec<ConfirmationItem>,
    /// Resolved through the field's fallback source.
    pub from_fallback: bool,
}

/// Field resolutions for one document.
#[derive(Debug, Clone, Default)]
pub struct DocumentExtraction {
    pub document_type: String,
    pub fields: BTreeMap<String, FieldResolution>,
}

impl DocumentExtraction {
    /// Field name to value.
    pub fn values(&self) -> BTreeMap<String, Option<FieldValue>> {
        self.fields
            .iter()
            .map(|(name, r)| (name.clone(), r.value.clone()))
            .collect()
    }

    /// All confirmation items, in field order.
    pub fn confirmations(&self) -> Vec<ConfirmationItem> {
        self.fields
            .values()
            .flat_map(|r| r.confirmations.iter().cloned())
            .collect()
    }
}

/// Resolves fields against one document.
pub struct DocumentExtractor<'a> {
    doc: &'a PdfContent,
    document_type: &'a str,
    cells: CellIndex,
    global_aliases: &'a BTreeMap<String, String>,
    observer: &'a dyn ExtractionObserver,
}

impl<'a> DocumentExtractor<'a> {
    /// Index `doc` and prepare to extract fields of `document_type` from it.
    pub fn new(
        doc: &'a PdfContent,
        document_type: &'a str,
        cell_config: &CellConfig,
        global_aliases: &'a BTreeMap<String, String>,
        observer: &'a dyn ExtractionObserver,
    ) -> Self {
        let cells = CellIndex::build(doc, cell_config);
        debug!(
            "Extracting {} from {} ({} cells)",
            document_type,
            doc.file_name,
            cells.len()
        );
        Self {
            doc,
            document_type,
            cells,
            global_aliases,
            observer,
        }
    }

    /// Resolve every field in `fields`. A failing field is recorded as empty.
    pub fn extract_fields(&self, fields: &BTreeMap<String, FieldConfig>) -> DocumentExtraction {
        let fields = fields
            .iter()
            .filter(|(_, f)| !f.is_manual())
            .map(|(name, field)| (name.clone(), self.extract_field(field)))
            .collect();

        DocumentExtraction {
            document_type: self.document_type.to_string(),
            fields,
        }
    }

    /// Resolve one field using its current source binding.
    pub fn extract_field(&self, field: &FieldConfig) -> FieldResolution {
        let Some(binding) = field.binding() else {
            let error = ExtractionError::Field {
                field: field.name.clone(),
                reason: "value is entered manually".to_string(),
            };
            self.emit(field, "manual", FieldOutcome::Failed(error.to_string()));
            return FieldResolution::default();
        };
        self.extract_with(field, &binding.extraction, field.from_fallback)
    }

    /// Resolve `field` with an explicit extraction, e.g. for a secondary
    /// fallback against a document the field is not bound to.
    pub fn extract_with(
        &self,
        field: &FieldConfig,
        extraction: &Extraction,
        from_fallback: bool,
    ) -> FieldResolution {
        let method = extraction.spec.method_name();

        let raw = match self.raw_value(extraction) {
            Ok(raw) => raw,
            Err(e) => {
                self.emit(field, method, FieldOutcome::Failed(e.to_string()));
                return FieldResolution {
                    from_fallback,
                    ..Default::default()
                };
            }
        };

        let raw = raw
            .map(|r| apply_all(&field.post_process, &r).trim().to_string())
            .filter(|r| !r.is_empty());
        let Some(raw) = raw else {
            self.emit(field, method, FieldOutcome::Empty);
            return FieldResolution {
                from_fallback,
                ..Default::default()
            };
        };

        let mut resolution = FieldResolution {
            raw: Some(raw.clone()),
            from_fallback,
            ..Default::default()
        };

        match self.coerce(field, &raw) {
            Ok((value, confirmation)) => {
                resolution.confirmations.extend(confirmation);
                if from_fallback {
                    resolution.confirmations.push(ConfirmationItem {
                        field: field.name.clone(),
                        extracted_value: raw.clone(),
                        mapped_value: Some(value.to_string()),
                        reason: ConfirmationReason::Fallback,
                        source_document: self.document_type.to_string(),
                    });
                }
                self.emit(field, method, FieldOutcome::Extracted(value.clone()));
                resolution.value = Some(value);
            }
            Err(e) => {
                self.emit(field, "normalize", FieldOutcome::Failed(e.to_string()));
            }
        }

        resolution
    }

    fn emit(&self, field: &FieldConfig, method: &'static str, outcome: FieldOutcome) {
        self.observer.on_field(&FieldEvent {
            document_type: self.document_type.to_string(),
            field: field.name.clone(),
            method,
            outcome,
        });
    }

    /// Raw string for an extraction, before post-processing.
    fn raw_value(&self, extraction: &Extraction) -> Result<Option<String>, ExtractionError> {
        let flat = self.doc.text.as_str();

        let value = match &extraction.spec {
            ExtractionSpec::CellKeyValue(spec) => self
                .cells
                .extract_keyvalue_pair(&spec.key, spec.direction, spec.fuzzy, spec.max_distance)
                .or_else(|| {
                    let right = || {
                        text::horizontal_kv(
                            flat,
                            &spec.key,
                            text::DEFAULT_DELIMITER,
                            text::DEFAULT_STOP_PATTERN,
                        )
                    };
                    let below = || text::vertical_kv(flat, &spec.key, FALLBACK_SCAN_LINES, None);
                    match spec.direction {
                        Direction::Right => right(),
                        Direction::Below => below(),
                        Direction::Auto => right().or_else(below),
                    }
                }),
            ExtractionSpec::HorizontalKeyValue(spec) => self
                .cells
                .extract_keyvalue_pair(&spec.key, Direction::Right, false, None)
                .or_else(|| text::horizontal_with(flat, &spec.pattern)),
            ExtractionSpec::VerticalKeyValue(spec) => {
                let spatial = self
                    .cells
                    .extract_keyvalue_pair(&spec.key, Direction::Below, false, None);
                let spatial = match &spec.value_pattern {
                    Some(pattern) => spatial.and_then(|v| pattern.captures(&v).map(|c| first_group(&c))),
                    None => spatial,
                };
                spatial.or_else(|| {
                    text::vertical_kv(flat, &spec.key, spec.max_lines, spec.value_pattern.as_ref())
                })
            }
            // Normalized here so text fields get the same value; a token that
            // does not normalize is kept for coerce to report.
            ExtractionSpec::Amount(spec) => text::amount_token(flat, &spec.key)
                .map(|token| normalize_amount(&token).map_or(token, |v| v.to_string())),
            ExtractionSpec::Date(spec) => text::date_token(flat, &spec.key).map(|token| {
                normalize_date(&token).map_or(token, |d| d.format("%Y-%m-%d").to_string())
            }),
            ExtractionSpec::Regex(spec) => text::regex_value(flat, spec),
            ExtractionSpec::Multiline(spec) => {
                text::multiline_value(flat, &spec.key, spec.end_marker.as_deref(), spec.max_lines)
            }
            ExtractionSpec::TableFirstRow(spec) => {
                text::table_first_row(self.doc, &spec.table_marker, &spec.column)?
            }
            ExtractionSpec::TableCell(spec) => text::table_cell(
                self.doc,
                &spec.table_markers,
                &spec.row_identifier,
                &spec.target_column,
            )?,
            ExtractionSpec::FixedValue(value) => Some(value.clone()),
        };

        Ok(value.or_else(|| extraction.default_value.clone()))
    }

    /// Convert a post-processed string to the field's data type.
    fn coerce(
        &self,
        field: &FieldConfig,
        raw: &str,
    ) -> Result<(FieldValue, Option<ConfirmationItem>), ExtractionError> {
        let normalization_error = |kind: &'static str| ExtractionError::Normalization {
            field: field.name.clone(),
            kind,
            value: raw.to_string(),
        };

        match field.data_type {
            DataType::Text => Ok((FieldValue::Text(raw.to_string()), None)),
            DataType::Amount => normalize_amount(raw)
                .map(|v| (FieldValue::Amount(v), None))
                .ok_or_else(|| normalization_error("amount")),
            DataType::Date => normalize_date(raw)
                .map(|d| (FieldValue::Date(d), None))
                .ok_or_else(|| normalization_error("date")),
            DataType::Choice => {
                let mapping = map_choice(raw, &field.choices, &field.aliases, self.global_aliases);
                let reason = match mapping.method {
                    MappingMethod::Exact => None,
                    MappingMethod::Alias => Some(ConfirmationReason::Alias),
                    MappingMethod::Unmapped => Some(ConfirmationReason::Unmapped),
                };
                let confirmation = reason.map(|reason| ConfirmationItem {
                    field: field.name.clone(),
                    extracted_value: raw.to_string(),
                    mapped_value: Some(mapping.value.clone()),
                    reason,
                    source_document: self.document_type.to_string(),
                });
                Ok((FieldValue::Text(mapping.value), confirmation))
            }
        }
    }
}
