//! Key/value extraction over flattened document text.
//!
//! Every function here works on plain text (or, for the table strategies, on
//! the tables of a [`PdfContent`]) and returns `None` when nothing matches.

use chrono::NaiveDate;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use tracing::{trace, warn};

use super::rules::patterns::WHITESPACE_RUN;
use super::rules::{normalize_amount, normalize_date, AmountExtractor, DateExtractor, FieldExtractor};
use crate::error::ExtractionError;
use crate::models::field::{RegexSpec, RowIdentifier};
use crate::pdf::{PdfContent, PdfPage, Table};

/// Delimiter accepted between a key and its value when none is configured.
pub const DEFAULT_DELIMITER: &str = r"[:：]?";

/// Stop pattern ending a value when none is configured.
pub const DEFAULT_STOP_PATTERN: &str = r"\r?\n|$";

/// Compile `key + delimiter + (value) + stop` into one expression.
///
/// The key is matched literally; `delimiter` and `stop_pattern` are regexes.
/// Blanks around the delimiter are not part of the value.
pub fn build_horizontal_pattern(
    key: &str,
    delimiter: &str,
    stop_pattern: &str,
) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"{}[ \t\u{{3000}}]*(?:{})[ \t\u{{3000}}]*(.+?)[ \t\u{{3000}}]*(?:{})",
        regex::escape(key),
        delimiter,
        stop_pattern
    ))
}

/// Collapse internal whitespace runs to one space and trim.
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE_RUN.replace_all(value.trim(), " ").into_owned()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// First non-null capture group, or the whole match when there are none.
pub(crate) fn first_group(caps: &Captures<'_>) -> String {
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Value following `key` on the same line.
pub fn horizontal_kv(text: &str, key: &str, delimiter: &str, stop_pattern: &str) -> Option<String> {
    match build_horizontal_pattern(key, delimiter, stop_pattern) {
        Ok(pattern) => horizontal_with(text, &pattern),
        Err(e) => {
            warn!("Invalid horizontal pattern for key '{}': {}", key, e);
            None
        }
    }
}

/// [`horizontal_kv`] with a pattern built by [`build_horizontal_pattern`].
pub fn horizontal_with(text: &str, pattern: &Regex) -> Option<String> {
    let caps = pattern.captures(text)?;
    let value = caps.get(1)?.as_str();
    non_empty(collapse_whitespace(value))
}

/// Value on one of the lines following the line that contains `key`.
///
/// Up to `max_lines` non-blank lines are scanned. Without a `value_pattern`
/// the first of them is returned; with one, the first line it matches yields
/// the match's first capture group (or the whole match).
pub fn vertical_kv(
    text: &str,
    key: &str,
    max_lines: usize,
    value_pattern: Option<&Regex>,
) -> Option<String> {
    let mut candidates = lines_after(text, key, max_lines)?;

    match value_pattern {
        None => candidates.next().map(str::to_string),
        Some(pattern) => candidates.find_map(|line| {
            let caps = pattern.captures(line)?;
            non_empty(first_group(&caps))
        }),
    }
}

/// Trimmed non-blank lines after the first line containing `key`.
fn lines_after<'a>(text: &'a str, key: &str, max_lines: usize) -> Option<impl Iterator<Item = &'a str>> {
    let mut lines = text.lines();
    lines.by_ref().find(|line| line.contains(key))?;
    Some(lines.map(str::trim).filter(|l| !l.is_empty()).take(max_lines))
}

/// Text after `key:` up to `end_marker`, or over at most `max_lines` lines.
///
/// Lines are trimmed and joined with a single space. When `end_marker` is
/// given but never appears, the line limit applies instead.
pub fn multiline_value(
    text: &str,
    key: &str,
    end_marker: Option<&str>,
    max_lines: usize,
) -> Option<String> {
    let start = text.find(key)? + key.len();
    let rest = text[start..].trim_start_matches([' ', '\t', '\u{3000}']);
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))
        .unwrap_or(rest);

    let region = match end_marker.and_then(|marker| rest.find(marker).map(|end| &rest[..end])) {
        Some(region) => region.lines().collect::<Vec<_>>(),
        None => rest.lines().take(max_lines).collect(),
    };

    let joined = region
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(joined)
}

/// Source text of the amount labelled `key`.
///
/// Every same-line occurrence of `key` is tried in turn; the first one whose
/// value holds an amount-shaped token wins. Otherwise the following lines
/// are searched for an amount.
pub fn amount_token(text: &str, key: &str) -> Option<String> {
    let pattern = build_horizontal_pattern(key, DEFAULT_DELIMITER, DEFAULT_STOP_PATTERN).ok()?;
    let extractor = AmountExtractor::new();

    for caps in pattern.captures_iter(text) {
        if let Some(found) = caps.get(1).and_then(|m| extractor.extract(m.as_str())) {
            trace!("Amount for '{}' found on key line: {}", key, found.source);
            return Some(found.source);
        }
    }

    lines_after(text, key, DEFAULT_SCAN_LINES)?.find_map(|line| extractor.extract(line).map(|m| m.source))
}

/// Source text of the date labelled `key`.
pub fn date_token(text: &str, key: &str) -> Option<String> {
    let pattern = build_horizontal_pattern(key, DEFAULT_DELIMITER, DEFAULT_STOP_PATTERN).ok()?;
    let extractor = DateExtractor::new();

    for caps in pattern.captures_iter(text) {
        if let Some(found) = caps.get(1).and_then(|m| extractor.extract(m.as_str())) {
            trace!("Date for '{}' found on key line: {}", key, found.source);
            return Some(found.source);
        }
    }

    lines_after(text, key, DEFAULT_SCAN_LINES)?.find_map(|line| extractor.extract(line).map(|m| m.source))
}

const DEFAULT_SCAN_LINES: usize = 3;

/// Amount labelled `key`, normalized.
pub fn amount(text: &str, key: &str) -> Option<Decimal> {
    amount_token(text, key).and_then(|t| normalize_amount(&t))
}

/// Date labelled `key`, normalized.
pub fn date(text: &str, key: &str) -> Option<NaiveDate> {
    date_token(text, key).and_then(|t| normalize_date(&t))
}

/// Apply `pattern`, then `fallback_pattern`.
pub fn regex_value(text: &str, spec: &RegexSpec) -> Option<String> {
    std::iter::once(&spec.pattern)
        .chain(spec.fallback_pattern.as_ref())
        .find_map(|pattern| {
            let caps = pattern.captures(text)?;
            non_empty(collapse_whitespace(&first_group(&caps)))
        })
}

fn pages_with_markers<'a>(doc: &'a PdfContent, markers: &[String]) -> Vec<&'a PdfPage> {
    doc.pages
        .iter()
        .filter(|page| markers.iter().all(|m| page.text.contains(m.as_str())))
        .collect()
}

fn row_matches(cell: &str, wanted: &str) -> bool {
    let cell: String = cell.chars().filter(|c| !c.is_whitespace()).collect();
    let wanted: String = wanted.chars().filter(|c| !c.is_whitespace()).collect();
    !wanted.is_empty() && cell.contains(&wanted)
}

/// `column` of the first data row of a table on the page carrying `table_marker`.
pub fn table_first_row(
    doc: &PdfContent,
    table_marker: &str,
    column: &str,
) -> Result<Option<String>, ExtractionError> {
    let markers = [table_marker.to_string()];
    let pages = pages_with_markers(doc, &markers);
    if pages.is_empty() {
        return Err(ExtractionError::MarkerNotFound(markers.to_vec()));
    }

    let mut column_found = false;
    for table in pages.iter().flat_map(|p| p.tables.iter()) {
        let Some(index) = table.column_index(column) else {
            continue;
        };
        column_found = true;
        if let Some(value) = table.data_cell(0, index) {
            return Ok(Some(collapse_whitespace(value)));
        }
    }

    if column_found {
        Ok(None)
    } else {
        Err(ExtractionError::ColumnNotFound(column.to_string()))
    }
}

/// Cell at the intersection of the row identified by `row_identifier` and
/// `target_column`, on a page carrying every marker.
pub fn table_cell(
    doc: &PdfContent,
    table_markers: &[String],
    row_identifier: &RowIdentifier,
    target_column: &str,
) -> Result<Option<String>, ExtractionError> {
    let pages = pages_with_markers(doc, table_markers);
    if pages.is_empty() {
        return Err(ExtractionError::MarkerNotFound(table_markers.to_vec()));
    }

    let tables: Vec<&Table> = pages.iter().flat_map(|p| p.tables.iter()).collect();
    let mut missing_column = Some(row_identifier.column.clone());

    for table in tables {
        let Some(id_index) = table.column_index(&row_identifier.column) else {
            continue;
        };
        let Some(target_index) = table.column_index(target_column) else {
            missing_column = Some(target_column.to_string());
            continue;
        };
        missing_column = None;

        let rows = table.data_rows();
        let row = rows
            .iter()
            .position(|row| row.get(id_index).is_some_and(|cell| cell.trim() == row_identifier.value.trim()))
            .or_else(|| {
                rows.iter().position(|row| {
                    row.get(id_index)
                        .is_some_and(|cell| row_matches(cell, &row_identifier.value))
                })
            });
        if let Some(row) = row {
            return Ok(table.data_cell(row, target_index).map(collapse_whitespace));
        }
    }

    match missing_column {
        Some(column) => Err(ExtractionError::ColumnNotFound(column)),
        None => Err(ExtractionError::RowNotFound {
            column: row_identifier.column.clone(),
            value: row_identifier.value.clone(),
        }),
    }
}
