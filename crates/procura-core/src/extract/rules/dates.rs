//! Date normalization.

use chrono::NaiveDate;

use super::patterns::DATE_TOKEN;
use super::{ExtractionMatch, FieldExtractor};

/// Finds calendar dates in free text.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for caps in DATE_TOKEN.captures_iter(text) {
            let Some(date) = date_from_parts(&caps[1], &caps[2], &caps[3]) else {
                continue;
            };
            if let Some(full_match) = caps.get(0) {
                results.push(
                    ExtractionMatch::new(date, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                );
            }
        }

        results
    }
}

fn date_from_parts(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Parse the first `YYYY[-/.年]M[-/.月]D[日]` date in `raw`.
///
/// Month and day may be one or two digits. Returns `None` when no such date
/// is present or it is not a real calendar date.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let caps = DATE_TOKEN.captures(raw)?;
    date_from_parts(&caps[1], &caps[2], &caps[3])
}

/// ISO `YYYY-MM-DD` form of the date in `raw`.
pub fn to_iso(raw: &str) -> Option<String> {
    normalize_date(raw).map(|d| d.format("%Y-%m-%d").to_string())
}
