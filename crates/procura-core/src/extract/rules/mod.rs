//! Value normalizers and token finders.

pub mod amounts;
pub mod choices;
pub mod dates;
pub mod patterns;

pub use amounts::{normalize_amount, AmountExtractor};
pub use choices::{map_choice, ChoiceMapping, MappingMethod};
pub use dates::{normalize_date, to_iso, DateExtractor};

/// Trait for token extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// First occurrence in `text`.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// All occurrences, in text order.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// A value found in text together with what it was read from.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    pub value: T,
    /// Matched source text.
    pub source: String,
    /// Byte range in the searched text.
    pub position: Option<(usize, usize)>,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, source: impl Into<String>) -> Self {
        Self {
            value,
            source: source.into(),
            position: None,
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}
