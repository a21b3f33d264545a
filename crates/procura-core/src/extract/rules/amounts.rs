//! Amount normalization for procurement documents.

use rust_decimal::Decimal;

use super::patterns::{AMOUNT_TOKEN, CURRENCY_WORDS};
use super::{ExtractionMatch, FieldExtractor};

const TEN_THOUSAND: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Finds amount-shaped tokens in free text.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        AMOUNT_TOKEN
            .find_iter(text)
            .filter_map(|m| {
                let value = normalize_amount(m.as_str())?;
                Some(ExtractionMatch::new(value, m.as_str().trim()).with_position(m.start(), m.end()))
            })
            .collect()
    }
}

/// Parse a monetary amount into an exact decimal.
///
/// Currency symbols and words (`￥ ¥ 元 人民币 RMB CNY`), grouping commas
/// (ASCII and full-width) and whitespace are removed. A trailing `万` scales
/// the value by 10000. Returns `None` when what remains is not a number or
/// cannot be held without rounding.
pub fn normalize_amount(raw: &str) -> Option<Decimal> {
    let without_words = CURRENCY_WORDS.replace_all(raw, "");
    let mut cleaned: String = without_words
        .chars()
        .filter(|c| !matches!(c, '￥' | '¥' | '元' | ',' | '，') && !c.is_whitespace())
        .collect();

    let scaled = cleaned.ends_with('万');
    if scaled {
        cleaned.pop();
    }

    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let value = Decimal::from_str_exact(&cleaned).ok()?;
    if !scaled {
        return Some(value);
    }

    // A product that had to be rescaled lost digits
    value
        .checked_mul(TEN_THOUSAND)
        .filter(|product| product.scale() == value.scale())
}
