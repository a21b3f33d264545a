//! Common regex patterns for procurement documents.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Amounts: optional currency, digits with (full-width) grouping commas,
    // optional fraction and unit. "￥1,234.50元", "人民币 12.5 万元"
    pub static ref AMOUNT_TOKEN: Regex = Regex::new(
        r"(?i)(?:[￥¥]|人民币|RMB|CNY)?[\s\u{3000}]*-?\d[\d,，]*(?:\.\d+)?[\s\u{3000}]*(?:万元|万|元)?"
    ).unwrap();

    // Currency words stripped before parsing
    pub static ref CURRENCY_WORDS: Regex = Regex::new(
        r"(?i)人民币|RMB|CNY"
    ).unwrap();

    // Dates: 2025年1月5日, 2025/1/5, 2025-01-05, 2025.1.5
    pub static ref DATE_TOKEN: Regex = Regex::new(
        r"(\d{4})[\s\u{3000}]*[-/.年][\s\u{3000}]*(\d{1,2})[\s\u{3000}]*[-/.月][\s\u{3000}]*(\d{1,2})[\s\u{3000}]*日?"
    ).unwrap();

    // Runs of whitespace, including the ideographic space
    pub static ref WHITESPACE_RUN: Regex = Regex::new(
        r"[\s\u{3000}]+"
    ).unwrap();
}
