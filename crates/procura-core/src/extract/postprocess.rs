//! Post-processing steps applied to raw extracted strings.

use crate::models::field::PostProcess;

/// Punctuation removed from the end of a value by [`PostProcess::Strip`].
const TRAILING_PUNCTUATION: &[char] = &[
    '。', '，', '；', '：', '、', '.', ',', ';', ':', '！', '!', '？', '?',
];

impl PostProcess {
    /// Apply this step to `value`.
    pub fn apply(&self, value: &str) -> String {
        match self {
            PostProcess::RemoveSuffix { suffix } => {
                value.strip_suffix(suffix.as_str()).unwrap_or(value).to_string()
            }
            PostProcess::RemovePrefix { prefix } => {
                value.strip_prefix(prefix.as_str()).unwrap_or(value).to_string()
            }
            PostProcess::Replace { old, new } if !old.is_empty() => value.replace(old.as_str(), new),
            PostProcess::Replace { .. } => value.to_string(),
            PostProcess::Strip => value
                .trim()
                .trim_end_matches(TRAILING_PUNCTUATION)
                .trim_end()
                .to_string(),
        }
    }
}

/// Run `steps` over `value` in declared order.
pub fn apply_all(steps: &[PostProcess], value: &str) -> String {
    steps
        .iter()
        .fold(value.to_string(), |acc, step| step.apply(&acc))
}
