//! Enum mapping of raw values onto a field's closed set of choices.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// How a raw value was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    /// Already one of the choices.
    Exact,
    /// Resolved through an alias table.
    Alias,
    /// Left as extracted; needs confirmation.
    Unmapped,
}

impl MappingMethod {
    pub fn confidence(&self) -> f32 {
        match self {
            MappingMethod::Exact => 1.0,
            MappingMethod::Alias => 0.8,
            MappingMethod::Unmapped => 0.0,
        }
    }
}

impl fmt::Display for MappingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MappingMethod::Exact => "exact",
            MappingMethod::Alias => "alias",
            MappingMethod::Unmapped => "unmapped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceMapping {
    pub value: String,
    pub method: MappingMethod,
    pub confidence: f32,
}

/// Map `raw` onto `choices`.
///
/// Field-local aliases are consulted before global ones. Unknown values are
/// returned unchanged with [`MappingMethod::Unmapped`].
pub fn map_choice(
    raw: &str,
    choices: &[String],
    aliases: &BTreeMap<String, String>,
    global_aliases: &BTreeMap<String, String>,
) -> ChoiceMapping {
    let trimmed = raw.trim();

    let (value, method) = if let Some(choice) = choices.iter().find(|c| c.as_str() == trimmed) {
        (choice.clone(), MappingMethod::Exact)
    } else if let Some(canonical) = aliases.get(trimmed).or_else(|| global_aliases.get(trimmed)) {
        (canonical.clone(), MappingMethod::Alias)
    } else {
        (raw.to_string(), MappingMethod::Unmapped)
    };

    ChoiceMapping {
        value,
        confidence: method.confidence(),
        method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices() -> Vec<String> {
        ["公开招标", "邀请招标", "竞争性谈判", "竞争性磋商", "单一来源"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn aliases(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_exact_choices_pass_through_unchanged() {
        let global = aliases(&[("公开招标", "邀请招标")]);
        for choice in choices() {
            let mapped = map_choice(&choice, &choices(), &BTreeMap::new(), &global);
            assert_eq!(mapped.value, choice);
            assert_eq!(mapped.method, MappingMethod::Exact);
            assert_eq!(mapped.confidence, 1.0);
        }
    }

    #[test]
    fn test_every_alias_maps_to_its_canonical_value() {
        let local = aliases(&[("公开招投标", "公开招标"), ("磋商", "竞争性磋商")]);
        let global = aliases(&[("谈判", "竞争性谈判"), ("单一来源采购", "单一来源")]);

        for (alias, canonical) in local.iter().chain(global.iter()) {
            let mapped = map_choice(alias, &choices(), &local, &global);
            assert_eq!(&mapped.value, canonical);
            assert_eq!(mapped.method, MappingMethod::Alias);
        }
    }

    #[test]
    fn test_local_alias_wins_over_global() {
        let local = aliases(&[("谈判", "竞争性磋商")]);
        let global = aliases(&[("谈判", "竞争性谈判")]);
        let mapped = map_choice(" 谈判 ", &choices(), &local, &global);
        assert_eq!(mapped.value, "竞争性磋商");
    }

    #[test]
    fn test_unmapped_value_is_kept() {
        let mapped = map_choice("框架协议", &choices(), &BTreeMap::new(), &BTreeMap::new());
        assert_eq!(mapped.value, "框架协议");
        assert_eq!(mapped.method, MappingMethod::Unmapped);
        assert_eq!(mapped.confidence, 0.0);
    }
}
