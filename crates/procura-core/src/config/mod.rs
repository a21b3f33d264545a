//! Configuration store: loads, validates and caches the field-mapping and
//! document-pattern documents.
//!
//! Both documents are human-edited YAML (JSON is accepted too). They are
//! validated once, on first access, into [`FieldConfig`] and
//! [`DocumentTypeConfig`] values; later calls are served from the cache
//! until [`ConfigStore::reload`] is called.

mod raw;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::extract::text::build_horizontal_pattern;
use crate::models::config::EngineConfig;
use crate::models::field::*;

use raw::{RawBinding, RawDocumentType, RawExtraction, RawFieldConfig, RawMethod};

/// Validated contents of the field-mapping document.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    pub fields: BTreeMap<String, FieldConfig>,
    /// Aliases shared by every choice field.
    pub global_aliases: BTreeMap<String, String>,
}

/// Where configuration documents are read from.
#[derive(Debug, Clone)]
enum ConfigSource {
    Files {
        field_mapping: PathBuf,
        document_patterns: PathBuf,
    },
    Inline {
        field_mapping: String,
        document_patterns: String,
    },
}

/// Cached access to validated configuration.
///
/// Reads after the first successful load are lock-free. Concurrent first
/// loads may each parse the documents; only one result is kept.
#[derive(Debug)]
pub struct ConfigStore {
    source: ConfigSource,
    fields: OnceLock<FieldMapping>,
    patterns: OnceLock<Vec<DocumentTypeConfig>>,
}

impl ConfigStore {
    /// Store backed by two configuration files.
    pub fn from_paths(field_mapping: impl Into<PathBuf>, document_patterns: impl Into<PathBuf>) -> Self {
        Self::with_source(ConfigSource::Files {
            field_mapping: field_mapping.into(),
            document_patterns: document_patterns.into(),
        })
    }

    /// Store backed by the files named in an engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::from_paths(&config.paths.field_mapping, &config.paths.document_patterns)
    }

    /// Store backed by in-memory documents.
    pub fn from_strings(field_mapping: impl Into<String>, document_patterns: impl Into<String>) -> Self {
        Self::with_source(ConfigSource::Inline {
            field_mapping: field_mapping.into(),
            document_patterns: document_patterns.into(),
        })
    }

    fn with_source(source: ConfigSource) -> Self {
        Self {
            source,
            fields: OnceLock::new(),
            patterns: OnceLock::new(),
        }
    }

    /// Drop cached configuration; the next access re-reads the documents.
    pub fn reload(&mut self) {
        self.fields = OnceLock::new();
        self.patterns = OnceLock::new();
        debug!("Configuration cache cleared");
    }

    /// Load both documents, failing on the first invalid entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.load_field_mapping()?;
        self.load_document_patterns()?;
        Ok(())
    }

    /// All configured fields plus the global alias table.
    pub fn load_field_mapping(&self) -> Result<&FieldMapping, ConfigError> {
        if let Some(mapping) = self.fields.get() {
            return Ok(mapping);
        }

        let (text, document) = match &self.source {
            ConfigSource::Files { field_mapping, .. } => (read_document(field_mapping)?, field_mapping.display().to_string()),
            ConfigSource::Inline { field_mapping, .. } => (field_mapping.clone(), "field mapping".to_string()),
        };

        let mapping = parse_field_mapping(&text, &document)?;
        info!("Loaded {} field definitions from {}", mapping.fields.len(), document);
        Ok(self.fields.get_or_init(|| mapping))
    }

    /// Document types in declaration order.
    pub fn load_document_patterns(&self) -> Result<&[DocumentTypeConfig], ConfigError> {
        if let Some(patterns) = self.patterns.get() {
            return Ok(patterns);
        }

        let (text, document) = match &self.source {
            ConfigSource::Files { document_patterns, .. } => {
                (read_document(document_patterns)?, document_patterns.display().to_string())
            }
            ConfigSource::Inline { document_patterns, .. } => {
                (document_patterns.clone(), "document patterns".to_string())
            }
        };

        let patterns = parse_document_patterns(&text, &document)?;
        info!("Loaded {} document types from {}", patterns.len(), document);
        Ok(self.patterns.get_or_init(|| patterns))
    }

    /// Look up one field by name.
    pub fn field(&self, name: &str) -> Result<Option<&FieldConfig>, ConfigError> {
        Ok(self.load_field_mapping()?.fields.get(name))
    }

    /// Aliases shared by all choice fields.
    pub fn global_aliases(&self) -> Result<&BTreeMap<String, String>, ConfigError> {
        Ok(&self.load_field_mapping()?.global_aliases)
    }

    /// Fields extracted from documents of `doc_type`.
    ///
    /// Includes fields whose `fallback_source` names `doc_type`; those are
    /// returned with the fallback binding substituted as their source.
    pub fn fields_for_document_type(
        &self,
        doc_type: &str,
    ) -> Result<BTreeMap<String, FieldConfig>, ConfigError> {
        let mapping = self.load_field_mapping()?;
        let mut fields = BTreeMap::new();

        for (name, field) in &mapping.fields {
            if field.pdf_type() == Some(doc_type) {
                fields.insert(name.clone(), field.clone());
            } else if field
                .fallback_source
                .as_ref()
                .is_some_and(|b| b.pdf_type == doc_type)
            {
                if let Some(substituted) = field.with_fallback_source() {
                    fields.insert(name.clone(), substituted);
                }
            }
        }

        Ok(fields)
    }

    /// Fields entered by people rather than extracted.
    pub fn manual_fields(&self) -> Result<BTreeMap<String, FieldConfig>, ConfigError> {
        Ok(self
            .load_field_mapping()?
            .fields
            .iter()
            .filter(|(_, f)| f.is_manual())
            .map(|(name, f)| (name.clone(), f.clone()))
            .collect())
    }

    /// Names of all configured document types, in declaration order.
    pub fn document_type_names(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self
            .load_document_patterns()?
            .iter()
            .map(|d| d.name.clone())
            .collect())
    }
}

fn read_document(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::Missing {
        path: path.to_path_buf(),
    })
}

fn parse_root(text: &str, document: &str) -> Result<Mapping, ConfigError> {
    let value: Value = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
        document: document.to_string(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Mapping(map) => Ok(map),
        Value::Null => Err(ConfigError::Empty {
            document: document.to_string(),
        }),
        _ => Err(ConfigError::Parse {
            document: document.to_string(),
            reason: "top level must be a mapping".to_string(),
        }),
    }
}

fn section<'a>(root: &'a Mapping, key: &str, document: &str) -> Result<&'a Mapping, ConfigError> {
    match root.get(key) {
        Some(Value::Mapping(map)) if !map.is_empty() => Ok(map),
        Some(Value::Mapping(_)) | Some(Value::Null) | None => Err(ConfigError::Empty {
            document: document.to_string(),
        }),
        Some(_) => Err(ConfigError::Parse {
            document: document.to_string(),
            reason: format!("`{}` must be a mapping", key),
        }),
    }
}

/// Parse and validate a field-mapping document.
pub fn parse_field_mapping(text: &str, document: &str) -> Result<FieldMapping, ConfigError> {
    let root = parse_root(text, document)?;
    let entries = section(&root, "fields", document)?;

    let mut fields = BTreeMap::new();
    for (key, value) in entries {
        let name = key
            .as_str()
            .ok_or_else(|| ConfigError::Parse {
                document: document.to_string(),
                reason: format!("field names must be strings, got {:?}", key),
            })?
            .to_string();

        let field = parse_field(&name, value)?;
        fields.insert(name, field);
    }

    let global_aliases = match root.get("global_aliases") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::Parse {
            document: document.to_string(),
            reason: format!("global_aliases: {}", e),
        })?,
    };

    Ok(FieldMapping {
        fields,
        global_aliases,
    })
}

fn parse_field(name: &str, value: &Value) -> Result<FieldConfig, ConfigError> {
    let map = value.as_mapping().ok_or_else(|| ConfigError::InvalidField {
        field: name.to_string(),
        reason: "definition must be a mapping".to_string(),
    })?;

    for key in ["label", "data_type", "source"] {
        if matches!(map.get(key), None | Some(Value::Null)) {
            return Err(ConfigError::MissingKey {
                field: name.to_string(),
                key,
            });
        }
    }

    let source = map.get("source").and_then(Value::as_mapping);
    let has_binding = source.is_some_and(|s| {
        s.get("manual").and_then(Value::as_bool) == Some(true)
            || s.get("pdf_type").and_then(Value::as_str).is_some()
    });
    if !has_binding {
        return Err(ConfigError::InvalidSource {
            field: name.to_string(),
        });
    }

    let raw: RawFieldConfig =
        serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::InvalidField {
            field: name.to_string(),
            reason: e.to_string(),
        })?;

    compile_field(name, raw)
}

fn compile_field(name: &str, raw: RawFieldConfig) -> Result<FieldConfig, ConfigError> {
    let source = if raw.source.manual {
        FieldSource::Manual
    } else {
        let pdf_type = raw.source.pdf_type.ok_or_else(|| ConfigError::InvalidSource {
            field: name.to_string(),
        })?;
        let extraction = raw.source.extraction.ok_or(ConfigError::MissingKey {
            field: name.to_string(),
            key: "source.extraction",
        })?;
        FieldSource::Document(DocumentBinding {
            pdf_type,
            extraction: compile_extraction(name, extraction)?,
        })
    };

    let fallback_source = raw
        .fallback_source
        .map(|b: RawBinding| -> Result<DocumentBinding, ConfigError> {
            Ok(DocumentBinding {
                pdf_type: b.pdf_type,
                extraction: compile_extraction(name, b.extraction)?,
            })
        })
        .transpose()?;

    if raw.data_type == DataType::Choice && raw.choices.is_empty() {
        return Err(ConfigError::InvalidField {
            field: name.to_string(),
            reason: "choice fields need a non-empty `choices` list".to_string(),
        });
    }

    Ok(FieldConfig {
        name: name.to_string(),
        label: raw.label,
        data_type: raw.data_type,
        source,
        fallback_source,
        post_process: raw.post_process,
        choices: raw.choices,
        aliases: raw.aliases,
        from_fallback: false,
    })
}

fn compile_regex(field: &str, what: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidField {
        field: field.to_string(),
        reason: format!("invalid {}: {}", what, e),
    })
}

fn require_non_empty(field: &str, what: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field: field.to_string(),
            reason: format!("`{}` must not be empty", what),
        });
    }
    Ok(())
}

fn compile_extraction(field: &str, raw: RawExtraction) -> Result<Extraction, ConfigError> {
    let spec = match raw.method {
        RawMethod::CellKeyValue {
            key,
            direction,
            fuzzy,
            max_distance,
        } => {
            require_non_empty(field, "key", &key)?;
            ExtractionSpec::CellKeyValue(CellKeyValueSpec {
                key,
                direction,
                fuzzy,
                max_distance,
            })
        }
        RawMethod::HorizontalKeyValue {
            key,
            delimiter,
            stop_pattern,
        } => {
            require_non_empty(field, "key", &key)?;
            let pattern = build_horizontal_pattern(&key, &delimiter, &stop_pattern).map_err(|e| {
                ConfigError::InvalidField {
                    field: field.to_string(),
                    reason: format!("invalid delimiter/stop_pattern: {}", e),
                }
            })?;
            ExtractionSpec::HorizontalKeyValue(HorizontalSpec { key, pattern })
        }
        RawMethod::VerticalKeyValue {
            key,
            max_lines,
            value_pattern,
        } => {
            require_non_empty(field, "key", &key)?;
            let value_pattern = value_pattern
                .map(|p| compile_regex(field, "value_pattern", &p))
                .transpose()?;
            ExtractionSpec::VerticalKeyValue(VerticalSpec {
                key,
                max_lines,
                value_pattern,
            })
        }
        RawMethod::Amount { key } => {
            require_non_empty(field, "key", &key)?;
            ExtractionSpec::Amount(KeyedSpec { key })
        }
        RawMethod::Date { key } => {
            require_non_empty(field, "key", &key)?;
            ExtractionSpec::Date(KeyedSpec { key })
        }
        RawMethod::Regex {
            pattern,
            fallback_pattern,
        } => ExtractionSpec::Regex(RegexSpec {
            pattern: compile_regex(field, "pattern", &pattern)?,
            fallback_pattern: fallback_pattern
                .map(|p| compile_regex(field, "fallback_pattern", &p))
                .transpose()?,
        }),
        RawMethod::Multiline {
            key,
            end_marker,
            max_lines,
        } => {
            require_non_empty(field, "key", &key)?;
            ExtractionSpec::Multiline(MultilineSpec {
                key,
                end_marker,
                max_lines,
            })
        }
        RawMethod::TableFirstRow {
            table_marker,
            column,
        } => {
            require_non_empty(field, "table_marker", &table_marker)?;
            require_non_empty(field, "column", &column)?;
            ExtractionSpec::TableFirstRow(TableFirstRowSpec {
                table_marker,
                column,
            })
        }
        RawMethod::TableCell {
            table_markers,
            row_identifier,
            target_column,
        } => {
            if table_markers.is_empty() {
                return Err(ConfigError::InvalidField {
                    field: field.to_string(),
                    reason: "`table_markers` must not be empty".to_string(),
                });
            }
            require_non_empty(field, "target_column", &target_column)?;
            ExtractionSpec::TableCell(TableCellSpec {
                table_markers,
                row_identifier,
                target_column,
            })
        }
        RawMethod::FixedValue { value } => ExtractionSpec::FixedValue(value),
    };

    Ok(Extraction {
        spec,
        default_value: raw.default_value,
    })
}

/// Parse and validate a document-pattern document.
pub fn parse_document_patterns(
    text: &str,
    document: &str,
) -> Result<Vec<DocumentTypeConfig>, ConfigError> {
    let root = parse_root(text, document)?;
    let entries = section(&root, "document_types", document)?;

    let mut types = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let name = key
            .as_str()
            .ok_or_else(|| ConfigError::Parse {
                document: document.to_string(),
                reason: format!("document type names must be strings, got {:?}", key),
            })?
            .to_string();

        let raw: RawDocumentType =
            serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::InvalidDocumentType {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        types.push(compile_document_type(name, raw)?);
    }

    Ok(types)
}

fn compile_document_type(name: String, raw: RawDocumentType) -> Result<DocumentTypeConfig, ConfigError> {
    if raw.filename_patterns.is_empty() && raw.content_markers.is_empty() {
        return Err(ConfigError::InvalidDocumentType {
            name,
            reason: "needs at least one filename pattern or content marker".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&raw.confidence_threshold) {
        return Err(ConfigError::InvalidDocumentType {
            name,
            reason: format!(
                "confidence_threshold {} is outside [0, 1]",
                raw.confidence_threshold
            ),
        });
    }

    let mut filename_patterns = Vec::with_capacity(raw.filename_patterns.len());
    for pattern in &raw.filename_patterns {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidDocumentType {
                name: name.clone(),
                reason: format!("invalid filename pattern '{}': {}", pattern, e),
            })?;
        filename_patterns.push(regex);
    }

    Ok(DocumentTypeConfig {
        name,
        filename_patterns,
        content_markers: raw.content_markers,
        confidence_threshold: raw.confidence_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &str = r#"
fields:
  project_name:
    label: 项目名称
    data_type: text
    source:
      pdf_type: procurement_notice
      extraction:
        method: cell_keyvalue
        key: 项目名称
  control_price:
    label: 最高限价
    data_type: amount
    source:
      pdf_type: procurement_notice
      extraction:
        method: amount
        key: 最高限价
    fallback_source:
      pdf_type: control_price_approval
      extraction:
        method: amount
        key: 控制价
  procurement_method:
    label: 采购方式
    data_type: choice
    choices: [公开招标, 竞争性谈判]
    aliases:
      公开招投标: 公开招标
    source:
      pdf_type: procurement_notice
      extraction:
        method: horizontal_keyvalue
        key: 采购方式
    post_process:
      - type: remove_suffix
        suffix: 。
  archive_number:
    label: 档案号
    data_type: text
    source:
      manual: true
global_aliases:
  谈判: 竞争性谈判
"#;

    const PATTERNS: &str = r#"
document_types:
  procurement_notice:
    filename_patterns: ["采购公告", "招标公告"]
    content_markers: ["采购公告", "投标截止"]
    confidence_threshold: 0.5
  control_price_approval:
    filename_patterns: ["控制价"]
    content_markers: ["控制价", "审核"]
"#;

    #[test]
    fn test_load_field_mapping() {
        let store = ConfigStore::from_strings(FIELDS, PATTERNS);
        let mapping = store.load_field_mapping().unwrap();

        assert_eq!(mapping.fields.len(), 4);
        assert_eq!(mapping.global_aliases.get("谈判").map(String::as_str), Some("竞争性谈判"));

        let method = &mapping.fields["procurement_method"];
        assert_eq!(method.data_type, DataType::Choice);
        assert_eq!(method.post_process.len(), 1);
        assert!(matches!(
            method.binding().unwrap().extraction.spec,
            ExtractionSpec::HorizontalKeyValue(_)
        ));
    }

    #[test]
    fn test_document_patterns_keep_declaration_order() {
        let store = ConfigStore::from_strings(FIELDS, PATTERNS);
        let names = store.document_type_names().unwrap();
        assert_eq!(names, vec!["procurement_notice", "control_price_approval"]);

        let patterns = store.load_document_patterns().unwrap();
        assert_eq!(patterns[1].confidence_threshold, 0.5);
    }

    #[test]
    fn test_fields_for_document_type_substitutes_fallback() {
        let store = ConfigStore::from_strings(FIELDS, PATTERNS);

        let notice = store.fields_for_document_type("procurement_notice").unwrap();
        assert_eq!(notice.len(), 3);
        assert!(!notice["control_price"].from_fallback);

        let approval = store.fields_for_document_type("control_price_approval").unwrap();
        assert_eq!(approval.len(), 1);
        let control_price = &approval["control_price"];
        assert!(control_price.from_fallback);
        assert_eq!(control_price.pdf_type(), Some("control_price_approval"));
        assert_eq!(
            control_price.binding().unwrap().extraction.spec.key(),
            Some("控制价")
        );
    }

    #[test]
    fn test_manual_fields() {
        let store = ConfigStore::from_strings(FIELDS, PATTERNS);
        let manual = store.manual_fields().unwrap();
        assert_eq!(manual.keys().collect::<Vec<_>>(), vec!["archive_number"]);
    }

    #[test]
    fn test_missing_label_names_the_field() {
        let text = r#"
fields:
  project_name:
    data_type: text
    source: {manual: true}
"#;
        let store = ConfigStore::from_strings(text, PATTERNS);
        let err = store.validate().unwrap_err();

        match &err {
            ConfigError::MissingKey { field, key } => {
                assert_eq!(field, "project_name");
                assert_eq!(*key, "label");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("project_name"));
    }

    #[test]
    fn test_source_without_manual_or_pdf_type() {
        let text = r#"
fields:
  budget:
    label: 预算
    data_type: amount
    source:
      extraction: {method: amount, key: 预算}
"#;
        let err = parse_field_mapping(text, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSource { ref field } if field == "budget"));
    }

    #[test]
    fn test_empty_and_absent_documents() {
        assert!(matches!(
            parse_field_mapping("", "inline"),
            Err(ConfigError::Empty { .. })
        ));
        assert!(matches!(
            parse_field_mapping("fields: {}", "inline"),
            Err(ConfigError::Empty { .. })
        ));

        let store = ConfigStore::from_paths("/nonexistent/fields.yaml", "/nonexistent/types.yaml");
        assert!(matches!(store.validate(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let text = r#"
fields:
  bid_no:
    label: 项目编号
    data_type: text
    source:
      pdf_type: procurement_notice
      extraction:
        method: regex
        pattern: "编号[:：]("
"#;
        let err = parse_field_mapping(text, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { ref field, .. } if field == "bid_no"));
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let text = r#"
fields:
  bid_no:
    label: 项目编号
    data_type: text
    source:
      pdf_type: procurement_notice
      extraction:
        method: telepathy
        key: 项目编号
"#;
        let err = parse_field_mapping(text, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { ref field, .. } if field == "bid_no"));
    }

    #[test]
    fn test_choice_without_choices() {
        let text = r#"
fields:
  method:
    label: 采购方式
    data_type: choice
    source: {manual: true}
"#;
        let err = parse_field_mapping(text, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { .. }));
    }

    #[test]
    fn test_reload_reads_files_again() {
        let dir = tempfile::tempdir().unwrap();
        let fields_path = dir.path().join("fields.yaml");
        let patterns_path = dir.path().join("patterns.yaml");
        std::fs::write(&fields_path, FIELDS).unwrap();
        std::fs::write(&patterns_path, PATTERNS).unwrap();

        let mut store = ConfigStore::from_paths(&fields_path, &patterns_path);
        assert_eq!(store.load_field_mapping().unwrap().fields.len(), 4);

        let extended = FIELDS.replace(
            "global_aliases:",
            "  notes:\n    label: 备注\n    data_type: text\n    source: {manual: true}\nglobal_aliases:",
        );
        std::fs::write(&fields_path, extended).unwrap();

        // Served from cache until reloaded
        assert_eq!(store.load_field_mapping().unwrap().fields.len(), 4);
        store.reload();
        assert_eq!(store.load_field_mapping().unwrap().fields.len(), 5);
    }

    #[test]
    fn test_shipped_configuration_is_valid() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let engine = EngineConfig::from_file(&root.join("engine.json"))
            .unwrap()
            .resolve_paths(&root);

        let store = ConfigStore::from_config(&engine);
        store.validate().unwrap();
        assert!(store.manual_fields().unwrap().contains_key("archive_number"));
        assert_eq!(store.document_type_names().unwrap()[0], "procurement_notice");
        for doc_type in &engine.merge.priority {
            assert!(store.document_type_names().unwrap().contains(doc_type));
        }
    }
}
