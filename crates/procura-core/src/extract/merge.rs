//! Priority-ordered merge of field values across a set of documents.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::field::{DocumentExtraction, DocumentExtractor, FieldResolution};
use super::observer::ExtractionObserver;
use crate::config::ConfigStore;
use crate::error::ConfigError;
use crate::models::config::{CellConfig, MergeConfig};
use crate::models::extraction::{DocumentFailure, ExtractionResult};
use crate::models::field::FieldConfig;
use crate::pdf::DocumentSource;

/// Merges documents describing the same procurement into one field map.
pub struct Merger<'a> {
    store: &'a ConfigStore,
    cells: &'a CellConfig,
    merge: &'a MergeConfig,
    observer: &'a dyn ExtractionObserver,
}

impl<'a> Merger<'a> {
    pub fn new(
        store: &'a ConfigStore,
        cells: &'a CellConfig,
        merge: &'a MergeConfig,
        observer: &'a dyn ExtractionObserver,
    ) -> Self {
        Self {
            store,
            cells,
            merge,
            observer,
        }
    }

    /// Processing order: listed priority types first, then the rest by name.
    pub fn processing_order<S>(&self, documents: &BTreeMap<String, S>) -> Vec<String> {
        let mut order: Vec<String> = self
            .merge
            .priority
            .iter()
            .filter(|t| documents.contains_key(*t))
            .cloned()
            .collect();
        order.extend(
            documents
                .keys()
                .filter(|t| !self.merge.priority.contains(*t))
                .cloned(),
        );
        order
    }

    /// Extract every document and merge the results.
    ///
    /// The first non-null value in priority order wins. Values read through a
    /// field's fallback source are only used when no document yielded the
    /// field from its primary source. Unreadable documents are reported in
    /// [`ExtractionResult::failed_documents`]; only invalid configuration is
    /// an error.
    pub fn merge<S: DocumentSource>(
        &self,
        documents: &BTreeMap<String, S>,
    ) -> Result<ExtractionResult, ConfigError> {
        let mapping = self.store.load_field_mapping()?;
        self.store.load_document_patterns()?;

        let mut result = ExtractionResult::default();
        for (name, field) in &mapping.fields {
            if !field.is_manual() {
                result.values.insert(name.clone(), None);
            }
        }

        let order = self.processing_order(documents);
        info!("Merging {} documents in order: {}", order.len(), order.join(", "));

        let mut extractions = Vec::with_capacity(order.len());
        for doc_type in &order {
            let Some(source) = documents.get(doc_type) else {
                continue;
            };
            let fields = self.store.fields_for_document_type(doc_type)?;
            match self.extract_document(doc_type, source, &fields, &mapping.global_aliases) {
                Ok(extraction) => extractions.push(extraction),
                Err(failure) => result.failed_documents.push(failure),
            }
        }

        // Primary sources first, then fallback sources, each in priority order
        for use_fallback in [false, true] {
            for extraction in &extractions {
                for (name, resolution) in &extraction.fields {
                    if resolution.from_fallback == use_fallback {
                        fill(&mut result, name, &extraction.document_type, resolution);
                    }
                }
            }
        }

        self.secondary_fallbacks(documents, &mapping.fields, &mapping.global_aliases, &mut result)?;

        for excluded in &self.merge.excluded_fields {
            result.values.remove(excluded);
            result.sources.remove(excluded);
        }
        result
            .requires_confirmation
            .retain(|c| !self.merge.excluded_fields.contains(&c.field));

        info!(
            "Merged {}/{} fields, {} need confirmation, {} documents failed",
            result.filled(),
            result.values.len(),
            result.requires_confirmation.len(),
            result.failed_documents.len()
        );
        Ok(result)
    }

    /// Open one document and resolve `fields` against it with a fresh index.
    fn extract_document<S: DocumentSource + ?Sized>(
        &self,
        doc_type: &str,
        source: &S,
        fields: &BTreeMap<String, FieldConfig>,
        global_aliases: &BTreeMap<String, String>,
    ) -> Result<DocumentExtraction, DocumentFailure> {
        let content = source.open().map_err(|e| {
            warn!("Skipping {} ({}): {}", source.name(), doc_type, e);
            DocumentFailure {
                document_type: doc_type.to_string(),
                document: source.name(),
                error: e.to_string(),
            }
        })?;

        let extractor =
            DocumentExtractor::new(&content, doc_type, self.cells, global_aliases, self.observer);
        Ok(extractor.extract_fields(fields))
    }

    /// Re-query designated documents for fields still empty.
    fn secondary_fallbacks<S: DocumentSource>(
        &self,
        documents: &BTreeMap<String, S>,
        fields: &BTreeMap<String, FieldConfig>,
        global_aliases: &BTreeMap<String, String>,
        result: &mut ExtractionResult,
    ) -> Result<(), ConfigError> {
        for (name, doc_type) in &self.merge.secondary_fallbacks {
            if result.get(name).is_some() || self.merge.excluded_fields.contains(name) {
                continue;
            }
            let Some(field) = fields.get(name) else {
                warn!("Secondary fallback names unknown field '{}'", name);
                continue;
            };
            let Some(source) = documents.get(doc_type) else {
                debug!("No {} document for secondary fallback of {}", doc_type, name);
                continue;
            };

            let type_fields = self.store.fields_for_document_type(doc_type)?;
            let extraction = match type_fields.get(name).and_then(FieldConfig::binding) {
                Some(binding) => binding.extraction.clone(),
                None => match field.binding() {
                    Some(binding) => binding.extraction.clone(),
                    None => continue,
                },
            };

            let content = match source.open() {
                Ok(content) => content,
                Err(e) => {
                    warn!("Secondary fallback for {} cannot read {}: {}", name, source.name(), e);
                    continue;
                }
            };
            let extractor =
                DocumentExtractor::new(&content, doc_type, self.cells, global_aliases, self.observer);
            let resolution = extractor.extract_with(field, &extraction, true);

            if resolution.value.is_some() {
                debug!("Secondary fallback filled {} from {}", name, doc_type);
                fill(result, name, doc_type, &resolution);
            }
        }
        Ok(())
    }
}

/// Take `resolution` for `name` if the field is still empty.
fn fill(result: &mut ExtractionResult, name: &str, doc_type: &str, resolution: &FieldResolution) {
    let Some(value) = &resolution.value else {
        return;
    };
    if result.get(name).is_some() {
        return;
    }

    debug!("{} <- {} ({})", name, value, doc_type);
    result.values.insert(name.to_string(), Some(value.clone()));
    result.sources.insert(name.to_string(), doc_type.to_string());
    result
        .requires_confirmation
        .extend(resolution.confirmations.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::observer::TracingObserver;
    use crate::models::extraction::{ConfirmationReason, FieldValue};
    use crate::pdf::{PdfContent, PdfPage};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::path::PathBuf;
    use std::str::FromStr;

    const FIELDS: &str = r#"
fields:
  project_name:
    label: 项目名称
    data_type: text
    source:
      pdf_type: procurement_notice
      extraction: {method: horizontal_keyvalue, key: 项目名称}
    fallback_source:
      pdf_type: winning_notice
      extraction: {method: horizontal_keyvalue, key: 项目名称}
  control_price:
    label: 最高限价
    data_type: amount
    source:
      pdf_type: procurement_notice
      extraction: {method: amount, key: 最高限价}
    fallback_source:
      pdf_type: control_price_approval
      extraction: {method: amount, key: 审定控制价}
  winning_amount:
    label: 中标金额
    data_type: amount
    source:
      pdf_type: winning_notice
      extraction: {method: amount, key: 中标金额}
  bid_bond:
    label: 投标保证金
    data_type: amount
    source:
      pdf_type: procurement_notice
      extraction: {method: amount, key: 投标保证金}
  contract_amount:
    label: 合同金额
    data_type: amount
    source:
      pdf_type: contract
      extraction: {method: amount, key: 合同金额}
  archive_number:
    label: 档案号
    data_type: text
    source: {manual: true}
"#;

    const PATTERNS: &str = r#"
document_types:
  procurement_notice:
    content_markers: [采购公告]
  control_price_approval:
    content_markers: [控制价]
  winning_notice:
    content_markers: [中标]
  contract:
    content_markers: [合同]
"#;

    fn doc(name: &str, text: &str) -> PdfContent {
        PdfContent::from_pages(name, vec![PdfPage::from_text(1, text)])
    }

    fn merge_with(config: MergeConfig, documents: &BTreeMap<String, PdfContent>) -> ExtractionResult {
        let store = ConfigStore::from_strings(FIELDS, PATTERNS);
        let cells = CellConfig::default();
        let observer = TracingObserver;
        Merger::new(&store, &cells, &config, &observer)
            .merge(documents)
            .unwrap()
    }

    fn documents(pairs: &[(&str, PdfContent)]) -> BTreeMap<String, PdfContent> {
        pairs
            .iter()
            .map(|(t, d)| (t.to_string(), d.clone()))
            .collect()
    }

    #[test]
    fn test_control_price_falls_back_to_approval() {
        let docs = documents(&[
            ("procurement_notice", doc("doc_a.pdf", "项目名称：道路改造工程\n")),
            (
                "control_price_approval",
                doc("doc_b.pdf", "审定控制价：￥980,000.00元\n"),
            ),
        ]);

        let result = merge_with(MergeConfig::default(), &docs);

        assert_eq!(
            result.get("control_price"),
            Some(&FieldValue::Amount(Decimal::from_str("980000.00").unwrap()))
        );
        assert_eq!(result.source_of("control_price"), Some("control_price_approval"));
        assert!(result.requires_confirmation.iter().any(|c| {
            c.field == "control_price" && c.reason == ConfirmationReason::Fallback
        }));
    }

    #[test]
    fn test_primary_value_beats_fallback_document() {
        let docs = documents(&[
            ("procurement_notice", doc("doc_a.pdf", "最高限价：1,000,000.00元\n")),
            (
                "control_price_approval",
                doc("doc_b.pdf", "审定控制价：￥980,000.00元\n"),
            ),
        ]);

        let result = merge_with(MergeConfig::default(), &docs);
        assert_eq!(
            result.get("control_price").and_then(FieldValue::as_amount),
            Some(Decimal::from_str("1000000.00").unwrap())
        );
        assert_eq!(result.source_of("control_price"), Some("procurement_notice"));
        assert!(!result.needs_confirmation("control_price"));
    }

    #[test]
    fn test_higher_priority_document_wins() {
        let docs = documents(&[
            ("procurement_notice", doc("notice.pdf", "项目名称：城区道路改造工程\n")),
            ("winning_notice", doc("winning.pdf", "项目名称：城区道路改造工程（二次）\n中标金额：98万元\n")),
        ]);

        let result = merge_with(MergeConfig::default(), &docs);
        assert_eq!(
            result.get("project_name"),
            Some(&FieldValue::Text("城区道路改造工程".to_string()))
        );
        assert_eq!(result.source_of("project_name"), Some("procurement_notice"));
        assert_eq!(result.source_of("winning_amount"), Some("winning_notice"));
    }

    #[test]
    fn test_fallback_source_fills_when_primary_is_empty() {
        let docs = documents(&[
            ("procurement_notice", doc("notice.pdf", "采购公告\n")),
            ("winning_notice", doc("winning.pdf", "项目名称：城区道路改造工程\n")),
        ]);

        let result = merge_with(MergeConfig::default(), &docs);
        assert_eq!(result.source_of("project_name"), Some("winning_notice"));
        assert!(result.needs_confirmation("project_name"));
    }

    #[test]
    fn test_result_shape() {
        let docs = documents(&[("procurement_notice", doc("notice.pdf", "采购公告\n"))]);
        let result = merge_with(MergeConfig::default(), &docs);

        let mut keys: Vec<_> = result.values.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["bid_bond", "contract_amount", "control_price", "project_name", "winning_amount"]
        );
        assert_eq!(result.filled(), 0);
    }

    #[test]
    fn test_secondary_fallback_and_exclusions() {
        let mut config = MergeConfig::default();
        config
            .secondary_fallbacks
            .insert("bid_bond".to_string(), "contract".to_string());
        config.excluded_fields.push("winning_amount".to_string());

        let docs = documents(&[
            ("procurement_notice", doc("notice.pdf", "采购公告\n")),
            ("winning_notice", doc("winning.pdf", "中标金额：98万元\n")),
            ("contract", doc("contract.pdf", "合同金额：980000元\n投标保证金：2万元\n")),
        ]);

        let result = merge_with(config, &docs);
        assert_eq!(
            result.get("bid_bond").and_then(FieldValue::as_amount),
            Some(Decimal::from(20000))
        );
        assert_eq!(result.source_of("bid_bond"), Some("contract"));
        assert!(result.needs_confirmation("bid_bond"));
        assert!(!result.values.contains_key("winning_amount"));
    }

    #[test]
    fn test_unlisted_types_follow_priority_types() {
        let store = ConfigStore::from_strings(FIELDS, PATTERNS);
        let cells = CellConfig::default();
        let merge = MergeConfig::default();
        let observer = TracingObserver;
        let merger = Merger::new(&store, &cells, &merge, &observer);

        let docs = documents(&[
            ("acceptance_report", doc("a.pdf", "")),
            ("contract", doc("c.pdf", "")),
            ("procurement_notice", doc("n.pdf", "")),
            ("audit_report", doc("b.pdf", "")),
        ]);
        assert_eq!(
            merger.processing_order(&docs),
            vec!["procurement_notice", "contract", "acceptance_report", "audit_report"]
        );
    }

    #[test]
    fn test_unreadable_document_does_not_abort() {
        let store = ConfigStore::from_strings(FIELDS, PATTERNS);
        let cells = CellConfig::default();
        let merge = MergeConfig::default();
        let observer = TracingObserver;

        let mut docs = BTreeMap::new();
        docs.insert("procurement_notice".to_string(), PathBuf::from("/nonexistent/notice.pdf"));

        let result = Merger::new(&store, &cells, &merge, &observer)
            .merge(&docs)
            .unwrap();
        assert_eq!(result.failed_documents.len(), 1);
        assert_eq!(result.failed_documents[0].document_type, "procurement_notice");
        assert_eq!(result.filled(), 0);
    }

    #[test]
    fn test_invalid_config_aborts_before_reading() {
        let store = ConfigStore::from_strings("fields: {}", PATTERNS);
        let cells = CellConfig::default();
        let merge = MergeConfig::default();
        let observer = TracingObserver;

        let docs: BTreeMap<String, PdfContent> = BTreeMap::new();
        let err = Merger::new(&store, &cells, &merge, &observer)
            .merge(&docs)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }
}
