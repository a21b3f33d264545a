//! Extraction API.
//!
//! [`Engine`] ties the configuration store, the classifier and the merger
//! together behind the three calls a caller needs: `detect`, `extract` and
//! `extract_all_from_pdfs`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classify::{BatchDetection, Detection, DocumentClassifier, UNKNOWN_TYPE};
use crate::config::ConfigStore;
use crate::error::{ConfigError, Result};
use crate::extract::{DocumentExtraction, DocumentExtractor, ExtractionObserver, Merger, TracingObserver};
use crate::models::config::EngineConfig;
use crate::models::extraction::{DocumentFailure, ExtractionResult};
use crate::models::field::FieldConfig;
use crate::pdf::{DocumentSource, PdfContent};

/// Field extraction engine for procurement documents.
pub struct Engine {
    config: EngineConfig,
    store: ConfigStore,
    observer: Arc<dyn ExtractionObserver>,
}

impl Engine {
    /// Engine reading its configuration documents from `config.paths`.
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder::new().config(config).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Drop cached configuration; the next call reads it again.
    pub fn reload(&mut self) {
        self.store.reload();
    }

    /// Load and validate both configuration documents.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.store.validate()
    }

    pub fn classifier(&self) -> std::result::Result<DocumentClassifier<'_>, ConfigError> {
        Ok(DocumentClassifier::new(self.store.load_document_patterns()?))
    }

    /// Classify one document.
    pub fn detect<S: DocumentSource + ?Sized>(&self, source: &S) -> Result<Detection> {
        Ok(self.classifier()?.detect_source(source)?)
    }

    /// Classify documents independently and group them by type.
    pub fn detect_batch<S: DocumentSource>(&self, sources: &[S]) -> Result<BatchDetection> {
        Ok(self.classifier()?.detect_batch(sources))
    }

    /// Extract the fields of `doc_type` from one document.
    ///
    /// Fields that cannot be resolved are null; excluded fields are dropped.
    pub fn extract<S: DocumentSource + ?Sized>(
        &self,
        source: &S,
        doc_type: &str,
    ) -> Result<ExtractionResult> {
        let mapping = self.store.load_field_mapping()?;
        let fields = self.store.fields_for_document_type(doc_type)?;
        if fields.is_empty() {
            warn!("No fields are configured for document type '{}'", doc_type);
        }

        let content = source.open()?;
        let extraction = self.extract_content(&content, doc_type, &mapping.global_aliases, &fields);

        let mut result = ExtractionResult::default();
        for (name, resolution) in extraction.fields {
            if self.config.merge.excluded_fields.contains(&name) {
                continue;
            }
            if resolution.value.is_some() {
                result.sources.insert(name.clone(), doc_type.to_string());
            }
            result.requires_confirmation.extend(resolution.confirmations);
            result.values.insert(name, resolution.value);
        }

        info!(
            "Extracted {}/{} fields from {} as {}",
            result.filled(),
            result.values.len(),
            source.name(),
            doc_type
        );
        Ok(result)
    }

    fn extract_content(
        &self,
        content: &PdfContent,
        doc_type: &str,
        global_aliases: &BTreeMap<String, String>,
        fields: &BTreeMap<String, FieldConfig>,
    ) -> DocumentExtraction {
        DocumentExtractor::new(
            content,
            doc_type,
            &self.config.cells,
            global_aliases,
            self.observer.as_ref(),
        )
        .extract_fields(fields)
    }

    /// Extract every document and merge the values in priority order.
    ///
    /// Only invalid configuration is an error. Unreadable documents are listed
    /// in the result's `failed_documents`.
    pub fn extract_all_from_pdfs<S: DocumentSource>(
        &self,
        documents: &BTreeMap<String, S>,
    ) -> Result<ExtractionResult> {
        let merger = Merger::new(
            &self.store,
            &self.config.cells,
            &self.config.merge,
            self.observer.as_ref(),
        );
        Ok(merger.merge(documents)?)
    }

    /// Classify untagged documents, then merge them.
    ///
    /// When several documents share a type the most confident one is used.
    /// Unknown documents are skipped.
    pub fn extract_detected<S: DocumentSource>(&self, sources: &[S]) -> Result<ExtractionResult> {
        let classifier = self.classifier()?;
        let mut chosen: BTreeMap<String, (&S, f32)> = BTreeMap::new();
        let mut failed = Vec::new();

        for source in sources {
            let detection = match classifier.detect_source(source) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Cannot classify {}: {}", source.name(), e);
                    failed.push((source.name(), e.to_string()));
                    continue;
                }
            };
            if detection.is_unknown() {
                debug!("Skipping {}: unknown document type", source.name());
                continue;
            }

            let replace = chosen
                .get(&detection.document_type)
                .is_none_or(|(_, best)| detection.confidence > *best);
            if replace {
                chosen.insert(detection.document_type, (source, detection.confidence));
            }
        }

        let documents: BTreeMap<String, &S> = chosen
            .into_iter()
            .map(|(doc_type, (source, _))| (doc_type, source))
            .collect();
        let mut result = self.extract_all_from_pdfs(&documents)?;
        result
            .failed_documents
            .extend(failed.into_iter().map(|(document, error)| DocumentFailure {
                document_type: UNKNOWN_TYPE.to_string(),
                document,
                error,
            }));
        Ok(result)
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    store: Option<ConfigStore>,
    observer: Option<Arc<dyn ExtractionObserver>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `store` instead of the documents named in the engine config.
    pub fn store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ExtractionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| ConfigStore::from_config(&config));
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver));
        Engine {
            config,
            store,
            observer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DetectionMethod;
    use crate::error::ProcuraError;
    use crate::extract::{FieldOutcome, RecordingObserver};
    use crate::models::extraction::FieldValue;
    use crate::pdf::PdfPage;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const FIELDS: &str = r#"
fields:
  project_name:
    label: 项目名称
    data_type: text
    source:
      pdf_type: procurement_notice
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
  procurement_method:
    label: 采购方式
    data_type: choice
    choices: [公开招标, 竞争性谈判, 询价]
    aliases: {公开招标方式: 公开招标}
    source:
      pdf_type: procurement_notice
      extraction: {method: horizontal_keyvalue, key: 采购方式}
  winning_bidder:
    label: 中标人
    data_type: text
    source:
      pdf_type: winning_notice
      extraction: {method: horizontal_keyvalue, key: 中标人}
"#;

    const PATTERNS: &str = r#"
document_types:
  procurement_notice:
    filename_patterns: [采购公告]
    content_markers: [采购公告, 最高限价]
    confidence_threshold: 0.5
  control_price_approval:
    filename_patterns: [控制价]
    content_markers: [审定控制价]
    confidence_threshold: 0.5
  winning_notice:
    filename_patterns: [中标公告]
    content_markers: [中标人, 中标金额]
    confidence_threshold: 0.5
"#;

    fn engine() -> Engine {
        Engine::builder()
            .store(ConfigStore::from_strings(FIELDS, PATTERNS))
            .build()
    }

    fn doc(name: &str, text: &str) -> PdfContent {
        PdfContent::from_pages(name, vec![PdfPage::from_text(1, text)])
    }

    #[test]
    fn test_detect() {
        let engine = engine();
        let d = engine.detect(&doc("scan.pdf", "中标人：某建设公司\n")).unwrap();
        assert_eq!(d.document_type, "winning_notice");
        assert_eq!(d.method, DetectionMethod::Content);
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn test_extract_single_document() {
        let engine = engine();
        let notice = doc(
            "notice.pdf",
            "采购公告\n项目名称：城区道路改造工程\n采购方式：公开招标方式\n最高限价：1,200,000.00元\n",
        );

        let result = engine.extract(&notice, "procurement_notice").unwrap();
        assert_eq!(
            result.get("project_name"),
            Some(&FieldValue::Text("城区道路改造工程".to_string()))
        );
        assert_eq!(
            result.get("procurement_method"),
            Some(&FieldValue::Text("公开招标".to_string()))
        );
        assert!(result.needs_confirmation("procurement_method"));
        assert_eq!(result.source_of("control_price"), Some("procurement_notice"));
        assert!(!result.values.contains_key("winning_bidder"));
    }

    #[test]
    fn test_extract_respects_exclusions() {
        let mut config = EngineConfig::default();
        config.merge.excluded_fields.push("control_price".to_string());
        let engine = Engine::builder()
            .config(config)
            .store(ConfigStore::from_strings(FIELDS, PATTERNS))
            .build();

        let result = engine
            .extract(&doc("n.pdf", "最高限价：100元\n"), "procurement_notice")
            .unwrap();
        assert!(!result.values.contains_key("control_price"));
    }

    #[test]
    fn test_extract_unreadable_document_is_pdf_error() {
        let engine = engine();
        let err = engine
            .extract(&PathBuf::from("/nonexistent/notice.pdf"), "procurement_notice")
            .unwrap_err();
        assert!(matches!(err, ProcuraError::Pdf(_)));
    }

    #[test]
    fn test_invalid_configuration_fails_fast() {
        let engine = Engine::builder()
            .store(ConfigStore::from_strings("fields: {}\n", PATTERNS))
            .build();
        assert!(matches!(engine.validate(), Err(ConfigError::Empty { .. })));

        let documents: BTreeMap<String, PdfContent> = BTreeMap::new();
        let err = engine.extract_all_from_pdfs(&documents).unwrap_err();
        assert!(matches!(err, ProcuraError::Config(_)));
    }

    #[test]
    fn test_extract_all_from_pdfs() {
        let engine = engine();
        let mut documents = BTreeMap::new();
        documents.insert(
            "procurement_notice".to_string(),
            doc("doc_a.pdf", "采购公告\n项目名称：城区道路改造工程\n"),
        );
        documents.insert(
            "control_price_approval".to_string(),
            doc("doc_b.pdf", "审定控制价：980,000.00元\n"),
        );

        let result = engine.extract_all_from_pdfs(&documents).unwrap();
        assert_eq!(result.source_of("project_name"), Some("procurement_notice"));
        assert_eq!(result.source_of("control_price"), Some("control_price_approval"));
        assert!(result.needs_confirmation("control_price"));
        assert_eq!(result.get("winning_bidder"), None);
        assert!(result.values.contains_key("winning_bidder"));
    }

    #[test]
    fn test_extract_detected_keeps_most_confident_document() {
        let engine = engine();
        let sources = vec![
            doc("scan1.pdf", "采购公告\n项目名称：一期工程\n"),
            doc("scan2.pdf", "采购公告\n最高限价：500,000元\n项目名称：二期工程\n"),
            doc("scan3.pdf", "会议纪要\n"),
        ];

        let result = engine.extract_detected(&sources).unwrap();
        assert_eq!(
            result.get("project_name"),
            Some(&FieldValue::Text("二期工程".to_string()))
        );
        assert!(result.failed_documents.is_empty());
    }

    #[test]
    fn test_observer_receives_events() {
        let observer = Arc::new(RecordingObserver::new());
        let engine = Engine::builder()
            .store(ConfigStore::from_strings(FIELDS, PATTERNS))
            .observer(observer.clone())
            .build();

        engine
            .extract(&doc("w.pdf", "中标人：某建设公司\n"), "winning_notice")
            .unwrap();
        let events = observer.events_for("winning_bidder");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].outcome, FieldOutcome::Extracted(_)));
    }
}
