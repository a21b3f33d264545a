//! Document type detection from file names and content markers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::field::DocumentTypeConfig;
use crate::pdf::{DocumentSource, PdfContent};

/// Type reported when nothing matches.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Which heuristic produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Filename,
    Content,
    None,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectionMethod::Filename => "filename",
            DetectionMethod::Content => "content",
            DetectionMethod::None => "none",
        };
        f.write_str(s)
    }
}

/// Result of classifying one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub document_type: String,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    pub method: DetectionMethod,
}

impl Detection {
    pub fn unknown() -> Self {
        Self {
            document_type: UNKNOWN_TYPE.to_string(),
            confidence: 0.0,
            method: DetectionMethod::None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.method == DetectionMethod::None
    }
}

/// Detections of a batch, grouped by type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchDetection {
    /// Document type to `(document name, detection)` pairs, in input order.
    pub groups: BTreeMap<String, Vec<(String, Detection)>>,
    /// Documents that could not be read, with the reason.
    pub failures: Vec<(String, String)>,
}

impl BatchDetection {
    /// Number of documents classified (including `unknown`).
    pub fn classified(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Classifies documents against configured document types.
///
/// Types are scanned in declaration order. A type whose filename score
/// reaches its threshold is accepted at once; otherwise the type with the
/// best content score wins, the earlier one on ties.
pub struct DocumentClassifier<'a> {
    types: &'a [DocumentTypeConfig],
}

impl<'a> DocumentClassifier<'a> {
    pub fn new(types: &'a [DocumentTypeConfig]) -> Self {
        Self { types }
    }

    /// Fraction of a type's filename patterns matching `file_name`.
    pub fn filename_score(config: &DocumentTypeConfig, file_name: &str) -> f32 {
        if config.filename_patterns.is_empty() {
            return 0.0;
        }
        let matched = config
            .filename_patterns
            .iter()
            .filter(|p| p.is_match(file_name))
            .count();
        matched as f32 / config.filename_patterns.len() as f32
    }

    /// Fraction of a type's content markers present in `text`.
    pub fn content_score(config: &DocumentTypeConfig, text: &str) -> f32 {
        if config.content_markers.is_empty() {
            return 0.0;
        }
        let matched = config
            .content_markers
            .iter()
            .filter(|m| text.contains(m.as_str()))
            .count();
        matched as f32 / config.content_markers.len() as f32
    }

    /// First type whose filename score reaches its threshold.
    pub fn detect_by_filename(&self, file_name: &str) -> Option<Detection> {
        self.types.iter().find_map(|config| {
            let score = Self::filename_score(config, file_name);
            (score > 0.0 && score >= config.confidence_threshold).then(|| Detection {
                document_type: config.name.clone(),
                confidence: score,
                method: DetectionMethod::Filename,
            })
        })
    }

    /// Best content score over all types.
    pub fn detect_by_content(&self, text: &str) -> Detection {
        let mut best: Option<(&DocumentTypeConfig, f32)> = None;
        for config in self.types {
            let score = Self::content_score(config, text);
            if score > best.map_or(0.0, |(_, s)| s) {
                best = Some((config, score));
            }
        }

        match best {
            Some((config, score)) => Detection {
                document_type: config.name.clone(),
                confidence: score,
                method: DetectionMethod::Content,
            },
            None => Detection::unknown(),
        }
    }

    /// Classify from a file name and the document's flattened text.
    pub fn detect(&self, file_name: &str, text: &str) -> Detection {
        self.detect_by_filename(file_name)
            .unwrap_or_else(|| self.detect_by_content(text))
    }

    pub fn detect_content(&self, doc: &PdfContent) -> Detection {
        self.detect(&doc.file_name, &doc.text)
    }

    /// Classify a document, reading it only when its name is not enough.
    pub fn detect_source<S: DocumentSource + ?Sized>(&self, source: &S) -> crate::pdf::Result<Detection> {
        let name = source.name();
        let file_name = Path::new(&name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(name.clone());

        if let Some(detection) = self.detect_by_filename(&file_name) {
            debug!(
                "{} -> {} by filename ({:.2})",
                name, detection.document_type, detection.confidence
            );
            return Ok(detection);
        }

        let content = source.open()?;
        let detection = self.detect_by_content(&content.text);
        debug!(
            "{} -> {} by {} ({:.2})",
            name, detection.document_type, detection.method, detection.confidence
        );
        Ok(detection)
    }

    /// Classify each document independently and group the results by type.
    pub fn detect_batch<S: DocumentSource>(&self, sources: &[S]) -> BatchDetection {
        let mut batch = BatchDetection::default();
        for source in sources {
            match self.detect_source(source) {
                Ok(detection) => batch
                    .groups
                    .entry(detection.document_type.clone())
                    .or_default()
                    .push((source.name(), detection)),
                Err(e) => {
                    warn!("Cannot classify {}: {}", source.name(), e);
                    batch.failures.push((source.name(), e.to_string()));
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_document_patterns;
    use crate::pdf::PdfPage;
    use pretty_assertions::assert_eq;

    const PATTERNS: &str = r#"
document_types:
  procurement_notice:
    filename_patterns: ["采购公告", "招标公告"]
    content_markers: ["采购公告", "投标截止时间", "采购需求"]
    confidence_threshold: 0.5
  winning_notice:
    filename_patterns: ["中标(结果)?公告", "成交公告"]
    content_markers: ["中标人", "中标金额", "采购需求"]
    confidence_threshold: 0.5
  contract:
    filename_patterns: ["合同"]
    content_markers: ["甲方", "乙方"]
    confidence_threshold: 1.0
"#;

    fn types() -> Vec<DocumentTypeConfig> {
        parse_document_patterns(PATTERNS, "test").unwrap()
    }

    fn doc(name: &str, text: &str) -> PdfContent {
        PdfContent::from_pages(name, vec![PdfPage::from_text(1, text)])
    }

    #[test]
    fn test_detect_by_filename() {
        let types = types();
        let classifier = DocumentClassifier::new(&types);

        let d = classifier.detect("2025-017 中标结果公告.PDF", "");
        assert_eq!(d.document_type, "winning_notice");
        assert_eq!(d.method, DetectionMethod::Filename);
        assert_eq!(d.confidence, 0.5);

        let d = classifier.detect("施工合同.pdf", "");
        assert_eq!(d.document_type, "contract");
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_first_filename_match_wins() {
        let types = types();
        let classifier = DocumentClassifier::new(&types);
        let d = classifier.detect("招标公告及中标公告.pdf", "甲方 乙方");
        assert_eq!(d.document_type, "procurement_notice");
    }

    #[test]
    fn test_detect_by_content() {
        let types = types();
        let classifier = DocumentClassifier::new(&types);

        let d = classifier.detect_content(&doc("scan001.pdf", "中标人：甲公司\n中标金额：98万元"));
        assert_eq!(d.document_type, "winning_notice");
        assert_eq!(d.method, DetectionMethod::Content);
        assert!((d.confidence - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_content_tie_goes_to_earlier_type() {
        let types = types();
        let classifier = DocumentClassifier::new(&types);

        // One marker of three for both notice types
        let d = classifier.detect("scan002.pdf", "一、采购需求");
        assert_eq!(d.document_type, "procurement_notice");
        assert!((d.confidence - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown() {
        let types = types();
        let classifier = DocumentClassifier::new(&types);
        assert_eq!(classifier.detect("scan003.pdf", "会议纪要"), Detection::unknown());
    }

    #[test]
    fn test_detect_batch_groups_by_type() {
        let types = types();
        let classifier = DocumentClassifier::new(&types);
        let docs = vec![
            doc("采购公告.pdf", ""),
            doc("a.pdf", "甲方 乙方"),
            doc("b.pdf", "合同 甲方"),
            doc("c.pdf", "无关内容"),
        ];

        let batch = classifier.detect_batch(&docs);
        assert_eq!(batch.classified(), 4);
        assert_eq!(batch.groups["contract"].len(), 2);
        assert_eq!(batch.groups["procurement_notice"][0].0, "采购公告.pdf");
        assert_eq!(batch.groups[UNKNOWN_TYPE].len(), 1);
        assert!(batch.failures.is_empty());
    }

    #[test]
    fn test_detect_batch_reports_unreadable_files() {
        let types = types();
        let classifier = DocumentClassifier::new(&types);
        let paths = vec![std::path::PathBuf::from("/nonexistent/scan.pdf")];

        let batch = classifier.detect_batch(&paths);
        assert_eq!(batch.classified(), 0);
        assert_eq!(batch.failures.len(), 1);
    }
}
