//! PDF reading: flattened text, positioned words and detected tables.

mod extractor;
pub mod layout;

pub use extractor::PdfExtractor;
pub use layout::{Table, TextCell};

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Row tolerance used when text and tables are derived from words.
pub const DEFAULT_ROW_TOLERANCE: f32 = 3.0;

/// Trait for PDF processing implementations.
pub trait PdfProcessor {
    /// Load a PDF from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Extract text from the entire PDF.
    fn extract_text(&self) -> Result<String>;

    /// Extract text from a specific page.
    fn extract_page_text(&self, page: u32) -> Result<String>;

    /// Positioned text fragments of a page.
    fn extract_words(&self, page: u32) -> Result<Vec<TextCell>>;

    /// Tables detected on a page.
    fn extract_tables(&self, page: u32) -> Result<Vec<Table>>;
}

/// Content from a single PDF page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PdfPage {
    /// Page number (1-indexed).
    pub number: u32,
    /// Flattened text of this page.
    pub text: String,
    pub words: Vec<TextCell>,
    pub tables: Vec<Table>,
}

impl PdfPage {
    /// Page with text only; no positioned words.
    pub fn from_text(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
            ..Default::default()
        }
    }

    /// Page whose text and tables are derived from its words.
    pub fn from_words(number: u32, words: Vec<TextCell>) -> Self {
        let text = layout::rows_to_text(&words, DEFAULT_ROW_TOLERANCE);
        let tables = layout::detect_tables(&words, DEFAULT_ROW_TOLERANCE);
        Self {
            number,
            text,
            words,
            tables,
        }
    }
}

/// Everything the engine reads from one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PdfContent {
    /// File name the content was read from.
    pub file_name: String,
    /// Flattened text of the whole document.
    pub text: String,
    pub pages: Vec<PdfPage>,
}

impl PdfContent {
    /// Assemble content from pages, joining page texts with blank lines.
    pub fn from_pages(file_name: impl Into<String>, pages: Vec<PdfPage>) -> Self {
        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            file_name: file_name.into(),
            text,
            pages,
        }
    }

    pub fn page(&self, number: u32) -> Option<&PdfPage> {
        self.pages.iter().find(|p| p.number == number)
    }

    /// Positioned words of all pages in page order.
    pub fn words(&self) -> impl Iterator<Item = &TextCell> {
        self.pages.iter().flat_map(|p| p.words.iter())
    }
}

/// Something the engine can read a document from.
pub trait DocumentSource {
    /// Name used in logs and failure reports.
    fn name(&self) -> String;

    /// Read and parse the document.
    fn open(&self) -> Result<PdfContent>;
}

impl DocumentSource for Path {
    fn name(&self) -> String {
        self.display().to_string()
    }

    fn open(&self) -> Result<PdfContent> {
        let data = std::fs::read(self).map_err(|source| PdfError::Io {
            path: self.to_path_buf(),
            source,
        })?;

        let mut extractor = PdfExtractor::new();
        extractor.load(&data)?;

        let file_name = self
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        extractor.extract_all(file_name)
    }
}

impl DocumentSource for PathBuf {
    fn name(&self) -> String {
        self.as_path().name()
    }

    fn open(&self) -> Result<PdfContent> {
        self.as_path().open()
    }
}

impl DocumentSource for PdfContent {
    fn name(&self) -> String {
        self.file_name.clone()
    }

    fn open(&self) -> Result<PdfContent> {
        Ok(self.clone())
    }
}

impl<T: DocumentSource + ?Sized> DocumentSource for &T {
    fn name(&self) -> String {
        (**self).name()
    }

    fn open(&self) -> Result<PdfContent> {
        (**self).open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pages_joins_text() {
        let content = PdfContent::from_pages(
            "notice.pdf",
            vec![PdfPage::from_text(1, "第一页"), PdfPage::from_text(2, "第二页")],
        );
        assert_eq!(content.text, "第一页\n\n第二页");
        assert_eq!(content.page(2).map(|p| p.text.as_str()), Some("第二页"));
        assert_eq!(content.name(), "notice.pdf");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Path::new("/nonexistent/notice.pdf").open().unwrap_err();
        assert!(matches!(err, PdfError::Io { .. }));
    }

    #[test]
    fn test_page_from_words() {
        let page = PdfPage::from_words(
            1,
            vec![
                TextCell::new("项目名称", 10.0, 10.0, 50.0, 20.0, 1),
                TextCell::new("道路改造工程", 60.0, 11.0, 130.0, 21.0, 1),
            ],
        );
        assert_eq!(page.text, "项目名称 道路改造工程");
        assert!(page.tables.is_empty());
    }
}
