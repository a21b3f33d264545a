//! PDF text extraction using lopdf and pdf-extract.

use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::layout::{self, Table, TextCell};
use super::{PdfContent, PdfPage, PdfProcessor, Result, DEFAULT_ROW_TOLERANCE};
use crate::error::PdfError;

/// A4 height in points, used when a page has no readable MediaBox.
const DEFAULT_PAGE_HEIGHT: f32 = 842.0;

/// PDF content extractor using lopdf.
pub struct PdfExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
    row_tolerance: f32,
}

impl PdfExtractor {
    /// Create a new PDF extractor.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
            row_tolerance: DEFAULT_ROW_TOLERANCE,
        }
    }

    /// Vertical tolerance used to group words into rows.
    pub fn with_row_tolerance(mut self, tolerance: f32) -> Self {
        self.row_tolerance = tolerance;
        self
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("No document loaded".to_string()))
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.document()?
            .get_pages()
            .get(&page)
            .copied()
            .ok_or(PdfError::InvalidPage(page))
    }

    /// Extract text, words and tables of every page.
    pub fn extract_all(&self, file_name: impl Into<String>) -> Result<PdfContent> {
        let page_count = self.page_count();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        let page_texts = match pdf_extract::extract_text_from_mem_by_pages(&self.raw_data) {
            Ok(texts) if texts.len() == page_count as usize => Some(texts),
            Ok(texts) => {
                debug!(
                    "pdf-extract returned {} pages for a {} page document, using word rows",
                    texts.len(),
                    page_count
                );
                None
            }
            Err(e) => {
                warn!("Flattened text extraction failed, using word rows: {}", e);
                None
            }
        };

        let mut pages = Vec::with_capacity(page_count as usize);
        for number in 1..=page_count {
            let words = self.extract_words(number).unwrap_or_else(|e| {
                debug!("No positioned words on page {}: {}", number, e);
                Vec::new()
            });

            let text = match &page_texts {
                Some(texts) => texts[(number - 1) as usize].trim().to_string(),
                None => layout::rows_to_text(&words, self.row_tolerance),
            };
            let tables = layout::detect_tables(&words, self.row_tolerance);

            trace!(
                "Page {}: {} chars, {} words, {} tables",
                number,
                text.chars().count(),
                words.len(),
                tables.len()
            );
            pages.push(PdfPage {
                number,
                text,
                words,
                tables,
            });
        }

        let content = PdfContent::from_pages(file_name, pages);
        debug!(
            "Extracted {} pages, {} chars from {}",
            page_count,
            content.text.chars().count(),
            content.file_name
        );
        Ok(content)
    }

    fn page_height(&self, doc: &Document, page_id: ObjectId) -> f32 {
        inherited_attribute(doc, page_id, b"MediaBox")
            .and_then(|obj| obj.as_array().ok())
            .and_then(|arr| {
                let y0 = arr.get(1).and_then(number)?;
                let y1 = arr.get(3).and_then(number)?;
                Some((y1 - y0).abs())
            })
            .filter(|h| *h > 0.0)
            .unwrap_or(DEFAULT_PAGE_HEIGHT)
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfProcessor for PdfExtractor {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract reads the decrypted bytes
            let mut decrypted_data = Vec::new();
            doc.save_to(&mut decrypted_data)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            self.raw_data = decrypted_data;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn extract_text(&self) -> Result<String> {
        self.document()?;
        pdf_extract::extract_text_from_mem(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    fn extract_page_text(&self, page: u32) -> Result<String> {
        self.page_id(page)?;
        let texts = pdf_extract::extract_text_from_mem_by_pages(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))?;

        match texts.into_iter().nth((page - 1) as usize) {
            Some(text) => Ok(text),
            None => Ok(layout::rows_to_text(&self.extract_words(page)?, self.row_tolerance)),
        }
    }

    fn extract_words(&self, page: u32) -> Result<Vec<TextCell>> {
        let doc = self.document()?;
        let page_id = self.page_id(page)?;
        let height = self.page_height(doc, page_id);
        page_text_runs(doc, page_id, page, height)
    }

    fn extract_tables(&self, page: u32) -> Result<Vec<Table>> {
        let words = self.extract_words(page)?;
        Ok(layout::detect_tables(&words, self.row_tolerance))
    }
}

/// Look up a page attribute, following `Parent` links for inherited values.
fn inherited_attribute<'a>(doc: &'a Document, node_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let dict = doc.get_object(node_id).ok()?.as_dict().ok()?;
    if let Ok(value) = dict.get(key) {
        return doc.dereference(value).ok().map(|(_, obj)| obj);
    }
    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => inherited_attribute(doc, *parent_id, key),
        _ => None,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Text state tracked while walking a content stream.
struct TextState {
    font: Vec<u8>,
    font_size: f32,
    leading: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
}

impl TextState {
    fn new() -> Self {
        Self {
            font: Vec::new(),
            font_size: 12.0,
            leading: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
        }
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        let m = &mut self.line_matrix;
        m[4] += tx * m[0] + ty * m[2];
        m[5] += tx * m[1] + ty * m[3];
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            self.font_size * 1.2
        };
        self.translate_line(0.0, -leading);
    }

    fn scale_x(&self) -> f32 {
        let s = self.text_matrix[0].abs();
        if s > 0.0 { s } else { 1.0 }
    }

    fn scale_y(&self) -> f32 {
        let s = self.text_matrix[3].abs();
        if s > 0.0 { s } else { 1.0 }
    }
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Walk a page's content stream and collect positioned text runs.
fn page_text_runs(doc: &Document, page_id: ObjectId, page: u32, page_height: f32) -> Result<Vec<TextCell>> {
    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::Parse(e.to_string()))?;
    let content = Content::decode(&content_data).map_err(|e| PdfError::Parse(e.to_string()))?;

    let mut cells = Vec::new();
    let mut state = TextState::new();
    let mut in_text_block = false;

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => {
                in_text_block = true;
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "ET" => in_text_block = false,
            "Tf" if operands.len() >= 2 => {
                if let Ok(name) = operands[0].as_name() {
                    state.font = name.to_vec();
                }
                if let Some(size) = number(&operands[1]) {
                    state.font_size = size;
                }
            }
            "TL" if !operands.is_empty() => {
                state.leading = number(&operands[0]).unwrap_or(0.0);
            }
            "Td" | "TD" if operands.len() >= 2 => {
                let tx = number(&operands[0]).unwrap_or(0.0);
                let ty = number(&operands[1]).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.translate_line(tx, ty);
            }
            "Tm" if operands.len() >= 6 => {
                for (i, operand) in operands.iter().take(6).enumerate() {
                    state.text_matrix[i] = number(operand).unwrap_or(IDENTITY[i]);
                }
                state.line_matrix = state.text_matrix;
            }
            "T*" => state.next_line(),
            "Tj" | "'" | "\"" | "TJ" => {
                if op.operator != "Tj" && op.operator != "TJ" {
                    state.next_line();
                }
                if !in_text_block {
                    continue;
                }
                let text = match op.operator.as_str() {
                    "TJ" => operands.first().and_then(|o| o.as_array().ok()).map(|items| {
                        items
                            .iter()
                            .filter_map(|item| decode_operand(item, doc, &fonts, &state.font))
                            .collect::<String>()
                    }),
                    "\"" => operands
                        .get(2)
                        .and_then(|o| decode_operand(o, doc, &fonts, &state.font)),
                    _ => operands
                        .first()
                        .and_then(|o| decode_operand(o, doc, &fonts, &state.font)),
                };
                if let Some(text) = text {
                    push_run(&mut cells, &mut state, text, page, page_height);
                }
            }
            _ => {}
        }
    }

    trace!("Page {}: {} text runs", page, cells.len());
    Ok(cells)
}

/// Record a text run and advance the text position past it.
fn push_run(cells: &mut Vec<TextCell>, state: &mut TextState, text: String, page: u32, page_height: f32) {
    let size = state.font_size * state.scale_y();
    let width = estimate_width(&text) * state.font_size * state.scale_x();
    let x0 = state.text_matrix[4];
    let baseline = state.text_matrix[5];
    state.text_matrix[4] += width;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }

    let top = page_height - baseline - size;
    cells.push(TextCell::new(trimmed, x0, top, x0 + width, top + size, page));
}

/// Width of a string in ems: full width for CJK, half width otherwise.
fn estimate_width(text: &str) -> f32 {
    text.chars()
        .map(|c| if is_wide(c) { 1.0 } else { 0.5 })
        .sum()
}

fn is_wide(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{115F}'
        | '\u{2E80}'..='\u{A4CF}'
        | '\u{AC00}'..='\u{D7A3}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FE30}'..='\u{FE4F}'
        | '\u{FF00}'..='\u{FF60}'
        | '\u{FFE0}'..='\u{FFE6}')
}

/// Decode a string operand using the current font's encoding.
fn decode_operand(
    obj: &Object,
    doc: &Document,
    fonts: &BTreeMap<Vec<u8>, &Dictionary>,
    font: &[u8],
) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    if let Some(font_dict) = fonts.get(font) {
        if let Ok(encoding) = font_dict.get_font_encoding(doc) {
            if let Ok(text) = Document::decode_text(&encoding, bytes) {
                return Some(text);
            }
        }
    }

    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&utf16));
    }

    // Latin-1
    Some(bytes.iter().map(|&b| b as char).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_extractor_new() {
        let extractor = PdfExtractor::new();
        assert!(extractor.document.is_none());
        assert_eq!(extractor.page_count(), 0);
        assert!(matches!(extractor.extract_words(1), Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut extractor = PdfExtractor::new();
        assert!(matches!(
            extractor.load(b"not a pdf"),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn test_width_estimate() {
        assert_eq!(estimate_width("项目"), 2.0);
        assert_eq!(estimate_width("AB"), 1.0);
        assert_eq!(estimate_width("：1"), 1.5);
    }

    #[test]
    fn test_text_state_translation() {
        let mut state = TextState::new();
        state.font_size = 10.0;
        state.translate_line(72.0, 700.0);
        assert_eq!(state.text_matrix[4], 72.0);
        assert_eq!(state.text_matrix[5], 700.0);

        state.next_line();
        assert_eq!(state.text_matrix[5], 688.0);

        let mut cells = Vec::new();
        push_run(&mut cells, &mut state, "项目名称".to_string(), 1, 842.0);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].x0, 72.0);
        assert_eq!(cells[0].x1, 112.0);
        assert_eq!(cells[0].y0, 144.0);
        assert_eq!(cells[0].y1, 154.0);
    }
}
