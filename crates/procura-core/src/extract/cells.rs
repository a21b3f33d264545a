//! Spatial key/value resolution over positioned text cells.
//!
//! A [`CellIndex`] is built from one document's words and dropped when that
//! document is done. It never outlives the document it was built from.

use std::collections::BTreeMap;

use tracing::trace;

use crate::models::config::CellConfig;
use crate::models::field::Direction;
use crate::pdf::layout::group_rows;
use crate::pdf::{PdfContent, TextCell};

/// Characters accepted between a key and an inline value in the same cell.
const INLINE_DELIMITERS: [char; 2] = [':', '：'];

/// Per-document spatial index of text cells.
#[derive(Debug, Clone)]
pub struct CellIndex {
    /// Cells in reading order: page, then row, then left to right.
    cells: Vec<TextCell>,
    /// Page number to indices into `cells`.
    by_page: BTreeMap<u32, Vec<usize>>,
    tolerance_x: f32,
    tolerance_y: f32,
    max_distance: f32,
}

impl CellIndex {
    /// Index the positioned words of `doc`.
    pub fn build(doc: &PdfContent, config: &CellConfig) -> Self {
        Self::from_cells(doc.words().cloned().collect(), config)
    }

    pub fn from_cells(cells: Vec<TextCell>, config: &CellConfig) -> Self {
        let ordered: Vec<TextCell> = group_rows(&cells, config.tolerance_y)
            .into_iter()
            .flatten()
            .map(|i| cells[i].clone())
            .collect();

        let mut by_page: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (i, cell) in ordered.iter().enumerate() {
            by_page.entry(cell.page).or_default().push(i);
        }

        trace!("Indexed {} cells over {} pages", ordered.len(), by_page.len());
        Self {
            cells: ordered,
            by_page,
            tolerance_x: config.tolerance_x,
            tolerance_y: config.tolerance_y,
            max_distance: config.max_distance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Cells in reading order.
    pub fn cells(&self) -> &[TextCell] {
        &self.cells
    }

    /// Cells of one page, in reading order.
    pub fn page_cells(&self, page: u32) -> impl Iterator<Item = &TextCell> {
        self.by_page
            .get(&page)
            .into_iter()
            .flatten()
            .map(|&i| &self.cells[i])
    }

    /// First cell, in reading order, whose text is `key`.
    ///
    /// A trailing colon on the cell is ignored. With `fuzzy`, a cell that
    /// contains `key` or is contained in it also matches; an exact match
    /// anywhere still beats a fuzzy one.
    pub fn find_cell_by_text(&self, key: &str, fuzzy: bool) -> Option<&TextCell> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }

        let exact = self
            .cells
            .iter()
            .find(|c| c.text.trim().trim_end_matches(INLINE_DELIMITERS).trim() == key);
        if exact.is_some() || !fuzzy {
            return exact;
        }

        self.cells.iter().find(|c| {
            let text = c.text.trim().trim_end_matches(INLINE_DELIMITERS).trim();
            !text.is_empty() && (text.contains(key) || key.contains(text))
        })
    }

    /// Nearest cell to the right of `anchor` on the same visual row.
    ///
    /// Candidates start right of the anchor's right edge and have a centre
    /// within `2 * tolerance_y` of the anchor's. The smallest horizontal gap
    /// wins, the earliest cell on ties; gaps above `max_distance` are rejected.
    pub fn find_right_cell(&self, anchor: &TextCell, max_distance: f32) -> Option<&TextCell> {
        let band = 2.0 * self.tolerance_y;
        self.nearest(anchor, max_distance, |c| {
            (c.x0 > anchor.x1 && (c.center_y() - anchor.center_y()).abs() <= band)
                .then(|| c.x0 - anchor.x1)
        })
    }

    /// Nearest cell below `anchor` in the same visual column.
    pub fn find_below_cell(&self, anchor: &TextCell, max_distance: f32) -> Option<&TextCell> {
        let band = 2.0 * self.tolerance_x;
        self.nearest(anchor, max_distance, |c| {
            (c.y0 > anchor.y1 && (c.center_x() - anchor.center_x()).abs() <= band)
                .then(|| c.y0 - anchor.y1)
        })
    }

    fn nearest<F>(&self, anchor: &TextCell, max_distance: f32, gap: F) -> Option<&TextCell>
    where
        F: Fn(&TextCell) -> Option<f32>,
    {
        let mut best: Option<(f32, &TextCell)> = None;
        for cell in self.page_cells(anchor.page) {
            if cell.text.trim().is_empty() {
                continue;
            }
            let Some(distance) = gap(cell) else {
                continue;
            };
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, cell));
            }
        }

        best.filter(|(d, _)| *d <= max_distance).map(|(_, c)| c)
    }

    /// Resolve the value paired with `key`.
    ///
    /// A key cell that carries the value itself ("项目名称：XXX") yields that
    /// remainder. Otherwise the neighbour in `direction` is used; `Auto`
    /// tries right, then below.
    pub fn extract_keyvalue_pair(
        &self,
        key: &str,
        direction: Direction,
        fuzzy: bool,
        max_distance: Option<f32>,
    ) -> Option<String> {
        let anchor = self.find_cell_by_text(key, fuzzy)?;
        if let Some(value) = inline_value(&anchor.text, key) {
            trace!("Inline value for '{}': {}", key, value);
            return Some(value);
        }

        let max_distance = max_distance.unwrap_or(self.max_distance);
        let neighbour = match direction {
            Direction::Right => self.find_right_cell(anchor, max_distance),
            Direction::Below => self.find_below_cell(anchor, max_distance),
            Direction::Auto => self
                .find_right_cell(anchor, max_distance)
                .or_else(|| self.find_below_cell(anchor, max_distance)),
        }?;

        trace!(
            "Key '{}' on page {} paired with '{}'",
            key,
            anchor.page,
            neighbour.text
        );
        let value = neighbour.text.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// Text after `key` and a delimiter inside the key cell itself.
fn inline_value(cell_text: &str, key: &str) -> Option<String> {
    let start = cell_text.find(key.trim())? + key.trim().len();
    let rest = cell_text[start..].trim_start();
    let rest = rest.strip_prefix(INLINE_DELIMITERS)?.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}
