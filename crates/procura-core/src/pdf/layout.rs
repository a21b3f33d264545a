//! Positioned text fragments and the row/column heuristics built on them.

use std::cmp::Ordering;

use serde::Serialize;

/// One positioned text fragment on a page.
///
/// Coordinates are in PDF points with the origin at the top-left corner of
/// the page, so `y0 < y1` and `y` grows downwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextCell {
    pub text: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    /// 1-indexed page number.
    pub page: u32,
}

impl TextCell {
    pub fn new(text: impl Into<String>, x0: f32, y0: f32, x1: f32, y1: f32, page: u32) -> Self {
        Self {
            text: text.into(),
            x0,
            y0,
            x1,
            y1,
            page,
        }
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// A detected table as a grid of strings. The first row is the header.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    pub page: u32,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    /// Index of the header column matching `name`.
    ///
    /// Whitespace is ignored; an exact match is preferred over a header that
    /// merely contains `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = squash(name);
        if wanted.is_empty() {
            return None;
        }
        let header: Vec<String> = self.header().iter().map(|h| squash(h)).collect();

        header
            .iter()
            .position(|h| *h == wanted)
            .or_else(|| header.iter().position(|h| h.contains(&wanted)))
    }

    /// Cell at (`row`, `column`) of the data rows, trimmed, or `None` if blank.
    pub fn data_cell(&self, row: usize, column: usize) -> Option<&str> {
        self.data_rows()
            .get(row)
            .and_then(|r| r.get(column))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn by_position(a: &TextCell, b: &TextCell) -> Ordering {
    a.page
        .cmp(&b.page)
        .then(a.y0.partial_cmp(&b.y0).unwrap_or(Ordering::Equal))
        .then(a.x0.partial_cmp(&b.x0).unwrap_or(Ordering::Equal))
}

/// Group cells into visual rows.
///
/// Cells are sorted by page and top edge; a cell joins the current row when it
/// is on the same page and its top edge is within `tolerance_y` of the row's
/// first cell. Each row is sorted left to right. Returned values are indices
/// into `cells`.
pub fn group_rows(cells: &[TextCell], tolerance_y: f32) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..cells.len()).collect();
    order.sort_by(|&a, &b| by_position(&cells[a], &cells[b]));

    let mut rows: Vec<Vec<usize>> = Vec::new();
    for idx in order {
        let cell = &cells[idx];
        match rows.last_mut() {
            Some(row)
                if cells[row[0]].page == cell.page
                    && (cells[row[0]].y0 - cell.y0).abs() <= tolerance_y =>
            {
                row.push(idx);
            }
            _ => rows.push(vec![idx]),
        }
    }

    for row in &mut rows {
        row.sort_by(|&a, &b| {
            cells[a]
                .x0
                .partial_cmp(&cells[b].x0)
                .unwrap_or(Ordering::Equal)
        });
    }
    rows
}

/// Reconstruct page text from positioned cells, one visual row per line.
pub fn rows_to_text(cells: &[TextCell], tolerance_y: f32) -> String {
    group_rows(cells, tolerance_y)
        .iter()
        .map(|row| {
            row.iter()
                .map(|&i| cells[i].text.trim())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Detect simple tables among the cells of one page.
///
/// A table is a maximal run of at least two consecutive rows that each hold
/// two or more cells. The first row of a run is its header; cells of later
/// rows are assigned to the header column whose centre is nearest.
pub fn detect_tables(cells: &[TextCell], tolerance_y: f32) -> Vec<Table> {
    let rows = group_rows(cells, tolerance_y);
    let mut tables = Vec::new();
    let mut run: Vec<&Vec<usize>> = Vec::new();

    let mut flush = |run: &mut Vec<&Vec<usize>>| {
        if run.len() >= 2 {
            tables.push(build_table(cells, run));
        }
        run.clear();
    };

    for row in &rows {
        let continues = run
            .last()
            .is_some_and(|prev| cells[prev[0]].page == cells[row[0]].page);
        if row.len() >= 2 && (run.is_empty() || continues) {
            run.push(row);
        } else {
            flush(&mut run);
            if row.len() >= 2 {
                run.push(row);
            }
        }
    }
    flush(&mut run);

    tables
}

fn build_table(cells: &[TextCell], run: &[&Vec<usize>]) -> Table {
    let header = run[0];
    let centers: Vec<f32> = header.iter().map(|&i| cells[i].center_x()).collect();

    let mut rows = vec![header
        .iter()
        .map(|&i| cells[i].text.trim().to_string())
        .collect::<Vec<_>>()];

    for row in &run[1..] {
        let mut grid = vec![String::new(); centers.len()];
        for &i in row.iter() {
            let cell = &cells[i];
            let column = nearest(&centers, cell.center_x());
            let slot = &mut grid[column];
            if !slot.is_empty() {
                slot.push(' ');
            }
            slot.push_str(cell.text.trim());
        }
        rows.push(grid);
    }

    Table {
        page: cells[header[0]].page,
        rows,
    }
}

fn nearest(centers: &[f32], x: f32) -> usize {
    centers
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - x)
                .abs()
                .partial_cmp(&(*b - x).abs())
                .unwrap_or(Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cell(text: &str, x0: f32, y0: f32) -> TextCell {
        TextCell::new(text, x0, y0, x0 + 40.0, y0 + 10.0, 1)
    }

    #[test]
    fn test_derived_geometry() {
        let c = TextCell::new("金额", 10.0, 20.0, 50.0, 32.0, 1);
        assert_eq!(c.center_x(), 30.0);
        assert_eq!(c.center_y(), 26.0);
        assert_eq!(c.width(), 40.0);
        assert_eq!(c.height(), 12.0);
    }

    #[test]
    fn test_group_rows_tolerates_jitter() {
        let cells = vec![
            cell("B", 100.0, 11.5),
            cell("A", 10.0, 10.0),
            cell("C", 10.0, 30.0),
        ];
        let rows = group_rows(&cells, 3.0);
        assert_eq!(rows, vec![vec![1, 0], vec![2]]);
        assert_eq!(rows_to_text(&cells, 3.0), "A B\nC");
    }

    #[test]
    fn test_detect_tables() {
        let cells = vec![
            cell("评标结果", 10.0, 0.0),
            cell("序号", 10.0, 20.0),
            cell("投标人", 100.0, 20.0),
            cell("报价", 200.0, 20.0),
            cell("1", 12.0, 40.0),
            cell("甲公司", 105.0, 40.0),
            cell("98000", 198.0, 40.0),
            cell("2", 12.0, 60.0),
            cell("乙公司", 102.0, 60.0),
            cell("备注", 10.0, 90.0),
        ];
        let tables = detect_tables(&cells, 3.0);
        assert_eq!(tables.len(), 1);

        let table = &tables[0];
        assert_eq!(table.header(), ["序号", "投标人", "报价"]);
        assert_eq!(table.data_rows().len(), 2);
        assert_eq!(table.column_index("投 标 人"), Some(1));
        assert_eq!(table.data_cell(0, 2), Some("98000"));
        assert_eq!(table.data_cell(1, 2), None);
    }

    #[test]
    fn test_single_row_is_not_a_table() {
        let cells = vec![cell("项目名称", 10.0, 0.0), cell("某工程", 100.0, 0.0)];
        assert!(detect_tables(&cells, 3.0).is_empty());
    }
}
