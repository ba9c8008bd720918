use crate::services::reshape::SummaryRow;

const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph advance as a fraction of the font size.
const HELVETICA_AVG_ADVANCE: f32 = 0.52;
const CELL_PADDING_MM: f32 = 6.0;
const MIN_COLUMN_WIDTH_MM: f32 = 30.0;

pub const SUMMARY_HEADER: [&str; 2] = ["Metric", "Value"];

/// Approximate rendered width of `text` in millimetres.
pub fn approx_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * HELVETICA_AVG_ADVANCE * PT_TO_MM
}

pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

pub fn summary_cells(summary: &[SummaryRow]) -> Vec<Vec<String>> {
    std::iter::once(SUMMARY_HEADER.iter().map(|h| h.to_string()).collect())
        .chain(
            summary
                .iter()
                .map(|row| vec![row.metric.clone(), format_value(row.value)]),
        )
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    pub column_widths: Vec<f32>,
    pub row_height: f32,
}

impl TableLayout {
    /// Sizes each column to its widest cell. `cells[0]` is the header row.
    pub fn measure(cells: &[Vec<String>], font_size: f32) -> Self {
        let columns = cells.iter().map(Vec::len).max().unwrap_or(0);
        let column_widths = (0..columns)
            .map(|col| {
                cells
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(|cell| approx_text_width(cell, font_size) + 2.0 * CELL_PADDING_MM)
                    .fold(MIN_COLUMN_WIDTH_MM, f32::max)
            })
            .collect();
        Self {
            column_widths,
            row_height: font_size * PT_TO_MM * 2.2,
        }
    }

    pub fn width(&self) -> f32 {
        self.column_widths.iter().sum()
    }

    /// Left edge of each column given the table's left edge.
    pub fn column_offsets(&self, left: f32) -> Vec<f32> {
        self.column_widths
            .iter()
            .scan(left, |x, width| {
                let start = *x;
                *x += width;
                Some(start)
            })
            .collect()
    }

    /// X position that centers `text` inside column `col` starting at `cell_x`.
    pub fn centered_text_x(&self, col: usize, cell_x: f32, text: &str, font_size: f32) -> f32 {
        let width = self.column_widths.get(col).copied().unwrap_or(0.0);
        cell_x + ((width - approx_text_width(text, font_size)) / 2.0).max(0.0)
    }
}
