pub mod chart;
pub mod pipeline;
pub mod table;

use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Polygon, Rgb,
};
use std::path::PathBuf;

use crate::error::RenderError;
use crate::services::reshape::DocumentTables;
use crate::time::{format_reporting_period, TimeWindow};

use chart::{ChartGeometry, PlotArea};
use table::{format_value, summary_cells, TableLayout};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const LAYER_NAME: &str = "Layer 1";

const TITLE_SIZE: f32 = 22.0;
const BODY_SIZE: f32 = 11.0;
const CHART_TITLE_SIZE: f32 = 12.0;
const TICK_SIZE: f32 = 8.0;
const TABLE_SIZE: f32 = 10.0;

const CHART_WIDTH: f32 = PAGE_WIDTH * 5.0 / 8.0;
const CHART_HEIGHT: f32 = PAGE_HEIGHT * 3.0 / 8.0;
const VALUE_TICKS: usize = 5;

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn black() -> Color {
    rgb(0.0, 0.0, 0.0)
}

fn grey() -> Color {
    rgb(0.5, 0.5, 0.5)
}

fn light_grey() -> Color {
    rgb(0.85, 0.85, 0.85)
}

fn white_smoke() -> Color {
    rgb(0.96, 0.96, 0.96)
}

fn chart_blue() -> Color {
    rgb(0.12, 0.47, 0.71)
}

fn pdf_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(err.to_string())
}

/// Draws onto the current page and starts new pages when content runs off the bottom.
struct Canvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor: f32,
    pages: usize,
}

impl Canvas {
    fn new(title: &str) -> Result<Self, RenderError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), LAYER_NAME);
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn ensure_room(&mut self, height: f32) -> bool {
        if self.cursor - height >= MARGIN {
            return false;
        }
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), LAYER_NAME);
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = PAGE_HEIGHT - MARGIN;
        self.pages += 1;
        true
    }

    fn text(&self, text: &str, size: f32, x: f32, y: f32, bold: bool, color: Color) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.set_fill_color(color);
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn line(&self, points: &[(f32, f32)], color: Color, thickness: f32) {
        self.layer.set_outline_color(color);
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points: points
                .iter()
                .map(|(x, y)| (Point::new(Mm(*x), Mm(*y)), false))
                .collect(),
            is_closed: false,
        });
    }

    fn fill_rect(&self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        self.layer.set_fill_color(color);
        self.layer.add_polygon(Polygon {
            rings: vec![rect_points(x, y, width, height)],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
    }

    fn stroke_rect(&self, x: f32, y: f32, width: f32, height: f32, color: Color, thickness: f32) {
        self.layer.set_outline_color(color);
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points: rect_points(x, y, width, height),
            is_closed: true,
        });
    }

    fn marker(&self, x: f32, y: f32, radius: f32, color: Color) {
        let ring = (0..8)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::FRAC_PI_4;
                (
                    Point::new(Mm(x + radius * angle.cos()), Mm(y + radius * angle.sin())),
                    false,
                )
            })
            .collect();
        self.layer.set_fill_color(color);
        self.layer.add_polygon(Polygon {
            rings: vec![ring],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
    }

    fn finish(self) -> Result<RenderedPdf, RenderError> {
        let pages = self.pages;
        let bytes = self.doc.save_to_bytes().map_err(pdf_error)?;
        Ok(RenderedPdf { bytes, pages })
    }
}

fn rect_points(x: f32, y: f32, width: f32, height: f32) -> Vec<(Point, bool)> {
    [(x, y), (x + width, y), (x + width, y + height), (x, y + height)]
        .into_iter()
        .map(|(px, py)| (Point::new(Mm(px), Mm(py)), false))
        .collect()
}

fn draw_chart(canvas: &mut Canvas, tables: &DocumentTables) -> Result<(), RenderError> {
    canvas.ensure_room(CHART_HEIGHT);
    let frame_x = (PAGE_WIDTH - CHART_WIDTH) / 2.0;
    let frame_top = canvas.cursor;
    let frame_bottom = frame_top - CHART_HEIGHT;

    let area = PlotArea {
        x: frame_x + 18.0,
        y: frame_bottom + 16.0,
        width: CHART_WIDTH - 24.0,
        height: CHART_HEIGHT - 30.0,
    };
    let geometry = ChartGeometry::fit(&tables.trend, area)?;

    canvas.text(
        "Data Trend",
        CHART_TITLE_SIZE,
        frame_x + CHART_WIDTH / 2.0 - 11.0,
        frame_top - 8.0,
        true,
        black(),
    );

    for (y, value) in geometry.value_ticks(VALUE_TICKS) {
        canvas.line(&[(area.x, y), (area.right(), y)], light_grey(), 0.3);
        canvas.text(&format_value(value), TICK_SIZE, frame_x + 1.0, y - 1.0, false, black());
    }
    canvas.line(
        &[(area.x, area.top()), (area.x, area.y), (area.right(), area.y)],
        black(),
        0.8,
    );

    let first = geometry.first_date.format("%Y-%m-%d").to_string();
    let last = geometry.last_date.format("%Y-%m-%d").to_string();
    canvas.text(&first, TICK_SIZE, area.x, area.y - 5.0, false, black());
    if geometry.last_date != geometry.first_date {
        canvas.text(&last, TICK_SIZE, area.right() - 16.0, area.y - 5.0, false, black());
    }
    canvas.text(
        "Date",
        BODY_SIZE,
        area.x + area.width / 2.0 - 4.0,
        frame_bottom + 3.0,
        false,
        black(),
    );
    canvas.text("Value", BODY_SIZE, frame_x, area.top() + 3.0, false, black());

    if geometry.points.len() > 1 {
        canvas.line(&geometry.points, chart_blue(), 1.2);
    }
    for (x, y) in &geometry.points {
        canvas.marker(*x, *y, 0.9, chart_blue());
    }

    canvas.cursor = frame_bottom - 10.0;
    Ok(())
}

fn draw_row(canvas: &Canvas, layout: &TableLayout, left: f32, row: &[String], header: bool) {
    let top = canvas.cursor;
    let bottom = top - layout.row_height;
    if header {
        canvas.fill_rect(left, bottom, layout.width(), layout.row_height, grey());
    }
    let text_y = bottom + (layout.row_height - TABLE_SIZE * 0.3528) / 2.0;
    for (col, cell_x) in layout.column_offsets(left).into_iter().enumerate() {
        let width = layout.column_widths[col];
        canvas.stroke_rect(cell_x, bottom, width, layout.row_height, black(), 1.0);
        if let Some(text) = row.get(col) {
            let x = layout.centered_text_x(col, cell_x, text, TABLE_SIZE);
            let color = if header { white_smoke() } else { black() };
            canvas.text(text, TABLE_SIZE, x, text_y, header, color);
        }
    }
}

fn draw_table(canvas: &mut Canvas, cells: &[Vec<String>]) {
    let Some((header, body)) = cells.split_first() else {
        return;
    };
    let layout = TableLayout::measure(cells, TABLE_SIZE);
    let left = (PAGE_WIDTH - layout.width()) / 2.0;

    canvas.ensure_room(layout.row_height * 2.0);
    draw_row(canvas, &layout, left, header, true);
    canvas.cursor -= layout.row_height;

    for row in body {
        if canvas.ensure_room(layout.row_height) {
            draw_row(canvas, &layout, left, header, true);
            canvas.cursor -= layout.row_height;
        }
        draw_row(canvas, &layout, left, row, false);
        canvas.cursor -= layout.row_height;
    }
}

#[derive(Debug)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// Lays out the report and returns the encoded PDF.
pub fn render_pdf(
    title: &str,
    tables: &DocumentTables,
    window: &TimeWindow,
) -> Result<RenderedPdf, RenderError> {
    if tables.trend.is_empty() {
        return Err(RenderError::EmptyTrend);
    }
    let mut canvas = Canvas::new(title)?;

    canvas.cursor -= 10.0;
    canvas.text(title, TITLE_SIZE, MARGIN, canvas.cursor, true, black());
    canvas.cursor -= 10.0;
    canvas.text(
        &format_reporting_period(window),
        BODY_SIZE,
        MARGIN,
        canvas.cursor,
        false,
        black(),
    );
    canvas.cursor -= 12.0;

    draw_chart(&mut canvas, tables)?;
    draw_table(&mut canvas, &summary_cells(&tables.summary));

    canvas.finish()
}

pub struct ReportRenderer {
    title: String,
    output_path: PathBuf,
}

impl ReportRenderer {
    pub fn new(title: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            title: title.into(),
            output_path: output_path.into(),
        }
    }

    /// Renders the report to the configured output path and returns that path.
    pub fn render(
        &self,
        tables: &DocumentTables,
        window: &TimeWindow,
    ) -> Result<PathBuf, RenderError> {
        let rendered = render_pdf(&self.title, tables, window)?;
        let io_error = |source| RenderError::Io {
            path: self.output_path.clone(),
            source,
        };
        if let Some(parent) = self
            .output_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(&self.output_path, &rendered.bytes).map_err(io_error)?;
        tracing::info!(
            path = %self.output_path.display(),
            pages = rendered.pages,
            summary_rows = tables.summary.len(),
            trend_rows = tables.trend.len(),
            "PDF report written"
        );
        Ok(self.output_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::reshape::{SummaryRow, TrendRow};
    use crate::time::previous_calendar_month;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn window() -> TimeWindow {
        previous_calendar_month(Utc.with_ymd_and_hms(2025, 4, 2, 0, 0, 0).single().expect("now"))
    }

    fn tables(days: i64, summary_rows: usize) -> DocumentTables {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        DocumentTables {
            summary: (0..summary_rows)
                .map(|i| SummaryRow {
                    metric: format!("Metric {i}"),
                    value: i as f64 * 1.5,
                })
                .collect(),
            trend: (0..days)
                .map(|i| TrendRow {
                    date: start + Duration::days(i),
                    value: i as f64,
                })
                .collect(),
        }
    }

    #[test]
    fn renders_a_pdf_to_the_output_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("output/automated_report.pdf");
        let renderer = ReportRenderer::new("Automated Report", &path);

        let written = renderer.render(&tables(10, 3), &window()).expect("render");
        assert_eq!(written, path);
        let bytes = std::fs::read(&path).expect("read");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_tables_spill_onto_more_pages() {
        let short = render_pdf("Report", &tables(5, 3), &window()).expect("short");
        let long = render_pdf("Report", &tables(5, 120), &window()).expect("long");
        assert_eq!(short.pages, 1);
        assert!(long.pages > 1, "pages = {}", long.pages);
        assert!(long.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn empty_trend_is_a_render_error() {
        let err = render_pdf("Report", &tables(0, 3), &window()).unwrap_err();
        assert!(matches!(err, RenderError::EmptyTrend));
    }

    #[test]
    fn unwritable_output_path_is_a_render_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").expect("write");
        let renderer = ReportRenderer::new("Report", blocker.join("report.pdf"));

        let err = renderer.render(&tables(3, 2), &window()).unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }), "{err}");
    }
}
