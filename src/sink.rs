use colored::Colorize;
use comfy_table::{Cell as TableCell, Table};

use crate::error::Result;
use crate::fmt::{count, money, percent, rate};
use crate::plan::{ColumnDescriptor, NumericFormat};

// ---------------------------------------------------------------------------
// Cells and rows
// ---------------------------------------------------------------------------

/// Named style a sink resolves into its own formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleToken {
    Text,
    Title,
    Header,
    Banner,
    Integer,
    Decimal,
    Money,
    /// Fraction rendered as a percentage (0.75 → 75%).
    Percent,
    /// Value already in percentage points (75.0 → 75%).
    Rate,
    Highlight,
}

impl StyleToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleToken::Text => "text",
            StyleToken::Title => "title",
            StyleToken::Header => "header",
            StyleToken::Banner => "banner",
            StyleToken::Integer => "integer",
            StyleToken::Decimal => "decimal",
            StyleToken::Money => "money",
            StyleToken::Percent => "percent",
            StyleToken::Rate => "rate",
            StyleToken::Highlight => "highlight",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: StyleToken,
}

impl Cell {
    pub fn text(s: impl Into<String>, style: StyleToken) -> Self {
        Self {
            value: CellValue::Text(s.into()),
            style,
        }
    }

    pub fn number(v: f64, style: StyleToken) -> Self {
        Self {
            value: CellValue::Number(v),
            style,
        }
    }

    pub fn blank() -> Self {
        Self {
            value: CellValue::Blank,
            style: StyleToken::Text,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.value {
            CellValue::Number(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Title,
    Header,
    Banner { level: usize },
    Detail,
    GroupTotal { level: usize },
    GroupPercent { level: usize },
    GrandTotal,
    GrandPercent,
}

impl RowKind {
    pub fn is_emphasized(&self) -> bool {
        !matches!(self, RowKind::Detail)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub kind: RowKind,
    pub cells: Vec<Cell>,
}

impl SheetRow {
    pub fn new(kind: RowKind, cells: Vec<Cell>) -> Self {
        Self { kind, cells }
    }

    pub fn cell(&self, col: usize) -> Option<&Cell> {
        self.cells.get(col)
    }
}

// ---------------------------------------------------------------------------
// Sink contract
// ---------------------------------------------------------------------------

/// Physical output for a report. Calls arrive in order: `open`, then
/// `start_new_page` before any row, rows, and finally `close`.
/// A sink must not persist anything unless `close` is reached.
pub trait Sink {
    fn open(&mut self, columns: &[ColumnDescriptor]) -> Result<()>;
    fn start_new_page(&mut self, name: &str) -> Result<()>;
    fn write_header_row(&mut self, row: &SheetRow) -> Result<()>;
    fn write_data_row(&mut self, row: &SheetRow) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Open(usize),
    StartPage(String),
    Header(SheetRow),
    Data(SheetRow),
    Close,
}

/// Records every call. Used by tests and by callers that post-process rows.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<SinkEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.events.last(), Some(SinkEvent::Close))
    }

    /// Rows grouped by page, header rows included, in write order.
    pub fn pages(&self) -> Vec<(String, Vec<SheetRow>)> {
        let mut pages: Vec<(String, Vec<SheetRow>)> = Vec::new();
        for event in &self.events {
            match event {
                SinkEvent::StartPage(name) => pages.push((name.clone(), Vec::new())),
                SinkEvent::Header(row) | SinkEvent::Data(row) => {
                    if let Some((_, rows)) = pages.last_mut() {
                        rows.push(row.clone());
                    }
                }
                SinkEvent::Open(_) | SinkEvent::Close => {}
            }
        }
        pages
    }

    pub fn rows_of_kind(&self, kind: RowKind) -> Vec<SheetRow> {
        self.pages()
            .into_iter()
            .flat_map(|(_, rows)| rows)
            .filter(|r| r.kind == kind)
            .collect()
    }
}

impl Sink for MemorySink {
    fn open(&mut self, columns: &[ColumnDescriptor]) -> Result<()> {
        self.events.push(SinkEvent::Open(columns.len()));
        Ok(())
    }

    fn start_new_page(&mut self, name: &str) -> Result<()> {
        self.events.push(SinkEvent::StartPage(name.to_string()));
        Ok(())
    }

    fn write_header_row(&mut self, row: &SheetRow) -> Result<()> {
        self.events.push(SinkEvent::Header(row.clone()));
        Ok(())
    }

    fn write_data_row(&mut self, row: &SheetRow) -> Result<()> {
        self.events.push(SinkEvent::Data(row.clone()));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.events.push(SinkEvent::Close);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TextSink
// ---------------------------------------------------------------------------

struct TextPage {
    name: String,
    titles: Vec<String>,
    table: Table,
}

/// Terminal preview: one comfy-table per page.
#[derive(Default)]
pub struct TextSink {
    formats: Vec<NumericFormat>,
    pages: Vec<TextPage>,
    output: Option<String>,
}

impl TextSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered text, available once the sink is closed.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    fn render_cell(&self, col: usize, cell: &Cell, bold: bool) -> TableCell {
        let text = match &cell.value {
            CellValue::Blank => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(v) => {
                let style = match cell.style {
                    // Highlighted values keep their column's number format.
                    StyleToken::Highlight => self
                        .formats
                        .get(col)
                        .map(NumericFormat::style)
                        .unwrap_or(StyleToken::Decimal),
                    other => other,
                };
                format_number(*v, style)
            }
        };
        if cell.style == StyleToken::Highlight {
            TableCell::new(text.red().bold())
        } else if bold {
            TableCell::new(text.bold())
        } else {
            TableCell::new(text)
        }
    }

    fn current_page(&mut self) -> Result<&mut TextPage> {
        self.pages.last_mut().ok_or_else(|| {
            crate::error::ReportError::Sink("row written before the first page".into())
        })
    }
}

fn format_number(v: f64, style: StyleToken) -> String {
    match style {
        StyleToken::Money => money(v),
        StyleToken::Percent => percent(v),
        StyleToken::Rate => rate(v),
        StyleToken::Integer => count(v),
        _ => format!("{v:.2}"),
    }
}

impl Sink for TextSink {
    fn open(&mut self, columns: &[ColumnDescriptor]) -> Result<()> {
        self.formats = columns.iter().map(|c| c.format).collect();
        Ok(())
    }

    fn start_new_page(&mut self, name: &str) -> Result<()> {
        self.pages.push(TextPage {
            name: name.to_string(),
            titles: Vec::new(),
            table: Table::new(),
        });
        Ok(())
    }

    fn write_header_row(&mut self, row: &SheetRow) -> Result<()> {
        let labels: Vec<String> = row
            .cells
            .iter()
            .map(|c| c.as_text().unwrap_or_default().to_string())
            .collect();
        let page = self.current_page()?;
        match row.kind {
            RowKind::Header => {
                page.table.set_header(labels);
            }
            _ => {
                let line = labels
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("  ");
                page.titles.push(line);
            }
        }
        Ok(())
    }

    fn write_data_row(&mut self, row: &SheetRow) -> Result<()> {
        let bold = row.kind.is_emphasized();
        let cells: Vec<TableCell> = row
            .cells
            .iter()
            .enumerate()
            .map(|(i, c)| self.render_cell(i, c, bold))
            .collect();
        self.current_page()?.table.add_row(cells);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut out = String::new();
        for page in &self.pages {
            out.push_str(&format!("{}\n", page.name.bold()));
            for title in &page.titles {
                out.push_str(title);
                out.push('\n');
            }
            out.push_str(&format!("{}\n\n", page.table));
        }
        self.output = Some(out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ColumnTemplate, FixedProbes, Metric, ReportLayout, SchemaPlanner};

    fn columns() -> Vec<ColumnDescriptor> {
        let mut layout = ReportLayout::new("Fill Rate", "Fill Rate");
        layout.leading = vec![
            ColumnTemplate::text("Item", "item", 20.0),
            ColumnTemplate::metric(
                "Fill %",
                Metric::FillRate { ordered: "ord".into(), shipped: "shp".into() },
                NumericFormat::Rate,
            ),
        ];
        SchemaPlanner::plan(&layout, &FixedProbes::new())
            .unwrap()
            .columns()
            .to_vec()
    }

    #[test]
    fn test_memory_sink_groups_rows_by_page() {
        let mut sink = MemorySink::new();
        sink.open(&columns()).unwrap();
        sink.start_new_page("One").unwrap();
        sink.write_header_row(&SheetRow::new(RowKind::Header, vec![Cell::text("Item", StyleToken::Header)]))
            .unwrap();
        sink.write_data_row(&SheetRow::new(RowKind::Detail, vec![Cell::text("A", StyleToken::Text)]))
            .unwrap();
        sink.start_new_page("Two").unwrap();
        sink.close().unwrap();

        let pages = sink.pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].0, "One");
        assert_eq!(pages[0].1.len(), 2);
        assert!(pages[1].1.is_empty());
        assert!(sink.is_closed());
    }

    #[test]
    fn test_text_sink_renders_pages_after_close() {
        colored::control::set_override(false);
        let mut sink = TextSink::new();
        sink.open(&columns()).unwrap();
        sink.start_new_page("Fill Rate").unwrap();
        sink.write_header_row(&SheetRow::new(
            RowKind::Title,
            vec![Cell::text("Fill Rate Report", StyleToken::Title)],
        ))
        .unwrap();
        sink.write_header_row(&SheetRow::new(
            RowKind::Header,
            vec![Cell::text("Item", StyleToken::Header), Cell::text("Fill %", StyleToken::Header)],
        ))
        .unwrap();
        sink.write_data_row(&SheetRow::new(
            RowKind::Detail,
            vec![Cell::text("Widget", StyleToken::Text), Cell::number(96.5, StyleToken::Highlight)],
        ))
        .unwrap();
        assert!(sink.output().is_none());
        sink.close().unwrap();

        let out = sink.output().unwrap();
        assert!(out.contains("Fill Rate Report"));
        assert!(out.contains("Widget"));
        assert!(out.contains("96.50%"));
    }

    #[test]
    fn test_text_sink_rejects_row_without_page() {
        let mut sink = TextSink::new();
        let row = SheetRow::new(RowKind::Detail, vec![Cell::blank()]);
        assert!(sink.write_data_row(&row).is_err());
    }
}
