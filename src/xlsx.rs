use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::error::{ReportError, Result};
use crate::plan::{ColumnDescriptor, NumericFormat};
use crate::sink::{CellValue, RowKind, SheetRow, Sink, StyleToken};

const SHEET_NAME_MAX: usize = 31;

/// Writes each page to its own worksheet. Nothing touches disk until `close`.
pub struct XlsxSink {
    path: PathBuf,
    workbook: Workbook,
    current: Option<Worksheet>,
    formats: Vec<NumericFormat>,
    widths: Vec<f64>,
    used_names: Vec<String>,
    row: u32,
}

impl XlsxSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            workbook: Workbook::new(),
            current: None,
            formats: Vec::new(),
            widths: Vec::new(),
            used_names: Vec::new(),
            row: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sheet(&mut self) -> Result<&mut Worksheet> {
        self.current
            .as_mut()
            .ok_or_else(|| ReportError::Sink("row written before the first page".into()))
    }

    /// Worksheet names are limited to 31 characters, exclude `[]:*?/\`, and
    /// must be unique within the workbook.
    fn unique_sheet_name(&mut self, name: &str) -> String {
        let clean: String = name
            .chars()
            .map(|c| if "[]:*?/\\".contains(c) { '-' } else { c })
            .collect();
        let base: String = clean.chars().take(SHEET_NAME_MAX).collect();
        let mut candidate = base.clone();
        let mut n = 2;
        while self.used_names.iter().any(|u| u.eq_ignore_ascii_case(&candidate)) {
            let suffix = format!(" ({n})");
            let keep = SHEET_NAME_MAX - suffix.chars().count();
            candidate = format!("{}{suffix}", base.chars().take(keep).collect::<String>());
            n += 1;
        }
        self.used_names.push(candidate.clone());
        candidate
    }

    fn write_row(&mut self, row: &SheetRow) -> Result<()> {
        let r = self.row;
        let formats: Vec<Format> = row
            .cells
            .iter()
            .enumerate()
            .map(|(col, cell)| {
                let column_format = self.formats.get(col).copied().unwrap_or(NumericFormat::Text);
                cell_format(cell.style, column_format, row.kind)
            })
            .collect();
        let sheet = self.sheet()?;
        for (col, (cell, format)) in row.cells.iter().zip(formats.iter()).enumerate() {
            let col = col as u16;
            match &cell.value {
                CellValue::Blank => {
                    if row.kind.is_emphasized() {
                        sheet.write_blank(r, col, format)?;
                    }
                }
                CellValue::Text(s) => {
                    sheet.write_string_with_format(r, col, s, format)?;
                }
                CellValue::Number(v) => {
                    sheet.write_number_with_format(r, col, *v, format)?;
                }
            }
        }
        self.row += 1;
        Ok(())
    }
}

fn number_pattern(format: NumericFormat) -> Option<&'static str> {
    match format {
        NumericFormat::Text => None,
        NumericFormat::Integer => Some("#,##0"),
        NumericFormat::Decimal => Some("#,##0.00"),
        NumericFormat::Money => Some("$#,##0.00"),
        NumericFormat::Percent => Some("0.00%"),
        NumericFormat::Rate => Some("0.00\"%\""),
    }
}

fn style_pattern(style: StyleToken) -> Option<&'static str> {
    match style {
        StyleToken::Integer => number_pattern(NumericFormat::Integer),
        StyleToken::Decimal => number_pattern(NumericFormat::Decimal),
        StyleToken::Money => number_pattern(NumericFormat::Money),
        StyleToken::Percent => number_pattern(NumericFormat::Percent),
        StyleToken::Rate => number_pattern(NumericFormat::Rate),
        _ => None,
    }
}

fn cell_format(style: StyleToken, column: NumericFormat, kind: RowKind) -> Format {
    let mut format = Format::new();

    // Highlighted values keep the number format of their column.
    let pattern = match style {
        StyleToken::Highlight => number_pattern(column),
        other => style_pattern(other),
    };
    if let Some(p) = pattern {
        format = format.set_num_format(p).set_align(FormatAlign::Right);
    }

    match style {
        StyleToken::Title => {
            format = format.set_bold().set_font_size(14);
        }
        StyleToken::Header => {
            format = format
                .set_bold()
                .set_text_wrap()
                .set_background_color(Color::RGB(0xD9D9D9))
                .set_border_bottom(FormatBorder::Thin);
        }
        StyleToken::Highlight => {
            format = format
                .set_background_color(Color::RGB(0xFFC7CE))
                .set_font_color(Color::RGB(0x9C0006));
        }
        _ => {}
    }

    match kind {
        RowKind::Banner { level } => {
            format = format.set_bold();
            if level == 0 {
                format = format.set_background_color(Color::RGB(0xDDEBF7));
            }
        }
        RowKind::GroupTotal { .. } | RowKind::GrandTotal => {
            format = format.set_bold().set_border_top(FormatBorder::Thin);
        }
        RowKind::GroupPercent { .. } | RowKind::GrandPercent => {
            format = format.set_italic();
        }
        RowKind::Title | RowKind::Header | RowKind::Detail => {}
    }

    format
}

impl Sink for XlsxSink {
    fn open(&mut self, columns: &[ColumnDescriptor]) -> Result<()> {
        self.formats = columns.iter().map(|c| c.format).collect();
        self.widths = columns.iter().map(|c| c.width).collect();
        Ok(())
    }

    fn start_new_page(&mut self, name: &str) -> Result<()> {
        if let Some(done) = self.current.take() {
            self.workbook.push_worksheet(done);
        }
        let name = self.unique_sheet_name(name);
        let mut sheet = Worksheet::new();
        sheet.set_name(&name)?;
        for (col, width) in self.widths.iter().enumerate() {
            sheet.set_column_width(col as u16, *width)?;
        }
        self.current = Some(sheet);
        self.row = 0;
        Ok(())
    }

    fn write_header_row(&mut self, row: &SheetRow) -> Result<()> {
        self.write_row(row)
    }

    fn write_data_row(&mut self, row: &SheetRow) -> Result<()> {
        self.write_row(row)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(done) = self.current.take() {
            self.workbook.push_worksheet(done);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.workbook.save(&self.path)?;
        Ok(())
    }
}
