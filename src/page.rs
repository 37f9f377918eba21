//! Page capacity tracking and header replay.

use tracing::debug;

use crate::error::{ReportError, Result};
use crate::sink::{SheetRow, Sink};

/// Most rows a single xlsx worksheet holds.
pub const SHEET_ROW_LIMIT: u32 = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    /// Index of the next row to write on the current page.
    pub current_row: u32,
    pub max_rows: u32,
    /// 1-based page number.
    pub page: usize,
    /// Rows written on this page after the header and replayed banners.
    fresh_rows: u32,
}

/// Splits output across pages so that no page exceeds `max_rows`, and every
/// page starts with the same header rows.
pub struct PageManager {
    sheet_name: String,
    header: Vec<SheetRow>,
    state: PageState,
}

impl PageManager {
    /// `body_rows` is the most a page must hold below the header: the banners
    /// of every open group plus the tallest block written under them.
    pub fn new(sheet_name: &str, max_rows: u32, header: Vec<SheetRow>, body_rows: u32) -> Result<Self> {
        if max_rows > SHEET_ROW_LIMIT {
            return Err(ReportError::Layout(format!(
                "max rows per page {max_rows} exceeds the sheet limit {SHEET_ROW_LIMIT}"
            )));
        }
        let needed = header.len() as u32 + body_rows.max(1);
        if needed > max_rows {
            return Err(ReportError::Layout(format!(
                "max rows per page {max_rows} is below the {needed} rows a page needs \
                 ({}-row header, {} body rows)",
                header.len(),
                body_rows.max(1)
            )));
        }
        Ok(Self {
            sheet_name: sheet_name.to_string(),
            header,
            state: PageState {
                current_row: 0,
                max_rows,
                page: 0,
                fresh_rows: 0,
            },
        })
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn header_height(&self) -> u32 {
        self.header.len() as u32
    }

    pub fn pages(&self) -> usize {
        self.state.page
    }

    fn page_name(&self, page: usize) -> String {
        if page <= 1 {
            self.sheet_name.clone()
        } else {
            format!("{} ({page})", self.sheet_name)
        }
    }

    fn start_page(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let page = self.state.page + 1;
        sink.start_new_page(&self.page_name(page))?;
        for row in &self.header {
            sink.write_header_row(row)?;
        }
        self.state.page = page;
        self.state.current_row = self.header_height();
        self.state.fresh_rows = 0;
        Ok(())
    }

    /// Start the first page.
    pub fn open(&mut self, sink: &mut dyn Sink) -> Result<()> {
        if self.state.page == 0 {
            self.start_page(sink)?;
        }
        Ok(())
    }

    /// Write `rows` as one unit on a single page. When they would not fit, a
    /// new page is started first, the header is replayed and `carry` (banners
    /// of groups still open) is rewritten beneath it. Returns whether a page
    /// break happened. A block that cannot fit even on a fresh page is a
    /// layout error.
    pub fn write_block(
        &mut self,
        sink: &mut dyn Sink,
        rows: &[SheetRow],
        carry: &[SheetRow],
    ) -> Result<bool> {
        self.open(sink)?;
        let needed = rows.len() as u32;
        if self.state.current_row + needed <= self.state.max_rows {
            self.write_rows(sink, rows)?;
            return Ok(false);
        }

        let fresh_page = self.header_height() + carry.len() as u32 + needed;
        if self.state.fresh_rows == 0 || fresh_page > self.state.max_rows {
            return Err(ReportError::Layout(format!(
                "a {needed}-row block under {} open banner(s) does not fit a {}-row page",
                carry.len(),
                self.state.max_rows
            )));
        }

        debug!(
            page = self.state.page + 1,
            row = self.state.current_row,
            "page break"
        );
        self.start_page(sink)?;
        for row in carry {
            sink.write_data_row(row)?;
            self.state.current_row += 1;
        }
        self.write_rows(sink, rows)?;
        Ok(true)
    }

    fn write_rows(&mut self, sink: &mut dyn Sink, rows: &[SheetRow]) -> Result<()> {
        for row in rows {
            sink.write_data_row(row)?;
            self.state.current_row += 1;
            self.state.fresh_rows += 1;
        }
        Ok(())
    }
}
