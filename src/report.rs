//! Report orchestration: plan columns, stream rows through the group
//! tracker, emit banners, details and totals through the page manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::group::{GroupEvent, GroupKey, GroupTracker, RunningAggregate};
use crate::metrics::{self, ThresholdTable};
use crate::models::{MeasureSource, Row, Value};
use crate::page::PageManager;
use crate::plan::{CardinalityProbe, ColumnPlan, Field, Metric, ReportLayout, SchemaPlanner};
use crate::sink::{Cell, RowKind, SheetRow, Sink, StyleToken};

/// Cooperative stop signal, checked between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run settings handed to the builder. Nothing here is shared between runs
/// except the cancel flag the caller chooses to clone.
#[derive(Debug, Clone)]
pub struct ReportContext {
    /// Lines written under the title, e.g. the date range.
    pub subtitle: Vec<String>,
    pub max_rows_per_page: u32,
    pub thresholds: ThresholdTable,
    pub grand_total: bool,
    pub cancel: CancelFlag,
}

impl Default for ReportContext {
    fn default() -> Self {
        Self {
            subtitle: Vec::new(),
            max_rows_per_page: 65_536,
            thresholds: ThresholdTable::default(),
            grand_total: true,
            cancel: CancelFlag::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOutcome {
    pub status: ReportStatus,
    pub rows_read: usize,
    pub detail_rows: usize,
    pub rejected_rows: usize,
    pub groups: usize,
    pub pages: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ReportOutcome {
    fn new() -> Self {
        Self {
            status: ReportStatus::Completed,
            rows_read: 0,
            detail_rows: 0,
            rejected_rows: 0,
            groups: 0,
            pages: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != ReportStatus::Failed
    }
}

pub struct ReportBuilder<'a> {
    layout: &'a ReportLayout,
    context: &'a ReportContext,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(layout: &'a ReportLayout, context: &'a ReportContext) -> Self {
        Self { layout, context }
    }

    /// Build one report. Planning, layout and sink failures are returned as
    /// errors; a failing row source, cancellation and data-quality problems
    /// are reported in the outcome instead.
    pub fn run(
        &self,
        probe: &dyn CardinalityProbe,
        rows: &mut dyn Iterator<Item = Result<Row>>,
        sink: &mut dyn Sink,
    ) -> Result<ReportOutcome> {
        let plan = SchemaPlanner::plan(self.layout, probe)?;
        let header = self.header_rows(&plan);
        let pages = PageManager::new(
            &self.layout.sheet_name,
            self.context.max_rows_per_page,
            header,
            self.body_rows(),
        )?;
        info!(report = %self.layout.title, columns = plan.len(), "report started");

        sink.open(plan.columns())?;
        let mut run = Run {
            layout: self.layout,
            context: self.context,
            tracker: GroupTracker::new(self.layout.group_columns(), plan.measures().to_vec()),
            grand: RunningAggregate::new(plan.measures()),
            label_col: plan
                .columns()
                .iter()
                .position(|c| matches!(c.field, Field::Text(_))),
            plan,
            pages,
            carry: Vec::new(),
            outcome: ReportOutcome::new(),
        };
        run.pages.open(sink)?;

        loop {
            if self.context.cancel.is_cancelled() {
                info!(report = %self.layout.title, "report cancelled");
                run.outcome.status = ReportStatus::Cancelled;
                break;
            }
            let row = match rows.next() {
                None => break,
                Some(Ok(row)) => row,
                Some(Err(e)) => {
                    warn!(report = %self.layout.title, error = %e, "row source failed");
                    let events = run.tracker.finish();
                    run.handle(sink, events)?;
                    run.outcome.status = ReportStatus::Failed;
                    run.outcome.errors.push(e.to_string());
                    run.outcome.pages = run.pages.pages();
                    return Ok(run.outcome);
                }
            };
            run.outcome.rows_read += 1;

            if let Some(o) = run.plan.overflow(&row) {
                let message = format!(
                    "row {} skipped: '{}' needs {} instance {} but only {} were planned",
                    run.outcome.rows_read, o.column, o.group, o.slot, o.limit
                );
                warn!("{message}");
                run.outcome.warnings.push(message);
                run.outcome.rejected_rows += 1;
                continue;
            }

            run.grand.add(&row);
            let events = run.tracker.push(row);
            run.handle(sink, events)?;
        }

        let events = run.tracker.finish();
        run.handle(sink, events)?;
        if self.context.grand_total {
            run.write_grand_total(sink)?;
        }
        sink.close()?;

        run.outcome.pages = run.pages.pages();
        info!(
            report = %self.layout.title,
            rows = run.outcome.rows_read,
            pages = run.outcome.pages,
            warnings = run.outcome.warnings.len(),
            "report finished"
        );
        Ok(run.outcome)
    }

    /// Rows a page must hold below the header: one banner per group level
    /// and the tallest block (a total and its percent row).
    fn body_rows(&self) -> u32 {
        let block = if self.layout.total_bucket.is_some() { 2 } else { 1 };
        self.layout.group_levels.len() as u32 + block
    }

    fn header_rows(&self, plan: &ColumnPlan) -> Vec<SheetRow> {
        let mut rows = vec![SheetRow::new(
            RowKind::Title,
            vec![Cell::text(&self.layout.title, StyleToken::Title)],
        )];
        for line in &self.context.subtitle {
            rows.push(SheetRow::new(RowKind::Title, vec![Cell::text(line, StyleToken::Text)]));
        }
        rows.push(SheetRow::new(
            RowKind::Header,
            plan.columns()
                .iter()
                .map(|c| Cell::text(&c.name, StyleToken::Header))
                .collect(),
        ));
        rows
    }
}

// ---------------------------------------------------------------------------
// Per-run state
// ---------------------------------------------------------------------------

struct Run<'a> {
    layout: &'a ReportLayout,
    context: &'a ReportContext,
    plan: ColumnPlan,
    pages: PageManager,
    tracker: GroupTracker,
    grand: RunningAggregate,
    /// Banners of the groups currently open, outermost first.
    carry: Vec<SheetRow>,
    /// Column that receives banner and total labels.
    label_col: Option<usize>,
    outcome: ReportOutcome,
}

impl Run<'_> {
    fn handle(&mut self, sink: &mut dyn Sink, events: Vec<GroupEvent>) -> Result<()> {
        for event in events {
            match event {
                GroupEvent::Begin { level, key } => {
                    let banner = self.labelled_row(
                        RowKind::Banner { level },
                        format!("{}: {}", self.level_label(level), key_value(&key)),
                        StyleToken::Banner,
                    );
                    self.carry.truncate(level);
                    self.pages.write_block(sink, std::slice::from_ref(&banner), &self.carry)?;
                    self.carry.push(banner);
                }
                GroupEvent::Row(row) => {
                    let detail = self.detail_row(&row);
                    self.pages.write_block(sink, &[detail], &self.carry)?;
                    self.outcome.detail_rows += 1;
                }
                GroupEvent::End {
                    level,
                    key,
                    aggregate,
                } => {
                    let label = format!("{} {} Total", self.level_label(level), key_value(&key));
                    let block = self.total_block(
                        RowKind::GroupTotal { level },
                        RowKind::GroupPercent { level },
                        label,
                        &aggregate,
                    );
                    self.carry.truncate(level + 1);
                    self.pages.write_block(sink, &block, &self.carry)?;
                    self.carry.truncate(level);
                    self.outcome.groups += 1;
                    self.check_balance(&key, &aggregate);
                }
            }
        }
        Ok(())
    }

    fn level_label(&self, level: usize) -> &str {
        self.layout
            .group_levels
            .get(level)
            .map(|g| g.label.as_str())
            .unwrap_or("Group")
    }

    fn blank_row(&self) -> Vec<Cell> {
        vec![Cell::blank(); self.plan.len()]
    }

    fn labelled_row(&self, kind: RowKind, label: String, style: StyleToken) -> SheetRow {
        let mut cells = self.blank_row();
        if let Some(cell) = cells.get_mut(self.label_col.unwrap_or(0)) {
            *cell = Cell::text(label, style);
        }
        SheetRow::new(kind, cells)
    }

    fn metric_cell(&self, metric: &Metric, src: &dyn MeasureSource, default: StyleToken) -> Cell {
        match metric.compute(src) {
            Some(v) => Cell::number(v, self.context.thresholds.style_for(metric.key(), v, default)),
            None => Cell::blank(),
        }
    }

    fn detail_row(&self, row: &Row) -> SheetRow {
        let cells = self
            .plan
            .columns()
            .iter()
            .map(|c| match &c.field {
                Field::Text(name) => match row.get(name) {
                    Some(v) if !v.is_null() => Cell::text(v.to_string(), StyleToken::Text),
                    _ => Cell::blank(),
                },
                Field::Number(name) => match row.get(name) {
                    Some(v) if !v.is_null() => Cell::number(v.as_f64(), c.format.style()),
                    _ => Cell::blank(),
                },
                // A detail metric with a missing input stays blank.
                Field::Metric(m) if m.inputs().iter().any(|n| row.get(n).map_or(true, Value::is_null)) => {
                    Cell::blank()
                }
                Field::Metric(m) => self.metric_cell(m, row, c.format.style()),
            })
            .collect();
        SheetRow::new(RowKind::Detail, cells)
    }

    /// Absolute totals, followed by a percent-of-total row when the layout
    /// names a total bucket.
    fn total_block(
        &self,
        total_kind: RowKind,
        percent_kind: RowKind,
        label: String,
        aggregate: &RunningAggregate,
    ) -> Vec<SheetRow> {
        let mut totals = self.labelled_row(total_kind, label, StyleToken::Text);
        for (i, c) in self.plan.columns().iter().enumerate() {
            totals.cells[i] = match &c.field {
                _ if !c.totals => continue,
                Field::Text(_) => continue,
                Field::Number(name) => Cell::number(aggregate.get(name), c.format.style()),
                Field::Metric(m) => self.metric_cell(m, aggregate, c.format.style()),
            };
        }

        let Some(total_bucket) = &self.layout.total_bucket else {
            return vec![totals];
        };
        let denominator = aggregate.get(total_bucket);
        let mut percents = self.labelled_row(percent_kind, format!("% of {total_bucket}"), StyleToken::Text);
        for (i, c) in self.plan.columns().iter().enumerate() {
            if let (Field::Number(name), true) = (&c.field, c.totals) {
                let share = metrics::pct_of_total(aggregate.get(name), denominator);
                percents.cells[i] = Cell::number(share, StyleToken::Percent);
            }
        }
        vec![totals, percents]
    }

    fn check_balance(&mut self, key: &GroupKey, aggregate: &RunningAggregate) {
        let Some(total) = &self.layout.total_bucket else {
            return;
        };
        if self.layout.stage_buckets.is_empty() {
            return;
        }
        if !aggregate.is_balanced(&self.layout.stage_buckets, total) {
            let stages: f64 = self.layout.stage_buckets.iter().map(|s| aggregate.get(s)).sum();
            let message = format!(
                "{} {}: stages sum to {stages} but {total} is {}",
                self.level_label(key.depth().saturating_sub(1)),
                key_path(key),
                aggregate.get(total)
            );
            warn!("{message}");
            self.outcome.warnings.push(message);
        }
    }

    fn write_grand_total(&mut self, sink: &mut dyn Sink) -> Result<()> {
        if self.grand.rows() == 0 {
            debug!("no rows, grand total skipped");
            return Ok(());
        }
        let block = self.total_block(
            RowKind::GrandTotal,
            RowKind::GrandPercent,
            "Grand Total".to_string(),
            &self.grand,
        );
        self.pages.write_block(sink, &block, &[])?;
        Ok(())
    }
}

fn key_value(key: &GroupKey) -> String {
    key.last().map(|v| v.to_string()).unwrap_or_default()
}

fn key_path(key: &GroupKey) -> String {
    key.0.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" / ")
}
