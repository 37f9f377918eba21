//! Column planning.
//!
//! A report declares its columns as templates: fixed columns before and after
//! zero or more dynamic groups whose instance count is discovered by probing
//! the data. Planning runs once, before any row is read, and yields a frozen
//! [`ColumnPlan`].

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ReportError, Result};
use crate::metrics;
use crate::models::{MeasureSource, Row};
use crate::sink::StyleToken;

/// Placeholder replaced by the 1-based instance number in dynamic templates.
pub const SLOT: &str = "{n}";

/// Largest column count a worksheet can hold.
pub const MAX_COLUMNS: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFormat {
    Text,
    Integer,
    Decimal,
    Money,
    /// Fractions (0–1).
    Percent,
    /// Percentage points (0–100).
    Rate,
}

impl NumericFormat {
    pub fn style(&self) -> StyleToken {
        match self {
            NumericFormat::Text => StyleToken::Text,
            NumericFormat::Integer => StyleToken::Integer,
            NumericFormat::Decimal => StyleToken::Decimal,
            NumericFormat::Money => StyleToken::Money,
            NumericFormat::Percent => StyleToken::Percent,
            NumericFormat::Rate => StyleToken::Rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterfallStage {
    Request,
    Allocate,
    Ship,
    Perfect,
}

/// A derived value and the measure names it reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    FillRate { ordered: String, shipped: String },
    Margin { retail: String, cost: String },
    WeekOfSupply { on_hand: String, sales: String, weeks: f64 },
    Waterfall {
        stage: WaterfallStage,
        total: String,
        request_cut: String,
        allocate_cut: String,
        ship_cut: String,
    },
    ShareOfTotal { value: String, total: String },
}

impl Metric {
    /// Name used by threshold tables.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::FillRate { .. } => "fill_rate",
            Metric::Margin { .. } => "margin",
            Metric::WeekOfSupply { .. } => "week_of_supply",
            Metric::Waterfall { stage, .. } => match stage {
                WaterfallStage::Request => "request_pct",
                WaterfallStage::Allocate => "allocate_pct",
                WaterfallStage::Ship => "ship_pct",
                WaterfallStage::Perfect => "perfect_pct",
            },
            Metric::ShareOfTotal { .. } => "share_of_total",
        }
    }

    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Metric::FillRate { ordered, shipped } => vec![ordered.as_str(), shipped.as_str()],
            Metric::Margin { retail, cost } => vec![retail.as_str(), cost.as_str()],
            Metric::WeekOfSupply { on_hand, sales, .. } => vec![on_hand.as_str(), sales.as_str()],
            Metric::Waterfall {
                total,
                request_cut,
                allocate_cut,
                ship_cut,
                ..
            } => vec![
                total.as_str(),
                request_cut.as_str(),
                allocate_cut.as_str(),
                ship_cut.as_str(),
            ],
            Metric::ShareOfTotal { value, total } => vec![value.as_str(), total.as_str()],
        }
    }

    /// `None` means the cell is left blank.
    pub fn compute(&self, src: &dyn MeasureSource) -> Option<f64> {
        match self {
            Metric::FillRate { ordered, shipped } => {
                Some(metrics::fill_rate(src.number(ordered), src.number(shipped)))
            }
            Metric::Margin { retail, cost } => {
                Some(metrics::margin(src.number(retail), src.number(cost)))
            }
            Metric::WeekOfSupply {
                on_hand,
                sales,
                weeks,
            } => metrics::week_of_supply(src.number(on_hand), src.number(sales), *weeks),
            Metric::Waterfall {
                stage,
                total,
                request_cut,
                allocate_cut,
                ship_cut,
            } => {
                let w = metrics::waterfall(
                    src.number(total),
                    src.number(request_cut),
                    src.number(allocate_cut),
                    src.number(ship_cut),
                );
                Some(match stage {
                    WaterfallStage::Request => w.req_pct,
                    WaterfallStage::Allocate => w.allo_pct,
                    WaterfallStage::Ship => w.ship_pct,
                    WaterfallStage::Perfect => w.perfect_pct,
                })
            }
            Metric::ShareOfTotal { value, total } => {
                Some(metrics::pct_of_total(src.number(value), src.number(total)))
            }
        }
    }

    fn for_slot(&self, n: usize) -> Metric {
        let s = |name: &String| slot_name(name, n);
        match self {
            Metric::FillRate { ordered, shipped } => Metric::FillRate {
                ordered: s(ordered),
                shipped: s(shipped),
            },
            Metric::Margin { retail, cost } => Metric::Margin {
                retail: s(retail),
                cost: s(cost),
            },
            Metric::WeekOfSupply {
                on_hand,
                sales,
                weeks,
            } => Metric::WeekOfSupply {
                on_hand: s(on_hand),
                sales: s(sales),
                weeks: *weeks,
            },
            Metric::Waterfall {
                stage,
                total,
                request_cut,
                allocate_cut,
                ship_cut,
            } => Metric::Waterfall {
                stage: *stage,
                total: s(total),
                request_cut: s(request_cut),
                allocate_cut: s(allocate_cut),
                ship_cut: s(ship_cut),
            },
            Metric::ShareOfTotal { value, total } => Metric::ShareOfTotal {
                value: s(value),
                total: s(total),
            },
        }
    }
}

fn slot_name(template: &str, n: usize) -> String {
    template.replace(SLOT, &n.to_string())
}

/// Where a column's cells come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A label copied from the row; blank on total rows.
    Text(String),
    /// A numeric measure, summed into group totals.
    Number(String),
    /// A derived value, recomputed from sums on total rows.
    Metric(Metric),
}

impl Field {
    fn names(&self) -> Vec<&str> {
        match self {
            Field::Text(c) | Field::Number(c) => vec![c.as_str()],
            Field::Metric(m) => m.inputs(),
        }
    }

    fn for_slot(&self, n: usize) -> Field {
        match self {
            Field::Text(c) => Field::Text(slot_name(c, n)),
            Field::Number(c) => Field::Number(slot_name(c, n)),
            Field::Metric(m) => Field::Metric(m.for_slot(n)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTemplate {
    pub title: String,
    pub field: Field,
    pub width: f64,
    pub format: NumericFormat,
    /// Whether total and percent rows fill this column.
    pub totals: bool,
}

impl ColumnTemplate {
    pub fn text(title: &str, column: &str, width: f64) -> Self {
        Self {
            title: title.to_string(),
            field: Field::Text(column.to_string()),
            width,
            format: NumericFormat::Text,
            totals: true,
        }
    }

    pub fn number(title: &str, column: &str, format: NumericFormat) -> Self {
        Self {
            title: title.to_string(),
            field: Field::Number(column.to_string()),
            width: 12.0,
            format,
            totals: true,
        }
    }

    pub fn metric(title: &str, metric: Metric, format: NumericFormat) -> Self {
        Self {
            title: title.to_string(),
            field: Field::Metric(metric),
            width: 10.0,
            format,
            totals: true,
        }
    }

    pub fn width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    /// A value that only means something on its own row; totals leave it blank.
    pub fn per_row(mut self) -> Self {
        self.totals = false;
        self
    }
}

/// Columns repeated once per discovered instance (price tier, linked store…).
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicGroup {
    pub name: String,
    /// Minimum instance count, used when the probe finds fewer or nothing.
    pub floor: usize,
    /// Maximum instance count the layout accepts.
    pub ceiling: usize,
    pub columns: Vec<ColumnTemplate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupLevel {
    pub column: String,
    pub label: String,
}

impl GroupLevel {
    pub fn new(column: &str, label: &str) -> Self {
        Self {
            column: column.to_string(),
            label: label.to_string(),
        }
    }
}

/// Everything that decides a report's shape, resolved once from its mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub title: String,
    pub sheet_name: String,
    /// Outer to inner.
    pub group_levels: Vec<GroupLevel>,
    pub leading: Vec<ColumnTemplate>,
    pub dynamic: Vec<DynamicGroup>,
    pub trailing: Vec<ColumnTemplate>,
    /// Denominator for the percent-of-total row; no percent row when unset.
    pub total_bucket: Option<String>,
    /// Buckets that must sum to `total_bucket` at every group end.
    pub stage_buckets: Vec<String>,
}

impl ReportLayout {
    pub fn new(title: &str, sheet_name: &str) -> Self {
        Self {
            title: title.to_string(),
            sheet_name: sheet_name.to_string(),
            group_levels: Vec::new(),
            leading: Vec::new(),
            dynamic: Vec::new(),
            trailing: Vec::new(),
            total_bucket: None,
            stage_buckets: Vec::new(),
        }
    }

    pub fn group_columns(&self) -> Vec<String> {
        self.group_levels.iter().map(|g| g.column.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Frozen plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Fixed,
    Dynamic { group: String, instance: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
    pub width: f64,
    pub format: NumericFormat,
    pub field: Field,
    pub totals: bool,
}

impl ColumnDescriptor {
    fn from_template(t: &ColumnTemplate, kind: ColumnKind) -> Self {
        let (name, field) = match &kind {
            ColumnKind::Fixed => (t.title.clone(), t.field.clone()),
            ColumnKind::Dynamic { instance, .. } => {
                (slot_name(&t.title, *instance), t.field.for_slot(*instance))
            }
        };
        Self {
            name,
            kind,
            width: t.width,
            format: t.format,
            field,
            totals: t.totals,
        }
    }
}

/// A dynamic column name split around its slot number.
#[derive(Debug, Clone, PartialEq)]
struct SlotPattern {
    group: String,
    prefix: String,
    suffix: String,
    limit: usize,
}

impl SlotPattern {
    fn slot_of(&self, column: &str) -> Option<usize> {
        let rest = column.strip_prefix(&self.prefix)?;
        let digits = rest.strip_suffix(&self.suffix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// A row that carries data for a dynamic instance the plan has no column for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overflow {
    pub group: String,
    pub column: String,
    pub slot: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    columns: Vec<ColumnDescriptor>,
    cardinalities: Vec<(String, usize)>,
    measures: Vec<String>,
    patterns: Vec<SlotPattern>,
    min_columns: usize,
}

impl ColumnPlan {
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column count the layout has even with no data.
    pub fn min_columns(&self) -> usize {
        self.min_columns
    }

    pub fn cardinality(&self, group: &str) -> Option<usize> {
        self.cardinalities
            .iter()
            .find(|(g, _)| g == group)
            .map(|(_, n)| *n)
    }

    /// Every numeric name group aggregates accumulate, in first-use order.
    pub fn measures(&self) -> &[String] {
        &self.measures
    }

    /// First non-null value in `row` that belongs to an unplanned dynamic instance.
    pub fn overflow(&self, row: &Row) -> Option<Overflow> {
        for (name, value) in row.columns() {
            if value.is_null() {
                continue;
            }
            for p in &self.patterns {
                if let Some(slot) = p.slot_of(name) {
                    if slot == 0 || slot > p.limit {
                        return Some(Overflow {
                            group: p.group.clone(),
                            column: name.to_string(),
                            slot,
                            limit: p.limit,
                        });
                    }
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// Discovers how many instances a dynamic group needs. `Ok(None)` means the
/// probe found no data.
pub trait CardinalityProbe {
    fn cardinality(&self, group: &str) -> Result<Option<i64>>;
}

/// Probe answers known up front.
#[derive(Debug, Clone, Default)]
pub struct FixedProbes(pub HashMap<String, i64>);

impl FixedProbes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, group: &str, n: i64) -> Self {
        self.0.insert(group.to_string(), n);
        self
    }
}

impl CardinalityProbe for FixedProbes {
    fn cardinality(&self, group: &str) -> Result<Option<i64>> {
        Ok(self.0.get(group).copied())
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

pub struct SchemaPlanner;

impl SchemaPlanner {
    pub fn plan(layout: &ReportLayout, probe: &dyn CardinalityProbe) -> Result<ColumnPlan> {
        validate(layout)?;

        let mut columns = Vec::new();
        let mut cardinalities = Vec::new();
        let mut patterns = Vec::new();
        let mut min_columns = layout.leading.len() + layout.trailing.len();

        for t in &layout.leading {
            columns.push(ColumnDescriptor::from_template(t, ColumnKind::Fixed));
        }

        for group in &layout.dynamic {
            let discovered = match probe.cardinality(&group.name) {
                Ok(n) => n,
                Err(ReportError::SchemaProbe { group, reason }) => {
                    return Err(ReportError::SchemaProbe { group, reason })
                }
                Err(e) => {
                    return Err(ReportError::SchemaProbe {
                        group: group.name.clone(),
                        reason: e.to_string(),
                    })
                }
            };
            let n = resolve_cardinality(group, discovered)?;
            debug!(group = %group.name, ?discovered, planned = n, "planned dynamic columns");

            for instance in 1..=n {
                for t in &group.columns {
                    let kind = ColumnKind::Dynamic {
                        group: group.name.clone(),
                        instance,
                    };
                    columns.push(ColumnDescriptor::from_template(t, kind));
                }
            }
            for t in &group.columns {
                for name in t.field.names() {
                    if let Some((prefix, suffix)) = name.split_once(SLOT) {
                        let pattern = SlotPattern {
                            group: group.name.clone(),
                            prefix: prefix.to_string(),
                            suffix: suffix.to_string(),
                            limit: n,
                        };
                        if !patterns.contains(&pattern) {
                            patterns.push(pattern);
                        }
                    }
                }
            }
            cardinalities.push((group.name.clone(), n));
            min_columns += group.floor * group.columns.len();
        }

        for t in &layout.trailing {
            columns.push(ColumnDescriptor::from_template(t, ColumnKind::Fixed));
        }

        if columns.len() > MAX_COLUMNS {
            return Err(ReportError::Layout(format!(
                "{} columns planned, a sheet holds at most {MAX_COLUMNS}",
                columns.len()
            )));
        }

        let mut measures: Vec<String> = Vec::new();
        let mut add = |name: &str| {
            if !measures.iter().any(|m| m == name) {
                measures.push(name.to_string());
            }
        };
        for c in &columns {
            match &c.field {
                Field::Text(_) => {}
                Field::Number(n) => add(n),
                Field::Metric(m) => m.inputs().into_iter().for_each(&mut add),
            }
        }
        if let Some(total) = &layout.total_bucket {
            add(total);
        }
        layout.stage_buckets.iter().for_each(|s| add(s));

        Ok(ColumnPlan {
            columns,
            cardinalities,
            measures,
            patterns,
            min_columns,
        })
    }
}

fn resolve_cardinality(group: &DynamicGroup, discovered: Option<i64>) -> Result<usize> {
    let n = match discovered {
        None => 0,
        Some(n) if n < 0 => {
            return Err(ReportError::SchemaProbe {
                group: group.name.clone(),
                reason: format!("negative cardinality {n}"),
            })
        }
        Some(n) => usize::try_from(n).map_err(|_| ReportError::SchemaProbe {
            group: group.name.clone(),
            reason: format!("cardinality {n} out of range"),
        })?,
    };
    Ok(n.max(group.floor).min(group.ceiling))
}

fn validate(layout: &ReportLayout) -> Result<()> {
    if layout.leading.is_empty() && layout.dynamic.is_empty() && layout.trailing.is_empty() {
        return Err(ReportError::Layout(format!("'{}' has no columns", layout.title)));
    }
    for group in &layout.dynamic {
        if group.floor > group.ceiling {
            return Err(ReportError::Layout(format!(
                "dynamic group '{}' floor {} exceeds ceiling {}",
                group.name, group.floor, group.ceiling
            )));
        }
        for t in &group.columns {
            if !t.title.contains(SLOT) {
                return Err(ReportError::Layout(format!(
                    "dynamic column '{}' needs a {SLOT} placeholder in its title",
                    t.title
                )));
            }
        }
    }
    Ok(())
}
