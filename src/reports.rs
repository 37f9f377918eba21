//! The closed set of report modes. Each mode is resolved once into a layout,
//! a row query, its probes and default highlight rules; nothing branches on
//! the mode while rows stream.

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;

use crate::error::{ReportError, Result};
use crate::metrics::Threshold;
use crate::models::Value;
use crate::plan::{
    ColumnTemplate, DynamicGroup, GroupLevel, Metric, NumericFormat, ReportLayout, WaterfallStage,
};
use crate::report::{ReportBuilder, ReportContext, ReportOutcome};
use crate::sink::Sink;
use crate::source::{stream_query, SlotPivot, SqlProbes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportKind {
    FillRate,
    PerfectOrder,
    PriceTiers,
    StoreSales,
}

/// Which pair of columns feeds the fill rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Basis {
    #[default]
    Lines,
    Units,
    Dollars,
}

#[derive(Debug, Clone, Default)]
pub struct ReportParams {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub customer: Option<String>,
    pub vendor: Option<String>,
    pub basis: Basis,
    pub by_department: bool,
    pub weeks: Option<f64>,
}

struct ProbeSpec {
    group: &'static str,
    sql: String,
    params: Vec<Value>,
}

struct PivotSpec {
    keys: &'static [&'static str],
    slot: &'static str,
    values: &'static [(&'static str, &'static str)],
}

/// A mode with every decision made.
pub struct ResolvedReport {
    pub kind: ReportKind,
    pub layout: ReportLayout,
    pub subtitle: Vec<String>,
    sql: String,
    params: Vec<Value>,
    probes: Vec<ProbeSpec>,
    pivot: Option<PivotSpec>,
}

impl ReportKind {
    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::FillRate => "fill-rate",
            ReportKind::PerfectOrder => "perfect-order",
            ReportKind::PriceTiers => "price-tiers",
            ReportKind::StoreSales => "store-sales",
        }
    }

    pub fn default_thresholds(&self) -> Vec<Threshold> {
        match self {
            ReportKind::FillRate => vec![Threshold::below("fill_rate", 97.0)],
            ReportKind::PerfectOrder => vec![Threshold::below("perfect_pct", 0.98)],
            ReportKind::PriceTiers | ReportKind::StoreSales => Vec::new(),
        }
    }

    pub fn resolve(&self, params: &ReportParams) -> Result<ResolvedReport> {
        match self {
            ReportKind::FillRate => fill_rate(params),
            ReportKind::PerfectOrder => perfect_order(params),
            ReportKind::PriceTiers => price_tiers(params),
            ReportKind::StoreSales => store_sales(params),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    fn eq(&mut self, column: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.clauses.push(format!("{column} = ?"));
            self.params.push(Value::from(v.as_str()));
        }
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

/// Date range as `(from, to)`. Both bounds or neither; neither means the
/// current year.
fn date_range(params: &ReportParams) -> Result<(NaiveDate, NaiveDate)> {
    match (&params.from_date, &params.to_date) {
        (Some(from), Some(to)) => {
            let from = parse_date(from)?;
            let to = parse_date(to)?;
            if to < from {
                return Err(ReportError::Other(format!("--to {to} is before --from {from}")));
            }
            Ok((from, to))
        }
        (Some(_), None) => Err(ReportError::Other(
            "--from requires --to (both date boundaries must be specified)".to_string(),
        )),
        (None, Some(_)) => Err(ReportError::Other(
            "--to requires --from (both date boundaries must be specified)".to_string(),
        )),
        (None, None) => {
            let year = chrono::Local::now().year();
            let from = NaiveDate::from_ymd_opt(year, 1, 1);
            let to = NaiveDate::from_ymd_opt(year, 12, 31);
            from.zip(to)
                .ok_or_else(|| ReportError::Other(format!("no calendar for year {year}")))
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ReportError::Other(format!("invalid date '{s}' (expected YYYY-MM-DD)")))
}

fn date_filter(filter: &mut Filter, column: &str, params: &ReportParams) -> Result<String> {
    let (from, to) = date_range(params)?;
    filter.clauses.push(format!("{column} BETWEEN ? AND ?"));
    filter.params.push(Value::from(from.format("%Y-%m-%d").to_string()));
    filter.params.push(Value::from(to.format("%Y-%m-%d").to_string()));
    Ok(format!("{} to {}", from.format("%Y-%m-%d"), to.format("%Y-%m-%d")))
}

fn weeks_in_period(params: &ReportParams) -> Result<f64> {
    if let Some(w) = params.weeks {
        if w <= 0.0 {
            return Err(ReportError::Other(format!("--weeks must be positive, got {w}")));
        }
        return Ok(w);
    }
    let (from, to) = date_range(params)?;
    Ok(((to - from).num_days() + 1) as f64 / 7.0)
}

fn scope_line(params: &ReportParams) -> Option<String> {
    let parts: Vec<String> = [("Customer", &params.customer), ("Vendor", &params.vendor)]
        .into_iter()
        .filter_map(|(label, v)| v.as_ref().map(|v| format!("{label}: {v}")))
        .collect();
    (!parts.is_empty()).then(|| parts.join("  "))
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

fn fill_rate(params: &ReportParams) -> Result<ResolvedReport> {
    let mut filter = Filter::default();
    let period = date_filter(&mut filter, "o.order_date", params)?;
    filter.eq("o.customer", &params.customer);
    filter.eq("i.vendor", &params.vendor);

    let (ordered, shipped, format) = match params.basis {
        Basis::Lines => ("lines", "lines_filled", NumericFormat::Integer),
        Basis::Units => ("units_ordered", "units_shipped", NumericFormat::Integer),
        Basis::Dollars => ("dollars_ordered", "dollars_shipped", NumericFormat::Money),
    };

    let mut layout = ReportLayout::new("Fill Rate", "Fill Rate");
    layout.group_levels = vec![GroupLevel::new("customer", "Customer"), GroupLevel::new("vendor", "Vendor")];
    let mut keys = vec!["o.customer", "i.vendor"];
    if params.by_department {
        layout.group_levels.push(GroupLevel::new("department", "Department"));
        keys.push("i.department");
    }
    keys.push("o.item");
    layout.leading = vec![
        ColumnTemplate::text("Item", "item", 14.0),
        ColumnTemplate::text("Description", "description", 28.0),
        ColumnTemplate::number("Ordered", ordered, format),
        ColumnTemplate::number("Shipped", shipped, format),
        ColumnTemplate::metric(
            "Fill %",
            Metric::FillRate { ordered: ordered.into(), shipped: shipped.into() },
            NumericFormat::Rate,
        ),
        ColumnTemplate::number("Sales", "sales", NumericFormat::Money),
        ColumnTemplate::number("Cost", "cost", NumericFormat::Money),
        ColumnTemplate::metric(
            "Margin %",
            Metric::Margin { retail: "sales".into(), cost: "cost".into() },
            NumericFormat::Rate,
        ),
    ];

    let group_by = keys.join(", ");
    let sql = format!(
        "SELECT o.customer AS customer, i.vendor AS vendor, i.department AS department, \
                o.item AS item, MAX(i.description) AS description, \
                COUNT(*) AS lines, \
                SUM(CASE WHEN o.shipped_qty >= o.ordered_qty THEN 1 ELSE 0 END) AS lines_filled, \
                SUM(o.ordered_qty) AS units_ordered, SUM(o.shipped_qty) AS units_shipped, \
                SUM(o.ordered_qty * o.unit_price) AS dollars_ordered, \
                SUM(o.shipped_qty * o.unit_price) AS dollars_shipped, \
                SUM(o.shipped_qty * o.unit_price) AS sales, \
                SUM(o.shipped_qty * o.unit_cost) AS cost \
         FROM order_lines o JOIN items i ON i.item = o.item \
         WHERE {} \
         GROUP BY {group_by} ORDER BY {group_by}",
        filter.sql()
    );

    let basis = match params.basis {
        Basis::Lines => "lines",
        Basis::Units => "units",
        Basis::Dollars => "dollars",
    };
    let mut subtitle = vec![format!("{period}  (basis: {basis})")];
    subtitle.extend(scope_line(params));
    Ok(ResolvedReport {
        kind: ReportKind::FillRate,
        layout,
        subtitle,
        sql,
        params: filter.params,
        probes: Vec::new(),
        pivot: None,
    })
}

fn perfect_order(params: &ReportParams) -> Result<ResolvedReport> {
    let mut filter = Filter::default();
    let period = date_filter(&mut filter, "o.order_date", params)?;
    filter.eq("o.customer", &params.customer);
    filter.eq("i.vendor", &params.vendor);

    let stage = |title: &str, stage: WaterfallStage| {
        ColumnTemplate::metric(
            title,
            Metric::Waterfall {
                stage,
                total: "lines".into(),
                request_cut: "request_cut".into(),
                allocate_cut: "allocate_cut".into(),
                ship_cut: "ship_cut".into(),
            },
            NumericFormat::Percent,
        )
    };

    let mut layout = ReportLayout::new("Perfect Order", "Perfect Order");
    layout.group_levels = vec![GroupLevel::new("customer", "Customer")];
    layout.leading = vec![
        ColumnTemplate::text("Vendor", "vendor", 20.0),
        ColumnTemplate::number("Lines", "lines", NumericFormat::Integer),
        ColumnTemplate::number("Request Cut", "request_cut", NumericFormat::Integer),
        ColumnTemplate::number("Allocate Cut", "allocate_cut", NumericFormat::Integer),
        ColumnTemplate::number("Ship Cut", "ship_cut", NumericFormat::Integer),
        ColumnTemplate::number("Perfect", "perfect", NumericFormat::Integer),
        ColumnTemplate::number("Partial", "partial", NumericFormat::Integer),
        stage("Request %", WaterfallStage::Request),
        stage("Allocate %", WaterfallStage::Allocate),
        stage("Ship %", WaterfallStage::Ship),
        stage("Perfect %", WaterfallStage::Perfect),
    ];
    layout.total_bucket = Some("lines".into());
    layout.stage_buckets = ["request_cut", "allocate_cut", "ship_cut", "perfect"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let sql = format!(
        "SELECT o.customer AS customer, i.vendor AS vendor, COUNT(*) AS lines, \
                SUM(o.cut_stage = 'request') AS request_cut, \
                SUM(o.cut_stage = 'allocate') AS allocate_cut, \
                SUM(o.cut_stage = 'ship') AS ship_cut, \
                SUM(o.cut_stage = 'none') AS perfect, \
                SUM(o.partial) AS partial \
         FROM order_lines o JOIN items i ON i.item = o.item \
         WHERE {} \
         GROUP BY o.customer, i.vendor ORDER BY o.customer, i.vendor",
        filter.sql()
    );

    let mut subtitle = vec![period];
    subtitle.extend(scope_line(params));
    Ok(ResolvedReport {
        kind: ReportKind::PerfectOrder,
        layout,
        subtitle,
        sql,
        params: filter.params,
        probes: Vec::new(),
        pivot: None,
    })
}

fn price_tiers(params: &ReportParams) -> Result<ResolvedReport> {
    let mut filter = Filter::default();
    filter.eq("i.vendor", &params.vendor);

    let mut layout = ReportLayout::new("Price Tiers", "Price Tiers");
    layout.group_levels = vec![GroupLevel::new("vendor", "Vendor")];
    layout.leading = vec![
        ColumnTemplate::text("Item", "item", 14.0),
        ColumnTemplate::text("Description", "description", 28.0),
        ColumnTemplate::number("Unit Cost", "unit_cost", NumericFormat::Money),
    ];
    layout.dynamic = vec![DynamicGroup {
        name: "tier".into(),
        floor: 3,
        ceiling: 24,
        columns: vec![
            ColumnTemplate::number("New Tier {n} Min Qty", "tier_qty_{n}", NumericFormat::Integer).per_row(),
            ColumnTemplate::number("New Tier {n} Price", "tier_price_{n}", NumericFormat::Money).per_row(),
            ColumnTemplate::metric(
                "New Tier {n} Margin",
                Metric::Margin { retail: "tier_price_{n}".into(), cost: "unit_cost".into() },
                NumericFormat::Rate,
            )
            .per_row(),
        ],
    }];

    let where_sql = filter.sql();
    let sql = format!(
        "SELECT i.vendor AS vendor, i.item AS item, i.description AS description, \
                i.unit_cost AS unit_cost, t.tier AS tier, t.min_qty AS min_qty, t.price AS price \
         FROM items i LEFT JOIN price_tiers t ON t.item = i.item \
         WHERE {where_sql} \
         ORDER BY i.vendor, i.item, t.tier"
    );
    let probe = format!(
        "SELECT MAX(t.tier) FROM price_tiers t JOIN items i ON i.item = t.item WHERE {where_sql}"
    );

    Ok(ResolvedReport {
        kind: ReportKind::PriceTiers,
        layout,
        subtitle: scope_line(params).into_iter().collect(),
        sql,
        params: filter.params.clone(),
        probes: vec![ProbeSpec { group: "tier", sql: probe, params: filter.params }],
        pivot: Some(PivotSpec {
            keys: &["vendor", "item"],
            slot: "tier",
            values: &[("min_qty", "tier_qty"), ("price", "tier_price")],
        }),
    })
}

fn store_sales(params: &ReportParams) -> Result<ResolvedReport> {
    let weeks = weeks_in_period(params)?;
    let mut filter = Filter::default();
    let period = date_filter(&mut filter, "s.sale_date", params)?;
    filter.eq("s.account", &params.customer);

    let mut layout = ReportLayout::new("Store Sales", "Store Sales");
    layout.group_levels = vec![GroupLevel::new("account", "Account")];
    layout.leading = vec![ColumnTemplate::text("Item", "item", 14.0)];
    layout.dynamic = vec![DynamicGroup {
        name: "store".into(),
        floor: 1,
        ceiling: 200,
        columns: vec![ColumnTemplate::number("Store {n}", "store_{n}", NumericFormat::Integer).width(9.0)],
    }];
    layout.trailing = vec![
        ColumnTemplate::number("Total Units", "total_units", NumericFormat::Integer),
        ColumnTemplate::number("On Hand", "on_hand", NumericFormat::Integer),
        ColumnTemplate::metric(
            "Weeks of Supply",
            Metric::WeekOfSupply { on_hand: "on_hand".into(), sales: "total_units".into(), weeks },
            NumericFormat::Decimal,
        ),
    ];

    let sql = format!(
        "SELECT s.account AS account, s.item AS item, l.slot AS slot, SUM(s.units) AS units, \
                SUM(SUM(s.units)) OVER (PARTITION BY s.account, s.item) AS total_units, \
                COALESCE((SELECT v.on_hand FROM inventory v \
                          WHERE v.account = s.account AND v.item = s.item), 0) AS on_hand \
         FROM store_sales s \
         JOIN linked_stores l ON l.account = s.account AND l.store = s.store \
         WHERE {} \
         GROUP BY s.account, s.item, l.slot ORDER BY s.account, s.item, l.slot",
        filter.sql()
    );

    let mut probe_filter = Filter::default();
    probe_filter.eq("account", &params.customer);
    let probe = format!("SELECT MAX(slot) FROM linked_stores WHERE {}", probe_filter.sql());

    let mut subtitle = vec![format!("{period}  ({weeks:.1} weeks)")];
    subtitle.extend(scope_line(params));
    Ok(ResolvedReport {
        kind: ReportKind::StoreSales,
        layout,
        subtitle,
        sql,
        params: filter.params,
        probes: vec![ProbeSpec { group: "store", sql: probe, params: probe_filter.params }],
        pivot: Some(PivotSpec {
            keys: &["account", "item"],
            slot: "slot",
            values: &[("units", "store")],
        }),
    })
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

/// Probe, stream and build `report` into `sink`.
pub fn run_report(
    conn: &Connection,
    report: &ResolvedReport,
    context: &ReportContext,
    sink: &mut dyn Sink,
) -> Result<ReportOutcome> {
    let probes = report
        .probes
        .iter()
        .fold(SqlProbes::new(conn), |p, spec| p.with(spec.group, &spec.sql, spec.params.clone()));
    let builder = ReportBuilder::new(&report.layout, context);

    stream_query(conn, &report.sql, &report.params, |rows| match &report.pivot {
        Some(p) => {
            let mut wide = SlotPivot::new(rows, p.keys, p.slot, p.values);
            builder.run(&probes, &mut wide, sink)
        }
        None => builder.run(&probes, rows, sink),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::report::ReportStatus;
    use crate::sink::{Cell, MemorySink, RowKind, SheetRow, StyleToken};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO items VALUES ('I1', 'V1', 'Widget', 'Hardware', 4.0, 10.0);
             INSERT INTO items VALUES ('I2', 'V1', 'Gadget', 'Garden', 2.0, 5.0);
             INSERT INTO items VALUES ('I3', 'V2', 'Sprocket', 'Hardware', 1.0, 2.0);
             INSERT INTO order_lines (order_date, customer, item, ordered_qty, shipped_qty, unit_price, unit_cost, cut_stage, partial)
             VALUES ('2025-03-01', 'C1', 'I1', 10, 10, 10, 4, 'none', 0),
                    ('2025-03-02', 'C1', 'I2', 10, 5, 5, 2, 'ship', 1),
                    ('2025-03-03', 'C1', 'I3', 4, 4, 2, 1, 'none', 0),
                    ('2025-03-04', 'C2', 'I3', 6, 0, 2, 1, 'request', 0),
                    ('2024-12-31', 'C1', 'I1', 99, 0, 10, 4, 'allocate', 0);
             INSERT INTO price_tiers VALUES ('I1', 1, 10, 9.5), ('I1', 2, 50, 9.0),
                                            ('I1', 3, 100, 8.5), ('I1', 4, 500, 8.0);
             INSERT INTO linked_stores VALUES ('C1', 'North', 1), ('C1', 'South', 2);
             INSERT INTO store_sales (sale_date, account, store, item, units)
             VALUES ('2025-03-01', 'C1', 'North', 'I1', 3),
                    ('2025-03-02', 'C1', 'South', 'I1', 5),
                    ('2025-03-03', 'C1', 'North', 'I1', 2),
                    ('2025-03-03', 'C1', 'South', 'I2', 7);
             INSERT INTO inventory VALUES ('C1', 'I1', 20), ('C1', 'I2', 0);",
        )
        .unwrap();
    }

    fn march() -> ReportParams {
        ReportParams {
            from_date: Some("2025-03-01".into()),
            to_date: Some("2025-03-28".into()),
            ..ReportParams::default()
        }
    }

    fn run(conn: &Connection, kind: ReportKind, params: &ReportParams) -> (ReportOutcome, MemorySink) {
        let report = kind.resolve(params).unwrap();
        let context = ReportContext {
            subtitle: report.subtitle.clone(),
            thresholds: crate::metrics::ThresholdTable::new(kind.default_thresholds()),
            ..ReportContext::default()
        };
        let mut sink = MemorySink::new();
        let outcome = run_report(conn, &report, &context, &mut sink).unwrap();
        (outcome, sink)
    }

    fn column(sink: &MemorySink, name: &str) -> usize {
        let header = sink.rows_of_kind(RowKind::Header).remove(0);
        header
            .cells
            .iter()
            .position(|c| c.as_text() == Some(name))
            .unwrap_or_else(|| panic!("no column {name}"))
    }

    fn value(row: &SheetRow, col: usize) -> Option<f64> {
        row.cell(col).and_then(Cell::as_number)
    }

    #[test]
    fn test_date_filter_rejects_from_without_to() {
        let params = ReportParams {
            from_date: Some("2025-01-01".into()),
            ..ReportParams::default()
        };
        let err = ReportKind::FillRate.resolve(&params).err().unwrap();
        assert!(err.to_string().contains("--from requires --to"));
    }

    #[test]
    fn test_date_filter_rejects_to_without_from() {
        let params = ReportParams {
            to_date: Some("2025-01-31".into()),
            ..ReportParams::default()
        };
        assert!(ReportKind::PerfectOrder.resolve(&params).is_err());
    }

    #[test]
    fn test_date_filter_rejects_bad_dates() {
        let params = ReportParams {
            from_date: Some("2025-02-30".into()),
            to_date: Some("2025-03-01".into()),
            ..ReportParams::default()
        };
        assert!(ReportKind::FillRate.resolve(&params).is_err());
        let reversed = ReportParams {
            from_date: Some("2025-03-01".into()),
            to_date: Some("2025-01-01".into()),
            ..ReportParams::default()
        };
        assert!(ReportKind::FillRate.resolve(&reversed).is_err());
    }

    #[test]
    fn test_fill_rate_by_lines() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let (outcome, sink) = run(&conn, ReportKind::FillRate, &march());
        assert_eq!(outcome.status, ReportStatus::Completed);
        assert_eq!(outcome.detail_rows, 4);

        let fill = column(&sink, "Fill %");
        let customers = sink.rows_of_kind(RowKind::GroupTotal { level: 0 });
        assert_eq!(customers.len(), 2);
        // C1: three lines, two filled
        assert!((value(&customers[0], fill).unwrap() - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(customers[0].cells[fill].style, StyleToken::Highlight);
        // C2: one line, cut entirely
        assert_eq!(value(&customers[1], fill), Some(0.0));

        let grand = sink.rows_of_kind(RowKind::GrandTotal);
        assert_eq!(value(&grand[0], column(&sink, "Ordered")), Some(4.0));
    }

    #[test]
    fn test_fill_rate_by_units_with_departments() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let params = ReportParams {
            basis: Basis::Units,
            by_department: true,
            customer: Some("C1".into()),
            ..march()
        };
        let (_, sink) = run(&conn, ReportKind::FillRate, &params);
        assert_eq!(sink.rows_of_kind(RowKind::Banner { level: 2 }).len(), 3);
        let vendors = sink.rows_of_kind(RowKind::GroupTotal { level: 1 });
        let fill = column(&sink, "Fill %");
        // V1 units: ordered 20, shipped 15
        assert_eq!(value(&vendors[0], column(&sink, "Ordered")), Some(20.0));
        assert!((value(&vendors[0], fill).unwrap() - 75.0).abs() < 1e-9);
        let margin = column(&sink, "Margin %");
        // V1 sales 125, cost 50
        assert!((value(&vendors[0], margin).unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_perfect_order_waterfall() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let (outcome, sink) = run(&conn, ReportKind::PerfectOrder, &march());
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);

        let perfect = column(&sink, "Perfect %");
        let ship = column(&sink, "Ship %");
        let c1 = &sink.rows_of_kind(RowKind::GroupTotal { level: 0 })[0];
        assert!((value(c1, perfect).unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!((value(c1, ship).unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(c1.cells[perfect].style, StyleToken::Highlight);

        let pct = &sink.rows_of_kind(RowKind::GroupPercent { level: 0 })[0];
        assert_eq!(value(pct, column(&sink, "Lines")), Some(1.0));
        assert!((value(pct, column(&sink, "Partial")).unwrap() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_tiers_plan_discovered_tiers() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let (outcome, sink) = run(&conn, ReportKind::PriceTiers, &ReportParams::default());
        assert_eq!(outcome.status, ReportStatus::Completed);
        assert!(outcome.warnings.is_empty());

        column(&sink, "New Tier 4 Price");
        let details = sink.rows_of_kind(RowKind::Detail);
        assert_eq!(details.len(), 3);
        let price4 = column(&sink, "New Tier 4 Price");
        assert_eq!(value(&details[0], price4), Some(8.0));
        let margin1 = column(&sink, "New Tier 1 Margin");
        let expected = (9.5 - 4.0) / 9.5 * 100.0;
        assert!((value(&details[0], margin1).unwrap() - expected).abs() < 1e-9);
        // Items without tiers leave the tier cells blank.
        assert_eq!(value(&details[1], price4), None);
        assert_eq!(value(&details[1], margin1), None);

        // Tier cells are per item; vendor and grand totals leave them blank.
        let qty1 = column(&sink, "New Tier 1 Min Qty");
        let mut totals = sink.rows_of_kind(RowKind::GroupTotal { level: 0 });
        totals.extend(sink.rows_of_kind(RowKind::GrandTotal));
        assert!(!totals.is_empty());
        for row in &totals {
            assert_eq!(value(row, qty1), None);
            assert_eq!(value(row, price4), None);
            assert_eq!(value(row, margin1), None);
            assert!(value(row, column(&sink, "Unit Cost")).is_some());
        }
    }

    #[test]
    fn test_price_tiers_floor_without_tiers() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let params = ReportParams {
            vendor: Some("V2".into()),
            ..ReportParams::default()
        };
        let (_, sink) = run(&conn, ReportKind::PriceTiers, &params);
        column(&sink, "New Tier 3 Margin");
        let header = sink.rows_of_kind(RowKind::Header).remove(0);
        assert_eq!(header.cells.len(), 3 + 3 * 3);
    }

    #[test]
    fn test_store_sales_pivots_linked_stores() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let params = ReportParams {
            weeks: Some(4.0),
            ..march()
        };
        let (outcome, sink) = run(&conn, ReportKind::StoreSales, &params);
        assert_eq!(outcome.rejected_rows, 0);
        let details = sink.rows_of_kind(RowKind::Detail);
        assert_eq!(details.len(), 2);

        let north = column(&sink, "Store 1");
        let south = column(&sink, "Store 2");
        assert_eq!(value(&details[0], north), Some(5.0));
        assert_eq!(value(&details[0], south), Some(5.0));
        assert_eq!(value(&details[0], column(&sink, "Total Units")), Some(10.0));
        // 20 on hand at 10 units per 4 weeks
        let wos = column(&sink, "Weeks of Supply");
        assert_eq!(value(&details[0], wos), Some(8.0));
        assert_eq!(value(&details[1], north), None);
    }

    #[test]
    fn test_weeks_default_to_period_length() {
        assert_eq!(weeks_in_period(&march()).unwrap(), 4.0);
        let bad = ReportParams {
            weeks: Some(0.0),
            ..march()
        };
        assert!(weeks_in_period(&bad).is_err());
    }
}
