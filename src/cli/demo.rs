use chrono::{Duration, Local, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;

use crate::db::{get_connection, init_db, is_empty};
use crate::error::{ReportError, Result};
use crate::settings::load_settings;

struct DemoItem {
    item: &'static str,
    vendor: &'static str,
    description: &'static str,
    department: &'static str,
    cost: f64,
    price: f64,
}

const ITEMS: &[DemoItem] = &[
    DemoItem { item: "AC-1001", vendor: "Acme Supply", description: "Shop towels 12pk", department: "Janitorial", cost: 6.10, price: 9.99 },
    DemoItem { item: "AC-1002", vendor: "Acme Supply", description: "Nitrile gloves L", department: "Janitorial", cost: 8.40, price: 12.49 },
    DemoItem { item: "AC-2001", vendor: "Acme Supply", description: "Box cutter", department: "Tools", cost: 2.15, price: 4.25 },
    DemoItem { item: "AC-2002", vendor: "Acme Supply", description: "Packing tape 6pk", department: "Shipping", cost: 7.80, price: 13.50 },
    DemoItem { item: "BR-0110", vendor: "Blue Ridge Foods", description: "Roasted peanuts 1lb", department: "Snacks", cost: 2.60, price: 4.49 },
    DemoItem { item: "BR-0120", vendor: "Blue Ridge Foods", description: "Trail mix 2lb", department: "Snacks", cost: 5.75, price: 9.25 },
    DemoItem { item: "BR-0300", vendor: "Blue Ridge Foods", description: "Apple butter 16oz", department: "Pantry", cost: 3.10, price: 5.99 },
    DemoItem { item: "CT-5000", vendor: "Cascade Tools", description: "Claw hammer 16oz", department: "Hand Tools", cost: 9.20, price: 17.99 },
    DemoItem { item: "CT-5010", vendor: "Cascade Tools", description: "Tape measure 25ft", department: "Hand Tools", cost: 6.45, price: 11.99 },
    DemoItem { item: "CT-7000", vendor: "Cascade Tools", description: "Cordless drill", department: "Power Tools", cost: 48.00, price: 79.00 },
];

/// Customers and the stores linked to each account.
const CUSTOMERS: &[(&str, &[&str])] = &[
    ("Harbor Hardware", &["Harbor Main St", "Harbor Pier", "Harbor Uptown"]),
    ("Millbrook Market", &["Millbrook"]),
    ("Pine County Co-op", &["Pine North", "Pine South"]),
    ("Summit General", &["Summit Lodge", "Summit Village", "Summit Base", "Summit Ridge"]),
];

const DAYS: i64 = 120;

pub struct DemoCounts {
    pub items: usize,
    pub order_lines: usize,
    pub price_tiers: usize,
    pub store_sales: usize,
}

/// Deterministic sample data ending today.
pub fn insert_demo_data(conn: &Connection, seed: u64) -> Result<DemoCounts> {
    let mut rng = StdRng::seed_from_u64(seed);
    let today = Local::now().date_naive();
    let tx = conn.unchecked_transaction()?;

    for i in ITEMS {
        tx.execute(
            "INSERT INTO items (item, vendor, description, department, unit_cost, unit_price) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![i.item, i.vendor, i.description, i.department, i.cost, i.price],
        )?;
    }

    // Price breaks: some items have none, some more than the usual three.
    let mut price_tiers = 0;
    for (n, i) in ITEMS.iter().enumerate() {
        let tiers = [0, 2, 3, 5][n % 4];
        for tier in 1..=tiers {
            let min_qty = 10.0 * f64::from(tier * tier);
            let price = round2(i.price * (1.0 - 0.04 * f64::from(tier)));
            tx.execute(
                "INSERT INTO price_tiers (item, tier, min_qty, price) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![i.item, tier, min_qty, price],
            )?;
            price_tiers += 1;
        }
    }

    let mut order_lines = 0;
    for day in 0..DAYS {
        let date = date_string(today - Duration::days(DAYS - 1 - day));
        for (customer, _) in CUSTOMERS {
            for _ in 0..rng.gen_range(0..4) {
                let i = &ITEMS[rng.gen_range(0..ITEMS.len())];
                let ordered = f64::from(rng.gen_range(1..=24u32));
                let roll: f64 = rng.gen();
                let (stage, shipped) = if roll < 0.88 {
                    ("none", ordered)
                } else if roll < 0.92 {
                    ("request", 0.0)
                } else if roll < 0.96 {
                    ("allocate", (ordered * rng.gen_range(0.0..0.5)).floor())
                } else {
                    ("ship", (ordered * rng.gen_range(0.3..0.9)).floor())
                };
                let partial = i64::from(shipped > 0.0 && shipped < ordered);
                tx.execute(
                    "INSERT INTO order_lines (order_date, customer, item, ordered_qty, shipped_qty, \
                     unit_price, unit_cost, cut_stage, partial) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![date, customer, i.item, ordered, shipped, i.price, i.cost, stage, partial],
                )?;
                order_lines += 1;
            }
        }
    }

    let mut store_sales = 0;
    for (account, stores) in CUSTOMERS {
        for (slot, store) in stores.iter().enumerate() {
            tx.execute(
                "INSERT INTO linked_stores (account, store, slot) VALUES (?1, ?2, ?3)",
                rusqlite::params![account, store, slot as i64 + 1],
            )?;
        }
        for i in ITEMS {
            tx.execute(
                "INSERT INTO inventory (account, item, on_hand) VALUES (?1, ?2, ?3)",
                rusqlite::params![account, i.item, f64::from(rng.gen_range(0..200u32))],
            )?;
        }
        for week in 0..DAYS / 7 {
            let date = date_string(today - Duration::days(DAYS - 1 - week * 7));
            for store in stores.iter() {
                for i in ITEMS {
                    if !rng.gen_bool(0.6) {
                        continue;
                    }
                    let units = f64::from(rng.gen_range(1..30u32));
                    tx.execute(
                        "INSERT INTO store_sales (sale_date, account, store, item, units) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![date, account, store, i.item, units],
                    )?;
                    store_sales += 1;
                }
            }
        }
    }

    tx.commit()?;
    Ok(DemoCounts {
        items: ITEMS.len(),
        order_lines,
        price_tiers,
        store_sales,
    })
}

fn date_string(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(ReportError::Other("No database found. Run `fillsheet init` first.".into()));
    }

    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    if !is_empty(&conn)? {
        println!("Demo data already loaded (order lines exist).");
        return Ok(());
    }

    let counts = insert_demo_data(&conn, 7)?;

    println!("Demo data loaded!");
    println!("  Items:        {}", counts.items);
    println!("  Order lines:  {}", counts.order_lines);
    println!("  Price tiers:  {}", counts.price_tiers);
    println!("  Store sales:  {}", counts.store_sales);
    println!();
    println!("Try these next:");
    println!("  fillsheet report fill-rate --format text");
    println!("  fillsheet report perfect-order");
    println!("  fillsheet report price-tiers");
    println!("  fillsheet report store-sales --weeks 4");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{ReportKind, ReportParams};
    use crate::report::{ReportContext, ReportStatus};
    use crate::sink::{MemorySink, RowKind};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn last_120_days() -> ReportParams {
        let today = Local::now().date_naive();
        ReportParams {
            from_date: Some(date_string(today - Duration::days(DAYS - 1))),
            to_date: Some(date_string(today)),
            ..ReportParams::default()
        }
    }

    #[test]
    fn test_demo_data_is_deterministic() {
        let (_a, first) = test_db();
        let (_b, second) = test_db();
        let a = insert_demo_data(&first, 7).unwrap();
        let b = insert_demo_data(&second, 7).unwrap();
        assert_eq!(a.order_lines, b.order_lines);
        assert_eq!(a.store_sales, b.store_sales);
        assert_eq!(a.price_tiers, 2 + 3 + 5 + 2 + 3 + 5 + 2);
        assert!(!is_empty(&first).unwrap());
    }

    #[test]
    fn test_demo_stages_balance_in_perfect_order() {
        let (_dir, conn) = test_db();
        insert_demo_data(&conn, 11).unwrap();
        let report = ReportKind::PerfectOrder.resolve(&last_120_days()).unwrap();
        let mut sink = MemorySink::new();
        let outcome =
            crate::reports::run_report(&conn, &report, &ReportContext::default(), &mut sink).unwrap();
        assert_eq!(outcome.status, ReportStatus::Completed);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(sink.rows_of_kind(RowKind::Banner { level: 0 }).len(), CUSTOMERS.len());
    }

    #[test]
    fn test_demo_store_sales_plan_widest_account() {
        let (_dir, conn) = test_db();
        insert_demo_data(&conn, 3).unwrap();
        let report = ReportKind::StoreSales.resolve(&last_120_days()).unwrap();
        let mut sink = MemorySink::new();
        let outcome =
            crate::reports::run_report(&conn, &report, &ReportContext::default(), &mut sink).unwrap();
        assert_eq!(outcome.rejected_rows, 0);
        let header = sink.rows_of_kind(RowKind::Header).remove(0);
        // Item, four store columns, total units, on hand, weeks of supply
        assert_eq!(header.cells.len(), 1 + 4 + 3);
    }
}
