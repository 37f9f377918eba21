use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    item TEXT PRIMARY KEY,
    vendor TEXT NOT NULL,
    description TEXT NOT NULL,
    department TEXT NOT NULL,
    unit_cost REAL NOT NULL,
    unit_price REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS order_lines (
    id INTEGER PRIMARY KEY,
    order_date TEXT NOT NULL,
    customer TEXT NOT NULL,
    item TEXT NOT NULL,
    ordered_qty REAL NOT NULL,
    shipped_qty REAL NOT NULL,
    unit_price REAL NOT NULL,
    unit_cost REAL NOT NULL,
    -- stage where the line lost quantity: none, request, allocate or ship
    cut_stage TEXT NOT NULL DEFAULT 'none',
    partial INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (item) REFERENCES items(item)
);

CREATE TABLE IF NOT EXISTS price_tiers (
    item TEXT NOT NULL,
    tier INTEGER NOT NULL,
    min_qty REAL NOT NULL,
    price REAL NOT NULL,
    PRIMARY KEY (item, tier),
    FOREIGN KEY (item) REFERENCES items(item)
);

CREATE TABLE IF NOT EXISTS linked_stores (
    account TEXT NOT NULL,
    store TEXT NOT NULL,
    slot INTEGER NOT NULL,
    PRIMARY KEY (account, store)
);

CREATE TABLE IF NOT EXISTS store_sales (
    id INTEGER PRIMARY KEY,
    sale_date TEXT NOT NULL,
    account TEXT NOT NULL,
    store TEXT NOT NULL,
    item TEXT NOT NULL,
    units REAL NOT NULL,
    FOREIGN KEY (account, store) REFERENCES linked_stores(account, store)
);

CREATE TABLE IF NOT EXISTS inventory (
    account TEXT NOT NULL,
    item TEXT NOT NULL,
    on_hand REAL NOT NULL,
    PRIMARY KEY (account, item)
);

CREATE INDEX IF NOT EXISTS idx_order_lines_sort ON order_lines (customer, item);
CREATE INDEX IF NOT EXISTS idx_store_sales_sort ON store_sales (account, item);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn is_empty(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT count(*) FROM order_lines", [], |row| row.get(0))?;
    Ok(count == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        for expected in ["inventory", "items", "linked_stores", "order_lines", "price_tiers", "store_sales"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
        assert!(is_empty(&conn).unwrap());
    }

    #[test]
    fn test_init_is_idempotent() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO items (item, vendor, description, department, unit_cost, unit_price) \
             VALUES ('I1', 'V1', 'Widget', 'Hardware', 1.0, 2.0)",
            [],
        )
        .unwrap();
        init_db(&conn).unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM items", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let (_dir, conn) = test_db();
        let result = conn.execute(
            "INSERT INTO order_lines (order_date, customer, item, ordered_qty, shipped_qty, unit_price, unit_cost) \
             VALUES ('2025-01-02', 'C1', 'missing', 1, 1, 1, 1)",
            [],
        );
        assert!(result.is_err());
    }
}
