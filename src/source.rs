//! Row streams and cardinality probes backed by SQLite.

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::error::{ReportError, Result};
use crate::models::{Row, Value};
use crate::plan::CardinalityProbe;

fn value_of(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

fn map_row(row: &rusqlite::Row<'_>, names: &[String]) -> rusqlite::Result<Row> {
    let mut columns = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        columns.push((name.clone(), value_of(row.get_ref(i)?)));
    }
    Ok(Row::from_columns(columns))
}

/// Run `sql` and hand `consume` a lazily fetched row stream. Errors raised
/// while stepping the cursor surface as [`ReportError::RowFetch`] items so the
/// consumer can decide how to wind down.
pub fn stream_query<T>(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    consume: impl FnOnce(&mut dyn Iterator<Item = Result<Row>>) -> Result<T>,
) -> Result<T> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt.query_map(params_from_iter(params.iter()), |r| map_row(r, &names))?;
    let mut rows = rows.map(|r| r.map_err(|e| ReportError::RowFetch(e.to_string())));
    consume(&mut rows)
}

// ---------------------------------------------------------------------------
// Slot pivot
// ---------------------------------------------------------------------------

/// Folds consecutive long-format rows sharing the same key columns into one
/// wide row. Each `(value, stem)` pair moves the row's `value` column to
/// `{stem}_{slot}`.
///
/// Input must be sorted by the key columns. Other columns are taken from the
/// first row of each run. A repeated slot within a run is summed.
pub struct SlotPivot<I> {
    inner: I,
    keys: Vec<String>,
    slot: String,
    values: Vec<(String, String)>,
    pending: Option<Result<Row>>,
}

impl<I> SlotPivot<I>
where
    I: Iterator<Item = Result<Row>>,
{
    pub fn new(inner: I, keys: &[&str], slot: &str, values: &[(&str, &str)]) -> Self {
        Self {
            inner,
            keys: keys.iter().map(|k| k.to_string()).collect(),
            slot: slot.to_string(),
            values: values
                .iter()
                .map(|(v, stem)| (v.to_string(), stem.to_string()))
                .collect(),
            pending: None,
        }
    }

    fn same_keys(&self, a: &Row, b: &Row) -> bool {
        self.keys.iter().all(|k| a.get(k) == b.get(k))
    }

    fn is_pivoted(&self, column: &str) -> bool {
        column == self.slot || self.values.iter().any(|(v, _)| v == column)
    }

    fn fold_into(&self, row: &Row, columns: &mut Vec<(String, Value)>) {
        let slot = row.get(&self.slot).map(Value::as_f64).unwrap_or(0.0) as i64;
        for (value, stem) in &self.values {
            let name = format!("{stem}_{slot}");
            let v = row.get(value).cloned().unwrap_or(Value::Null);
            match columns.iter_mut().find(|(k, _)| *k == name) {
                Some((_, existing)) if !v.is_null() => {
                    *existing = Value::Float(existing.as_f64() + v.as_f64());
                }
                Some(_) => {}
                None => columns.push((name, v)),
            }
        }
    }
}

impl<I> Iterator for SlotPivot<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Result<Row>> {
        let first = match self.pending.take().or_else(|| self.inner.next())? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };

        let mut columns: Vec<(String, Value)> = first
            .columns()
            .filter(|(k, _)| !self.is_pivoted(k))
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.fold_into(&first, &mut columns);

        loop {
            match self.inner.next() {
                None => break,
                Some(Ok(row)) if self.same_keys(&first, &row) => self.fold_into(&row, &mut columns),
                Some(other) => {
                    self.pending = Some(other);
                    break;
                }
            }
        }
        Some(Ok(Row::from_columns(columns)))
    }
}

// ---------------------------------------------------------------------------
// SQL probes
// ---------------------------------------------------------------------------

struct ProbeQuery {
    group: String,
    sql: String,
    params: Vec<Value>,
}

/// Cardinality probes answered by single-value SQL queries. A query returning
/// no row or NULL means "no data"; groups without a query report no data too.
pub struct SqlProbes<'c> {
    conn: &'c Connection,
    queries: Vec<ProbeQuery>,
}

impl<'c> SqlProbes<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            queries: Vec::new(),
        }
    }

    pub fn with(mut self, group: &str, sql: &str, params: Vec<Value>) -> Self {
        self.queries.push(ProbeQuery {
            group: group.to_string(),
            sql: sql.to_string(),
            params,
        });
        self
    }
}

impl CardinalityProbe for SqlProbes<'_> {
    fn cardinality(&self, group: &str) -> Result<Option<i64>> {
        let Some(q) = self.queries.iter().find(|q| q.group == group) else {
            return Ok(None);
        };
        let failure = |reason: String| ReportError::SchemaProbe {
            group: group.to_string(),
            reason,
        };
        let value = self
            .conn
            .query_row(&q.sql, params_from_iter(q.params.iter()), |r| {
                r.get_ref(0).map(value_of)
            })
            .optional()
            .map_err(|e| failure(e.to_string()))?;
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Int(n)) => Ok(Some(n)),
            Some(Value::Float(f)) if f.fract() == 0.0 => Ok(Some(f as i64)),
            Some(other) => Err(failure(format!("expected an integer, got '{other}'"))),
        }
    }
}
