//! SQLite access.
//!
//! Connections are short-lived: every operation opens, does its work inside
//! a transaction where it writes, and drops the connection.

use std::path::Path;

use log::debug;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};

use polars::prelude::{Column, DataType};

use crate::domain::frame::{self, DataFrame};
use crate::error::AppError;

/// Index rebuilt after a table is replaced.
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Open (creating if needed) the warehouse for writing.
pub fn open_rw(path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::storage(format!("Failed to create directory '{}': {e}", parent.display()))
        })?;
    }
    Connection::open(path)
        .map_err(|e| AppError::storage(format!("Failed to open warehouse '{}': {e}", path.display())))
}

/// Open an existing warehouse read-only. `Ok(None)` when the file does not exist.
pub fn open_ro(path: &Path) -> Result<Option<Connection>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        .map(Some)
        .map_err(|e| AppError::storage(format!("Failed to open warehouse '{}': {e}", path.display())))
}

/// Double-quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn storage_err(context: &str) -> impl FnOnce(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::storage(format!("{context}: {e}"))
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, AppError> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .map_err(storage_err("Failed to inspect schema"))
}

/// Column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, AppError> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn.prepare(&sql).map_err(storage_err("Failed to inspect table"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(storage_err("Failed to inspect table"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err("Failed to inspect table"))?;
    Ok(names)
}

pub fn index_names(conn: &Connection, table: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 ORDER BY name")
        .map_err(storage_err("Failed to list indexes"))?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))
        .map_err(storage_err("Failed to list indexes"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err("Failed to list indexes"))?;
    Ok(names)
}

/// Drop `table` if present. Returns whether it existed.
pub fn drop_table(conn: &Connection, table: &str) -> Result<bool, AppError> {
    let existed = table_exists(conn, table)?;
    if existed {
        conn.execute(&format!("DROP TABLE {}", quote_ident(table)), [])
            .map_err(storage_err("Failed to drop table"))?;
        debug!("dropped table {table}");
    }
    Ok(existed)
}

/// Drop `table`, recreate it from the frame's schema, insert every row and
/// rebuild `indexes`, all in one transaction. Returns the rows written.
pub fn replace_table(
    conn: &mut Connection,
    table: &str,
    frame: &DataFrame,
    indexes: &[IndexSpec],
) -> Result<usize, AppError> {
    if frame.width() == 0 {
        return Err(AppError::storage(format!("Refusing to create table '{table}' with no columns")));
    }

    let tx = conn.transaction().map_err(storage_err("Failed to begin transaction"))?;
    let qtable = quote_ident(table);

    tx.execute(&format!("DROP TABLE IF EXISTS {qtable}"), [])
        .map_err(storage_err("Failed to drop table"))?;

    let defs: Vec<String> = frame
        .get_columns()
        .iter()
        .map(|c| {
            let ty = if frame::is_real(c) { "REAL" } else { "TEXT" };
            format!("{} {ty}", quote_ident(c.name()))
        })
        .collect();
    tx.execute(&format!("CREATE TABLE {qtable} ({})", defs.join(", ")), [])
        .map_err(storage_err("Failed to create table"))?;

    let names: Vec<String> = frame.get_columns().iter().map(|c| quote_ident(c.name())).collect();
    let cells = frame
        .get_columns()
        .iter()
        .map(column_cells)
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let insert = format!(
        "INSERT INTO {qtable} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    );

    {
        let mut stmt = tx.prepare(&insert).map_err(storage_err("Failed to prepare insert"))?;
        for row in 0..frame.height() {
            let values = cells.iter().map(|c| c.value(row));
            stmt.execute(params_from_iter(values))
                .map_err(storage_err("Failed to insert row"))?;
        }
    }

    for idx in indexes {
        let cols: Vec<String> = idx.columns.iter().map(|c| quote_ident(c)).collect();
        tx.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {} ON {qtable}({})",
                quote_ident(idx.name),
                cols.join(", ")
            ),
            [],
        )
        .map_err(storage_err("Failed to create index"))?;
    }

    tx.commit().map_err(storage_err("Failed to commit table replacement"))?;
    debug!("replaced table {table}: {} rows", frame.height());
    Ok(frame.height())
}

/// A column's cells, materialized once for row-wise inserts.
enum Cells {
    Real(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Cells {
    fn value(&self, row: usize) -> Value {
        match self {
            Cells::Real(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Real),
            Cells::Text(v) => v.get(row).cloned().flatten().map_or(Value::Null, Value::Text),
        }
    }
}

fn column_cells(column: &Column) -> Result<Cells, AppError> {
    let err = |e: polars::error::PolarsError| {
        AppError::storage(format!("Failed to read column '{}': {e}", column.name()))
    };
    if frame::is_real(column) {
        return Ok(Cells::Real(column.f64().map_err(err)?.into_iter().collect()));
    }
    let text = column.cast(&DataType::String).map_err(err)?;
    let values = text.str().map_err(err)?.into_iter().map(|v| v.map(str::to_string)).collect();
    Ok(Cells::Text(values))
}

/// Run a query and collect the result into a polars frame.
///
/// A column becomes `Float64` when every non-null value is an integer or real;
/// anything else is kept as text.
pub fn query_frame<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<DataFrame, AppError> {
    let mut stmt = conn.prepare(sql).map_err(storage_err("Failed to prepare query"))?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let width = names.len();

    let mut cells: Vec<Vec<Value>> = vec![Vec::new(); width];
    let mut rows = stmt.query(params).map_err(storage_err("Failed to run query"))?;
    while let Some(row) = rows.next().map_err(storage_err("Failed to read row"))? {
        for (i, col) in cells.iter_mut().enumerate() {
            let v = row.get_ref(i).map_err(storage_err("Failed to read cell"))?;
            col.push(owned_value(v));
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, values)| column_from_values(&name, values))
        .collect();
    frame::frame_from(columns).map_err(AppError::storage)
}

fn owned_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

fn column_from_values(name: &str, values: Vec<Value>) -> Column {
    let numeric = values
        .iter()
        .all(|v| matches!(v, Value::Null | Value::Integer(_) | Value::Real(_)));
    let any_value = values.iter().any(|v| !matches!(v, Value::Null));

    if numeric && any_value {
        frame::real_column(
            name,
            values
                .into_iter()
                .map(|v| match v {
                    Value::Integer(i) => Some(i as f64),
                    Value::Real(f) => Some(f),
                    _ => None,
                })
                .collect(),
        )
    } else {
        frame::text_column(
            name,
            values
                .into_iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::Integer(i) => Some(i.to_string()),
                    Value::Real(f) => Some(f.to_string()),
                    Value::Text(s) => Some(s),
                    Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
                })
                .collect(),
        )
    }
}

/// Distinct non-null values of `column`, sorted.
pub fn distinct_text(conn: &Connection, table: &str, column: &str) -> Result<Vec<String>, AppError> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM {tbl} WHERE {col} IS NOT NULL ORDER BY {col}",
        col = quote_ident(column),
        tbl = quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql).map_err(storage_err("Failed to prepare query"))?;
    let values = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(storage_err("Failed to run query"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err("Failed to read row"))?;
    Ok(values)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<usize, AppError> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n.max(0) as usize)
    .map_err(storage_err("Failed to count rows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        frame::frame_from(vec![
            frame::text_column("Data", vec![Some("2022-01-01".into()), Some("2022-02-01".into())]),
            frame::real_column("Preço \"médio\"", vec![Some(10.5), None]),
        ])
        .unwrap()
    }

    #[test]
    fn replace_table_round_trips_through_query_frame() {
        let mut conn = Connection::open_in_memory().unwrap();
        let idx = [IndexSpec {
            name: "idx_t",
            columns: &["Data"],
        }];
        assert_eq!(replace_table(&mut conn, "t", &sample(), &idx).unwrap(), 2);
        // Second replacement must not duplicate rows.
        assert_eq!(replace_table(&mut conn, "t", &sample(), &idx).unwrap(), 2);

        assert!(table_exists(&conn, "t").unwrap());
        assert_eq!(count_rows(&conn, "t").unwrap(), 2);
        assert_eq!(index_names(&conn, "t").unwrap(), vec!["idx_t"]);
        assert_eq!(table_columns(&conn, "t").unwrap(), vec!["Data", "Preço \"médio\""]);

        let back = query_frame(&conn, "SELECT * FROM t ORDER BY Data", rusqlite::params![]).unwrap();
        assert_eq!(frame::real_values(&back, "Preço \"médio\"").unwrap(), vec![Some(10.5), None]);
        assert_eq!(frame::text_values(&back, "Data").unwrap()[1].as_deref(), Some("2022-02-01"));
    }

    #[test]
    fn missing_file_opens_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_ro(&dir.path().join("absent.db")).unwrap().is_none());
    }
}
