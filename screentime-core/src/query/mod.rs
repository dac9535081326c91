//! Query execution and result serialization
//!
//! A query runs against a live connection and yields a [`ResultSet`]: the
//! column names plus a lazy, consume-once sequence of rows. The rows are
//! streamed straight into the CSV encoder.

pub mod csv;
pub mod value;

pub use value::{CellValue, ColumnKind};

use crate::error::{Error, Result};
use rusqlite::{Connection, Rows};

/// One result row
pub type Row = Vec<CellValue>;

/// Column names plus the rows produced by a query
pub struct ResultSet<I> {
    columns: Vec<String>,
    rows: I,
}

impl<I> ResultSet<I>
where
    I: Iterator<Item = Result<Row>>,
{
    pub fn new(columns: Vec<String>, rows: I) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Split into column names and the row iterator
    pub fn into_parts(self) -> (Vec<String>, I) {
        (self.columns, self.rows)
    }
}

/// Result set over rows already in memory
#[cfg(test)]
pub(crate) type MemoryResultSet =
    ResultSet<std::iter::Map<std::vec::IntoIter<Row>, fn(Row) -> Result<Row>>>;

#[cfg(test)]
impl MemoryResultSet {
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self::new(columns, rows.into_iter().map(Ok as fn(Row) -> Result<Row>))
    }
}

/// Execute `sql` and serialize its result to CSV.
///
/// Preparing the statement and fetching the first row are the execution
/// step and fail with [`Error::Query`]. Failures while reading later rows
/// are [`Error::ResultSet`].
pub fn execute(conn: &Connection, sql: &str) -> Result<String> {
    let mut stmt = conn.prepare(sql).map_err(Error::Query)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let kinds: Vec<ColumnKind> = stmt
        .columns()
        .iter()
        .map(|c| ColumnKind::from_decl_type(c.decl_type()))
        .collect();

    let mut rows = stmt.query([]).map_err(Error::Query)?;
    let first = match rows.next().map_err(Error::Query)? {
        Some(row) => Some(read_row(row, &kinds).map_err(Error::Query)?),
        None => None,
    };

    let rows = SqlRows {
        done: first.is_none(),
        first,
        rows,
        kinds: &kinds,
    };
    csv::serialize(ResultSet::new(columns, rows))
}

fn read_row(row: &rusqlite::Row<'_>, kinds: &[ColumnKind]) -> rusqlite::Result<Row> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| row.get_ref(i).map(|v| CellValue::from_sql(v, *kind)))
        .collect()
}

/// Row iterator over a running statement
struct SqlRows<'stmt, 'k> {
    first: Option<Row>,
    rows: Rows<'stmt>,
    kinds: &'k [ColumnKind],
    done: bool,
}

impl Iterator for SqlRows<'_, '_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.first.take() {
            return Some(Ok(row));
        }
        if self.done {
            return None;
        }

        match self.rows.next() {
            Ok(Some(row)) => Some(read_row(row, self.kinds).map_err(Error::ResultSet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(Error::ResultSet(e)))
            }
        }
    }
}
