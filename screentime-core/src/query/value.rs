//! Typed cell values read from a result row

use rusqlite::types::ValueRef;
use std::fmt;

/// How a column's values should be interpreted beyond SQLite's storage class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnKind {
    /// Declared `BOOLEAN`/`BOOL`; integers read as booleans
    Boolean,
    #[default]
    Plain,
}

impl ColumnKind {
    /// Classify a column from its declared type
    pub fn from_decl_type(decl_type: Option<&str>) -> Self {
        match decl_type {
            Some(t) if t.eq_ignore_ascii_case("boolean") || t.eq_ignore_ascii_case("bool") => {
                ColumnKind::Boolean
            }
            _ => ColumnKind::Plain,
        }
    }
}

/// A single cell of a result row
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Binary(Vec<u8>),
}

impl CellValue {
    /// Convert an engine value, using `kind` to recover booleans
    pub fn from_sql(value: ValueRef<'_>, kind: ColumnKind) -> Self {
        match (value, kind) {
            (ValueRef::Null, _) => CellValue::Null,
            (ValueRef::Integer(i), ColumnKind::Boolean) => CellValue::Boolean(i != 0),
            (ValueRef::Integer(i), ColumnKind::Plain) => CellValue::Integer(i),
            (ValueRef::Real(f), _) => CellValue::Float(f),
            (ValueRef::Text(bytes), _) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            (ValueRef::Blob(bytes), _) => CellValue::Binary(bytes.to_vec()),
        }
    }
}

/// Canonical text form: empty for null, decoded text for binary.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Boolean(b) => write!(f, "{b}"),
            CellValue::Binary(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        assert_eq!(CellValue::Null.to_string(), "");
        assert_eq!(CellValue::Text("abc".into()).to_string(), "abc");
        assert_eq!(CellValue::Integer(-42).to_string(), "-42");
        assert_eq!(CellValue::Float(1.5).to_string(), "1.5");
        assert_eq!(CellValue::Boolean(true).to_string(), "true");
        assert_eq!(CellValue::Binary(b"raw bytes".to_vec()).to_string(), "raw bytes");
    }

    #[test]
    fn test_boolean_columns() {
        assert_eq!(ColumnKind::from_decl_type(Some("BOOLEAN")), ColumnKind::Boolean);
        assert_eq!(ColumnKind::from_decl_type(Some("bool")), ColumnKind::Boolean);
        assert_eq!(ColumnKind::from_decl_type(Some("INTEGER")), ColumnKind::Plain);
        assert_eq!(ColumnKind::from_decl_type(None), ColumnKind::Plain);

        assert_eq!(
            CellValue::from_sql(ValueRef::Integer(0), ColumnKind::Boolean),
            CellValue::Boolean(false)
        );
        assert_eq!(
            CellValue::from_sql(ValueRef::Integer(0), ColumnKind::Plain),
            CellValue::Integer(0)
        );
        assert_eq!(
            CellValue::from_sql(ValueRef::Null, ColumnKind::Boolean),
            CellValue::Null
        );
    }
}
