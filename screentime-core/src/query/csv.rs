//! CSV encoding of result sets
//!
//! Output is a header record followed by one record per row, each ending in
//! `\n`. Fields holding the delimiter, a quote, a line break, or leading
//! whitespace are quoted with embedded quotes doubled.

use super::{ResultSet, Row};
use crate::error::Result;

const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Serialize a result set, consuming its rows in order.
///
/// The first row error aborts serialization; no partial output is returned.
pub fn serialize<I>(result_set: ResultSet<I>) -> Result<String>
where
    I: Iterator<Item = Result<Row>>,
{
    let (columns, rows) = result_set.into_parts();
    let mut writer = CsvWriter::default();
    writer.write_record(&columns[..]);

    let mut fields = Vec::with_capacity(columns.len());
    for row in rows {
        let row = row?;
        fields.clear();
        fields.extend(row.iter().map(ToString::to_string));
        writer.write_record(&fields[..]);
    }

    Ok(writer.finish())
}

#[derive(Debug, Default)]
struct CsvWriter {
    out: String,
}

impl CsvWriter {
    fn write_record<S: AsRef<str>>(&mut self, fields: &[S]) {
        // A lone empty field would otherwise be a blank line.
        if let [only] = fields {
            if only.as_ref().is_empty() {
                self.out.push_str("\"\"\n");
                return;
            }
        }

        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.out.push(DELIMITER);
            }
            self.write_field(field.as_ref());
        }
        self.out.push('\n');
    }

    fn write_field(&mut self, field: &str) {
        if !needs_quotes(field) {
            self.out.push_str(field);
            return;
        }

        self.out.push(QUOTE);
        for c in field.chars() {
            if c == QUOTE {
                self.out.push(QUOTE);
            }
            self.out.push(c);
        }
        self.out.push(QUOTE);
    }

    fn finish(self) -> String {
        self.out
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains([DELIMITER, QUOTE, '\r', '\n']) || field.starts_with([' ', '\t'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::query::{CellValue, MemoryResultSet};

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Minimal RFC 4180 reader: quoted fields, doubled quotes, `\n` records
    fn parse(input: &str) -> Vec<Vec<String>> {
        let mut records = Vec::new();
        let mut record = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match (quoted, c) {
                (true, '"') if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                (true, '"') => quoted = false,
                (true, c) => field.push(c),
                (false, '"') => quoted = true,
                (false, ',') => record.push(std::mem::take(&mut field)),
                (false, '\n') => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                (false, c) => field.push(c),
            }
        }
        assert!(!quoted, "unterminated quoted field");
        assert!(field.is_empty() && record.is_empty(), "missing final newline");
        records
    }

    #[test]
    fn test_output_parses_back() {
        let rows = vec![
            vec![
                CellValue::Text("a,b".into()),
                CellValue::Text("say \"hi\"".into()),
                CellValue::Text("two\nlines".into()),
            ],
            vec![
                CellValue::Null,
                CellValue::Integer(-7),
                CellValue::Text(" padded".into()),
            ],
            vec![
                CellValue::Float(2.5),
                CellValue::Boolean(true),
                CellValue::Binary(b"raw,bytes".to_vec()),
            ],
        ];
        let expected: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();
        let rs = MemoryResultSet::from_rows(columns(&["first", "sec\"ond", "th,ird"]), rows);

        let records = parse(&serialize(rs).unwrap());

        assert_eq!(records.len(), 4);
        assert_eq!(records[0], columns(&["first", "sec\"ond", "th,ird"]));
        assert_eq!(&records[1..], &expected[..]);
    }

    #[test]
    fn test_header_and_rows() {
        let rs = MemoryResultSet::from_rows(
            columns(&["n", "name"]),
            vec![
                vec![CellValue::Integer(1), CellValue::Text("alpha".into())],
                vec![CellValue::Integer(2), CellValue::Text("beta".into())],
            ],
        );
        assert_eq!(serialize(rs).unwrap(), "n,name\n1,alpha\n2,beta\n");
    }

    #[test]
    fn test_zero_rows_is_header_only() {
        let rs = MemoryResultSet::from_rows(columns(&["a", "b"]), vec![]);
        let out = serialize(rs).unwrap();
        assert_eq!(out, "a,b\n");
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_null_and_binary_cells() {
        let rs = MemoryResultSet::from_rows(
            columns(&["a", "b", "c"]),
            vec![vec![
                CellValue::Null,
                CellValue::Binary(b"blob text".to_vec()),
                CellValue::Boolean(false),
            ]],
        );
        assert_eq!(serialize(rs).unwrap(), "a,b,c\n,blob text,false\n");
    }

    #[test]
    fn test_quoting() {
        let rs = MemoryResultSet::from_rows(
            columns(&["x"]),
            vec![
                vec![CellValue::Text("a,b".into())],
                vec![CellValue::Text("say \"hi\"".into())],
                vec![CellValue::Text("two\nlines".into())],
                vec![CellValue::Text(" padded".into())],
            ],
        );
        assert_eq!(
            serialize(rs).unwrap(),
            "x\n\"a,b\"\n\"say \"\"hi\"\"\"\n\"two\nlines\"\n\" padded\"\n"
        );
    }

    #[test]
    fn test_lone_empty_field_keeps_its_line() {
        let rs = MemoryResultSet::from_rows(columns(&["x"]), vec![vec![CellValue::Null]]);
        let out = serialize(rs).unwrap();
        assert_eq!(out, "x\n\"\"\n");
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn test_row_error_returns_no_output() {
        let rows = vec![
            Ok(vec![CellValue::Integer(1)]),
            Err(Error::ResultSet(rusqlite::Error::InvalidColumnIndex(3))),
            Ok(vec![CellValue::Integer(2)]),
        ];
        let rs = ResultSet::new(columns(&["n"]), rows.into_iter());
        let err = serialize(rs).unwrap_err();
        assert!(matches!(err, Error::ResultSet(_)));
    }
}
