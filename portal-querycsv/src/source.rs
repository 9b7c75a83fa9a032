//! Tabular source files
//!
//! CSV, spreadsheet and JSON sources all converge on [`Tabular`]: a header
//! list plus one [`FlatRecord`] per row. JSON may already be nested, so it is
//! normalized to dotted/indexed keys first and column mapping works the same
//! for every format.

use crate::error::SourceError;
use crate::flat::{scalar_text, FlatRecord};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::Timelike;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Parsed rows with their header order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tabular {
    pub headers: Vec<String>,
    pub rows: Vec<FlatRecord>,
}

impl Tabular {
    pub fn new(headers: Vec<String>, rows: Vec<FlatRecord>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn push_header(&mut self, header: &str) {
        if !self.headers.iter().any(|h| h == header) {
            self.headers.push(header.to_string());
        }
    }
}

/// Source format picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
    Json,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" => Ok(Self::Spreadsheet),
            "json" => Ok(Self::Json),
            _ => Err(SourceError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Read a source file into rows
pub fn read_source(path: &Path) -> Result<Tabular, SourceError> {
    let format = SourceFormat::from_path(path)?;
    let io_error = |source: std::io::Error| SourceError::Io {
        path: path.to_path_buf(),
        source,
    };

    let tabular = match format {
        SourceFormat::Csv => read_csv(File::open(path).map_err(io_error)?)?,
        SourceFormat::Spreadsheet => read_spreadsheet(path)?,
        SourceFormat::Json => {
            let mut text = String::new();
            File::open(path).map_err(io_error)?.read_to_string(&mut text).map_err(io_error)?;
            read_json(&text)?
        }
    };

    tracing::debug!(
        path = %path.display(),
        format = ?format,
        rows = tabular.len(),
        columns = tabular.headers.len(),
        "Read tabular source"
    );
    Ok(tabular)
}

/// Delimited text with a header row
pub fn read_csv<R: Read>(reader: R) -> Result<Tabular, SourceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let row: FlatRecord = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), Value::String(record.get(i).unwrap_or_default().to_string())))
            .collect();
        rows.push(row);
    }

    Ok(Tabular::new(headers, rows))
}

/// First worksheet, first row as header
pub fn read_spreadsheet(path: &Path) -> Result<Tabular, SourceError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| SourceError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SourceError::EmptyWorkbook)?
        .map_err(|e| SourceError::Spreadsheet(e.to_string()))?;

    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        return Ok(Tabular::default());
    };
    let headers: Vec<String> = header_row.iter().map(|c| cell_text(c).trim().to_string()).collect();

    let mut rows = Vec::new();
    for cells in rows_iter {
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        let row: FlatRecord = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(i, header)| {
                let text = cells.get(i).map(cell_text).unwrap_or_default();
                (header.clone(), Value::String(text))
            })
            .collect();
        rows.push(row);
    }

    Ok(Tabular::new(headers.into_iter().filter(|h| !h.is_empty()).collect(), rows))
}

/// Spreadsheet cell as text; empty and error cells become ""
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.num_seconds_from_midnight() == 0 => dt.format("%Y-%m-%d").to_string(),
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => String::new(),
        },
    }
}

/// Array of JSON records, normalized to flat keys
pub fn read_json(text: &str) -> Result<Tabular, SourceError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(records) = value else {
        return Err(SourceError::JsonShape);
    };

    let mut tabular = Tabular::default();
    for record in records {
        let Value::Object(map) = record else {
            return Err(SourceError::JsonShape);
        };

        let mut row = FlatRecord::new();
        normalize_object("", &map, &mut row);
        for key in row.keys() {
            tabular.push_header(key);
        }
        tabular.rows.push(row);
    }

    Ok(tabular)
}

fn normalize_object(prefix: &str, map: &Map<String, Value>, row: &mut FlatRecord) {
    for (key, value) in map {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Object(inner) => normalize_object(&key, inner, row),
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Object(inner) = item {
                        normalize_object(&format!("{}[{}]", key, i), inner, row);
                    }
                }
            }
            Value::Null => {
                row.insert(key, Value::String(String::new()));
            }
            other => {
                row.insert(key, other.clone());
            }
        }
    }
}

/// Write headers and rows as CSV
pub fn write_csv_to<W: Write>(writer: W, headers: &[String], rows: &[FlatRecord]) -> Result<(), SourceError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(headers)?;

    for row in rows {
        writer.write_record(headers.iter().map(|h| row.get(h).map(scalar_text).unwrap_or_default()))?;
    }

    writer.flush().map_err(|e| SourceError::Csv(e.into()))?;
    Ok(())
}

pub fn write_csv(path: &Path, headers: &[String], rows: &[FlatRecord]) -> Result<(), SourceError> {
    let io_error = |source: std::io::Error| SourceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    write_csv_to(File::create(path).map_err(io_error)?, headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_csv_trims_headers() {
        let data = " name , tags[0].name\nChess,x\nGo,\n";
        let tabular = read_csv(data.as_bytes()).unwrap();

        assert_eq!(tabular.headers, vec!["name", "tags[0].name"]);
        assert_eq!(tabular.len(), 2);
        assert_eq!(tabular.rows[0]["tags[0].name"], json!("x"));
        assert_eq!(tabular.rows[1]["tags[0].name"], json!(""));
    }

    #[test]
    fn test_read_csv_keeps_quoted_commas() {
        let data = "roles\n\"one,two,\"\"three, four\"\"\"\n";
        let tabular = read_csv(data.as_bytes()).unwrap();
        assert_eq!(tabular.rows[0]["roles"], json!("one,two,\"three, four\""));
    }

    #[test]
    fn test_read_json_normalizes_nesting() {
        let text = r#"[
            {"name": "Chess", "contact": {"phone": "123"}, "officers": [{"email": "a@x"}, {"email": "b@x"}], "roles": ["a", "b"]},
            {"name": "Go", "note": null}
        ]"#;

        let tabular = read_json(text).unwrap();
        assert_eq!(tabular.len(), 2);
        assert_eq!(tabular.rows[0]["contact.phone"], json!("123"));
        assert_eq!(tabular.rows[0]["officers[1].email"], json!("b@x"));
        assert_eq!(tabular.rows[0]["roles"], json!(["a", "b"]));
        assert_eq!(tabular.rows[1]["note"], json!(""));
        assert!(tabular.headers.contains(&"note".to_string()));
    }

    #[test]
    fn test_read_json_rejects_non_records() {
        assert!(matches!(read_json("{\"a\": 1}"), Err(SourceError::JsonShape)));
        assert!(matches!(read_json("[1, 2]"), Err(SourceError::JsonShape)));
        assert!(matches!(read_json("not json"), Err(SourceError::Json(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = read_source(Path::new("upload.txt")).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_write_then_read_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("rows.csv");

        let headers = vec!["name".to_string(), "roles".to_string()];
        let rows = vec![json!({"name": "Chess", "roles": ["a", "b, c"]}).as_object().unwrap().clone()];
        write_csv(&path, &headers, &rows).unwrap();

        let tabular = read_source(&path).unwrap();
        assert_eq!(tabular.headers, headers);
        assert_eq!(tabular.rows[0]["roles"], json!("a, \"b, c\""));
    }
}
