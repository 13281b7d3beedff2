//! Tabular record sets
//!
//! An ordered, named-column row store used everywhere tabular data crosses a
//! boundary: CSV uploads, extracted feature rows, synthetic rows. Cells are
//! either numeric or text; CSV ingestion goes through a prioritized
//! text-encoding fallback before parsing.

use crate::error::{PipelineError, Result, SchemaError};

/// Encodings attempted, in order, when decoding uploaded bytes.
const ENCODING_PRIORITY: &[&str] = &["utf-8", "utf-8-sig", "latin-1", "windows-1252"];

/// A single cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// An ordered named-column row store
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Append a row; the width must match the column set.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(SchemaError::MalformedRow {
                row: self.rows.len(),
                detail: format!(
                    "expected {} cells, got {}",
                    self.columns.len(),
                    row.len()
                ),
            }
            .into());
        }
        self.rows.push(row);
        Ok(())
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Remove a column if present. Returns whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.columns.remove(idx);
                for row in &mut self.rows {
                    row.remove(idx);
                }
                true
            }
            None => false,
        }
    }

    /// Append a column filled with `default` for every existing row.
    pub fn add_column(&mut self, name: &str, default: Value) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.clone());
        }
    }

    /// Append a column with one value per existing row.
    pub fn add_column_with(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(PipelineError::Internal(format!(
                "column {name:?} has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Reorder (and filter) columns into exactly `order`. Columns not in
    /// `order` are dropped; columns in `order` but absent here produce a
    /// SchemaError listing every missing name, sorted.
    pub fn select(&self, order: &[&str]) -> Result<Table> {
        let mut missing: Vec<String> = order
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(SchemaError::MissingColumns(missing).into());
        }

        let indices: Vec<usize> = order
            .iter()
            .map(|name| self.column_index(name).expect("checked above"))
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(Table {
            columns: order.iter().map(|s| s.to_string()).collect(),
            rows,
        })
    }

    /// Append all rows of `other`; column sets must match exactly.
    pub fn extend(&mut self, other: &Table) -> Result<()> {
        if self.columns != other.columns {
            return Err(PipelineError::Internal(
                "cannot combine tables with differing columns".to_string(),
            ));
        }
        self.rows.extend(other.rows.iter().cloned());
        Ok(())
    }

    /// Decode raw bytes via the encoding priority list, then parse as CSV.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Table> {
        let text = decode_text(bytes, ENCODING_PRIORITY)?;
        Self::from_csv_str(&text)
    }

    pub fn from_csv_str(text: &str) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record?;
            let row = record.iter().map(parse_cell).collect();
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|v| v.as_text()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| PipelineError::Internal(e.to_string()))
    }
}

fn parse_cell(field: &str) -> Value {
    match field.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::Text(field.to_string()),
    }
}

/// Try each encoding in order; first clean decode wins. Surfaces every
/// attempted encoding on failure.
pub fn decode_text(bytes: &[u8], encodings: &[&'static str]) -> Result<String> {
    for &name in encodings {
        match decode_one(bytes, name) {
            Some(text) => return Ok(text),
            None => continue,
        }
    }
    Err(PipelineError::Decoding {
        tried: encodings.to_vec(),
    })
}

fn decode_one(bytes: &[u8], encoding: &str) -> Option<String> {
    match encoding {
        // BOM-prefixed input is deferred to utf-8-sig so the marker does
        // not leak into the first header.
        "utf-8" if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) => None,
        "utf-8" => std::str::from_utf8(bytes).ok().map(|s| s.to_string()),
        "utf-8-sig" => {
            let stripped = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..])?;
            std::str::from_utf8(stripped).ok().map(|s| s.to_string())
        }
        // ISO-8859-1 maps every byte directly to the same code point.
        "latin-1" => Some(bytes.iter().map(|&b| b as char).collect()),
        "windows-1252" => {
            let (text, _, had_errors) =
                encoding_rs::WINDOWS_1252.decode(bytes);
            if had_errors {
                None
            } else {
                Some(text.into_owned())
            }
        }
        _ => None,
    }
}
