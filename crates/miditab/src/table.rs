//! A small column-named table with nullable, typed cells.
//!
//! Rows built from heterogeneous MIDI messages do not share a column set.
//! [`Table::push_record`] and [`Table::union`] reconcile them by name and
//! back-fill missing cells with null.

use crate::Result;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

/// A single non-null cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

macro_rules! int_value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

int_value_from!(u8, u16, u32, i8, i16, i32, i64);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Inferred type of a column from its non-null cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Every cell is null
    Empty,
    /// Integers only (nullable)
    Int,
    /// At least one float, otherwise numeric
    Float,
    Text,
    /// Text mixed with numbers
    Mixed,
}

/// Named columns over rows of nullable cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<Value>>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of `name`, appending it (null in every existing row) if absent.
    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// Append one row given as `(column, value)` pairs.
    ///
    /// Columns not yet in the table are added; columns the record does not
    /// mention are null for this row.
    pub fn push_record<I, K>(&mut self, record: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut row: Vec<Option<Value>> = vec![None; self.columns.len()];
        for (name, value) in record {
            let idx = self.ensure_column(name.as_ref());
            if idx >= row.len() {
                row.resize(idx + 1, None);
            }
            row[idx] = Some(value);
        }
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    /// Outer union on column names: rows of `self` first, then `other`'s.
    ///
    /// Columns keep first-appearance order. An empty `self` simply becomes
    /// `other`.
    pub fn union(mut self, other: Table) -> Table {
        if self.columns.is_empty() && self.rows.is_empty() {
            return other;
        }

        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| self.ensure_column(name))
            .collect();

        self.rows.reserve(other.rows.len());
        for other_row in other.rows {
            let mut row: Vec<Option<Value>> = vec![None; self.columns.len()];
            for (cell, &idx) in other_row.into_iter().zip(&mapping) {
                row[idx] = cell;
            }
            self.rows.push(row);
        }

        self
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&Value>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_ref()).collect())
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        let idx = self.column_index(name)?;
        Some(self.type_at(idx))
    }

    fn type_at(&self, idx: usize) -> ColumnType {
        let mut ty = ColumnType::Empty;
        for value in self.rows.iter().filter_map(|row| row[idx].as_ref()) {
            ty = match (ty, value) {
                (ColumnType::Empty, Value::Int(_)) => ColumnType::Int,
                (ColumnType::Empty, Value::Float(_)) => ColumnType::Float,
                (ColumnType::Empty, Value::Text(_)) => ColumnType::Text,
                (ColumnType::Int, Value::Int(_)) => ColumnType::Int,
                (ColumnType::Int | ColumnType::Float, Value::Float(_) | Value::Int(_)) => {
                    ColumnType::Float
                }
                (ColumnType::Text, Value::Text(_)) => ColumnType::Text,
                _ => return ColumnType::Mixed,
            };
        }
        ty
    }

    /// Turn float columns whose values are all whole numbers into integer
    /// columns. Returns the names of the columns that changed.
    pub fn coerce_integral_columns(&mut self) -> Vec<String> {
        let mut coerced = Vec::new();

        for idx in 0..self.columns.len() {
            if self.type_at(idx) != ColumnType::Float {
                continue;
            }

            let integral = self
                .rows
                .iter()
                .filter_map(|row| row[idx].as_ref())
                .all(|v| match v {
                    Value::Float(f) => f.fract() == 0.0 && f.abs() < i64::MAX as f64,
                    _ => true,
                });
            if !integral {
                continue;
            }

            for row in &mut self.rows {
                if let Some(Value::Float(f)) = &row[idx] {
                    let whole = *f as i64;
                    row[idx] = Some(Value::Int(whole));
                }
            }
            coerced.push(self.columns[idx].clone());
        }

        coerced
    }

    /// Write as CSV with a header row; null cells are empty fields.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.columns)?;
        for row in &self.rows {
            csv.write_record(
                row.iter()
                    .map(|cell| cell.as_ref().map(Value::to_string).unwrap_or_default()),
            )?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.write_csv(io::BufWriter::new(file))
    }
}

/// Serializes as a list of records, one map per row, nulls included.
impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&Record {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

struct Record<'a> {
    columns: &'a [String],
    row: &'a [Option<Value>],
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, cell) in self.columns.iter().zip(self.row) {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn note_record(track: i64, tick: i64) -> Vec<(&'static str, Value)> {
        vec![
            ("type", "note_on".into()),
            ("note", 60u8.into()),
            ("track", track.into()),
            ("tick", tick.into()),
        ]
    }

    #[test]
    fn push_record_backfills_new_columns() {
        let mut table = Table::new();
        table.push_record(note_record(0, 0));
        table.push_record(vec![("type", Value::from("set_tempo")), ("tempo", 500_000u32.into())]);

        assert_eq!(table.columns(), &["type", "note", "track", "tick", "tempo"]);
        assert_eq!(table.get(0, "tempo"), None);
        assert_eq!(table.get(1, "note"), None);
        assert_eq!(table.get(1, "tempo"), Some(&Value::Int(500_000)));
    }

    #[test]
    fn union_keeps_both_sides_and_fills_nulls() {
        let mut left = Table::new();
        left.push_record(note_record(0, 10));

        let mut right = Table::new();
        right.push_record(vec![("track", Value::from(1i64)), ("tempo", 400_000u32.into())]);

        let merged = left.union(right);
        assert_eq!(merged.len(), 2);
        assert!(merged.rows().iter().all(|row| row.len() == 5));
        assert_eq!(merged.columns(), &["type", "note", "track", "tick", "tempo"]);
        assert_eq!(merged.get(1, "track"), Some(&Value::Int(1)));
        assert_eq!(merged.get(1, "type"), None);
        assert_eq!(merged.get(0, "tempo"), None);
        assert_eq!(merged.column_type("tempo"), Some(ColumnType::Int));
    }

    #[test]
    fn union_into_empty_is_assignment() {
        let mut right = Table::new();
        right.push_record(note_record(0, 0));
        let merged = Table::new().union(right.clone());
        assert_eq!(merged, right);
    }

    #[test]
    fn column_types() {
        let mut table = Table::new();
        table.push_record(vec![("a", Value::Int(1)), ("b", Value::Float(1.5)), ("c", "x".into())]);
        table.push_record(vec![("a", Value::Int(2)), ("b", Value::Int(2)), ("c", Value::Int(3))]);
        table.push_record(vec![("d", Value::Int(2))]);

        assert_eq!(table.column_type("a"), Some(ColumnType::Int));
        assert_eq!(table.column_type("b"), Some(ColumnType::Float));
        assert_eq!(table.column_type("c"), Some(ColumnType::Mixed));
        assert_eq!(table.column_type("missing"), None);

        let mut sparse = Table::new();
        sparse.push_record(vec![("x", Value::Int(1))]);
        sparse.push_record(vec![("y", Value::Int(1))]);
        assert_eq!(sparse.column_type("x"), Some(ColumnType::Int));
        assert_eq!(sparse.column_type("y"), Some(ColumnType::Int));
    }

    #[test]
    fn integral_float_columns_become_int() {
        let mut table = Table::new();
        table.push_record(vec![("frame_rate", Value::Float(24.0)), ("x", Value::Float(0.5))]);
        table.push_record(vec![("frame_rate", Value::Float(30.0))]);

        let coerced = table.coerce_integral_columns();

        assert_eq!(coerced, vec!["frame_rate".to_string()]);
        assert_eq!(table.column_type("frame_rate"), Some(ColumnType::Int));
        assert_eq!(table.get(1, "frame_rate"), Some(&Value::Int(30)));
        assert_eq!(table.column_type("x"), Some(ColumnType::Float));
        assert_eq!(table.get(0, "x").and_then(Value::as_float), Some(0.5));
        assert_eq!(table.get(0, "frame_rate").and_then(Value::as_float), Some(24.0));
    }

    #[test]
    fn csv_output_leaves_nulls_empty() {
        let mut table = Table::new();
        table.push_record(note_record(0, 0));
        table.push_record(vec![("type", Value::from("set_tempo")), ("tempo", 500_000u32.into())]);

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "type,note,track,tick,tempo\nnote_on,60,0,0,\nset_tempo,,,,500000\n"
        );
    }

    #[test]
    fn serializes_as_records() {
        let mut table = Table::new();
        table.push_record(note_record(1, 5));
        table.push_record(vec![("tempo", Value::from(500_000u32))]);

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json[0]["tick"], 5);
        assert_eq!(json[0]["type"], "note_on");
        assert!(json[1]["type"].is_null());
        assert_eq!(json[1]["tempo"], 500_000);
    }
}
