//! # Tabular run representation
//!
//! Every instrument reader in this crate produces the same shape of output:
//! a [`RunInfo`] holding header metadata as normalized string key/value
//! pairs, plus a [`DataTable`] holding one column per measured channel and
//! one row per sample. Column identities are fixed by each instrument's
//! known file layout and are resolved once at parse time (see
//! [`crate::formats::ChannelLayout`]); nothing downstream ever guesses a
//! column.
//!
//! Tables are column-major `f64` vectors. Missing numeric cells are NaN.
//! An optional timestamp index is derived from a single recorded start time
//! plus a per-row relative elapsed offset.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Errors produced by table construction and access.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// A pushed row did not match the table's column count.
    #[error("row has {got} values but table has {expected} columns")]
    ColumnCount {
        /// Number of columns the table was created with.
        expected: usize,
        /// Number of values in the offending row.
        got: usize,
    },

    /// A column was requested by a name the table does not have.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// A timestamp index did not match the table's row count.
    #[error("time index has {got} entries but table has {expected} rows")]
    IndexLength {
        /// Number of rows in the table.
        expected: usize,
        /// Number of elapsed-time entries supplied.
        got: usize,
    },

    /// I/O error while exporting the table.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error while exporting the table.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Unit of a per-row relative elapsed-time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Elapsed time recorded in seconds (Novocontrol exports).
    Seconds,
    /// Elapsed time recorded in minutes (DVS exports).
    Minutes,
}

impl TimeUnit {
    fn to_duration(self, value: f64) -> Duration {
        let millis = match self {
            TimeUnit::Seconds => value * 1_000.0,
            TimeUnit::Minutes => value * 60_000.0,
        };
        Duration::milliseconds(millis.round() as i64)
    }
}

/// Column-major numeric table with fixed, parse-time-resolved column names.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    timestamps: Option<Vec<NaiveDateTime>>,
}

impl DataTable {
    /// Create an empty table with the given column names.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let columns = vec![Vec::new(); names.len()];
        Self {
            names,
            columns,
            timestamps: None,
        }
    }

    /// Column names in positional order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    /// True when the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// Append one row. The value count must match the column count.
    pub fn push_row(&mut self, row: &[f64]) -> Result<(), TableError> {
        if row.len() != self.names.len() {
            return Err(TableError::ColumnCount {
                expected: self.names.len(),
                got: row.len(),
            });
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(*value);
        }
        Ok(())
    }

    /// Positional index of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Borrow a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|i| self.columns[i].as_slice())
    }

    /// Borrow a column by name, or fail with [`TableError::UnknownColumn`].
    pub fn require_column(&self, name: &str) -> Result<&[f64], TableError> {
        self.column(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    /// One row as a freshly collected vector.
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.n_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| c[index]).collect())
    }

    /// Attach a timestamp index computed from `start` plus per-row elapsed
    /// offsets in the given unit.
    pub fn set_time_index(
        &mut self,
        start: NaiveDateTime,
        elapsed: &[f64],
        unit: TimeUnit,
    ) -> Result<(), TableError> {
        if elapsed.len() != self.n_rows() {
            return Err(TableError::IndexLength {
                expected: self.n_rows(),
                got: elapsed.len(),
            });
        }
        self.timestamps = Some(
            elapsed
                .iter()
                .map(|&offset| start + unit.to_duration(offset))
                .collect(),
        );
        Ok(())
    }

    /// The timestamp index, when one was attached.
    pub fn timestamps(&self) -> Option<&[NaiveDateTime]> {
        self.timestamps.as_deref()
    }

    /// Maximum finite value of a named column. NaN cells are ignored.
    pub fn column_max(&self, name: &str) -> Result<f64, TableError> {
        let values = self.require_column(name)?;
        Ok(values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::max))
    }

    /// Write the table (timestamp index first, when present) as CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut csv = csv::Writer::from_writer(writer);

        let mut header: Vec<String> = Vec::with_capacity(self.names.len() + 1);
        if self.timestamps.is_some() {
            header.push("timestamp".to_string());
        }
        header.extend(self.names.iter().cloned());
        csv.write_record(&header)?;

        for i in 0..self.n_rows() {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            if let Some(times) = &self.timestamps {
                record.push(times[i].format("%Y-%m-%d %H:%M:%S%.3f").to_string());
            }
            for column in &self.columns {
                record.push(format!("{}", column[i]));
            }
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }
}

/// Header metadata from an instrument export.
///
/// Keys are normalized, per-format canonical names (e.g. `dvs_sample_name`);
/// the raw vendor spellings are resolved by each reader. Readers fail with a
/// missing-field error rather than inventing defaults when a required key is
/// absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInfo {
    /// Normalized key → raw string value pairs.
    pub fields: BTreeMap<String, String>,

    /// Run start time, when the format records one.
    pub start_time: Option<NaiveDateTime>,
}

impl RunInfo {
    /// Create an empty metadata set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a normalized key/value pair.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    /// Look up a normalized key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One parsed instrument export: header metadata plus the channel table.
#[derive(Debug, Clone)]
pub struct InstrumentRun {
    /// Header metadata.
    pub info: RunInfo,
    /// Time-indexed numeric channel table.
    pub data: DataTable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_push_and_access() {
        let mut table = DataTable::new(["time", "mass"]);
        table.push_row(&[0.0, 10.0]).unwrap();
        table.push_row(&[1.0, 10.5]).unwrap();

        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column("mass").unwrap(), &[10.0, 10.5]);
        assert_eq!(table.row(1).unwrap(), vec![1.0, 10.5]);
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_row_length_mismatch() {
        let mut table = DataTable::new(["a", "b"]);
        let err = table.push_row(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            TableError::ColumnCount {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_time_index_minutes() {
        let mut table = DataTable::new(["time", "mass"]);
        table.push_row(&[0.0, 1.0]).unwrap();
        table.push_row(&[2.5, 2.0]).unwrap();
        table
            .set_time_index(start(), &[0.0, 2.5], TimeUnit::Minutes)
            .unwrap();

        let times = table.timestamps().unwrap();
        assert_eq!(times[0], start());
        assert_eq!(times[1], start() + Duration::seconds(150));
    }

    #[test]
    fn test_column_max_skips_nan() {
        let mut table = DataTable::new(["t"]);
        table.push_row(&[f64::NAN]).unwrap();
        table.push_row(&[42.0]).unwrap();
        table.push_row(&[7.0]).unwrap();
        assert_eq!(table.column_max("t").unwrap(), 42.0);
    }

    #[test]
    fn test_run_info_json_roundtrip() {
        let mut info = RunInfo::new();
        info.insert("dvs_sample_name", "MOF-303");
        info.start_time = Some(start());

        let json = info.to_json().unwrap();
        let restored = RunInfo::from_json(&json).unwrap();

        assert_eq!(restored.get("dvs_sample_name"), Some("MOF-303"));
        assert_eq!(restored.start_time, Some(start()));
    }

    #[test]
    fn test_csv_export_includes_timestamp_column() {
        let mut table = DataTable::new(["mass"]);
        table.push_row(&[1.5]).unwrap();
        table
            .set_time_index(start(), &[0.0], TimeUnit::Seconds)
            .unwrap();

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("timestamp,mass\n"));
        assert!(text.contains("2021-01-15 09:30:00.000,1.5"));
    }
}
