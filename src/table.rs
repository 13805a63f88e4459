//! Hourly time-series tables shared by every pipeline stage.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A timestamp as delivered by a source, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawTimestamp {
    /// Wall-clock time with no zone attached.
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl RawTimestamp {
    /// Calendar date as seen on the source's own wall clock.
    pub fn wall_date(&self) -> NaiveDate {
        match self {
            Self::Naive(naive) => naive.date(),
            Self::Aware(dt) => dt.date_naive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("column {column} has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
    #[error("timestamps must be strictly increasing (violation at row {row})")]
    UnsortedTimestamps { row: usize },
}

/// Rows in fetch order, possibly duplicated, unsorted, or zone-naive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    source: String,
    timestamps: Vec<RawTimestamp>,
    columns: Vec<Column>,
}

impl RawTable {
    pub fn new(
        source: impl Into<String>,
        timestamps: Vec<RawTimestamp>,
        columns: Vec<Column>,
    ) -> Result<Self, TableError> {
        validate_columns(timestamps.len(), &columns)?;
        Ok(Self {
            source: source.into(),
            timestamps,
            columns,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[RawTimestamp] {
        &self.timestamps
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_parts(self) -> (String, Vec<RawTimestamp>, Vec<Column>) {
        (self.source, self.timestamps, self.columns)
    }
}

impl From<TimeSeriesTable> for RawTable {
    fn from(table: TimeSeriesTable) -> Self {
        Self {
            source: "normalized".to_string(),
            timestamps: table
                .timestamps
                .iter()
                .map(|ts| RawTimestamp::Aware(ts.fixed_offset()))
                .collect(),
            columns: table.columns,
        }
    }
}

/// Invariant: timestamps are unique and strictly increasing, and every
/// column has exactly one value per timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesTable {
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl TimeSeriesTable {
    pub fn new(timestamps: Vec<DateTime<Utc>>, columns: Vec<Column>) -> Result<Self, TableError> {
        validate_columns(timestamps.len(), &columns)?;
        if let Some(row) = timestamps
            .windows(2)
            .position(|pair| pair[1] <= pair[0])
            .map(|idx| idx + 1)
        {
            return Err(TableError::UnsortedTimestamps { row });
        }
        Ok(Self {
            timestamps,
            columns,
        })
    }

    /// Caller guarantees the invariants checked by [`TimeSeriesTable::new`].
    pub(crate) fn from_parts(timestamps: Vec<DateTime<Utc>>, columns: Vec<Column>) -> Self {
        debug_assert!(timestamps.windows(2).all(|pair| pair[0] < pair[1]));
        debug_assert!(columns.iter().all(|c| c.values.len() == timestamps.len()));
        Self {
            timestamps,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_values(&self, name: &str) -> Option<&[Option<f64>]> {
        self.column(name).map(|c| c.values.as_slice())
    }

    pub(crate) fn column_values_mut(&mut self, name: &str) -> Option<&mut Vec<Option<f64>>> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| &mut c.values)
    }

    /// Replaces the column with the same name, or appends it.
    pub fn set_column(&mut self, column: Column) -> Result<(), TableError> {
        if column.values.len() != self.len() {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.len(),
                found: column.values.len(),
            });
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn value_at(&self, name: &str, row: usize) -> Option<f64> {
        self.column_values(name)
            .and_then(|values| values.get(row).copied().flatten())
    }

    /// Left join on timestamp: every row of `self` is kept, `other`'s
    /// columns are null where `other` has no matching instant.
    pub fn merge_left(&self, other: &TimeSeriesTable) -> Result<TimeSeriesTable, TableError> {
        let existing: HashSet<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        for column in &other.columns {
            if existing.contains(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }

        let index: HashMap<DateTime<Utc>, usize> = other
            .timestamps
            .iter()
            .enumerate()
            .map(|(row, ts)| (*ts, row))
            .collect();
        let rows: Vec<Option<usize>> = self
            .timestamps
            .iter()
            .map(|ts| index.get(ts).copied())
            .collect();

        let mut columns = self.columns.clone();
        for column in &other.columns {
            let values = rows
                .iter()
                .map(|row| row.and_then(|r| column.values[r]))
                .collect();
            columns.push(Column::new(column.name.clone(), values));
        }

        Ok(Self::from_parts(self.timestamps.clone(), columns))
    }

    /// Rows with `start <= ts < end_exclusive`.
    pub fn slice_range(&self, start: DateTime<Utc>, end_exclusive: DateTime<Utc>) -> TimeSeriesTable {
        let from = self.timestamps.partition_point(|ts| *ts < start);
        let to = self.timestamps.partition_point(|ts| *ts < end_exclusive);
        let to = to.max(from);
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.values[from..to].to_vec()))
            .collect();
        Self::from_parts(self.timestamps[from..to].to_vec(), columns)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingStat {
    pub column: String,
    pub count: u64,
    pub percentage: f64,
}

/// Per-column missing counts, only for columns that have any.
pub fn missing_summary(table: &TimeSeriesTable) -> Vec<MissingStat> {
    if table.is_empty() {
        return Vec::new();
    }
    table
        .columns()
        .iter()
        .filter_map(|column| {
            let count = column.missing_count();
            if count == 0 {
                return None;
            }
            let pct = count as f64 / table.len() as f64 * 100.0;
            Some(MissingStat {
                column: column.name.clone(),
                count: count as u64,
                percentage: (pct * 100.0).round() / 100.0,
            })
        })
        .collect()
}

fn validate_columns(rows: usize, columns: &[Column]) -> Result<(), TableError> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(TableError::DuplicateColumn(column.name.clone()));
        }
        if column.values.len() != rows {
            return Err(TableError::LengthMismatch {
                column: column.name.clone(),
                expected: rows,
                found: column.values.len(),
            });
        }
    }
    Ok(())
}
