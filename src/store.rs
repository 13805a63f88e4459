//! Local SQLite store for feature matrices.
//!
//! Tables:
//! - `feature_schema`: a single row with the schema version, fingerprint and
//!   column order of everything written so far
//! - `feature_values`: long format, one row per (timestamp, column), UPSERT on
//!   the pair so re-running a window replaces its values

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::info;

use crate::features::{assert_schema_compatible, FeatureMatrix, SchemaError};
use crate::table::{Column, TableError, TimeSeriesTable};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS feature_schema (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    fingerprint TEXT NOT NULL,
    columns_json TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS feature_values (
    ts_ms_utc INTEGER NOT NULL,
    column_name TEXT NOT NULL,
    value REAL,
    PRIMARY KEY (ts_ms_utc, column_name)
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored schema is incompatible: {0}")]
    Schema(#[from] SchemaError),
    #[error("invalid stored timestamp: {0}")]
    InvalidTimestamp(i64),
    #[error("invalid stored column list: {0}")]
    ColumnList(#[from] serde_json::Error),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<String>,
}

pub struct FeatureStore {
    conn: Connection,
}

impl FeatureStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    pub fn stored_schema(&self) -> Result<Option<StoredSchema>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT version, fingerprint, columns_json FROM feature_schema WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((version, fingerprint, columns_json)) => Ok(Some(StoredSchema {
                version,
                fingerprint,
                columns: serde_json::from_str(&columns_json)?,
            })),
            None => Ok(None),
        }
    }

    /// Upserts every cell of the matrix. Refuses a matrix whose schema
    /// differs from the one already stored.
    pub fn write_matrix(&mut self, matrix: &FeatureMatrix) -> Result<u64, StoreError> {
        let columns = matrix.table.column_names();
        let stored = self.stored_schema()?;
        if let Some(stored) = &stored {
            assert_schema_compatible(stored.version, &stored.fingerprint, &matrix.schema)?;
        }

        let tx = self.conn.transaction()?;
        let merged_columns = match stored {
            Some(stored) => {
                let mut merged = stored.columns;
                for name in &columns {
                    if !merged.contains(name) {
                        merged.push(name.clone());
                    }
                }
                merged
            }
            None => columns.clone(),
        };
        tx.execute(
            "INSERT INTO feature_schema (id, version, fingerprint, columns_json)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET columns_json = excluded.columns_json",
            params![
                matrix.schema.version,
                matrix.schema.fingerprint,
                serde_json::to_string(&merged_columns)?
            ],
        )?;

        let mut cells = 0u64;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO feature_values (ts_ms_utc, column_name, value)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(ts_ms_utc, column_name) DO UPDATE SET value = excluded.value",
            )?;
            for (row, ts) in matrix.table.timestamps().iter().enumerate() {
                let ts_ms = ts.timestamp_millis();
                for column in matrix.table.columns() {
                    stmt.execute(params![ts_ms, column.name, column.values[row]])?;
                    cells += 1;
                }
            }
        }
        tx.commit()?;

        info!(
            component = "store",
            event = "store.matrix_written",
            rows = matrix.table.len(),
            columns = columns.len(),
            cells,
            fingerprint = %matrix.schema.fingerprint
        );
        Ok(cells)
    }

    /// Rows with `start <= ts < end_exclusive`, columns in stored order.
    pub fn read_matrix(
        &self,
        start: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    ) -> Result<TimeSeriesTable, StoreError> {
        let columns = match self.stored_schema()? {
            Some(stored) => stored.columns,
            None => return Ok(TimeSeriesTable::new(Vec::new(), Vec::new())?),
        };

        let mut ts_stmt = self.conn.prepare(
            "SELECT DISTINCT ts_ms_utc FROM feature_values
             WHERE ts_ms_utc >= ?1 AND ts_ms_utc < ?2
             ORDER BY ts_ms_utc",
        )?;
        let ts_ms: Vec<i64> = ts_stmt
            .query_map(
                params![start.timestamp_millis(), end_exclusive.timestamp_millis()],
                |row| row.get(0),
            )?
            .collect::<Result<_, _>>()?;

        let timestamps = ts_ms
            .iter()
            .map(|ms| {
                Utc.timestamp_millis_opt(*ms)
                    .single()
                    .ok_or(StoreError::InvalidTimestamp(*ms))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut values: Vec<Vec<Option<f64>>> = vec![vec![None; ts_ms.len()]; columns.len()];
        let mut cell_stmt = self.conn.prepare(
            "SELECT ts_ms_utc, column_name, value FROM feature_values
             WHERE ts_ms_utc >= ?1 AND ts_ms_utc < ?2",
        )?;
        let cells = cell_stmt.query_map(
            params![start.timestamp_millis(), end_exclusive.timestamp_millis()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            },
        )?;
        for cell in cells {
            let (ms, name, value) = cell?;
            let (Ok(row), Some(col)) = (
                ts_ms.binary_search(&ms),
                columns.iter().position(|c| *c == name),
            ) else {
                continue;
            };
            values[col][row] = value;
        }

        let columns = columns
            .into_iter()
            .zip(values)
            .map(|(name, values)| Column::new(name, values))
            .collect();
        Ok(TimeSeriesTable::new(timestamps, columns)?)
    }

    /// Distinct timestamps stored.
    pub fn row_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT ts_ms_utc) FROM feature_values",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
