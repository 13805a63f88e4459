//! Reindexing onto a gapless hourly grid.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::table::{Column, TimeSeriesTable};

const STEP_MS: i64 = 3_600_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContinuityError {
    #[error("cannot build an hourly grid from an empty table")]
    EmptyTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityReport {
    pub input_rows: u64,
    pub grid_rows: u64,
    pub introduced_rows: u64,
    pub off_grid_rows_dropped: u64,
    pub grid_start: DateTime<Utc>,
    pub grid_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuityEnforcer;

impl ContinuityEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// One row per hour over `[first, last]`. Hours with no input row are
    /// all-null; rows not a whole number of hours from `first` are dropped.
    pub fn enforce(
        &self,
        table: &TimeSeriesTable,
    ) -> Result<(TimeSeriesTable, ContinuityReport), ContinuityError> {
        let (Some(first), Some(last)) = (
            table.timestamps().first().copied(),
            table.timestamps().last().copied(),
        ) else {
            return Err(ContinuityError::EmptyTable);
        };

        let span_ms = (last - first).num_milliseconds();
        let grid_rows = (span_ms / STEP_MS) as usize + 1;
        let grid: Vec<DateTime<Utc>> = (0..grid_rows)
            .map(|k| first + Duration::milliseconds(k as i64 * STEP_MS))
            .collect();

        let mut slots: Vec<Option<usize>> = vec![None; grid_rows];
        let mut off_grid = 0u64;
        for (row, ts) in table.timestamps().iter().enumerate() {
            let offset_ms = (*ts - first).num_milliseconds();
            if offset_ms % STEP_MS != 0 {
                off_grid += 1;
                continue;
            }
            let slot = (offset_ms / STEP_MS) as usize;
            slots[slot] = Some(row);
        }

        let placed = slots.iter().filter(|slot| slot.is_some()).count();
        let columns = table
            .columns()
            .iter()
            .map(|column| {
                let values = slots
                    .iter()
                    .map(|slot| slot.and_then(|row| column.values[row]))
                    .collect();
                Column::new(column.name.clone(), values)
            })
            .collect();

        let report = ContinuityReport {
            input_rows: table.len() as u64,
            grid_rows: grid_rows as u64,
            introduced_rows: (grid_rows - placed) as u64,
            off_grid_rows_dropped: off_grid,
            grid_start: first,
            grid_end: grid[grid_rows - 1],
        };

        if off_grid > 0 {
            warn!(
                component = "continuity",
                event = "continuity.off_grid_dropped",
                off_grid_rows_dropped = off_grid,
                grid_start = %first
            );
        }
        if report.introduced_rows > 0 {
            info!(
                component = "continuity",
                event = "continuity.rows_introduced",
                introduced_rows = report.introduced_rows,
                grid_rows = report.grid_rows
            );
        }

        Ok((TimeSeriesTable::from_parts(grid, columns), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    #[test]
    fn empty_table_is_fatal() {
        let empty = TimeSeriesTable::new(vec![], vec![]).unwrap();
        assert_eq!(
            ContinuityEnforcer::new().enforce(&empty).unwrap_err(),
            ContinuityError::EmptyTable
        );
    }

    #[test]
    fn missing_hours_become_null_rows() {
        let table = TimeSeriesTable::new(
            vec![hour(0), hour(1), hour(4)],
            vec![Column::new("price", vec![Some(1.0), Some(2.0), Some(5.0)])],
        )
        .unwrap();

        let (out, report) = ContinuityEnforcer::new().enforce(&table).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(
            out.column_values("price").unwrap(),
            &[Some(1.0), Some(2.0), None, None, Some(5.0)]
        );
        assert_eq!(report.introduced_rows, 2);
        assert!(out
            .timestamps()
            .windows(2)
            .all(|pair| pair[1] - pair[0] == Duration::hours(1)));
    }

    #[test]
    fn off_grid_rows_are_dropped() {
        let table = TimeSeriesTable::new(
            vec![hour(0), hour(1) + Duration::minutes(30), hour(2)],
            vec![Column::new("price", vec![Some(1.0), Some(9.0), Some(3.0)])],
        )
        .unwrap();

        let (out, report) = ContinuityEnforcer::new().enforce(&table).unwrap();
        assert_eq!(out.column_values("price").unwrap(), &[Some(1.0), None, Some(3.0)]);
        assert_eq!(report.off_grid_rows_dropped, 1);
        assert_eq!(report.introduced_rows, 1);
    }

    #[test]
    fn single_row_yields_single_row_grid() {
        let table = TimeSeriesTable::new(
            vec![hour(7)],
            vec![Column::new("price", vec![Some(1.0)])],
        )
        .unwrap();
        let (out, report) = ContinuityEnforcer::new().enforce(&table).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(report.grid_start, report.grid_end);
    }
}
