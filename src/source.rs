//! Retrieval contract for raw tables and SE3 spatial weather aggregation.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::table::{Column, RawTable, RawTimestamp, TableError};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid fetch window: {0}")]
    InvalidWindow(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{source_name}: no timestamp column (expected one of {expected:?})")]
    MissingTimestampColumn {
        source_name: String,
        expected: Vec<&'static str>,
    },
    #[error("{source_name}: row {row} has unparseable timestamp '{value}'")]
    ParseTimestamp {
        source_name: String,
        row: usize,
        value: String,
    },
    #[error("{source_name}: row {row} column {column} has unparseable value '{value}'")]
    ParseField {
        source_name: String,
        row: usize,
        column: String,
        value: String,
    },
    #[error("weather location {location} has invalid weight {weight}")]
    InvalidWeight { location: String, weight: f64 },
    #[error("{source_name} unavailable: {message}")]
    Unavailable {
        source_name: String,
        message: String,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Local calendar dates `[start, end_exclusive)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end_exclusive: NaiveDate,
}

impl FetchWindow {
    pub fn new(start: NaiveDate, end_exclusive: NaiveDate) -> Result<Self, RetrievalError> {
        if start >= end_exclusive {
            return Err(RetrievalError::InvalidWindow(format!(
                "start {start} must be before end {end_exclusive}"
            )));
        }
        Ok(Self {
            start,
            end_exclusive,
        })
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end_exclusive
    }

    /// Splits the window at calendar month boundaries.
    pub fn monthly(&self) -> Vec<FetchWindow> {
        let mut windows = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end_exclusive {
            let next = first_of_next_month(cursor).min(self.end_exclusive);
            windows.push(FetchWindow {
                start: cursor,
                end_exclusive: next,
            });
            cursor = next;
        }
        windows
    }
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}

/// One capability per data source. Retries and fallbacks are the
/// implementation's business; callers only see the final outcome.
pub trait TableSource {
    fn name(&self) -> &str;

    fn fetch(&self, window: &FetchWindow) -> Result<RawTable, RetrievalError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub weight: f64,
}

impl WeatherLocation {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, weight: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            weight,
        }
    }
}

/// Population-weighted points covering the SE3 bidding zone.
pub fn se3_locations() -> Vec<WeatherLocation> {
    vec![
        WeatherLocation::new("Stockholm", 59.3293, 18.0686, 0.4),
        WeatherLocation::new("Uppsala", 59.8586, 17.6389, 0.2),
        WeatherLocation::new("Västerås", 59.6099, 16.5448, 0.2),
        WeatherLocation::new("Norrköping", 58.5877, 16.1924, 0.2),
    ]
}

/// Weighted mean per timestamp and column over the locations that report a
/// value there; weights are renormalized over those locations. Cells with
/// no reporting location stay missing.
pub fn aggregate_weighted_weather(
    per_location: Vec<(WeatherLocation, RawTable)>,
) -> Result<RawTable, RetrievalError> {
    for (location, _) in &per_location {
        if !location.weight.is_finite() || location.weight <= 0.0 {
            return Err(RetrievalError::InvalidWeight {
                location: location.name.clone(),
                weight: location.weight,
            });
        }
    }

    let weight_sum: f64 = per_location.iter().map(|(l, _)| l.weight).sum();
    if !per_location.is_empty() && (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        warn!(
            component = "weather",
            event = "weather.weights_normalized",
            weight_sum,
            locations = per_location.len()
        );
    }

    let mut order: Vec<RawTimestamp> = Vec::new();
    let mut rows: HashMap<RawTimestamp, usize> = HashMap::new();
    let mut column_names: Vec<String> = Vec::new();
    for (_, table) in &per_location {
        for ts in table.timestamps() {
            if !rows.contains_key(ts) {
                rows.insert(*ts, order.len());
                order.push(*ts);
            }
        }
        for column in table.columns() {
            if !column_names.contains(&column.name) {
                column_names.push(column.name.clone());
            }
        }
    }

    // (weighted sum, weight) per output cell.
    let mut acc: Vec<Vec<(f64, f64)>> = vec![vec![(0.0, 0.0); order.len()]; column_names.len()];
    for (location, table) in &per_location {
        let weight = location.weight / weight_sum;
        let mut seen = vec![false; order.len()];
        for (src_row, ts) in table.timestamps().iter().enumerate() {
            let Some(&row) = rows.get(ts) else {
                continue;
            };
            if std::mem::replace(&mut seen[row], true) {
                continue;
            }
            for column in table.columns() {
                let Some(col) = column_names.iter().position(|c| *c == column.name) else {
                    continue;
                };
                if let Some(value) = column.values[src_row] {
                    let cell = &mut acc[col][row];
                    cell.0 += weight * value;
                    cell.1 += weight;
                }
            }
        }
    }

    let columns = column_names
        .into_iter()
        .zip(acc)
        .map(|(name, cells)| {
            let values = cells
                .into_iter()
                .map(|(sum, w)| if w > 0.0 { Some(sum / w) } else { None })
                .collect();
            Column::new(name, values)
        })
        .collect();

    info!(
        component = "weather",
        event = "weather.aggregated",
        locations = per_location.len(),
        rows = order.len()
    );

    Ok(RawTable::new("weather_se3", order, columns)?)
}

/// Fetches every location and aggregates whatever succeeded. Fails only
/// when no location could be fetched.
pub struct WeightedWeatherSource {
    locations: Vec<(WeatherLocation, Box<dyn TableSource>)>,
}

impl WeightedWeatherSource {
    pub fn new(locations: Vec<(WeatherLocation, Box<dyn TableSource>)>) -> Self {
        Self { locations }
    }
}

impl TableSource for WeightedWeatherSource {
    fn name(&self) -> &str {
        "weather_se3"
    }

    fn fetch(&self, window: &FetchWindow) -> Result<RawTable, RetrievalError> {
        let mut fetched = Vec::with_capacity(self.locations.len());
        let mut last_err = None;
        for (location, source) in &self.locations {
            match source.fetch(window) {
                Ok(table) => fetched.push((location.clone(), table)),
                Err(err) => {
                    warn!(
                        component = "weather",
                        event = "weather.location_failed",
                        location = %location.name,
                        error = %err
                    );
                    last_err = Some(err);
                }
            }
        }

        if fetched.is_empty() {
            return Err(RetrievalError::Unavailable {
                source_name: self.name().to_string(),
                message: last_err
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "no locations configured".to_string()),
            });
        }
        aggregate_weighted_weather(fetched)
    }
}
