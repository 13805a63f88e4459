//! Headered CSV input and output for raw and normalized tables.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{debug, info};

use crate::source::{
    FetchWindow, RetrievalError, TableSource, WeatherLocation, WeightedWeatherSource,
};
use crate::table::{Column, RawTable, RawTimestamp, TimeSeriesTable};

const TIMESTAMP_HEADERS: [&str; 4] = ["timestamp", "time", "datetime", "date"];
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M%:z"];

pub fn read_raw_table(path: impl AsRef<Path>, source_name: &str) -> Result<RawTable, RetrievalError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| RetrievalError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = read_raw_table_from(file, source_name)?;
    info!(
        component = "csv",
        event = "csv.table_read",
        source_name,
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len()
    );
    Ok(table)
}

/// First column whose header names a timestamp is the index; every other
/// column is numeric.
pub fn read_raw_table_from<R: Read>(reader: R, source_name: &str) -> Result<RawTable, RetrievalError> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();
    let ts_idx = headers
        .iter()
        .position(|h| TIMESTAMP_HEADERS.contains(&h.to_ascii_lowercase().as_str()))
        .ok_or_else(|| RetrievalError::MissingTimestampColumn {
            source_name: source_name.to_string(),
            expected: TIMESTAMP_HEADERS.to_vec(),
        })?;

    let value_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != ts_idx)
        .map(|(idx, name)| (idx, name.to_string()))
        .collect();

    let mut timestamps = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); value_columns.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        timestamps.push(parse_record_timestamp(&record, ts_idx, row, source_name)?);
        for (slot, (idx, name)) in values.iter_mut().zip(&value_columns) {
            slot.push(parse_cell(&record, *idx, name, row, source_name)?);
        }
    }

    let columns = value_columns
        .into_iter()
        .zip(values)
        .map(|((_, name), values)| Column::new(name, values))
        .collect();
    Ok(RawTable::new(source_name, timestamps, columns)?)
}

fn parse_record_timestamp(
    record: &StringRecord,
    idx: usize,
    row: usize,
    source_name: &str,
) -> Result<RawTimestamp, RetrievalError> {
    let raw = record.get(idx).unwrap_or_default();
    parse_timestamp(raw).ok_or_else(|| RetrievalError::ParseTimestamp {
        source_name: source_name.to_string(),
        row,
        value: raw.to_string(),
    })
}

fn parse_cell(
    record: &StringRecord,
    idx: usize,
    column: &str,
    row: usize,
    source_name: &str,
) -> Result<Option<f64>, RetrievalError> {
    let raw = record.get(idx).unwrap_or_default();
    if is_missing_marker(raw) {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        Ok(_) => Ok(None),
        Err(_) => Err(RetrievalError::ParseField {
            source_name: source_name.to_string(),
            row,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn is_missing_marker(raw: &str) -> bool {
    matches!(raw, "" | "NaN" | "nan" | "NAN" | "null" | "NULL" | "None" | "NA")
}

/// Offset-carrying strings become aware timestamps, the rest naive wall-clock.
pub fn parse_timestamp(raw: &str) -> Option<RawTimestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(RawTimestamp::Aware(dt));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(RawTimestamp::Aware(dt));
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(RawTimestamp::Naive)
}

/// Reads one CSV file and serves rows whose source wall-clock date falls
/// in the requested window.
#[derive(Debug, Clone)]
pub struct CsvTableSource {
    name: String,
    path: PathBuf,
}

impl CsvTableSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableSource for CsvTableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, window: &FetchWindow) -> Result<RawTable, RetrievalError> {
        let table = read_raw_table(&self.path, &self.name)?;
        let total = table.len();
        let (source, timestamps, columns) = table.into_parts();
        let keep: Vec<bool> = timestamps
            .iter()
            .map(|ts| window.contains_date(ts.wall_date()))
            .collect();

        let timestamps: Vec<RawTimestamp> = timestamps
            .into_iter()
            .zip(&keep)
            .filter_map(|(ts, keep)| keep.then_some(ts))
            .collect();
        let columns = columns
            .into_iter()
            .map(|column| {
                let values = column
                    .values
                    .into_iter()
                    .zip(&keep)
                    .filter_map(|(value, keep)| keep.then_some(value))
                    .collect();
                Column::new(column.name, values)
            })
            .collect();

        debug!(
            component = "csv",
            event = "csv.window_filtered",
            source_name = %self.name,
            start = %window.start,
            end_exclusive = %window.end_exclusive,
            rows_total = total,
            rows_kept = timestamps.len()
        );
        Ok(RawTable::new(source, timestamps, columns)?)
    }
}

/// Environment key holding one location's weather CSV path, e.g.
/// `SE3_WEATHER_CSV_VASTERAS` for Västerås.
pub fn location_csv_env_key(location: &WeatherLocation) -> String {
    let suffix: String = location
        .name
        .chars()
        .map(|c| match c {
            'å' | 'ä' | 'Å' | 'Ä' => 'A',
            'ö' | 'Ö' => 'O',
            c if c.is_ascii_alphanumeric() => c.to_ascii_uppercase(),
            _ => '_',
        })
        .collect();
    format!("SE3_WEATHER_CSV_{suffix}")
}

/// Weighted weather over the locations `path_for` returns a CSV for.
/// `None` when no location has one.
pub fn weighted_csv_weather(
    locations: Vec<WeatherLocation>,
    mut path_for: impl FnMut(&WeatherLocation) -> Option<PathBuf>,
) -> Option<WeightedWeatherSource> {
    let sources: Vec<(WeatherLocation, Box<dyn TableSource>)> = locations
        .into_iter()
        .filter_map(|location| {
            let path = path_for(&location)?;
            let source = CsvTableSource::new(format!("weather_{}", location.name), path);
            Some((location, Box::new(source) as Box<dyn TableSource>))
        })
        .collect();

    if sources.is_empty() {
        return None;
    }
    info!(
        component = "csv",
        event = "csv.weather_locations",
        locations = sources.len()
    );
    Some(WeightedWeatherSource::new(sources))
}

pub fn write_table_csv(
    table: &TimeSeriesTable,
    path: impl AsRef<Path>,
    display_tz: Tz,
) -> Result<(), csv::Error> {
    let file = File::create(path.as_ref())?;
    write_table_csv_to(table, file, display_tz)
}

/// `timestamp` first, rendered as RFC 3339 in `display_tz`; missing values
/// are empty cells.
pub fn write_table_csv_to<W: Write>(
    table: &TimeSeriesTable,
    writer: W,
    display_tz: Tz,
) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    let mut header = vec!["timestamp".to_string()];
    header.extend(table.column_names());
    writer.write_record(&header)?;

    for (row, ts) in table.timestamps().iter().enumerate() {
        let mut record = Vec::with_capacity(table.columns().len() + 1);
        record.push(ts.with_timezone(&display_tz).to_rfc3339());
        for column in table.columns() {
            record.push(column.values[row].map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
