use std::path::PathBuf;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::json;
use se3_pipeline::{
    apply_env_overrides, init_logging, location_csv_env_key, log_app_start,
    logging_config_from_env, pipeline_config_from_env, se3_locations, weighted_csv_weather,
    write_table_csv, CsvTableSource, FeatureMatrix, FeatureStore, FetchWindow, Pipeline,
    PipelineConfig, TableSource,
};
use tracing::{info, warn};

#[derive(Default, Debug, Clone, Copy)]
struct Totals {
    months: u64,
    months_failed: u64,
    rows_written: u64,
    cells_written: u64,
    values_repaired: u64,
    values_clipped: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_cfg = logging_config_from_env();
    init_logging(&log_cfg)?;
    log_app_start(&log_cfg);

    let cfg = match std::env::var("SE3_PIPELINE_CONFIG") {
        Ok(path) => apply_env_overrides(PipelineConfig::from_json_file(path)?),
        Err(_) => pipeline_config_from_env(),
    };
    let pipeline = Pipeline::new(cfg)?;
    let tz = pipeline.config().source_timezone;

    let market = CsvTableSource::new("market", required_path("SE3_MARKET_CSV")?);
    let weather = weather_source();
    let store_path = std::env::var("SE3_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/se3_features.sqlite"));
    if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut store = FeatureStore::open(&store_path)?;

    let start = parse_date("SE3_BACKFILL_START")?
        .ok_or("SE3_BACKFILL_START is required (YYYY-MM-DD)")?;
    let end_exclusive = match parse_date("SE3_BACKFILL_END")? {
        Some(end) => end,
        None => Utc::now().with_timezone(&tz).date_naive(),
    };
    let range = FetchWindow::new(start, end_exclusive)?;

    let warmup_days = u64::from(pipeline.config().features.max_history_hours().div_ceil(24));
    info!(
        component = "feature_backfill",
        event = "backfill.start",
        start = %range.start,
        end_exclusive = %range.end_exclusive,
        warmup_days,
        store = %store_path.display()
    );

    let mut totals = Totals::default();
    for month in range.monthly() {
        totals.months += 1;
        let result = run_month(&pipeline, &market, weather.as_deref(), &month, warmup_days, tz)
            .and_then(|output| {
                let cells = store.write_matrix(&output.0)?;
                Ok((output, cells))
            });
        match result {
            Ok(((matrix, repaired, clipped), cells)) => {
                totals.rows_written += matrix.table.len() as u64;
                totals.cells_written += cells;
                totals.values_repaired += repaired;
                totals.values_clipped += clipped;
                info!(
                    component = "feature_backfill",
                    event = "backfill.month_done",
                    month_start = %month.start,
                    rows = matrix.table.len(),
                    cells
                );
            }
            Err(err) => {
                totals.months_failed += 1;
                warn!(
                    component = "feature_backfill",
                    event = "backfill.month_failed",
                    month_start = %month.start,
                    error = %err
                );
            }
        }
    }

    if let Ok(output_csv) = std::env::var("SE3_OUTPUT_CSV") {
        let table = store.read_matrix(
            local_midnight(range.start, tz)?,
            local_midnight(range.end_exclusive, tz)?,
        )?;
        write_table_csv(&table, &output_csv, pipeline.config().display_timezone)?;
        info!(
            component = "feature_backfill",
            event = "backfill.csv_exported",
            path = %output_csv,
            rows = table.len()
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "start": range.start.to_string(),
            "end_exclusive": range.end_exclusive.to_string(),
            "store": store_path.display().to_string(),
            "months": totals.months,
            "months_failed": totals.months_failed,
            "rows_written": totals.rows_written,
            "cells_written": totals.cells_written,
            "values_repaired": totals.values_repaired,
            "values_clipped": totals.values_clipped,
            "store_rows": store.row_count()?,
        }))?
    );

    if totals.months_failed == totals.months && totals.months > 0 {
        return Err("every month failed; see backfill.month_failed events".into());
    }
    Ok(())
}

type MonthOutput = (FeatureMatrix, u64, u64);

/// Fetches the month plus warm-up history so lag and rolling features are
/// populated from the first hour, then keeps only the month's own rows.
fn run_month(
    pipeline: &Pipeline,
    market: &CsvTableSource,
    weather: Option<&dyn TableSource>,
    month: &FetchWindow,
    warmup_days: u64,
    tz: Tz,
) -> Result<MonthOutput, Box<dyn std::error::Error>> {
    let fetch_start = month
        .start
        .checked_sub_days(Days::new(warmup_days))
        .unwrap_or(month.start);
    let fetch = FetchWindow::new(fetch_start, month.end_exclusive)?;

    let market_raw = market.fetch(&fetch)?;
    let weather_raw = match weather {
        Some(source) => match source.fetch(&fetch) {
            Ok(table) => Some(table),
            Err(err) => {
                warn!(
                    component = "feature_backfill",
                    event = "backfill.weather_unavailable",
                    source_name = source.name(),
                    month_start = %month.start,
                    error = %err
                );
                None
            }
        },
        None => None,
    };

    let output = pipeline.run(market_raw, weather_raw)?;
    let cleaning = &output.report.cleaning;
    let repaired = cleaning.repair.total_interpolated()
        + cleaning.repair.total_forward_filled()
        + cleaning.repair.total_edge_filled();
    let clipped = cleaning.outliers.total_clipped();

    let table = output.features.table.slice_range(
        local_midnight(month.start, tz)?,
        local_midnight(month.end_exclusive, tz)?,
    );
    Ok((
        FeatureMatrix {
            table,
            schema: output.features.schema,
        },
        repaired,
        clipped,
    ))
}

/// `SE3_WEATHER_CSV` holds an already aggregated zone table. Without it,
/// per-location files (`SE3_WEATHER_CSV_STOCKHOLM`, ...) are weighted into one.
fn weather_source() -> Option<Box<dyn TableSource>> {
    if let Ok(path) = std::env::var("SE3_WEATHER_CSV") {
        return Some(Box::new(CsvTableSource::new("weather", path)));
    }
    let source = weighted_csv_weather(se3_locations(), |location| {
        std::env::var(location_csv_env_key(location))
            .ok()
            .map(PathBuf::from)
    })?;
    Some(Box::new(source))
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, String> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("no local midnight for {date} in {tz}"))
}

fn required_path(key: &str) -> Result<PathBuf, String> {
    std::env::var(key)
        .map(PathBuf::from)
        .map_err(|_| format!("{key} is required"))
}

fn parse_date(key: &str) -> Result<Option<NaiveDate>, String> {
    match std::env::var(key) {
        Ok(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|err| format!("{key}='{raw}' is not YYYY-MM-DD: {err}")),
        Err(_) => Ok(None),
    }
}
