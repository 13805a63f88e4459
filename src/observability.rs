//! Shared logging configuration and initialization.

use std::env;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::pipeline::PipelineReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Ok(level) = env::var("SE3_LOG_LEVEL") {
        let trimmed = level.trim();
        if !trimmed.is_empty() {
            config.level = trimmed.to_string();
        }
    }

    if let Ok(format) = env::var("SE3_LOG_FORMAT") {
        if let Some(parsed) = parse_log_format(&format) {
            config.format = parsed;
        }
    }

    if let Ok(include_target) = env::var("SE3_LOG_TARGET") {
        if let Some(parsed) = parse_bool(&include_target) {
            config.include_target = parsed;
        }
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "feature_backfill",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_pipeline_start(market_rows: usize, weather_rows: Option<usize>) {
    match weather_rows {
        Some(weather_rows) => info!(
            component = "pipeline",
            event = "pipeline.run.start",
            market_rows,
            weather_rows
        ),
        None => info!(
            component = "pipeline",
            event = "pipeline.run.start",
            market_rows,
            weather = "absent"
        ),
    }
}

pub fn log_pipeline_finish(report: &PipelineReport, rows: usize, feature_columns: usize) {
    let cleaning = &report.cleaning;
    info!(
        component = "pipeline",
        event = "pipeline.run.finish",
        rows,
        feature_columns,
        duplicates_dropped = report.normalize.iter().map(|n| n.duplicates_dropped).sum::<u64>(),
        invalid_timestamps = report.normalize.iter().map(|n| n.invalid_timestamps).sum::<u64>(),
        rows_introduced = cleaning.continuity.introduced_rows,
        values_invalidated = cleaning.range.total_invalidated(),
        values_interpolated = cleaning.repair.total_interpolated(),
        values_forward_filled = cleaning.repair.total_forward_filled(),
        values_edge_filled = cleaning.repair.total_edge_filled(),
        values_clipped = cleaning.outliers.total_clipped(),
        families_skipped = report.features.skipped.len()
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
