//! Causal feature derivation over a cleaned hourly table.
//!
//! Families (each can be switched off):
//! - calendar: local-time fields in the display zone, cyclical encodings,
//!   holiday and peak-window flags
//! - supply/demand: residual load and renewable share from the forecasts
//! - lag/rolling: target lags, trailing window stats, shifted differences
//! - interaction: pairwise products of base features
//!
//! Lag and rolling values at row t only read rows at or before t - 1.

use std::collections::{HashSet, VecDeque};
use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::outliers::mean_and_sample_std;
use crate::table::{Column, TimeSeriesTable};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const LOAD_FORECAST: &str = "load_forecast";
pub const WIND_FORECAST: &str = "wind_forecast";
pub const SOLAR_FORECAST: &str = "solar_forecast";
pub const TEMPERATURE_AVG: &str = "temperature_avg";
pub const WIND_SPEED_80M_AVG: &str = "wind_speed_80m_avg";

const CALENDAR_COLUMNS: [&str; 13] = [
    "hour",
    "day_of_week",
    "month",
    "day_of_year",
    "week_of_year",
    "is_weekend",
    "is_holiday",
    "hour_sin",
    "hour_cos",
    "month_sin",
    "month_cos",
    "is_peak_morning",
    "is_peak_evening",
];

const SUPPLY_DEMAND_COLUMNS: [&str; 4] = [
    "residual_load",
    "renewable_ratio",
    "renewable_surplus",
    "load_stress",
];

const ROLLING_STATS: [&str; 4] = ["mean", "std", "min", "max"];

/// Swedish public holidays that fall on a fixed date.
pub const SWEDISH_FIXED_HOLIDAYS: [&str; 8] = [
    "01-01", "01-06", "05-01", "06-06", "12-24", "12-25", "12-26", "12-31",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFamily {
    Calendar,
    SupplyDemand,
    LagRolling,
    Interaction,
}

impl FeatureFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::SupplyDemand => "supply_demand",
            Self::LagRolling => "lag_rolling",
            Self::Interaction => "interaction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub target_column: String,
    pub lag_hours: Vec<u32>,
    pub rolling_windows_hours: Vec<u32>,
    pub diff_hours: Vec<u32>,
    pub calendar: bool,
    pub supply_demand: bool,
    pub lag_rolling: bool,
    pub interaction: bool,
    /// `MM-DD` dates checked against the local calendar date.
    pub holidays: Vec<String>,
    /// Inclusive local hour ranges.
    pub morning_peak_hours: (u32, u32),
    pub evening_peak_hours: (u32, u32),
    pub schema_version: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            target_column: "price".to_string(),
            lag_hours: vec![1, 24, 168],
            rolling_windows_hours: vec![24, 168],
            diff_hours: vec![1, 24],
            calendar: true,
            supply_demand: true,
            lag_rolling: true,
            interaction: true,
            holidays: SWEDISH_FIXED_HOLIDAYS.iter().map(|d| d.to_string()).collect(),
            morning_peak_hours: (7, 9),
            evening_peak_hours: (17, 20),
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

impl FeatureConfig {
    /// Longest look-back any lag/rolling/diff column needs, in hours.
    pub fn max_history_hours(&self) -> u32 {
        let lags = self.lag_hours.iter().copied().max().unwrap_or(0);
        let windows = self.rolling_windows_hours.iter().copied().max().unwrap_or(0);
        let diffs = self.diff_hours.iter().copied().max().map_or(0, |h| h + 1);
        lags.max(windows).max(diffs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub family: FeatureFamily,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFamily {
    pub family: FeatureFamily,
    pub missing_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureReport {
    pub built: Vec<FeatureFamily>,
    pub skipped: Vec<SkippedFamily>,
    pub derived_columns: u64,
    /// Rows where at least one lag/rolling/diff value is null for lack of history.
    pub rows_without_full_history: u64,
}

/// Cleaned table plus derived columns, keyed by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub table: TimeSeriesTable,
    pub schema: FeatureSchema,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InteractionTerm {
    TempLoad,
    WindEfficiency,
    HourLoad,
}

impl InteractionTerm {
    const ALL: [Self; 3] = [Self::TempLoad, Self::WindEfficiency, Self::HourLoad];

    fn column_name(self) -> &'static str {
        match self {
            Self::TempLoad => "temp_load_interaction",
            Self::WindEfficiency => "wind_efficiency",
            Self::HourLoad => "hour_load_interaction",
        }
    }

    fn inputs(self) -> [&'static str; 2] {
        match self {
            Self::TempLoad => [TEMPERATURE_AVG, LOAD_FORECAST],
            Self::WindEfficiency => [WIND_FORECAST, WIND_SPEED_80M_AVG],
            Self::HourLoad => ["hour", LOAD_FORECAST],
        }
    }

    fn values(self, table: &TimeSeriesTable) -> Vec<Option<f64>> {
        let [a, b] = self.inputs();
        match self {
            Self::TempLoad | Self::HourLoad => product(table, a, b, |x, y| Some(x * y)),
            Self::WindEfficiency => product(table, a, b, |g, v| {
                if v > 0.0 {
                    Some(g / v.powi(3))
                } else {
                    Some(0.0)
                }
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct PlannedFamily {
    family: FeatureFamily,
    columns: Vec<String>,
    /// Empty for every family but `Interaction`.
    interactions: Vec<InteractionTerm>,
}

impl PlannedFamily {
    fn new(family: FeatureFamily, columns: Vec<String>) -> Self {
        Self {
            family,
            columns,
            interactions: Vec::new(),
        }
    }

    fn interaction(terms: Vec<InteractionTerm>) -> Self {
        Self {
            family: FeatureFamily::Interaction,
            columns: terms.iter().map(|t| t.column_name().to_string()).collect(),
            interactions: terms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeatureDeriver {
    cfg: FeatureConfig,
    display_tz: Tz,
    holidays: HashSet<(u32, u32)>,
}

impl FeatureDeriver {
    pub fn new(cfg: FeatureConfig, display_tz: Tz) -> Result<Self, ConfigError> {
        validate_feature_config(&cfg)?;
        let holidays = cfg
            .holidays
            .iter()
            .filter_map(|raw| parse_month_day(raw))
            .collect();
        Ok(Self {
            cfg,
            display_tz,
            holidays,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.cfg
    }

    pub fn derive(&self, table: TimeSeriesTable) -> (FeatureMatrix, FeatureReport) {
        let available = table.column_names();
        let (plan, skipped) = plan_families(&self.cfg, &available);
        let mut report = FeatureReport {
            skipped,
            ..FeatureReport::default()
        };

        for skip in &report.skipped {
            warn!(
                component = "features",
                event = "features.family_skipped",
                family = skip.family.as_str(),
                missing_columns = ?skip.missing_columns
            );
        }

        let mut table = table;
        let mut derived = Vec::new();
        for planned in &plan {
            let columns = match planned.family {
                FeatureFamily::Calendar => self.calendar_columns(table.timestamps()),
                FeatureFamily::SupplyDemand => supply_demand_columns(&table),
                FeatureFamily::LagRolling => {
                    let columns = self.lag_rolling_columns(&table);
                    report.rows_without_full_history = rows_with_nulls(&columns);
                    columns
                }
                FeatureFamily::Interaction => interaction_columns(&table, &planned.interactions),
            };
            debug_assert_eq!(
                columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                planned.columns.iter().map(String::as_str).collect::<Vec<_>>()
            );
            for column in columns {
                derived.push(column.name.clone());
                if let Err(err) = table.set_column(column) {
                    warn!(
                        component = "features",
                        event = "features.column_rejected",
                        error = %err
                    );
                }
            }
            report.built.push(planned.family);
        }
        report.derived_columns = derived.len() as u64;

        let schema = build_feature_schema(&self.cfg);
        info!(
            component = "features",
            event = "features.derive.finish",
            rows = table.len(),
            families_built = report.built.len(),
            families_skipped = report.skipped.len(),
            derived_columns = report.derived_columns,
            rows_without_full_history = report.rows_without_full_history,
            fingerprint = %schema.fingerprint
        );

        (FeatureMatrix { table, schema }, report)
    }

    fn calendar_columns(&self, timestamps: &[DateTime<Utc>]) -> Vec<Column> {
        let mut out: Vec<Vec<Option<f64>>> =
            vec![Vec::with_capacity(timestamps.len()); CALENDAR_COLUMNS.len()];
        let (morning_start, morning_end) = self.cfg.morning_peak_hours;
        let (evening_start, evening_end) = self.cfg.evening_peak_hours;

        for ts in timestamps {
            let local = ts.with_timezone(&self.display_tz);
            let hour = local.hour();
            let weekday = local.weekday().num_days_from_monday();
            let month = local.month();
            let hour_angle = 2.0 * PI * hour as f64 / 24.0;
            let month_angle = 2.0 * PI * month as f64 / 12.0;

            let row = [
                hour as f64,
                weekday as f64,
                month as f64,
                local.ordinal() as f64,
                local.iso_week().week() as f64,
                flag(weekday >= 5),
                flag(self.holidays.contains(&(month, local.day()))),
                hour_angle.sin(),
                hour_angle.cos(),
                month_angle.sin(),
                month_angle.cos(),
                flag((morning_start..=morning_end).contains(&hour)),
                flag((evening_start..=evening_end).contains(&hour)),
            ];
            for (values, value) in out.iter_mut().zip(row) {
                values.push(Some(value));
            }
        }

        CALENDAR_COLUMNS
            .iter()
            .zip(out)
            .map(|(name, values)| Column::new(*name, values))
            .collect()
    }

    fn lag_rolling_columns(&self, table: &TimeSeriesTable) -> Vec<Column> {
        let target = &self.cfg.target_column;
        let values = table.column_values(target).unwrap_or(&[]);
        let mut columns = Vec::new();

        for lag in &self.cfg.lag_hours {
            columns.push(Column::new(
                format!("{target}_lag_{lag}h"),
                lagged(values, *lag as usize),
            ));
        }

        for window in &self.cfg.rolling_windows_hours {
            let stats = trailing_stats(values, *window as usize);
            for (stat, stat_values) in ROLLING_STATS.iter().zip(stats) {
                columns.push(Column::new(
                    format!("{target}_rolling_{stat}_{window}h"),
                    stat_values,
                ));
            }
        }

        for horizon in &self.cfg.diff_hours {
            columns.push(Column::new(
                format!("{target}_diff_{horizon}h"),
                shifted_diff(values, *horizon as usize),
            ));
        }

        columns
    }
}

/// Trailing window over strictly earlier rows.
#[derive(Debug, Clone)]
struct TrailingWindow {
    values: VecDeque<Option<f64>>,
    capacity: usize,
}

impl TrailingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    fn push(&mut self, value: Option<f64>) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// All values once the window is full and has no gaps.
    fn complete(&self) -> Option<Vec<f64>> {
        if self.values.len() < self.capacity {
            return None;
        }
        self.values.iter().copied().collect()
    }
}

/// mean, std, min, max per row, each over rows `[t - window, t - 1]`.
fn trailing_stats(values: &[Option<f64>], window: usize) -> [Vec<Option<f64>>; 4] {
    let mut mean = Vec::with_capacity(values.len());
    let mut std = Vec::with_capacity(values.len());
    let mut min = Vec::with_capacity(values.len());
    let mut max = Vec::with_capacity(values.len());
    let mut trailing = TrailingWindow::new(window);

    for value in values {
        match trailing.complete() {
            Some(history) => {
                let stats = mean_and_sample_std(history.iter().copied());
                mean.push(Some(history.iter().sum::<f64>() / history.len() as f64));
                std.push(stats.map(|(_, s)| s));
                min.push(Some(history.iter().copied().fold(f64::INFINITY, f64::min)));
                max.push(Some(history.iter().copied().fold(f64::NEG_INFINITY, f64::max)));
            }
            None => {
                mean.push(None);
                std.push(None);
                min.push(None);
                max.push(None);
            }
        }
        trailing.push(*value);
    }

    [mean, std, min, max]
}

fn lagged(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(lag).and_then(|j| values[j]))
        .collect()
}

/// `x[t-1] - x[t-1-h]`.
fn shifted_diff(values: &[Option<f64>], horizon: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let prev = i.checked_sub(1)?;
            let base = prev.checked_sub(horizon)?;
            Some(values[prev]? - values[base]?)
        })
        .collect()
}

fn supply_demand_columns(table: &TimeSeriesTable) -> Vec<Column> {
    let load = table.column_values(LOAD_FORECAST).unwrap_or(&[]);
    let wind = table.column_values(WIND_FORECAST).unwrap_or(&[]);
    let solar = table.column_values(SOLAR_FORECAST).unwrap_or(&[]);

    let mut residual = Vec::with_capacity(table.len());
    let mut ratio = Vec::with_capacity(table.len());
    let mut surplus = Vec::with_capacity(table.len());
    let mut stress = Vec::with_capacity(table.len());

    for row in 0..table.len() {
        let inputs = (
            load.get(row).copied().flatten(),
            wind.get(row).copied().flatten(),
            solar.get(row).copied().flatten(),
        );
        let (Some(l), Some(w), Some(s)) = inputs else {
            residual.push(None);
            ratio.push(None);
            surplus.push(None);
            stress.push(None);
            continue;
        };
        let r = l - (w + s);
        residual.push(Some(r));
        surplus.push(Some(r.min(0.0).abs()));
        if l == 0.0 {
            ratio.push(None);
            stress.push(None);
        } else {
            ratio.push(Some(((w + s) / l).clamp(0.0, 1.0)));
            stress.push(Some(r / l));
        }
    }

    SUPPLY_DEMAND_COLUMNS
        .iter()
        .zip([residual, ratio, surplus, stress])
        .map(|(name, values)| Column::new(*name, values))
        .collect()
}

fn interaction_columns(table: &TimeSeriesTable, terms: &[InteractionTerm]) -> Vec<Column> {
    terms
        .iter()
        .map(|term| Column::new(term.column_name(), term.values(table)))
        .collect()
}

fn product(
    table: &TimeSeriesTable,
    a: &str,
    b: &str,
    f: impl Fn(f64, f64) -> Option<f64>,
) -> Vec<Option<f64>> {
    let a = table.column_values(a).unwrap_or(&[]);
    let b = table.column_values(b).unwrap_or(&[]);
    (0..table.len())
        .map(|row| match (a.get(row).copied().flatten(), b.get(row).copied().flatten()) {
            (Some(x), Some(y)) => f(x, y),
            _ => None,
        })
        .collect()
}

fn rows_with_nulls(columns: &[Column]) -> u64 {
    let rows = columns.first().map_or(0, |c| c.values.len());
    (0..rows)
        .filter(|row| columns.iter().any(|c| c.values[*row].is_none()))
        .count() as u64
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Every family and column the config can derive, in output order.
/// Independent of which inputs a batch carries.
fn configured_plan(cfg: &FeatureConfig) -> Vec<PlannedFamily> {
    let mut plan = Vec::new();

    if cfg.calendar {
        plan.push(PlannedFamily::new(
            FeatureFamily::Calendar,
            CALENDAR_COLUMNS.iter().map(|c| c.to_string()).collect(),
        ));
    }

    if cfg.supply_demand {
        plan.push(PlannedFamily::new(
            FeatureFamily::SupplyDemand,
            SUPPLY_DEMAND_COLUMNS.iter().map(|c| c.to_string()).collect(),
        ));
    }

    if cfg.lag_rolling {
        let target = &cfg.target_column;
        let mut columns = Vec::new();
        for lag in &cfg.lag_hours {
            columns.push(format!("{target}_lag_{lag}h"));
        }
        for window in &cfg.rolling_windows_hours {
            for stat in ROLLING_STATS {
                columns.push(format!("{target}_rolling_{stat}_{window}h"));
            }
        }
        for horizon in &cfg.diff_hours {
            columns.push(format!("{target}_diff_{horizon}h"));
        }
        plan.push(PlannedFamily::new(FeatureFamily::LagRolling, columns));
    }

    if cfg.interaction {
        // hour_load_interaction reads the calendar `hour` column.
        let terms = InteractionTerm::ALL
            .into_iter()
            .filter(|term| cfg.calendar || *term != InteractionTerm::HourLoad)
            .collect::<Vec<_>>();
        if !terms.is_empty() {
            plan.push(PlannedFamily::interaction(terms));
        }
    }

    plan
}

/// Narrows the configured plan to what this batch's columns support.
fn plan_families(
    cfg: &FeatureConfig,
    available: &[String],
) -> (Vec<PlannedFamily>, Vec<SkippedFamily>) {
    let mut plan = Vec::new();
    let mut skipped = Vec::new();

    for planned in configured_plan(cfg) {
        let missing = match planned.family {
            FeatureFamily::Calendar => Vec::new(),
            FeatureFamily::SupplyDemand => {
                missing_columns(available, &[LOAD_FORECAST, WIND_FORECAST, SOLAR_FORECAST])
            }
            FeatureFamily::LagRolling => missing_columns(available, &[cfg.target_column.as_str()]),
            FeatureFamily::Interaction => {
                let mut with_calendar = available.to_vec();
                if cfg.calendar {
                    with_calendar.extend(CALENDAR_COLUMNS.iter().map(|c| c.to_string()));
                }
                let (ready, blocked): (Vec<_>, Vec<_>) = planned
                    .interactions
                    .iter()
                    .copied()
                    .partition(|term| missing_columns(&with_calendar, &term.inputs()).is_empty());
                if !ready.is_empty() {
                    plan.push(PlannedFamily::interaction(ready));
                    continue;
                }
                let mut missing: Vec<String> = Vec::new();
                for term in blocked {
                    for name in missing_columns(&with_calendar, &term.inputs()) {
                        if !missing.contains(&name) {
                            missing.push(name);
                        }
                    }
                }
                missing
            }
        };

        if missing.is_empty() {
            plan.push(planned);
        } else {
            skipped.push(SkippedFamily {
                family: planned.family,
                missing_columns: missing,
            });
        }
    }

    (plan, skipped)
}

fn missing_columns(available: &[String], names: &[&str]) -> Vec<String> {
    names
        .iter()
        .filter(|name| !available.iter().any(|c| c == **name))
        .map(|name| name.to_string())
        .collect()
}

fn schema_from_plan(cfg: &FeatureConfig, plan: &[PlannedFamily]) -> FeatureSchema {
    let columns: Vec<FeatureColumn> = plan
        .iter()
        .flat_map(|planned| {
            planned.columns.iter().map(move |name| FeatureColumn {
                name: name.clone(),
                family: planned.family,
                dtype: FeatureDType::F64,
            })
        })
        .collect();
    let fingerprint = schema_fingerprint(cfg, &columns);

    FeatureSchema {
        version: cfg.schema_version,
        fingerprint,
        columns,
    }
}

/// Derived-column schema for a config. A batch missing some inputs derives
/// a subset of these columns under the same fingerprint.
pub fn build_feature_schema(cfg: &FeatureConfig) -> FeatureSchema {
    schema_from_plan(cfg, &configured_plan(cfg))
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), SchemaError> {
    if expected_version != actual.version {
        return Err(SchemaError::VersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(SchemaError::FingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

pub(crate) fn validate_feature_config(cfg: &FeatureConfig) -> Result<(), ConfigError> {
    if cfg.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(ConfigError::Invalid(format!(
            "features.schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
        )));
    }
    if cfg.target_column.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "features.target_column must not be empty".to_string(),
        ));
    }

    for (field, hours) in [
        ("lag_hours", &cfg.lag_hours),
        ("rolling_windows_hours", &cfg.rolling_windows_hours),
        ("diff_hours", &cfg.diff_hours),
    ] {
        let mut seen = HashSet::new();
        for h in hours {
            if *h == 0 {
                return Err(ConfigError::Invalid(format!(
                    "features.{field} entries must be > 0"
                )));
            }
            if !seen.insert(*h) {
                return Err(ConfigError::Invalid(format!(
                    "features.{field} entries must be unique"
                )));
            }
        }
    }
    if cfg.lag_rolling && cfg.lag_hours.is_empty() && cfg.rolling_windows_hours.is_empty() {
        return Err(ConfigError::Invalid(
            "features.lag_rolling needs at least one lag or rolling window".to_string(),
        ));
    }

    for raw in &cfg.holidays {
        if parse_month_day(raw).is_none() {
            return Err(ConfigError::Invalid(format!(
                "features.holidays entry '{raw}' is not a valid MM-DD date"
            )));
        }
    }

    for (field, (start, end)) in [
        ("morning_peak_hours", cfg.morning_peak_hours),
        ("evening_peak_hours", cfg.evening_peak_hours),
    ] {
        if start > end || end > 23 {
            return Err(ConfigError::Invalid(format!(
                "features.{field} must satisfy start <= end <= 23"
            )));
        }
    }

    Ok(())
}

fn parse_month_day(raw: &str) -> Option<(u32, u32)> {
    let (month, day) = raw.trim().split_once('-')?;
    if month.len() != 2 || day.len() != 2 {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    // 2024 is a leap year, so 02-29 is accepted.
    chrono::NaiveDate::from_ymd_opt(2024, month, day)?;
    Some((month, day))
}

fn schema_fingerprint(cfg: &FeatureConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update(format!("target:{};", cfg.target_column));
    for (label, hours) in [
        ("lags", &cfg.lag_hours),
        ("windows", &cfg.rolling_windows_hours),
        ("diffs", &cfg.diff_hours),
    ] {
        hasher.update(format!("{label}:"));
        for h in hours {
            hasher.update(format!("{h},"));
        }
        hasher.update(";");
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
