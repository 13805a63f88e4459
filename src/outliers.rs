//! Winsorizing of statistical outliers per column.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::table::TimeSeriesTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnClipReport {
    pub column: String,
    pub mean: f64,
    pub std: f64,
    pub lower: f64,
    pub upper: f64,
    pub clipped_low: u64,
    pub clipped_high: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutlierReport {
    pub columns: Vec<ColumnClipReport>,
}

impl OutlierReport {
    pub fn total_clipped(&self) -> u64 {
        self.columns
            .iter()
            .map(|c| c.clipped_low + c.clipped_high)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct OutlierClipper {
    n_std: f64,
    exclude: Vec<String>,
}

impl OutlierClipper {
    pub fn new(n_std: f64, exclude: Vec<String>) -> Self {
        Self { n_std, exclude }
    }

    /// Every column not on the exclusion list.
    pub fn target_columns(&self, table: &TimeSeriesTable) -> Vec<String> {
        table
            .column_names()
            .into_iter()
            .filter(|name| !self.exclude.contains(name))
            .collect()
    }

    pub fn clip(&self, table: &mut TimeSeriesTable) -> OutlierReport {
        let targets = self.target_columns(table);
        self.clip_columns(table, &targets)
    }

    /// Clips values to `[mean - n*std, mean + n*std]`. Row count never changes.
    pub fn clip_columns(&self, table: &mut TimeSeriesTable, columns: &[String]) -> OutlierReport {
        let mut report = OutlierReport::default();

        for name in columns {
            let Some(values) = table.column_values_mut(name) else {
                continue;
            };
            let Some((mean, std)) = mean_and_sample_std(values.iter().flatten().copied()) else {
                debug!(
                    component = "outliers",
                    event = "outliers.column_skipped",
                    column = %name,
                    reason = "fewer_than_two_values"
                );
                continue;
            };
            if std == 0.0 || !std.is_finite() {
                continue;
            }

            let lower = mean - self.n_std * std;
            let upper = mean + self.n_std * std;
            let mut clipped_low = 0u64;
            let mut clipped_high = 0u64;
            for value in values.iter_mut().flatten() {
                if *value < lower {
                    *value = lower;
                    clipped_low += 1;
                } else if *value > upper {
                    *value = upper;
                    clipped_high += 1;
                }
            }

            if clipped_low + clipped_high > 0 {
                info!(
                    component = "outliers",
                    event = "outliers.values_clipped",
                    column = %name,
                    clipped_low,
                    clipped_high,
                    lower,
                    upper
                );
            }
            report.columns.push(ColumnClipReport {
                column: name.clone(),
                mean,
                std,
                lower,
                upper,
                clipped_low,
                clipped_high,
            });
        }

        report
    }
}

/// Mean and sample (n - 1) standard deviation; `None` below two values.
pub(crate) fn mean_and_sample_std(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let values: Vec<f64> = values.collect();
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|v| {
            let d = *v - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1.0);
    Some((mean, variance.sqrt()))
}
