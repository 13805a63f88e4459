//! Physical plausibility checks applied before gap repair.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::table::TimeSeriesTable;

/// Inclusive plausible range for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeRule {
    pub column: String,
    pub min: f64,
    pub max: f64,
}

impl RangeRule {
    pub fn new(column: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            column: column.into(),
            min,
            max,
        }
    }

    /// Day-ahead prices in EUR/MWh; negative prices are legitimate.
    pub fn default_price() -> Self {
        Self::new("price", -500.0, 1_000.0)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInvalidation {
    pub column: String,
    pub invalidated: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangeReport {
    pub columns: Vec<ColumnInvalidation>,
}

impl RangeReport {
    pub fn total_invalidated(&self) -> u64 {
        self.columns.iter().map(|c| c.invalidated).sum()
    }
}

#[derive(Debug, Clone)]
pub struct RangeValidator {
    rules: Vec<RangeRule>,
}

impl RangeValidator {
    pub fn new(rules: Vec<RangeRule>) -> Self {
        Self { rules }
    }

    /// Nulls every value outside its column's rule so repair treats it as a gap.
    pub fn apply(&self, table: &mut TimeSeriesTable) -> RangeReport {
        let mut report = RangeReport::default();

        for rule in &self.rules {
            let Some(values) = table.column_values_mut(&rule.column) else {
                debug!(
                    component = "range",
                    event = "range.column_absent",
                    column = %rule.column
                );
                continue;
            };

            let mut invalidated = 0u64;
            for slot in values.iter_mut() {
                if matches!(slot, Some(v) if !rule.contains(*v)) {
                    *slot = None;
                    invalidated += 1;
                }
            }

            if invalidated > 0 {
                warn!(
                    component = "range",
                    event = "range.values_invalidated",
                    column = %rule.column,
                    invalidated,
                    min = rule.min,
                    max = rule.max
                );
            }
            report.columns.push(ColumnInvalidation {
                column: rule.column.clone(),
                invalidated,
            });
        }

        report
    }
}
