//! Pipeline configuration: JSON file, `SE3_*` environment overrides, validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{validate_feature_config, FeatureConfig};
use crate::repair::InterpolationMethod;
use crate::validate::RangeRule;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Zone of naive timestamps coming from sources.
    pub source_timezone: Tz,
    /// Zone used for calendar features and CSV export.
    pub display_timezone: Tz,
    pub max_interpolation_gap_hours: usize,
    pub interpolation: InterpolationMethod,
    pub outlier_std_multiplier: f64,
    pub outlier_exclude_columns: Vec<String>,
    pub range_rules: Vec<RangeRule>,
    pub features: FeatureConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_timezone: chrono_tz::Europe::Stockholm,
            display_timezone: chrono_tz::Europe::Stockholm,
            max_interpolation_gap_hours: 6,
            interpolation: InterpolationMethod::Linear,
            outlier_std_multiplier: 4.0,
            outlier_exclude_columns: vec!["price".to_string()],
            range_rules: vec![RangeRule::default_price()],
            features: FeatureConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_interpolation_gap_hours == 0 {
            return Err(ConfigError::Invalid(
                "max_interpolation_gap_hours must be > 0".to_string(),
            ));
        }
        if !self.outlier_std_multiplier.is_finite() || self.outlier_std_multiplier <= 0.0 {
            return Err(ConfigError::Invalid(
                "outlier_std_multiplier must be finite and > 0".to_string(),
            ));
        }
        if let InterpolationMethod::Polynomial { order: 0 } = self.interpolation {
            return Err(ConfigError::Invalid(
                "interpolation polynomial order must be > 0".to_string(),
            ));
        }
        for rule in &self.range_rules {
            if rule.column.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "range_rules entries need a column name".to_string(),
                ));
            }
            if rule.min.is_nan() || rule.max.is_nan() || rule.min > rule.max {
                return Err(ConfigError::Invalid(format!(
                    "range rule for {} has min > max",
                    rule.column
                )));
            }
        }
        validate_feature_config(&self.features)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Defaults overridden by any parseable `SE3_*` variable.
pub fn pipeline_config_from_env() -> PipelineConfig {
    apply_env_overrides(PipelineConfig::default())
}

pub fn apply_env_overrides(mut config: PipelineConfig) -> PipelineConfig {
    if let Some(hours) = env_parsed::<usize>("SE3_MAX_GAP_HOURS") {
        config.max_interpolation_gap_hours = hours;
    }

    if let Ok(method) = env::var("SE3_INTERPOLATION") {
        if let Some(parsed) = InterpolationMethod::parse(&method) {
            config.interpolation = parsed;
        }
    }

    if let Some(n_std) = env_parsed::<f64>("SE3_OUTLIER_STD") {
        config.outlier_std_multiplier = n_std;
    }

    if let Some(tz) = env_parsed::<Tz>("SE3_SOURCE_TZ") {
        config.source_timezone = tz;
    }

    if let Some(tz) = env_parsed::<Tz>("SE3_DISPLAY_TZ") {
        config.display_timezone = tz;
    }

    let price_min = env_parsed::<f64>("SE3_PRICE_MIN");
    let price_max = env_parsed::<f64>("SE3_PRICE_MAX");
    if price_min.is_some() || price_max.is_some() {
        let target = config.features.target_column.clone();
        let idx = match config.range_rules.iter().position(|r| r.column == target) {
            Some(idx) => idx,
            None => {
                let base = RangeRule::default_price();
                config
                    .range_rules
                    .push(RangeRule::new(target, base.min, base.max));
                config.range_rules.len() - 1
            }
        };
        let rule = &mut config.range_rules[idx];
        if let Some(min) = price_min {
            rule.min = min;
        }
        if let Some(max) = price_max {
            rule.max = max;
        }
    }

    config
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok()?.trim().parse().ok()
}
