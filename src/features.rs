//! Daily-aggregate to feature-table transform for 30-day revenue forecasting.
//!
//! Every distinct date in the aggregate series becomes an anchor day. Windows
//! are half-open calendar-day spans measured relative to the anchor:
//! - `previous_N`: `[d - N, d)` revenue sum
//! - `previous_year`: `[d - 365, d + 30 - 365)` revenue sum
//! - `recent_invoices`, `recent_views`: row means over `[d - 30, d)`
//! - target: `[d, d + 30)` revenue sum
//!
//! Days without aggregate rows contribute nothing to sums. Country is ignored:
//! callers pick a single-country series with `select_country` first.

use std::collections::HashSet;
use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregate::DailyAggregate;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureMode {
    /// Drops the trailing rows whose forward target window is incomplete.
    Training,
    Inference,
}

impl FeatureMode {
    pub fn from_training_flag(training: bool) -> Self {
        if training {
            Self::Training
        } else {
            Self::Inference
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Inference => "inference",
        }
    }
}

/// Value used for a mean taken over a window with no rows.
///
/// Applied after all rows are assembled and before all-zero rows are removed,
/// so under `Zero` a row whose windows are all empty is dropped entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyWindowFill {
    Zero,
    /// Leave the mean as NaN for models that handle missing values natively.
    /// Such rows never sum to zero and are therefore never dropped.
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub windows_days: Vec<u32>,
    pub target_days: u32,
    pub year_offset_days: u32,
    pub recent_days: u32,
    pub training_holdout_rows: usize,
    pub empty_window_fill: EmptyWindowFill,
    pub schema_version: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            windows_days: vec![7, 14, 28, 70],
            target_days: 30,
            year_offset_days: 365,
            recent_days: 30,
            training_holdout_rows: 30,
            empty_window_fill: EmptyWindowFill::Zero,
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureReport {
    pub anchor_days: u64,
    pub zero_rows_dropped: u64,
    pub holdout_rows_dropped: u64,
    pub output_rows: u64,
}

/// Feature rows with their targets and anchor dates, aligned by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredFeatures {
    pub schema: FeatureSchema,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub anchor_dates: Vec<NaiveDate>,
    pub report: FeatureReport,
}

impl EngineeredFeatures {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema
            .columns
            .iter()
            .position(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid feature config: {0}")]
    InvalidConfig(String),
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// Per-calendar-day totals over the observed date span.
#[derive(Debug, Clone)]
struct DayBuckets {
    origin: NaiveDate,
    revenue: Vec<f64>,
    invoices: Vec<f64>,
    views: Vec<f64>,
    rows: Vec<u64>,
}

impl DayBuckets {
    fn build(aggregates: &[DailyAggregate]) -> Option<Self> {
        let origin = aggregates.iter().map(|row| row.date).min()?;
        let last = aggregates.iter().map(|row| row.date).max()?;
        let len = (last - origin).num_days() as usize + 1;

        let mut buckets = Self {
            origin,
            revenue: vec![0.0; len],
            invoices: vec![0.0; len],
            views: vec![0.0; len],
            rows: vec![0; len],
        };
        for row in aggregates {
            let idx = (row.date - origin).num_days() as usize;
            buckets.revenue[idx] += row.revenue;
            buckets.invoices[idx] += row.unique_invoices as f64;
            buckets.views[idx] += row.total_views as f64;
            buckets.rows[idx] += 1;
        }
        Some(buckets)
    }

    fn observed_days(&self) -> impl Iterator<Item = i64> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(idx, _)| idx as i64)
    }

    fn date_at(&self, offset: i64) -> NaiveDate {
        self.origin + chrono::Duration::days(offset)
    }

    /// Maps the day-offset window `[start, stop)` onto bucket indices.
    fn clamp(&self, start: i64, stop: i64) -> Range<usize> {
        let len = self.rows.len() as i64;
        let lo = start.clamp(0, len);
        let hi = stop.clamp(0, len);
        if hi <= lo {
            0..0
        } else {
            lo as usize..hi as usize
        }
    }

    /// Empty windows sum to `+0.0`, never `-0.0`.
    fn revenue_sum(&self, start: i64, stop: i64) -> f64 {
        self.revenue[self.clamp(start, stop)]
            .iter()
            .fold(0.0, |acc, v| acc + v)
    }

    fn row_mean(&self, values: &[f64], start: i64, stop: i64) -> Option<f64> {
        let range = self.clamp(start, stop);
        let count: u64 = self.rows[range.clone()].iter().sum();
        if count == 0 {
            return None;
        }
        Some(values[range].iter().fold(0.0, |acc, v| acc + v) / count as f64)
    }
}

pub fn build_feature_schema(cfg: &FeatureConfig) -> FeatureSchema {
    let mut columns: Vec<FeatureColumn> = cfg
        .windows_days
        .iter()
        .map(|window| FeatureColumn {
            name: format!("previous_{window}"),
            dtype: FeatureDType::F64,
        })
        .collect();
    for name in ["previous_year", "recent_invoices", "recent_views"] {
        columns.push(FeatureColumn {
            name: name.to_string(),
            dtype: FeatureDType::F64,
        });
    }

    let fingerprint = schema_fingerprint(cfg, &columns);

    info!(
        component = "features",
        event = "features.schema.built",
        version = cfg.schema_version,
        windows_days = ?cfg.windows_days,
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: cfg.schema_version,
        fingerprint,
        columns,
    }
}

/// Builds features with the default configuration.
pub fn engineer_features(
    aggregates: &[DailyAggregate],
    training: bool,
) -> Result<EngineeredFeatures, FeatureError> {
    engineer_features_with_config(
        aggregates,
        FeatureMode::from_training_flag(training),
        &FeatureConfig::default(),
    )
}

pub fn engineer_features_for_training(
    aggregates: &[DailyAggregate],
    cfg: &FeatureConfig,
) -> Result<EngineeredFeatures, FeatureError> {
    engineer_features_with_config(aggregates, FeatureMode::Training, cfg)
}

pub fn engineer_features_for_inference(
    aggregates: &[DailyAggregate],
    cfg: &FeatureConfig,
) -> Result<EngineeredFeatures, FeatureError> {
    engineer_features_with_config(aggregates, FeatureMode::Inference, cfg)
}

pub fn engineer_features_with_config(
    aggregates: &[DailyAggregate],
    mode: FeatureMode,
    cfg: &FeatureConfig,
) -> Result<EngineeredFeatures, FeatureError> {
    validate_config(cfg)?;

    info!(
        component = "features",
        event = "features.engineer.start",
        input_rows = aggregates.len(),
        mode = ?mode,
        windows_days = ?cfg.windows_days,
        empty_window_fill = ?cfg.empty_window_fill
    );

    let schema = build_feature_schema(cfg);
    let mut report = FeatureReport {
        anchor_days: 0,
        zero_rows_dropped: 0,
        holdout_rows_dropped: 0,
        output_rows: 0,
    };

    let mut rows = Vec::new();
    let mut targets = Vec::new();
    let mut anchor_dates = Vec::new();

    if let Some(buckets) = DayBuckets::build(aggregates) {
        let target = i64::from(cfg.target_days);
        let year = i64::from(cfg.year_offset_days);
        let recent = i64::from(cfg.recent_days);

        for day in buckets.observed_days() {
            report.anchor_days += 1;

            let mut values = Vec::with_capacity(schema.columns.len());
            for window in &cfg.windows_days {
                values.push(buckets.revenue_sum(day - i64::from(*window), day));
            }
            values.push(buckets.revenue_sum(day - year, day + target - year));
            values.push(fill_empty(
                buckets.row_mean(&buckets.invoices, day - recent, day),
                cfg.empty_window_fill,
            ));
            values.push(fill_empty(
                buckets.row_mean(&buckets.views, day - recent, day),
                cfg.empty_window_fill,
            ));

            if values.iter().sum::<f64>() == 0.0 {
                report.zero_rows_dropped += 1;
                debug!(
                    component = "features",
                    event = "features.engineer.zero_row_dropped",
                    anchor_date = %buckets.date_at(day)
                );
                continue;
            }

            rows.push(values);
            targets.push(buckets.revenue_sum(day, day + target));
            anchor_dates.push(buckets.date_at(day));
        }
    }

    if mode == FeatureMode::Training {
        let keep = rows.len().saturating_sub(cfg.training_holdout_rows);
        report.holdout_rows_dropped = (rows.len() - keep) as u64;
        rows.truncate(keep);
        targets.truncate(keep);
        anchor_dates.truncate(keep);
    }

    report.output_rows = rows.len() as u64;

    info!(
        component = "features",
        event = "features.engineer.finish",
        mode = ?mode,
        anchor_days = report.anchor_days,
        zero_rows_dropped = report.zero_rows_dropped,
        holdout_rows_dropped = report.holdout_rows_dropped,
        output_rows = report.output_rows,
        first_anchor = ?anchor_dates.first(),
        last_anchor = ?anchor_dates.last()
    );

    Ok(EngineeredFeatures {
        schema,
        rows,
        targets,
        anchor_dates,
        report,
    })
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(FeatureError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn fill_empty(mean: Option<f64>, fill: EmptyWindowFill) -> f64 {
    match (mean, fill) {
        (Some(value), _) => value,
        (None, EmptyWindowFill::Zero) => 0.0,
        (None, EmptyWindowFill::Keep) => f64::NAN,
    }
}

fn validate_config(cfg: &FeatureConfig) -> Result<(), FeatureError> {
    if cfg.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(FeatureError::InvalidConfig(format!(
            "schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
        )));
    }

    if cfg.windows_days.is_empty() {
        return Err(FeatureError::InvalidConfig(
            "windows_days must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for window in &cfg.windows_days {
        if *window == 0 {
            return Err(FeatureError::InvalidConfig(
                "windows_days entries must be > 0".to_string(),
            ));
        }
        if !seen.insert(*window) {
            return Err(FeatureError::InvalidConfig(
                "windows_days entries must be unique".to_string(),
            ));
        }
    }

    for (name, value) in [
        ("target_days", cfg.target_days),
        ("year_offset_days", cfg.year_offset_days),
        ("recent_days", cfg.recent_days),
    ] {
        if value == 0 {
            return Err(FeatureError::InvalidConfig(format!("{name} must be > 0")));
        }
    }

    Ok(())
}

fn schema_fingerprint(cfg: &FeatureConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update(format!("target_days:{};", cfg.target_days));
    hasher.update(format!("year_offset_days:{};", cfg.year_offset_days));
    hasher.update(format!("recent_days:{};", cfg.recent_days));
    hasher.update(format!("empty_window_fill:{:?};", cfg.empty_window_fill));
    hasher.update("windows:");
    for window in &cfg.windows_days {
        hasher.update(format!("{window},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
