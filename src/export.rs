//! CSV export of engineered features for downstream training.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::features::EngineeredFeatures;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes `date,<feature columns>,target`, one line per anchor day.
pub fn write_features_csv(path: &Path, features: &EngineeredFeatures) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(features.schema.columns.len() + 2);
    header.push("date".to_string());
    header.extend(features.schema.columns.iter().map(|column| column.name.clone()));
    header.push("target".to_string());
    writer.write_record(&header)?;

    for ((values, target), date) in features
        .rows
        .iter()
        .zip(&features.targets)
        .zip(&features.anchor_dates)
    {
        let mut record = Vec::with_capacity(values.len() + 2);
        record.push(date.format("%Y-%m-%d").to_string());
        record.extend(values.iter().map(f64::to_string));
        record.push(target.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        component = "export",
        event = "export.csv.written",
        path = %path.display(),
        rows = features.len(),
        fingerprint = %features.schema.fingerprint
    );

    Ok(())
}
