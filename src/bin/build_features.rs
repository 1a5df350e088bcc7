use std::path::PathBuf;

use revcast::{
    aggregate_daily, engineer_features_with_config, init_logging, load_json_dir, log_app_start,
    log_input_selected, logging_config_from_env, select_country, write_features_csv,
    AggregateStore, CountrySelection, FeatureConfig, FeatureMode,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let data_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REVCAST_DATA_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/cs-train"));
    let mode = parse_mode()?;
    let selection = match std::env::var("REVCAST_COUNTRY") {
        Ok(country) if !country.trim().is_empty() => {
            CountrySelection::Only(country.trim().to_string())
        }
        _ => CountrySelection::All,
    };

    log_input_selected(&data_dir, &selection, mode);

    let transactions = load_json_dir(&data_dir)?;
    let aggregates = aggregate_daily(&transactions);

    if let Ok(store_path) = std::env::var("REVCAST_STORE_PATH") {
        let mut store = AggregateStore::open(&PathBuf::from(store_path))?;
        store.upsert(&aggregates)?;
    }

    let series = select_country(&aggregates, &selection);
    let features = engineer_features_with_config(&series, mode, &FeatureConfig::default())?;

    if let Ok(out_path) = std::env::var("REVCAST_FEATURES_OUT") {
        write_features_csv(&PathBuf::from(out_path), &features)?;
    }

    println!(
        "transactions={} aggregate_rows={} feature_rows={} first_anchor={} last_anchor={} fingerprint={}",
        transactions.len(),
        aggregates.len(),
        features.len(),
        features
            .anchor_dates
            .first()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
        features
            .anchor_dates
            .last()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
        features.schema.fingerprint
    );

    Ok(())
}

fn parse_mode() -> Result<FeatureMode, Box<dyn std::error::Error>> {
    match std::env::var("REVCAST_MODE") {
        Err(_) => Ok(FeatureMode::Training),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" | "training" | "train" => Ok(FeatureMode::Training),
            "inference" | "predict" => Ok(FeatureMode::Inference),
            other => {
                Err(format!("invalid REVCAST_MODE '{other}': expected training or inference").into())
            }
        },
    }
}
