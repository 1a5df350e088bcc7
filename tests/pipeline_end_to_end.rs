use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use revcast::{
    aggregate_daily, countries_by_revenue, engineer_features, load_json_dir, select_country,
    write_features_csv, AggregateStore, CountrySelection,
};
use serde_json::{json, Value};
use tempfile::tempdir;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 4, 1).expect("valid start date")
}

/// Two transactions per day: revenue 100, two invoices, five views.
fn month_file(dir: &Path, name: &str, first_day: i64, days: i64) {
    let mut records = Vec::new();
    for offset in first_day..first_day + days {
        let date = start() + Duration::days(offset);
        for (idx, (price, views)) in [(60.0, 2), (40.0, 3)].into_iter().enumerate() {
            records.push(json!({
                "country": "United Kingdom",
                "customer_id": 17850,
                "day": date.format("%d").to_string(),
                "invoice": format!("C{}{}", offset, idx),
                "month": date.format("%m").to_string(),
                "price": price,
                "stream_id": format!("s{idx}"),
                "times_viewed": views,
                "year": date.format("%Y").to_string()
            }));
        }
    }
    fs::write(
        dir.join(name),
        serde_json::to_string(&Value::Array(records)).expect("json should serialize"),
    )
    .expect("json file should be written");
}

#[test]
fn two_files_of_constant_days_produce_expected_features() {
    let temp = tempdir().expect("temp dir should be created");
    month_file(temp.path(), "invoices-part-1.json", 0, 40);
    month_file(temp.path(), "invoices-part-2.json", 40, 40);

    let transactions = load_json_dir(temp.path()).expect("load should succeed");
    assert_eq!(transactions.len(), 160);

    let aggregates = aggregate_daily(&transactions);
    assert_eq!(aggregates.len(), 80);
    assert!(aggregates.iter().all(|row| row.revenue == 100.0
        && row.unique_invoices == 2
        && row.total_views == 5
        && row.purchases == 2));

    let features = engineer_features(&aggregates, false).expect("features");
    let prev_28 = features.column_index("previous_28").expect("column");
    let recent_invoices = features.column_index("recent_invoices").expect("column");
    let recent_views = features.column_index("recent_views").expect("column");

    let day_30 = start() + Duration::days(29);
    let mut checked = 0;
    for (row, date) in features.rows.iter().zip(&features.anchor_dates) {
        if *date >= day_30 {
            assert_eq!(row[prev_28], 2800.0, "previous_28 at {date}");
            assert_eq!(row[recent_invoices], 2.0, "recent_invoices at {date}");
            assert_eq!(row[recent_views], 5.0, "recent_views at {date}");
            checked += 1;
        }
    }
    assert_eq!(checked, 51);
}

#[test]
fn aggregates_survive_the_store_and_feed_the_same_features() {
    let temp = tempdir().expect("temp dir should be created");
    let data_dir = temp.path().join("data");
    fs::create_dir_all(&data_dir).expect("data dir should be created");
    month_file(&data_dir, "invoices.json", 0, 45);

    let aggregates = aggregate_daily(&load_json_dir(&data_dir).expect("load should succeed"));

    let mut store =
        AggregateStore::open(&temp.path().join("ts/aggregates.sqlite")).expect("store opens");
    store.upsert(&aggregates).expect("upsert succeeds");
    let cached = store
        .load(&CountrySelection::Only("United Kingdom".to_string()))
        .expect("load succeeds");
    assert_eq!(cached, aggregates);

    assert_eq!(
        engineer_features(&cached, true).expect("cached features"),
        engineer_features(&aggregates, true).expect("fresh features")
    );
}

#[test]
fn single_country_series_and_csv_export() {
    let temp = tempdir().expect("temp dir should be created");
    let data_dir = temp.path().join("data");
    fs::create_dir_all(&data_dir).expect("data dir should be created");
    month_file(&data_dir, "uk.json", 0, 10);
    fs::write(
        data_dir.join("fr.json"),
        serde_json::to_string(&json!([{
            "country": "France",
            "customer_id": null,
            "day": 3,
            "invoice": "900",
            "month": 4,
            "price": 5000.0,
            "stream_id": "x",
            "times_viewed": 1,
            "year": 2019
        }]))
        .expect("json should serialize"),
    )
    .expect("json file should be written");

    let aggregates = aggregate_daily(&load_json_dir(&data_dir).expect("load should succeed"));
    assert_eq!(
        countries_by_revenue(&aggregates, 10),
        vec!["France", "United Kingdom"]
    );

    let uk = select_country(&aggregates, &CountrySelection::Only("United Kingdom".to_string()));
    let features = engineer_features(&uk, false).expect("features");
    assert_eq!(features.len(), 9);
    let prev_7 = features.column("previous_7").expect("column");
    assert!(prev_7.iter().all(|v| *v <= 700.0));

    let out_path = temp.path().join("out/features.csv");
    write_features_csv(&out_path, &features).expect("export succeeds");
    let text = fs::read_to_string(&out_path).expect("csv should be readable");
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(
        lines[0],
        "date,previous_7,previous_14,previous_28,previous_70,previous_year,recent_invoices,recent_views,target"
    );
    assert_eq!(lines.len(), features.len() + 1);
    assert!(lines[1].starts_with("2019-04-02,100,"));
    assert!(lines[1].ends_with(",900"));
    // previous_year has no history in this series.
    assert!(lines[1].contains(",100,0,"));
    assert!(lines.iter().all(|line| !line.contains(",-0")));
}
