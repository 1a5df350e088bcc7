use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use revcast::{
    aggregate_daily, engineer_features, load_json_dir, log_app_start, log_input_selected,
    CountrySelection, FeatureMode, LoadError, LoggingConfig,
};
use serde_json::json;
use tempfile::tempdir;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn write_records(dir: &Path, name: &str, records: serde_json::Value) {
    fs::write(
        dir.join(name),
        serde_json::to_string(&records).expect("json should serialize"),
    )
    .expect("json file should be written");
}

#[test]
fn pipeline_emits_stage_events() {
    let temp = tempdir().expect("temp dir should be created");
    write_records(
        temp.path(),
        "a.json",
        json!([
            {"country": "UK", "customer_id": 1, "day": 1, "invoice": "1", "month": 1,
             "price": 2.0, "stream_id": "a", "times_viewed": 1, "year": 2019},
            {"country": "UK", "customer_id": 1, "day": 2, "invoice": "2", "month": 1,
             "price": 3.0, "stream_id": "a", "times_viewed": 1, "year": 2019}
        ]),
    );

    let logs = capture_logs(Level::DEBUG, || {
        let rows = load_json_dir(temp.path()).expect("load should succeed");
        let aggregates = aggregate_daily(&rows);
        let features = engineer_features(&aggregates, false).expect("features");
        assert_eq!(features.len(), 1);
    });

    assert!(logs.contains("\"event\":\"loader.load.start\""));
    assert!(logs.contains("\"event\":\"loader.file.loaded\""));
    assert!(logs.contains("\"event\":\"loader.load.finish\""));
    assert!(logs.contains("\"event\":\"aggregate.daily.finish\""));
    assert!(logs.contains("\"event\":\"features.engineer.start\""));
    assert!(logs.contains("\"event\":\"features.schema.built\""));
    assert!(logs.contains("\"event\":\"features.engineer.zero_row_dropped\""));
    assert!(logs.contains("\"event\":\"features.engineer.finish\""));
}

#[test]
fn schema_mismatch_is_logged_as_warning() {
    let temp = tempdir().expect("temp dir should be created");
    write_records(temp.path(), "bad.json", json!([{"country": "UK"}]));

    let logs = capture_logs(Level::WARN, || {
        let err = load_json_dir(temp.path()).expect_err("schema mismatch expected");
        assert!(matches!(err, LoadError::SchemaMismatch { .. }));
    });

    assert!(logs.contains("\"event\":\"loader.file.schema_mismatch\""));
    assert!(logs.contains("\"level\":\"WARN\""));
    assert!(!logs.contains("loader.load.start"));
}

#[test]
fn app_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        log_app_start(&LoggingConfig::default());
        log_input_selected(
            Path::new("data/cs-train"),
            &CountrySelection::Only("EIRE".to_string()),
            FeatureMode::Training,
        );
        log_input_selected(
            Path::new("data/cs-train"),
            &CountrySelection::All,
            FeatureMode::Inference,
        );
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"input.selected\""));
    assert!(logs.contains("\"country\":\"EIRE\""));
    assert!(logs.contains("\"country\":\"all\""));
    assert!(logs.contains("\"mode\":\"training\""));
    assert!(logs.contains("\"mode\":\"inference\""));
}
