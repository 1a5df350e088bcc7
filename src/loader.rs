//! Transaction loading from a directory of date-partitioned JSON files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Column set every file must carry once legacy aliases are renamed.
pub const CANONICAL_COLUMNS: [&str; 9] = [
    "country",
    "customer_id",
    "day",
    "invoice",
    "month",
    "price",
    "stream_id",
    "times_viewed",
    "year",
];

/// Legacy column spellings seen in older partitions, as `(alias, canonical)`.
pub const COLUMN_ALIASES: [(&str, &str); 3] = [
    ("StreamID", "stream_id"),
    ("TimesViewed", "times_viewed"),
    ("total_price", "price"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub country: String,
    pub customer_id: Option<String>,
    pub invoice: String,
    pub stream_id: String,
    pub price: f64,
    pub times_viewed: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub file_extension: String,
    pub column_aliases: Vec<(String, String)>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            file_extension: "json".to_string(),
            column_aliases: COLUMN_ALIASES
                .iter()
                .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input path is not a valid directory: {0}")]
    InvalidDirectory(PathBuf),
    #[error("directory {0} does not contain any files")]
    EmptyDirectory(PathBuf),
    #[error("directory {dir} does not contain any .{extension} files")]
    NoMatchingFiles { dir: PathBuf, extension: String },
    #[error(
        "columns of file {path} could not be matched to the canonical schema (file columns: {columns:?})"
    )]
    SchemaMismatch { path: PathBuf, columns: Vec<String> },
    #[error("unsupported record layout in {path}: {reason}")]
    UnsupportedLayout { path: PathBuf, reason: String },
    #[error("failed to parse field {field} in {path} row {row}: '{value}'")]
    ParseField {
        path: PathBuf,
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("invalid calendar date {year}-{month}-{day} in {path} row {row}")]
    InvalidDate {
        path: PathBuf,
        row: usize,
        year: i64,
        month: i64,
        day: i64,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads every `.json` file under `dir` and returns the records sorted by date.
pub fn load_json_dir(dir: &Path) -> Result<Vec<Transaction>, LoadError> {
    load_json_dir_with_config(dir, &LoaderConfig::default())
}

pub fn load_json_dir_with_config(
    dir: &Path,
    cfg: &LoaderConfig,
) -> Result<Vec<Transaction>, LoadError> {
    let files = matching_files(dir, cfg)?;

    info!(
        component = "loader",
        event = "loader.load.start",
        dir = %dir.display(),
        file_count = files.len()
    );

    let mut transactions = Vec::new();
    for path in &files {
        let mut parsed = load_json_file(path, cfg)?;
        debug!(
            component = "loader",
            event = "loader.file.loaded",
            path = %path.display(),
            rows = parsed.len()
        );
        transactions.append(&mut parsed);
    }

    transactions.sort_by_key(|row| row.date);

    info!(
        component = "loader",
        event = "loader.load.finish",
        dir = %dir.display(),
        file_count = files.len(),
        rows = transactions.len(),
        first_date = ?transactions.first().map(|row| row.date),
        last_date = ?transactions.last().map(|row| row.date)
    );

    Ok(transactions)
}

fn matching_files(dir: &Path, cfg: &LoaderConfig) -> Result<Vec<PathBuf>, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::InvalidDirectory(dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    if entries.is_empty() {
        return Err(LoadError::EmptyDirectory(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = entries
        .into_iter()
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&cfg.file_extension))
                .unwrap_or(false)
        })
        .collect();
    if files.is_empty() {
        return Err(LoadError::NoMatchingFiles {
            dir: dir.to_path_buf(),
            extension: cfg.file_extension.clone(),
        });
    }

    files.sort();
    Ok(files)
}

fn load_json_file(path: &Path, cfg: &LoaderConfig) -> Result<Vec<Transaction>, LoadError> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let table = RecordTable::from_json(path, value)?;
    let table = table.rename_columns(cfg);
    validate_columns(path, &table.columns)?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(row, fields)| {
            RowFields {
                path,
                row,
                fields,
            }
            .to_transaction()
        })
        .collect()
}

fn validate_columns(path: &Path, columns: &[String]) -> Result<(), LoadError> {
    let mut actual = columns.to_vec();
    actual.sort();
    let mut expected: Vec<&str> = CANONICAL_COLUMNS.to_vec();
    expected.sort_unstable();

    if actual.iter().map(String::as_str).eq(expected.iter().copied()) {
        return Ok(());
    }

    warn!(
        component = "loader",
        event = "loader.file.schema_mismatch",
        path = %path.display(),
        columns = ?columns
    );
    Err(LoadError::SchemaMismatch {
        path: path.to_path_buf(),
        columns: columns.to_vec(),
    })
}

/// A file's rows together with the column names it declares.
#[derive(Debug, Default)]
struct RecordTable {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl RecordTable {
    fn from_json(path: &Path, value: Value) -> Result<Self, LoadError> {
        match value {
            Value::Array(items) => Self::from_records(path, items),
            Value::Object(columns) => Self::from_columns(path, columns),
            other => Err(LoadError::UnsupportedLayout {
                path: path.to_path_buf(),
                reason: format!(
                    "expected array or object at top level, found {}",
                    kind(&other)
                ),
            }),
        }
    }

    /// `[{"country": .., ..}, ..]`; the column set is the union of row keys.
    fn from_records(path: &Path, items: Vec<Value>) -> Result<Self, LoadError> {
        let mut table = Self::default();
        for (idx, item) in items.into_iter().enumerate() {
            let fields = match item {
                Value::Object(fields) => fields,
                other => {
                    return Err(LoadError::UnsupportedLayout {
                        path: path.to_path_buf(),
                        reason: format!("record {idx} is {}, expected object", kind(&other)),
                    })
                }
            };
            for key in fields.keys() {
                if !table.columns.contains(key) {
                    table.columns.push(key.clone());
                }
            }
            table.rows.push(fields);
        }
        Ok(table)
    }

    /// `{"country": {"0": .., "1": ..}, ..}` or `{"country": [..], ..}`.
    fn from_columns(path: &Path, columns: Map<String, Value>) -> Result<Self, LoadError> {
        let mut rows: BTreeMap<(Option<u64>, String), Map<String, Value>> = BTreeMap::new();
        let mut names = Vec::with_capacity(columns.len());

        for (name, cells) in columns {
            let indexed: Vec<(String, Value)> = match cells {
                Value::Object(cells) => cells.into_iter().collect(),
                Value::Array(cells) => cells
                    .into_iter()
                    .enumerate()
                    .map(|(idx, cell)| (idx.to_string(), cell))
                    .collect(),
                other => {
                    return Err(LoadError::UnsupportedLayout {
                        path: path.to_path_buf(),
                        reason: format!(
                            "column {name} is {}, expected object or array",
                            kind(&other)
                        ),
                    })
                }
            };

            for (index, cell) in indexed {
                let key = (index.parse::<u64>().ok(), index);
                rows.entry(key).or_default().insert(name.clone(), cell);
            }
            names.push(name);
        }

        Ok(Self {
            columns: names,
            rows: rows.into_values().collect(),
        })
    }

    fn rename_columns(self, cfg: &LoaderConfig) -> Self {
        let rename = |name: String| -> String {
            cfg.column_aliases
                .iter()
                .find(|(alias, _)| *alias == name)
                .map(|(_, canonical)| canonical.clone())
                .unwrap_or(name)
        };

        Self {
            columns: self.columns.into_iter().map(rename).collect(),
            rows: self
                .rows
                .into_iter()
                .map(|fields| {
                    fields
                        .into_iter()
                        .map(|(key, value)| (rename(key), value))
                        .collect()
                })
                .collect(),
        }
    }
}

struct RowFields<'a> {
    path: &'a Path,
    row: usize,
    fields: &'a Map<String, Value>,
}

impl RowFields<'_> {
    fn to_transaction(&self) -> Result<Transaction, LoadError> {
        let year = self.int("year")?;
        let month = self.int("month")?;
        let day = self.int("day")?;
        let date = calendar_date(year, month, day).ok_or_else(|| LoadError::InvalidDate {
            path: self.path.to_path_buf(),
            row: self.row,
            year,
            month,
            day,
        })?;

        Ok(Transaction {
            country: self.text("country")?,
            customer_id: self.optional_identifier("customer_id")?,
            invoice: digits_only(&self.identifier("invoice")?),
            stream_id: self.identifier("stream_id")?,
            price: self.float("price")?,
            times_viewed: self.int("times_viewed")?,
            date,
        })
    }

    fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    fn parse_error(&self, field: &'static str) -> LoadError {
        LoadError::ParseField {
            path: self.path.to_path_buf(),
            row: self.row,
            field,
            value: self.value(field).to_string(),
        }
    }

    fn float(&self, field: &'static str) -> Result<f64, LoadError> {
        json_f64(self.value(field)).ok_or_else(|| self.parse_error(field))
    }

    fn int(&self, field: &'static str) -> Result<i64, LoadError> {
        json_i64(self.value(field)).ok_or_else(|| self.parse_error(field))
    }

    fn text(&self, field: &'static str) -> Result<String, LoadError> {
        match self.value(field) {
            Value::String(text) => Ok(text.clone()),
            _ => Err(self.parse_error(field)),
        }
    }

    fn identifier(&self, field: &'static str) -> Result<String, LoadError> {
        json_identifier(self.value(field)).ok_or_else(|| self.parse_error(field))
    }

    fn optional_identifier(&self, field: &'static str) -> Result<Option<String>, LoadError> {
        match self.value(field) {
            Value::Null => Ok(None),
            value => json_identifier(value)
                .map(Some)
                .ok_or_else(|| self.parse_error(field)),
        }
    }
}

fn calendar_date(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Largest magnitude at which every integral `f64` is exact (2^53).
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|v| v.fract() == 0.0 && v.abs() <= MAX_EXACT_FLOAT_INT)
                .map(|v| v as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn json_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => {
            if let Some(v) = number.as_i64() {
                return Some(v.to_string());
            }
            if let Some(v) = number.as_u64() {
                return Some(v.to_string());
            }
            let v = number.as_f64()?;
            if v.is_finite() && v.fract() == 0.0 {
                Some(format!("{v:.0}"))
            } else {
                Some(v.to_string())
            }
        }
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
