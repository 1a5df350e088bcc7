//! SQLite cache of daily aggregates.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::info;

use crate::aggregate::{CountrySelection, DailyAggregate};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored date '{0}'")]
    InvalidDate(String),
}

pub struct AggregateStore {
    conn: Connection,
}

impl AggregateStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS daily_aggregates (
                country TEXT NOT NULL,
                date TEXT NOT NULL,
                purchases INTEGER NOT NULL,
                unique_invoices INTEGER NOT NULL,
                unique_streams INTEGER NOT NULL,
                total_views INTEGER NOT NULL,
                revenue REAL NOT NULL,
                PRIMARY KEY(country, date)
            ) WITHOUT ROWID;
            ",
        )?;

        Ok(Self { conn })
    }

    /// Writes all rows in one transaction; existing `(country, date)` keys are replaced.
    pub fn upsert(&mut self, rows: &[DailyAggregate]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO daily_aggregates (
                    country,
                    date,
                    purchases,
                    unique_invoices,
                    unique_streams,
                    total_views,
                    revenue
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(country, date) DO UPDATE SET
                    purchases = excluded.purchases,
                    unique_invoices = excluded.unique_invoices,
                    unique_streams = excluded.unique_streams,
                    total_views = excluded.total_views,
                    revenue = excluded.revenue
                ",
            )?;

            for row in rows {
                stmt.execute(params![
                    row.country,
                    row.date.format(DATE_FORMAT).to_string(),
                    row.purchases as i64,
                    row.unique_invoices as i64,
                    row.unique_streams as i64,
                    row.total_views,
                    row.revenue,
                ])?;
            }
        }
        tx.commit()?;

        info!(
            component = "store",
            event = "store.upsert.finish",
            rows = rows.len()
        );
        Ok(())
    }

    /// Reads rows back ordered by country, then date.
    pub fn load(&self, selection: &CountrySelection) -> Result<Vec<DailyAggregate>, StoreError> {
        let country = match selection {
            CountrySelection::All => None,
            CountrySelection::Only(country) => Some(country.as_str()),
        };

        let mut stmt = self.conn.prepare(
            "
            SELECT
                country,
                date,
                purchases,
                unique_invoices,
                unique_streams,
                total_views,
                revenue
            FROM daily_aggregates
            WHERE ?1 IS NULL OR country = ?1
            ORDER BY country ASC, date ASC
            ",
        )?;

        let mut rows = stmt.query(params![country])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_date: String = row.get(1)?;
            let date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT)
                .map_err(|_| StoreError::InvalidDate(raw_date.clone()))?;
            let purchases: i64 = row.get(2)?;
            let unique_invoices: i64 = row.get(3)?;
            let unique_streams: i64 = row.get(4)?;

            out.push(DailyAggregate {
                country: row.get(0)?,
                date,
                purchases: purchases as u64,
                unique_invoices: unique_invoices as u64,
                unique_streams: unique_streams as u64,
                total_views: row.get(5)?,
                revenue: row.get(6)?,
            });
        }

        Ok(out)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM daily_aggregates", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
