//! Daily per-country summaries over loaded transactions.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::loader::Transaction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub country: String,
    pub date: NaiveDate,
    pub purchases: u64,
    pub unique_invoices: u64,
    pub unique_streams: u64,
    pub total_views: i64,
    pub revenue: f64,
}

/// Which countries a series is built from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CountrySelection {
    /// Every country pooled together.
    #[default]
    All,
    Only(String),
}

#[derive(Default)]
struct GroupAccumulator<'a> {
    purchases: u64,
    invoices: HashSet<&'a str>,
    streams: HashSet<&'a str>,
    total_views: i64,
    revenue: f64,
}

/// Groups by `(country, date)`; output is ordered by country, then date.
pub fn aggregate_daily(transactions: &[Transaction]) -> Vec<DailyAggregate> {
    let mut groups: BTreeMap<(&str, NaiveDate), GroupAccumulator<'_>> = BTreeMap::new();

    for tx in transactions {
        let group = groups.entry((tx.country.as_str(), tx.date)).or_default();
        group.purchases += 1;
        group.invoices.insert(tx.invoice.as_str());
        group.streams.insert(tx.stream_id.as_str());
        group.total_views += tx.times_viewed;
        group.revenue += tx.price;
    }

    let rows: Vec<DailyAggregate> = groups
        .into_iter()
        .map(|((country, date), group)| DailyAggregate {
            country: country.to_string(),
            date,
            purchases: group.purchases,
            unique_invoices: group.invoices.len() as u64,
            unique_streams: group.streams.len() as u64,
            total_views: group.total_views,
            revenue: group.revenue,
        })
        .collect();

    info!(
        component = "aggregate",
        event = "aggregate.daily.finish",
        input_rows = transactions.len(),
        output_rows = rows.len()
    );

    rows
}

/// Countries ordered by descending total revenue, ties broken by name.
pub fn countries_by_revenue(rows: &[DailyAggregate], limit: usize) -> Vec<String> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for row in rows {
        *totals.entry(row.country.as_str()).or_insert(0.0) += row.revenue;
    }

    let mut ranked: Vec<(&str, f64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(country, _)| country.to_string())
        .collect()
}

pub fn select_country(
    rows: &[DailyAggregate],
    selection: &CountrySelection,
) -> Vec<DailyAggregate> {
    match selection {
        CountrySelection::All => rows.to_vec(),
        CountrySelection::Only(country) => rows
            .iter()
            .filter(|row| row.country == *country)
            .cloned()
            .collect(),
    }
}
