use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use log::info;
use serde::Deserialize;

use crate::error::{InsightError, Result};
use crate::models::{EnrolmentRecord, EnrollmentSeries};
use crate::states::{normalize_district, resolve_state};

/// Read side of the persisted enrolment dataset. State names passed in are
/// already canonical.
#[async_trait]
pub trait EnrolmentStore: Send + Sync {
    async fn known_states(&self) -> Result<Vec<String>>;

    /// Daily totals for the whole state. Fails with `UnknownState` when the
    /// state has no records.
    async fn state_series(&self, state: &str) -> Result<EnrollmentSeries>;

    /// District records in the `window_days` days ending at the state's
    /// latest recorded date.
    async fn window_records(&self, state: &str, window_days: i64) -> Result<Vec<EnrolmentRecord>>;
}

/// First day of a window of `window_days` days that ends on `latest`.
pub fn window_start(latest: NaiveDate, window_days: i64) -> NaiveDate {
    latest - Duration::days(window_days.max(1) - 1)
}

/// Row layout shared by CSV import and the in-memory store.
#[derive(Debug, Deserialize)]
pub struct CsvRow {
    pub state: String,
    pub district: String,
    pub date: NaiveDate,
    pub count: i64,
    pub source_key: Option<String>,
}

impl CsvRow {
    pub fn into_record(self) -> Result<EnrolmentRecord> {
        if self.count < 0 {
            return Err(InsightError::InvalidSeries(format!(
                "negative count {} for {} / {} on {}",
                self.count, self.state, self.district, self.date
            )));
        }
        Ok(EnrolmentRecord {
            state: resolve_state(&self.state)?,
            district: normalize_district(&self.district),
            date: self.date,
            count: self.count,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Vec<EnrolmentRecord>,
}

impl MemoryStore {
    pub fn new(records: Vec<EnrolmentRecord>) -> Self {
        Self { records }
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for row in reader.deserialize::<CsvRow>() {
            records.push(row?.into_record()?);
        }
        info!("loaded {} records from {}", records.len(), path.display());
        Ok(Self::new(records))
    }

    fn for_state<'a>(&'a self, state: &'a str) -> impl Iterator<Item = &'a EnrolmentRecord> + 'a {
        self.records.iter().filter(move |r| r.state == state)
    }
}

#[async_trait]
impl EnrolmentStore for MemoryStore {
    async fn known_states(&self) -> Result<Vec<String>> {
        let states: BTreeSet<&str> = self.records.iter().map(|r| r.state.as_str()).collect();
        Ok(states.into_iter().map(str::to_string).collect())
    }

    async fn state_series(&self, state: &str) -> Result<EnrollmentSeries> {
        let mut totals: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for record in self.for_state(state) {
            *totals.entry(record.date).or_insert(0) += record.count;
        }
        if totals.is_empty() {
            return Err(InsightError::UnknownState(state.to_string()));
        }
        EnrollmentSeries::from_daily_totals(&totals)
    }

    async fn window_records(&self, state: &str, window_days: i64) -> Result<Vec<EnrolmentRecord>> {
        let latest = self
            .for_state(state)
            .map(|r| r.date)
            .max()
            .ok_or_else(|| InsightError::UnknownState(state.to_string()))?;
        let start = window_start(latest, window_days);

        Ok(self
            .for_state(state)
            .filter(|r| r.date >= start && r.date <= latest)
            .cloned()
            .collect())
    }
}
