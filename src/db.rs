use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{InsightError, Result};
use crate::models::{EnrolmentRecord, EnrollmentSeries};
use crate::store::{window_start, CsvRow, EnrolmentStore};

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let record = row.into_record()?;

        let result = sqlx::query(
            r#"
            INSERT INTO enrolment.records
            (id, state, district, record_date, count, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.state)
        .bind(&record.district)
        .bind(record.date)
        .bind(record.count)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    info!("imported {inserted} records from {}", csv_path.display());
    Ok(inserted)
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn latest_date(&self, state: &str) -> Result<NaiveDate> {
        let latest: Option<NaiveDate> = sqlx::query(
            "SELECT MAX(record_date) AS latest FROM enrolment.records WHERE state = $1",
        )
        .bind(state)
        .fetch_one(&self.pool)
        .await?
        .get("latest");

        latest.ok_or_else(|| InsightError::UnknownState(state.to_string()))
    }
}

#[async_trait]
impl EnrolmentStore for PgStore {
    async fn known_states(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT state FROM enrolment.records ORDER BY state")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get::<String, _>("state")).collect())
    }

    async fn state_series(&self, state: &str) -> Result<EnrollmentSeries> {
        let rows = sqlx::query(
            r#"
            SELECT record_date, SUM(count)::BIGINT AS total
            FROM enrolment.records
            WHERE state = $1
            GROUP BY record_date
            ORDER BY record_date
            "#,
        )
        .bind(state)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(InsightError::UnknownState(state.to_string()));
        }

        let totals: BTreeMap<NaiveDate, i64> = rows
            .into_iter()
            .map(|row| {
                let date: NaiveDate = row.get("record_date");
                let total: i64 = row.get("total");
                (date, total)
            })
            .collect();
        EnrollmentSeries::from_daily_totals(&totals)
    }

    async fn window_records(&self, state: &str, window_days: i64) -> Result<Vec<EnrolmentRecord>> {
        let latest = self.latest_date(state).await?;
        let start = window_start(latest, window_days);

        let rows = sqlx::query(
            r#"
            SELECT state, district, record_date, count
            FROM enrolment.records
            WHERE state = $1 AND record_date BETWEEN $2 AND $3
            ORDER BY district, record_date
            "#,
        )
        .bind(state)
        .bind(start)
        .bind(latest)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(EnrolmentRecord {
                state: row.get("state"),
                district: row.get("district"),
                date: row.get("record_date"),
                count: row.get("count"),
            });
        }
        Ok(records)
    }
}
