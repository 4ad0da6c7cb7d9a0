use std::path::PathBuf;

use crate::error::{InsightError, Result};
use crate::predictor::MAX_HORIZON_DAYS;

pub const DEFAULT_MODEL_DIR: &str = "data/models";
pub const DEFAULT_HORIZON_DAYS: usize = 30;
pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_RISK_LIMIT: usize = 20;
pub const MAX_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Csv(PathBuf),
    Postgres(String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub source: DataSource,
    pub model_dir: PathBuf,
}

impl Settings {
    /// A CSV file takes precedence over `DATABASE_URL` so offline runs work
    /// inside an environment that also has a database configured.
    pub fn resolve(
        csv: Option<PathBuf>,
        database_url: Option<String>,
        model_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let source = match (csv, database_url) {
            (Some(path), _) => DataSource::Csv(path),
            (None, Some(url)) if !url.trim().is_empty() => DataSource::Postgres(url),
            _ => {
                return Err(InsightError::InvalidArgument(
                    "set DATABASE_URL or pass --csv with an enrolment extract".to_string(),
                ))
            }
        };

        Ok(Self {
            source,
            model_dir: model_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
        })
    }
}

pub fn validate_horizon(horizon_days: usize) -> Result<usize> {
    if horizon_days == 0 || horizon_days > MAX_HORIZON_DAYS {
        return Err(InsightError::InvalidArgument(format!(
            "horizon must be between 1 and {MAX_HORIZON_DAYS} days"
        )));
    }
    Ok(horizon_days)
}

pub fn validate_window(window_days: i64) -> Result<i64> {
    if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
        return Err(InsightError::InvalidArgument(format!(
            "window must be between 1 and {MAX_WINDOW_DAYS} days"
        )));
    }
    Ok(window_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_wins_over_database_url() {
        let settings = Settings::resolve(
            Some(PathBuf::from("extract.csv")),
            Some("postgres://localhost/enrolment".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(settings.source, DataSource::Csv(PathBuf::from("extract.csv")));
        assert_eq!(settings.model_dir, PathBuf::from(DEFAULT_MODEL_DIR));
    }

    #[test]
    fn requires_some_data_source() {
        assert!(Settings::resolve(None, None, None).is_err());
        assert!(Settings::resolve(None, Some("  ".to_string()), None).is_err());
    }

    #[test]
    fn validates_ranges() {
        assert_eq!(validate_horizon(30).unwrap(), 30);
        assert!(validate_horizon(0).is_err());
        assert!(validate_horizon(366).is_err());
        assert!(validate_window(0).is_err());
        assert_eq!(validate_window(90).unwrap(), 90);
    }
}
