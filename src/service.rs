use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::config::{validate_horizon, validate_window};
use crate::error::{InsightError, Result};
use crate::models::{
    EnrollmentSeries, ForecastPoint, HistoricalPoint, TrainedModel, TrainingWindow,
};
use crate::predictor::{self, HORIZON_WIDENING, Z_95};
use crate::registry::ModelRegistry;
use crate::risk::{self, DistrictRiskReport};
use crate::states::resolve_state;
use crate::store::EnrolmentStore;
use crate::trainer::{self, CV_FOLDS, RECENT_VALUES};
use crate::trend::{self, DataQuality, TrendAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastMode {
    /// Retrain when no model exists or newer data arrived since the last run.
    TrainIfStale,
    /// Serve only what the registry holds.
    CachedOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub method: String,
    pub folds: usize,
    pub skipped_folds: usize,
    pub mae: Option<f64>,
    pub mape: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub model_type: String,
    pub alpha: f64,
    pub features: Vec<String>,
    pub training_window: TrainingWindow,
    pub sample_count: usize,
    pub validation: ValidationSummary,
    pub trained_at: DateTime<Utc>,
    pub interval_method: String,
    pub limitations: Vec<String>,
}

impl ModelMetadata {
    pub fn from_model(model: &TrainedModel) -> Self {
        Self {
            model_type: "ridge regression".to_string(),
            alpha: model.alpha,
            features: model.feature_order.clone(),
            training_window: model.training_window,
            sample_count: model.sample_count,
            validation: ValidationSummary {
                method: format!("walk-forward expanding window, {CV_FOLDS} folds"),
                folds: model.cv_metrics.folds,
                skipped_folds: model.cv_metrics.skipped_folds,
                mae: model.cv_metrics.mae,
                mape: model.cv_metrics.mape,
            },
            trained_at: model.trained_at,
            interval_method: format!(
                "±{Z_95} × standard deviation of the last {RECENT_VALUES} observed days, widened linearly by up to {:.0}% at the final horizon day",
                HORIZON_WIDENING * 100.0
            ),
            limitations: vec![
                "no yearly or multi-year seasonality is modelled".to_string(),
                "interval width uses recent raw variation, not cross-validated residuals, and likely understates uncertainty at long horizons".to_string(),
                "beyond seven days the lag feature is itself a forecast, so errors compound".to_string(),
                "shocks such as policy changes or disasters are not detected".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub state: String,
    pub horizon_days: usize,
    /// Observed daily totals: the full series when the store was read,
    /// otherwise the recent values kept on the model.
    pub historical: Vec<HistoricalPoint>,
    pub forecast: Vec<ForecastPoint>,
    pub trend_analysis: TrendAnalysis,
    pub data_quality: DataQuality,
    pub model_metadata: ModelMetadata,
}

#[derive(Debug)]
pub struct TrainOutcome {
    pub state: String,
    pub result: Result<Arc<TrainedModel>>,
}

pub async fn forecast(
    store: &dyn EnrolmentStore,
    registry: &dyn ModelRegistry,
    state: &str,
    horizon_days: usize,
    mode: ForecastMode,
) -> Result<ForecastResponse> {
    let state = resolve_state(state)?;
    let horizon_days = validate_horizon(horizon_days)?;

    let (model, historical) = match mode {
        ForecastMode::CachedOnly => {
            let model = registry
                .get(&state)?
                .ok_or_else(|| InsightError::ModelNotFound(state.clone()))?;
            let historical = model.recent_history();
            (model, historical)
        }
        ForecastMode::TrainIfStale => {
            let series = store.state_series(&state).await?;
            let historical = series.history();
            let model = match registry.get(&state)? {
                Some(model) if Some(model.training_window.end) >= series.last_date() => model,
                Some(_) => {
                    info!("model for {state} predates the latest data, retraining");
                    fit_and_store(registry, &state, series).await?
                }
                None => fit_and_store(registry, &state, series).await?,
            };
            (model, historical)
        }
    };

    let forecast = predictor::predict(&model, horizon_days)?;
    let data_quality = trend::assess_data_quality(&model);
    let trend_analysis =
        trend::analyse_trend(&forecast, &model.recent_values, data_quality.confidence);
    Ok(ForecastResponse {
        state,
        horizon_days,
        historical,
        forecast,
        trend_analysis,
        data_quality,
        model_metadata: ModelMetadata::from_model(&model),
    })
}

pub async fn district_risks(
    store: &dyn EnrolmentStore,
    state: &str,
    window_days: i64,
    limit: Option<usize>,
) -> Result<DistrictRiskReport> {
    let state = resolve_state(state)?;
    let window_days = validate_window(window_days)?;
    let records = store.window_records(&state, window_days).await?;
    Ok(risk::score_districts(&state, window_days, &records, limit))
}

pub async fn train(
    store: &dyn EnrolmentStore,
    registry: &dyn ModelRegistry,
    state: &str,
) -> Result<Arc<TrainedModel>> {
    let state = resolve_state(state)?;
    let series = store.state_series(&state).await?;
    fit_and_store(registry, &state, series).await
}

/// Fits every known state on its own blocking task so one slow or failing
/// state does not hold up the rest.
pub async fn train_all(
    store: &dyn EnrolmentStore,
    registry: &dyn ModelRegistry,
) -> Result<Vec<TrainOutcome>> {
    let mut pending = Vec::new();
    let mut outcomes = Vec::new();

    for state in store.known_states().await? {
        match store.state_series(&state).await {
            Ok(series) => {
                let task_state = state.clone();
                let handle =
                    tokio::task::spawn_blocking(move || trainer::train(&task_state, &series));
                pending.push((state, handle));
            }
            Err(err) => outcomes.push(TrainOutcome {
                state,
                result: Err(err),
            }),
        }
    }

    for (state, handle) in pending {
        let result = match handle.await {
            Ok(Ok(model)) => {
                let model = Arc::new(model);
                registry.put(model.as_ref().clone()).map(|_| model)
            }
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(InsightError::TaskFailed {
                state: state.clone(),
                reason: join_err.to_string(),
            }),
        };
        if let Err(err) = &result {
            warn!("training {state} failed: {err}");
        }
        outcomes.push(TrainOutcome { state, result });
    }

    outcomes.sort_by(|a, b| a.state.cmp(&b.state));
    Ok(outcomes)
}

async fn fit_and_store(
    registry: &dyn ModelRegistry,
    state: &str,
    series: EnrollmentSeries,
) -> Result<Arc<TrainedModel>> {
    let task_state = state.to_string();
    let model = tokio::task::spawn_blocking(move || trainer::train(&task_state, &series))
        .await
        .map_err(|err| InsightError::TaskFailed {
            state: state.to_string(),
            reason: err.to_string(),
        })??;

    let model = Arc::new(model);
    registry.put(model.as_ref().clone())?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrolmentRecord, Severity};
    use crate::registry::MemoryRegistry;
    use crate::store::MemoryStore;
    use chrono::{Duration, NaiveDate};

    fn linear_records(state: &str, days: usize) -> Vec<EnrolmentRecord> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        (0..days)
            .flat_map(|d| {
                let date = start + Duration::days(d as i64);
                let total = 100 + 5 * d as i64;
                vec![
                    EnrolmentRecord {
                        state: state.to_string(),
                        district: "Alpha".to_string(),
                        date,
                        count: total - 40,
                    },
                    EnrolmentRecord {
                        state: state.to_string(),
                        district: "Beta".to_string(),
                        date,
                        count: 40,
                    },
                ]
            })
            .collect()
    }

    #[tokio::test]
    async fn forecast_trains_on_first_request_and_reuses_model() {
        let store = MemoryStore::new(linear_records("Goa", 27));
        let registry = MemoryRegistry::new();

        let response = forecast(&store, &registry, "ga", 7, ForecastMode::TrainIfStale)
            .await
            .unwrap();
        assert_eq!(response.state, "Goa");
        assert_eq!(response.forecast.len(), 7);
        assert!((response.forecast[0].value - 235.0).abs() < 0.5);
        assert_eq!(response.model_metadata.features, vec!["t", "lag7", "roll7"]);
        assert_eq!(response.model_metadata.validation.folds, CV_FOLDS);
        assert_eq!(response.historical.len(), 27);
        assert_eq!(response.historical[26].value, 230.0);
        assert_eq!(
            response.trend_analysis.direction,
            crate::trend::TrendDirection::Upward
        );
        assert_eq!(response.data_quality.history_days, 27);
        assert!(!response.model_metadata.limitations.is_empty());

        let trained_at = registry.get("Goa").unwrap().unwrap().trained_at;
        forecast(&store, &registry, "Goa", 7, ForecastMode::TrainIfStale)
            .await
            .unwrap();
        assert_eq!(registry.get("Goa").unwrap().unwrap().trained_at, trained_at);
    }

    #[tokio::test]
    async fn stale_model_is_retrained() {
        let registry = MemoryRegistry::new();
        let old = MemoryStore::new(linear_records("Goa", 30));
        train(&old, &registry, "Goa").await.unwrap();

        let newer = MemoryStore::new(linear_records("Goa", 40));
        forecast(&newer, &registry, "Goa", 3, ForecastMode::TrainIfStale)
            .await
            .unwrap();
        assert_eq!(registry.get("Goa").unwrap().unwrap().sample_count, 33);
    }

    #[tokio::test]
    async fn cached_mode_needs_a_trained_model() {
        let store = MemoryStore::new(linear_records("Goa", 30));
        let registry = MemoryRegistry::new();

        let err = forecast(&store, &registry, "Goa", 7, ForecastMode::CachedOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::ModelNotFound(ref state) if state == "Goa"));

        train(&store, &registry, "Goa").await.unwrap();
        let cached = forecast(&store, &registry, "Goa", 7, ForecastMode::CachedOnly)
            .await
            .unwrap();
        let last = cached.historical.last().unwrap();
        assert_eq!(cached.historical.len(), RECENT_VALUES);
        assert_eq!(last.date, NaiveDate::from_ymd_opt(2025, 1, 30).unwrap());
        assert_eq!(last.value, 245.0);
        assert_eq!(cached.forecast[0].date, last.date + Duration::days(1));
    }

    #[tokio::test]
    async fn forecast_surfaces_structured_errors() {
        let store = MemoryStore::new(linear_records("Goa", 10));
        let registry = MemoryRegistry::new();

        let short = forecast(&store, &registry, "Goa", 7, ForecastMode::TrainIfStale).await;
        assert!(matches!(
            short,
            Err(InsightError::InsufficientData { available: 3, required: 20, .. })
        ));

        let unknown = forecast(&store, &registry, "Kerala", 7, ForecastMode::TrainIfStale).await;
        assert!(matches!(unknown, Err(InsightError::UnknownState(_))));
    }

    #[tokio::test]
    async fn train_all_reports_each_state() {
        let mut records = linear_records("Goa", 30);
        records.extend(linear_records("Kerala", 12));
        let store = MemoryStore::new(records);
        let registry = MemoryRegistry::new();

        let outcomes = train_all(&store, &registry).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
        assert_eq!(registry.states().unwrap(), vec!["Goa".to_string()]);
    }

    #[tokio::test]
    async fn district_risks_scores_the_window() {
        let store = MemoryStore::new(linear_records("Goa", 45));

        let report = district_risks(&store, "Goa", 30, None).await.unwrap();
        assert_eq!(report.state, "Goa");
        assert_eq!(report.scored_count, 2);
        assert!(report.insufficient.is_empty());
        assert_eq!(report.districts[0].district, "Beta");
        assert_eq!(report.districts[0].severity, Severity::Moderate);
        assert_eq!(report.districts[1].severity, Severity::Low);

        let again = district_risks(&store, "Goa", 30, None).await.unwrap();
        assert_eq!(report.districts, again.districts);

        assert!(matches!(
            district_risks(&store, "Kerala", 30, None).await,
            Err(InsightError::UnknownState(_))
        ));
    }
}
