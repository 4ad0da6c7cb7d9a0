use std::ops::Range;

use chrono::Utc;
use log::{debug, info, warn};

use crate::error::{InsightError, Result};
use crate::features::{build_features, feature_vector, FEATURE_ORDER};
use crate::models::{CvMetrics, EnrollmentSeries, FeatureRow, TrainedModel, TrainingWindow};
use crate::ridge;

pub const RIDGE_ALPHA: f64 = 1.0;
pub const CV_FOLDS: usize = 5;
pub const MIN_FEATURE_ROWS: usize = 20;
/// Observed values kept on the model for the prediction buffer and interval width.
pub const RECENT_VALUES: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

/// Expanding-window splits: every fold trains on a prefix and validates on
/// the block right after it, so validation never precedes training.
pub fn walk_forward_folds(rows: usize, folds: usize) -> Vec<Fold> {
    if folds == 0 {
        return Vec::new();
    }
    let block = rows / (folds + 1);
    if block == 0 {
        return Vec::new();
    }

    (0..folds)
        .map(|k| {
            let train_end = rows - (folds - k) * block;
            Fold {
                train: 0..train_end,
                validation: train_end..train_end + block,
            }
        })
        .collect()
}

pub fn train(state: &str, series: &EnrollmentSeries) -> Result<TrainedModel> {
    let rows = build_features(series);
    if rows.len() < MIN_FEATURE_ROWS {
        return Err(InsightError::insufficient(state, rows.len(), MIN_FEATURE_ROWS));
    }
    let (start, end) = match (series.first_date(), series.last_date()) {
        (Some(start), Some(end)) => (start, end),
        _ => return Err(InsightError::insufficient(state, 0, MIN_FEATURE_ROWS)),
    };

    let cv_metrics = cross_validate(state, &rows, CV_FOLDS)?;
    let fit = fit_rows(&rows)?;

    let values = series.values();
    let recent_values = values[values.len().saturating_sub(RECENT_VALUES)..].to_vec();

    info!(
        "trained {} on {} rows from {} days ({} to {}), cv mae {:?} over {} folds",
        state,
        rows.len(),
        series.len(),
        start,
        end,
        cv_metrics.mae,
        cv_metrics.folds
    );

    Ok(TrainedModel {
        state: state.to_string(),
        coefficients: fit.coefficients,
        intercept: fit.intercept,
        feature_order: FEATURE_ORDER.iter().map(|name| name.to_string()).collect(),
        training_window: TrainingWindow { start, end },
        sample_count: rows.len(),
        cv_metrics,
        alpha: RIDGE_ALPHA,
        trained_at: Utc::now(),
        recent_values,
    })
}

fn fit_rows(rows: &[FeatureRow]) -> Result<ridge::RidgeFit> {
    let features: Vec<Vec<f64>> = rows.iter().map(|row| feature_vector(row).to_vec()).collect();
    let targets: Vec<f64> = rows.iter().map(|row| row.target).collect();
    ridge::fit(&features, &targets, RIDGE_ALPHA, &FEATURE_ORDER)
}

pub fn cross_validate(state: &str, rows: &[FeatureRow], folds: usize) -> Result<CvMetrics> {
    let splits = walk_forward_folds(rows.len(), folds);
    let mut mae_scores = Vec::with_capacity(splits.len());
    let mut mape_scores = Vec::with_capacity(splits.len());
    let mut skipped = 0;

    for (idx, fold) in splits.iter().enumerate() {
        // a short prefix of sparse data can have a constant column; only the
        // final fit on every row decides whether the state is trainable
        let fit = match fit_rows(&rows[fold.train.clone()]) {
            Ok(fit) => fit,
            Err(InsightError::NumericInstability(reason)) => {
                warn!(
                    "{} fold {} skipped, train {:?}: {}",
                    state, idx, fold.train, reason
                );
                skipped += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        let validation = &rows[fold.validation.clone()];
        let predicted: Vec<f64> = validation
            .iter()
            .map(|row| fit.predict(&feature_vector(row)))
            .collect();
        let actual: Vec<f64> = validation.iter().map(|row| row.target).collect();

        let fold_mae = mean_absolute_error(&actual, &predicted);
        let fold_mape = mean_absolute_percentage_error(&actual, &predicted);
        debug!(
            "{} fold {}: train {:?} validate {:?} mae {:.3} mape {:?}",
            state, idx, fold.train, fold.validation, fold_mae, fold_mape
        );

        mae_scores.push(fold_mae);
        if let Some(mape) = fold_mape {
            mape_scores.push(mape);
        }
    }

    Ok(CvMetrics {
        mae: mean(&mae_scores),
        mape: mean(&mape_scores),
        folds: mae_scores.len(),
        mape_folds: mape_scores.len(),
        skipped_folds: skipped,
    })
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .collect();
    mean(&errors).unwrap_or(0.0)
}

/// Percent error over points with a non-zero actual; `None` if there are none.
pub fn mean_absolute_percentage_error(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| ((a - p) / a).abs() * 100.0)
        .collect();
    mean(&errors)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
