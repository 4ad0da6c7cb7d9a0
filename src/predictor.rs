use std::collections::VecDeque;

use chrono::Duration;
use log::info;

use crate::error::{InsightError, Result};
use crate::features::{LAG_DAYS, ROLL_WINDOW};
use crate::models::{ForecastPoint, TrainedModel};

pub const MAX_HORIZON_DAYS: usize = 365;
pub const Z_95: f64 = 1.96;
/// Interval width at the last horizon day relative to the first.
pub const HORIZON_WIDENING: f64 = 0.5;

/// Rolls the model forward one day at a time. The trailing buffer starts
/// with observed values and absorbs each prediction, so beyond seven days
/// the lag feature is itself a forecast.
pub fn predict(model: &TrainedModel, horizon_days: usize) -> Result<Vec<ForecastPoint>> {
    if horizon_days == 0 || horizon_days > MAX_HORIZON_DAYS {
        return Err(InsightError::InvalidArgument(format!(
            "horizon must be between 1 and {MAX_HORIZON_DAYS} days, got {horizon_days}"
        )));
    }
    if model.recent_values.len() < LAG_DAYS {
        return Err(InsightError::insufficient(
            format!("{} recent history", model.state),
            model.recent_values.len(),
            LAG_DAYS,
        ));
    }

    let weights = Weights::from_model(model)?;
    let gain = weights.loop_gain();
    if gain.is_nan() || gain >= 1.0 {
        return Err(InsightError::NumericInstability(format!(
            "forecast for {} would diverge: loop gain {:.3} (t {:.4}, lag7 {:.4}, roll7 {:.4})",
            model.state, gain, weights.t, weights.lag7, weights.roll7
        )));
    }
    let sigma = sample_std_dev(&model.recent_values);
    let last_date = model.training_window.end;
    let last_t = (model.training_window.end - model.training_window.start).num_days();

    let mut buffer: VecDeque<f64> = model.recent_values[model.recent_values.len() - LAG_DAYS..]
        .iter()
        .copied()
        .collect();

    let mut points = Vec::with_capacity(horizon_days);
    for day in 1..=horizon_days {
        let t = (last_t + day as i64) as f64;
        let lag7 = buffer[0];
        // six most recent values; the seventh is the day being predicted
        let prior_six: f64 = buffer.iter().skip(1).sum();
        let value = weights.solve(t, lag7, prior_six)?.max(0.0);

        buffer.pop_front();
        buffer.push_back(value);

        let horizon_factor = 1.0 + (day as f64 / horizon_days as f64) * HORIZON_WIDENING;
        let width = Z_95 * sigma * horizon_factor;
        points.push(ForecastPoint {
            date: last_date + Duration::days(day as i64),
            value,
            lower: (value - width).max(0.0),
            upper: value + width,
        });
    }

    info!(
        "forecast {} for {} days from {}",
        model.state, horizon_days, last_date
    );
    Ok(points)
}

struct Weights {
    intercept: f64,
    t: f64,
    lag7: f64,
    roll7: f64,
}

impl Weights {
    fn from_model(model: &TrainedModel) -> Result<Self> {
        let lookup = |name: &str| {
            model.coefficient(name).ok_or_else(|| {
                InsightError::NumericInstability(format!(
                    "model for {} has no coefficient for '{name}'",
                    model.state
                ))
            })
        };
        Ok(Self {
            intercept: model.intercept,
            t: lookup("t")?,
            lag7: lookup("lag7")?,
            roll7: lookup("roll7")?,
        })
    }

    /// Worst-case amplification of the buffered values through one step.
    /// Below one, the recursion is a contraction and cannot run away.
    fn loop_gain(&self) -> f64 {
        let window = ROLL_WINDOW as f64;
        let denominator = (1.0 - self.roll7 / window).abs();
        let feedback = self.lag7.abs() + (window - 1.0) * self.roll7.abs() / window;
        if denominator < 1e-9 {
            f64::INFINITY
        } else {
            feedback / denominator
        }
    }

    /// The rolling mean includes the predicted day, so
    /// `v = b + w_t·t + w_l·lag + w_r·(prior_six + v)/7` is solved for `v`.
    fn solve(&self, t: f64, lag7: f64, prior_six: f64) -> Result<f64> {
        let window = ROLL_WINDOW as f64;
        let denominator = 1.0 - self.roll7 / window;
        if denominator.abs() < 1e-9 {
            return Err(InsightError::NumericInstability(
                "rolling-mean weight makes the recursive forecast undefined".to_string(),
            ));
        }
        let value = (self.intercept + self.t * t + self.lag7 * lag7 + self.roll7 * prior_six / window)
            / denominator;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(InsightError::NumericInstability(
                "forecast diverged to a non-finite value".to_string(),
            ))
        }
    }
}

pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}
