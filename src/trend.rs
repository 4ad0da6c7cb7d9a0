use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{ForecastPoint, TrainedModel};

/// Daily change, relative to the recent mean, below which a forecast is flat.
pub const STABLE_DAILY_CHANGE: f64 = 0.002;
pub const MODERATE_DAILY_CHANGE: f64 = 0.004;
pub const STRONG_DAILY_CHANGE: f64 = 0.01;
pub const MEDIUM_CONFIDENCE_DAYS: i64 = 270;
pub const LOW_CONFIDENCE_DAYS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Upward,
    Downward,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Medium,
    Low,
    VeryLow,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendDirection::Upward => "upward",
            TrendDirection::Downward => "downward",
            TrendDirection::Stable => "stable",
        })
    }
}

impl fmt::Display for TrendStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendStrength::Strong => "strong",
            TrendStrength::Moderate => "moderate",
            TrendStrength::Weak => "weak",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    /// Enrolments per day across the forecast.
    pub slope: f64,
    /// `slope` as a fraction of the recent observed mean.
    pub relative_slope: f64,
    pub strength: TrendStrength,
    pub confidence: Confidence,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub history_days: i64,
    pub quality_level: String,
    pub confidence: Confidence,
}

pub fn assess_data_quality(model: &TrainedModel) -> DataQuality {
    let history_days = model.history_days();
    let (confidence, quality_level) = if history_days >= MEDIUM_CONFIDENCE_DAYS {
        (Confidence::Medium, "Acceptable (9+ months)")
    } else if history_days >= LOW_CONFIDENCE_DAYS {
        (Confidence::Low, "Limited (6-8 months)")
    } else {
        (Confidence::VeryLow, "Insufficient (<6 months)")
    };

    DataQuality {
        history_days,
        quality_level: quality_level.to_string(),
        confidence,
    }
}

/// Direction and strength of the forecast relative to the scale of the
/// recent observed values, so the same bands apply to small and large states.
pub fn analyse_trend(
    forecast: &[ForecastPoint],
    recent_values: &[f64],
    confidence: Confidence,
) -> TrendAnalysis {
    let slope = match (forecast.first(), forecast.last()) {
        (Some(first), Some(last)) if forecast.len() >= 2 => {
            (last.value - first.value) / (forecast.len() - 1) as f64
        }
        _ => 0.0,
    };
    let baseline = if recent_values.is_empty() {
        0.0
    } else {
        recent_values.iter().sum::<f64>() / recent_values.len() as f64
    };
    let relative_slope = if baseline > 0.0 { slope / baseline } else { 0.0 };

    let direction = if relative_slope > STABLE_DAILY_CHANGE {
        TrendDirection::Upward
    } else if relative_slope < -STABLE_DAILY_CHANGE {
        TrendDirection::Downward
    } else {
        TrendDirection::Stable
    };
    let strength = if relative_slope.abs() > STRONG_DAILY_CHANGE {
        TrendStrength::Strong
    } else if relative_slope.abs() > MODERATE_DAILY_CHANGE {
        TrendStrength::Moderate
    } else {
        TrendStrength::Weak
    };

    TrendAnalysis {
        direction,
        slope,
        relative_slope,
        strength,
        confidence,
        interpretation: format!("Trend is {direction} with {strength} strength"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor;
    use crate::trainer::{self, tests::linear_series};
    use chrono::{Duration, NaiveDate};

    fn points(values: &[f64]) -> Vec<ForecastPoint> {
        let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(idx, value)| ForecastPoint {
                date: start + Duration::days(idx as i64),
                value: *value,
                lower: *value,
                upper: *value,
            })
            .collect()
    }

    #[test]
    fn rising_line_is_a_strong_upward_trend() {
        let model = trainer::train("Goa", &linear_series(27)).unwrap();
        let forecast = predictor::predict(&model, 7).unwrap();
        let trend = analyse_trend(&forecast, &model.recent_values, Confidence::VeryLow);

        assert!((trend.slope - 5.0).abs() < 0.1);
        assert_eq!(trend.direction, TrendDirection::Upward);
        assert_eq!(trend.strength, TrendStrength::Strong);
        assert_eq!(trend.interpretation, "Trend is upward with strong strength");
    }

    #[test]
    fn flat_and_falling_forecasts() {
        let recent = [100.0; 30];

        let flat = analyse_trend(&points(&[100.0, 100.1, 100.0]), &recent, Confidence::Low);
        assert_eq!(flat.direction, TrendDirection::Stable);
        assert_eq!(flat.strength, TrendStrength::Weak);

        let falling = analyse_trend(&points(&[100.0, 98.0, 96.0]), &recent, Confidence::Low);
        assert_eq!(falling.direction, TrendDirection::Downward);
        assert_eq!(falling.strength, TrendStrength::Strong);
        assert!((falling.relative_slope + 0.02).abs() < 1e-12);

        let single = analyse_trend(&points(&[100.0]), &recent, Confidence::Low);
        assert_eq!(single.slope, 0.0);
        assert_eq!(single.direction, TrendDirection::Stable);
    }

    #[test]
    fn zero_baseline_is_stable() {
        let trend = analyse_trend(&points(&[0.0, 5.0]), &[0.0; 10], Confidence::VeryLow);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.relative_slope, 0.0);
    }

    #[test]
    fn confidence_grows_with_history() {
        let mut model = trainer::train("Goa", &linear_series(27)).unwrap();
        let quality = assess_data_quality(&model);
        assert_eq!(quality.history_days, 27);
        assert_eq!(quality.confidence, Confidence::VeryLow);

        model.training_window.start = model.training_window.end - Duration::days(179);
        assert_eq!(assess_data_quality(&model).confidence, Confidence::Low);

        model.training_window.start = model.training_window.end - Duration::days(269);
        let quality = assess_data_quality(&model);
        assert_eq!(quality.history_days, 270);
        assert_eq!(quality.confidence, Confidence::Medium);
    }
}
