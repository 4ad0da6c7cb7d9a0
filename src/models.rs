use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InsightError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolmentRecord {
    pub state: String,
    pub district: String,
    pub date: NaiveDate,
    pub count: i64,
}

/// Daily enrolment counts with strictly increasing dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentSeries {
    points: Vec<(NaiveDate, f64)>,
}

impl EnrollmentSeries {
    pub fn new(points: Vec<(NaiveDate, f64)>) -> Result<Self> {
        for pair in points.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(InsightError::InvalidSeries(format!(
                    "dates must be strictly increasing ({} follows {})",
                    pair[1].0, pair[0].0
                )));
            }
        }
        if let Some((date, count)) = points.iter().find(|(_, c)| !c.is_finite() || *c < 0.0) {
            return Err(InsightError::InvalidSeries(format!(
                "count {count} on {date} is not a non-negative number"
            )));
        }
        Ok(Self { points })
    }

    /// Sums per-day counts and fills calendar gaps with zero so that day
    /// offsets and row positions coincide.
    pub fn from_daily_totals(totals: &std::collections::BTreeMap<NaiveDate, i64>) -> Result<Self> {
        let (first, last) = match (totals.keys().next(), totals.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Self::new(Vec::new()),
        };

        let mut points = Vec::with_capacity((last - first).num_days() as usize + 1);
        let mut day = first;
        while day <= last {
            let count = totals.get(&day).copied().unwrap_or(0);
            points.push((day, count as f64));
            day += Duration::days(1);
        }
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(date, _)| *date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(date, _)| *date)
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, value)| *value).collect()
    }

    pub fn history(&self) -> Vec<HistoricalPoint> {
        self.points
            .iter()
            .map(|(date, value)| HistoricalPoint {
                date: *date,
                value: *value,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub t: i64,
    pub lag7: f64,
    pub roll7: f64,
    pub target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvMetrics {
    /// `None` when no fold could be fitted.
    pub mae: Option<f64>,
    /// Percentage; `None` when every scored fold had only zero actuals.
    pub mape: Option<f64>,
    /// Folds actually scored.
    pub folds: usize,
    pub mape_folds: usize,
    /// Folds whose training prefix was too degenerate to fit.
    pub skipped_folds: usize,
}

impl CvMetrics {
    pub fn summary(&self) -> String {
        match self.mae {
            Some(mae) => format!(
                "cv mae {:.2}, mape {} over {} folds",
                mae,
                self.mape
                    .map(|m| format!("{m:.2}%"))
                    .unwrap_or_else(|| "n/a".to_string()),
                self.folds
            ),
            None => "no cv fold could be scored".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub state: String,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub feature_order: Vec<String>,
    pub training_window: TrainingWindow,
    pub sample_count: usize,
    pub cv_metrics: CvMetrics,
    pub alpha: f64,
    pub trained_at: DateTime<Utc>,
    /// Last observed daily counts, oldest first.
    pub recent_values: Vec<f64>,
}

impl TrainedModel {
    pub fn coefficient(&self, feature: &str) -> Option<f64> {
        self.feature_order
            .iter()
            .position(|name| name == feature)
            .and_then(|idx| self.coefficients.get(idx).copied())
    }

    /// `recent_values` dated back from the end of the training window.
    pub fn recent_history(&self) -> Vec<HistoricalPoint> {
        let last = self.recent_values.len().saturating_sub(1);
        self.recent_values
            .iter()
            .enumerate()
            .map(|(idx, value)| HistoricalPoint {
                date: self.training_window.end - Duration::days((last - idx) as i64),
                value: *value,
            })
            .collect()
    }

    /// Calendar days covered by the training data.
    pub fn history_days(&self) -> i64 {
        (self.training_window.end - self.training_window.start).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Moderate,
    Severe,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskComponent {
    Gap,
    NegativeRatio,
    Volatility,
}

impl std::fmt::Display for RiskComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskComponent::Gap => "gap",
            RiskComponent::NegativeRatio => "negative_ratio",
            RiskComponent::Volatility => "volatility",
        };
        f.write_str(label)
    }
}

/// Share of the final risk score contributed by each weighted component, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentBreakdown {
    pub gap: f64,
    pub negative_ratio: f64,
    pub volatility: f64,
}

impl ComponentBreakdown {
    pub fn total(&self) -> f64 {
        self.gap + self.negative_ratio + self.volatility
    }

    /// Largest share; ties go to the earlier component.
    pub fn dominant(&self) -> RiskComponent {
        if self.gap >= self.negative_ratio && self.gap >= self.volatility {
            RiskComponent::Gap
        } else if self.negative_ratio >= self.volatility {
            RiskComponent::NegativeRatio
        } else {
            RiskComponent::Volatility
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictRiskRecord {
    pub district: String,
    pub gap_score: f64,
    pub negative_ratio_score: f64,
    pub volatility_score: f64,
    pub risk_score: f64,
    pub severity: Severity,
    pub breakdown_pct: ComponentBreakdown,
    pub district_total: i64,
    pub record_count: usize,
    pub active_days: usize,
    /// Daily district totals for the last 30 days of the window, oldest first.
    pub trend_data: Vec<f64>,
    pub recommendations: Vec<String>,
}

/// A district left unscored because its window holds too few days of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrictStatus {
    pub district: String,
    pub active_days: usize,
    pub required_days: usize,
}
