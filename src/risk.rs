use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::models::{
    ComponentBreakdown, DistrictRiskRecord, DistrictStatus, EnrolmentRecord, Severity,
};

pub const MIN_ACTIVE_DAYS: usize = 30;
pub const GAP_WEIGHT: f64 = 0.4;
pub const NEGATIVE_RATIO_WEIGHT: f64 = 0.4;
pub const VOLATILITY_WEIGHT: f64 = 0.2;
pub const SEVERE_THRESHOLD: f64 = 7.0;
pub const MODERATE_THRESHOLD: f64 = 4.0;
/// Daily totals returned per district for the dashboard sparkline.
pub const TREND_POINTS: usize = 30;
const MAX_COMPONENT: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighestRisk {
    pub district: String,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMethodology {
    pub components: Vec<String>,
    pub weights: ComponentWeights,
    pub severity_thresholds: SeverityThresholds,
    pub min_active_days: usize,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub limitations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub gap: f64,
    pub negative_ratio: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub severe: f64,
    pub moderate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictRiskReport {
    pub state: String,
    pub window_days: i64,
    pub state_avg: f64,
    pub districts: Vec<DistrictRiskRecord>,
    pub insufficient: Vec<DistrictStatus>,
    pub scored_count: usize,
    pub avg_risk_score: f64,
    pub critical_count: usize,
    pub highest_risk_district: Option<HighestRisk>,
    pub methodology: RiskMethodology,
}

#[derive(Debug, Default)]
struct DistrictWindow {
    total: i64,
    records: usize,
    daily: BTreeMap<NaiveDate, i64>,
}

impl DistrictWindow {
    fn active_days(&self) -> usize {
        self.daily.len()
    }

    /// The last `TREND_POINTS` days up to `end`, zero where nothing was recorded.
    fn trend(&self, end: NaiveDate) -> Vec<f64> {
        (0..TREND_POINTS)
            .map(|idx| {
                let day = end - Duration::days((TREND_POINTS - 1 - idx) as i64);
                self.daily.get(&day).copied().unwrap_or(0) as f64
            })
            .collect()
    }
}

/// Scores every district present in `records`. Districts without enough
/// active days are listed in `insufficient` instead of failing the batch.
pub fn score_districts(
    state: &str,
    window_days: i64,
    records: &[EnrolmentRecord],
    limit: Option<usize>,
) -> DistrictRiskReport {
    let mut windows: BTreeMap<&str, DistrictWindow> = BTreeMap::new();
    for record in records {
        let entry = windows.entry(record.district.as_str()).or_default();
        entry.total += record.count;
        entry.records += 1;
        *entry.daily.entry(record.date).or_insert(0) += record.count;
    }
    let window_end = records.iter().map(|r| r.date).max();

    let state_avg = if windows.is_empty() {
        0.0
    } else {
        windows.values().map(|w| w.total as f64).sum::<f64>() / windows.len() as f64
    };

    let mut districts = Vec::new();
    let mut insufficient = Vec::new();
    for (district, window) in windows.iter() {
        let end = match window_end {
            Some(end) if window.active_days() >= MIN_ACTIVE_DAYS => end,
            _ => {
                warn!(
                    "{}/{}: {} active days in window, {} required",
                    state,
                    district,
                    window.active_days(),
                    MIN_ACTIVE_DAYS
                );
                insufficient.push(DistrictStatus {
                    district: district.to_string(),
                    active_days: window.active_days(),
                    required_days: MIN_ACTIVE_DAYS,
                });
                continue;
            }
        };
        districts.push(score_district(district, window, state_avg, end));
    }

    districts.sort_by(|a, b| {
        b.risk_score
            .partial_cmp(&a.risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.district.cmp(&b.district))
    });

    let scored_count = districts.len();
    let critical_count = districts
        .iter()
        .filter(|d| d.severity == Severity::Severe)
        .count();
    let avg_risk_score = if scored_count == 0 {
        0.0
    } else {
        districts.iter().map(|d| d.risk_score).sum::<f64>() / scored_count as f64
    };
    let highest_risk_district = districts.first().map(|d| HighestRisk {
        district: d.district.clone(),
        risk_score: d.risk_score,
    });
    if let Some(limit) = limit {
        districts.truncate(limit);
    }

    info!(
        "scored {} districts in {} ({} skipped, {} severe)",
        scored_count,
        state,
        insufficient.len(),
        critical_count
    );

    DistrictRiskReport {
        state: state.to_string(),
        window_days,
        state_avg,
        districts,
        insufficient,
        scored_count,
        avg_risk_score,
        critical_count,
        highest_risk_district,
        methodology: methodology(records),
    }
}

fn score_district(
    district: &str,
    window: &DistrictWindow,
    state_avg: f64,
    window_end: NaiveDate,
) -> DistrictRiskRecord {
    let total = window.total as f64;
    let gap_score = gap_score(total, state_avg);
    let negative_ratio_score = negative_ratio_score(total, state_avg);
    let volatility_score = volatility_score(window.records);
    let (risk_score, breakdown_pct) =
        composite(gap_score, negative_ratio_score, volatility_score);
    let severity = severity_for(risk_score);
    debug_assert!((breakdown_pct.total() - 100.0).abs() < 0.01);

    DistrictRiskRecord {
        district: district.to_string(),
        gap_score,
        negative_ratio_score,
        volatility_score,
        risk_score,
        severity,
        breakdown_pct,
        district_total: window.total,
        record_count: window.records,
        active_days: window.active_days(),
        trend_data: window.trend(window_end),
        recommendations: recommendations(severity, district),
    }
}

pub fn gap_score(district_total: f64, state_avg: f64) -> f64 {
    if state_avg <= 0.0 {
        return 0.0;
    }
    ((district_total - state_avg).abs() / state_avg).clamp(0.0, 1.0) * MAX_COMPONENT
}

pub fn negative_ratio_score(district_total: f64, state_avg: f64) -> f64 {
    if state_avg <= 0.0 || district_total >= state_avg {
        return 0.0;
    }
    ((state_avg - district_total) / state_avg * MAX_COMPONENT).min(MAX_COMPONENT)
}

/// Inverse record density, a stand-in for reporting consistency.
pub fn volatility_score(record_count: usize) -> f64 {
    if record_count == 0 {
        return MAX_COMPONENT;
    }
    (100.0 / record_count as f64).min(MAX_COMPONENT)
}

/// Weighted score and each component's share of it in percent.
pub fn composite(gap: f64, negative_ratio: f64, volatility: f64) -> (f64, ComponentBreakdown) {
    let contributions = [
        gap * GAP_WEIGHT,
        negative_ratio * NEGATIVE_RATIO_WEIGHT,
        volatility * VOLATILITY_WEIGHT,
    ];
    let total: f64 = contributions.iter().sum();
    let score = total.clamp(0.0, MAX_COMPONENT);

    // a zero score has no contributions to share out
    let shares = if total > 0.0 {
        contributions.map(|c| c / total * 100.0)
    } else {
        [0.0; 3]
    };

    (
        score,
        ComponentBreakdown {
            gap: shares[0],
            negative_ratio: shares[1],
            volatility: shares[2],
        },
    )
}

pub fn severity_for(risk_score: f64) -> Severity {
    if risk_score >= SEVERE_THRESHOLD {
        Severity::Severe
    } else if risk_score >= MODERATE_THRESHOLD {
        Severity::Moderate
    } else {
        Severity::Low
    }
}

pub fn recommendations(severity: Severity, district: &str) -> Vec<String> {
    match severity {
        Severity::Severe => vec![
            format!("Immediate intervention required in {district}"),
            "Deploy additional enrolment centres to reduce the gap".to_string(),
            "Run awareness campaigns to lift enrolment rates".to_string(),
        ],
        Severity::Moderate => vec![
            format!("Monitor {district} closely for trend changes"),
            "Optimise existing centre operations".to_string(),
            "Review and address common enrolment barriers".to_string(),
        ],
        Severity::Low => vec![
            format!("{district} is performing well; maintain current strategies"),
            "Share practices with neighbouring districts".to_string(),
            "Continue regular monitoring and data quality checks".to_string(),
        ],
    }
}

fn methodology(records: &[EnrolmentRecord]) -> RiskMethodology {
    RiskMethodology {
        components: vec![
            "gap: |district_total - state_avg| / state_avg, capped at 1, scaled to 10".to_string(),
            "negative_ratio: shortfall below state_avg as a fraction, scaled to 10".to_string(),
            "volatility: min(10, 100 / record_count)".to_string(),
        ],
        weights: ComponentWeights {
            gap: GAP_WEIGHT,
            negative_ratio: NEGATIVE_RATIO_WEIGHT,
            volatility: VOLATILITY_WEIGHT,
        },
        severity_thresholds: SeverityThresholds {
            severe: SEVERE_THRESHOLD,
            moderate: MODERATE_THRESHOLD,
        },
        min_active_days: MIN_ACTIVE_DAYS,
        window_start: records.iter().map(|r| r.date).min(),
        window_end: records.iter().map(|r| r.date).max(),
        limitations: vec![
            "volatility is a record-density proxy, not a statistical variance".to_string(),
            "scores rank districts within one state and are not comparable across states"
                .to_string(),
            "the score flags shortfall; it does not diagnose its cause".to_string(),
        ],
    }
}
