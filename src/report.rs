use std::fmt::Write;

use crate::error::Result;
use crate::models::Severity;
use crate::risk::DistrictRiskReport;
use crate::service::ForecastResponse;

pub struct SeverityMix {
    pub severity: Severity,
    pub count: usize,
    pub avg_risk: f64,
}

pub fn summarize_by_severity(report: &DistrictRiskReport) -> Vec<SeverityMix> {
    let mut mix: Vec<SeverityMix> = [Severity::Severe, Severity::Moderate, Severity::Low]
        .into_iter()
        .map(|severity| {
            let scores: Vec<f64> = report
                .districts
                .iter()
                .filter(|d| d.severity == severity)
                .map(|d| d.risk_score)
                .collect();
            SeverityMix {
                severity,
                count: scores.len(),
                avg_risk: if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                },
            }
        })
        .collect();

    mix.retain(|entry| entry.count > 0);
    mix
}

fn format_metric(value: Option<f64>, suffix: &str) -> String {
    value
        .map(|v| format!("{v:.2}{suffix}"))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn build_report(forecast: &Result<ForecastResponse>, risks: &DistrictRiskReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Enrolment Outlook: {}", risks.state);
    match (risks.methodology.window_start, risks.methodology.window_end) {
        (Some(start), Some(end)) => {
            let _ = writeln!(
                output,
                "Risk window of {} days ({} to {})",
                risks.window_days, start, end
            );
        }
        _ => {
            let _ = writeln!(output, "Risk window of {} days (no records)", risks.window_days);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Forecast");
    match forecast {
        Ok(response) => {
            let meta = &response.model_metadata;
            let _ = writeln!(
                output,
                "Ridge model trained on {} rows ({} to {}); CV MAE {}, MAPE {} over {} folds",
                meta.sample_count,
                meta.training_window.start,
                meta.training_window.end,
                format_metric(meta.validation.mae, ""),
                format_metric(meta.validation.mape, "%"),
                meta.validation.folds
            );
            let _ = writeln!(
                output,
                "{} (slope {:.1} per day); data quality: {}",
                response.trend_analysis.interpretation,
                response.trend_analysis.slope,
                response.data_quality.quality_level
            );
            let _ = writeln!(output);
            for point in response.forecast.iter().take(14) {
                let _ = writeln!(
                    output,
                    "- {}: {:.0} (range {:.0} to {:.0})",
                    point.date, point.value, point.lower, point.upper
                );
            }
            if response.forecast.len() > 14 {
                let _ = writeln!(
                    output,
                    "- ... {} more days",
                    response.forecast.len() - 14
                );
            }
            let _ = writeln!(output);
            let _ = writeln!(output, "Limitations:");
            for limitation in &meta.limitations {
                let _ = writeln!(output, "- {limitation}");
            }
        }
        Err(err) => {
            let _ = writeln!(output, "Forecast unavailable: {err}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Severity Mix");
    let mix = summarize_by_severity(risks);
    if mix.is_empty() {
        let _ = writeln!(output, "No districts had enough data to score.");
    } else {
        for entry in mix.iter() {
            let _ = writeln!(
                output,
                "- {}: {} districts (avg risk {:.1})",
                entry.severity, entry.count, entry.avg_risk
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Districts");
    if risks.districts.is_empty() {
        let _ = writeln!(output, "No scored districts in this window.");
    } else {
        for district in risks.districts.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} score {:.2} ({}), driven by {} [gap {:.0}%, shortfall {:.0}%, volatility {:.0}%]",
                district.district,
                district.risk_score,
                district.severity,
                district.breakdown_pct.dominant(),
                district.breakdown_pct.gap,
                district.breakdown_pct.negative_ratio,
                district.breakdown_pct.volatility
            );
        }
    }

    if !risks.insufficient.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Not Scored");
        for status in risks.insufficient.iter() {
            let _ = writeln!(
                output,
                "- {}: {} of {} required days",
                status.district, status.active_days, status.required_days
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InsightError;
    use crate::models::EnrolmentRecord;
    use crate::registry::MemoryRegistry;
    use crate::risk::score_districts;
    use crate::service::{self, ForecastMode};
    use crate::store::MemoryStore;
    use chrono::{Duration, NaiveDate};

    fn sample_risks() -> DistrictRiskReport {
        let start = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let mut records = Vec::new();
        for (district, count, days) in [("Pune", 90, 30), ("Satara", 5, 30), ("Wardha", 3, 4)] {
            for day in 0..days {
                records.push(EnrolmentRecord {
                    state: "Maharashtra".to_string(),
                    district: district.to_string(),
                    date: start + Duration::days(day),
                    count,
                });
            }
        }
        score_districts("Maharashtra", 30, &records, None)
    }

    #[test]
    fn report_lists_districts_and_skips() {
        let risks = sample_risks();
        let forecast = Err(InsightError::insufficient("Maharashtra", 3, 20));
        let report = build_report(&forecast, &risks);

        assert!(report.starts_with("# Enrolment Outlook: Maharashtra"));
        assert!(report.contains("Forecast unavailable: insufficient data"));
        assert!(report.contains("- Satara score"));
        assert!(report.contains("## Not Scored"));
        assert!(report.contains("- Wardha: 4 of 30 required days"));
    }

    #[tokio::test]
    async fn report_describes_forecast_trend_and_validation() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let records: Vec<EnrolmentRecord> = (0..30)
            .map(|day| EnrolmentRecord {
                state: "Maharashtra".to_string(),
                district: "Pune".to_string(),
                date: start + Duration::days(day),
                count: 100 + 5 * day,
            })
            .collect();
        let store = MemoryStore::new(records.clone());
        let registry = MemoryRegistry::new();

        let forecast =
            service::forecast(&store, &registry, "Maharashtra", 7, ForecastMode::TrainIfStale)
                .await;
        let risks = score_districts("Maharashtra", 30, &records, None);
        let report = build_report(&forecast, &risks);

        assert!(report.contains("over 5 folds"));
        assert!(report.contains("Trend is upward with strong strength"));
        assert!(report.contains("data quality: Insufficient (<6 months)"));
        assert!(report.contains("- Pune score"));
    }

    #[test]
    fn severity_mix_counts_scored_districts() {
        let mix = summarize_by_severity(&sample_risks());
        let total: usize = mix.iter().map(|entry| entry.count).sum();
        assert_eq!(total, 2);
    }
}
