use crate::models::{EnrollmentSeries, FeatureRow};

pub const LAG_DAYS: usize = 7;
pub const ROLL_WINDOW: usize = 7;
pub const FEATURE_ORDER: [&str; 3] = ["t", "lag7", "roll7"];

/// Turns a daily series into supervised rows. The first seven days only
/// seed the lag and rolling window and never become rows themselves.
pub fn build_features(series: &EnrollmentSeries) -> Vec<FeatureRow> {
    let values = series.values();
    if values.len() <= LAG_DAYS {
        return Vec::new();
    }

    (LAG_DAYS..values.len())
        .map(|idx| {
            let window = &values[idx + 1 - ROLL_WINDOW..=idx];
            FeatureRow {
                t: idx as i64,
                lag7: values[idx - LAG_DAYS],
                roll7: window.iter().sum::<f64>() / ROLL_WINDOW as f64,
                target: values[idx],
            }
        })
        .collect()
}

/// Feature vector in `FEATURE_ORDER`.
pub fn feature_vector(row: &FeatureRow) -> [f64; 3] {
    [row.t as f64, row.lag7, row.roll7]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series_from(values: &[f64]) -> EnrollmentSeries {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(idx, value)| (start + Duration::days(idx as i64), *value))
            .collect();
        EnrollmentSeries::new(points).unwrap()
    }

    #[test]
    fn drops_warmup_rows_and_keeps_offsets_contiguous() {
        let values: Vec<f64> = (0..30).map(|v| v as f64 * 2.0).collect();
        let rows = build_features(&series_from(&values));

        assert_eq!(rows.len(), values.len() - LAG_DAYS);
        for (idx, row) in rows.iter().enumerate() {
            assert_eq!(row.t, idx as i64 + 7);
        }
    }

    #[test]
    fn lag_and_rolling_mean_use_expected_days() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let rows = build_features(&series_from(&values));

        let first = rows[0];
        assert_eq!(first.t, 7);
        assert_eq!(first.target, 8.0);
        assert_eq!(first.lag7, 1.0);
        // days 2..=8 inclusive of the current day
        assert!((first.roll7 - 5.0).abs() < 1e-12);
    }

    #[test]
    fn short_series_yields_no_rows() {
        assert!(build_features(&series_from(&[1.0; 7])).is_empty());
        assert_eq!(build_features(&series_from(&[1.0; 8])).len(), 1);
    }
}
