//! Ridge regression solved through the normal equations.
//!
//! Features and target are centred before solving so the intercept is not
//! penalised, then the intercept is recovered from the column means.

use crate::error::{InsightError, Result};

const PIVOT_EPSILON: f64 = 1e-12;
const VARIANCE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct RidgeFit {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl RidgeFit {
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.intercept
            + features
                .iter()
                .zip(self.coefficients.iter())
                .map(|(x, w)| x * w)
                .sum::<f64>()
    }
}

pub fn fit(rows: &[Vec<f64>], targets: &[f64], alpha: f64, names: &[&str]) -> Result<RidgeFit> {
    if rows.is_empty() || rows.len() != targets.len() {
        return Err(InsightError::InvalidArgument(format!(
            "ridge fit needs matching non-empty inputs ({} rows, {} targets)",
            rows.len(),
            targets.len()
        )));
    }
    let width = rows[0].len();
    if rows.iter().any(|row| row.len() != width) {
        return Err(InsightError::InvalidArgument(
            "feature rows have inconsistent widths".to_string(),
        ));
    }

    let n = rows.len() as f64;
    let means: Vec<f64> = (0..width)
        .map(|col| rows.iter().map(|row| row[col]).sum::<f64>() / n)
        .collect();
    let target_mean = targets.iter().sum::<f64>() / n;

    for (col, mean) in means.iter().enumerate() {
        let variance = rows.iter().map(|row| (row[col] - mean).powi(2)).sum::<f64>() / n;
        if variance < VARIANCE_EPSILON {
            let name = names.get(col).copied().unwrap_or("feature");
            return Err(InsightError::NumericInstability(format!(
                "feature column '{name}' has zero variance across {} rows",
                rows.len()
            )));
        }
    }

    // (XcᵀXc + αI) w = Xcᵀyc
    let mut gram = vec![vec![0.0; width]; width];
    let mut rhs = vec![0.0; width];
    for (row, target) in rows.iter().zip(targets.iter()) {
        let centred: Vec<f64> = row.iter().zip(means.iter()).map(|(x, m)| x - m).collect();
        let y = target - target_mean;
        for i in 0..width {
            rhs[i] += centred[i] * y;
            for j in 0..width {
                gram[i][j] += centred[i] * centred[j];
            }
        }
    }
    for (i, row) in gram.iter_mut().enumerate() {
        row[i] += alpha;
    }

    let coefficients = solve(gram, rhs)?;
    let intercept = target_mean
        - coefficients
            .iter()
            .zip(means.iter())
            .map(|(w, m)| w * m)
            .sum::<f64>();

    if !intercept.is_finite() || coefficients.iter().any(|w| !w.is_finite()) {
        return Err(InsightError::NumericInstability(
            "fit produced non-finite coefficients".to_string(),
        ));
    }

    Ok(RidgeFit {
        coefficients,
        intercept,
    })
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let size = b.len();
    for col in 0..size {
        let pivot = (col..size)
            .max_by(|&x, &y| {
                a[x][col]
                    .abs()
                    .partial_cmp(&a[y][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(InsightError::NumericInstability(
                "normal equations are singular".to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..size {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..size {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut solution = vec![0.0; size];
    for row in (0..size).rev() {
        let tail: f64 = (row + 1..size).map(|k| a[row][k] * solution[k]).sum();
        solution[row] = (b[row] - tail) / a[row][row];
    }
    Ok(solution)
}
