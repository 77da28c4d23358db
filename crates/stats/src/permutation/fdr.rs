//! Multiple-testing correction over a whole result matrix.

use crate::errors::StatsError;
use metacomm_matrix::Matrix;
use serde::{Deserialize, Serialize};

/// Adjusted-p-value procedures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    #[default]
    BenjaminiHochberg,
    Bonferroni,
    BonferroniHolm,
}

/// Indices of `values` in ascending order, NaN last.
fn ascending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or_else(|| values[a].is_nan().cmp(&values[b].is_nan()))
    });
    order
}

/// Benjamini–Hochberg significance of every p-value in `p_values`.
///
/// All values are pooled into one family of `m` tests. With `p(1) ≤ … ≤
/// p(m)`, the critical value is the largest `p(r)` with `p(r) < fdr · r / m`;
/// every p-value at or below it is marked 1, the rest 0. Shape and headers
/// are kept.
pub fn benjamini_hochberg(p_values: &Matrix, fdr: f64) -> Result<Matrix, StatsError> {
    if !(fdr > 0.0 && fdr <= 1.0) {
        return Err(StatsError::InvalidParameter(format!(
            "FDR must be in (0, 1], got {fdr}"
        )));
    }
    let values = p_values.as_slice();
    let m = values.len() as f64;
    let order = ascending_order(values);

    let critical = order
        .iter()
        .enumerate()
        .filter(|&(rank, &i)| values[i] < fdr * (rank + 1) as f64 / m)
        .map(|(_, &i)| values[i])
        .last();

    Ok(match critical {
        Some(critical) => p_values.map(|p| if p <= critical { 1.0 } else { 0.0 }),
        None => p_values.map(|_| 0.0),
    })
}

/// Adjusted p-values, each clipped to at most 1.
pub fn adjust_p_values(p_values: &Matrix, method: CorrectionMethod) -> Result<Matrix, StatsError> {
    let values = p_values.as_slice();
    let m = values.len();
    let order = ascending_order(values);
    let mut adjusted = vec![0.0; m];

    match method {
        CorrectionMethod::Bonferroni => {
            for (a, &p) in adjusted.iter_mut().zip(values) {
                *a = p * m as f64;
            }
        }
        CorrectionMethod::BonferroniHolm => {
            let mut running = 0.0_f64;
            for (rank, &i) in order.iter().enumerate() {
                running = running.max((m - rank) as f64 * values[i]);
                adjusted[i] = running;
            }
        }
        CorrectionMethod::BenjaminiHochberg => {
            let mut running = f64::INFINITY;
            for (rank, &i) in order.iter().enumerate().rev() {
                running = running.min(values[i] * m as f64 / (rank + 1) as f64);
                adjusted[i] = running;
            }
        }
    }

    for a in &mut adjusted {
        if *a > 1.0 {
            *a = 1.0;
        }
    }
    Ok(p_values.with_values(adjusted)?)
}
