//! Weighted standardization shared by the randomizer and the MCPA engine.
//!
//! For a matrix `M` (n × k) and weights `w` (length n):
//!
//! ```text
//! mean = (wᵗ M) / Σw
//! std  = sqrt((wᵗ (M ⊙ M) − mean² · Σw) / Σw)
//! Mstd = (M − mean) / std
//! ```
//!
//! The weights are never expanded into a diagonal matrix. Any cell whose
//! computation divides by zero is set to 0 instead of raising.

use nalgebra::DMatrix;

/// Relative tolerance below which a weighted variance is treated as zero.
const VARIANCE_EPSILON: f64 = 1e-12;

/// Column-wise weighted standardization of `m` by the row weights `weights`.
///
/// # Panics
///
/// Panics if `weights.len() != m.nrows()`.
pub fn standardize(m: &DMatrix<f64>, weights: &[f64]) -> DMatrix<f64> {
    assert_eq!(
        weights.len(),
        m.nrows(),
        "one weight per row is required"
    );
    let total: f64 = weights.iter().sum();
    let mut out = DMatrix::zeros(m.nrows(), m.ncols());
    if total <= 0.0 {
        return out;
    }

    for (j, column) in m.column_iter().enumerate() {
        let (s1, s2) = column
            .iter()
            .zip(weights)
            .fold((0.0, 0.0), |(s1, s2), (&v, &w)| (s1 + w * v, s2 + w * v * v));
        let mean = s1 / total;
        let variance = (s2 - mean * mean * total) / total;
        if !(variance > VARIANCE_EPSILON * (s2 / total).abs().max(1.0)) {
            continue;
        }
        let std = variance.sqrt();
        for (i, &v) in column.iter().enumerate() {
            let z = (v - mean) / std;
            out[(i, j)] = if z.is_finite() { z } else { 0.0 };
        }
    }
    out
}
