//! Per-block regression statistics.

use crate::linalg::{weighted_least_squares, KernelGate};
use nalgebra::DMatrix;
use std::fmt;

/// Why a block produced no statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// The block has no predictor columns.
    NoPredictors,
    /// `n ≤ k + 1`, so adjusted R² is undefined.
    TooFewSites { sites: usize, predictors: usize },
    /// The projected response has no weighted variance.
    NoResponseVariance,
    /// The weighted normal matrix is not positive definite.
    Singular,
}

impl fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPredictors => write!(f, "no predictors"),
            Self::TooFewSites { sites, predictors } => {
                write!(f, "{sites} sites for {predictors} predictors")
            }
            Self::NoResponseVariance => write!(f, "response has no variance"),
            Self::Singular => write!(f, "singular normal matrix"),
        }
    }
}

/// Statistics of one fitted block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockFit {
    /// Semi-partial correlation of each tested predictor.
    pub semi_partials: Vec<f64>,
    /// Pseudo-F of each tested predictor.
    pub f_semi_partials: Vec<f64>,
    pub r_squared: f64,
    pub adjusted_r_squared: f64,
    /// `trace(ŷᵗŷ) / trace(residualᵗ residual)`
    pub f_global: f64,
}

/// Result of regressing one block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutcome {
    Fitted(BlockFit),
    Degenerate(Degeneracy),
}

impl BlockOutcome {
    /// Observed-row values: semi-partials followed by adjusted R².
    ///
    /// A degenerate block contributes `tested + 1` zeros.
    pub fn observed_values(&self, tested: usize) -> Vec<f64> {
        match self {
            Self::Fitted(fit) => {
                let mut row = fit.semi_partials.clone();
                row.push(fit.adjusted_r_squared);
                row
            }
            Self::Degenerate(_) => vec![0.0; tested + 1],
        }
    }

    /// F-row values: per-predictor pseudo-F followed by the global F.
    pub fn f_values(&self, tested: usize) -> Vec<f64> {
        match self {
            Self::Fitted(fit) => {
                let mut row = fit.f_semi_partials.clone();
                row.push(fit.f_global);
                row
            }
            Self::Degenerate(_) => vec![0.0; tested + 1],
        }
    }
}

/// Replace NaN and infinities with 0.
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Regress `response` on `predictors` and compute statistics for the first
/// `tested` predictor columns.
///
/// Remaining columns are controls: they take part in every fit but get no
/// semi-partial of their own. `total` is `trace(responseᵗ response)`. Only
/// the full-model fit runs under `gate`.
pub(crate) fn fit_block(
    predictors: &DMatrix<f64>,
    response: &DMatrix<f64>,
    weights: &[f64],
    tested: usize,
    total: f64,
    gate: &KernelGate,
) -> BlockOutcome {
    let (n, k) = predictors.shape();
    if k == 0 || tested == 0 {
        return BlockOutcome::Degenerate(Degeneracy::NoPredictors);
    }
    if n <= k + 1 {
        return BlockOutcome::Degenerate(Degeneracy::TooFewSites {
            sites: n,
            predictors: k,
        });
    }
    if !(total > 0.0) {
        return BlockOutcome::Degenerate(Degeneracy::NoResponseVariance);
    }

    let Some(full) = gate.run(|| weighted_least_squares(predictors, response, weights)) else {
        return BlockOutcome::Degenerate(Degeneracy::Singular);
    };

    let r_squared = full.explained / total;
    let f_denominator = full.residual;
    let adjusted =
        1.0 - ((n - 1) as f64 / (n - k - 1) as f64) * (1.0 - r_squared.clamp(0.0, 1.0));

    let mut semi_partials = Vec::with_capacity(tested);
    let mut f_semi_partials = Vec::with_capacity(tested);
    for i in 0..tested {
        let reduced = predictors.clone().remove_column(i);
        let reduced_r_squared = if reduced.ncols() == 0 {
            0.0
        } else {
            match weighted_least_squares(&reduced, response, weights) {
                Some(fit) => fit.explained / total,
                None => r_squared,
            }
        };

        let delta = r_squared - reduced_r_squared;
        if delta > 0.0 {
            let sign = full.beta[(i, 0)].signum();
            semi_partials.push(finite_or_zero(sign * delta.sqrt()));
            f_semi_partials.push(finite_or_zero(delta / f_denominator));
        } else {
            semi_partials.push(0.0);
            f_semi_partials.push(0.0);
        }
    }

    BlockOutcome::Fitted(BlockFit {
        semi_partials,
        f_semi_partials,
        r_squared: finite_or_zero(r_squared).clamp(0.0, 1.0),
        adjusted_r_squared: finite_or_zero(adjusted).max(0.0),
        f_global: finite_or_zero(full.explained / f_denominator),
    })
}
