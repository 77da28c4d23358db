//! Memory-bounded weighted least squares.
//!
//! Site weights are applied by scaling the columns of `Mᵗ` in place rather
//! than building `diag(w)`, and traces of self-products are accumulated row by
//! row so the `n × n` outer product is never formed.

use crossbeam::channel::{bounded, Receiver, Sender};
use nalgebra::DMatrix;

/// Smallest accepted ratio between the extreme diagonal entries of the
/// Cholesky factor of the weighted normal matrix.
const MIN_PIVOT_RATIO: f64 = 1e-8;

/// Result of a weighted least-squares fit.
#[derive(Debug, Clone)]
pub struct WeightedFit {
    /// Regression coefficients, one row per predictor.
    pub beta: DMatrix<f64>,
    /// `trace(ŷᵗŷ)`
    pub explained: f64,
    /// `trace((y − ŷ)ᵗ(y − ŷ))`
    pub residual: f64,
}

/// `trace(mᵗm)` as the sum of squared row norms.
pub fn trace_self_product(m: &DMatrix<f64>) -> f64 {
    m.row_iter().map(|row| row.norm_squared()).sum()
}

/// Fit `beta = (Mᵗ W M)⁻¹ Mᵗ W y` with `W = diag(weights)`.
///
/// Returns `None` when the weighted normal matrix is not safely positive
/// definite (collinear or constant predictors, no predictors at all).
pub fn weighted_least_squares(
    m: &DMatrix<f64>,
    y: &DMatrix<f64>,
    weights: &[f64],
) -> Option<WeightedFit> {
    debug_assert_eq!(m.nrows(), y.nrows());
    debug_assert_eq!(m.nrows(), weights.len());
    if m.ncols() == 0 {
        return None;
    }

    let mut mt_w = m.transpose();
    for (mut column, &w) in mt_w.column_iter_mut().zip(weights) {
        column *= w;
    }
    let normal = &mt_w * m;
    let rhs = &mt_w * y;

    let cholesky = normal.cholesky()?;
    let diagonal = cholesky.l_dirty().diagonal();
    if !(diagonal.min() > MIN_PIVOT_RATIO * diagonal.max()) {
        return None;
    }
    let beta = cholesky.solve(&rhs);
    if beta.iter().any(|b| !b.is_finite()) {
        return None;
    }

    let fitted = m * &beta;
    let explained = trace_self_product(&fitted);
    let residual = trace_self_product(&(y - &fitted));
    Some(WeightedFit {
        beta,
        explained,
        residual,
    })
}

/// Bounded pool of permits guarding the full-model kernel.
///
/// At most `permits` full-predictor fits run at once no matter how many
/// workers are active; reduced-model fits do not go through the gate.
#[derive(Debug)]
pub struct KernelGate {
    release: Sender<()>,
    acquire: Receiver<()>,
}

impl KernelGate {
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        let (release, acquire) = bounded(permits);
        for _ in 0..permits {
            // Capacity equals the permit count, so this cannot block.
            let _ = release.send(());
        }
        Self { release, acquire }
    }

    /// Run `f` while holding one permit.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        // Both channel ends live in `self`, so `recv` only returns once a
        // permit is available.
        let _ = self.acquire.recv();
        let _permit = Permit { gate: self };
        f()
    }

    /// Number of permits currently free.
    pub fn available(&self) -> usize {
        self.acquire.len()
    }
}

impl Default for KernelGate {
    fn default() -> Self {
        Self::new(1)
    }
}

struct Permit<'a> {
    gate: &'a KernelGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let _ = self.gate.release.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_trace_matches_full_product() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, -1.0, 0.5, 3.0, 4.0]);
        let full = (m.transpose() * &m).trace();
        assert!((trace_self_product(&m) - full).abs() < 1e-12);
    }

    #[test]
    fn test_matches_explicit_diagonal_formula() {
        let m = DMatrix::from_row_slice(4, 2, &[1.0, 0.2, -0.5, 1.0, 0.3, -1.2, 2.0, 0.1]);
        let y = DMatrix::from_column_slice(4, 1, &[1.0, -2.0, 0.5, 3.0]);
        let w = [1.0, 2.0, 3.0, 0.5];

        let fit = weighted_least_squares(&m, &y, &w).unwrap();

        let d = DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(&w));
        let expected = (m.transpose() * &d * &m).try_inverse().unwrap() * m.transpose() * &d * &y;
        for (a, b) in fit.beta.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_exact_fit_has_no_residual() {
        let m = DMatrix::from_column_slice(3, 1, &[1.0, 2.0, 3.0]);
        let y = &m * 2.0;
        let fit = weighted_least_squares(&m, &y, &[1.0, 1.0, 1.0]).unwrap();
        assert!((fit.beta[(0, 0)] - 2.0).abs() < 1e-12);
        assert!(fit.residual < 1e-20);
        assert!((fit.explained - 56.0).abs() < 1e-9);
    }

    #[test]
    fn test_collinear_predictors_are_rejected() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        let y = DMatrix::from_column_slice(3, 1, &[1.0, 0.0, 1.0]);
        assert!(weighted_least_squares(&m, &y, &[1.0; 3]).is_none());
    }

    #[test]
    fn test_zero_column_is_rejected() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        let y = DMatrix::from_column_slice(3, 1, &[1.0, 0.0, 1.0]);
        assert!(weighted_least_squares(&m, &y, &[1.0; 3]).is_none());
    }

    #[test]
    fn test_no_predictors() {
        let m = DMatrix::<f64>::zeros(3, 0);
        let y = DMatrix::from_column_slice(3, 1, &[1.0, 0.0, 1.0]);
        assert!(weighted_least_squares(&m, &y, &[1.0; 3]).is_none());
    }

    #[test]
    fn test_gate_limits_concurrency() {
        let gate = Arc::new(KernelGate::new(2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (gate, active, peak) = (gate.clone(), active.clone(), peak.clone());
                std::thread::spawn(move || {
                    gate.run(|| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.available(), 2);
    }
}
