//! Metacommunity Phylogenetics Analysis.
//!
//! For every internal node of the tree (every column of the phylogenetic
//! encoding matrix `P`) the node's standardized loadings are projected onto
//! the sites through the incidence matrix and regressed, with site weights,
//! on the environment predictors `E` and on the biogeographic hypotheses `B`
//! controlling for `E`. Each node yields one row of observed statistics
//! (semi-partial correlations and adjusted R²) and one row of pseudo-F
//! values used as the permutation test statistic.
//!
//! Nodes never share mutable state, so the node loop runs either
//! sequentially or on a dedicated rayon pool with identical results.

mod node;
mod regression;

pub use regression::{BlockFit, BlockOutcome, Degeneracy};

use crate::config::McpaConfig;
use crate::errors::StatsError;
use crate::linalg::KernelGate;
use metacomm_matrix::{Headers, Matrix, COLUMN_AXIS, ROW_AXIS};
use nalgebra::DMatrix;
use node::{compute_node, NodeInputs, NodeRow};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Column label of the environment block's adjusted R².
pub const ENV_ADJUSTED_R2_LABEL: &str = "Env - Adjusted R-squared";
/// Column label of the biogeography block's adjusted R².
pub const BG_ADJUSTED_R2_LABEL: &str = "BG - Adjusted R-squared";
/// Depth label of the observed-values layer.
pub const OBSERVED_LAYER: &str = "Observed";
/// Depth label of the pseudo-F layer.
pub const F_VALUES_LAYER: &str = "F-values";

/// Observed statistics and pseudo-F values of one MCPA run.
#[derive(Debug, Clone, PartialEq)]
pub struct McpaOutput {
    /// Nodes × [E semi-partials, Env adj. R², B semi-partials, BG adj. R²]
    pub observed: Matrix,
    /// Same shape; per-predictor and global pseudo-F values.
    pub f_values: Matrix,
}

impl McpaOutput {
    /// Stack as a depth-2 matrix with layers `Observed` and `F-values`.
    pub fn to_stack(&self) -> Result<Matrix, StatsError> {
        Ok(Matrix::stack(
            &[&self.observed, &self.f_values],
            Some(vec![OBSERVED_LAYER.into(), F_VALUES_LAYER.into()]),
        )?)
    }

    /// Inverse of [`to_stack`](Self::to_stack).
    ///
    /// Layers are found by label, falling back to positions 0 and 1.
    pub fn from_stack(stack: &Matrix) -> Result<Self, StatsError> {
        if stack.depth() < 2 {
            return Err(StatsError::InputShape(format!(
                "expected an Observed/F-values stack, got shape {:?}",
                stack.shape()
            )));
        }
        let observed = stack.layer_index(OBSERVED_LAYER).unwrap_or(0);
        let f_values = stack.layer_index(F_VALUES_LAYER).unwrap_or(1);
        Ok(Self {
            observed: stack.layer(observed)?,
            f_values: stack.layer(f_values)?,
        })
    }
}

/// MCPA with fixed `P`, `E` and `B`, runnable against any compatible PAM.
#[derive(Debug)]
pub struct McpaEngine {
    phylo: DMatrix<f64>,
    env: DMatrix<f64>,
    bio: DMatrix<f64>,
    species_labels: Option<Vec<String>>,
    site_labels: Option<Vec<String>>,
    output_headers: Headers,
    pool: Option<Arc<rayon::ThreadPool>>,
    gate: Arc<KernelGate>,
}

impl McpaEngine {
    /// Validate and convert the fixed inputs.
    ///
    /// `phylo` is species × nodes, `env` and `bio` are sites × predictors.
    pub fn new(
        phylo: &Matrix,
        env: &Matrix,
        bio: Option<&Matrix>,
        config: &McpaConfig,
    ) -> Result<Self, StatsError> {
        let phylo_d = require_2d(phylo, "tree matrix")?;
        let env_d = require_2d(env, "environment matrix")?;
        let bio_d = match bio {
            Some(b) => require_2d(b, "biogeography matrix")?,
            None => DMatrix::zeros(env.nrows(), 0),
        };
        if bio_d.nrows() != env_d.nrows() {
            return Err(StatsError::InputShape(format!(
                "biogeography matrix has {} sites, environment matrix has {}",
                bio_d.nrows(),
                env_d.nrows()
            )));
        }

        let site_labels = env.headers().get(ROW_AXIS).map(<[String]>::to_vec);
        if let Some(b) = bio {
            check_labels(
                "biogeography sites",
                b.headers().get(ROW_AXIS),
                site_labels.as_deref(),
            )?;
        }

        let output_headers = output_headers(phylo, env, bio);
        let pool = match config.node_workers {
            Some(workers) if workers > 1 => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("mcpa-node-{i}"))
                    .build()
                    .map_err(|e| StatsError::InvalidParameter(format!("node worker pool: {e}")))?,
            )),
            _ => None,
        };

        Ok(Self {
            phylo: phylo_d,
            env: env_d,
            bio: bio_d,
            species_labels: phylo.headers().get(ROW_AXIS).map(<[String]>::to_vec),
            site_labels,
            output_headers,
            pool,
            gate: Arc::new(KernelGate::new(config.kernel_permits)),
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.phylo.ncols()
    }

    pub fn num_sites(&self) -> usize {
        self.env.nrows()
    }

    pub fn num_species(&self) -> usize {
        self.phylo.nrows()
    }

    /// Node-loop workers (1 when sequential).
    pub fn node_workers(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Row and column labels of the output matrices.
    pub fn output_headers(&self) -> &Headers {
        &self.output_headers
    }

    /// Run every node against `pam` (sites × species).
    pub fn run(&self, pam: &Matrix) -> Result<McpaOutput, StatsError> {
        self.check_pam(pam)?;
        let pam_d = pam.to_dmatrix()?;
        let inputs = NodeInputs {
            pam: &pam_d,
            env: &self.env,
            bio: &self.bio,
            gate: &self.gate,
        };

        let evaluate = |j: usize| {
            let (row, outcomes) = compute_node(j, self.phylo.column(j), &inputs);
            let [env, bio] = &outcomes;
            let degenerate = matches!(env, BlockOutcome::Degenerate(_))
                || (self.bio.ncols() > 0 && matches!(bio, BlockOutcome::Degenerate(_)));
            (j, row, degenerate)
        };
        let results: Vec<(usize, NodeRow, bool)> = match &self.pool {
            Some(pool) => pool.install(|| (0..self.num_nodes()).into_par_iter().map(evaluate).collect()),
            None => (0..self.num_nodes()).map(evaluate).collect(),
        };

        let width = self.env.ncols() + self.bio.ncols() + 2;
        let mut observed = vec![0.0; self.num_nodes() * width];
        let mut f_values = vec![0.0; self.num_nodes() * width];
        let mut degenerate = 0;
        for (j, row, is_degenerate) in results {
            observed[j * width..(j + 1) * width].copy_from_slice(&row.observed);
            f_values[j * width..(j + 1) * width].copy_from_slice(&row.f_values);
            degenerate += usize::from(is_degenerate);
        }
        debug!(
            nodes = self.num_nodes(),
            degenerate,
            workers = self.node_workers(),
            "MCPA run finished"
        );

        let shape = vec![self.num_nodes(), width];
        Ok(McpaOutput {
            observed: Matrix::new(observed, shape.clone(), self.output_headers.clone())?,
            f_values: Matrix::new(f_values, shape, self.output_headers.clone())?,
        })
    }

    fn check_pam(&self, pam: &Matrix) -> Result<(), StatsError> {
        if pam.ndim() != 2 {
            return Err(StatsError::InputShape(format!(
                "PAM must be 2-dimensional, got shape {:?}",
                pam.shape()
            )));
        }
        if pam.nrows() != self.num_sites() {
            return Err(StatsError::InputShape(format!(
                "PAM has {} sites, predictors have {}",
                pam.nrows(),
                self.num_sites()
            )));
        }
        if pam.ncols() != self.num_species() {
            return Err(StatsError::InputShape(format!(
                "PAM has {} species, tree matrix has {}",
                pam.ncols(),
                self.num_species()
            )));
        }
        if !pam.is_binary() {
            return Err(StatsError::InputShape(
                "PAM contains values other than 0 and 1".into(),
            ));
        }
        check_labels(
            "PAM species",
            pam.headers().get(COLUMN_AXIS),
            self.species_labels.as_deref(),
        )?;
        check_labels(
            "PAM sites",
            pam.headers().get(ROW_AXIS),
            self.site_labels.as_deref(),
        )
    }
}

/// Run a single MCPA with a throwaway engine.
pub fn run_mcpa(
    pam: &Matrix,
    phylo: &Matrix,
    env: &Matrix,
    bio: Option<&Matrix>,
    config: &McpaConfig,
) -> Result<McpaOutput, StatsError> {
    let engine = McpaEngine::new(phylo, env, bio, config)?;
    info!(
        nodes = engine.num_nodes(),
        sites = engine.num_sites(),
        species = engine.num_species(),
        "Running MCPA"
    );
    engine.run(pam)
}

fn require_2d(m: &Matrix, what: &str) -> Result<DMatrix<f64>, StatsError> {
    if m.ndim() != 2 {
        return Err(StatsError::InputShape(format!(
            "{what} must be 2-dimensional, got shape {:?}",
            m.shape()
        )));
    }
    Ok(m.to_dmatrix()?)
}

/// Labels must agree when both sides carry them.
fn check_labels(what: &str, found: Option<&[String]>, expected: Option<&[String]>) -> Result<(), StatsError> {
    match (found, expected) {
        (Some(found), Some(expected)) if found != expected => {
            let position = found
                .iter()
                .zip(expected)
                .position(|(a, b)| a != b)
                .unwrap_or(found.len().min(expected.len()));
            Err(StatsError::InputShape(format!(
                "{what} labels are not aligned (first difference at position {position})"
            )))
        }
        _ => Ok(()),
    }
}

fn labels_or(m: Option<&Matrix>, axis: usize, prefix: &str) -> Vec<String> {
    let Some(m) = m else {
        return Vec::new();
    };
    match m.headers().get(axis) {
        Some(labels) => labels.to_vec(),
        None => (0..m.shape()[axis]).map(|i| format!("{prefix}{i}")).collect(),
    }
}

fn output_headers(phylo: &Matrix, env: &Matrix, bio: Option<&Matrix>) -> Headers {
    let mut columns = labels_or(Some(env), COLUMN_AXIS, "Env ");
    columns.push(ENV_ADJUSTED_R2_LABEL.to_string());
    columns.extend(labels_or(bio, COLUMN_AXIS, "BG "));
    columns.push(BG_ADJUSTED_R2_LABEL.to_string());
    Headers::new()
        .with_axis(ROW_AXIS, labels_or(Some(phylo), COLUMN_AXIS, "Node "))
        .with_axis(COLUMN_AXIS, columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phylo() -> Matrix {
        Matrix::from_rows(&[
            vec![0.5, 0.5],
            vec![-0.5, 0.5],
            vec![0.0, -1.0],
        ])
        .unwrap()
        .with_headers(Headers::new().with_axis(0, ["a", "b", "c"]).with_axis(1, ["n1", "n2"]))
        .unwrap()
    }

    fn env() -> Matrix {
        Matrix::from_rows(&[
            vec![0.1],
            vec![0.9],
            vec![0.4],
            vec![1.7],
            vec![-0.3],
        ])
        .unwrap()
        .with_headers(Headers::new().with_axis(1, ["temp"]))
        .unwrap()
    }

    fn pam() -> Matrix {
        Matrix::from_rows(&[
            vec![1.0, 0.0, 1.0],
            vec![0.0, 1.0, 1.0],
            vec![1.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_output_headers() {
        let engine = McpaEngine::new(&phylo(), &env(), None, &McpaConfig::default()).unwrap();
        let out = engine.run(&pam()).unwrap();
        assert_eq!(out.observed.shape(), &[2, 3]);
        let columns = out.observed.headers().get(COLUMN_AXIS).unwrap();
        assert_eq!(columns, &["temp", ENV_ADJUSTED_R2_LABEL, BG_ADJUSTED_R2_LABEL]);
        assert_eq!(out.f_values.headers().get(ROW_AXIS).unwrap(), &["n1", "n2"]);
    }

    #[test]
    fn test_missing_bio_gives_zero_bg_column() {
        let out = run_mcpa(&pam(), &phylo(), &env(), None, &McpaConfig::default()).unwrap();
        for node in 0..2 {
            assert_eq!(out.observed[(node, 2)], 0.0);
            assert_eq!(out.f_values[(node, 2)], 0.0);
        }
    }

    #[test]
    fn test_rejects_misaligned_pam() {
        let engine = McpaEngine::new(&phylo(), &env(), None, &McpaConfig::default()).unwrap();
        let wrong = Matrix::zeros(5, 2);
        assert!(matches!(engine.run(&wrong), Err(StatsError::InputShape(_))));

        let relabeled = pam()
            .with_headers(Headers::new().with_axis(1, ["a", "c", "b"]))
            .unwrap();
        assert!(matches!(engine.run(&relabeled), Err(StatsError::InputShape(_))));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = McpaEngine::new(&phylo(), &env(), None, &McpaConfig::sequential()).unwrap();
        let parallel = McpaEngine::new(&phylo(), &env(), None, &McpaConfig::parallel(2)).unwrap();
        assert_eq!(parallel.node_workers(), 2);
        assert_eq!(sequential.run(&pam()).unwrap(), parallel.run(&pam()).unwrap());
    }

    #[test]
    fn test_stack_round_trip() {
        let out = run_mcpa(&pam(), &phylo(), &env(), None, &McpaConfig::default()).unwrap();
        let stack = out.to_stack().unwrap();
        assert_eq!(stack.shape(), &[2, 3, 2]);
        assert_eq!(stack.layer_index(F_VALUES_LAYER), Some(1));
        assert_eq!(McpaOutput::from_stack(&stack).unwrap(), out);
    }
}
