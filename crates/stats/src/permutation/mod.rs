//! Permutation testing of MCPA statistics.
//!
//! Each replicate randomizes the PAM, reruns the whole MCPA node loop and
//! keeps the pseudo-F matrix. The replicates form an empirical null against
//! which the observed F-values are ranked.

pub mod fdr;

pub use fdr::{adjust_p_values, benjamini_hochberg, CorrectionMethod};

use crate::config::{Comparison, McpaConfig, PermutationConfig};
use crate::errors::StatsError;
use crate::mcpa::{McpaEngine, McpaOutput, F_VALUES_LAYER, OBSERVED_LAYER};
use crate::randomize::{Randomizer, SiteGraph};
use metacomm_matrix::Matrix;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Depth label of the p-value layer.
pub const P_VALUES_LAYER: &str = "P-values";
/// Depth label of the significance layer.
pub const SIGNIFICANCE_LAYER: &str = "BH significant";

/// Worker counts for the two parallel axes.
///
/// `permutation_workers × node_workers` never exceeds the core count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelPlan {
    pub permutation_workers: usize,
    pub node_workers: usize,
}

impl ParallelPlan {
    pub fn new(permutation_workers: usize, node_workers: usize, cores: usize) -> Self {
        let cores = cores.max(1);
        let node_workers = node_workers.clamp(1, cores);
        let permutation_workers = permutation_workers.clamp(1, (cores / node_workers).max(1));
        Self {
            permutation_workers,
            node_workers,
        }
    }

    /// Plan capped by the cores visible to this process.
    pub fn for_host(permutation_workers: usize, node_workers: usize) -> Self {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(permutation_workers, node_workers, cores)
    }
}

/// Observed statistics with their permutation p-values.
#[derive(Debug, Clone, PartialEq)]
pub struct PermutationResult {
    pub observed: Matrix,
    pub f_values: Matrix,
    pub p_values: Matrix,
    /// Benjamini–Hochberg significance, 0 or 1
    pub significant: Matrix,
    pub replicates: usize,
}

impl PermutationResult {
    /// Stack as a depth-4 matrix: observed, F, p and significance layers.
    pub fn to_stack(&self) -> Result<Matrix, StatsError> {
        Ok(Matrix::stack(
            &[&self.observed, &self.f_values, &self.p_values, &self.significant],
            Some(vec![
                OBSERVED_LAYER.into(),
                F_VALUES_LAYER.into(),
                P_VALUES_LAYER.into(),
                SIGNIFICANCE_LAYER.into(),
            ]),
        )?)
    }
}

/// Runs batches of randomize-then-MCPA replicates.
#[derive(Debug)]
pub struct PermutationTester {
    config: PermutationConfig,
    randomizer: Randomizer,
    plan: ParallelPlan,
    pool: Option<rayon::ThreadPool>,
}

impl PermutationTester {
    pub fn new(config: PermutationConfig, graph: Option<Arc<SiteGraph>>) -> Result<Self, StatsError> {
        config.validate()?;
        let randomizer = Randomizer::from_config(&config.randomize, graph)?;
        let plan = ParallelPlan::for_host(config.permutation_workers, config.node_workers);
        if plan.permutation_workers != config.permutation_workers
            || plan.node_workers != config.node_workers
        {
            info!(
                permutation_workers = plan.permutation_workers,
                node_workers = plan.node_workers,
                "Worker counts capped by available cores"
            );
        }
        let pool = if plan.permutation_workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(plan.permutation_workers)
                    .thread_name(|i| format!("permutation-{i}"))
                    .build()
                    .map_err(|e| {
                        StatsError::InvalidParameter(format!("permutation worker pool: {e}"))
                    })?,
            )
        } else {
            None
        };
        Ok(Self {
            config,
            randomizer,
            plan,
            pool,
        })
    }

    pub fn config(&self) -> &PermutationConfig {
        &self.config
    }

    pub fn plan(&self) -> ParallelPlan {
        self.plan
    }

    /// `base` with its node workers replaced by this tester's share.
    pub fn mcpa_config(&self, base: &McpaConfig) -> McpaConfig {
        McpaConfig {
            node_workers: (self.plan.node_workers > 1).then_some(self.plan.node_workers),
            ..base.clone()
        }
    }

    /// One seed per replicate, drawn in order from the master seed.
    ///
    /// Replicate `i` always gets the same seed, whichever worker runs it.
    pub fn replicate_seeds(&self) -> Vec<u64> {
        let mut master = match self.config.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_seed(rand::rng().random()),
        };
        (0..self.config.permutations).map(|_| master.random()).collect()
    }

    /// Randomize `pam` and rerun `engine` once per replicate.
    ///
    /// Returns the replicate F-value matrices in replicate order. The first
    /// failing replicate aborts the batch with [`StatsError::WorkerFailure`].
    pub fn run_replicates(&self, pam: &Matrix, engine: &McpaEngine) -> Result<Vec<Matrix>, StatsError> {
        self.run_replicates_with_progress(pam, engine, || {})
    }

    /// Like [`run_replicates`](Self::run_replicates), calling `on_done` after
    /// every completed replicate.
    pub fn run_replicates_with_progress<F>(
        &self,
        pam: &Matrix,
        engine: &McpaEngine,
        on_done: F,
    ) -> Result<Vec<Matrix>, StatsError>
    where
        F: Fn() + Sync,
    {
        let seeds = self.replicate_seeds();
        info!(
            replicates = seeds.len(),
            algorithm = self.randomizer.algorithm().name(),
            permutation_workers = self.plan.permutation_workers,
            node_workers = engine.node_workers(),
            "Starting permutation batch"
        );

        let replicate = |(index, &seed): (usize, &u64)| -> Result<Matrix, StatsError> {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            let outcome = self
                .randomizer
                .randomize(pam, &mut rng)
                .and_then(|randomized| engine.run(&randomized))
                .map(|output| output.f_values);
            on_done();
            outcome.map_err(|source| StatsError::WorkerFailure {
                replicate: index,
                source: Box::new(source),
            })
        };

        let results: Result<Vec<Matrix>, StatsError> = match &self.pool {
            Some(pool) => pool.install(|| seeds.par_iter().enumerate().map(replicate).collect()),
            None => seeds.iter().enumerate().map(replicate).collect(),
        };
        let results = results?;
        debug!(replicates = results.len(), "Permutation batch finished");
        Ok(results)
    }

    /// Observed run, replicates, p-values and BH significance in one go.
    pub fn test(&self, pam: &Matrix, engine: &McpaEngine, fdr: f64) -> Result<PermutationResult, StatsError> {
        let McpaOutput { observed, f_values } = engine.run(pam)?;
        let replicates = self.run_replicates(pam, engine)?;
        let p_values = p_values(&f_values, &replicates, self.config.comparison)?;
        let significant = benjamini_hochberg(&p_values, fdr)?;
        Ok(PermutationResult {
            observed,
            f_values,
            p_values,
            significant,
            replicates: replicates.len(),
        })
    }
}

/// Permutation p-values of `observed` against replicate statistics.
///
/// Each replicate may be a 2-D matrix (one replicate) or a stack whose layers
/// are replicates. A cell's p-value is the fraction of replicate layers whose
/// value meets or exceeds the observed one under `comparison`.
pub fn p_values(observed: &Matrix, replicates: &[Matrix], comparison: Comparison) -> Result<Matrix, StatsError> {
    if observed.ndim() != 2 {
        return Err(StatsError::InputShape(format!(
            "observed values must be 2-dimensional, got shape {:?}",
            observed.shape()
        )));
    }
    let (nrows, ncols) = (observed.nrows(), observed.ncols());
    let mut counts = vec![0usize; nrows * ncols];
    let mut layers = 0usize;

    for rep in replicates {
        if rep.nrows() != nrows || rep.ncols() != ncols {
            return Err(StatsError::InputShape(format!(
                "replicate shape {:?} does not match observed {:?}",
                rep.shape(),
                observed.shape()
            )));
        }
        let depth = rep.depth();
        for (cell, (&obs, count)) in observed.as_slice().iter().zip(&mut counts).enumerate() {
            let values = &rep.as_slice()[cell * depth..(cell + 1) * depth];
            *count += values
                .iter()
                .filter(|&&v| exceeds(v, obs, comparison))
                .count();
        }
        layers += depth;
    }

    if layers == 0 {
        return Err(StatsError::InputShape(
            "no permutation replicates to compare against".into(),
        ));
    }
    let data = counts
        .into_iter()
        .map(|c| {
            let p = c as f64 / layers as f64;
            if p.is_nan() {
                0.0
            } else {
                p.clamp(0.0, 1.0)
            }
        })
        .collect();
    Ok(observed.with_values(data)?)
}

#[inline]
fn exceeds(replicate: f64, observed: f64, comparison: Comparison) -> bool {
    match comparison {
        Comparison::Absolute => replicate.abs() >= observed.abs(),
        Comparison::Signed => replicate >= observed,
    }
}
