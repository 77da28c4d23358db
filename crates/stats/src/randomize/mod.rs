//! Null-model randomization of presence/absence matrices.
//!
//! Three interchangeable algorithms produce a new PAM from an input one:
//!
//! - **Grady**: fill-based construction with exact row and column sums.
//! - **Swap**: repeated checkerboard flips, exact row and column sums.
//! - **Splotch**: spatially contiguous regrowth of each species over a
//!   [`SiteGraph`]; column sums are kept, row sums are not.
//!
//! Randomness always comes from the generator passed in by the caller.

mod grady;
pub mod graph;
mod splotch;
mod swap;

pub use graph::{Neighborhood, SiteGraph};

use crate::config::{Algorithm, RandomizeConfig};
use crate::errors::StatsError;
use metacomm_matrix::{Headers, Matrix};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;
use tracing::{debug, warn};

/// Dense binary grid used internally by the algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Incidence {
    nrows: usize,
    ncols: usize,
    cells: Vec<bool>,
}

impl Incidence {
    pub(crate) fn empty(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            cells: vec![false; nrows * ncols],
        }
    }

    /// Convert a PAM, checking that it is a binary matrix of at least 2×2.
    pub(crate) fn from_matrix(pam: &Matrix) -> Result<Self, StatsError> {
        if pam.ndim() != 2 {
            return Err(StatsError::InputShape(format!(
                "PAM must be 2-dimensional, got shape {:?}",
                pam.shape()
            )));
        }
        if pam.nrows() < 2 || pam.ncols() < 2 {
            return Err(StatsError::InputShape(format!(
                "PAM must have at least 2 sites and 2 species, got {}x{}",
                pam.nrows(),
                pam.ncols()
            )));
        }
        if !pam.is_binary() {
            return Err(StatsError::InputShape(
                "PAM contains values other than 0 and 1".into(),
            ));
        }
        Ok(Self {
            nrows: pam.nrows(),
            ncols: pam.ncols(),
            cells: pam.as_slice().iter().map(|&v| v == 1.0).collect(),
        })
    }

    pub(crate) fn nrows(&self) -> usize {
        self.nrows
    }

    pub(crate) fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub(crate) fn get(&self, row: usize, col: usize) -> bool {
        self.cells[row * self.ncols + col]
    }

    #[inline]
    pub(crate) fn set(&mut self, row: usize, col: usize, present: bool) {
        self.cells[row * self.ncols + col] = present;
    }

    pub(crate) fn row_sums(&self) -> Vec<usize> {
        self.cells
            .chunks_exact(self.ncols)
            .map(|row| row.iter().filter(|&&p| p).count())
            .collect()
    }

    pub(crate) fn column_sums(&self) -> Vec<usize> {
        let mut sums = vec![0; self.ncols];
        for row in self.cells.chunks_exact(self.ncols) {
            for (sum, &p) in sums.iter_mut().zip(row) {
                *sum += usize::from(p);
            }
        }
        sums
    }

    pub(crate) fn to_matrix(&self, headers: &Headers) -> Result<Matrix, StatsError> {
        let data = self.cells.iter().map(|&p| if p { 1.0 } else { 0.0 }).collect();
        Ok(Matrix::new(
            data,
            vec![self.nrows, self.ncols],
            headers.clone(),
        )?)
    }
}

/// Configured randomization algorithm, ready to be applied to PAMs.
#[derive(Debug, Clone)]
pub struct Randomizer {
    algorithm: Algorithm,
    graph: Option<Arc<SiteGraph>>,
}

impl Randomizer {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            graph: None,
        }
    }

    /// Attach the site-adjacency graph required by Splotch.
    pub fn with_graph(mut self, graph: Arc<SiteGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn from_config(
        config: &RandomizeConfig,
        graph: Option<Arc<SiteGraph>>,
    ) -> Result<Self, StatsError> {
        let randomizer = Self {
            algorithm: config.algorithm.clone(),
            graph,
        };
        randomizer.validate()?;
        Ok(randomizer)
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        self.algorithm.validate()?;
        if matches!(self.algorithm, Algorithm::Splotch) && self.graph.is_none() {
            return Err(StatsError::InvalidParameter(
                "splotch randomization requires a site adjacency graph".into(),
            ));
        }
        Ok(())
    }

    /// Produce a randomized copy of `pam`.
    ///
    /// The result has the same shape and axis headers as the input. Grady
    /// and Swap keep every row and column sum; Splotch keeps column sums.
    pub fn randomize<R: Rng + ?Sized>(&self, pam: &Matrix, rng: &mut R) -> Result<Matrix, StatsError> {
        self.validate()?;
        let grid = Incidence::from_matrix(pam)?;
        debug!(
            algorithm = self.algorithm.name(),
            sites = grid.nrows(),
            species = grid.ncols(),
            "Randomizing PAM"
        );

        let result = match &self.algorithm {
            Algorithm::Grady { search_threshold } => grady::randomize(&grid, *search_threshold, rng),
            Algorithm::Swap {
                num_swaps,
                max_tries_without_swap,
            } => swap::randomize(&grid, *num_swaps, *max_tries_without_swap, rng),
            Algorithm::Splotch => match &self.graph {
                Some(graph) => splotch::randomize(&grid, graph, rng),
                None => Err(StatsError::InvalidParameter(
                    "splotch randomization requires a site adjacency graph".into(),
                )),
            },
        };

        let randomized = result.inspect_err(|e| {
            if e.is_retryable() {
                warn!(algorithm = self.algorithm.name(), "{e}");
            }
        })?;
        randomized.to_matrix(pam.headers())
    }

    /// Randomize with a fresh generator seeded from `seed`, or from entropy
    /// when `seed` is `None`.
    pub fn randomize_seeded(&self, pam: &Matrix, seed: Option<u64>) -> Result<Matrix, StatsError> {
        let mut rng = match seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_seed(rand::rng().random()),
        };
        self.randomize(pam, &mut rng)
    }
}
