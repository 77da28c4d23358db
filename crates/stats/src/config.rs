//! Run configuration.
//!
//! Every parameter that influences a result lives in one of these structs so
//! a run can be reproduced from a JSON file.

use crate::errors::StatsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Number of failed repair searches tolerated by the Grady algorithm.
pub const DEFAULT_SEARCH_THRESHOLD: usize = 100_000;
/// Consecutive unsuccessful swap attempts tolerated before giving up.
pub const DEFAULT_MAX_TRIES_WITHOUT_SWAP: usize = 1_000_000;
/// Successful swaps performed when no count is given.
pub const DEFAULT_NUM_SWAPS: usize = 50;
/// Default false discovery rate for Benjamini–Hochberg.
pub const DEFAULT_FDR: f64 = 0.05;

fn default_search_threshold() -> usize {
    DEFAULT_SEARCH_THRESHOLD
}

fn default_max_tries() -> usize {
    DEFAULT_MAX_TRIES_WITHOUT_SWAP
}

fn default_num_swaps() -> usize {
    DEFAULT_NUM_SWAPS
}

fn default_fdr() -> f64 {
    DEFAULT_FDR
}

/// Randomization algorithm and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Algorithm {
    /// Marginal-preserving fill with trim/fill/repair phases.
    Grady {
        #[serde(default = "default_search_threshold")]
        search_threshold: usize,
    },
    /// Checkerboard swaps; preserves both marginals.
    Swap {
        #[serde(default = "default_num_swaps")]
        num_swaps: usize,
        #[serde(default = "default_max_tries")]
        max_tries_without_swap: usize,
    },
    /// Spatially contiguous regrowth; preserves column sums only.
    Splotch,
}

impl Algorithm {
    pub fn grady() -> Self {
        Self::Grady {
            search_threshold: DEFAULT_SEARCH_THRESHOLD,
        }
    }

    pub fn swap(num_swaps: usize) -> Self {
        Self::Swap {
            num_swaps,
            max_tries_without_swap: DEFAULT_MAX_TRIES_WITHOUT_SWAP,
        }
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Grady { .. } => "grady",
            Self::Swap { .. } => "swap",
            Self::Splotch => "splotch",
        }
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        match self {
            Self::Grady { search_threshold } if *search_threshold == 0 => Err(
                StatsError::InvalidParameter("Grady search threshold must be positive".into()),
            ),
            Self::Swap {
                max_tries_without_swap,
                ..
            } if *max_tries_without_swap == 0 => Err(StatsError::InvalidParameter(
                "Swap max tries without swap must be positive".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::grady()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grady" => Ok(Self::grady()),
            "swap" => Ok(Self::swap(DEFAULT_NUM_SWAPS)),
            "splotch" => Ok(Self::Splotch),
            other => Err(StatsError::InvalidParameter(format!(
                "unknown randomization algorithm '{other}' (expected grady, swap or splotch)"
            ))),
        }
    }
}

/// Parameters of a single randomization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomizeConfig {
    pub algorithm: Algorithm,
    /// Optional RNG seed for reproducibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl RandomizeConfig {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Parameters of one MCPA run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpaConfig {
    /// Workers for the node loop; `None` runs sequentially.
    #[serde(default)]
    pub node_workers: Option<usize>,
    /// Concurrent full-model fits allowed.
    #[serde(default = "default_kernel_permits")]
    pub kernel_permits: usize,
}

fn default_kernel_permits() -> usize {
    1
}

impl Default for McpaConfig {
    fn default() -> Self {
        Self::sequential()
    }
}

impl McpaConfig {
    pub fn sequential() -> Self {
        Self {
            node_workers: None,
            kernel_permits: 1,
        }
    }

    pub fn parallel(workers: usize) -> Self {
        Self {
            node_workers: Some(workers),
            kernel_permits: 1,
        }
    }
}

/// How a replicate statistic is compared with the observed one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// `|replicate| >= |observed|`
    #[default]
    Absolute,
    /// `replicate >= observed`
    Signed,
}

/// Parameters of a permutation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationConfig {
    /// Number of replicates
    #[serde(default)]
    pub permutations: usize,
    /// Master seed; replicate seeds are drawn from it in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub randomize: RandomizeConfig,
    #[serde(default)]
    pub comparison: Comparison,
    /// Replicates evaluated concurrently
    #[serde(default = "default_workers")]
    pub permutation_workers: usize,
    /// Node-loop workers inside each replicate
    #[serde(default = "default_workers")]
    pub node_workers: usize,
}

fn default_workers() -> usize {
    1
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            permutations: 0,
            seed: None,
            randomize: RandomizeConfig::default(),
            comparison: Comparison::default(),
            permutation_workers: 1,
            node_workers: 1,
        }
    }
}

impl PermutationConfig {
    pub fn validate(&self) -> Result<(), StatsError> {
        self.randomize.algorithm.validate()?;
        if self.permutation_workers == 0 || self.node_workers == 0 {
            return Err(StatsError::InvalidParameter(
                "worker counts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Multiple-testing correction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    #[serde(default = "default_fdr")]
    pub fdr: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self { fdr: DEFAULT_FDR }
    }
}

impl CorrectionConfig {
    pub fn validate(&self) -> Result<(), StatsError> {
        if !(self.fdr > 0.0 && self.fdr <= 1.0) {
            return Err(StatsError::InvalidParameter(format!(
                "FDR must be in (0, 1], got {}",
                self.fdr
            )));
        }
        Ok(())
    }
}

/// The master configuration, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub mcpa: McpaConfig,
    #[serde(default)]
    pub permutation: PermutationConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
}

impl AnalysisConfig {
    /// Read a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StatsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StatsError::InvalidParameter(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, StatsError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| StatsError::InvalidParameter(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        self.permutation.validate()?;
        self.correction.validate()
    }
}
