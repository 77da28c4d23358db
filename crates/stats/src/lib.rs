//! Metacomm statistics: null models and phylogenetic regression for
//! metacommunity analysis.
//!
//! The crate provides three layers built on [`metacomm_matrix::Matrix`]:
//!
//! - [`randomize`]: null-model randomization of presence-absence matrices
//!   (Grady fill, checkerboard swap, spatially contiguous splotch).
//! - [`mcpa`]: Metacommunity Phylogenetics Analysis, one weighted regression
//!   per phylogenetic node against environment and biogeography.
//! - [`permutation`]: replicate batches, empirical p-values and
//!   Benjamini–Hochberg correction.

pub mod config;
pub mod errors;
pub mod linalg;
pub mod mcpa;
pub mod permutation;
pub mod prelude;
pub mod randomize;
pub mod standardize;

pub use config::{
    Algorithm, AnalysisConfig, Comparison, CorrectionConfig, McpaConfig, PermutationConfig,
    RandomizeConfig,
};
pub use errors::StatsError;
pub use mcpa::{run_mcpa, McpaEngine, McpaOutput};
pub use permutation::{
    adjust_p_values, benjamini_hochberg, p_values, CorrectionMethod, PermutationResult,
    PermutationTester,
};
pub use randomize::{Neighborhood, Randomizer, SiteGraph};
