//! Commonly used imports for convenience.
//!
//! # Example
//!
//! ```
//! use metacomm_stats::prelude::*;
//!
//! let pam = Matrix::from_rows(&[
//!     vec![1.0, 0.0, 1.0],
//!     vec![0.0, 1.0, 1.0],
//!     vec![1.0, 1.0, 0.0],
//! ])
//! .unwrap();
//! let randomizer = Randomizer::new(Algorithm::swap(10));
//! let shuffled = randomizer.randomize_seeded(&pam, Some(7)).unwrap();
//! assert_eq!(shuffled.row_sums(), pam.row_sums());
//! ```

pub use crate::config::{
    Algorithm, AnalysisConfig, Comparison, CorrectionConfig, McpaConfig, PermutationConfig,
    RandomizeConfig,
};
pub use crate::errors::StatsError;
pub use crate::mcpa::{run_mcpa, McpaEngine, McpaOutput};
pub use crate::permutation::{benjamini_hochberg, p_values, PermutationResult, PermutationTester};
pub use crate::randomize::{Neighborhood, Randomizer, SiteGraph};
pub use metacomm_matrix::{Headers, Matrix};
