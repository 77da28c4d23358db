//! Shared default values for the command line.
//! Library defaults (search threshold, swap budget, FDR) live in `metacomm_stats::config`.

/// Log level when neither `-v` nor `RUST_LOG` is given.
pub const LOG_LEVEL: &str = "warn";

/// Replicates run by `mcpa-run --randomize` when no count is configured.
pub const RANDOMIZED_RUNS: usize = 1;

/// Progress bar layout for permutation batches.
pub const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {per_sec}";
pub const PROGRESS_CHARS: &str = "#>-";

/// Depth label prefix of randomized F-value layers.
pub const REPLICATE_LAYER_PREFIX: &str = "Permutation ";
