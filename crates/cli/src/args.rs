use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use metacomm_stats::config::{Algorithm, RandomizeConfig};
use metacomm_stats::permutation::CorrectionMethod;
use metacomm_stats::{Comparison, Neighborhood, SiteGraph};
use std::path::PathBuf;
use std::sync::Arc;

/// Randomization options shared by `randomize` and `mcpa-run`.
#[derive(Args, Debug, Clone)]
pub struct RandomizeOptions {
    /// Randomization algorithm (grady, swap, splotch)
    ///
    /// Defaults to the configuration file value, or grady.
    #[arg(short, long)]
    pub algorithm: Option<Algorithm>,

    /// Number of successful checkerboard swaps (swap only)
    #[arg(long)]
    pub num_swaps: Option<usize>,

    /// Consecutive failed swap attempts before giving up (swap only)
    #[arg(long)]
    pub max_tries: Option<usize>,

    /// Failed repair searches before giving up (grady only)
    #[arg(long)]
    pub search_threshold: Option<usize>,

    /// Site adjacency JSON: one neighbor list per site (splotch only)
    #[arg(long, conflicts_with = "grid")]
    pub adjacency: Option<PathBuf>,

    /// Regular grid of sites, row-major, as ROWSxCOLS (splotch only)
    #[arg(long, value_parser = parse_grid)]
    pub grid: Option<(usize, usize)>,

    /// Use queen (8-neighbor) adjacency for --grid instead of rook
    #[arg(long, requires = "grid")]
    pub queen: bool,

    /// Random seed (default: drawn from entropy)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl RandomizeOptions {
    /// Apply command line overrides on top of a configured randomization.
    pub fn resolve(&self, base: &RandomizeConfig) -> Result<RandomizeConfig> {
        let mut algorithm = self.algorithm.clone().unwrap_or_else(|| base.algorithm.clone());
        match &mut algorithm {
            Algorithm::Swap {
                num_swaps,
                max_tries_without_swap,
            } => {
                if let Some(n) = self.num_swaps {
                    *num_swaps = n;
                }
                if let Some(n) = self.max_tries {
                    *max_tries_without_swap = n;
                }
            }
            Algorithm::Grady { search_threshold } => {
                if let Some(n) = self.search_threshold {
                    *search_threshold = n;
                }
            }
            Algorithm::Splotch => {}
        }
        if self.num_swaps.is_some() && !matches!(algorithm, Algorithm::Swap { .. }) {
            bail!("--num-swaps only applies to the swap algorithm");
        }
        algorithm.validate()?;
        Ok(RandomizeConfig {
            algorithm,
            seed: self.seed.or(base.seed),
        })
    }

    /// Site graph from `--adjacency` or `--grid`, if either is given.
    pub fn site_graph(&self) -> Result<Option<Arc<SiteGraph>>> {
        if let Some(path) = &self.adjacency {
            let graph = SiteGraph::load(path)
                .with_context(|| format!("Failed to load adjacency from {}", path.display()))?;
            return Ok(Some(Arc::new(graph)));
        }
        Ok(self.grid.map(|(rows, cols)| {
            let neighborhood = if self.queen {
                Neighborhood::Queen
            } else {
                Neighborhood::Rook
            };
            Arc::new(SiteGraph::grid(rows, cols, neighborhood))
        }))
    }
}

fn parse_grid(s: &str) -> Result<(usize, usize), String> {
    let (rows, cols) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected ROWSxCOLS, got '{s}'"))?;
    let rows: usize = rows.trim().parse().map_err(|e| format!("grid rows: {e}"))?;
    let cols: usize = cols.trim().parse().map_err(|e| format!("grid columns: {e}"))?;
    if rows == 0 || cols == 0 {
        return Err("grid dimensions must be positive".into());
    }
    Ok((rows, cols))
}

#[derive(Args, Debug)]
pub struct RandomizeArgs {
    /// Input PAM (sites × species)
    #[arg(short, long)]
    pub pam: PathBuf,

    #[command(flatten)]
    pub options: RandomizeOptions,

    /// Output matrix path
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct McpaArgs {
    /// PAM (sites × species)
    #[arg(short, long)]
    pub pam: PathBuf,

    /// Encoded phylogeny (species × nodes)
    #[arg(long)]
    pub tree_matrix: PathBuf,

    /// Environment predictors (sites × variables)
    #[arg(short, long)]
    pub env: PathBuf,

    /// Biogeographic hypotheses (sites × hypotheses)
    #[arg(short, long)]
    pub bio: Option<PathBuf>,

    /// Randomize the PAM and write one F-value layer per permutation
    #[arg(long)]
    pub randomize: bool,

    /// Number of permutations (with --randomize)
    #[arg(short = 'n', long, requires = "randomize")]
    pub permutations: Option<usize>,

    #[command(flatten)]
    pub options: RandomizeOptions,

    /// Workers for the per-node loop
    #[arg(long)]
    pub node_workers: Option<usize>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Output stack path
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Adjusted-p-value procedures selectable on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArg {
    Bh,
    Bonferroni,
    Holm,
}

impl From<MethodArg> for CorrectionMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Bh => CorrectionMethod::BenjaminiHochberg,
            MethodArg::Bonferroni => CorrectionMethod::Bonferroni,
            MethodArg::Holm => CorrectionMethod::BonferroniHolm,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonArg {
    Absolute,
    Signed,
}

impl From<ComparisonArg> for Comparison {
    fn from(c: ComparisonArg) -> Self {
        match c {
            ComparisonArg::Absolute => Comparison::Absolute,
            ComparisonArg::Signed => Comparison::Signed,
        }
    }
}

#[derive(Args, Debug)]
pub struct CorrectArgs {
    /// Observed stack written by `mcpa-run`
    #[arg(long)]
    pub observed: PathBuf,

    /// Randomized F-value matrices or stacks
    #[arg(short, long = "f-values", num_args = 1.., required = true)]
    pub f_values: Vec<PathBuf>,

    /// False discovery rate (default: configuration value, or 0.05)
    #[arg(long)]
    pub fdr: Option<f64>,

    /// How replicate F-values are compared with observed ones
    #[arg(long, value_enum)]
    pub comparison: Option<ComparisonArg>,

    /// Output stack: observed, F-values, p-values, significance
    #[arg(short, long)]
    pub output: PathBuf,

    /// Also write the p-value matrix here
    #[arg(long)]
    pub p_values_out: Option<PathBuf>,

    /// Also write the significance matrix here
    #[arg(long)]
    pub significance_out: Option<PathBuf>,

    /// Also write adjusted p-values here
    #[arg(long, requires = "method")]
    pub adjusted_out: Option<PathBuf>,

    /// Adjustment procedure for --adjusted-out
    #[arg(long, value_enum)]
    pub method: Option<MethodArg>,
}
