mod args;
mod commands;
pub mod defaults;
mod printing;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use metacomm_stats::AnalysisConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use args::{CorrectArgs, McpaArgs, RandomizeArgs};
use commands::{correct, mcpa, randomize};

/// Metacomm: null models and phylogenetic regression for metacommunities
///
/// Randomizes presence-absence matrices, runs Metacommunity Phylogenetics
/// Analysis (MCPA) and turns permutation replicates into corrected p-values.
#[derive(Parser, Debug)]
#[command(name = "metacomm")]
#[command(author, version, about = "Metacommunity randomization and MCPA", long_about = None)]
struct Cli {
    /// Number of threads to use for parallel processing
    ///
    /// Caps the permutation worker pool. If not specified, the
    /// configuration value is used.
    #[arg(short = 't', long, global = true)]
    threads: Option<usize>,

    /// JSON configuration file; command line flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Randomize a presence-absence matrix.
    ///
    /// Grady and swap keep every row and column total; splotch keeps species
    /// range sizes and grows them as contiguous patches over a site graph.
    Randomize(RandomizeArgs),

    /// Run MCPA on a PAM, or on randomized copies of it.
    ///
    /// Without --randomize, writes the observed statistics and F-values as a
    /// two-layer stack. With --randomize, writes one F-value layer per
    /// permutation.
    McpaRun(Box<McpaArgs>),

    /// Compute permutation p-values and Benjamini-Hochberg significance.
    CorrectPValues(CorrectArgs),
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(defaults::LOG_LEVEL)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
        config.permutation.permutation_workers = threads.max(1);
    }

    match cli.command {
        Commands::Randomize(args) => {
            randomize::randomize_pam(&args, &config)?;
        }
        Commands::McpaRun(args) => {
            mcpa::run_mcpa(&args, &config)?;
        }
        Commands::CorrectPValues(args) => {
            correct::correct_p_values(&args, &config)?;
        }
    }

    Ok(())
}
