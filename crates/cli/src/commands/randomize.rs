use anyhow::{Context, Result};
use metacomm_stats::{AnalysisConfig, Randomizer};
use tracing::info;

use super::{load_matrix, save_matrix};
use crate::args::RandomizeArgs;
use crate::printing::{print_banner, print_matrix_summary, print_randomization};

pub fn randomize_pam(args: &RandomizeArgs, config: &AnalysisConfig) -> Result<()> {
    print_banner("Randomizing PAM");

    let pam = load_matrix("PAM", &args.pam)?;
    let randomize = args.options.resolve(&config.permutation.randomize)?;
    let graph = args.options.site_graph()?;
    let randomizer = Randomizer::from_config(&randomize, graph)?;

    print_matrix_summary("Input", &pam, &args.pam);
    print_randomization(&randomize);

    let randomized = randomizer
        .randomize_seeded(&pam, randomize.seed)
        .context("Randomization failed")?;
    info!(output = %args.output.display(), "Writing randomized PAM");
    save_matrix(&randomized, &args.output)?;

    println!("\n✓ Randomization complete!");
    print_matrix_summary("Output", &randomized, &args.output);
    Ok(())
}
