use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use metacomm_matrix::Matrix;
use metacomm_stats::config::{McpaConfig, PermutationConfig};
use metacomm_stats::{AnalysisConfig, McpaEngine, PermutationTester};
use tracing::info;

use super::{load_matrix, save_matrix};
use crate::args::McpaArgs;
use crate::defaults::{PROGRESS_CHARS, PROGRESS_TEMPLATE, RANDOMIZED_RUNS, REPLICATE_LAYER_PREFIX};
use crate::printing::{print_banner, print_matrix_summary, print_randomization};

pub fn run_mcpa(args: &McpaArgs, config: &AnalysisConfig) -> Result<()> {
    print_banner("Metacommunity Phylogenetics Analysis");

    let pam = load_matrix("PAM", &args.pam)?;
    let tree = load_matrix("tree matrix", &args.tree_matrix)?;
    let env = load_matrix("environment matrix", &args.env)?;
    let bio = args
        .bio
        .as_ref()
        .map(|path| load_matrix("biogeography matrix", path))
        .transpose()?;

    println!("📂 Inputs");
    print_matrix_summary("PAM", &pam, &args.pam);
    print_matrix_summary("Tree Matrix", &tree, &args.tree_matrix);
    print_matrix_summary("Environment", &env, &args.env);
    if let (Some(bio), Some(path)) = (&bio, &args.bio) {
        print_matrix_summary("Biogeography", bio, path);
    }

    let stack = if args.randomize {
        randomized_stack(args, config, &pam, &tree, &env, bio.as_ref())?
    } else {
        let mcpa = McpaConfig {
            node_workers: args.node_workers.or(config.mcpa.node_workers),
            ..config.mcpa.clone()
        };
        let engine = McpaEngine::new(&tree, &env, bio.as_ref(), &mcpa)?;
        println!("\nRunning MCPA over {} nodes...", engine.num_nodes());
        engine.run(&pam).context("MCPA failed")?.to_stack()?
    };

    save_matrix(&stack, &args.output)?;
    println!("\n✓ MCPA complete!");
    print_matrix_summary("Output", &stack, &args.output);
    Ok(())
}

/// Randomize the PAM once per permutation and stack the F-value matrices.
fn randomized_stack(
    args: &McpaArgs,
    config: &AnalysisConfig,
    pam: &Matrix,
    tree: &Matrix,
    env: &Matrix,
    bio: Option<&Matrix>,
) -> Result<Matrix> {
    let base = &config.permutation;
    let permutations = args
        .permutations
        .unwrap_or(if base.permutations > 0 { base.permutations } else { RANDOMIZED_RUNS });
    let mut randomize = args.options.resolve(&base.randomize)?;
    randomize.seed = randomize.seed.or(base.seed);
    let permutation = PermutationConfig {
        permutations,
        seed: randomize.seed,
        randomize: randomize.clone(),
        node_workers: args.node_workers.unwrap_or(base.node_workers),
        ..base.clone()
    };
    let tester = PermutationTester::new(permutation, args.options.site_graph()?)?;
    let engine = McpaEngine::new(tree, env, bio, &tester.mcpa_config(&config.mcpa))?;

    print_randomization(&randomize);
    println!("  • Permutations: {permutations} [--permutations]");
    println!(
        "  • Workers: {} permutation × {} node",
        tester.plan().permutation_workers,
        tester.plan().node_workers
    );
    println!();

    let pb = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(permutations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)?
                .progress_chars(PROGRESS_CHARS),
        );
        pb
    };
    let replicates = tester
        .run_replicates_with_progress(pam, &engine, || pb.inc(1))
        .context("Permutation batch failed")?;
    pb.finish_with_message("Done");
    info!(replicates = replicates.len(), "Stacking randomized F-values");

    let layers: Vec<&Matrix> = replicates.iter().collect();
    let labels = (0..replicates.len())
        .map(|i| format!("{REPLICATE_LAYER_PREFIX}{i}"))
        .collect();
    Ok(Matrix::stack(&layers, Some(labels))?)
}
