use metacomm_matrix::Matrix;
use metacomm_stats::config::{Algorithm, RandomizeConfig};
use metacomm_stats::{Comparison, PermutationResult};
use std::path::Path;

pub fn print_banner(title: &str) {
    println!("🌿 Metacomm - {title}");
    println!("============================================\n");
}

pub fn print_matrix_summary(label: &str, matrix: &Matrix, path: &Path) {
    println!(
        "  • {label}: {} ({})",
        path.display(),
        matrix
            .shape()
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(" × ")
    );
}

pub fn print_randomization(config: &RandomizeConfig) {
    println!("\n🎲 Randomization");
    match &config.algorithm {
        Algorithm::Grady { search_threshold } => {
            println!("  • Algorithm: grady [--algorithm]");
            println!("  • Search Threshold: {search_threshold} [--search-threshold]");
        }
        Algorithm::Swap {
            num_swaps,
            max_tries_without_swap,
        } => {
            println!("  • Algorithm: swap [--algorithm]");
            println!("  • Swaps: {num_swaps} [--num-swaps]");
            println!("  • Max Tries Without Swap: {max_tries_without_swap} [--max-tries]");
        }
        Algorithm::Splotch => {
            println!("  • Algorithm: splotch [--algorithm]");
        }
    }
    match config.seed {
        Some(seed) => println!("  • Random Seed: {seed} [--seed]"),
        None => println!("  • Random Seed: Random [--seed]"),
    }
}

pub fn print_correction(result: &PermutationResult, fdr: f64, comparison: Comparison) {
    let significant = result.significant.as_slice().iter().filter(|&&s| s == 1.0).count();
    println!("\n🎯 Significance");
    println!("  • Replicates: {}", result.replicates);
    println!("  • Comparison: {comparison:?} [--comparison]");
    println!("  • FDR: {fdr} [--fdr]");
    println!(
        "  • Significant Cells: {significant} of {}",
        result.significant.len()
    );
}
