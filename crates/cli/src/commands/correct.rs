use anyhow::{bail, Context, Result};
use metacomm_stats::mcpa::McpaOutput;
use metacomm_stats::{adjust_p_values, benjamini_hochberg, p_values, AnalysisConfig, Comparison, PermutationResult};
use tracing::debug;

use super::{load_matrix, save_matrix};
use crate::args::CorrectArgs;
use crate::printing::{print_banner, print_correction, print_matrix_summary};

pub fn correct_p_values(args: &CorrectArgs, config: &AnalysisConfig) -> Result<()> {
    print_banner("Correcting P-Values");

    let fdr = args.fdr.unwrap_or(config.correction.fdr);
    if !(fdr > 0.0 && fdr <= 1.0) {
        bail!("FDR must be in (0, 1], got {fdr}");
    }
    let comparison = args
        .comparison
        .map(Comparison::from)
        .unwrap_or(config.permutation.comparison);

    let stack = load_matrix("observed stack", &args.observed)?;
    let McpaOutput { observed, f_values } = McpaOutput::from_stack(&stack)
        .with_context(|| format!("{} is not an MCPA output stack", args.observed.display()))?;

    println!("📂 Inputs");
    print_matrix_summary("Observed", &stack, &args.observed);
    let mut replicates = Vec::with_capacity(args.f_values.len());
    for path in &args.f_values {
        let m = load_matrix("F-values", path)?;
        print_matrix_summary("F-values", &m, path);
        debug!(path = %path.display(), layers = m.depth(), "Loaded replicate F-values");
        replicates.push(m);
    }

    let p = p_values(&f_values, &replicates, comparison)?;
    let significant = benjamini_hochberg(&p, fdr)?;
    let result = PermutationResult {
        observed,
        f_values,
        p_values: p,
        significant,
        replicates: replicates.iter().map(|m| m.depth()).sum(),
    };
    print_correction(&result, fdr, comparison);

    let out = result.to_stack()?;
    save_matrix(&out, &args.output)?;
    println!("\n✓ Correction complete!");
    print_matrix_summary("Output", &out, &args.output);

    if let Some(path) = &args.p_values_out {
        save_matrix(&result.p_values, path)?;
        print_matrix_summary("P-values", &result.p_values, path);
    }
    if let Some(path) = &args.significance_out {
        save_matrix(&result.significant, path)?;
        print_matrix_summary("Significance", &result.significant, path);
    }
    if let (Some(path), Some(method)) = (&args.adjusted_out, args.method) {
        let adjusted = adjust_p_values(&result.p_values, method.into())?;
        save_matrix(&adjusted, path)?;
        print_matrix_summary("Adjusted P-values", &adjusted, path);
    }
    Ok(())
}
