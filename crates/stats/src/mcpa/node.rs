//! Statistics for a single phylogenetic node.

use super::regression::{fit_block, BlockOutcome, Degeneracy};
use crate::linalg::{trace_self_product, KernelGate};
use crate::standardize::standardize;
use nalgebra::{DMatrix, DVectorView};
use tracing::debug;

/// One row of the observed and F-value matrices.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeRow {
    pub observed: Vec<f64>,
    pub f_values: Vec<f64>,
}

/// Read-only inputs shared by every node.
pub(crate) struct NodeInputs<'a> {
    /// Sites × species
    pub pam: &'a DMatrix<f64>,
    /// Sites × environment variables
    pub env: &'a DMatrix<f64>,
    /// Sites × biogeographic hypotheses (possibly zero columns)
    pub bio: &'a DMatrix<f64>,
    pub gate: &'a KernelGate,
}

impl NodeInputs<'_> {
    fn row_width(&self) -> usize {
        self.env.ncols() + self.bio.ncols() + 2
    }

    fn zero_row(&self) -> NodeRow {
        NodeRow {
            observed: vec![0.0; self.row_width()],
            f_values: vec![0.0; self.row_width()],
        }
    }
}

/// Regress the node's projected phylogenetic signal on E, then on B while
/// controlling for E.
///
/// Nodes without enough occupied sites yield an all-zero row.
pub(crate) fn compute_node(
    node: usize,
    loadings: DVectorView<'_, f64>,
    inputs: &NodeInputs<'_>,
) -> (NodeRow, [BlockOutcome; 2]) {
    let species: Vec<usize> = loadings
        .iter()
        .enumerate()
        .filter_map(|(s, &v)| (v != 0.0).then_some(s))
        .collect();
    let sites: Vec<usize> = (0..inputs.pam.nrows())
        .filter(|&site| species.iter().any(|&s| inputs.pam[(site, s)] != 0.0))
        .collect();

    if sites.len() < 2 {
        debug!(node, sites = sites.len(), "Node has too few occupied sites");
        let reason = BlockOutcome::Degenerate(Degeneracy::TooFewSites {
            sites: sites.len(),
            predictors: inputs.env.ncols(),
        });
        return (inputs.zero_row(), [reason.clone(), reason]);
    }

    let incidence = inputs.pam.select_rows(&sites).select_columns(&species);
    let site_weights: Vec<f64> = incidence.row_iter().map(|r| r.sum()).collect();
    let species_weights: Vec<f64> = incidence.column_iter().map(|c| c.sum()).collect();

    let env_std = standardize(&inputs.env.select_rows(&sites), &site_weights);
    let bio_std = standardize(&inputs.bio.select_rows(&sites), &site_weights);

    let node_loadings = DMatrix::from_iterator(species.len(), 1, species.iter().map(|&s| loadings[s]));
    let p_std = standardize(&node_loadings, &species_weights);
    let p_sigma_std = &incidence * p_std;
    let total = trace_self_product(&p_sigma_std);

    let env_outcome = fit_block(
        &env_std,
        &p_sigma_std,
        &site_weights,
        env_std.ncols(),
        total,
        inputs.gate,
    );

    let mut all_std = DMatrix::<f64>::zeros(sites.len(), bio_std.ncols() + env_std.ncols());
    all_std.columns_mut(0, bio_std.ncols()).copy_from(&bio_std);
    all_std
        .columns_mut(bio_std.ncols(), env_std.ncols())
        .copy_from(&env_std);
    let bio_outcome = fit_block(
        &all_std,
        &p_sigma_std,
        &site_weights,
        bio_std.ncols(),
        total,
        inputs.gate,
    );

    if let BlockOutcome::Degenerate(reason) = &env_outcome {
        debug!(node, block = "env", %reason, "Degenerate block recovered as zeros");
    }
    if inputs.bio.ncols() > 0 {
        if let BlockOutcome::Degenerate(reason) = &bio_outcome {
            debug!(node, block = "bg", %reason, "Degenerate block recovered as zeros");
        }
    }

    let mut observed = env_outcome.observed_values(inputs.env.ncols());
    observed.extend(bio_outcome.observed_values(inputs.bio.ncols()));
    let mut f_values = env_outcome.f_values(inputs.env.ncols());
    f_values.extend(bio_outcome.f_values(inputs.bio.ncols()));

    (NodeRow { observed, f_values }, [env_outcome, bio_outcome])
}
