//! Splotch randomization: each species regrows as a contiguous patch.

use super::{Incidence, SiteGraph};
use crate::errors::StatsError;
use rand::seq::IndexedRandom;
use rand::Rng;

pub(super) fn randomize<R: Rng + ?Sized>(
    pam: &Incidence,
    graph: &SiteGraph,
    rng: &mut R,
) -> Result<Incidence, StatsError> {
    if graph.len() != pam.nrows() {
        return Err(StatsError::InputShape(format!(
            "site graph has {} sites but the PAM has {}",
            graph.len(),
            pam.nrows()
        )));
    }

    let mut out = Incidence::empty(pam.nrows(), pam.ncols());
    for (col, &count) in pam.column_sums().iter().enumerate() {
        for (site, marked) in grow_patch(graph, count, rng).into_iter().enumerate() {
            if marked {
                out.set(site, col, true);
            }
        }
    }
    Ok(out)
}

/// Mark `k` sites by growing from a random seed site into random frontier
/// neighbors. An exhausted frontier (disconnected graph) reseeds at a random
/// unmarked site.
fn grow_patch<R: Rng + ?Sized>(graph: &SiteGraph, k: usize, rng: &mut R) -> Vec<bool> {
    let n = graph.len();
    let mut marked = vec![false; n];
    if k >= n {
        marked.fill(true);
        return marked;
    }

    let mut queued = vec![false; n];
    let mut frontier: Vec<usize> = Vec::new();
    for _ in 0..k {
        let site = if frontier.is_empty() {
            let unmarked: Vec<usize> = (0..n).filter(|&s| !marked[s]).collect();
            match unmarked.choose(rng) {
                Some(&s) => s,
                None => break,
            }
        } else {
            let i = rng.random_range(0..frontier.len());
            frontier.swap_remove(i)
        };

        marked[site] = true;
        for &neighbor in graph.neighbors(site) {
            if !marked[neighbor] && !queued[neighbor] {
                queued[neighbor] = true;
                frontier.push(neighbor);
            }
        }
    }
    marked
}
