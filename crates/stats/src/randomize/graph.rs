//! Site adjacency for spatially constrained randomization.
//!
//! Sites are numbered in PAM row order. A regular grid numbers its cells
//! row-major, `site = row * cols + col`.

use crate::errors::StatsError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which cells of a regular grid count as neighbors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Neighborhood {
    /// Edge-sharing cells (up to 4).
    #[default]
    Rook,
    /// Edge- or corner-sharing cells (up to 8).
    Queen,
}

/// Undirected neighbor lists, one per site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SiteGraph {
    neighbors: Vec<Vec<usize>>,
}

impl SiteGraph {
    /// Build from raw neighbor lists.
    ///
    /// Self-loops and duplicates are dropped and the relation is made
    /// symmetric. Any index outside `0..lists.len()` is an error.
    pub fn from_neighbors(lists: Vec<Vec<usize>>) -> Result<Self, StatsError> {
        let n = lists.len();
        let mut neighbors = vec![Vec::new(); n];
        for (site, list) in lists.into_iter().enumerate() {
            for other in list {
                if other >= n {
                    return Err(StatsError::InputShape(format!(
                        "site {site} lists neighbor {other}, but there are only {n} sites"
                    )));
                }
                if other != site {
                    neighbors[site].push(other);
                    neighbors[other].push(site);
                }
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }
        Ok(Self { neighbors })
    }

    /// Parse a JSON array of neighbor-index arrays.
    pub fn from_json(text: &str) -> Result<Self, StatsError> {
        let lists: Vec<Vec<usize>> = serde_json::from_str(text)
            .map_err(|e| StatsError::InputShape(format!("invalid adjacency JSON: {e}")))?;
        Self::from_neighbors(lists)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StatsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StatsError::InputShape(format!("cannot read adjacency {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Adjacency of a `rows × cols` grid of square cells.
    pub fn grid(rows: usize, cols: usize, neighborhood: Neighborhood) -> Self {
        let offsets: &[(isize, isize)] = match neighborhood {
            Neighborhood::Rook => &[(-1, 0), (0, -1), (0, 1), (1, 0)],
            Neighborhood::Queen => &[
                (-1, -1),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ],
        };
        let mut neighbors = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let list = offsets
                    .iter()
                    .filter_map(|&(dr, dc)| {
                        let nr = r.checked_add_signed(dr).filter(|&v| v < rows)?;
                        let nc = c.checked_add_signed(dc).filter(|&v| v < cols)?;
                        Some(nr * cols + nc)
                    })
                    .collect();
                neighbors.push(list);
            }
        }
        Self { neighbors }
    }

    /// Number of sites.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self, site: usize) -> &[usize] {
        &self.neighbors[site]
    }

    /// Number of connected components.
    pub fn component_count(&self) -> usize {
        let mut seen = vec![false; self.len()];
        let mut components = 0;
        for start in 0..self.len() {
            if seen[start] {
                continue;
            }
            components += 1;
            seen[start] = true;
            let mut stack = vec![start];
            while let Some(site) = stack.pop() {
                for &nb in &self.neighbors[site] {
                    if !seen[nb] {
                        seen[nb] = true;
                        stack.push(nb);
                    }
                }
            }
        }
        components
    }
}
