//! Checkerboard swap randomization.

use super::Incidence;
use crate::errors::StatsError;
use rand::Rng;

/// Perform `num_swaps` successful checkerboard flips on a copy of `pam`.
///
/// A pick of two distinct rows and two distinct columns whose 2×2 submatrix
/// is `[[1, 0], [0, 1]]` or `[[0, 1], [1, 0]]` is flipped to the opposite
/// orientation, which leaves every row and column sum unchanged. Fails once
/// `max_tries` consecutive picks in a row find no checkerboard.
pub(super) fn randomize<R: Rng + ?Sized>(
    pam: &Incidence,
    num_swaps: usize,
    max_tries: usize,
    rng: &mut R,
) -> Result<Incidence, StatsError> {
    let mut grid = pam.clone();
    let (nrows, ncols) = (grid.nrows(), grid.ncols());
    let mut swaps = 0;
    let mut tries = 0;

    while swaps < num_swaps {
        if tries >= max_tries {
            return Err(StatsError::RandomizationExhausted {
                algorithm: "swap",
                attempts: tries,
                detail: format!("{swaps} of {num_swaps} swaps completed"),
            });
        }
        let (r1, r2) = distinct_pair(nrows, rng);
        let (c1, c2) = distinct_pair(ncols, rng);

        let corner = grid.get(r1, c1);
        let is_checkerboard = corner != grid.get(r1, c2)
            && corner != grid.get(r2, c1)
            && corner == grid.get(r2, c2);
        if is_checkerboard {
            grid.set(r1, c1, !corner);
            grid.set(r2, c2, !corner);
            grid.set(r1, c2, corner);
            grid.set(r2, c1, corner);
            swaps += 1;
            tries = 0;
        } else {
            tries += 1;
        }
    }
    Ok(grid)
}

/// Two distinct uniform indices below `n` (`n >= 2`).
fn distinct_pair<R: Rng + ?Sized>(n: usize, rng: &mut R) -> (usize, usize) {
    let a = rng.random_range(0..n);
    let mut b = rng.random_range(0..n - 1);
    if b >= a {
        b += 1;
    }
    (a, b)
}
