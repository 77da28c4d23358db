//! Grady fill randomization.
//!
//! Starts from an empty matrix rather than a permuted copy of the input, so
//! the result carries no trace of the original arrangement:
//!
//! 1. draw each cell with probability `1.5 × max(row fill, column fill)`;
//! 2. trim rows and columns that overshoot their target sums;
//! 3. fill random open cells while both the row and the column are short;
//! 4. repair the remaining shortfalls by moving existing presences.

use super::Incidence;
use crate::errors::StatsError;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

/// Multiplier applied to each cell weight in the initial draw.
const FILL_BIAS: f64 = 1.5;

pub(super) fn randomize<R: Rng + ?Sized>(
    pam: &Incidence,
    search_threshold: usize,
    rng: &mut R,
) -> Result<Incidence, StatsError> {
    let row_targets = pam.row_sums();
    let col_targets = pam.column_sums();

    let mut grid = initial_draw(&row_targets, &col_targets, rng);
    trim(&mut grid, &row_targets, &col_targets, rng);

    let mut row_sums = grid.row_sums();
    let mut col_sums = grid.column_sums();
    let (stuck_rows, stuck_cols) = fill(
        &mut grid,
        (&row_targets[..], &col_targets[..]),
        (&mut row_sums[..], &mut col_sums[..]),
        rng,
    );
    debug!(
        stuck_rows = stuck_rows.len(),
        stuck_cols = stuck_cols.len(),
        "Grady fill finished"
    );

    repair(
        &mut grid,
        (&row_targets[..], &col_targets[..]),
        (&mut row_sums[..], &mut col_sums[..]),
        (stuck_rows, stuck_cols),
        search_threshold,
        rng,
    )?;
    debug_assert_eq!(grid.row_sums(), row_targets);
    debug_assert_eq!(grid.column_sums(), col_targets);
    Ok(grid)
}

fn exhausted(attempts: usize, detail: String) -> StatsError {
    StatsError::RandomizationExhausted {
        algorithm: "grady",
        attempts,
        detail,
    }
}

fn initial_draw<R: Rng + ?Sized>(row_targets: &[usize], col_targets: &[usize], rng: &mut R) -> Incidence {
    let (nrows, ncols) = (row_targets.len(), col_targets.len());
    let mut grid = Incidence::empty(nrows, ncols);
    for (r, &row_total) in row_targets.iter().enumerate() {
        let row_fill = row_total as f64 / ncols as f64;
        for (c, &col_total) in col_targets.iter().enumerate() {
            let weight = row_fill.max(col_total as f64 / nrows as f64);
            if rng.random::<f64>() < FILL_BIAS * weight {
                grid.set(r, c, true);
            }
        }
    }
    grid
}

/// Uniformly drop presences from rows, then columns, above their target.
fn trim<R: Rng + ?Sized>(grid: &mut Incidence, row_targets: &[usize], col_targets: &[usize], rng: &mut R) {
    for (r, &target) in row_targets.iter().enumerate() {
        let mut present: Vec<usize> = (0..grid.ncols()).filter(|&c| grid.get(r, c)).collect();
        while present.len() > target {
            let i = rng.random_range(0..present.len());
            grid.set(r, present.swap_remove(i), false);
        }
    }
    for (c, &target) in col_targets.iter().enumerate() {
        let mut present: Vec<usize> = (0..grid.nrows()).filter(|&r| grid.get(r, c)).collect();
        while present.len() > target {
            let i = rng.random_range(0..present.len());
            grid.set(present.swap_remove(i), c, false);
        }
    }
}

/// Set random empty cells whose row and column are both below target.
///
/// Returns the rows and columns still short once no direct fill is possible.
fn fill<R: Rng + ?Sized>(
    grid: &mut Incidence,
    (row_targets, col_targets): (&[usize], &[usize]),
    (row_sums, col_sums): (&mut [usize], &mut [usize]),
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let mut open_rows: Vec<usize> = (0..grid.nrows())
        .filter(|&r| row_sums[r] < row_targets[r])
        .collect();
    let mut open_cols: Vec<usize> = (0..grid.ncols())
        .filter(|&c| col_sums[c] < col_targets[c])
        .collect();
    let mut stuck_rows = Vec::new();

    while !open_rows.is_empty() {
        let ri = rng.random_range(0..open_rows.len());
        let r = open_rows[ri];
        let candidates: Vec<usize> = open_cols
            .iter()
            .copied()
            .filter(|&c| !grid.get(r, c))
            .collect();
        let Some(&c) = candidates.choose(rng) else {
            stuck_rows.push(open_rows.swap_remove(ri));
            continue;
        };

        grid.set(r, c, true);
        row_sums[r] += 1;
        col_sums[c] += 1;
        if row_sums[r] == row_targets[r] {
            open_rows.swap_remove(ri);
        }
        if col_sums[c] == col_targets[c] {
            if let Some(ci) = open_cols.iter().position(|&x| x == c) {
                open_cols.swap_remove(ci);
            }
        }
    }
    (stuck_rows, open_cols)
}

/// Close the remaining row and column deficits one pair at a time.
///
/// A short `(r, c)` pair is fixed by setting the cell if it is empty, or by
/// moving a presence with [`find_exchange`]. On grids small enough for an
/// exhaustive search a failed pair stays failed until the grid changes, so
/// it is skipped; the batch gives up once no pair is left to try or
/// `search_threshold` searches have failed.
fn repair<R: Rng + ?Sized>(
    grid: &mut Incidence,
    (row_targets, col_targets): (&[usize], &[usize]),
    (row_sums, col_sums): (&mut [usize], &mut [usize]),
    (mut stuck_rows, mut stuck_cols): (Vec<usize>, Vec<usize>),
    search_threshold: usize,
    rng: &mut R,
) -> Result<(), StatsError> {
    let exhaustive = grid.nrows() * grid.ncols() <= search_threshold;
    let mut dead: HashSet<(usize, usize)> = HashSet::new();
    let mut failed_searches = 0usize;

    while !stuck_rows.is_empty() {
        if stuck_cols.is_empty() {
            return Err(exhausted(
                failed_searches,
                "row deficits remain but every column is full".into(),
            ));
        }
        let live: Vec<(usize, usize)> = (0..stuck_rows.len())
            .flat_map(|ri| (0..stuck_cols.len()).map(move |ci| (ri, ci)))
            .filter(|&(ri, ci)| !dead.contains(&(stuck_rows[ri], stuck_cols[ci])))
            .collect();
        let Some(&(ri, ci)) = live.choose(rng) else {
            return Err(exhausted(
                failed_searches,
                "no short row and column pair admits an exchange".into(),
            ));
        };
        let (r, c) = (stuck_rows[ri], stuck_cols[ci]);

        if !grid.get(r, c) {
            grid.set(r, c, true);
        } else {
            match find_exchange(grid, r, c, search_threshold, rng) {
                Some((r2, c2)) => {
                    grid.set(r, c2, true);
                    grid.set(r2, c2, false);
                    grid.set(r2, c, true);
                }
                None => {
                    failed_searches += 1;
                    if failed_searches >= search_threshold {
                        return Err(exhausted(
                            failed_searches,
                            format!("could not fix row {r}, column {c}"),
                        ));
                    }
                    if exhaustive {
                        dead.insert((r, c));
                    }
                    continue;
                }
            }
        }
        dead.clear();

        row_sums[r] += 1;
        col_sums[c] += 1;
        if row_sums[r] == row_targets[r] {
            stuck_rows.swap_remove(ri);
        }
        if col_sums[c] == col_targets[c] {
            stuck_cols.swap_remove(ci);
        }
    }

    if !stuck_cols.is_empty() {
        return Err(exhausted(
            failed_searches,
            "column deficits remain but every row is full".into(),
        ));
    }
    Ok(())
}

/// Find `(r2, c2)` with `(r, c2) = 0`, `(r2, c2) = 1` and `(r2, c) = 0`.
///
/// Moving the presence at `(r2, c2)` to `(r, c2)` and `(r2, c)` raises row
/// `r` and column `c` by one and leaves every other sum unchanged. Small
/// grids are searched exhaustively; larger ones by up to `budget` random
/// probes.
fn find_exchange<R: Rng + ?Sized>(
    grid: &Incidence,
    r: usize,
    c: usize,
    budget: usize,
    rng: &mut R,
) -> Option<(usize, usize)> {
    let valid = |r2: usize, c2: usize| !grid.get(r, c2) && grid.get(r2, c2) && !grid.get(r2, c);
    let (nrows, ncols) = (grid.nrows(), grid.ncols());

    if nrows * ncols <= budget {
        let candidates: Vec<(usize, usize)> = (0..nrows)
            .flat_map(|r2| (0..ncols).map(move |c2| (r2, c2)))
            .filter(|&(r2, c2)| valid(r2, c2))
            .collect();
        return candidates.choose(rng).copied();
    }

    (0..budget).find_map(|_| {
        let (r2, c2) = (rng.random_range(0..nrows), rng.random_range(0..ncols));
        valid(r2, c2).then_some((r2, c2))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn grid_from(rows: &[&[u8]]) -> Incidence {
        let mut grid = Incidence::empty(rows.len(), rows[0].len());
        for (r, row) in rows.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                grid.set(r, c, v == 1);
            }
        }
        grid
    }

    #[test]
    fn test_preserves_marginals() {
        let pam = grid_from(&[
            &[1, 0, 1, 1, 0],
            &[0, 0, 1, 0, 0],
            &[1, 1, 1, 0, 1],
            &[0, 1, 0, 0, 0],
        ]);
        let mut successes = 0;
        for seed in 0..50 {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            match randomize(&pam, 1_000, &mut rng) {
                Ok(out) => {
                    assert_eq!(out.row_sums(), pam.row_sums());
                    assert_eq!(out.column_sums(), pam.column_sums());
                    successes += 1;
                }
                Err(e) => assert!(e.is_retryable()),
            }
        }
        assert!(successes > 0);
    }

    #[test]
    fn test_full_and_empty_matrices() {
        let full = grid_from(&[&[1, 1], &[1, 1]]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert_eq!(randomize(&full, 10, &mut rng).unwrap(), full);

        let empty = grid_from(&[&[0, 0], &[0, 0]]);
        assert_eq!(randomize(&empty, 10, &mut rng).unwrap(), empty);
    }

    #[test]
    fn test_find_exchange_moves_presence() {
        // Row 0 and column 0 are short while (0, 0) is already set.
        let grid = grid_from(&[&[1, 0], &[0, 1]]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        assert_eq!(find_exchange(&grid, 0, 0, 100, &mut rng), Some((1, 1)));
    }

    #[test]
    fn test_repair_exhausts_on_stuck_pair() {
        // Row 0 and column 0 are short, (0, 0) is set and no presence can move.
        let mut grid = grid_from(&[&[1, 1], &[1, 1]]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let err = repair(
            &mut grid,
            (&[3, 2][..], &[3, 2][..]),
            (&mut [2, 2][..], &mut [2, 2][..]),
            (vec![0], vec![0]),
            100,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StatsError::RandomizationExhausted { algorithm: "grady", attempts: 1, .. }
        ));
        assert!(err.is_retryable());
        assert_eq!(grid, grid_from(&[&[1, 1], &[1, 1]]));
    }

    #[test]
    fn test_repair_stops_at_search_budget() {
        // A 2x2 grid is probed at random with a budget of 1, so the pair is retried.
        let mut grid = grid_from(&[&[1, 1], &[1, 1]]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let err = repair(
            &mut grid,
            (&[3, 2][..], &[3, 2][..]),
            (&mut [2, 2][..], &mut [2, 2][..]),
            (vec![0], vec![0]),
            1,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StatsError::RandomizationExhausted { algorithm: "grady", attempts: 1, .. }
        ));
    }

    #[test]
    fn test_repair_fixes_exchangeable_pair() {
        let mut grid = grid_from(&[&[1, 0], &[0, 1]]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        repair(
            &mut grid,
            (&[2, 1][..], &[2, 1][..]),
            (&mut [1, 1][..], &mut [1, 1][..]),
            (vec![0], vec![0]),
            100,
            &mut rng,
        )
        .unwrap();
        assert_eq!(grid, grid_from(&[&[1, 1], &[1, 0]]));
    }

    #[test]
    fn test_find_exchange_reports_impossible() {
        let grid = grid_from(&[&[1, 1], &[1, 1]]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        assert_eq!(find_exchange(&grid, 0, 0, 100, &mut rng), None);
    }
}
