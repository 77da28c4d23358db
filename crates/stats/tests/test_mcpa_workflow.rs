//! End-to-end tests: randomize, run MCPA, compute p-values and correct them.

use metacomm_matrix::{Headers, Matrix};
use metacomm_stats::mcpa::{BG_ADJUSTED_R2_LABEL, ENV_ADJUSTED_R2_LABEL};
use metacomm_stats::permutation::{P_VALUES_LAYER, SIGNIFICANCE_LAYER};
use metacomm_stats::prelude::*;

const THIRD: f64 = 1.0 / 3.0;

/// Tree ((A,B),(C,(D,(E,F)))) encoded as species × internal nodes.
fn six_tip_tree() -> Matrix {
    Matrix::from_rows(&[
        vec![0.5, 1.0, 0.0, 0.0, 0.0],
        vec![0.5, -1.0, 0.0, 0.0, 0.0],
        vec![-0.25, 0.0, 1.0, 0.0, 0.0],
        vec![-0.25, 0.0, -THIRD, 1.0, 0.0],
        vec![-0.25, 0.0, -THIRD, -0.5, 1.0],
        vec![-0.25, 0.0, -THIRD, -0.5, -1.0],
    ])
    .unwrap()
    .with_headers(
        Headers::new()
            .with_axis(0, ["A", "B", "C", "D", "E", "F"])
            .with_axis(1, ["root", "AB", "CDEF", "DEF", "EF"]),
    )
    .unwrap()
}

fn four_site_pam() -> Matrix {
    Matrix::from_rows(&[
        vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0],
        vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0],
        vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
    ])
    .unwrap()
}

fn four_site_env() -> Matrix {
    Matrix::from_rows(&[vec![12.5], vec![14.0], vec![9.5], vec![17.25]]).unwrap()
}

fn four_site_bio() -> Matrix {
    Matrix::from_rows(&[vec![1.0], vec![1.0], vec![-1.0], vec![-1.0]]).unwrap()
}

/// Tree ((a,b),(c,(d,e))).
fn five_tip_tree() -> Matrix {
    Matrix::from_rows(&[
        vec![0.5, 1.0, 0.0, 0.0],
        vec![0.5, -1.0, 0.0, 0.0],
        vec![-THIRD, 0.0, 1.0, 0.0],
        vec![-THIRD, 0.0, -0.5, 1.0],
        vec![-THIRD, 0.0, -0.5, -1.0],
    ])
    .unwrap()
}

fn twelve_site_pam() -> Matrix {
    Matrix::from_rows(&[
        vec![1.0, 0.0, 1.0, 0.0, 1.0],
        vec![1.0, 1.0, 0.0, 0.0, 1.0],
        vec![0.0, 1.0, 0.0, 1.0, 0.0],
        vec![1.0, 0.0, 1.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0, 0.0, 1.0],
        vec![1.0, 1.0, 0.0, 0.0, 0.0],
        vec![0.0, 1.0, 1.0, 1.0, 1.0],
        vec![1.0, 0.0, 0.0, 0.0, 1.0],
        vec![0.0, 0.0, 1.0, 1.0, 0.0],
        vec![1.0, 1.0, 0.0, 1.0, 0.0],
        vec![0.0, 1.0, 1.0, 0.0, 1.0],
        vec![1.0, 0.0, 0.0, 1.0, 1.0],
    ])
    .unwrap()
}

fn twelve_site_env() -> Matrix {
    let rows = (0..12)
        .map(|i| {
            let x = i as f64;
            vec![(x * 0.7).sin() * 3.0 + x * 0.2, (x * 1.3).cos() + 0.1 * x * x]
        })
        .collect::<Vec<_>>();
    Matrix::from_rows(&rows)
        .unwrap()
        .with_headers(Headers::new().with_axis(1, ["temperature", "rainfall"]))
        .unwrap()
}

fn twelve_site_bio() -> Matrix {
    let rows = (0..12)
        .map(|i| vec![if i % 4 < 2 { 1.0 } else { -1.0 }])
        .collect::<Vec<_>>();
    Matrix::from_rows(&rows)
        .unwrap()
        .with_headers(Headers::new().with_axis(1, ["river"]))
        .unwrap()
}

fn adjusted_r2_columns(out: &Matrix) -> [usize; 2] {
    let columns = out.headers().get(1).unwrap();
    let env = columns.iter().position(|c| c == ENV_ADJUSTED_R2_LABEL).unwrap();
    let bg = columns.iter().position(|c| c == BG_ADJUSTED_R2_LABEL).unwrap();
    [env, bg]
}

#[test]
fn test_six_tip_tree_mcpa() {
    let tree = six_tip_tree();
    let env = four_site_env();
    let bio = four_site_bio();
    let engine = McpaEngine::new(&tree, &env, Some(&bio), &McpaConfig::default()).unwrap();
    let randomizer = Randomizer::new(Algorithm::swap(5));

    let signs = |seed: u64| -> Vec<f64> {
        let pam = randomizer.randomize_seeded(&four_site_pam(), Some(seed)).unwrap();
        let out = engine.run(&pam).unwrap();
        assert_eq!(out.observed.shape(), &[5, 4]);
        for node in 0..5 {
            for col in adjusted_r2_columns(&out.observed) {
                let r2 = out.observed[(node, col)];
                assert!((0.0..=1.0).contains(&r2), "adjusted R² {r2} out of range");
            }
        }
        [0, 2]
            .iter()
            .flat_map(|&col| (0..5).map(move |node| (node, col)))
            .map(|idx| out.observed[idx].signum())
            .collect()
    };

    assert_eq!(signs(17), signs(17));
}

#[test]
fn test_r_squared_bounds_under_randomization() {
    let engine = McpaEngine::new(
        &five_tip_tree(),
        &twelve_site_env(),
        Some(&twelve_site_bio()),
        &McpaConfig::default(),
    )
    .unwrap();
    let randomizer = Randomizer::new(Algorithm::swap(20));

    for seed in 0..10 {
        let pam = randomizer.randomize_seeded(&twelve_site_pam(), Some(seed)).unwrap();
        let out = engine.run(&pam).unwrap();
        for col in adjusted_r2_columns(&out.observed) {
            for node in 0..engine.num_nodes() {
                assert!((0.0..=1.0).contains(&out.observed[(node, col)]));
            }
        }
        assert!(out.f_values.as_slice().iter().all(|f| f.is_finite() && *f >= 0.0));
        assert!(out.observed.as_slice().iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_identical_replicates_give_unit_p_values() {
    let out = run_mcpa(
        &twelve_site_pam(),
        &five_tip_tree(),
        &twelve_site_env(),
        Some(&twelve_site_bio()),
        &McpaConfig::default(),
    )
    .unwrap();
    let replicates = vec![out.f_values.clone(); 100];
    let p = p_values(&out.f_values, &replicates, Comparison::Absolute).unwrap();
    assert!(p.as_slice().iter().all(|&v| v == 1.0));
    assert_eq!(p.headers(), out.f_values.headers());
}

#[test]
fn test_bh_marks_only_smallest_p_value() {
    let p = Matrix::from_rows(&[vec![0.001, 0.2, 0.5, 0.8]]).unwrap();
    let sig = benjamini_hochberg(&p, 0.05).unwrap();
    assert_eq!(sig.as_slice(), &[1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_bh_is_monotone() {
    let values: Vec<f64> = (0..40).map(|i| ((i * 37) % 41) as f64 / 400.0).collect();
    let p = Matrix::from_rows(&[values.clone()]).unwrap();
    let sig = benjamini_hochberg(&p, 0.1).unwrap();
    let sig = sig.as_slice();
    assert!(sig.iter().any(|&s| s == 1.0));
    for i in 0..values.len() {
        for j in 0..values.len() {
            if sig[i] == 1.0 && values[j] <= values[i] {
                assert_eq!(sig[j], 1.0, "p={} rejected while p={} accepted", values[j], values[i]);
            }
        }
    }
}

#[test]
fn test_full_permutation_test() {
    let config = PermutationConfig {
        permutations: 25,
        seed: Some(11),
        randomize: RandomizeConfig::new(Algorithm::swap(15)),
        ..Default::default()
    };
    let tester = PermutationTester::new(config, None).unwrap();
    let engine = McpaEngine::new(
        &five_tip_tree(),
        &twelve_site_env(),
        Some(&twelve_site_bio()),
        &tester.mcpa_config(&McpaConfig::default()),
    )
    .unwrap();

    let result = tester
        .test(&twelve_site_pam(), &engine, CorrectionConfig::default().fdr)
        .unwrap();
    assert_eq!(result.replicates, 25);
    assert_eq!(result.p_values.shape(), &[4, 5]);
    assert!(result.p_values.as_slice().iter().all(|p| (0.0..=1.0).contains(p)));
    assert!(result.significant.is_binary());

    let stack = result.to_stack().unwrap();
    assert_eq!(stack.shape(), &[4, 5, 4]);
    assert_eq!(stack.layer_index(P_VALUES_LAYER), Some(2));
    assert_eq!(stack.layer(3).unwrap(), result.significant);
    assert_eq!(stack.layer_index(SIGNIFICANCE_LAYER), Some(3));
}

#[test]
fn test_failed_replicate_voids_batch() {
    // Nested PAM: no checkerboard exists, so every swap run exhausts.
    let pam = Matrix::from_rows(&[
        vec![1.0, 1.0, 1.0],
        vec![1.0, 1.0, 0.0],
        vec![1.0, 0.0, 0.0],
    ])
    .unwrap();
    let tree = Matrix::from_rows(&[vec![0.5, 0.0], vec![0.5, 1.0], vec![-1.0, -1.0]]).unwrap();
    let env = Matrix::from_rows(&[vec![0.2], vec![1.1], vec![2.3]]).unwrap();

    let config = PermutationConfig {
        permutations: 3,
        seed: Some(1),
        randomize: RandomizeConfig::new(Algorithm::Swap {
            num_swaps: 1,
            max_tries_without_swap: 20,
        }),
        ..Default::default()
    };
    let tester = PermutationTester::new(config, None).unwrap();
    let engine = McpaEngine::new(&tree, &env, None, &tester.mcpa_config(&McpaConfig::default())).unwrap();

    match tester.run_replicates(&pam, &engine) {
        Err(StatsError::WorkerFailure { replicate, source }) => {
            assert_eq!(replicate, 0);
            assert!(source.is_retryable());
        }
        other => panic!("expected a worker failure, got {other:?}"),
    }
}
