//! Parallel and sequential permutation batches must agree for a fixed seed.

use metacomm_matrix::Matrix;
use metacomm_stats::permutation::ParallelPlan;
use metacomm_stats::prelude::*;

fn pam() -> Matrix {
    Matrix::from_rows(&[
        vec![1.0, 0.0, 1.0, 1.0],
        vec![0.0, 1.0, 1.0, 0.0],
        vec![1.0, 1.0, 0.0, 0.0],
        vec![1.0, 0.0, 0.0, 1.0],
        vec![0.0, 1.0, 1.0, 1.0],
        vec![1.0, 1.0, 0.0, 1.0],
        vec![0.0, 0.0, 1.0, 1.0],
        vec![1.0, 0.0, 1.0, 0.0],
    ])
    .unwrap()
}

fn tree() -> Matrix {
    // ((a,b),(c,d))
    Matrix::from_rows(&[
        vec![0.5, 1.0, 0.0],
        vec![0.5, -1.0, 0.0],
        vec![-0.5, 0.0, 1.0],
        vec![-0.5, 0.0, -1.0],
    ])
    .unwrap()
}

fn env() -> Matrix {
    Matrix::from_rows(&[
        vec![0.3, 10.0],
        vec![1.1, 12.5],
        vec![-0.4, 9.0],
        vec![2.2, 15.5],
        vec![0.9, 11.0],
        vec![-1.3, 8.5],
        vec![1.7, 14.0],
        vec![0.0, 10.5],
    ])
    .unwrap()
}

fn bio() -> Matrix {
    Matrix::from_rows(&[
        vec![1.0],
        vec![1.0],
        vec![1.0],
        vec![1.0],
        vec![-1.0],
        vec![-1.0],
        vec![-1.0],
        vec![-1.0],
    ])
    .unwrap()
}

fn run_batch(seed: u64, permutation_workers: usize, node_workers: usize) -> Vec<Matrix> {
    let config = PermutationConfig {
        permutations: 12,
        seed: Some(seed),
        randomize: RandomizeConfig::new(Algorithm::swap(10)),
        permutation_workers,
        node_workers,
        ..Default::default()
    };
    let tester = PermutationTester::new(config, None).unwrap();
    let engine = McpaEngine::new(&tree(), &env(), Some(&bio()), &tester.mcpa_config(&McpaConfig::default())).unwrap();
    tester.run_replicates(&pam(), &engine).unwrap()
}

fn assert_close(a: &[Matrix], b: &[Matrix]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_eq!(x.shape(), y.shape());
        for (u, v) in x.as_slice().iter().zip(y.as_slice()) {
            assert!((u - v).abs() < 1e-9, "{u} vs {v}");
        }
    }
}

#[test]
fn test_parallel_reproducibility() {
    let sequential = run_batch(42, 1, 1);
    assert_close(&sequential, &run_batch(42, 2, 1));
    assert_close(&sequential, &run_batch(42, 1, 2));
    assert_close(&sequential, &run_batch(42, 2, 2));
}

#[test]
fn test_parallel_different_seeds() {
    let a = run_batch(42, 2, 1);
    let b = run_batch(123, 2, 1);
    assert_eq!(a.len(), b.len());
    assert_ne!(a, b, "batches with different seeds should differ");
}

#[test]
fn test_parallel_node_loop_matches_sequential() {
    let sequential = McpaEngine::new(&tree(), &env(), Some(&bio()), &McpaConfig::sequential()).unwrap();
    let parallel = McpaEngine::new(&tree(), &env(), Some(&bio()), &McpaConfig::parallel(3)).unwrap();
    let a = sequential.run(&pam()).unwrap();
    let b = parallel.run(&pam()).unwrap();
    assert_close(&[a.observed, a.f_values], &[b.observed, b.f_values]);
}

#[test]
fn test_plan_never_oversubscribes() {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    let plan = ParallelPlan::for_host(64, 64);
    assert!(plan.permutation_workers * plan.node_workers <= cores);
    assert!(plan.permutation_workers >= 1 && plan.node_workers >= 1);
}
