//! Tests for MomentSketch
//!
//! Tests verify:
//! - Exact count/min/max/mean bookkeeping
//! - Quantile accuracy on log-normal data (the sketch's home turf)
//! - Merge equivalence and parameter checks
//! - Degenerate streams and solver fallback behavior

use quantileflow::{Mergeable, MomentSketch, Sketch, SketchError, SolverConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal};

fn empirical_quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = ((q * sorted.len() as f64).ceil() as usize).max(1);
    sorted[rank - 1]
}

// ============================================================================
// Construction and bookkeeping
// ============================================================================

#[test]
fn test_moment_count_validation() {
    assert!(MomentSketch::new(0).is_err());
    assert!(MomentSketch::new(1).is_ok());
    assert!(MomentSketch::new(10).is_ok());
    assert!(MomentSketch::new(32).is_ok());
    assert!(MomentSketch::new(33).is_err());
}

#[test]
fn test_summary_is_exact() {
    let mut sketch = MomentSketch::with_defaults();
    for i in 1..=10_000 {
        sketch.insert(i as f64).unwrap();
    }
    let summary = sketch.summary().unwrap();
    assert_eq!(summary.count, 10_000);
    assert_eq!(summary.min, 1.0);
    assert_eq!(summary.max, 10_000.0);
    assert!((summary.mean - 5000.5).abs() <= 5000.5 * 1e-12);
}

#[test]
fn test_summary_on_empty_sketch() {
    let sketch = MomentSketch::with_defaults();
    assert!(matches!(sketch.summary(), Err(SketchError::EmptySketch)));
}

#[test]
fn test_non_finite_samples_rejected() {
    let mut sketch = MomentSketch::with_defaults();
    assert!(sketch.insert(f64::NAN).is_err());
    assert!(sketch.insert(f64::NEG_INFINITY).is_err());
    assert_eq!(sketch.count(), 0);
}

// ============================================================================
// Quantile estimation
// ============================================================================

#[test]
fn test_quantile_edge_cases() {
    let mut sketch = MomentSketch::with_defaults();
    assert!(matches!(
        sketch.quantile(0.5),
        Err(SketchError::EmptySketch)
    ));

    sketch.insert(1.0).unwrap();
    assert!(matches!(
        sketch.quantile(-0.1),
        Err(SketchError::InvalidParameter { .. })
    ));
    assert!(matches!(
        sketch.quantile(1.5),
        Err(SketchError::InvalidParameter { .. })
    ));
}

#[test]
fn test_degenerate_stream_returns_the_value() {
    let mut sketch = MomentSketch::with_defaults();
    for _ in 0..100 {
        sketch.insert(42.0).unwrap();
    }
    for q in [0.0, 0.5, 1.0] {
        assert_eq!(sketch.quantile(q).unwrap(), 42.0);
    }
}

#[test]
fn test_single_moment_falls_back_to_min() {
    let mut sketch = MomentSketch::new(1).unwrap();
    sketch.insert(3.0).unwrap();
    sketch.insert(7.0).unwrap();
    assert_eq!(sketch.quantile(0.9).unwrap(), 3.0);
}

#[test]
fn test_lognormal_quantile_accuracy() {
    let mut rng = StdRng::seed_from_u64(42);
    let lognormal = LogNormal::new(0.0, 1.0).unwrap();
    let mut values: Vec<f64> = (0..100_000).map(|_| lognormal.sample(&mut rng)).collect();

    let mut sketch = MomentSketch::with_defaults();
    for v in &values {
        sketch.insert(*v).unwrap();
    }
    assert!(sketch.uses_log_moments());
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());

    for q in [0.5, 0.9, 0.99] {
        let truth = empirical_quantile(&values, q);
        let estimate = sketch.quantile(q).unwrap();
        let relative_error = (estimate - truth).abs() / truth;
        assert!(
            relative_error <= 0.02,
            "q={}: estimate {} vs true {} (error {})",
            q,
            estimate,
            truth,
            relative_error
        );
    }
}

#[test]
fn test_mixed_sign_stream_uses_raw_moments() {
    let mut sketch = MomentSketch::with_defaults();
    for i in 0..=1000 {
        sketch.insert(i as f64 / 500.0 - 1.0).unwrap();
    }
    assert!(!sketch.uses_log_moments());

    // uniform on [-1, 1]: the median sits near zero
    let median = sketch.quantile(0.5).unwrap();
    assert!(median.abs() <= 0.05, "median {} not near zero", median);

    let p25 = sketch.quantile(0.25).unwrap();
    let p75 = sketch.quantile(0.75).unwrap();
    assert!((p25 + 0.5).abs() <= 0.1, "p25 {} not near -0.5", p25);
    assert!((p75 - 0.5).abs() <= 0.1, "p75 {} not near 0.5", p75);
}

#[test]
fn test_quantiles_monotone_and_in_range() {
    let mut rng = StdRng::seed_from_u64(9);
    let lognormal = LogNormal::new(1.0, 0.5).unwrap();
    let mut sketch = MomentSketch::with_defaults();
    for _ in 0..5000 {
        sketch.insert(lognormal.sample(&mut rng)).unwrap();
    }

    let summary = sketch.summary().unwrap();
    let mut previous = f64::NEG_INFINITY;
    for i in 0..=20 {
        let q = i as f64 / 20.0;
        let estimate = sketch.quantile(q).unwrap();
        assert!(estimate.is_finite());
        assert!(estimate >= summary.min && estimate <= summary.max);
        assert!(
            estimate >= previous,
            "quantiles not monotone at q={}: {} < {}",
            q,
            estimate,
            previous
        );
        previous = estimate;
    }
}

#[test]
fn test_tight_iteration_cap_still_returns_finite() {
    let config = SolverConfig {
        max_iterations: 1,
        ..SolverConfig::default()
    };
    let mut sketch = MomentSketch::with_solver_config(10, config).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let lognormal = LogNormal::new(0.0, 1.0).unwrap();
    for _ in 0..1000 {
        sketch.insert(lognormal.sample(&mut rng)).unwrap();
    }

    // the solver cannot converge in one step; the estimate is best-effort
    // but always finite and inside the observed range
    let estimate = sketch.quantile(0.9).unwrap();
    let summary = sketch.summary().unwrap();
    assert!(estimate.is_finite());
    assert!(estimate >= summary.min && estimate <= summary.max);
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn test_merge_equivalence() {
    let mut rng = StdRng::seed_from_u64(42);
    let lognormal = LogNormal::new(0.0, 1.0).unwrap();
    let values: Vec<f64> = (0..10_000).map(|_| lognormal.sample(&mut rng)).collect();

    let mut whole = MomentSketch::with_defaults();
    let mut part1 = MomentSketch::with_defaults();
    let mut part2 = MomentSketch::with_defaults();
    for (i, v) in values.iter().enumerate() {
        whole.insert(*v).unwrap();
        if i % 2 == 0 {
            part1.insert(*v).unwrap();
        } else {
            part2.insert(*v).unwrap();
        }
    }

    part1.merge(&part2).unwrap();
    assert_eq!(part1.count(), whole.count());

    let merged_summary = part1.summary().unwrap();
    let whole_summary = whole.summary().unwrap();
    assert_eq!(merged_summary.min, whole_summary.min);
    assert_eq!(merged_summary.max, whole_summary.max);
    assert!((merged_summary.mean - whole_summary.mean).abs() <= whole_summary.mean * 1e-9);

    for q in [0.5, 0.9, 0.99] {
        let merged_q = part1.quantile(q).unwrap();
        let whole_q = whole.quantile(q).unwrap();
        assert!(
            (merged_q - whole_q).abs() <= whole_q * 1e-4,
            "q={}: merged {} vs whole {}",
            q,
            merged_q,
            whole_q
        );
    }
}

#[test]
fn test_merge_requires_matching_moment_count() {
    let mut sketch1 = MomentSketch::new(10).unwrap();
    let sketch2 = MomentSketch::new(12).unwrap();
    assert!(matches!(
        sketch1.merge(&sketch2),
        Err(SketchError::InvalidParameter { .. })
    ));
}

#[test]
fn test_merge_propagates_log_fallback() {
    let mut positive = MomentSketch::with_defaults();
    positive.insert(1.0).unwrap();
    let mut mixed = MomentSketch::with_defaults();
    mixed.insert(-1.0).unwrap();

    positive.merge(&mixed).unwrap();
    assert!(!positive.uses_log_moments());
}

// ============================================================================
// Serialization and streaming trait
// ============================================================================

#[test]
fn test_serialize_roundtrip() {
    let mut rng = StdRng::seed_from_u64(11);
    let lognormal = LogNormal::new(0.0, 1.0).unwrap();
    let mut sketch = MomentSketch::with_defaults();
    for _ in 0..2000 {
        sketch.insert(lognormal.sample(&mut rng)).unwrap();
    }

    let restored = MomentSketch::deserialize(&sketch.serialize()).unwrap();
    assert_eq!(restored.count(), sketch.count());
    assert_eq!(restored.uses_log_moments(), sketch.uses_log_moments());
    assert_eq!(
        restored.summary().unwrap().mean,
        sketch.summary().unwrap().mean
    );
    assert_eq!(
        restored.quantile(0.9).unwrap(),
        sketch.quantile(0.9).unwrap()
    );
}

#[test]
fn test_deserialize_rejects_garbage() {
    assert!(MomentSketch::deserialize(&[]).is_err());
    assert!(MomentSketch::deserialize(&[2u8; 12]).is_err());
}

#[test]
fn test_update_drops_non_finite() {
    let mut sketch = MomentSketch::with_defaults();
    sketch.update(&1.0);
    sketch.update(&f64::NAN);
    assert_eq!(sketch.count(), 1);
    assert!(!sketch.is_empty());
}
