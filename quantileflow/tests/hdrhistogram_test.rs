//! Tests for HDRHistogram
//!
//! Tests verify:
//! - Construction validation and boundary clamping
//! - Count conservation and monotone quantiles
//! - The rank/midpoint quantile semantics
//! - Merge equivalence and parameter checks

use quantileflow::{HDRHistogram, Mergeable, Sketch, SketchError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_construction_validation() {
    assert!(HDRHistogram::new(100, 1.0, 1e7).is_ok());
    assert!(HDRHistogram::new(0, 1.0, 1e7).is_err());
    assert!(HDRHistogram::new(100, 0.0, 1e7).is_err());
    assert!(HDRHistogram::new(100, -1.0, 1e7).is_err());
    assert!(HDRHistogram::new(100, 10.0, 10.0).is_err());
    assert!(HDRHistogram::new(100, 10.0, 5.0).is_err());
    assert!(HDRHistogram::new(100, 1.0, f64::INFINITY).is_err());
}

#[test]
fn test_accessors() {
    let histogram = HDRHistogram::new(64, 0.5, 1000.0).unwrap();
    assert_eq!(histogram.num_buckets(), 64);
    assert_eq!(histogram.min_value(), 0.5);
    assert_eq!(histogram.max_value(), 1000.0);
    assert_eq!(histogram.total_count(), 0);
    assert!(histogram.is_empty());
}

// ============================================================================
// Insert and clamping
// ============================================================================

#[test]
fn test_decade_stream() {
    let mut histogram = HDRHistogram::new(100, 1.0, 1e7).unwrap();
    for v in [1.0, 10.0, 100.0, 1e3, 1e4, 1e5, 1e6, 1e7] {
        histogram.insert(v).unwrap();
    }
    assert_eq!(histogram.total_count(), 8);

    // rank ceil(0.5 * 8) = 4 selects the sample 1e3; the reported value is
    // the geometric midpoint of 1e3's bucket
    let median = histogram.quantile(0.5).unwrap();
    let bucket_of_thousand = 42;
    assert_eq!(
        median,
        histogram.bucket_midpoint(bucket_of_thousand),
        "median {} is not the midpoint of 1e3's bucket",
        median
    );

    // within one bucket width of the selected sample
    let bucket_ratio = 1e7f64.powf(1.0 / 100.0);
    assert!(median >= 1e3 / bucket_ratio && median <= 1e3 * bucket_ratio);
}

#[test]
fn test_boundary_clamping() {
    let mut histogram = HDRHistogram::new(50, 1.0, 1000.0).unwrap();
    histogram.insert(0.001).unwrap();
    histogram.insert(1e9).unwrap();
    assert_eq!(histogram.total_count(), 2);
    assert_eq!(histogram.bucket_counts()[0], 1);
    assert_eq!(histogram.bucket_counts()[49], 1);

    // clamped samples answer from the edge buckets
    assert_eq!(
        histogram.quantile(0.0).unwrap(),
        histogram.bucket_midpoint(0)
    );
    assert_eq!(
        histogram.quantile(1.0).unwrap(),
        histogram.bucket_midpoint(49)
    );
}

#[test]
fn test_non_finite_samples_rejected() {
    let mut histogram = HDRHistogram::new(10, 1.0, 100.0).unwrap();
    assert!(histogram.insert(f64::NAN).is_err());
    assert!(histogram.insert(f64::INFINITY).is_err());
    assert_eq!(histogram.total_count(), 0);
}

#[test]
fn test_count_conservation() {
    let mut histogram = HDRHistogram::new(100, 1.0, 1e6).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..10_000 {
        histogram.insert(rng.random::<f64>() * 2e6).unwrap();
    }
    assert_eq!(histogram.total_count(), 10_000);
    let bucket_sum: u64 = histogram.bucket_counts().iter().sum();
    assert_eq!(bucket_sum, 10_000);
}

// ============================================================================
// Quantiles
// ============================================================================

#[test]
fn test_quantile_edge_cases() {
    let mut histogram = HDRHistogram::new(10, 1.0, 100.0).unwrap();
    assert!(matches!(
        histogram.quantile(0.5),
        Err(SketchError::EmptySketch)
    ));

    histogram.insert(10.0).unwrap();
    assert!(matches!(
        histogram.quantile(-0.1),
        Err(SketchError::InvalidParameter { .. })
    ));
    assert!(matches!(
        histogram.quantile(2.0),
        Err(SketchError::InvalidParameter { .. })
    ));
}

#[test]
fn test_quantiles_monotone() {
    let mut histogram = HDRHistogram::new(100, 1.0, 1e6).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..5000 {
        let v = (rng.random::<f64>() * 6.0).exp2() * 10.0;
        histogram.insert(v).unwrap();
    }

    let mut previous = 0.0;
    for i in 0..=20 {
        let q = i as f64 / 20.0;
        let estimate = histogram.quantile(q).unwrap();
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
fn test_quantile_matches_rank_bucket() {
    let mut histogram = HDRHistogram::new(100, 1.0, 1e6).unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    let mut values: Vec<f64> = (0..2000)
        .map(|_| (rng.random::<f64>() * 12.0).exp2())
        .collect();
    for v in &values {
        histogram.insert(*v).unwrap();
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());

    // the reported midpoint sits within half a bucket of the rank sample
    let half_bucket = 1e6f64.powf(0.5 / 100.0);
    for q in [0.1, 0.5, 0.9, 0.99] {
        let rank = ((q * values.len() as f64).ceil() as usize).max(1);
        let truth = values[rank - 1];
        let estimate = histogram.quantile(q).unwrap();
        assert!(
            estimate >= truth / half_bucket && estimate <= truth * half_bucket,
            "q={}: estimate {} not within half a bucket of {}",
            q,
            estimate,
            truth
        );
    }
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn test_merge_equivalence() {
    let mut whole = HDRHistogram::new(100, 1.0, 1e6).unwrap();
    let mut part1 = HDRHistogram::new(100, 1.0, 1e6).unwrap();
    let mut part2 = HDRHistogram::new(100, 1.0, 1e6).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..5000 {
        let v = rng.random::<f64>() * 1e6;
        whole.insert(v).unwrap();
        if i % 2 == 0 {
            part1.insert(v).unwrap();
        } else {
            part2.insert(v).unwrap();
        }
    }

    part1.merge(&part2).unwrap();
    assert_eq!(part1.total_count(), whole.total_count());
    assert_eq!(part1.bucket_counts(), whole.bucket_counts());
    for q in [0.0, 0.25, 0.5, 0.75, 1.0] {
        assert_eq!(part1.quantile(q).unwrap(), whole.quantile(q).unwrap());
    }
}

#[test]
fn test_merge_requires_identical_configuration() {
    let mut base = HDRHistogram::new(100, 1.0, 1e6).unwrap();
    for (buckets, lo, hi) in [(50, 1.0, 1e6), (100, 2.0, 1e6), (100, 1.0, 1e7)] {
        let other = HDRHistogram::new(buckets, lo, hi).unwrap();
        assert!(
            matches!(
                base.merge(&other),
                Err(SketchError::InvalidParameter { .. })
            ),
            "merge with ({}, {}, {}) must fail",
            buckets,
            lo,
            hi
        );
    }
}

#[test]
fn test_merge_leaves_source_usable() {
    let mut receiver = HDRHistogram::new(10, 1.0, 100.0).unwrap();
    let mut source = HDRHistogram::new(10, 1.0, 100.0).unwrap();
    source.insert(10.0).unwrap();
    receiver.merge(&source).unwrap();
    source.insert(20.0).unwrap();
    assert_eq!(source.total_count(), 2);
    assert_eq!(receiver.total_count(), 1);
}

// ============================================================================
// Serialization and streaming trait
// ============================================================================

#[test]
fn test_serialize_roundtrip() {
    let mut histogram = HDRHistogram::new(100, 1.0, 1e7).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..1000 {
        histogram.insert((rng.random::<f64>() * 20.0).exp2()).unwrap();
    }

    let restored = HDRHistogram::deserialize(&histogram.serialize()).unwrap();
    assert_eq!(restored.total_count(), histogram.total_count());
    assert_eq!(restored.bucket_counts(), histogram.bucket_counts());
    assert_eq!(
        restored.quantile(0.9).unwrap(),
        histogram.quantile(0.9).unwrap()
    );
}

#[test]
fn test_deserialize_rejects_garbage() {
    assert!(HDRHistogram::deserialize(&[]).is_err());
    assert!(HDRHistogram::deserialize(&[3u8; 16]).is_err());
}

#[test]
fn test_update_clamps_instead_of_dropping() {
    let mut histogram = HDRHistogram::new(10, 1.0, 100.0).unwrap();
    histogram.update(&0.5);
    histogram.update(&500.0);
    histogram.update(&f64::NAN);
    assert_eq!(histogram.total_count(), 2);
    assert_eq!(histogram.estimate(), 2.0);
}
