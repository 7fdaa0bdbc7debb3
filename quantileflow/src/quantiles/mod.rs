//! Streaming quantile estimation algorithms
//!
//! Three mergeable sketch families share one operational contract — insert,
//! optional delete, quantile query, and merge of compatible sketches:
//!
//! - [`DDSketch`] - relative error guarantees on every quantile (VLDB 2019)
//! - [`MomentSketch`] - power sums + maximum-entropy reconstruction (VLDB 2018)
//! - [`HDRHistogram`] - fixed log-spaced buckets over a known range
//!
//! # Choosing an Algorithm
//!
//! ## DDSketch
//!
//! **Use when:**
//! - You need a guaranteed relative error bound (error proportional to value)
//! - Your data spans multiple orders of magnitude and its range is unknown
//! - You're tracking latencies, request sizes, or financial metrics
//!
//! **Characteristics:**
//! - Error <= alpha * value for every quantile
//! - Pluggable mapping (exact or interpolated log) and storage (dense or
//!   sparse) with bounded bucket growth
//! - Supports deletion, best-effort
//!
//! ## MomentSketch
//!
//! **Use when:**
//! - Sketch size and merge bandwidth matter more than hard error bounds
//! - Streams are positive and heavy-tailed (log moments shine there)
//!
//! **Characteristics:**
//! - A dozen floats of state, exact merges, exact mean
//! - Quantiles come from a maximum-entropy fit; accurate to ~1-2% on
//!   log-normal-like data, no worst-case guarantee
//!
//! ## HDRHistogram
//!
//! **Use when:**
//! - The value range is known up front (e.g. 1us .. 10s latencies)
//! - Insert cost must be minimal and allocation-free
//!
//! **Characteristics:**
//! - Fixed memory, clamped range, O(1) insert
//! - Resolution set by the bucket count
//!
//! # Example
//!
//! ```
//! use quantileflow::{DDSketch, Mergeable};
//!
//! let mut shard_a = DDSketch::new(0.01).unwrap();
//! let mut shard_b = DDSketch::new(0.01).unwrap();
//!
//! for i in 1..=500 {
//!     shard_a.insert(i as f64).unwrap();
//!     shard_b.insert((i + 500) as f64).unwrap();
//! }
//!
//! shard_a.merge(&shard_b).unwrap();
//! assert_eq!(shard_a.count(), 1000);
//! ```

pub mod ddsketch;
pub mod hdrhistogram;
pub mod momentsketch;

pub use ddsketch::{
    BucketStrategy, DDSketch, DDSketchConfig, MappingKind, StorageKind,
};
pub use hdrhistogram::HDRHistogram;
pub use momentsketch::{MomentSketch, MomentSummary, SolverConfig};
