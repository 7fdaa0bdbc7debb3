//! QuantileFlow: mergeable streaming quantile sketches for anomaly detection
//!
//! This library ingests unbounded streams of real-valued samples (latencies,
//! request sizes, metric readings) and answers approximate quantile queries
//! with bounded error and bounded memory. Sketches built on different shards
//! merge losslessly, so stream-wide percentiles come from combining
//! per-worker state.
//!
//! Three sketch families are provided, each with a different accuracy /
//! footprint trade-off:
//!
//! - [`DDSketch`] - relative-error guarantees via log-spaced buckets
//! - [`MomentSketch`] - tiny moment-based state with maximum-entropy queries
//! - [`HDRHistogram`] - fixed buckets over an a-priori known range
//!
//! Every sketch is single-writer: concurrent mutation of one instance is the
//! caller's responsibility to serialize. Queries are read-only and safe to
//! run concurrently on an unchanging sketch. The library performs no I/O and
//! keeps no global state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod common;
pub mod quantiles;

// Re-export core types for convenience
pub use common::{Mergeable, Result, Sketch, SketchError};

/// Error types and result aliases for sketch operations
pub mod error {
    pub use crate::common::{Result, SketchError};
}

// Re-export the sketches and their configuration types
pub use quantiles::{
    BucketStrategy, DDSketch, DDSketchConfig, HDRHistogram, MappingKind, MomentSketch,
    MomentSummary, SolverConfig, StorageKind,
};
