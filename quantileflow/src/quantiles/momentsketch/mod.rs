//! MomentSketch: quantiles from power sums via maximum entropy
//!
//! # Overview
//!
//! Instead of bucketing samples, a MomentSketch accumulates the first `k`
//! power sums of the stream (and of its logarithm, while every sample stays
//! strictly positive). That makes the sketch tiny — a handful of floats —
//! and merging exact: accumulators simply add. Quantile queries reconstruct
//! a maximum-entropy density consistent with the stored moments and invert
//! its CDF; see [`solver`](self::solver) for the numerics.
//!
//! Log moments are the workhorse for latency-style data: heavy-tailed
//! streams become near-Gaussian in log space, where a ten-moment fit is
//! accurate to a percent or two. A single non-positive sample permanently
//! falls back to raw moments.
//!
//! # Example
//!
//! ```
//! use quantileflow::MomentSketch;
//!
//! let mut sketch = MomentSketch::with_defaults();
//! for i in 1..=100 {
//!     sketch.insert(i as f64).unwrap();
//! }
//!
//! let summary = sketch.summary().unwrap();
//! assert_eq!(summary.count, 100);
//! assert!((summary.mean - 50.5).abs() < 1e-9);
//!
//! let median = sketch.quantile(0.5).unwrap();
//! assert!(median > 30.0 && median < 70.0);
//! ```
//!
//! # References
//!
//! - "Moment-Based Quantile Sketches for Efficient High Cardinality
//!   Aggregation Queries" (VLDB 2018)

mod solver;

use crate::common::codec::ByteReader;
use crate::common::validation::{validate_payload_size, validate_quantile};
use crate::common::{Mergeable, Result, Sketch, SketchError};

const SERIAL_TAG: u8 = 2;

/// Default number of power moments retained
pub const DEFAULT_NUM_MOMENTS: usize = 10;

/// Most moments the solver stays numerically useful for
pub const MAX_NUM_MOMENTS: usize = 32;

/// Tunables for the maximum-entropy solver
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    /// Stop when the max absolute moment residual drops below this
    pub tolerance: f64,
    /// Hard cap on Newton iterations
    pub max_iterations: usize,
    /// Number of quadrature cells used to integrate the density
    pub grid_size: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 200,
            grid_size: 1024,
        }
    }
}

/// Aggregate statistics reported by [`MomentSketch::summary`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentSummary {
    /// Number of samples observed
    pub count: u64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Arithmetic mean, exact up to floating point
    pub mean: f64,
}

/// Moment-based quantile sketch
///
/// Stores `min`, `max`, and the power sums `sum(x^j)` and `sum(ln(x)^j)` for
/// `j = 0..k`. Single-writer like every sketch in this crate; queries are
/// read-only.
#[derive(Debug, Clone)]
pub struct MomentSketch {
    num_moments: usize,
    min: f64,
    max: f64,
    power_sums: Vec<f64>,
    log_sums: Vec<f64>,
    log_moments_usable: bool,
    solver_config: SolverConfig,
}

impl MomentSketch {
    /// Creates a sketch retaining `num_moments` power moments
    ///
    /// # Errors
    /// Returns `InvalidParameter` unless `1 <= num_moments <= 32`
    pub fn new(num_moments: usize) -> Result<Self> {
        Self::with_solver_config(num_moments, SolverConfig::default())
    }

    /// Creates a sketch with the default ten moments
    pub fn with_defaults() -> Self {
        Self {
            num_moments: DEFAULT_NUM_MOMENTS,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            power_sums: vec![0.0; DEFAULT_NUM_MOMENTS],
            log_sums: vec![0.0; DEFAULT_NUM_MOMENTS],
            log_moments_usable: true,
            solver_config: SolverConfig::default(),
        }
    }

    /// Creates a sketch with explicit solver tunables
    ///
    /// # Errors
    /// Returns `InvalidParameter` unless `1 <= num_moments <= 32`
    pub fn with_solver_config(num_moments: usize, solver_config: SolverConfig) -> Result<Self> {
        if num_moments == 0 || num_moments > MAX_NUM_MOMENTS {
            return Err(SketchError::InvalidParameter {
                param: "num_moments".to_string(),
                value: num_moments.to_string(),
                constraint: format!("must be in range [1, {}]", MAX_NUM_MOMENTS),
            });
        }
        Ok(Self {
            num_moments,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            power_sums: vec![0.0; num_moments],
            log_sums: vec![0.0; num_moments],
            log_moments_usable: true,
            solver_config,
        })
    }

    /// Inserts one sample
    ///
    /// O(k). A non-positive sample permanently disables the log-moment path.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for NaN or infinite samples
    pub fn insert(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(SketchError::InvalidParameter {
                param: "value".to_string(),
                value: value.to_string(),
                constraint: "must be a finite number".to_string(),
            });
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let mut term = 1.0;
        for sum in &mut self.power_sums {
            *sum += term;
            term *= value;
        }
        if value > 0.0 {
            if self.log_moments_usable {
                let log_value = value.ln();
                let mut term = 1.0;
                for sum in &mut self.log_sums {
                    *sum += term;
                    term *= log_value;
                }
            }
        } else {
            self.log_moments_usable = false;
        }
        Ok(())
    }

    /// Number of samples observed
    pub fn count(&self) -> u64 {
        self.power_sums[0] as u64
    }

    /// Number of power moments retained
    pub fn num_moments(&self) -> usize {
        self.num_moments
    }

    /// Whether quantile queries will work in log space
    pub fn uses_log_moments(&self) -> bool {
        self.log_moments_usable
    }

    /// Count, min, max, and exact mean of the stream
    ///
    /// # Errors
    /// Returns `EmptySketch` when no samples were inserted
    pub fn summary(&self) -> Result<MomentSummary> {
        let n = self.power_sums[0];
        if n == 0.0 {
            return Err(SketchError::EmptySketch);
        }
        let mean = if self.num_moments > 1 {
            self.power_sums[1] / n
        } else {
            self.min
        };
        Ok(MomentSummary {
            count: n as u64,
            min: self.min,
            max: self.max,
            mean,
        })
    }

    /// Returns the estimated value at quantile `q`
    ///
    /// Reconstructs the maximum-entropy density for the stored moments and
    /// inverts its CDF. Solver non-convergence is never an error: the best
    /// available estimate is returned (with a warning) and the result is
    /// always finite, clamped into `[min, max]`.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if `q` is outside [0, 1]
    /// - `EmptySketch` if no samples were inserted
    pub fn quantile(&self, q: f64) -> Result<f64> {
        validate_quantile(q)?;
        let n = self.power_sums[0];
        if n == 0.0 {
            return Err(SketchError::EmptySketch);
        }
        if self.num_moments == 1 || self.min == self.max {
            return Ok(self.min);
        }

        let log_space = self.log_moments_usable;
        let (a, b, sums) = if log_space {
            (self.min.ln(), self.max.ln(), &self.log_sums)
        } else {
            (self.min, self.max, &self.power_sums)
        };
        let raw: Vec<f64> = sums.iter().map(|s| s / n).collect();
        let scaled = solver::rescale_power_moments(&raw, a, b);
        let targets = solver::chebyshev_moments(&scaled);
        let density = solver::solve_max_entropy(&targets, &self.solver_config);
        if !density.converged {
            log::warn!(
                "maximum-entropy solver stopped after {} iterations with residual {:.3e}; quantile is best-effort",
                density.iterations,
                density.residual
            );
        }
        let x = density.quantile(q);
        let position = 0.5 * (x + 1.0) * (b - a) + a;
        let value = if log_space { position.exp() } else { position };
        Ok(value.clamp(self.min, self.max))
    }

    /// The solver tunables in effect
    pub fn solver_config(&self) -> SolverConfig {
        self.solver_config
    }
}

impl Default for MomentSketch {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Sketch for MomentSketch {
    type Item = f64;

    fn update(&mut self, item: &Self::Item) {
        if self.insert(*item).is_err() {
            log::warn!("dropping non-finite sample from moment sketch");
        }
    }

    fn estimate(&self) -> f64 {
        self.power_sums[0]
    }

    fn is_empty(&self) -> bool {
        self.power_sums[0] == 0.0
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(SERIAL_TAG);
        bytes.extend_from_slice(&(self.num_moments as u64).to_le_bytes());
        bytes.push(u8::from(self.log_moments_usable));
        bytes.extend_from_slice(&self.min.to_le_bytes());
        bytes.extend_from_slice(&self.max.to_le_bytes());
        for sum in &self.power_sums {
            bytes.extend_from_slice(&sum.to_le_bytes());
        }
        for sum in &self.log_sums {
            bytes.extend_from_slice(&sum.to_le_bytes());
        }
        bytes
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        validate_payload_size(bytes.len())?;
        let mut reader = ByteReader::new(bytes);
        if reader.u8()? != SERIAL_TAG {
            return Err(SketchError::DeserializationError(
                "not a serialized MomentSketch".to_string(),
            ));
        }
        let num_moments = reader.u64()? as usize;
        if num_moments == 0 || num_moments > MAX_NUM_MOMENTS {
            return Err(SketchError::DeserializationError(format!(
                "moment count {} out of range",
                num_moments
            )));
        }
        let log_moments_usable = reader.u8()? != 0;
        let min = reader.f64()?;
        let max = reader.f64()?;
        let mut power_sums = vec![0.0; num_moments];
        for sum in &mut power_sums {
            *sum = reader.f64()?;
        }
        let mut log_sums = vec![0.0; num_moments];
        for sum in &mut log_sums {
            *sum = reader.f64()?;
        }
        if !reader.is_exhausted() {
            return Err(SketchError::DeserializationError(
                "trailing bytes after sketch payload".to_string(),
            ));
        }
        Ok(Self {
            num_moments,
            min,
            max,
            power_sums,
            log_sums,
            log_moments_usable,
            solver_config: SolverConfig::default(),
        })
    }
}

impl Mergeable for MomentSketch {
    /// Merges another MomentSketch into this one
    ///
    /// Accumulators add elementwise, so merging is exact: the result is
    /// indistinguishable from a sketch that saw both streams.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the moment counts differ
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.num_moments != other.num_moments {
            return Err(SketchError::InvalidParameter {
                param: "num_moments".to_string(),
                value: other.num_moments.to_string(),
                constraint: format!("must match receiver moment count {}", self.num_moments),
            });
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        for (dst, src) in self.power_sums.iter_mut().zip(&other.power_sums) {
            *dst += src;
        }
        for (dst, src) in self.log_sums.iter_mut().zip(&other.log_sums) {
            *dst += src;
        }
        self.log_moments_usable = self.log_moments_usable && other.log_moments_usable;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_is_exact() {
        let mut sketch = MomentSketch::with_defaults();
        for i in 1..=1000 {
            sketch.insert(i as f64).unwrap();
        }
        let summary = sketch.summary().unwrap();
        assert_eq!(summary.count, 1000);
        assert!((summary.mean - 500.5).abs() < 1e-9);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 1000.0);
    }

    #[test]
    fn test_negative_sample_disables_log_path() {
        let mut sketch = MomentSketch::with_defaults();
        sketch.insert(1.0).unwrap();
        assert!(sketch.uses_log_moments());
        sketch.insert(-1.0).unwrap();
        assert!(!sketch.uses_log_moments());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut sketch = MomentSketch::new(6).unwrap();
        for i in 1..=50 {
            sketch.insert(i as f64 * 0.5).unwrap();
        }
        let restored = MomentSketch::deserialize(&sketch.serialize()).unwrap();
        assert_eq!(restored.count(), sketch.count());
        assert_eq!(
            restored.summary().unwrap().mean,
            sketch.summary().unwrap().mean
        );
    }
}
