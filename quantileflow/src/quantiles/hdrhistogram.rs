//! HDRHistogram: bounded-range histogram with logarithmically spaced buckets
//!
//! When the value range is known a priori, a fixed array of log-spaced
//! buckets beats the adaptive sketches on simplicity and insert cost: one
//! `ln`, one array increment. Values outside `[min_value, max_value]` clamp
//! to the edge buckets, so nothing is ever rejected.
//!
//! # Example
//!
//! ```
//! use quantileflow::HDRHistogram;
//!
//! // 100 buckets covering 1 .. 10^7 (e.g. microsecond latencies)
//! let mut histogram = HDRHistogram::new(100, 1.0, 1e7).unwrap();
//! for v in [12.0, 340.0, 7800.0, 125000.0] {
//!     histogram.insert(v).unwrap();
//! }
//! assert_eq!(histogram.total_count(), 4);
//! let p50 = histogram.quantile(0.5).unwrap();
//! assert!(p50 > 100.0 && p50 < 1000.0);
//! ```

use crate::common::codec::ByteReader;
use crate::common::validation::{validate_bucket_count, validate_payload_size, validate_quantile};
use crate::common::{Mergeable, Result, Sketch, SketchError};

const SERIAL_TAG: u8 = 3;

/// Bounded-range, bounded-count histogram
///
/// Bucket `b` covers values `v` with
/// `floor(N * (ln v - ln min) / (ln max - ln min)) == b`, and quantile
/// queries report the geometric bucket midpoint
/// `min * (max / min)^((b + 0.5) / N)`. Single-writer; queries read-only.
#[derive(Debug, Clone)]
pub struct HDRHistogram {
    min_value: f64,
    max_value: f64,
    log_min: f64,
    log_span: f64,
    counts: Vec<u64>,
    total: u64,
}

impl HDRHistogram {
    /// Creates a histogram of `num_buckets` buckets over `[min_value, max_value]`
    ///
    /// # Errors
    /// Returns `InvalidParameter` unless `num_buckets >= 1` and
    /// `0 < min_value < max_value`
    pub fn new(num_buckets: usize, min_value: f64, max_value: f64) -> Result<Self> {
        validate_bucket_count(num_buckets as u64, "num_buckets")?;
        if !(min_value.is_finite() && min_value > 0.0) {
            return Err(SketchError::InvalidParameter {
                param: "min_value".to_string(),
                value: min_value.to_string(),
                constraint: "must be a finite positive number".to_string(),
            });
        }
        if !(max_value.is_finite() && max_value > min_value) {
            return Err(SketchError::InvalidParameter {
                param: "max_value".to_string(),
                value: max_value.to_string(),
                constraint: format!("must be finite and greater than min_value {}", min_value),
            });
        }
        let log_min = min_value.ln();
        Ok(Self {
            min_value,
            max_value,
            log_min,
            log_span: max_value.ln() - log_min,
            counts: vec![0; num_buckets],
            total: 0,
        })
    }

    #[inline]
    fn bucket_for(&self, value: f64) -> usize {
        let clamped = value.clamp(self.min_value, self.max_value);
        let position = (clamped.ln() - self.log_min) / self.log_span;
        let bucket = (self.counts.len() as f64 * position).floor() as i64;
        bucket.clamp(0, self.counts.len() as i64 - 1) as usize
    }

    /// Inserts one sample, clamping it into the configured range
    ///
    /// # Errors
    /// Returns `InvalidParameter` for NaN or infinite samples
    pub fn insert(&mut self, value: f64) -> Result<()> {
        self.insert_n(value, 1)
    }

    /// Inserts a sample `count` times
    ///
    /// # Errors
    /// Returns `InvalidParameter` for NaN or infinite samples
    pub fn insert_n(&mut self, value: f64, count: u64) -> Result<()> {
        if !value.is_finite() {
            return Err(SketchError::InvalidParameter {
                param: "value".to_string(),
                value: value.to_string(),
                constraint: "must be a finite number".to_string(),
            });
        }
        if count == 0 {
            return Ok(());
        }
        let bucket = self.bucket_for(value);
        self.counts[bucket] += count;
        self.total += count;
        Ok(())
    }

    /// Returns the estimated value at quantile `q`
    ///
    /// The target rank is `ceil(q * total_count)` (rank 1 for `q = 0`); the
    /// cumulative scan runs left to right and reports the geometric midpoint
    /// of the bucket where the crossing happens.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if `q` is outside [0, 1]
    /// - `EmptySketch` if no samples were inserted
    pub fn quantile(&self, q: f64) -> Result<f64> {
        validate_quantile(q)?;
        if self.total == 0 {
            return Err(SketchError::EmptySketch);
        }
        let rank = if q == 0.0 {
            1
        } else {
            (q * self.total as f64).ceil() as u64
        };
        let mut cumulative = 0u64;
        for (bucket, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if count > 0 && cumulative >= rank {
                return Ok(self.bucket_midpoint(bucket));
            }
        }
        Ok(self.bucket_midpoint(self.counts.len() - 1))
    }

    /// Geometric midpoint of bucket `b`: `min * (max / min)^((b + 0.5) / N)`
    pub fn bucket_midpoint(&self, bucket: usize) -> f64 {
        let fraction = (bucket as f64 + 0.5) / self.counts.len() as f64;
        (self.log_min + fraction * self.log_span).exp()
    }

    /// Total number of samples held by the histogram
    pub fn total_count(&self) -> u64 {
        self.total
    }

    /// Number of buckets
    pub fn num_buckets(&self) -> usize {
        self.counts.len()
    }

    /// Lower edge of the configured range
    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    /// Upper edge of the configured range
    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Per-bucket counts, left to right
    pub fn bucket_counts(&self) -> &[u64] {
        &self.counts
    }
}

impl Sketch for HDRHistogram {
    type Item = f64;

    fn update(&mut self, item: &Self::Item) {
        if self.insert(*item).is_err() {
            log::warn!("dropping non-finite sample from histogram");
        }
    }

    fn estimate(&self) -> f64 {
        self.total as f64
    }

    fn is_empty(&self) -> bool {
        self.total == 0
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(SERIAL_TAG);
        bytes.extend_from_slice(&self.min_value.to_le_bytes());
        bytes.extend_from_slice(&self.max_value.to_le_bytes());
        bytes.extend_from_slice(&(self.counts.len() as u64).to_le_bytes());
        for count in &self.counts {
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        bytes
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        validate_payload_size(bytes.len())?;
        let mut reader = ByteReader::new(bytes);
        if reader.u8()? != SERIAL_TAG {
            return Err(SketchError::DeserializationError(
                "not a serialized HDRHistogram".to_string(),
            ));
        }
        let min_value = reader.f64()?;
        let max_value = reader.f64()?;
        let num_buckets = reader.u64()? as usize;
        let mut histogram = Self::new(num_buckets, min_value, max_value)
            .map_err(|err| SketchError::DeserializationError(err.to_string()))?;
        let mut total = 0u64;
        for count in &mut histogram.counts {
            *count = reader.u64()?;
            total += *count;
        }
        if !reader.is_exhausted() {
            return Err(SketchError::DeserializationError(
                "trailing bytes after sketch payload".to_string(),
            ));
        }
        histogram.total = total;
        Ok(histogram)
    }
}

impl Mergeable for HDRHistogram {
    /// Merges another HDRHistogram into this one by elementwise addition
    ///
    /// # Errors
    /// Returns `InvalidParameter` unless both histograms share the same
    /// range and bucket count
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.counts.len() != other.counts.len()
            || self.min_value != other.min_value
            || self.max_value != other.max_value
        {
            return Err(SketchError::InvalidParameter {
                param: "histogram configuration".to_string(),
                value: format!(
                    "({}, {}, {})",
                    other.counts.len(),
                    other.min_value,
                    other.max_value
                ),
                constraint: format!(
                    "must match receiver ({}, {}, {})",
                    self.counts.len(),
                    self.min_value,
                    self.max_value
                ),
            });
        }
        for (dst, src) in self.counts.iter_mut().zip(&other.counts) {
            *dst += src;
        }
        self.total += other.total;
        Ok(())
    }
}
