//! DDSketch: Quantile estimation with relative error guarantees (VLDB 2019)
//!
//! # Overview
//!
//! DDSketch provides quantile estimation with **relative error guarantees**:
//! the error is proportional to the value being estimated (e.g. 1% of the
//! value), which is what you want for metrics spanning orders of magnitude.
//!
//! The sketch is a composition of two independent, pluggable subsystems:
//!
//! - a [`mapping`](self::mapping) from values to integer bucket indices, and
//! - a counter [`storage`](self::storage) over those indices.
//!
//! Positive and negative samples keep separate stores; samples below the
//! mapping's numerical floor count as zeros.
//!
//! # Key Features
//!
//! - **Relative accuracy**: error <= alpha * value for every quantile
//! - **Fully mergeable**: shard-local sketches combine losslessly
//! - **Fast updates**: O(1) amortized insertion, best-effort deletion
//! - **Bounded memory**: fixed or logarithmically growing bucket caps
//!
//! # Example
//!
//! ```
//! use quantileflow::DDSketch;
//!
//! // 1% relative accuracy
//! let mut sketch = DDSketch::new(0.01).unwrap();
//!
//! for i in 1..=1000 {
//!     sketch.insert(i as f64).unwrap();
//! }
//!
//! let p99 = sketch.quantile(0.99).unwrap();
//! assert!((p99 - 990.0).abs() <= 990.0 * 0.01);
//! ```
//!
//! # References
//!
//! - "DDSketch: A Fast and Fully-Mergeable Quantile Sketch with
//!   Relative-Error Guarantees" (VLDB 2019)

pub mod mapping;
pub mod storage;

use crate::common::codec::ByteReader;
use crate::common::validation::{validate_payload_size, validate_quantile};
use crate::common::{Mergeable, Result, Sketch, SketchError};

pub use mapping::{
    CubicInterpolationMapping, LinearInterpolationMapping, LogarithmicMapping, Mapping, MappingKind,
};
pub use storage::{
    BucketStrategy, CollapseEnd, ContiguousStorage, SparseStorage, StorageKind, Store,
    DEFAULT_MAX_BUCKETS, DYNAMIC_INITIAL_CAP,
};

const SERIAL_TAG: u8 = 1;

/// Construction-time options for a [`DDSketch`]
///
/// The defaults mirror the common latency-monitoring setup: exact logarithmic
/// mapping, dense storage with a fixed cap of [`DEFAULT_MAX_BUCKETS`]
/// buckets, negatives accepted.
#[derive(Debug, Clone, Copy)]
pub struct DDSketchConfig {
    /// Value-to-index mapping strategy
    pub mapping_kind: MappingKind,
    /// Counter layout
    pub storage_kind: StorageKind,
    /// Bucket-management strategy
    pub bucket_strategy: BucketStrategy,
    /// Bucket cap: hard cap for FIXED, initial soft cap for DYNAMIC,
    /// ignored (with a warning) for UNLIMITED
    pub max_buckets: Option<u32>,
    /// Whether negative samples are accepted
    pub cont_neg: bool,
}

impl Default for DDSketchConfig {
    fn default() -> Self {
        Self {
            mapping_kind: MappingKind::Logarithmic,
            storage_kind: StorageKind::Dense,
            bucket_strategy: BucketStrategy::Fixed,
            max_buckets: None,
            cont_neg: true,
        }
    }
}

/// DDSketch for quantile estimation with relative error guarantees
///
/// A single instance is single-writer: callers must serialize mutators
/// externally. Quantile queries are read-only and may run concurrently with
/// each other on an unchanging sketch.
///
/// # Complexity
///
/// - **Insert**: O(1) amortized
/// - **Quantile query**: O(k) over k occupied buckets
/// - **Merge**: O(k) over the source's occupied buckets
/// - **Space**: bounded by the bucket strategy
#[derive(Debug, Clone)]
pub struct DDSketch {
    relative_accuracy: f64,
    mapping: Mapping,
    positive: Store,
    negative: Option<Store>,
    zero_count: u64,
    cont_neg: bool,
    min: f64,
    max: f64,
}

fn build_store(config: &DDSketchConfig, collapse: CollapseEnd) -> Result<Store> {
    match config.storage_kind {
        StorageKind::Dense => {
            if config.bucket_strategy != BucketStrategy::Fixed {
                return Err(SketchError::IncompatibleStorage {
                    reason: format!(
                        "dense storage supports only the FIXED bucket strategy, got {:?}",
                        config.bucket_strategy
                    ),
                });
            }
            let capacity = config.max_buckets.unwrap_or(DEFAULT_MAX_BUCKETS);
            Ok(Store::Contiguous(ContiguousStorage::new(capacity, collapse)?))
        }
        StorageKind::Sparse => Ok(Store::Sparse(SparseStorage::new(
            config.bucket_strategy,
            config.max_buckets,
            collapse,
        )?)),
    }
}

impl DDSketch {
    /// Creates a DDSketch with the default configuration
    ///
    /// # Arguments
    /// * `relative_accuracy` - Relative error bound (e.g. 0.01 for 1%)
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `relative_accuracy` is outside (0, 1)
    ///
    /// # Example
    ///
    /// ```
    /// use quantileflow::DDSketch;
    ///
    /// let sketch = DDSketch::new(0.01).unwrap();
    /// assert_eq!(sketch.count(), 0);
    /// ```
    pub fn new(relative_accuracy: f64) -> Result<Self> {
        Self::with_config(relative_accuracy, &DDSketchConfig::default())
    }

    /// Creates a DDSketch with explicit mapping, storage, and strategy choices
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if `relative_accuracy` is outside (0, 1)
    /// - `IncompatibleStorage` for dense storage with a non-FIXED strategy
    ///
    /// # Example
    ///
    /// ```
    /// use quantileflow::{BucketStrategy, DDSketch, DDSketchConfig, MappingKind, StorageKind};
    ///
    /// let config = DDSketchConfig {
    ///     mapping_kind: MappingKind::CubicInterpolation,
    ///     storage_kind: StorageKind::Sparse,
    ///     bucket_strategy: BucketStrategy::Unlimited,
    ///     max_buckets: None,
    ///     cont_neg: false,
    /// };
    /// let sketch = DDSketch::with_config(0.01, &config).unwrap();
    /// assert!(!sketch.accepts_negatives());
    /// ```
    pub fn with_config(relative_accuracy: f64, config: &DDSketchConfig) -> Result<Self> {
        let mapping = Mapping::new(config.mapping_kind, relative_accuracy)?;
        let positive = build_store(config, CollapseEnd::Low)?;
        let negative = if config.cont_neg {
            Some(build_store(config, CollapseEnd::High)?)
        } else {
            None
        };
        Ok(Self {
            relative_accuracy,
            mapping,
            positive,
            negative,
            zero_count: 0,
            cont_neg: config.cont_neg,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        })
    }

    /// Inserts one sample
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for NaN or infinite samples
    /// - `NegativeNotAllowed` for negative samples when the sketch was built
    ///   with `cont_neg = false`
    pub fn insert(&mut self, value: f64) -> Result<()> {
        self.insert_n(value, 1)
    }

    /// Inserts a sample `count` times
    ///
    /// Samples with magnitude below the mapping's numerical floor count as
    /// zeros. O(1) amortized.
    ///
    /// # Errors
    /// Same as [`DDSketch::insert`]
    pub fn insert_n(&mut self, value: f64, count: u64) -> Result<()> {
        self.check_sample(value)?;
        if count == 0 {
            return Ok(());
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let magnitude = value.abs();
        if magnitude < self.mapping.min_indexable() {
            self.zero_count += count;
        } else if value > 0.0 {
            let index = self.mapping.index(magnitude);
            self.positive.add_n(index, count);
        } else {
            let index = self.mapping.index(magnitude);
            if let Some(store) = self.negative.as_mut() {
                store.add_n(index, count);
            }
        }
        Ok(())
    }

    /// Deletes one sample, best-effort
    ///
    /// # Errors
    /// Same as [`DDSketch::insert`]
    pub fn delete(&mut self, value: f64) -> Result<()> {
        self.delete_n(value, 1)
    }

    /// Deletes a sample `count` times, best-effort
    ///
    /// A bucket that was collapsed no longer tracks its original values, so
    /// deletion is a hint rather than a strict inverse of insertion: deleting
    /// from an empty or absent bucket logs a warning and does nothing, and
    /// the total count never drops below what the sketch actually holds.
    ///
    /// # Errors
    /// Same as [`DDSketch::insert`]
    pub fn delete_n(&mut self, value: f64, count: u64) -> Result<()> {
        self.check_sample(value)?;
        if count == 0 {
            return Ok(());
        }
        let magnitude = value.abs();
        if magnitude < self.mapping.min_indexable() {
            if self.zero_count < count {
                log::warn!(
                    "delete of {} zero samples but only {} recorded; clamping",
                    count,
                    self.zero_count
                );
                self.zero_count = 0;
            } else {
                self.zero_count -= count;
            }
        } else if value > 0.0 {
            let index = self.mapping.index(magnitude);
            self.positive.remove_n(index, count);
        } else {
            let index = self.mapping.index(magnitude);
            if let Some(store) = self.negative.as_mut() {
                store.remove_n(index, count);
            }
        }
        Ok(())
    }

    fn check_sample(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(SketchError::InvalidParameter {
                param: "value".to_string(),
                value: value.to_string(),
                constraint: "must be a finite number".to_string(),
            });
        }
        if value < 0.0 && !self.cont_neg {
            return Err(SketchError::NegativeNotAllowed { value });
        }
        Ok(())
    }

    /// Returns the estimated value at quantile `q`
    ///
    /// The target rank is `ceil(q * count)` (rank 1 for `q = 0`); the scan
    /// walks the negative store downward, then the zero bucket, then the
    /// positive store upward, and reconstructs the value of the bucket where
    /// the rank crossing happens.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if `q` is outside [0, 1]
    /// - `EmptySketch` if no samples were inserted
    ///
    /// # Example
    ///
    /// ```
    /// use quantileflow::DDSketch;
    ///
    /// let mut sketch = DDSketch::new(0.01).unwrap();
    /// for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
    ///     sketch.insert(v).unwrap();
    /// }
    /// let median = sketch.quantile(0.5).unwrap();
    /// assert!((median - 3.0).abs() <= 3.0 * 0.02);
    /// ```
    pub fn quantile(&self, q: f64) -> Result<f64> {
        validate_quantile(q)?;
        let count = self.count();
        if count == 0 {
            return Err(SketchError::EmptySketch);
        }
        let rank = if q == 0.0 {
            1
        } else {
            (q * count as f64).ceil() as u64
        };

        let mut cumulative = 0u64;
        if let Some(store) = &self.negative {
            for (index, bucket_count) in store.iter_descending() {
                cumulative += bucket_count;
                if cumulative >= rank {
                    return Ok(-self.mapping.value(index));
                }
            }
        }
        cumulative += self.zero_count;
        if cumulative >= rank {
            return Ok(0.0);
        }
        for (index, bucket_count) in self.positive.iter_ascending() {
            cumulative += bucket_count;
            if cumulative >= rank {
                return Ok(self.mapping.value(index));
            }
        }
        // rank never exceeds count, so the scans above return; tracked max
        // covers any residual floating-point slack in the rank computation
        Ok(self.max)
    }

    /// Total number of samples held by the sketch
    ///
    /// Always equals `zero_count + sum(positive store) + sum(negative store)`.
    pub fn count(&self) -> u64 {
        self.zero_count
            + self.positive.total_count()
            + self.negative.as_ref().map_or(0, Store::total_count)
    }

    /// Number of samples recorded as zero (magnitude below the mapping floor)
    pub fn zero_count(&self) -> u64 {
        self.zero_count
    }

    /// Smallest sample seen, if any
    pub fn min(&self) -> Option<f64> {
        (self.count() > 0).then_some(self.min)
    }

    /// Largest sample seen, if any
    pub fn max(&self) -> Option<f64> {
        (self.count() > 0).then_some(self.max)
    }

    /// The relative accuracy the sketch was built with
    pub fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    /// The mapping strategy the sketch was built with
    pub fn mapping_kind(&self) -> MappingKind {
        self.mapping.kind()
    }

    /// Whether the sketch accepts negative samples
    pub fn accepts_negatives(&self) -> bool {
        self.cont_neg
    }

    /// The positive-value store (counts of samples above the zero floor)
    pub fn positive_store(&self) -> &Store {
        &self.positive
    }

    /// The negative-value store, present only when negatives are accepted
    pub fn negative_store(&self) -> Option<&Store> {
        self.negative.as_ref()
    }
}

impl Sketch for DDSketch {
    type Item = f64;

    fn update(&mut self, item: &Self::Item) {
        if self.insert(*item).is_err() {
            log::warn!("dropping sample {}: rejected by sketch configuration", item);
        }
    }

    fn estimate(&self) -> f64 {
        self.count() as f64
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn serialize(&self) -> Vec<u8> {
        fn write_store(bytes: &mut Vec<u8>, store: &Store) {
            bytes.push(match store.kind() {
                StorageKind::Dense => 0,
                StorageKind::Sparse => 1,
            });
            bytes.push(match store.strategy() {
                BucketStrategy::Fixed => 0,
                BucketStrategy::Dynamic => 1,
                BucketStrategy::Unlimited => 2,
            });
            let configured = store.configured_max_buckets().map_or(-1, i64::from);
            bytes.extend_from_slice(&configured.to_le_bytes());
            bytes.extend_from_slice(&(store.distinct_count() as u64).to_le_bytes());
            for (index, count) in store.iter_ascending() {
                bytes.extend_from_slice(&index.to_le_bytes());
                bytes.extend_from_slice(&count.to_le_bytes());
            }
        }

        let mut bytes = Vec::new();
        bytes.push(SERIAL_TAG);
        bytes.extend_from_slice(&self.relative_accuracy.to_le_bytes());
        bytes.push(match self.mapping.kind() {
            MappingKind::Logarithmic => 0,
            MappingKind::LinearInterpolation => 1,
            MappingKind::CubicInterpolation => 2,
        });
        bytes.push(u8::from(self.cont_neg));
        bytes.extend_from_slice(&self.zero_count.to_le_bytes());
        bytes.extend_from_slice(&self.min.to_le_bytes());
        bytes.extend_from_slice(&self.max.to_le_bytes());
        write_store(&mut bytes, &self.positive);
        if let Some(store) = &self.negative {
            write_store(&mut bytes, store);
        }
        bytes
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        fn read_store(reader: &mut ByteReader<'_>, collapse: CollapseEnd) -> Result<Store> {
            let kind = match reader.u8()? {
                0 => StorageKind::Dense,
                1 => StorageKind::Sparse,
                other => {
                    return Err(SketchError::DeserializationError(format!(
                        "unknown storage kind {}",
                        other
                    )))
                }
            };
            let strategy = match reader.u8()? {
                0 => BucketStrategy::Fixed,
                1 => BucketStrategy::Dynamic,
                2 => BucketStrategy::Unlimited,
                other => {
                    return Err(SketchError::DeserializationError(format!(
                        "unknown bucket strategy {}",
                        other
                    )))
                }
            };
            let configured = reader.i64()?;
            let max_buckets = if configured < 0 {
                None
            } else {
                Some(u32::try_from(configured).map_err(|_| {
                    SketchError::DeserializationError(format!(
                        "bucket cap {} out of range",
                        configured
                    ))
                })?)
            };
            let mut store = match kind {
                StorageKind::Dense => {
                    if strategy != BucketStrategy::Fixed {
                        return Err(SketchError::DeserializationError(
                            "dense storage with a non-FIXED strategy".to_string(),
                        ));
                    }
                    Store::Contiguous(ContiguousStorage::new(
                        max_buckets.unwrap_or(DEFAULT_MAX_BUCKETS),
                        collapse,
                    )?)
                }
                StorageKind::Sparse => {
                    Store::Sparse(SparseStorage::new(strategy, max_buckets, collapse)?)
                }
            };
            let buckets = reader.u64()?;
            for _ in 0..buckets {
                let index = reader.i64()?;
                let count = reader.u64()?;
                store.restore_bucket(index, count);
            }
            Ok(store)
        }

        validate_payload_size(bytes.len())?;
        let mut reader = ByteReader::new(bytes);
        if reader.u8()? != SERIAL_TAG {
            return Err(SketchError::DeserializationError(
                "not a serialized DDSketch".to_string(),
            ));
        }
        let relative_accuracy = reader.f64()?;
        let mapping_kind = match reader.u8()? {
            0 => MappingKind::Logarithmic,
            1 => MappingKind::LinearInterpolation,
            2 => MappingKind::CubicInterpolation,
            other => {
                return Err(SketchError::DeserializationError(format!(
                    "unknown mapping kind {}",
                    other
                )))
            }
        };
        let cont_neg = reader.u8()? != 0;
        let zero_count = reader.u64()?;
        let min = reader.f64()?;
        let max = reader.f64()?;
        let mapping = Mapping::new(mapping_kind, relative_accuracy)
            .map_err(|err| SketchError::DeserializationError(err.to_string()))?;
        let positive = read_store(&mut reader, CollapseEnd::Low)?;
        let negative = if cont_neg {
            Some(read_store(&mut reader, CollapseEnd::High)?)
        } else {
            None
        };
        if !reader.is_exhausted() {
            return Err(SketchError::DeserializationError(
                "trailing bytes after sketch payload".to_string(),
            ));
        }
        Ok(Self {
            relative_accuracy,
            mapping,
            positive,
            negative,
            zero_count,
            cont_neg,
            min,
            max,
        })
    }
}

impl Mergeable for DDSketch {
    /// Merges another DDSketch into this one
    ///
    /// The receiver's storage layout and bucket strategy govern the result;
    /// `other` is left unchanged and may continue to be used.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the sketches differ in relative
    /// accuracy, mapping kind, or negative-value support.
    fn merge(&mut self, other: &Self) -> Result<()> {
        if (self.relative_accuracy - other.relative_accuracy).abs() > 1e-10 {
            return Err(SketchError::InvalidParameter {
                param: "relative_accuracy".to_string(),
                value: other.relative_accuracy.to_string(),
                constraint: format!("must match receiver accuracy {}", self.relative_accuracy),
            });
        }
        if self.mapping.kind() != other.mapping.kind() {
            return Err(SketchError::InvalidParameter {
                param: "mapping_kind".to_string(),
                value: format!("{:?}", other.mapping.kind()),
                constraint: format!("must match receiver mapping {:?}", self.mapping.kind()),
            });
        }
        if self.cont_neg != other.cont_neg {
            return Err(SketchError::InvalidParameter {
                param: "cont_neg".to_string(),
                value: other.cont_neg.to_string(),
                constraint: format!("must match receiver setting {}", self.cont_neg),
            });
        }
        self.zero_count += other.zero_count;
        self.positive.merge(&other.positive);
        if let (Some(receiver), Some(source)) = (self.negative.as_mut(), other.negative.as_ref()) {
            receiver.merge(source);
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        Ok(())
    }
}
