//! Bucket counter stores for DDSketch
//!
//! A store maps integer bucket indices to sample counts. Two layouts exist:
//!
//! - [`ContiguousStorage`] — a dense window of counters over a contiguous
//!   index range. Fixed capacity only; indexing past the window collapses
//!   buckets at the configured extreme end.
//! - [`SparseStorage`] — an ordered map from index to count, supporting all
//!   three bucket-management strategies.
//!
//! Collapse folds the overflowing extreme buckets into their nearest
//! surviving neighbor, preserving the total count; accuracy degrades only at
//! that tail. The positive store of a sketch collapses its low end, the
//! negative store its high end, so the usually-queried quantiles keep full
//! resolution.

use std::collections::{BTreeMap, VecDeque};

use crate::common::validation::validate_bucket_count;
use crate::common::Result;

/// Default bucket capacity for capacity-bound stores
pub const DEFAULT_MAX_BUCKETS: u32 = 2048;

/// Initial soft cap used by the dynamic strategy before growth kicks in
pub const DYNAMIC_INITIAL_CAP: u32 = 32;

/// How a store bounds its number of distinct buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStrategy {
    /// Hard cap: at most `max_buckets` distinct indices, enforced by collapse
    Fixed,
    /// Soft cap growing as `floor(100 * log10(total_count + 1))`
    Dynamic,
    /// No cap; `max_buckets` is reported as -1
    Unlimited,
}

/// Dense or sparse counter layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Contiguous counter window; FIXED strategy only
    Dense,
    /// Ordered index-to-count map; any strategy
    Sparse,
}

/// Which extreme of the index range folds together under capacity pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseEnd {
    /// Collapse the smallest occupied indices (positive store)
    Low,
    /// Collapse the largest occupied indices (negative store)
    High,
}

fn dynamic_cap(total_count: u64, initial: usize) -> usize {
    let grown = (100.0 * ((total_count + 1) as f64).log10()).floor() as usize;
    grown.max(initial)
}

/// Dense counter window over a contiguous bucket index range
///
/// Counters live in a deque indexed by `index - offset`. The window starts at
/// the first inserted index and grows toward new indices until `capacity`
/// buckets exist; after that, out-of-window inserts trigger collapse at the
/// configured end.
#[derive(Debug, Clone)]
pub struct ContiguousStorage {
    counts: VecDeque<u64>,
    offset: i64,
    capacity: usize,
    total: u64,
    collapse: CollapseEnd,
}

impl ContiguousStorage {
    /// Creates an empty dense store with the given bucket capacity
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `max_buckets` is zero
    pub fn new(max_buckets: u32, collapse: CollapseEnd) -> Result<Self> {
        validate_bucket_count(u64::from(max_buckets), "max_buckets")?;
        Ok(Self {
            counts: VecDeque::new(),
            offset: 0,
            capacity: max_buckets as usize,
            total: 0,
            collapse,
        })
    }

    /// Adds one sample to bucket `index`
    #[inline]
    pub fn add(&mut self, index: i64) {
        self.add_n(index, 1);
    }

    /// Adds `n` samples to bucket `index`, collapsing if the window overflows
    pub fn add_n(&mut self, index: i64, n: u64) {
        if n == 0 {
            return;
        }
        let slot = self.slot_for(index);
        self.counts[slot] += n;
        self.total += n;
    }

    fn slot_for(&mut self, index: i64) -> usize {
        if self.counts.is_empty() {
            self.offset = index;
            self.counts.push_back(0);
            return 0;
        }
        if index < self.offset {
            self.extend_down(index)
        } else if index >= self.offset + self.counts.len() as i64 {
            self.extend_up(index)
        } else {
            (index - self.offset) as usize
        }
    }

    fn extend_down(&mut self, index: i64) -> usize {
        match self.collapse {
            CollapseEnd::Low => {
                // grow toward the new index as far as capacity allows; what
                // stays out of range folds into the lowest surviving bucket
                let needed = (self.offset - index) as usize;
                let grow = needed.min(self.capacity - self.counts.len());
                for _ in 0..grow {
                    self.counts.push_front(0);
                }
                self.offset -= grow as i64;
                if index < self.offset {
                    0
                } else {
                    (index - self.offset) as usize
                }
            }
            CollapseEnd::High => {
                // the new low index must be representable; every bucket at or
                // above the shifted window's top edge folds downward
                let new_top = index + self.capacity as i64;
                let mut folded = 0u64;
                while self.offset + self.counts.len() as i64 > new_top {
                    match self.counts.pop_back() {
                        Some(c) => folded += c,
                        None => break,
                    }
                }
                if folded > 0 {
                    if let Some(back) = self.counts.back_mut() {
                        *back += folded;
                    } else {
                        self.offset = new_top - 1;
                        self.counts.push_back(folded);
                    }
                }
                for _ in 0..(self.offset - index) as usize {
                    self.counts.push_front(0);
                }
                self.offset = index;
                0
            }
        }
    }

    fn extend_up(&mut self, index: i64) -> usize {
        match self.collapse {
            CollapseEnd::Low => {
                // mirror of `extend_down` for the high-growing positive store
                let new_bottom = index - self.capacity as i64 + 1;
                let mut folded = 0u64;
                while self.offset < new_bottom {
                    match self.counts.pop_front() {
                        Some(c) => {
                            folded += c;
                            self.offset += 1;
                        }
                        None => break,
                    }
                }
                if folded > 0 {
                    if self.counts.is_empty() {
                        self.offset = new_bottom;
                        self.counts.push_back(folded);
                    } else if let Some(front) = self.counts.front_mut() {
                        *front += folded;
                    }
                }
                while self.offset + (self.counts.len() as i64) <= index {
                    self.counts.push_back(0);
                }
                (index - self.offset) as usize
            }
            CollapseEnd::High => {
                let needed = (index - (self.offset + self.counts.len() as i64 - 1)) as usize;
                let grow = needed.min(self.capacity - self.counts.len());
                for _ in 0..grow {
                    self.counts.push_back(0);
                }
                if index >= self.offset + self.counts.len() as i64 {
                    self.counts.len() - 1
                } else {
                    (index - self.offset) as usize
                }
            }
        }
    }

    /// Removes up to `n` samples from bucket `index`
    ///
    /// Removing from an out-of-window or empty bucket is a warned no-op; the
    /// count never goes below what the bucket actually holds.
    pub fn remove_n(&mut self, index: i64, n: u64) {
        if index < self.offset || index >= self.offset + self.counts.len() as i64 {
            log::warn!(
                "remove from bucket {} outside the dense window [{}, {}); ignoring",
                index,
                self.offset,
                self.offset + self.counts.len() as i64
            );
            return;
        }
        let slot = (index - self.offset) as usize;
        let available = self.counts[slot];
        if available < n {
            log::warn!(
                "remove of {} samples from bucket {} holding {}; clamping",
                n,
                index,
                available
            );
            self.counts[slot] = 0;
            self.total -= available;
        } else {
            self.counts[slot] -= n;
            self.total -= n;
        }
    }

    /// Count held by bucket `index`; out-of-window reads warn and return zero
    pub fn count_at(&self, index: i64) -> u64 {
        if self.counts.is_empty()
            || index < self.offset
            || index >= self.offset + self.counts.len() as i64
        {
            log::warn!(
                "read of bucket {} outside the dense window; returning 0",
                index
            );
            return 0;
        }
        self.counts[(index - self.offset) as usize]
    }

    /// Total samples across all buckets
    pub fn total_count(&self) -> u64 {
        self.total
    }

    /// Number of occupied buckets
    pub fn distinct_count(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Configured bucket capacity
    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    /// Occupied `(index, count)` pairs in ascending index order
    pub fn iter_ascending(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        let offset = self.offset;
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(move |(i, &c)| (offset + i as i64, c))
    }

    /// Occupied `(index, count)` pairs in descending index order
    pub fn iter_descending(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        let offset = self.offset;
        self.counts
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, &c)| c > 0)
            .map(move |(i, &c)| (offset + i as i64, c))
    }
}

/// Sparse ordered map from bucket index to count
///
/// Supports every bucket-management strategy; iteration order comes for free
/// from the underlying B-tree.
#[derive(Debug, Clone)]
pub struct SparseStorage {
    counts: BTreeMap<i64, u64>,
    total: u64,
    strategy: BucketStrategy,
    cap: usize,
    initial_cap: usize,
    collapse: CollapseEnd,
}

impl SparseStorage {
    /// Creates an empty sparse store
    ///
    /// `max_buckets` is the hard cap for FIXED and the initial soft cap for
    /// DYNAMIC; supplying it with UNLIMITED logs a warning and ignores it.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if an explicit cap is zero
    pub fn new(
        strategy: BucketStrategy,
        max_buckets: Option<u32>,
        collapse: CollapseEnd,
    ) -> Result<Self> {
        let cap = match strategy {
            BucketStrategy::Fixed => {
                let cap = max_buckets.unwrap_or(DEFAULT_MAX_BUCKETS);
                validate_bucket_count(u64::from(cap), "max_buckets")?;
                cap as usize
            }
            BucketStrategy::Dynamic => {
                let cap = max_buckets.unwrap_or(DYNAMIC_INITIAL_CAP);
                validate_bucket_count(u64::from(cap), "max_buckets")?;
                cap as usize
            }
            BucketStrategy::Unlimited => {
                if let Some(requested) = max_buckets {
                    log::warn!(
                        "max_buckets={} was provided but will be ignored under the unlimited strategy",
                        requested
                    );
                }
                usize::MAX
            }
        };
        Ok(Self {
            counts: BTreeMap::new(),
            total: 0,
            strategy,
            cap,
            initial_cap: cap,
            collapse,
        })
    }

    /// Adds one sample to bucket `index`
    #[inline]
    pub fn add(&mut self, index: i64) {
        self.add_n(index, 1);
    }

    /// Adds `n` samples to bucket `index`, collapsing extremes past the cap
    pub fn add_n(&mut self, index: i64, n: u64) {
        if n == 0 {
            return;
        }
        *self.counts.entry(index).or_insert(0) += n;
        self.total += n;
        if self.strategy == BucketStrategy::Dynamic {
            self.cap = dynamic_cap(self.total, self.initial_cap);
        }
        while self.counts.len() > self.cap {
            self.collapse_once();
        }
    }

    fn collapse_once(&mut self) {
        let folded = match self.collapse {
            CollapseEnd::Low => self.counts.pop_first(),
            CollapseEnd::High => self.counts.pop_last(),
        };
        let Some((index, count)) = folded else {
            return;
        };
        let survivor = match self.collapse {
            CollapseEnd::Low => self.counts.values_mut().next(),
            CollapseEnd::High => self.counts.values_mut().next_back(),
        };
        match survivor {
            Some(dst) => *dst += count,
            // single remaining bucket: put it back, nothing to fold into
            None => {
                self.counts.insert(index, count);
            }
        }
    }

    /// Reinstates a serialized bucket without running cap enforcement; the
    /// payload already reflects any collapse that happened before encoding
    pub(crate) fn restore_bucket(&mut self, index: i64, count: u64) {
        if count == 0 {
            return;
        }
        *self.counts.entry(index).or_insert(0) += count;
        self.total += count;
        if self.strategy == BucketStrategy::Dynamic {
            self.cap = dynamic_cap(self.total, self.initial_cap);
        }
    }

    /// Removes up to `n` samples from bucket `index`
    ///
    /// Removing from an absent bucket is a warned no-op.
    pub fn remove_n(&mut self, index: i64, n: u64) {
        match self.counts.get_mut(&index) {
            Some(count) => {
                if *count <= n {
                    if *count < n {
                        log::warn!(
                            "remove of {} samples from bucket {} holding {}; clamping",
                            n,
                            index,
                            count
                        );
                    }
                    self.total -= *count;
                    self.counts.remove(&index);
                } else {
                    *count -= n;
                    self.total -= n;
                }
            }
            None => {
                log::warn!("remove from absent bucket {}; ignoring", index);
            }
        }
    }

    /// Count held by bucket `index` (zero when absent)
    pub fn count_at(&self, index: i64) -> u64 {
        self.counts.get(&index).copied().unwrap_or(0)
    }

    /// Total samples across all buckets
    pub fn total_count(&self) -> u64 {
        self.total
    }

    /// Number of occupied buckets
    pub fn distinct_count(&self) -> usize {
        self.counts.len()
    }

    /// Strategy this store was built with
    pub fn strategy(&self) -> BucketStrategy {
        self.strategy
    }

    /// Current bucket cap: the hard cap for FIXED, the grown soft cap for
    /// DYNAMIC, and -1 for UNLIMITED
    pub fn max_buckets(&self) -> i64 {
        match self.strategy {
            BucketStrategy::Unlimited => -1,
            _ => self.cap as i64,
        }
    }

    /// Occupied `(index, count)` pairs in ascending index order
    pub fn iter_ascending(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.counts.iter().map(|(&i, &c)| (i, c))
    }

    /// Occupied `(index, count)` pairs in descending index order
    pub fn iter_descending(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.counts.iter().rev().map(|(&i, &c)| (i, c))
    }
}

/// Tagged store dispatch
///
/// The sketch holds one of the two layouts behind a plain enum; the receiver
/// of a merge keeps its own layout and strategy regardless of the source's.
#[derive(Debug, Clone)]
pub enum Store {
    /// Dense counter window
    Contiguous(ContiguousStorage),
    /// Ordered index-to-count map
    Sparse(SparseStorage),
}

impl Store {
    /// Adds one sample to bucket `index`
    #[inline]
    pub fn add(&mut self, index: i64) {
        self.add_n(index, 1);
    }

    /// Adds `n` samples to bucket `index`
    #[inline]
    pub fn add_n(&mut self, index: i64, n: u64) {
        match self {
            Store::Contiguous(s) => s.add_n(index, n),
            Store::Sparse(s) => s.add_n(index, n),
        }
    }

    /// Removes up to `n` samples from bucket `index` (warned no-op if absent)
    pub fn remove_n(&mut self, index: i64, n: u64) {
        match self {
            Store::Contiguous(s) => s.remove_n(index, n),
            Store::Sparse(s) => s.remove_n(index, n),
        }
    }

    /// Count held by bucket `index`
    pub fn count_at(&self, index: i64) -> u64 {
        match self {
            Store::Contiguous(s) => s.count_at(index),
            Store::Sparse(s) => s.count_at(index),
        }
    }

    /// Total samples across all buckets
    pub fn total_count(&self) -> u64 {
        match self {
            Store::Contiguous(s) => s.total_count(),
            Store::Sparse(s) => s.total_count(),
        }
    }

    /// Number of occupied buckets
    pub fn distinct_count(&self) -> usize {
        match self {
            Store::Contiguous(s) => s.distinct_count(),
            Store::Sparse(s) => s.distinct_count(),
        }
    }

    /// Folds every bucket of `other` into this store
    ///
    /// The receiver's layout, strategy, and collapse behavior govern the
    /// result; the source is read-only.
    pub fn merge(&mut self, other: &Store) {
        for (index, count) in other.iter_ascending() {
            self.add_n(index, count);
        }
    }

    /// Occupied `(index, count)` pairs in ascending index order
    pub fn iter_ascending(&self) -> Box<dyn Iterator<Item = (i64, u64)> + '_> {
        match self {
            Store::Contiguous(s) => Box::new(s.iter_ascending()),
            Store::Sparse(s) => Box::new(s.iter_ascending()),
        }
    }

    /// Occupied `(index, count)` pairs in descending index order
    pub fn iter_descending(&self) -> Box<dyn Iterator<Item = (i64, u64)> + '_> {
        match self {
            Store::Contiguous(s) => Box::new(s.iter_descending()),
            Store::Sparse(s) => Box::new(s.iter_descending()),
        }
    }

    /// The counter layout of this store
    pub fn kind(&self) -> StorageKind {
        match self {
            Store::Contiguous(_) => StorageKind::Dense,
            Store::Sparse(_) => StorageKind::Sparse,
        }
    }

    /// The bucket-management strategy of this store
    pub fn strategy(&self) -> BucketStrategy {
        match self {
            Store::Contiguous(_) => BucketStrategy::Fixed,
            Store::Sparse(s) => s.strategy(),
        }
    }

    /// Current bucket cap (-1 for UNLIMITED)
    pub fn max_buckets(&self) -> i64 {
        match self {
            Store::Contiguous(s) => i64::from(s.capacity()),
            Store::Sparse(s) => s.max_buckets(),
        }
    }

    /// Reinstates a serialized bucket; dense replay is exact because the
    /// encoded window never exceeds the capacity
    pub(crate) fn restore_bucket(&mut self, index: i64, count: u64) {
        match self {
            Store::Contiguous(s) => s.add_n(index, count),
            Store::Sparse(s) => s.restore_bucket(index, count),
        }
    }

    /// The cap the store was configured with, for serialization
    pub(crate) fn configured_max_buckets(&self) -> Option<u32> {
        match self {
            Store::Contiguous(s) => Some(s.capacity()),
            Store::Sparse(s) => match s.strategy {
                BucketStrategy::Unlimited => None,
                _ => Some(s.initial_cap as u32),
            },
        }
    }
}
