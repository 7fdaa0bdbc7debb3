//! Core traits for all sketch implementations

use super::error::SketchError;

/// Core trait that all sketches must implement
///
/// This trait defines the fundamental operations that any quantile sketch must
/// support: updating with new samples, estimating results, checking emptiness,
/// and serialization.
///
/// # Single-writer contract
///
/// A sketch instance is single-writer: concurrent mutation of the same
/// instance is not supported and callers must serialize `update`/merge calls
/// externally. Read-only queries may run concurrently against an unchanging
/// sketch.
pub trait Sketch {
    /// The type of items this sketch can process
    type Item;

    /// Update the sketch with a new item
    ///
    /// This is the infallible streaming entry point. Samples the sketch
    /// cannot accept (non-finite values, negatives when the sketch was built
    /// without negative support) are dropped with a warning; use the
    /// fallible inherent `insert` methods when rejection must surface to the
    /// caller.
    ///
    /// # Arguments
    /// * `item` - The item to add to the sketch
    fn update(&mut self, item: &Self::Item);

    /// Get the estimated result from the sketch
    ///
    /// For the quantile sketches in this crate this is the total number of
    /// samples observed; per-quantile results come from each sketch's
    /// `quantile` method.
    ///
    /// # Returns
    /// The estimated value as a float
    fn estimate(&self) -> f64;

    /// Check if the sketch is empty (no items added)
    ///
    /// # Returns
    /// `true` if the sketch has not processed any items
    fn is_empty(&self) -> bool;

    /// Serialize the sketch to bytes
    ///
    /// The layout is a family tag byte, a fixed-size parameter block, then
    /// the counter payload. Layouts are stable within a sketch family but
    /// not across families.
    ///
    /// # Returns
    /// A byte vector containing the serialized sketch
    fn serialize(&self) -> Vec<u8>;

    /// Deserialize a sketch from bytes
    ///
    /// # Arguments
    /// * `bytes` - The byte slice containing serialized sketch data
    ///
    /// # Returns
    /// Result containing the deserialized sketch or an error
    ///
    /// # Errors
    /// Returns `SketchError::DeserializationError` if bytes are invalid
    fn deserialize(bytes: &[u8]) -> Result<Self, SketchError>
    where
        Self: Sized;
}

/// Trait for sketches that support merging
///
/// This trait extends `Sketch` with the ability to merge two sketches
/// together. Merging is how shard-local sketches are combined into one
/// stream-wide sketch: the result answers queries as if it had seen the
/// concatenation of both input streams, up to the configured accuracy.
pub trait Mergeable: Sketch {
    /// Merge another sketch into this one
    ///
    /// Data moves by addition into the receiver; `other` is left unchanged
    /// and may continue to be used.
    ///
    /// # Arguments
    /// * `other` - The sketch to merge into this one
    ///
    /// # Returns
    /// `Ok(())` if merge was successful, or an error if sketches are incompatible
    ///
    /// # Errors
    /// Returns `SketchError::InvalidParameter` if the sketches were built
    /// with different parameters (accuracy, mapping, bounds, moment count)
    fn merge(&mut self, other: &Self) -> Result<(), SketchError>;
}
