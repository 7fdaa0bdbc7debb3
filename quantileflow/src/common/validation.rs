//! Parameter and payload bounds checking shared by the sketch families

use crate::common::{Result, SketchError};

/// Upper limit on bucket counts for any store (2^24)
///
/// A dense counter window allocates eight bytes per bucket, so this caps a
/// single store at 128MB; a sketch that wants more buckets than this has
/// stopped being a sketch.
pub const MAX_STORE_BUCKETS: u64 = 1 << 24;

/// Largest serialized payload a deserializer will accept (64MB)
pub const MAX_SERIALIZED_BYTES: usize = 64 * 1024 * 1024;

/// Validate a DDSketch relative-accuracy target
///
/// The alpha parameter is a relative error bound, so it only makes sense
/// strictly between zero (exact answers) and one (no answer at all).
pub fn validate_relative_accuracy(alpha: f64) -> Result<()> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(SketchError::InvalidParameter {
            param: "relative_accuracy".to_string(),
            value: alpha.to_string(),
            constraint: "a relative error target needs 0 < alpha < 1".to_string(),
        });
    }
    Ok(())
}

/// Validate that a quantile rank lies in the closed interval [0, 1]
pub fn validate_quantile(q: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&q) {
        return Err(SketchError::InvalidParameter {
            param: "q".to_string(),
            value: q.to_string(),
            constraint: "quantile ranks run from 0 (minimum) to 1 (maximum)".to_string(),
        });
    }
    Ok(())
}

/// Validate a bucket count for a counter store or histogram
///
/// `param` names the offending knob (`max_buckets`, `num_buckets`) in the
/// error.
pub fn validate_bucket_count(buckets: u64, param: &str) -> Result<()> {
    if buckets == 0 {
        return Err(SketchError::InvalidParameter {
            param: param.to_string(),
            value: buckets.to_string(),
            constraint: "a store needs at least one bucket".to_string(),
        });
    }
    if buckets > MAX_STORE_BUCKETS {
        return Err(SketchError::InvalidParameter {
            param: param.to_string(),
            value: buckets.to_string(),
            constraint: format!("bucket counts above {} are not supported", MAX_STORE_BUCKETS),
        });
    }
    Ok(())
}

/// Reject oversized serialized payloads before any allocation happens
pub fn validate_payload_size(len: usize) -> Result<()> {
    if len > MAX_SERIALIZED_BYTES {
        return Err(SketchError::DeserializationError(format!(
            "refusing a {} byte payload; serialized sketches are capped at {} bytes",
            len, MAX_SERIALIZED_BYTES
        )));
    }
    Ok(())
}
