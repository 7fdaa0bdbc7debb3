//! Value-to-bucket index mappings for DDSketch
//!
//! A mapping is a pure function pair `index(v) -> i64` / `value(i) -> f64`
//! over positive values such that the reconstructed `value(index(v))` is
//! within relative accuracy `alpha` of `v` for every `v` in the indexable
//! range. Three strategies trade bucket density against per-insert cost:
//!
//! - [`LogarithmicMapping`] — exact `ln`, memory-optimal buckets.
//! - [`LinearInterpolationMapping`] — piecewise-linear log2 approximation
//!   read straight out of the floating-point bit layout; no transcendental
//!   call on the insert path, at the cost of ~44% more buckets.
//! - [`CubicInterpolationMapping`] — cubic log2 approximation; same
//!   bit-layout trick with bucket density within 1% of optimal.
//!
//! All mappings guarantee, for positive `v` in range:
//!
//! - monotonicity: `v1 <= v2` implies `index(v1) <= index(v2)`
//! - accuracy: `|value(index(v)) - v| / v <= alpha`
//! - round-trip stability: `index(value(i)) == i`

use crate::common::validation::validate_relative_accuracy;
use crate::common::Result;

/// Selects the value-to-index mapping used by a DDSketch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// Exact logarithm; fewest buckets per decade
    Logarithmic,
    /// Piecewise-linear log2 approximation; fastest insert path
    LinearInterpolation,
    /// Cubic log2 approximation; near-optimal buckets without `ln`
    CubicInterpolation,
}

/// Tagged mapping dispatch
///
/// Only three mappings exist, so the sketch holds a plain enum and the hot
/// insert path inlines the match instead of going through a vtable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mapping {
    /// Exact logarithmic mapping
    Logarithmic(LogarithmicMapping),
    /// Linearly interpolated mapping
    LinearInterpolation(LinearInterpolationMapping),
    /// Cubically interpolated mapping
    CubicInterpolation(CubicInterpolationMapping),
}

impl Mapping {
    /// Builds the mapping selected by `kind` for the given relative accuracy
    pub fn new(kind: MappingKind, relative_accuracy: f64) -> Result<Self> {
        match kind {
            MappingKind::Logarithmic => {
                Ok(Mapping::Logarithmic(LogarithmicMapping::new(relative_accuracy)?))
            }
            MappingKind::LinearInterpolation => Ok(Mapping::LinearInterpolation(
                LinearInterpolationMapping::new(relative_accuracy)?,
            )),
            MappingKind::CubicInterpolation => Ok(Mapping::CubicInterpolation(
                CubicInterpolationMapping::new(relative_accuracy)?,
            )),
        }
    }

    /// The kind tag this mapping was built from
    pub fn kind(&self) -> MappingKind {
        match self {
            Mapping::Logarithmic(_) => MappingKind::Logarithmic,
            Mapping::LinearInterpolation(_) => MappingKind::LinearInterpolation,
            Mapping::CubicInterpolation(_) => MappingKind::CubicInterpolation,
        }
    }

    /// Bucket index for a positive value
    #[inline]
    pub fn index(&self, value: f64) -> i64 {
        match self {
            Mapping::Logarithmic(m) => m.index(value),
            Mapping::LinearInterpolation(m) => m.index(value),
            Mapping::CubicInterpolation(m) => m.index(value),
        }
    }

    /// Representative value for a bucket index
    #[inline]
    pub fn value(&self, index: i64) -> f64 {
        match self {
            Mapping::Logarithmic(m) => m.value(index),
            Mapping::LinearInterpolation(m) => m.value(index),
            Mapping::CubicInterpolation(m) => m.value(index),
        }
    }

    /// Smallest positive magnitude the mapping can index; anything below is
    /// treated as zero by the sketch
    #[inline]
    pub fn min_indexable(&self) -> f64 {
        match self {
            Mapping::Logarithmic(m) => m.min_indexable(),
            Mapping::LinearInterpolation(m) => m.min_indexable(),
            Mapping::CubicInterpolation(m) => m.min_indexable(),
        }
    }

    /// The relative accuracy the mapping was built for
    pub fn relative_accuracy(&self) -> f64 {
        match self {
            Mapping::Logarithmic(m) => m.relative_accuracy(),
            Mapping::LinearInterpolation(m) => m.relative_accuracy(),
            Mapping::CubicInterpolation(m) => m.relative_accuracy(),
        }
    }
}

/// Splits a normal positive double into `(exponent, significand)` with
/// `value = (1 + significand) * 2^exponent` and `significand` in `[0, 1)`
#[inline]
fn decompose(value: f64) -> (f64, f64) {
    let bits = value.to_bits();
    let exponent = (((bits >> 52) & 0x7ff) as i64 - 1023) as f64;
    let significand = f64::from_bits((bits & 0x000f_ffff_ffff_ffff) | 0x3ff0_0000_0000_0000) - 1.0;
    (exponent, significand)
}

/// Exact logarithmic mapping
///
/// `index(v) = ceil(log_gamma(v))` with `gamma = (1 + alpha) / (1 - alpha)`,
/// so bucket `i` covers `(gamma^(i-1), gamma^i]`. Reconstruction returns the
/// midpoint `2 * gamma^i / (gamma + 1)`, which sits within `alpha` of both
/// bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogarithmicMapping {
    relative_accuracy: f64,
    gamma: f64,
    log_gamma: f64,
    min_indexable: f64,
}

impl LogarithmicMapping {
    /// Creates a logarithmic mapping for the given relative accuracy
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `relative_accuracy` is outside (0, 1)
    pub fn new(relative_accuracy: f64) -> Result<Self> {
        validate_relative_accuracy(relative_accuracy)?;
        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        Ok(Self {
            relative_accuracy,
            gamma,
            log_gamma: gamma.ln(),
            min_indexable: f64::MIN_POSITIVE * gamma,
        })
    }

    /// Bucket index for a positive value
    #[inline]
    pub fn index(&self, value: f64) -> i64 {
        (value.ln() / self.log_gamma).ceil() as i64
    }

    /// Geometric bucket midpoint for an index
    #[inline]
    pub fn value(&self, index: i64) -> f64 {
        (index as f64 * self.log_gamma).exp() * 2.0 / (self.gamma + 1.0)
    }

    /// Smallest indexable positive magnitude
    pub fn min_indexable(&self) -> f64 {
        self.min_indexable
    }

    /// The relative accuracy the mapping was built for
    pub fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    /// Ratio between consecutive bucket boundaries
    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

/// Linearly interpolated mapping
///
/// Approximates `log2(v)` by the exponent plus the raw significand, i.e. the
/// chord of `log2` between consecutive powers of two. The chord underestimates
/// `log2` with slope off by at most `1/ln(2)`, so buckets are sized
/// `2 * ln(1 + alpha)` in chord units to keep the worst-case relative error at
/// `alpha`; that makes this mapping ~44% less space-efficient than
/// [`LogarithmicMapping`] but removes `ln` from the insert path entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearInterpolationMapping {
    relative_accuracy: f64,
    gamma: f64,
    multiplier: f64,
    min_indexable: f64,
}

impl LinearInterpolationMapping {
    /// Creates a linearly interpolated mapping for the given relative accuracy
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `relative_accuracy` is outside (0, 1)
    pub fn new(relative_accuracy: f64) -> Result<Self> {
        validate_relative_accuracy(relative_accuracy)?;
        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        Ok(Self {
            relative_accuracy,
            gamma,
            multiplier: 1.0 / (2.0 * relative_accuracy.ln_1p()),
            min_indexable: f64::MIN_POSITIVE * gamma,
        })
    }

    #[inline]
    fn log2_approx(value: f64) -> f64 {
        let (exponent, significand) = decompose(value);
        exponent + significand
    }

    #[inline]
    fn exp2_approx(x: f64) -> f64 {
        let exponent = x.floor();
        let significand = x - exponent;
        (1.0 + significand) * exponent.exp2()
    }

    /// Bucket index for a positive value
    #[inline]
    pub fn index(&self, value: f64) -> i64 {
        (Self::log2_approx(value) * self.multiplier).ceil() as i64
    }

    /// Bucket midpoint (in approximated-log space) for an index
    #[inline]
    pub fn value(&self, index: i64) -> f64 {
        Self::exp2_approx((index as f64 - 0.5) / self.multiplier)
    }

    /// Smallest indexable positive magnitude
    pub fn min_indexable(&self) -> f64 {
        self.min_indexable
    }

    /// The relative accuracy the mapping was built for
    pub fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    /// Nominal ratio between consecutive bucket boundaries
    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

/// Cubically interpolated mapping
///
/// Approximates `log2(1 + s)` over `s in [0, 1)` by
/// `A*s^3 + B*s^2 + C*s`. The constants equioscillate the slope mismatch
/// against the true logarithm (the extremes sit at `s = 0` and `s = 2/3`,
/// both with ratio `7 / (10 * ln 2)`), so sizing buckets by that single
/// factor makes the worst-case relative error over the significand range
/// exactly `alpha`. Bucket density ends up within 1% of the exact
/// logarithmic mapping. The inverse solves the cubic with Cardano's formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicInterpolationMapping {
    relative_accuracy: f64,
    gamma: f64,
    multiplier: f64,
    min_indexable: f64,
}

impl CubicInterpolationMapping {
    const A: f64 = 6.0 / 35.0;
    const B: f64 = -3.0 / 5.0;
    const C: f64 = 10.0 / 7.0;

    /// Creates a cubically interpolated mapping for the given relative accuracy
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `relative_accuracy` is outside (0, 1)
    pub fn new(relative_accuracy: f64) -> Result<Self> {
        validate_relative_accuracy(relative_accuracy)?;
        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        Ok(Self {
            relative_accuracy,
            gamma,
            multiplier: 7.0 / (20.0 * relative_accuracy.ln_1p()),
            min_indexable: f64::MIN_POSITIVE * gamma,
        })
    }

    #[inline]
    fn log2_approx(value: f64) -> f64 {
        let (exponent, s) = decompose(value);
        exponent + ((Self::A * s + Self::B) * s + Self::C) * s
    }

    #[inline]
    fn exp2_approx(x: f64) -> f64 {
        let exponent = x.floor();
        let frac = x - exponent;
        // Real root of A*s^3 + B*s^2 + C*s = frac via Cardano
        let d0 = Self::B * Self::B - 3.0 * Self::A * Self::C;
        let d1 = 2.0 * Self::B * Self::B * Self::B
            - 9.0 * Self::A * Self::B * Self::C
            - 27.0 * Self::A * Self::A * frac;
        let p = ((d1 - (d1 * d1 - 4.0 * d0 * d0 * d0).sqrt()) / 2.0).cbrt();
        let s = -(Self::B + p + d0 / p) / (3.0 * Self::A);
        (1.0 + s) * exponent.exp2()
    }

    /// Bucket index for a positive value
    #[inline]
    pub fn index(&self, value: f64) -> i64 {
        (Self::log2_approx(value) * self.multiplier).ceil() as i64
    }

    /// Bucket midpoint (in approximated-log space) for an index
    #[inline]
    pub fn value(&self, index: i64) -> f64 {
        Self::exp2_approx((index as f64 - 0.5) / self.multiplier)
    }

    /// Smallest indexable positive magnitude
    pub fn min_indexable(&self) -> f64 {
        self.min_indexable
    }

    /// The relative accuracy the mapping was built for
    pub fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    /// Nominal ratio between consecutive bucket boundaries
    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}
