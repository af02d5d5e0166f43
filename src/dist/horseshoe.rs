//! Horseshoe-type prior over positive values
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::impl_display;
use crate::traits::{ContinuousDistr, Rv, Support};
use rand::Rng;
use rand_distr::{Cauchy, StandardNormal};
use std::fmt;

/// Horseshoe prior on a positive quantity, used for the noise variance.
///
/// Draws are `|N(0, 1) · λ · scale|` with `λ ~ |Cauchy(0, 1)|`. The density is
/// the usual closed-form bound of the horseshoe,
///
/// ```math
///     \ln f(x) = \ln \ln (1 + 3 (scale / x)^2)
/// ```
///
/// which is only defined up to a constant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Horseshoe {
    scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum HorseshoeError {
    /// The scale parameter is less than or equal to zero
    ScaleTooLow { scale: f64 },
    /// The scale parameter is infinite or NaN
    ScaleNotFinite { scale: f64 },
}

impl Horseshoe {
    /// Create a new horseshoe prior with the given scale
    pub fn new(scale: f64) -> Result<Self, HorseshoeError> {
        if scale <= 0.0 {
            Err(HorseshoeError::ScaleTooLow { scale })
        } else if !scale.is_finite() {
            Err(HorseshoeError::ScaleNotFinite { scale })
        } else {
            Ok(Horseshoe { scale })
        }
    }

    /// Creates a new Horseshoe without checking the scale
    #[inline]
    #[must_use]
    pub fn new_unchecked(scale: f64) -> Self {
        Horseshoe { scale }
    }

    /// Get the scale parameter
    #[inline]
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl From<&Horseshoe> for String {
    fn from(hs: &Horseshoe) -> String {
        format!("Horseshoe(scale: {})", hs.scale)
    }
}

impl_display!(Horseshoe);

impl Rv<f64> for Horseshoe {
    fn ln_f(&self, x: &f64) -> f64 {
        let r = self.scale / x;
        (3.0 * r * r).ln_1p().ln()
    }

    fn draw<R: Rng>(&self, rng: &mut R) -> f64 {
        let cauchy = Cauchy::new(0.0, 1.0).unwrap();
        let lambda: f64 = rng.sample::<f64, _>(cauchy).abs();
        let z: f64 = rng.sample(StandardNormal);
        (z * lambda * self.scale).abs()
    }
}

impl Support<f64> for Horseshoe {
    fn supports(&self, x: &f64) -> bool {
        *x > 0.0 && x.is_finite()
    }
}

impl ContinuousDistr<f64> for Horseshoe {}

impl std::error::Error for HorseshoeError {}

impl fmt::Display for HorseshoeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScaleTooLow { scale } => {
                write!(f, "scale ({}) must be greater than zero", scale)
            }
            Self::ScaleNotFinite { scale } => {
                write!(f, "non-finite scale: {}", scale)
            }
        }
    }
}
