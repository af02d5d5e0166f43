//! Hyperparameters of a Gaussian process: values, priors and bounds
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use nalgebra::DVector;
use rand::Rng;

use crate::consts::SMALLEST_POSITIVE_NUMBER;
use crate::dist::{Gaussian, Horseshoe, LogNormal, Uniform};
use crate::misc::mean_and_variance;
use crate::optimize::Bounds;
use crate::traits::{ContinuousDistr, Rv};

/// Prior over one scalar hyperparameter
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum Prior {
    Horseshoe(Horseshoe),
    Gaussian(Gaussian),
    Uniform(Uniform),
    LogNormal(LogNormal),
}

impl Prior {
    pub fn ln_pdf(&self, x: f64) -> f64 {
        match self {
            Self::Horseshoe(d) => d.ln_pdf(&x),
            Self::Gaussian(d) => d.ln_pdf(&x),
            Self::Uniform(d) => d.ln_pdf(&x),
            Self::LogNormal(d) => d.ln_pdf(&x),
        }
    }

    pub fn draw<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Horseshoe(d) => d.draw(rng),
            Self::Gaussian(d) => d.draw(rng),
            Self::Uniform(d) => d.draw(rng),
            Self::LogNormal(d) => d.draw(rng),
        }
    }
}

/// A named, possibly vector valued hyperparameter.
///
/// `priors` and `bounds` have one entry per component of `value`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Parameter {
    name: String,
    value: DVector<f64>,
    priors: Vec<Prior>,
    bounds: Vec<Bounds>,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        value: DVector<f64>,
        priors: Vec<Prior>,
        bounds: Vec<Bounds>,
    ) -> Self {
        debug_assert_eq!(value.len(), priors.len());
        debug_assert_eq!(value.len(), bounds.len());
        Self {
            name: name.into(),
            value,
            priors,
            bounds,
        }
    }

    /// Noise variance: defaults to the variance of the evaluations, with a
    /// horseshoe prior of the same scale.
    pub fn noise_variance(evaluations: &DVector<f64>) -> Self {
        let (_, var) = mean_and_variance(evaluations);
        let scale = positive_or_one(var);
        Self::new(
            "var_noise",
            DVector::from_element(1, scale),
            vec![Prior::Horseshoe(Horseshoe::new_unchecked(scale))],
            vec![Bounds::at_least(SMALLEST_POSITIVE_NUMBER)],
        )
    }

    /// Constant mean: defaults to the mean of the evaluations, with a unit
    /// Gaussian prior around it.
    pub fn mean(evaluations: &DVector<f64>) -> Self {
        let (mean, _) = mean_and_variance(evaluations);
        Self::new(
            "mean",
            DVector::from_element(1, mean),
            vec![Prior::Gaussian(Gaussian::new_unchecked(mean, 1.0))],
            vec![Bounds::free()],
        )
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> &DVector<f64> {
        &self.value
    }

    #[inline]
    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    #[inline]
    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    /// Number of scalar components
    #[inline]
    pub fn dimension(&self) -> usize {
        self.value.len()
    }

    pub fn set_value(&mut self, value: &[f64]) {
        self.value = DVector::from_column_slice(value);
    }

    /// Log prior density of `values`; -∞ outside the bounds.
    pub fn ln_prior(&self, values: &[f64]) -> f64 {
        values
            .iter()
            .zip(self.priors.iter().zip(self.bounds.iter()))
            .map(|(&x, (prior, bounds))| {
                if bounds.contains(x) {
                    prior.ln_pdf(x)
                } else {
                    f64::NEG_INFINITY
                }
            })
            .sum()
    }

    /// One draw from the prior, one value per component
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        self.priors.iter().map(|p| p.draw(rng)).collect()
    }
}

/// Replace a degenerate variance or length by one.
#[inline]
pub(crate) fn positive_or_one(x: f64) -> f64 {
    if x > SMALLEST_POSITIVE_NUMBER && x.is_finite() {
        x
    } else {
        1.0
    }
}
