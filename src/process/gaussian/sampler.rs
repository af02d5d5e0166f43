//! Component-wise slice sampling of hyperparameters
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use log::debug;
use nalgebra::DVector;
use rand::Rng;
use std::fmt;

/// Parameters of the slice sampler
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct SliceSamplerParams {
    /// Largest size, in widths, the interval may reach while stepping out
    pub max_steps_out: usize,
    /// Extra sweeps discarded between two kept samples
    pub thinning: usize,
    /// Sweeps discarded before the first kept sample
    pub n_burning: usize,
    /// Maximum number of shrinkage steps per coordinate
    pub max_shrinks: usize,
}

impl SliceSamplerParams {
    pub fn with_max_steps_out(self, max_steps_out: usize) -> Self {
        Self {
            max_steps_out,
            ..self
        }
    }

    pub fn with_thinning(self, thinning: usize) -> Self {
        Self { thinning, ..self }
    }

    pub fn with_n_burning(self, n_burning: usize) -> Self {
        Self { n_burning, ..self }
    }

    pub fn with_max_shrinks(self, max_shrinks: usize) -> Self {
        Self {
            max_shrinks,
            ..self
        }
    }
}

impl Default for SliceSamplerParams {
    fn default() -> Self {
        Self {
            max_steps_out: 1,
            thinning: 0,
            n_burning: 0,
            max_shrinks: 200,
        }
    }
}

/// Errors from the slice sampler
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum SliceError {
    /// The log density is not finite at the current point
    ZeroDensity { ln_p: f64 },
    /// Shrinkage did not find an acceptable point for one coordinate
    ShrinkageExhausted { coordinate: usize },
    /// Widths and point have different lengths
    DimensionMismatch { expected: usize, given: usize },
}

impl std::error::Error for SliceError {}

impl fmt::Display for SliceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDensity { ln_p } => {
                write!(f, "log density at the current point is {}", ln_p)
            }
            Self::ShrinkageExhausted { coordinate } => write!(
                f,
                "shrinkage found no point in the slice for coordinate {}",
                coordinate
            ),
            Self::DimensionMismatch { expected, given } => write!(
                f,
                "expected a point of length {} but got {}",
                expected, given
            ),
        }
    }
}

/// Univariate slice sampler applied to each coordinate in turn, with
/// stepping out and shrinkage.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceSampler {
    widths: Vec<f64>,
    params: SliceSamplerParams,
}

impl SliceSampler {
    /// # Arguments
    /// * `widths` - Initial interval width for each coordinate
    /// * `params` - Stepping out and shrinkage limits
    ///
    /// Widths that are not positive and finite are replaced by one.
    pub fn new(widths: Vec<f64>, params: SliceSamplerParams) -> Self {
        let widths = widths
            .into_iter()
            .map(|w| if w > 0.0 && w.is_finite() { w } else { 1.0 })
            .collect();
        Self { widths, params }
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    /// Update every coordinate of `x` once, in order.
    pub fn sweep<F, R>(
        &self,
        x: &mut DVector<f64>,
        ln_p: F,
        rng: &mut R,
    ) -> Result<(), SliceError>
    where
        F: Fn(&DVector<f64>) -> f64,
        R: Rng,
    {
        if x.len() != self.widths.len() {
            return Err(SliceError::DimensionMismatch {
                expected: self.widths.len(),
                given: x.len(),
            });
        }

        let mut ln_px = ln_p(x);
        if !ln_px.is_finite() {
            return Err(SliceError::ZeroDensity { ln_p: ln_px });
        }

        for i in 0..x.len() {
            ln_px = self.update_coordinate(i, x, ln_px, &ln_p, rng)?;
        }
        Ok(())
    }

    fn update_coordinate<F, R>(
        &self,
        i: usize,
        x: &mut DVector<f64>,
        ln_px: f64,
        ln_p: &F,
        rng: &mut R,
    ) -> Result<f64, SliceError>
    where
        F: Fn(&DVector<f64>) -> f64,
        R: Rng,
    {
        let x0 = x[i];
        let w = self.widths[i];
        // height of the slice, ln(u * p(x))
        let level = ln_px + rng.gen::<f64>().ln();

        let eval_at = |value: f64, x: &mut DVector<f64>| {
            x[i] = value;
            ln_p(x)
        };

        let mut lower = x0 - w * rng.gen::<f64>();
        let mut upper = lower + w;

        let m = self.params.max_steps_out;
        let mut steps_left = (m as f64 * rng.gen::<f64>()).floor() as usize;
        let mut steps_right = m.saturating_sub(1).saturating_sub(steps_left);
        while steps_left > 0 && eval_at(lower, x) > level {
            lower -= w;
            steps_left -= 1;
        }
        while steps_right > 0 && eval_at(upper, x) > level {
            upper += w;
            steps_right -= 1;
        }

        for _ in 0..self.params.max_shrinks {
            let proposal = rng.gen_range(lower..upper);
            let ln_p_proposal = eval_at(proposal, x);
            if ln_p_proposal > level {
                return Ok(ln_p_proposal);
            }
            if proposal < x0 {
                lower = proposal;
            } else {
                upper = proposal;
            }
            if upper - lower <= f64::EPSILON * x0.abs().max(1.0) {
                break;
            }
        }

        debug!("slice shrinkage exhausted for coordinate {}", i);
        x[i] = x0;
        Err(SliceError::ShrinkageExhausted { coordinate: i })
    }
}
