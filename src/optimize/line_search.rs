//! Line search methods

use super::{project, Bounds, OptimizeError};
use log::debug;
use nalgebra::DVector;

/// Backtracking (Armijo) line search parameters
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct BacktrackingParams {
    /// Sufficient decrease coefficient
    pub c1: f64,
    /// Smallest fraction of the previous step a new trial may take
    pub shrink_min: f64,
    /// Largest fraction of the previous step a new trial may take
    pub shrink_max: f64,
    /// Step length below which the search gives up
    pub amin: f64,
    /// Maximum number of trial steps
    pub max_iter: usize,
}

impl Default for BacktrackingParams {
    fn default() -> Self {
        Self {
            c1: 1E-4,
            shrink_min: 0.1,
            shrink_max: 0.5,
            amin: 1E-14,
            max_iter: 30,
        }
    }
}

/// Find the minimum of a quadratic polynomial that goes through
/// the points (a, fa) and (b, fb) with slope fpa at a.
#[inline]
fn quad_min(a: f64, fa: f64, fpa: f64, b: f64, fb: f64) -> Option<f64> {
    let dab = b - a;
    if dab == 0.0 {
        return None;
    }
    let c2 = (fb - fa - fpa * dab) / (dab * dab);
    if c2 <= 0.0 {
        None
    } else {
        Some(a - fpa / (2.0 * c2))
    }
}

/// Projected backtracking search along `dir` from `x`.
///
/// Trial points are `P(x + α·dir)`, with `P` the projection onto the bounds.
/// A trial is accepted when `f(trial) ≤ f(x) + c1·∇f(x)·(trial − x)`; a
/// rejected step is shrunk to the minimizer of the quadratic through
/// `(0, f(x))` and `(α, f(trial))`, kept within `[shrink_min·α, shrink_max·α]`.
///
/// Returns the accepted point together with its objective value.
pub fn projected_backtracking<F>(
    params: &BacktrackingParams,
    x: &DVector<f64>,
    fx: f64,
    grad: &DVector<f64>,
    dir: &DVector<f64>,
    alpha_init: f64,
    bounds: &[Bounds],
    mut f: F,
) -> Result<(DVector<f64>, f64), OptimizeError>
where
    F: FnMut(&DVector<f64>) -> f64,
{
    let mut alpha = alpha_init;
    for i in 0..params.max_iter {
        if alpha < params.amin {
            return Err(OptimizeError::RoundingError);
        }
        let trial = project(&(x + dir * alpha), bounds);
        let step = &trial - x;
        let slope = grad.dot(&step);
        let f_trial = f(&trial);
        debug!(
            "backtracking: iteration = {}, alpha = {:e}, f = {}, slope = {}",
            i, alpha, f_trial, slope
        );

        if f_trial.is_finite() && f_trial <= fx + params.c1 * slope {
            return Ok((trial, f_trial));
        }

        let lo = params.shrink_min * alpha;
        let hi = params.shrink_max * alpha;
        alpha = if f_trial.is_finite() {
            // the slope along the step is scaled to a unit step in alpha
            quad_min(0.0, fx, slope / alpha, alpha, f_trial)
                .map_or(hi, |a| a.clamp(lo, hi))
        } else {
            lo
        };
    }
    Err(OptimizeError::MaxIterationReached)
}
