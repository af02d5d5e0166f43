//! Bounded local optimization of smooth objectives
//!
//! [`Optimization`] is the narrow wrapper the engines use: it is built with a
//! method, box bounds and a minimize/maximize flag, and optimizes an objective
//! given together with its analytic gradient.
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use nalgebra::DVector;
use std::fmt;

mod lbfgsb;
mod line_search;

pub use lbfgsb::{lbfgsb, LbfgsbParams};
pub use line_search::{projected_backtracking, BacktrackingParams};

/// Errors from the optimizers
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum OptimizeError {
    /// The objective was not finite at the starting point
    NumericalDivergence,
    /// Maximum number of iterations reached in the line search
    MaxIterationReached,
    /// The line search step shrank to zero
    RoundingError,
    /// The starting point does not have one entry per bound
    DimensionMismatch { expected: usize, given: usize },
    /// A lower bound is above its upper bound
    InvalidBounds { index: usize, lower: f64, upper: f64 },
}

impl std::error::Error for OptimizeError {}

impl fmt::Display for OptimizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumericalDivergence => {
                write!(f, "objective is not finite at the starting point")
            }
            Self::MaxIterationReached => {
                write!(f, "maximum number of iterations reached")
            }
            Self::RoundingError => write!(f, "line search step underflowed"),
            Self::DimensionMismatch { expected, given } => write!(
                f,
                "start has {} entries but {} bounds were given",
                given, expected
            ),
            Self::InvalidBounds {
                index,
                lower,
                upper,
            } => write!(
                f,
                "bound {} is inverted: lower = {}, upper = {}",
                index, lower, upper
            ),
        }
    }
}

/// Box constraint on one coordinate. `None` means unbounded on that side.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    /// Unbounded coordinate
    pub fn free() -> Self {
        Self::default()
    }

    /// Closed interval `[lower, upper]`
    pub fn interval(lower: f64, upper: f64) -> Self {
        Self::new(Some(lower), Some(upper))
    }

    /// `[lower, ∞)`
    pub fn at_least(lower: f64) -> Self {
        Self::new(Some(lower), None)
    }

    /// Clamp `x` into the bounds
    #[inline]
    pub fn project(&self, x: f64) -> f64 {
        let x = self.lower.map_or(x, |lo| x.max(lo));
        self.upper.map_or(x, |hi| x.min(hi))
    }

    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        self.lower.map_or(true, |lo| x >= lo) && self.upper.map_or(true, |hi| x <= hi)
    }
}

/// Project every coordinate of `x` onto its bounds
pub fn project(x: &DVector<f64>, bounds: &[Bounds]) -> DVector<f64> {
    DVector::from_iterator(x.len(), x.iter().zip(bounds.iter()).map(|(v, b)| b.project(*v)))
}

/// Available local optimizers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum Method {
    /// Bounded limited-memory quasi-Newton
    #[default]
    Lbfgsb,
}

/// Outcome of a local optimization
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct OptimizationResult {
    /// Best point found
    pub solution: DVector<f64>,
    /// Objective at `solution` (not negated when maximizing)
    pub optimal_value: f64,
    /// Gradient of the objective at `solution`
    pub gradient: DVector<f64>,
    /// Number of quasi-Newton iterations
    pub n_iterations: usize,
    /// Whether a stopping tolerance was met
    pub converged: bool,
}

/// Bounded local optimizer over an objective and its analytic gradient
#[derive(Clone, Debug, PartialEq)]
pub struct Optimization {
    method: Method,
    bounds: Vec<Bounds>,
    minimize: bool,
    params: LbfgsbParams,
}

impl Optimization {
    /// # Arguments
    /// * `method` - Optimizer to run
    /// * `bounds` - One box constraint per coordinate
    /// * `minimize` - Minimize when `true`, maximize otherwise
    pub fn new(method: Method, bounds: Vec<Bounds>, minimize: bool) -> Result<Self, OptimizeError> {
        for (index, b) in bounds.iter().enumerate() {
            if let (Some(lower), Some(upper)) = (b.lower, b.upper) {
                if lower > upper {
                    return Err(OptimizeError::InvalidBounds { index, lower, upper });
                }
            }
        }
        Ok(Self {
            method,
            bounds,
            minimize,
            params: LbfgsbParams::default(),
        })
    }

    pub fn with_params(self, params: LbfgsbParams) -> Self {
        Self { params, ..self }
    }

    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    /// Run the optimizer from `start`.
    pub fn optimize<F, G>(
        &self,
        start: &DVector<f64>,
        mut objective: F,
        mut gradient: G,
    ) -> Result<OptimizationResult, OptimizeError>
    where
        F: FnMut(&DVector<f64>) -> f64,
        G: FnMut(&DVector<f64>) -> DVector<f64>,
    {
        if start.len() != self.bounds.len() {
            return Err(OptimizeError::DimensionMismatch {
                expected: self.bounds.len(),
                given: start.len(),
            });
        }

        let sign = if self.minimize { 1.0 } else { -1.0 };
        let mut res = match self.method {
            Method::Lbfgsb => lbfgsb(
                start,
                &self.bounds,
                &self.params,
                |x| sign * objective(x),
                |x| sign * gradient(x),
            )?,
        };
        res.optimal_value *= sign;
        res.gradient *= sign;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maximize_concave_quadratic() {
        let opt = Optimization::new(Method::Lbfgsb, vec![Bounds::interval(-10.0, 10.0)], false).unwrap();
        let res = opt
            .optimize(
                &DVector::from_column_slice(&[5.0]),
                |x| -(x[0] - 1.0).powi(2) + 3.0,
                |x| DVector::from_column_slice(&[-2.0 * (x[0] - 1.0)]),
            )
            .unwrap();
        assert::close(res.solution[0], 1.0, 1E-5);
        assert::close(res.optimal_value, 3.0, 1E-8);
    }

    #[test]
    fn active_bound_stops_search() {
        let opt = Optimization::new(Method::Lbfgsb, vec![Bounds::at_least(2.0), Bounds::free()], true).unwrap();
        let res = opt
            .optimize(
                &DVector::from_column_slice(&[4.0, 4.0]),
                |x| x[0] * x[0] + (x[1] + 1.0).powi(2),
                |x| DVector::from_column_slice(&[2.0 * x[0], 2.0 * (x[1] + 1.0)]),
            )
            .unwrap();
        assert::close(res.solution[0], 2.0, 1E-10);
        assert::close(res.solution[1], -1.0, 1E-5);
        assert!(res.converged);
    }

    #[test]
    fn rejects_wrong_start_length() {
        let opt = Optimization::new(Method::Lbfgsb, vec![Bounds::free()], true).unwrap();
        let res = opt.optimize(&DVector::zeros(2), |_| 0.0, |x| x.clone());
        assert_eq!(res, Err(OptimizeError::DimensionMismatch { expected: 1, given: 2 }));
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert!(Optimization::new(Method::Lbfgsb, vec![Bounds::interval(1.0, 0.0)], true).is_err());
    }

    #[test]
    fn projection_clamps() {
        let b = Bounds::interval(0.0, 1.0);
        assert_eq!(b.project(-1.0), 0.0);
        assert_eq!(b.project(2.0), 1.0);
        assert_eq!(b.project(0.5), 0.5);
        assert!(Bounds::free().contains(1E300));
    }
}
