//! Input domains: random points and grid discretizations
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use itertools::Itertools;
use log::info;
use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

/// Domain of one input column
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum BoundsDomain {
    /// Closed interval `[lower, upper]`
    Interval { lower: f64, upper: f64 },
    /// Finite set of admissible values (e.g. task indices)
    Finite(Vec<f64>),
}

impl BoundsDomain {
    /// `0` for an interval, `1` for a finite set
    pub fn type_bounds(&self) -> u8 {
        match self {
            Self::Interval { .. } => 0,
            Self::Finite(_) => 1,
        }
    }

    /// Bounds written as a list: `[lower, upper]` or the finite values
    pub fn as_list(&self) -> Vec<f64> {
        match self {
            Self::Interval { lower, upper } => vec![*lower, *upper],
            Self::Finite(values) => values.clone(),
        }
    }

    /// Smallest and largest admissible values
    pub fn extent(&self) -> Option<(f64, f64)> {
        match self {
            Self::Interval { lower, upper } => Some((*lower, *upper)),
            Self::Finite(values) => values.iter().copied().minmax().into_option(),
        }
    }

    fn validate(&self, index: usize) -> Result<(), DomainError> {
        match self {
            Self::Interval { lower, upper }
                if lower.is_nan() || upper.is_nan() || lower > upper =>
            {
                Err(DomainError::InvalidInterval {
                    index,
                    lower: *lower,
                    upper: *upper,
                })
            }
            Self::Finite(values) if values.is_empty() => {
                Err(DomainError::EmptyFiniteSet { index })
            }
            _ => Ok(()),
        }
    }
}

/// Errors from the domain service
#[derive(Clone, Debug, PartialEq)]
pub enum DomainError {
    /// `lower > upper` (or one of them is NaN)
    InvalidInterval { index: usize, lower: f64, upper: f64 },
    /// A finite domain without values
    EmptyFiniteSet { index: usize },
    /// One entry of points-per-dimension is needed for each bound
    DimensionMismatch { expected: usize, given: usize },
    /// Reading or writing the discretization file failed
    Io(String),
    /// The discretization file is not valid JSON
    Json(String),
}

impl std::error::Error for DomainError {}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval {
                index,
                lower,
                upper,
            } => write!(
                f,
                "bounds {} are inverted: lower = {}, upper = {}",
                index, lower, upper
            ),
            Self::EmptyFiniteSet { index } => {
                write!(f, "finite domain {} has no values", index)
            }
            Self::DimensionMismatch { expected, given } => write!(
                f,
                "expected {} entries of points per dimension, got {}",
                expected, given
            ),
            Self::Io(msg) => write!(f, "io error: {}", msg),
            Self::Json(msg) => write!(f, "json error: {}", msg),
        }
    }
}

/// `n` random points of the domain, one per row.
///
/// Interval columns are drawn uniformly, finite columns by uniform choice.
pub fn get_points_domain<R: Rng>(
    n: usize,
    bounds: &[BoundsDomain],
    rng: &mut R,
) -> Result<DMatrix<f64>, DomainError> {
    for (index, b) in bounds.iter().enumerate() {
        b.validate(index)?;
    }

    let mut points = DMatrix::zeros(n, bounds.len());
    for (j, b) in bounds.iter().enumerate() {
        for i in 0..n {
            points[(i, j)] = match b {
                BoundsDomain::Interval { lower, upper } if lower < upper => {
                    rng.gen_range(*lower..*upper)
                }
                BoundsDomain::Interval { lower, .. } => *lower,
                BoundsDomain::Finite(values) => {
                    *values.choose(rng).ok_or(DomainError::EmptyFiniteSet { index: j })?
                }
            };
        }
    }
    Ok(points)
}

fn linspace(lower: f64, upper: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![lower],
        _ => {
            let step = (upper - lower) / (n - 1) as f64;
            (0..n).map(|i| step.mul_add(i as f64, lower)).collect()
        }
    }
}

/// Grid over the domain: `points_per_dimension[j]` evenly spaced values on
/// each interval column, every value of each finite column. Rows are in
/// lexicographic order of the column values.
pub fn discretize_domain(
    bounds: &[BoundsDomain],
    points_per_dimension: &[usize],
) -> Result<DMatrix<f64>, DomainError> {
    if bounds.len() != points_per_dimension.len() {
        return Err(DomainError::DimensionMismatch {
            expected: bounds.len(),
            given: points_per_dimension.len(),
        });
    }
    for (index, b) in bounds.iter().enumerate() {
        b.validate(index)?;
    }

    let axes: Vec<Vec<f64>> = bounds
        .iter()
        .zip(points_per_dimension.iter())
        .map(|(b, &n)| match b {
            BoundsDomain::Interval { lower, upper } => linspace(*lower, *upper, n),
            BoundsDomain::Finite(values) => values.clone(),
        })
        .collect();

    let rows: Vec<Vec<f64>> = axes.into_iter().multi_cartesian_product().collect();
    let d = bounds.len();
    if d == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    Ok(DMatrix::from_fn(rows.len(), d, |i, j| rows[i][j]))
}

/// File name under which a discretization is cached
pub fn discretization_filename(bounds: &[BoundsDomain], points_per_dimension: &[usize]) -> String {
    let bounds: Vec<Vec<f64>> = bounds.iter().map(BoundsDomain::as_list).collect();
    format!(
        "discretization_domain_x_bounds_{:?}_number_points_{:?}.json",
        bounds, points_per_dimension
    )
}

/// Discretization of the domain, read from
/// `<dir>/<problem_name>/domain/<file>` when present and otherwise computed
/// and written there.
#[cfg(feature = "serde1")]
pub fn load_discretization<P: AsRef<std::path::Path>>(
    dir: P,
    problem_name: &str,
    bounds: &[BoundsDomain],
    points_per_dimension: &[usize],
) -> Result<DMatrix<f64>, DomainError> {
    let domain_dir = dir.as_ref().join(problem_name).join("domain");
    let path = domain_dir.join(discretization_filename(bounds, points_per_dimension));

    if path.exists() {
        let text = std::fs::read_to_string(&path).map_err(|e| DomainError::Io(e.to_string()))?;
        let rows: Vec<Vec<f64>> =
            serde_json::from_str(&text).map_err(|e| DomainError::Json(e.to_string()))?;
        let d = rows.first().map_or(bounds.len(), Vec::len);
        if rows.iter().any(|r| r.len() != d) {
            return Err(DomainError::Json("rows of different lengths".to_string()));
        }
        return Ok(DMatrix::from_fn(rows.len(), d, |i, j| rows[i][j]));
    }

    info!("generating discretization of the domain for {}", problem_name);
    let grid = discretize_domain(bounds, points_per_dimension)?;
    let rows: Vec<Vec<f64>> = grid.row_iter().map(|r| r.iter().copied().collect()).collect();

    std::fs::create_dir_all(&domain_dir).map_err(|e| DomainError::Io(e.to_string()))?;
    let text = serde_json::to_string(&rows).map_err(|e| DomainError::Json(e.to_string()))?;
    std::fs::write(&path, text).map_err(|e| DomainError::Io(e.to_string()))?;
    Ok(grid)
}
