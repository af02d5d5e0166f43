#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use nalgebra::DMatrix;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Derivatives of a covariance matrix, one `n × n` slice per kernel
/// parameter in parameter order
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct CovGrad {
    slices: Vec<DMatrix<f64>>,
}

impl CovGrad {
    /// Gradient made of `slices`, which must share one shape
    pub fn new(slices: &[DMatrix<f64>]) -> Result<Self, CovGradError> {
        let first = slices.first().ok_or(CovGradError::Empty)?;
        if slices.iter().all(|s| s.shape() == first.shape()) {
            Ok(Self {
                slices: slices.to_vec(),
            })
        } else {
            Err(CovGradError::ShapeMismatch(
                slices.iter().map(DMatrix::shape).collect(),
            ))
        }
    }

    /// `m` zero slices of size `n × n`
    #[must_use]
    pub fn zeros(n: usize, m: usize) -> Self {
        Self {
            slices: vec![DMatrix::zeros(n, n); m],
        }
    }

    /// Multiply every slice elementwise by `other`
    pub fn component_mul(&self, other: &DMatrix<f64>) -> Result<Self, CovGradError> {
        match self.slices.iter().find(|s| s.shape() != other.shape()) {
            Some(s) => Err(CovGradError::ShapeMismatch(vec![s.shape(), other.shape()])),
            None => Ok(Self {
                slices: self.slices.iter().map(|s| s.component_mul(other)).collect(),
            }),
        }
    }

    /// Multiply every slice by `factor`
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            slices: self.slices.iter().map(|s| s * factor).collect(),
        }
    }

    /// Slices of `self` followed by those of `other`
    pub fn chain(&self, other: &Self) -> Result<Self, CovGradError> {
        match (self.slices.first(), other.slices.first()) {
            (Some(a), Some(b)) if a.shape() != b.shape() => {
                Err(CovGradError::ShapeMismatch(vec![a.shape(), b.shape()]))
            }
            _ => Ok(Self {
                slices: self.slices.iter().chain(other.slices.iter()).cloned().collect(),
            }),
        }
    }

    /// Number of slices
    #[must_use]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DMatrix<f64>> {
        self.slices.iter()
    }
}

impl Index<usize> for CovGrad {
    type Output = DMatrix<f64>;

    fn index(&self, k: usize) -> &Self::Output {
        &self.slices[k]
    }
}

/// Entry `(i, j)` of slice `k`
impl Index<(usize, usize, usize)> for CovGrad {
    type Output = f64;

    fn index(&self, (i, j, k): (usize, usize, usize)) -> &Self::Output {
        &self.slices[k][(i, j)]
    }
}

impl IndexMut<(usize, usize, usize)> for CovGrad {
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut Self::Output {
        &mut self.slices[k][(i, j)]
    }
}

/// Error from building a [`CovGrad`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum CovGradError {
    /// Slices of different shapes
    ShapeMismatch(Vec<(usize, usize)>),
    /// No slices
    Empty,
}

impl std::error::Error for CovGradError {}

impl fmt::Display for CovGradError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch(shapes) => {
                write!(f, "covariance gradient slices have different shapes: {:?}", shapes)
            }
            Self::Empty => write!(f, "covariance gradient without slices"),
        }
    }
}
