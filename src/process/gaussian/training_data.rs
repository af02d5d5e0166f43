#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use nalgebra::{DMatrix, DVector};

use super::GpError;

/// Observations of the objective: one point per row, its evaluation, and
/// optionally the known noise variance of each evaluation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct TrainingData {
    points: DMatrix<f64>,
    evaluations: DVector<f64>,
    var_noise: Option<DVector<f64>>,
}

impl TrainingData {
    /// # Arguments
    /// * `points` - n × d matrix, one point per row
    /// * `evaluations` - n evaluations
    /// * `var_noise` - n noise variances, for noisy evaluations
    pub fn new(
        points: DMatrix<f64>,
        evaluations: DVector<f64>,
        var_noise: Option<DVector<f64>>,
    ) -> Result<Self, GpError> {
        Self::check(&points, &evaluations, var_noise.as_ref())?;
        Ok(Self {
            points,
            evaluations,
            var_noise,
        })
    }

    /// No observations over a `dim`-dimensional input
    pub fn empty(dim: usize, noisy: bool) -> Self {
        Self {
            points: DMatrix::zeros(0, dim),
            evaluations: DVector::zeros(0),
            var_noise: noisy.then(|| DVector::zeros(0)),
        }
    }

    fn check(
        points: &DMatrix<f64>,
        evaluations: &DVector<f64>,
        var_noise: Option<&DVector<f64>>,
    ) -> Result<(), GpError> {
        if points.nrows() != evaluations.len() {
            return Err(GpError::DimensionMismatch {
                name: "evaluations".to_string(),
                expected: points.nrows(),
                given: evaluations.len(),
            });
        }
        match var_noise {
            Some(v) if v.len() != evaluations.len() => Err(GpError::DimensionMismatch {
                name: "var_noise".to_string(),
                expected: evaluations.len(),
                given: v.len(),
            }),
            _ => Ok(()),
        }
    }

    #[inline]
    pub fn points(&self) -> &DMatrix<f64> {
        &self.points
    }

    #[inline]
    pub fn evaluations(&self) -> &DVector<f64> {
        &self.evaluations
    }

    #[inline]
    pub fn var_noise(&self) -> Option<&DVector<f64>> {
        self.var_noise.as_ref()
    }

    /// Number of observations
    #[inline]
    pub fn n(&self) -> usize {
        self.evaluations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n() == 0
    }

    /// Dimension of the points
    #[inline]
    pub fn dim(&self) -> usize {
        self.points.ncols()
    }

    /// Whether evaluations come with known noise variances
    #[inline]
    pub fn is_noisy(&self) -> bool {
        self.var_noise.is_some()
    }

    /// Append observations.
    ///
    /// The new points must have the same dimension, and noise variances must
    /// be given exactly when the existing data has them.
    pub fn append(
        &mut self,
        points: &DMatrix<f64>,
        evaluations: &DVector<f64>,
        var_noise: Option<&DVector<f64>>,
    ) -> Result<(), GpError> {
        Self::check(points, evaluations, var_noise)?;
        if points.ncols() != self.dim() {
            return Err(GpError::DimensionMismatch {
                name: "points".to_string(),
                expected: self.dim(),
                given: points.ncols(),
            });
        }
        if var_noise.is_some() != self.is_noisy() {
            return Err(GpError::NoiseMismatch {
                noisy_data: self.is_noisy(),
            });
        }

        let n = self.n();
        let m = points.nrows();
        let old_points = std::mem::replace(&mut self.points, DMatrix::zeros(0, 0));
        let mut new_points = old_points.resize_vertically(n + m, 0.0);
        new_points.rows_mut(n, m).copy_from(points);
        self.points = new_points;

        self.evaluations = DVector::from_iterator(
            n + m,
            self.evaluations.iter().chain(evaluations.iter()).copied(),
        );
        if let (Some(current), Some(extra)) = (self.var_noise.as_mut(), var_noise) {
            *current = DVector::from_iterator(n + m, current.iter().chain(extra.iter()).copied());
        }
        Ok(())
    }
}
