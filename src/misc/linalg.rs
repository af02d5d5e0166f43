use log::warn;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};
use std::fmt;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::SMALLEST_POSITIVE_NUMBER;

#[inline]
pub fn outer_product_self(col: &DVector<f64>) -> DMatrix<f64> {
    col * col.transpose()
}

/// Mean and (population) variance of the entries of `x`
pub fn mean_and_variance(x: &DVector<f64>) -> (f64, f64) {
    if x.is_empty() {
        return (0.0, 0.0);
    }
    let n = x.len() as f64;
    let mean = x.sum() / n;
    let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var)
}

/// Controls the jitter added to a covariance matrix that is not numerically
/// positive-definite.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct JitterParams {
    /// Number of retries after the first failed factorization
    pub max_tries: usize,
    /// First jitter, relative to the mean of the diagonal
    pub relative_start: f64,
    /// Factor applied to the jitter on each retry
    pub growth: f64,
}

impl Default for JitterParams {
    fn default() -> Self {
        Self {
            max_tries: 5,
            relative_start: 1E-6,
            growth: 10.0,
        }
    }
}

/// The covariance matrix could not be factorized even with jitter
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct NumericalError {
    /// Size of the matrix
    pub n: usize,
    /// Largest jitter tried
    pub last_jitter: f64,
}

impl std::error::Error for NumericalError {}

impl fmt::Display for NumericalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{0}x{0} covariance matrix is not positive-definite, even with jitter {1}",
            self.n, self.last_jitter
        )
    }
}

/// Cholesky decomposition of `cov`, adding increasing jitter to the diagonal
/// when the matrix is not numerically positive-definite.
///
/// Returns the factor together with the jitter that was added (0 when none
/// was needed).
pub fn cholesky_with_jitter(
    cov: DMatrix<f64>,
    params: &JitterParams,
) -> Result<(Cholesky<f64, Dyn>, f64), NumericalError> {
    let n = cov.nrows();
    if let Some(chol) = Cholesky::new(cov.clone()) {
        return Ok((chol, 0.0));
    }

    let mean_diag = if n == 0 { 0.0 } else { cov.diagonal().mean() };
    let mut jitter = (params.relative_start * mean_diag.abs()).max(SMALLEST_POSITIVE_NUMBER);
    for _ in 0..params.max_tries {
        if !jitter.is_finite() {
            break;
        }
        let mut jittered = cov.clone();
        jittered.iter_mut().step_by(n + 1).for_each(|x| *x += jitter);
        if let Some(chol) = Cholesky::new(jittered) {
            warn!("added jitter {} to the diagonal of a {}x{} covariance", jitter, n, n);
            return Ok((chol, jitter));
        }
        jitter *= params.growth;
    }

    Err(NumericalError {
        n,
        last_jitter: jitter / params.growth,
    })
}
