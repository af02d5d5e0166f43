use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use super::GpError;

/// Model of noise to use in Gaussian Process
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum NoiseModel {
    /// The same noise variance is applied to all values
    Uniform(f64),
    /// Different noise variances are applied to each y-value
    PerPoint(DVector<f64>),
}

impl NoiseModel {
    /// Noise model of a fitted process: the learned homoscedastic variance,
    /// plus the known per-point variances when there are some.
    pub fn new(var_noise: f64, per_point: Option<&DVector<f64>>) -> Self {
        match per_point {
            Some(extra) => NoiseModel::PerPoint(extra.add_scalar(var_noise)),
            None => NoiseModel::Uniform(var_noise),
        }
    }

    /// Enact the given noise model onto the given covariance matrix
    pub fn add_noise_to_kernel(
        &self,
        cov: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, GpError> {
        let mut noisy = cov.clone();
        match self {
            NoiseModel::Uniform(noise) => {
                noisy.set_diagonal(&(cov.diagonal().add_scalar(*noise)));
                Ok(noisy)
            }
            NoiseModel::PerPoint(sigma) => {
                if cov.nrows() == sigma.nrows() {
                    noisy.set_diagonal(&(cov.diagonal() + sigma));
                    Ok(noisy)
                } else {
                    Err(GpError::DimensionMismatch {
                        name: "var_noise".to_string(),
                        expected: cov.nrows(),
                        given: sigma.nrows(),
                    })
                }
            }
        }
    }
}
