use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Normal};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use super::kernel::Kernel;
use super::{GpError, GpFittingGaussian};

/// Posterior of the process at a set of points
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Posterior {
    /// Posterior mean at each point
    pub mean: DVector<f64>,
    /// Posterior covariance between the points, unless only the mean was
    /// requested
    pub cov: Option<DMatrix<f64>>,
}

/// Gradient of the posterior mean and variance at one point
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct PosteriorGradient {
    pub mean: DVector<f64>,
    pub var: DVector<f64>,
}

impl GpFittingGaussian {
    /// Posterior at the rows of `points` with the current hyperparameters
    ///
    /// # Arguments
    /// * `points` - One point per row
    /// * `only_mean` - Skip the covariance
    /// * `cache` - Use and fill the factorization caches
    pub fn compute_posterior_parameters(
        &self,
        points: &DMatrix<f64>,
        only_mean: bool,
        cache: bool,
    ) -> Result<Posterior, GpError> {
        self.compute_posterior_parameters_with(
            points,
            self.var_noise(),
            self.mean(),
            self.kernel_values().as_slice(),
            only_mean,
            cache,
        )
    }

    /// Posterior at the rows of `points` with explicit hyperparameters
    pub fn compute_posterior_parameters_with(
        &self,
        points: &DMatrix<f64>,
        var_noise: f64,
        mean: f64,
        kernel_params: &[f64],
        only_mean: bool,
        cache: bool,
    ) -> Result<Posterior, GpError> {
        if points.ncols() != self.dim() {
            return Err(GpError::DimensionMismatch {
                name: "points".to_string(),
                expected: self.dim(),
                given: points.ncols(),
            });
        }
        let kernel = self.kernel().reparameterize(kernel_params)?;
        let m = points.nrows();

        if self.data().is_empty() {
            return Ok(Posterior {
                mean: DVector::from_element(m, mean),
                cov: (!only_mean).then(|| kernel.covariance(points, points)),
            });
        }

        let (chol, alpha) =
            self.cholesky_solve_vectors_for_posterior(var_noise, mean, kernel_params, cache)?;
        let k_trans = kernel.covariance(points, self.data().points());
        let post_mean = (&k_trans * alpha.as_ref()).add_scalar(mean);

        let cov = if only_mean {
            None
        } else {
            let v = chol.solve(&k_trans.transpose());
            let cov = kernel.covariance(points, points) - &k_trans * v;
            Some((&cov + cov.transpose()) * 0.5)
        };

        Ok(Posterior {
            mean: post_mean,
            cov,
        })
    }

    /// Gradient of the posterior mean and variance with respect to `point`,
    /// with the current hyperparameters.
    pub fn gradient_posterior_parameters(
        &self,
        point: &DVector<f64>,
    ) -> Result<PosteriorGradient, GpError> {
        let d = self.dim();
        if point.len() != d {
            return Err(GpError::DimensionMismatch {
                name: "point".to_string(),
                expected: d,
                given: point.len(),
            });
        }
        if self.data().is_empty() {
            return Ok(PosteriorGradient {
                mean: DVector::zeros(d),
                var: DVector::zeros(d),
            });
        }

        let kernel_params = self.kernel_values();
        let (chol, alpha) = self.cholesky_solve_vectors_for_posterior(
            self.var_noise(),
            self.mean(),
            kernel_params.as_slice(),
            true,
        )?;
        let row = DMatrix::from_row_slice(1, d, point.as_slice());
        let points = self.data().points();

        // n × d
        let grad_k = self.kernel().gradient_respect_point(&row, points);
        let k_star = self.kernel().covariance(points, &row).column(0).clone_owned();

        let grad_mean = grad_k.transpose() * alpha.as_ref();
        let grad_var = grad_k.transpose() * chol.solve(&k_star) * -2.0;
        Ok(PosteriorGradient {
            mean: grad_mean,
            var: grad_var,
        })
    }

    /// Best value observed so far.
    ///
    /// With noisy evaluations, the largest posterior mean over the training
    /// points; otherwise the largest evaluation.
    pub fn get_historical_best_solution(&self, noisy_evaluations: bool) -> Result<f64, GpError> {
        if self.data().is_empty() {
            return Err(GpError::NoData);
        }
        let values = if noisy_evaluations {
            self.compute_posterior_parameters(self.data().points(), true, true)?
                .mean
        } else {
            self.data().evaluations().clone()
        };
        Ok(values.max())
    }

    /// `n` draws of the latent function at one point from its posterior
    pub fn sample_new_observations<R: Rng>(
        &self,
        point: &DVector<f64>,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>, GpError> {
        let row = DMatrix::from_row_slice(1, point.len(), point.as_slice());
        let posterior = self.compute_posterior_parameters(&row, false, true)?;
        let var = posterior.cov.map_or(0.0, |c| c[(0, 0)].max(0.0));
        let normal = Normal::new(posterior.mean[0], var.sqrt()).map_err(|_| GpError::NotFinite {
            name: "posterior variance".to_string(),
            value: var,
        })?;
        Ok((0..n).map(|_| normal.sample(rng)).collect())
    }
}
