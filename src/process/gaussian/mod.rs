//! Gaussian Processes
//!
//! [`GpFittingGaussian`] regresses noisy scalar observations with a
//! Gaussian process whose hyperparameters are the noise variance, a
//! constant mean and the kernel's parameters. They are stored flat, in the
//! order `[var_noise, mean, kernel...]`, which is the order used by every
//! method taking or returning a parameter vector.
//!
//! The Cholesky factor of the training covariance and the solved residual
//! `K⁻¹(y - mean)` are memoized in single entry caches keyed by the exact
//! hyperparameter values they were computed with.
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::domain::BoundsDomain;
use crate::misc::{
    cholesky_with_jitter, outer_product_self, CacheKey, JitterParams, NumericalError,
    SingleEntryCache,
};
use crate::optimize::{Bounds, LbfgsbParams, OptimizeError};
use crate::process::RandomProcess;

pub mod kernel;
use kernel::{CovGradError, Kernel, KernelError, KernelSpec, KernelType};

pub mod parameter;
use parameter::Parameter;

mod noise_model;
pub use noise_model::NoiseModel;

mod sampler;
pub use sampler::{SliceError, SliceSampler, SliceSamplerParams};

mod training_data;
pub use training_data::TrainingData;

mod inference;
pub use inference::MleResult;

mod posterior;
pub use posterior::{Posterior, PosteriorGradient};

pub mod validation;

#[cfg(feature = "serde1")]
pub mod record;

/// Name under which the model is persisted
pub const NAME_MODEL: &str = "gp_fitting_gaussian";

/// Errors from fitting or querying a Gaussian process
#[derive(Clone, Debug, PartialEq)]
pub enum GpError {
    /// An input does not have the expected size
    DimensionMismatch {
        /// What was mis-sized
        name: String,
        expected: usize,
        given: usize,
    },
    /// Noise variances were (not) given for data that has (no) noise
    NoiseMismatch { noisy_data: bool },
    /// The covariance could not be factorized
    Numerical(NumericalError),
    /// The kernel rejected its parameters
    Kernel(KernelError),
    /// Maximum likelihood optimization failed
    Optimize(OptimizeError),
    /// The hyperparameter sampler failed
    Sampler(SliceError),
    /// The operation needs at least one observation
    NoData,
    /// A quantity that must be finite is not
    NotFinite { name: String, value: f64 },
}

impl std::error::Error for GpError {}

impl fmt::Display for GpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch {
                name,
                expected,
                given,
            } => write!(
                f,
                "{} has size {} but {} was expected",
                name, given, expected
            ),
            Self::NoiseMismatch { noisy_data } => {
                if *noisy_data {
                    write!(f, "noise variances are required for noisy data")
                } else {
                    write!(f, "noise variances were given for noiseless data")
                }
            }
            Self::Numerical(e) => write!(f, "numerical error: {}", e),
            Self::Kernel(e) => write!(f, "kernel error: {}", e),
            Self::Optimize(e) => write!(f, "optimization failed: {}", e),
            Self::Sampler(e) => write!(f, "sampling failed: {}", e),
            Self::NoData => write!(f, "no training data"),
            Self::NotFinite { name, value } => write!(f, "{} is not finite: {}", name, value),
        }
    }
}

impl From<NumericalError> for GpError {
    fn from(e: NumericalError) -> Self {
        Self::Numerical(e)
    }
}

impl From<KernelError> for GpError {
    fn from(e: KernelError) -> Self {
        Self::Kernel(e)
    }
}

impl From<CovGradError> for GpError {
    fn from(e: CovGradError) -> Self {
        Self::Kernel(e.into())
    }
}

impl From<OptimizeError> for GpError {
    fn from(e: OptimizeError) -> Self {
        Self::Optimize(e)
    }
}

impl From<SliceError> for GpError {
    fn from(e: SliceError) -> Self {
        Self::Sampler(e)
    }
}

/// Parameters for fitting a Gaussian process
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct GpParams {
    /// Slice sampler for the hyperparameter posterior
    pub sampler: SliceSamplerParams,
    /// Jitter added when the covariance is not positive-definite
    pub jitter: JitterParams,
    /// Optimizer for maximum likelihood
    pub optimizer: LbfgsbParams,
    /// Retries after a non-finite log-likelihood gradient
    pub max_perturbations: usize,
    /// Domain of the inputs
    pub bounds_domain: Vec<BoundsDomain>,
    pub problem_name: String,
    pub training_name: String,
    /// Initial kernel parameters, instead of the data driven defaults
    pub kernel_values: Option<Vec<f64>>,
    /// Initial mean, instead of the mean of the evaluations
    pub mean_value: Option<f64>,
    /// Initial noise variance, instead of the variance of the evaluations
    pub var_noise_value: Option<f64>,
}

impl Default for GpParams {
    fn default() -> Self {
        Self {
            sampler: SliceSamplerParams::default(),
            jitter: JitterParams::default(),
            optimizer: LbfgsbParams::default(),
            max_perturbations: 10,
            bounds_domain: Vec::new(),
            problem_name: String::new(),
            training_name: String::new(),
            kernel_values: None,
            mean_value: None,
            var_noise_value: None,
        }
    }
}

impl GpParams {
    pub fn with_sampler(self, sampler: SliceSamplerParams) -> Self {
        Self { sampler, ..self }
    }

    pub fn with_jitter(self, jitter: JitterParams) -> Self {
        Self { jitter, ..self }
    }

    pub fn with_optimizer(self, optimizer: LbfgsbParams) -> Self {
        Self { optimizer, ..self }
    }

    pub fn with_max_perturbations(self, max_perturbations: usize) -> Self {
        Self {
            max_perturbations,
            ..self
        }
    }

    pub fn with_bounds_domain(self, bounds_domain: Vec<BoundsDomain>) -> Self {
        Self {
            bounds_domain,
            ..self
        }
    }

    pub fn with_problem_name(self, problem_name: impl Into<String>) -> Self {
        Self {
            problem_name: problem_name.into(),
            ..self
        }
    }

    pub fn with_training_name(self, training_name: impl Into<String>) -> Self {
        Self {
            training_name: training_name.into(),
            ..self
        }
    }

    pub fn with_kernel_values(self, kernel_values: Vec<f64>) -> Self {
        Self {
            kernel_values: Some(kernel_values),
            ..self
        }
    }

    pub fn with_mean_value(self, mean_value: f64) -> Self {
        Self {
            mean_value: Some(mean_value),
            ..self
        }
    }

    pub fn with_var_noise_value(self, var_noise_value: f64) -> Self {
        Self {
            var_noise_value: Some(var_noise_value),
            ..self
        }
    }
}

/// Gradient of the log-likelihood, split by hyperparameter
#[derive(Clone, Debug, PartialEq)]
pub struct LogLikelihoodGradient {
    pub var_noise: f64,
    pub mean: f64,
    pub kernel_params: DVector<f64>,
}

impl LogLikelihoodGradient {
    /// Flat gradient, ordered `[var_noise, mean, kernel...]`
    pub fn to_vector(&self) -> DVector<f64> {
        let n = self.kernel_params.len() + 2;
        DVector::from_iterator(
            n,
            [self.var_noise, self.mean]
                .into_iter()
                .chain(self.kernel_params.iter().copied()),
        )
    }
}

/// Gaussian process regression model
#[derive(Clone, Debug)]
pub struct GpFittingGaussian {
    spec: KernelSpec,
    kernel: KernelType,
    /// Data the model was built with
    training_data: TrainingData,
    /// Data including every point added since
    data: TrainingData,
    var_noise: Parameter,
    mean: Parameter,
    kernel_params: Vec<Parameter>,
    params: GpParams,
    start_point_sampler: DVector<f64>,
    samples_parameters: Vec<DVector<f64>>,
    chol_cache: SingleEntryCache<Arc<Cholesky<f64, Dyn>>>,
    solve_cache: SingleEntryCache<Arc<DVector<f64>>>,
    n_factorizations: Cell<usize>,
}

impl GpFittingGaussian {
    /// Build a Gaussian process over `training_data`.
    ///
    /// Hyperparameters start at data driven defaults (see
    /// [`Kernel::hyperparameters`]) unless `params` overrides them.
    ///
    /// # Arguments
    /// * `spec` - Kernel names and dimensions
    /// * `training_data` - Observations; may be empty
    /// * `params` - Sampler, optimizer and initial values
    pub fn new(
        spec: KernelSpec,
        training_data: TrainingData,
        params: GpParams,
    ) -> Result<Self, GpError> {
        let kernel = KernelType::from_spec(&spec)?;
        if training_data.dim() != kernel.input_dim() {
            return Err(GpError::DimensionMismatch {
                name: "points".to_string(),
                expected: kernel.input_dim(),
                given: training_data.dim(),
            });
        }

        let points = training_data.points();
        let evaluations = training_data.evaluations();
        let mut var_noise = Parameter::noise_variance(evaluations);
        let mut mean = Parameter::mean(evaluations);
        let mut kernel_params = kernel.hyperparameters(points, evaluations);

        if let Some(value) = params.var_noise_value {
            var_noise.set_value(&[value]);
        }
        if let Some(value) = params.mean_value {
            mean.set_value(&[value]);
        }
        if let Some(values) = &params.kernel_values {
            if values.len() != kernel.n_parameters() {
                return Err(GpError::DimensionMismatch {
                    name: "kernel_values".to_string(),
                    expected: kernel.n_parameters(),
                    given: values.len(),
                });
            }
            distribute(&mut kernel_params, values);
        }

        let kernel_values: Vec<f64> = flatten(&kernel_params);
        let kernel = kernel.reparameterize(&kernel_values)?;

        let mut gp = Self {
            spec,
            kernel,
            data: training_data.clone(),
            training_data,
            var_noise,
            mean,
            kernel_params,
            params,
            start_point_sampler: DVector::zeros(0),
            samples_parameters: Vec::new(),
            chol_cache: SingleEntryCache::new(),
            solve_cache: SingleEntryCache::new(),
            n_factorizations: Cell::new(0),
        };
        gp.start_point_sampler = gp.value_parameters();
        Ok(gp)
    }

    #[inline]
    pub fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    #[inline]
    pub fn kernel(&self) -> &KernelType {
        &self.kernel
    }

    /// Data the model was built with
    #[inline]
    pub fn training_data(&self) -> &TrainingData {
        &self.training_data
    }

    /// Current data, including added points
    #[inline]
    pub fn data(&self) -> &TrainingData {
        &self.data
    }

    #[inline]
    pub fn params(&self) -> &GpParams {
        &self.params
    }

    #[inline]
    pub fn bounds_domain(&self) -> &[BoundsDomain] {
        &self.params.bounds_domain
    }

    /// Input dimension
    #[inline]
    pub fn dim(&self) -> usize {
        self.kernel.input_dim()
    }

    /// Every hyperparameter: noise variance, mean, then the kernel's
    pub fn parameters_model(&self) -> Vec<&Parameter> {
        [&self.var_noise, &self.mean]
            .into_iter()
            .chain(self.kernel_params.iter())
            .collect()
    }

    /// Current hyperparameter values, `[var_noise, mean, kernel...]`
    pub fn value_parameters(&self) -> DVector<f64> {
        let values: Vec<f64> = self
            .parameters_model()
            .into_iter()
            .flat_map(|p| p.value().iter().copied())
            .collect();
        DVector::from_vec(values)
    }

    /// Number of scalar hyperparameters
    pub fn dimension_parameters(&self) -> usize {
        2 + self.kernel.n_parameters()
    }

    /// Box constraints on the hyperparameters, in parameter order
    pub fn bounds_parameters(&self) -> Vec<Bounds> {
        self.parameters_model()
            .into_iter()
            .flat_map(|p| p.bounds().iter().copied())
            .collect()
    }

    #[inline]
    pub fn var_noise(&self) -> f64 {
        self.var_noise.value()[0]
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean.value()[0]
    }

    /// Current kernel parameters
    #[inline]
    pub fn kernel_values(&self) -> DVector<f64> {
        self.kernel.parameters()
    }

    /// Point the posterior sampler starts from when it has no samples yet
    #[inline]
    pub fn start_point_sampler(&self) -> &DVector<f64> {
        &self.start_point_sampler
    }

    /// Posterior samples drawn so far
    #[inline]
    pub fn samples_parameters(&self) -> &[DVector<f64>] {
        &self.samples_parameters
    }

    /// Number of Cholesky factorizations computed so far
    #[inline]
    pub fn n_factorizations(&self) -> usize {
        self.n_factorizations.get()
    }

    /// Set every hyperparameter from a flat vector
    pub fn set_value_parameters(&mut self, values: &[f64]) -> Result<(), GpError> {
        let (var_noise, mean, kernel_values) = self.split_parameters(values)?;
        let kernel = self.kernel.reparameterize(kernel_values)?;
        distribute(&mut self.kernel_params, kernel_values);
        self.kernel = kernel;
        self.var_noise.set_value(&[var_noise]);
        self.mean.set_value(&[mean]);
        Ok(())
    }

    /// Split a flat vector into noise variance, mean and kernel parameters
    pub fn split_parameters<'p>(
        &self,
        values: &'p [f64],
    ) -> Result<(f64, f64, &'p [f64]), GpError> {
        match values {
            [var_noise, mean, rest @ ..] if rest.len() == self.kernel.n_parameters() => {
                Ok((*var_noise, *mean, rest))
            }
            _ => Err(GpError::DimensionMismatch {
                name: "parameters".to_string(),
                expected: self.dimension_parameters(),
                given: values.len(),
            }),
        }
    }

    pub(crate) fn set_samples(&mut self, start: DVector<f64>, samples: Vec<DVector<f64>>) {
        self.start_point_sampler = start;
        self.samples_parameters = samples;
    }

    /// Add observations and drop the cached factorizations
    pub fn add_points_evaluations(
        &mut self,
        points: &DMatrix<f64>,
        evaluations: &DVector<f64>,
        var_noise: Option<&DVector<f64>>,
    ) -> Result<(), GpError> {
        self.data.append(points, evaluations, var_noise)?;
        self.clean_cache();
        Ok(())
    }

    /// Empty both caches
    pub fn clean_cache(&self) {
        self.chol_cache.clear();
        self.solve_cache.clear();
    }

    fn check_points(&self, points: &DMatrix<f64>, name: &str) -> Result<(), GpError> {
        if points.ncols() == self.dim() {
            Ok(())
        } else {
            Err(GpError::DimensionMismatch {
                name: name.to_string(),
                expected: self.dim(),
                given: points.ncols(),
            })
        }
    }

    /// Covariance between the rows of `points` with the given kernel
    /// parameters
    pub fn evaluate_cov(
        &self,
        points: &DMatrix<f64>,
        kernel_params: &[f64],
    ) -> Result<DMatrix<f64>, GpError> {
        self.check_points(points, "points")?;
        let kernel = self.kernel.reparameterize(kernel_params)?;
        Ok(kernel.covariance(points, points))
    }

    /// Covariance between the rows of `points_1` and those of `points_2`
    pub fn evaluate_cross_cov(
        &self,
        points_1: &DMatrix<f64>,
        points_2: &DMatrix<f64>,
        kernel_params: &[f64],
    ) -> Result<DMatrix<f64>, GpError> {
        self.check_points(points_1, "points_1")?;
        self.check_points(points_2, "points_2")?;
        let kernel = self.kernel.reparameterize(kernel_params)?;
        Ok(kernel.covariance(points_1, points_2))
    }

    /// Gradient of `k(point, points_j)` with respect to `point`, one row per
    /// row of `points`
    pub fn evaluate_grad_cross_cov_respect_point(
        &self,
        point: &DMatrix<f64>,
        points: &DMatrix<f64>,
        kernel_params: &[f64],
    ) -> Result<DMatrix<f64>, GpError> {
        self.check_points(point, "point")?;
        self.check_points(points, "points")?;
        let kernel = self.kernel.reparameterize(kernel_params)?;
        Ok(kernel.gradient_respect_point(point, points))
    }

    /// Hessian of `k(point, points_j)` with respect to `point`, one matrix
    /// per row of `points`
    pub fn evaluate_hessian_cross_cov_respect_point(
        &self,
        point: &DMatrix<f64>,
        points: &DMatrix<f64>,
        kernel_params: &[f64],
    ) -> Result<Vec<DMatrix<f64>>, GpError> {
        self.check_points(point, "point")?;
        self.check_points(points, "points")?;
        let kernel = self.kernel.reparameterize(kernel_params)?;
        Ok(kernel.hessian_respect_point(point, points))
    }

    /// Cholesky factor of the training covariance plus noise
    pub fn cholesky_cov(
        &self,
        var_noise: f64,
        kernel_params: &[f64],
        cache: bool,
    ) -> Result<Arc<Cholesky<f64, Dyn>>, GpError> {
        let key = CacheKey::new(std::iter::once(var_noise).chain(kernel_params.iter().copied()));
        if cache {
            if let Some(chol) = self.chol_cache.get(&key) {
                return Ok(chol);
            }
        }

        let kernel = self.kernel.reparameterize(kernel_params)?;
        let points = self.data.points();
        let cov = NoiseModel::new(var_noise, self.data.var_noise())
            .add_noise_to_kernel(&kernel.covariance(points, points))?;
        self.n_factorizations.set(self.n_factorizations.get() + 1);
        let (chol, _) = cholesky_with_jitter(cov, &self.params.jitter)?;
        let chol = Arc::new(chol);

        if cache {
            self.chol_cache.put(key, Arc::clone(&chol));
            self.solve_cache.clear();
        }
        Ok(chol)
    }

    /// Cholesky factor of the training covariance and `K⁻¹(y - mean)`
    pub fn cholesky_solve_vectors_for_posterior(
        &self,
        var_noise: f64,
        mean: f64,
        kernel_params: &[f64],
        cache: bool,
    ) -> Result<(Arc<Cholesky<f64, Dyn>>, Arc<DVector<f64>>), GpError> {
        let chol = self.cholesky_cov(var_noise, kernel_params, cache)?;

        let key = CacheKey::new(
            [var_noise, mean]
                .into_iter()
                .chain(kernel_params.iter().copied()),
        );
        if cache {
            if let Some(solve) = self.solve_cache.get(&key) {
                return Ok((chol, solve));
            }
        }

        let residual = self.data.evaluations().add_scalar(-mean);
        let solve = Arc::new(chol.solve(&residual));
        if cache {
            self.solve_cache.put(key, Arc::clone(&solve));
        }
        Ok((chol, solve))
    }

    /// Log marginal likelihood of the current data, up to the constant
    /// `-n/2 ln 2π`
    ///
    /// ```math
    ///     -\frac{1}{2} r^T K^{-1} r - \frac{1}{2} \ln |K|, \quad r = y - \mu
    /// ```
    pub fn log_likelihood(
        &self,
        var_noise: f64,
        mean: f64,
        kernel_params: &[f64],
    ) -> Result<f64, GpError> {
        if self.data.n() == 0 {
            return Ok(0.0);
        }
        let (chol, alpha) =
            self.cholesky_solve_vectors_for_posterior(var_noise, mean, kernel_params, true)?;
        let residual = self.data.evaluations().add_scalar(-mean);
        let half_ln_det: f64 = chol.l_dirty().diagonal().iter().map(|x| x.ln()).sum();
        Ok(-0.5 * residual.dot(&alpha) - half_ln_det)
    }

    /// Gradient of the log-likelihood with respect to every hyperparameter
    pub fn grad_log_likelihood_dict(
        &self,
        var_noise: f64,
        mean: f64,
        kernel_params: &[f64],
    ) -> Result<LogLikelihoodGradient, GpError> {
        let kernel = self.kernel.reparameterize(kernel_params)?;
        if self.data.is_empty() {
            return Ok(LogLikelihoodGradient {
                var_noise: 0.0,
                mean: 0.0,
                kernel_params: DVector::zeros(kernel.n_parameters()),
            });
        }

        let (_, cov_grad) = kernel.covariance_with_gradient(self.data.points())?;
        let (chol, alpha) =
            self.cholesky_solve_vectors_for_posterior(var_noise, mean, kernel_params, true)?;

        // GPML Equation 5.9
        let aat_kinv = outer_product_self(&alpha) - chol.inverse();
        let grad_kernel = DVector::from_iterator(
            cov_grad.len(),
            cov_grad.iter().map(|dk| 0.5 * aat_kinv.component_mul(dk).sum()),
        );

        Ok(LogLikelihoodGradient {
            var_noise: 0.5 * aat_kinv.trace(),
            mean: alpha.sum(),
            kernel_params: grad_kernel,
        })
    }

    /// Flat gradient of the log-likelihood, `[var_noise, mean, kernel...]`
    pub fn grad_log_likelihood(
        &self,
        var_noise: f64,
        mean: f64,
        kernel_params: &[f64],
    ) -> Result<DVector<f64>, GpError> {
        self.grad_log_likelihood_dict(var_noise, mean, kernel_params)
            .map(|g| g.to_vector())
    }

    /// Log-likelihood at a flat parameter vector; -∞ when it cannot be
    /// computed.
    pub fn objective_llh(&self, params: &DVector<f64>) -> f64 {
        let value = self
            .split_parameters(params.as_slice())
            .and_then(|(var_noise, mean, kernel)| self.log_likelihood(var_noise, mean, kernel));
        match value {
            Ok(v) if v.is_finite() => v,
            _ => f64::NEG_INFINITY,
        }
    }

    /// Flat gradient of the log-likelihood at a flat parameter vector
    pub fn grad_llh(&self, params: &DVector<f64>) -> Result<DVector<f64>, GpError> {
        let (var_noise, mean, kernel) = self.split_parameters(params.as_slice())?;
        self.grad_log_likelihood(var_noise, mean, kernel)
    }

    /// Log prior density of a flat parameter vector; -∞ outside the bounds
    pub fn ln_prior(&self, params: &DVector<f64>) -> f64 {
        if params.len() != self.dimension_parameters() {
            return f64::NEG_INFINITY;
        }
        let mut offset = 0;
        self.parameters_model()
            .into_iter()
            .map(|p| {
                let d = p.dimension();
                let lp = p.ln_prior(&params.as_slice()[offset..offset + d]);
                offset += d;
                lp
            })
            .sum()
    }

    /// Unnormalized log posterior of the hyperparameters
    pub fn log_prob_parameters(&self, params: &DVector<f64>) -> f64 {
        let lp = self.ln_prior(params);
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        lp + self.objective_llh(params)
    }
}

impl RandomProcess for GpFittingGaussian {
    type Error = GpError;

    fn ln_m(&self) -> Result<f64, GpError> {
        self.log_likelihood(self.var_noise(), self.mean(), self.kernel_values().as_slice())
    }

    fn ln_m_with_parameters(
        &self,
        parameters: &DVector<f64>,
    ) -> Result<(f64, DVector<f64>), GpError> {
        let (var_noise, mean, kernel) = self.split_parameters(parameters.as_slice())?;
        let ln_m = self.log_likelihood(var_noise, mean, kernel)?;
        let grad = self.grad_log_likelihood(var_noise, mean, kernel)?;
        Ok((ln_m, grad))
    }

    fn parameters(&self) -> DVector<f64> {
        self.value_parameters()
    }

    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<(), GpError> {
        self.set_value_parameters(parameters.as_slice())
    }
}

fn flatten(params: &[Parameter]) -> Vec<f64> {
    params
        .iter()
        .flat_map(|p| p.value().iter().copied())
        .collect()
}

/// Set the values of consecutive parameters from one flat slice
fn distribute(params: &mut [Parameter], values: &[f64]) {
    let mut offset = 0;
    for p in params.iter_mut() {
        let d = p.dimension();
        p.set_value(&values[offset..offset + d]);
        offset += d;
    }
}

#[cfg(test)]
mod tests {
    use super::kernel::KernelName;
    use super::*;
    use crate::misc::central_difference;

    pub(super) fn training_data() -> TrainingData {
        TrainingData::new(
            DMatrix::from_column_slice(
                5,
                1,
                &[42.2851784656, 72.3121248508, 1.0113231069, 30.9309246906, 15.5288331909],
            ),
            DVector::from_column_slice(&[
                42.2851784656,
                72.3121248508,
                1.0113231069,
                30.9309246906,
                15.5288331909,
            ]),
            None,
        )
        .unwrap()
    }

    pub(super) fn scaled_gp() -> GpFittingGaussian {
        let params = GpParams::default().with_bounds_domain(vec![BoundsDomain::Interval {
            lower: 0.0,
            upper: 100.0,
        }]);
        GpFittingGaussian::new(KernelSpec::scaled_matern52(1), training_data(), params).unwrap()
    }

    /// Product of a Matérn kernel and a one task kernel, with per point
    /// noise
    fn complex_gp() -> GpFittingGaussian {
        let spec = KernelSpec::new(
            vec![
                KernelName::ProductKernelsSeparable,
                KernelName::Matern52,
                KernelName::Tasks,
            ],
            vec![2, 1, 1],
            false,
        );
        let data = TrainingData::new(
            DMatrix::from_row_slice(1, 2, &[42.285_178_465_6, 0.0]),
            DVector::from_column_slice(&[1.0]),
            Some(DVector::from_column_slice(&[0.5])),
        )
        .unwrap();
        GpFittingGaussian::new(spec, data, GpParams::default()).unwrap()
    }

    #[test]
    fn default_parameters_from_data() {
        let gp = scaled_gp();
        let y = training_data().evaluations().clone();
        let n = y.len() as f64;
        let mean = y.sum() / n;
        let var = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let x = training_data().points().column(0).clone_owned();
        let ls = x
            .iter()
            .map(|a| x.iter().map(|b| (a - b).abs()).sum::<f64>())
            .sum::<f64>()
            / (n * n)
            / 0.324;

        let values = gp.value_parameters();
        assert::close(values[0], var, 1E-9);
        assert::close(values[1], mean, 1E-9);
        assert::close(values[2], ls, 1E-9);
        assert::close(values[3], var, 1E-9);
        assert::close(values[0], 592.547_403_396_915_2, 1E-7);
        assert::close(values[1], 32.413_676_860_96, 1E-9);
        assert::close(values[2], 83.633_554_944_444_46, 1E-9);
        assert_eq!(gp.start_point_sampler(), &values);
    }

    #[test]
    fn dimension_must_match_kernel() {
        let res = GpFittingGaussian::new(KernelSpec::matern52(2), training_data(), GpParams::default());
        assert!(matches!(res, Err(GpError::DimensionMismatch { .. })));
    }

    #[test]
    fn cross_cov_with_explicit_parameters() {
        let gp = complex_gp();
        let cov = gp
            .evaluate_cross_cov(
                &DMatrix::from_row_slice(1, 2, &[2.0, 0.0]),
                &DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
                &[1.0, 0.0],
            )
            .unwrap();
        assert::close(cov[(0, 0)], 0.523_994_108_831_820_3, 1E-12);
    }

    #[test]
    fn log_likelihood_with_per_point_noise() {
        let gp = complex_gp();
        // K = 1 + 1 + 0.5 and residual 0
        let llh = gp.log_likelihood(1.0, 1.0, &[1.0, 0.0]).unwrap();
        assert::close(llh, -0.458_145_365_937_077_61, 1E-12);
        assert::close(llh, -0.5 * 2.5_f64.ln(), 1E-12);
    }

    #[test]
    fn cross_cov_hessian_matches_finite_differences() {
        let gp =
            GpFittingGaussian::new(KernelSpec::matern52(1), training_data(), GpParams::default())
                .unwrap();
        let points = DMatrix::from_column_slice(2, 1, &[39.0, 38.0]);
        let point = DVector::from_element(1, 40.0);
        let as_row = |x: &DVector<f64>| DMatrix::from_row_slice(1, x.len(), x.as_slice());

        let hessians = gp
            .evaluate_hessian_cross_cov_respect_point(&as_row(&point), &points, &[1.0])
            .unwrap();
        assert_eq!(hessians.len(), 2);
        for (j, hessian) in hessians.iter().enumerate() {
            let fd = central_difference(
                |x: &DVector<f64>| {
                    gp.evaluate_grad_cross_cov_respect_point(&as_row(x), &points, &[1.0])
                        .unwrap()[(j, 0)]
                },
                &point,
                1E-6,
            );
            assert::close(hessian[(0, 0)], fd[0], 1E-6);
        }
    }

    #[test]
    fn log_likelihood_gradient_matches_finite_differences() {
        let gp = scaled_gp();
        let theta = DVector::from_column_slice(&[50.0, 30.0, 40.0, 500.0]);
        let grad = gp.grad_llh(&theta).unwrap();
        let fd = central_difference(|t: &DVector<f64>| gp.objective_llh(t), &theta, 1E-6);
        for i in 0..4 {
            assert::close(grad[i], fd[i], 1E-5);
        }
    }

    #[test]
    fn log_likelihood_gradient_with_tasks() {
        let spec = KernelSpec::matern52_tasks(1, 2);
        let data = TrainingData::new(
            DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 1.0, 2.0, 0.0, 3.0, 1.0]),
            DVector::from_column_slice(&[0.3, 1.2, -0.4, 0.8]),
            None,
        )
        .unwrap();
        let gp = GpFittingGaussian::new(spec, data, GpParams::default()).unwrap();
        let theta = DVector::from_column_slice(&[0.2, 0.1, 1.5, 0.3, -0.2, 0.1]);
        let grad = gp.grad_llh(&theta).unwrap();
        let fd = central_difference(|t: &DVector<f64>| gp.objective_llh(t), &theta, 1E-6);
        for i in 0..theta.len() {
            assert::close(grad[i], fd[i], 1E-5);
        }
    }

    #[test]
    fn gradient_dict_matches_flat_gradient() {
        let gp = scaled_gp();
        let dict = gp.grad_log_likelihood_dict(50.0, 30.0, &[40.0, 500.0]).unwrap();
        let flat = gp.grad_log_likelihood(50.0, 30.0, &[40.0, 500.0]).unwrap();
        assert_eq!(dict.to_vector(), flat);
        assert_eq!(dict.kernel_params.len(), 2);
    }

    #[test]
    fn cache_is_reused_for_the_same_parameters() {
        let gp = scaled_gp();
        let before = gp.n_factorizations();
        let a = gp.log_likelihood(50.0, 30.0, &[40.0, 500.0]).unwrap();
        let b = gp.log_likelihood(50.0, 30.0, &[40.0, 500.0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(gp.n_factorizations(), before + 1);

        // a new mean only needs a new solve
        gp.log_likelihood(50.0, 31.0, &[40.0, 500.0]).unwrap();
        assert_eq!(gp.n_factorizations(), before + 1);

        gp.log_likelihood(51.0, 31.0, &[40.0, 500.0]).unwrap();
        assert_eq!(gp.n_factorizations(), before + 2);
    }

    #[test]
    fn uncached_computation_does_not_touch_cache() {
        let gp = scaled_gp();
        gp.cholesky_cov(50.0, &[40.0, 500.0], false).unwrap();
        gp.cholesky_cov(50.0, &[40.0, 500.0], false).unwrap();
        assert_eq!(gp.n_factorizations(), 2);
    }

    #[test]
    fn adding_points_clears_cache() {
        let mut gp = scaled_gp();
        gp.log_likelihood(50.0, 30.0, &[40.0, 500.0]).unwrap();
        gp.add_points_evaluations(
            &DMatrix::from_column_slice(1, 1, &[80.0]),
            &DVector::from_column_slice(&[80.0]),
            None,
        )
        .unwrap();
        assert_eq!(gp.data().n(), 6);
        assert_eq!(gp.training_data().n(), 5);
        let n = gp.n_factorizations();
        gp.log_likelihood(50.0, 30.0, &[40.0, 500.0]).unwrap();
        assert_eq!(gp.n_factorizations(), n + 1);
    }

    #[test]
    fn adding_noisy_points_to_noiseless_data_fails() {
        let mut gp = scaled_gp();
        let res = gp.add_points_evaluations(
            &DMatrix::from_column_slice(1, 1, &[80.0]),
            &DVector::from_column_slice(&[80.0]),
            Some(&DVector::from_column_slice(&[1.0])),
        );
        assert_eq!(res, Err(GpError::NoiseMismatch { noisy_data: false }));
    }

    #[test]
    fn set_value_parameters_updates_kernel() {
        let mut gp = scaled_gp();
        gp.set_value_parameters(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(gp.var_noise(), 1.0);
        assert_eq!(gp.mean(), 2.0);
        assert_eq!(gp.kernel_values().as_slice(), &[3.0, 4.0]);
        assert_eq!(gp.value_parameters().as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        assert!(gp.set_value_parameters(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn log_prob_is_neg_infinity_outside_bounds() {
        let gp = scaled_gp();
        let theta = DVector::from_column_slice(&[-1.0, 30.0, 40.0, 500.0]);
        assert_eq!(gp.log_prob_parameters(&theta), f64::NEG_INFINITY);
        let theta = DVector::from_column_slice(&[50.0, 30.0, 40.0, 500.0]);
        assert!(gp.log_prob_parameters(&theta).is_finite());
    }

    #[test]
    fn explicit_initial_values() {
        let params = GpParams::default()
            .with_kernel_values(vec![2.0, 3.0])
            .with_mean_value(1.0)
            .with_var_noise_value(0.5);
        let gp =
            GpFittingGaussian::new(KernelSpec::scaled_matern52(1), training_data(), params).unwrap();
        assert_eq!(gp.value_parameters().as_slice(), &[0.5, 1.0, 2.0, 3.0]);

        let params = GpParams::default().with_kernel_values(vec![2.0]);
        assert!(GpFittingGaussian::new(KernelSpec::scaled_matern52(1), training_data(), params).is_err());
    }

    #[test]
    fn random_process_interface() {
        let mut gp = scaled_gp();
        let theta = DVector::from_column_slice(&[50.0, 30.0, 40.0, 500.0]);
        let (ln_m, grad) = gp.ln_m_with_parameters(&theta).unwrap();
        assert_eq!(grad.len(), 4);
        gp.set_parameters(&theta).unwrap();
        assert::close(gp.ln_m().unwrap(), ln_m, 1E-12);
        assert_eq!(RandomProcess::parameters(&gp), theta);
    }
}
