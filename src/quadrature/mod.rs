//! Stratified Bayesian quadrature
//!
//! [`BayesianQuadrature`] turns a Gaussian process on `F(x, w)` into the
//! posterior of `G(x) = E_w[F(x, w)]` by taking expectations of the kernel
//! over the nuisance dimensions `w`. Query points only hold the `x`
//! columns, in the order of `x_domain`.
use std::fmt;
#[cfg(feature = "serde1")]
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Normal};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::domain::{get_points_domain, BoundsDomain, DomainError};
use crate::misc::{CacheKey, SingleEntryCache};
use crate::optimize::{Bounds, Method, Optimization, OptimizationResult, OptimizeError};
use crate::process::gaussian::{GpError, GpFittingGaussian, Posterior};

mod expectation;
pub use expectation::{Expectation, UniformFinite};

/// Errors from the quadrature engine
#[derive(Clone, Debug, PartialEq)]
pub enum QuadratureError {
    /// The underlying Gaussian process failed
    Gp(GpError),
    /// Drawing a starting point failed
    Domain(DomainError),
    /// Optimizing the posterior mean failed
    Optimize(OptimizeError),
    /// An index of `x_domain` is out of range or repeated
    InvalidDomain { index: usize, dim: usize },
    /// An input does not have the expected size
    DimensionMismatch {
        name: String,
        expected: usize,
        given: usize,
    },
    /// A finite distribution without values
    EmptyDistribution,
    /// The number of tasks was not given and the kernel has no task kernel
    NoTasks,
    /// The process has no bounds for some of its input dimensions
    MissingBounds { expected: usize, given: usize },
    /// A quantity that must be finite is not
    NotFinite { name: String, value: f64 },
    Io(String),
    Json(String),
}

impl std::error::Error for QuadratureError {}

impl fmt::Display for QuadratureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gp(e) => write!(f, "gaussian process error: {}", e),
            Self::Domain(e) => write!(f, "domain error: {}", e),
            Self::Optimize(e) => write!(f, "optimization failed: {}", e),
            Self::InvalidDomain { index, dim } => write!(
                f,
                "index {} of x_domain is repeated or not below the dimension {}",
                index, dim
            ),
            Self::DimensionMismatch {
                name,
                expected,
                given,
            } => write!(
                f,
                "{} has size {} but {} was expected",
                name, given, expected
            ),
            Self::EmptyDistribution => write!(f, "the distribution has no values"),
            Self::NoTasks => write!(f, "the kernel has no task kernel"),
            Self::MissingBounds { expected, given } => write!(
                f,
                "{} domain bounds are needed, {} were given",
                expected, given
            ),
            Self::NotFinite { name, value } => write!(f, "{} is not finite: {}", name, value),
            Self::Io(msg) => write!(f, "io error: {}", msg),
            Self::Json(msg) => write!(f, "json error: {}", msg),
        }
    }
}

impl From<GpError> for QuadratureError {
    fn from(e: GpError) -> Self {
        Self::Gp(e)
    }
}

impl From<DomainError> for QuadratureError {
    fn from(e: DomainError) -> Self {
        Self::Domain(e)
    }
}

impl From<OptimizeError> for QuadratureError {
    fn from(e: OptimizeError) -> Self {
        Self::Optimize(e)
    }
}

/// Results of successive optimizations of the posterior mean, oldest first.
///
/// Owned by the caller and handed to
/// [`BayesianQuadrature::optimize_posterior_mean`], which warm-starts from
/// the last entry and appends its result.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(transparent))]
pub struct OptimalSolutions(Vec<OptimizationResult>);

impl OptimalSolutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: OptimizationResult) {
        self.0.push(result);
    }

    pub fn last(&self) -> Option<&OptimizationResult> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OptimizationResult> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[OptimizationResult] {
        &self.0
    }
}

/// The `a` and `b` vectors of the knowledge gradient.
///
/// For query points `x_i` and a candidate observation at `c`:
/// `a_i = μ_n(G(x_i))` and
/// `b_i = Cov_n(G(x_i), F(c))² / Var_n(F(c))`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct KnowledgeGradientParameters {
    pub a: DVector<f64>,
    pub b: DVector<f64>,
}

/// File name of the posterior mean optimization trace
pub fn debug_filename(
    model_type: &str,
    problem_name: &str,
    kernel_names: &str,
    training_name: &str,
) -> String {
    format!(
        "opt_post_mean_gp_{}_{}_{}_{}.json",
        model_type, problem_name, kernel_names, training_name
    )
}

/// Posterior of the expectation of a Gaussian process over its nuisance
/// dimensions.
///
/// The cross covariances between query points and training points, and the
/// posterior mean at the query points, used by
/// [`BayesianQuadrature::compute_posterior_parameters_kg`] are memoized in
/// single entry caches keyed by the kernel parameters alone.
#[derive(Debug)]
pub struct BayesianQuadrature<'a, E = UniformFinite> {
    gp: &'a GpFittingGaussian,
    x_domain: Vec<usize>,
    w_domain: Vec<usize>,
    expectation: E,
    cache_quadratures: SingleEntryCache<Arc<DMatrix<f64>>>,
    cache_posterior_mean: SingleEntryCache<Arc<DVector<f64>>>,
}

impl<'a> BayesianQuadrature<'a, UniformFinite> {
    /// Quadrature uniform over the tasks `0..n_tasks`.
    ///
    /// When `n_tasks` is `None` it is the number of tasks of the process'
    /// task kernel.
    pub fn uniform_finite(
        gp: &'a GpFittingGaussian,
        x_domain: Vec<usize>,
        n_tasks: Option<usize>,
    ) -> Result<Self, QuadratureError> {
        let n_tasks = n_tasks
            .or_else(|| gp.kernel().n_tasks())
            .ok_or(QuadratureError::NoTasks)?;
        Self::new(gp, x_domain, UniformFinite::tasks(n_tasks)?)
    }
}

impl<'a, E: Expectation> BayesianQuadrature<'a, E> {
    /// # Arguments
    /// * `gp` - Process on the full points `(x, w)`
    /// * `x_domain` - Input dimensions of `x`; the others are integrated out
    /// * `expectation` - Integration rule over the other dimensions
    pub fn new(
        gp: &'a GpFittingGaussian,
        x_domain: Vec<usize>,
        expectation: E,
    ) -> Result<Self, QuadratureError> {
        let dim = gp.dim();
        for (k, &index) in x_domain.iter().enumerate() {
            if index >= dim || x_domain[..k].contains(&index) {
                return Err(QuadratureError::InvalidDomain { index, dim });
            }
        }
        let w_domain: Vec<usize> = (0..dim).filter(|i| !x_domain.contains(i)).collect();
        if expectation.dimension() != w_domain.len() {
            return Err(QuadratureError::DimensionMismatch {
                name: "w_domain".to_string(),
                expected: expectation.dimension(),
                given: w_domain.len(),
            });
        }

        Ok(Self {
            gp,
            x_domain,
            w_domain,
            expectation,
            cache_quadratures: SingleEntryCache::new(),
            cache_posterior_mean: SingleEntryCache::new(),
        })
    }

    pub fn gp(&self) -> &GpFittingGaussian {
        self.gp
    }

    pub fn x_domain(&self) -> &[usize] {
        &self.x_domain
    }

    pub fn w_domain(&self) -> &[usize] {
        &self.w_domain
    }

    pub fn expectation(&self) -> &E {
        &self.expectation
    }

    fn check_x_points(&self, points: &DMatrix<f64>, name: &str) -> Result<(), QuadratureError> {
        if points.ncols() == self.x_domain.len() {
            Ok(())
        } else {
            Err(QuadratureError::DimensionMismatch {
                name: name.to_string(),
                expected: self.x_domain.len(),
                given: points.ncols(),
            })
        }
    }

    fn row(point: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::from_row_slice(1, point.len(), point.as_slice())
    }

    /// `E_{w, w'}[k((x_i, w), (x_j, w'))]` between the rows of `points`
    pub fn evaluate_quadrate_cov(
        &self,
        points: &DMatrix<f64>,
        kernel_params: &[f64],
    ) -> Result<DMatrix<f64>, QuadratureError> {
        self.check_x_points(points, "points")?;
        let cov = self.expectation.double_expectation(
            |full| self.gp.evaluate_cov(full, kernel_params),
            points,
            &self.x_domain,
            &self.w_domain,
        )?;
        Ok(cov)
    }

    /// `E_w[k((x_i, w), p_j)]` for the rows `x_i` of `points` and the full
    /// points `p_j` of `points_2`. This is `B(x, j)` of stratified Bayesian
    /// optimization.
    pub fn evaluate_quadrature_cross_cov(
        &self,
        points: &DMatrix<f64>,
        points_2: &DMatrix<f64>,
        kernel_params: &[f64],
    ) -> Result<DMatrix<f64>, QuadratureError> {
        self.check_x_points(points, "points")?;
        let cov = self.expectation.expectation(
            |full| self.gp.evaluate_cross_cov(full, points_2, kernel_params),
            points,
            &self.x_domain,
            &self.w_domain,
        )?;
        Ok(cov)
    }

    /// Gradient of [`BayesianQuadrature::evaluate_quadrature_cross_cov`]
    /// with respect to `x`, one row per row of `points_2`
    pub fn evaluate_grad_quadrature_cross_cov(
        &self,
        point: &DVector<f64>,
        points_2: &DMatrix<f64>,
        kernel_params: &[f64],
    ) -> Result<DMatrix<f64>, QuadratureError> {
        self.check_x_points(&Self::row(point), "point")?;
        let grad = self.expectation.grad_expectation(
            |full| {
                self.gp
                    .evaluate_grad_cross_cov_respect_point(full, points_2, kernel_params)
            },
            point,
            &self.x_domain,
            &self.w_domain,
        )?;
        Ok(grad)
    }

    /// Posterior of `G` at the rows of `points` with the current
    /// hyperparameters of the process
    pub fn compute_posterior_parameters(
        &self,
        points: &DMatrix<f64>,
        only_mean: bool,
        cache: bool,
    ) -> Result<Posterior, QuadratureError> {
        let kernel_params = self.gp.kernel_values();
        self.compute_posterior_parameters_with(
            points,
            self.gp.var_noise(),
            self.gp.mean(),
            kernel_params.as_slice(),
            only_mean,
            cache,
        )
    }

    /// Posterior of `G` at the rows of `points` with the given
    /// hyperparameters
    pub fn compute_posterior_parameters_with(
        &self,
        points: &DMatrix<f64>,
        var_noise: f64,
        mean: f64,
        kernel_params: &[f64],
        only_mean: bool,
        cache: bool,
    ) -> Result<Posterior, QuadratureError> {
        self.check_x_points(points, "points")?;
        let data = self.gp.data();

        if data.is_empty() {
            let cov = if only_mean {
                None
            } else {
                Some(self.evaluate_quadrate_cov(points, kernel_params)?)
            };
            return Ok(Posterior {
                mean: DVector::from_element(points.nrows(), mean),
                cov,
            });
        }

        let (chol, solve) =
            self.gp
                .cholesky_solve_vectors_for_posterior(var_noise, mean, kernel_params, cache)?;
        let vec_covs = self.evaluate_quadrature_cross_cov(points, data.points(), kernel_params)?;
        let post_mean = (&vec_covs * solve.as_ref()).add_scalar(mean);

        let cov = if only_mean {
            None
        } else {
            let v = chol.solve(&vec_covs.transpose());
            let cov = self.evaluate_quadrate_cov(points, kernel_params)? - &vec_covs * v;
            Some((&cov + cov.transpose()) * 0.5)
        };

        Ok(Posterior {
            mean: post_mean,
            cov,
        })
    }

    /// Gradient of the posterior mean of `G` at the single row of `point`
    pub fn gradient_posterior_mean(
        &self,
        point: &DMatrix<f64>,
    ) -> Result<DVector<f64>, QuadratureError> {
        self.check_x_points(point, "point")?;
        if point.nrows() != 1 {
            return Err(QuadratureError::DimensionMismatch {
                name: "rows of point".to_string(),
                expected: 1,
                given: point.nrows(),
            });
        }
        let data = self.gp.data();
        if data.is_empty() {
            return Ok(DVector::zeros(self.x_domain.len()));
        }

        let kernel_params = self.gp.kernel_values();
        let x = point.row(0).transpose();
        let grad =
            self.evaluate_grad_quadrature_cross_cov(&x, data.points(), kernel_params.as_slice())?;
        let (_, solve) = self.gp.cholesky_solve_vectors_for_posterior(
            self.gp.var_noise(),
            self.gp.mean(),
            kernel_params.as_slice(),
            true,
        )?;
        Ok(grad.transpose() * solve.as_ref())
    }

    /// Posterior mean of `G` at `point`
    pub fn objective_posterior_mean(&self, point: &DVector<f64>) -> Result<f64, QuadratureError> {
        let posterior = self.compute_posterior_parameters(&Self::row(point), true, true)?;
        Ok(posterior.mean[0])
    }

    /// Gradient of the posterior mean of `G` at `point`
    pub fn grad_posterior_mean(
        &self,
        point: &DVector<f64>,
    ) -> Result<DVector<f64>, QuadratureError> {
        self.gradient_posterior_mean(&Self::row(point))
    }

    fn bounds_x(&self) -> Result<Vec<BoundsDomain>, QuadratureError> {
        let bounds = self.gp.bounds_domain();
        if bounds.len() != self.gp.dim() {
            return Err(QuadratureError::MissingBounds {
                expected: self.gp.dim(),
                given: bounds.len(),
            });
        }
        Ok(self.x_domain.iter().map(|&i| bounds[i].clone()).collect())
    }

    /// Optimize the posterior mean of `G` over the bounds of the `x`
    /// dimensions.
    ///
    /// Starts from `start`, else from the last entry of `optimal_solutions`,
    /// else from a random point of the domain. The result is appended to
    /// `optimal_solutions`.
    pub fn optimize_posterior_mean<R: Rng>(
        &self,
        start: Option<DVector<f64>>,
        optimal_solutions: &mut OptimalSolutions,
        minimize: bool,
        rng: &mut R,
    ) -> Result<OptimizationResult, QuadratureError> {
        let bounds_x = self.bounds_x()?;
        let start = match start {
            Some(start) => start,
            None => match optimal_solutions.last() {
                Some(last) => last.solution.clone(),
                None => get_points_domain(1, &bounds_x, rng)?.row(0).transpose(),
            },
        };

        let bounds: Vec<Bounds> = bounds_x
            .iter()
            .map(|b| b.extent().map_or_else(Bounds::free, |(l, u)| Bounds::interval(l, u)))
            .collect();
        let optimization = Optimization::new(Method::Lbfgsb, bounds, minimize)?
            .with_params(self.gp.params().optimizer);

        let worst = if minimize {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
        let res = optimization.optimize(
            &start,
            |x| self.objective_posterior_mean(x).unwrap_or(worst),
            |x| {
                self.grad_posterior_mean(x)
                    .unwrap_or_else(|_| DVector::zeros(x.len()))
            },
        )?;

        info!(
            "posterior mean optimized after {} iterations: value = {}, solution = {}",
            res.n_iterations,
            res.optimal_value,
            res.solution.transpose()
        );
        optimal_solutions.push(res.clone());
        Ok(res)
    }

    /// The `a` and `b` vectors of the knowledge gradient at the rows of
    /// `points` for a new observation at the full point `candidate_point`,
    /// with the current hyperparameters
    pub fn compute_posterior_parameters_kg(
        &self,
        points: &DMatrix<f64>,
        candidate_point: &DVector<f64>,
    ) -> Result<KnowledgeGradientParameters, QuadratureError> {
        let kernel_params = self.gp.kernel_values();
        self.compute_posterior_parameters_kg_with(
            points,
            candidate_point,
            self.gp.var_noise(),
            self.gp.mean(),
            kernel_params.as_slice(),
        )
    }

    /// The `a` and `b` vectors of the knowledge gradient with the given
    /// hyperparameters.
    ///
    /// The cross covariances to the training points and `a` only depend on
    /// `points`, so they are reused for every candidate as long as the kernel
    /// parameters and the number of points do not change.
    pub fn compute_posterior_parameters_kg_with(
        &self,
        points: &DMatrix<f64>,
        candidate_point: &DVector<f64>,
        var_noise: f64,
        mean: f64,
        kernel_params: &[f64],
    ) -> Result<KnowledgeGradientParameters, QuadratureError> {
        self.check_x_points(points, "points")?;
        let dim = self.gp.dim();
        if candidate_point.len() != dim {
            return Err(QuadratureError::DimensionMismatch {
                name: "candidate_point".to_string(),
                expected: dim,
                given: candidate_point.len(),
            });
        }

        let t = points.nrows();
        let candidate = Self::row(candidate_point);
        let b_new = self
            .evaluate_quadrature_cross_cov(points, &candidate, kernel_params)?
            .column(0)
            .clone_owned();
        let var_candidate = self.gp.evaluate_cov(&candidate, kernel_params)?[(0, 0)];

        let data = self.gp.data();
        if data.is_empty() {
            return Ok(KnowledgeGradientParameters {
                a: DVector::from_element(t, mean),
                b: b_new.map(|v| v * v / var_candidate),
            });
        }

        let (chol, solve) =
            self.gp
                .cholesky_solve_vectors_for_posterior(var_noise, mean, kernel_params, true)?;
        let key = CacheKey::from(kernel_params);

        let vec_covs = match self.cache_quadratures.get(&key) {
            Some(v) if v.shape() == (t, data.n()) => v,
            _ => {
                let v = Arc::new(self.evaluate_quadrature_cross_cov(
                    points,
                    data.points(),
                    kernel_params,
                )?);
                self.cache_quadratures.put(key.clone(), Arc::clone(&v));
                v
            }
        };

        let mu = match self.cache_posterior_mean.get(&key) {
            Some(mu) if mu.len() == t => mu,
            _ => {
                let mu = Arc::new((vec_covs.as_ref() * solve.as_ref()).add_scalar(mean));
                self.cache_posterior_mean.put(key, Arc::clone(&mu));
                mu
            }
        };

        let cross_cov = self
            .gp
            .evaluate_cross_cov(&candidate, data.points(), kernel_params)?
            .row(0)
            .transpose();
        let solve_2 = chol.solve(&cross_cov);
        let numerator = b_new - vec_covs.as_ref() * &solve_2;
        let denominator = var_candidate - cross_cov.dot(&solve_2);

        Ok(KnowledgeGradientParameters {
            a: mu.as_ref().clone(),
            b: numerator.map(|v| v * v / denominator),
        })
    }

    /// `n` draws of `G(point)` from its posterior
    pub fn sample_new_observations<R: Rng>(
        &self,
        point: &DVector<f64>,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>, QuadratureError> {
        let posterior = self.compute_posterior_parameters(&Self::row(point), false, true)?;
        let var = posterior.cov.map_or(0.0, |c| c[(0, 0)].max(0.0));
        let normal = Normal::new(posterior.mean[0], var.sqrt()).map_err(|_| {
            QuadratureError::NotFinite {
                name: "posterior variance".to_string(),
                value: var,
            }
        })?;
        Ok((0..n).map(|_| normal.sample(rng)).collect())
    }

    /// Write `optimal_solutions` as JSON to
    /// `<dir>/<problem_name>/opt_post_mean_gp_<model>_<problem>_<kernels>_<training>.json`
    /// and return the path
    #[cfg(feature = "serde1")]
    pub fn write_debug_data<P: AsRef<Path>>(
        &self,
        dir: P,
        optimal_solutions: &OptimalSolutions,
        problem_name: &str,
        model_type: &str,
        training_name: &str,
    ) -> Result<PathBuf, QuadratureError> {
        let debug_dir = dir.as_ref().join(problem_name);
        std::fs::create_dir_all(&debug_dir).map_err(|e| QuadratureError::Io(e.to_string()))?;

        let path = debug_dir.join(debug_filename(
            model_type,
            problem_name,
            &self.gp.spec().names_joined(),
            training_name,
        ));
        let text = serde_json::to_string(optimal_solutions)
            .map_err(|e| QuadratureError::Json(e.to_string()))?;
        std::fs::write(&path, text).map_err(|e| QuadratureError::Io(e.to_string()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::misc::{central_difference, mean_and_variance};
    use crate::process::gaussian::kernel::KernelSpec;
    use crate::process::gaussian::{GpParams, TrainingData, NAME_MODEL};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn tasks_gp(params: GpParams) -> GpFittingGaussian {
        let xs = [0.0_f64, 20.0, 40.0, 60.0, 80.0, 100.0, 30.0, 70.0];
        let tasks = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let points = DMatrix::from_fn(xs.len(), 2, |i, j| if j == 0 { xs[i] } else { tasks[i] });
        let evaluations = DVector::from_fn(xs.len(), |i, _| {
            10.0 * (xs[i] / 30.0).sin() + 2.0 * tasks[i]
        });
        let data = TrainingData::new(points, evaluations, None).unwrap();
        let params = params.with_bounds_domain(vec![
            BoundsDomain::Interval {
                lower: 0.0,
                upper: 100.0,
            },
            BoundsDomain::Finite(vec![0.0, 1.0]),
        ]);
        GpFittingGaussian::new(KernelSpec::matern52_tasks(1, 2), data, params).unwrap()
    }

    fn default_gp() -> GpFittingGaussian {
        tasks_gp(GpParams::default().with_problem_name("toy"))
    }

    /// Rows `(x_i, 0), (x_i, 1)` for each `x_i`
    fn stacked(xs: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(2 * xs.len(), 2, |r, j| {
            if j == 0 {
                xs[r / 2]
            } else {
                (r % 2) as f64
            }
        })
    }

    #[test]
    fn construction() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        assert_eq!(bq.x_domain(), &[0]);
        assert_eq!(bq.w_domain(), &[1]);
        assert_eq!(bq.expectation().domain_random().nrows(), 2);

        assert_eq!(
            BayesianQuadrature::uniform_finite(&gp, vec![2], None).err(),
            Some(QuadratureError::InvalidDomain { index: 2, dim: 2 })
        );
        assert_eq!(
            BayesianQuadrature::uniform_finite(&gp, vec![0, 0], None).err(),
            Some(QuadratureError::InvalidDomain { index: 0, dim: 2 })
        );
    }

    #[test]
    fn kernel_without_tasks() {
        let data = TrainingData::new(
            DMatrix::from_column_slice(2, 1, &[0.0, 1.0]),
            DVector::from_column_slice(&[0.0, 1.0]),
            None,
        )
        .unwrap();
        let gp =
            GpFittingGaussian::new(KernelSpec::matern52(1), data, GpParams::default()).unwrap();
        assert_eq!(
            BayesianQuadrature::uniform_finite(&gp, vec![0], None).err(),
            Some(QuadratureError::NoTasks)
        );
        assert!(matches!(
            BayesianQuadrature::uniform_finite(&gp, vec![0], Some(2)),
            Err(QuadratureError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn quadrature_covariances_average_the_kernel() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let kp = gp.kernel_values();
        let kp = kp.as_slice();

        let points = DMatrix::from_column_slice(2, 1, &[10.0, 55.0]);
        let full = stacked(&[10.0, 55.0]);
        let cov = gp.evaluate_cov(&full, kp).unwrap();

        let quad = bq.evaluate_quadrate_cov(&points, kp).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let expected = cov.view((2 * i, 2 * j), (2, 2)).sum() / 4.0;
                assert::close(quad[(i, j)], expected, 1E-12);
            }
        }

        let cross = bq
            .evaluate_quadrature_cross_cov(&points, gp.data().points(), kp)
            .unwrap();
        let raw = gp.evaluate_cross_cov(&full, gp.data().points(), kp).unwrap();
        assert_eq!(cross.shape(), (2, 8));
        for i in 0..2 {
            for j in 0..8 {
                let expected = 0.5 * (raw[(2 * i, j)] + raw[(2 * i + 1, j)]);
                assert::close(cross[(i, j)], expected, 1E-12);
            }
        }
    }

    #[test]
    fn grad_quadrature_cross_cov_matches_finite_differences() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let kp = gp.kernel_values();
        let kp = kp.as_slice();
        let points_2 = gp.data().points();

        let x = DVector::from_column_slice(&[37.3]);
        let grad = bq.evaluate_grad_quadrature_cross_cov(&x, points_2, kp).unwrap();
        assert_eq!(grad.shape(), (8, 1));
        for j in 0..8 {
            let fd = central_difference(
                |x| {
                    let row = DMatrix::from_row_slice(1, 1, x.as_slice());
                    bq.evaluate_quadrature_cross_cov(&row, points_2, kp)
                        .unwrap()[(0, j)]
                },
                &x,
                1E-6,
            );
            assert::close(grad[(j, 0)], fd[0], 1E-6);
        }
    }

    #[test]
    fn posterior_is_the_average_of_the_task_posteriors() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();

        let xs = [10.0, 55.0, 90.0];
        let points = DMatrix::from_column_slice(3, 1, &xs);
        let posterior = bq.compute_posterior_parameters(&points, false, true).unwrap();
        let task_posterior = gp
            .compute_posterior_parameters(&stacked(&xs), false, true)
            .unwrap();
        let task_cov = task_posterior.cov.unwrap();
        let cov = posterior.cov.unwrap();

        for i in 0..3 {
            let expected = 0.5 * (task_posterior.mean[2 * i] + task_posterior.mean[2 * i + 1]);
            assert::close(posterior.mean[i], expected, 1E-8);
            for j in 0..3 {
                let expected = task_cov.view((2 * i, 2 * j), (2, 2)).sum() / 4.0;
                assert::close(cov[(i, j)], expected, 1E-8);
            }
        }
        approx::assert_relative_eq!(cov, cov.transpose());

        let only_mean = bq.compute_posterior_parameters(&points, true, true).unwrap();
        assert_eq!(only_mean.mean, posterior.mean);
        assert!(only_mean.cov.is_none());
    }

    #[test]
    fn prior_without_data() {
        let data = TrainingData::empty(2, false);
        let params = GpParams::default().with_mean_value(1.5);
        let gp = GpFittingGaussian::new(KernelSpec::matern52_tasks(1, 2), data, params).unwrap();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let points = DMatrix::from_column_slice(2, 1, &[0.0, 1.0]);
        let kp = gp.kernel_values();

        let posterior = bq.compute_posterior_parameters(&points, false, true).unwrap();
        assert_eq!(posterior.mean, DVector::from_element(2, 1.5));
        assert_eq!(
            posterior.cov.unwrap(),
            bq.evaluate_quadrate_cov(&points, kp.as_slice()).unwrap()
        );
        assert_eq!(
            bq.gradient_posterior_mean(&DMatrix::from_element(1, 1, 0.5))
                .unwrap(),
            DVector::zeros(1)
        );
    }

    #[test]
    fn gradient_of_posterior_mean_matches_finite_differences() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        for x in [5.0, 37.3, 81.9] {
            let x = DVector::from_column_slice(&[x]);
            let grad = bq.grad_posterior_mean(&x).unwrap();
            let fd = central_difference(|x| bq.objective_posterior_mean(x).unwrap(), &x, 1E-6);
            assert::close(grad[0], fd[0], 1E-5);
        }
    }

    #[test]
    fn gradient_needs_a_single_row() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let res = bq.gradient_posterior_mean(&DMatrix::zeros(2, 1));
        assert!(matches!(res, Err(QuadratureError::DimensionMismatch { .. })));
    }

    #[test]
    fn optimization_warm_starts_from_the_trace() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let mut trace = OptimalSolutions::new();

        let first = bq
            .optimize_posterior_mean(None, &mut trace, false, &mut rng)
            .unwrap();
        assert_eq!(trace.len(), 1);
        assert!((0.0..=100.0).contains(&first.solution[0]));
        assert::close(
            first.optimal_value,
            bq.objective_posterior_mean(&first.solution).unwrap(),
            1E-10,
        );

        let second = bq
            .optimize_posterior_mean(None, &mut trace, false, &mut rng)
            .unwrap();
        assert_eq!(trace.len(), 2);
        assert!(second.optimal_value >= first.optimal_value - 1E-8);
        assert_eq!(trace.last(), Some(&second));
    }

    #[test]
    fn minimization_does_not_increase_the_mean() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(8);
        let mut trace = OptimalSolutions::new();
        let start = DVector::from_column_slice(&[50.0]);
        let before = bq.objective_posterior_mean(&start).unwrap();
        let res = bq
            .optimize_posterior_mean(Some(start), &mut trace, true, &mut rng)
            .unwrap();
        assert!(res.optimal_value <= before);
        assert!((0.0..=100.0).contains(&res.solution[0]));
    }

    #[test]
    fn optimization_needs_bounds() {
        let data = TrainingData::new(
            DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 1.0]),
            DVector::from_column_slice(&[0.0, 1.0]),
            None,
        )
        .unwrap();
        let gp = GpFittingGaussian::new(KernelSpec::matern52_tasks(1, 2), data, GpParams::default())
            .unwrap();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(8);
        let res = bq.optimize_posterior_mean(None, &mut OptimalSolutions::new(), false, &mut rng);
        assert_eq!(
            res.err(),
            Some(QuadratureError::MissingBounds {
                expected: 2,
                given: 0
            })
        );
    }

    #[test]
    fn knowledge_gradient_vectors() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let xs = [10.0, 55.0];
        let points = DMatrix::from_column_slice(2, 1, &xs);
        let candidate = DVector::from_column_slice(&[45.0, 1.0]);

        let kg = bq.compute_posterior_parameters_kg(&points, &candidate).unwrap();
        let posterior = bq.compute_posterior_parameters(&points, true, true).unwrap();
        for i in 0..2 {
            assert::close(kg.a[i], posterior.mean[i], 1E-10);
        }

        let mut joint = stacked(&xs).insert_row(4, 0.0);
        joint[(4, 0)] = 45.0;
        joint[(4, 1)] = 1.0;
        let cov = gp
            .compute_posterior_parameters(&joint, false, true)
            .unwrap()
            .cov
            .unwrap();
        for i in 0..2 {
            let cov_g = 0.5 * (cov[(2 * i, 4)] + cov[(2 * i + 1, 4)]);
            assert::close(kg.b[i], cov_g * cov_g / cov[(4, 4)], 1E-6);
        }
    }

    #[test]
    fn knowledge_gradient_reuses_cached_vectors() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let points = DMatrix::from_column_slice(2, 1, &[10.0, 55.0]);
        let key = CacheKey::from(gp.kernel_values().as_slice());
        assert!(bq.cache_quadratures.is_empty());

        let first = bq
            .compute_posterior_parameters_kg(&points, &DVector::from_column_slice(&[45.0, 1.0]))
            .unwrap();
        assert!(bq.cache_quadratures.contains(&key));
        assert!(bq.cache_posterior_mean.contains(&key));
        let cached = bq.cache_quadratures.get(&key).unwrap();

        let second = bq
            .compute_posterior_parameters_kg(&points, &DVector::from_column_slice(&[20.0, 0.0]))
            .unwrap();
        assert!(Arc::ptr_eq(&cached, &bq.cache_quadratures.get(&key).unwrap()));
        assert_eq!(first.a, second.a);
        assert_ne!(first.b, second.b);
        assert_eq!(gp.n_factorizations(), 1);
    }

    #[test]
    fn new_kernel_parameters_refresh_the_cache() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let points = DMatrix::from_column_slice(1, 1, &[10.0]);
        let candidate = DVector::from_column_slice(&[45.0, 1.0]);
        let kp = gp.kernel_values();
        let mut other = kp.clone();
        other[0] *= 2.0;

        bq.compute_posterior_parameters_kg(&points, &candidate).unwrap();
        let changed = bq
            .compute_posterior_parameters_kg_with(
                &points,
                &candidate,
                gp.var_noise(),
                gp.mean(),
                other.as_slice(),
            )
            .unwrap();
        assert!(!bq.cache_quadratures.contains(&CacheKey::from(kp.as_slice())));
        assert!(bq.cache_quadratures.contains(&CacheKey::from(other.as_slice())));
        let expected = bq
            .compute_posterior_parameters_with(
                &points,
                gp.var_noise(),
                gp.mean(),
                other.as_slice(),
                true,
                false,
            )
            .unwrap();
        assert::close(changed.a[0], expected.mean[0], 1E-10);
    }

    #[test]
    fn samples_follow_the_posterior() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let point = DVector::from_column_slice(&[45.0]);
        let posterior = bq
            .compute_posterior_parameters(&DMatrix::from_element(1, 1, 45.0), false, true)
            .unwrap();
        let var = posterior.cov.unwrap()[(0, 0)];

        let mut rng = Xoshiro256Plus::seed_from_u64(9);
        let samples = bq.sample_new_observations(&point, 4000, &mut rng).unwrap();
        assert_eq!(samples.len(), 4000);
        let (mean, sample_var) = mean_and_variance(&DVector::from_vec(samples));
        assert!((mean - posterior.mean[0]).abs() < 5.0 * (var / 4000.0).sqrt() + 1E-9);
        assert!((sample_var - var).abs() < 0.2 * var + 1E-9);
    }

    #[test]
    fn debug_data_is_written() {
        let gp = default_gp();
        let bq = BayesianQuadrature::uniform_finite(&gp, vec![0], None).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(10);
        let mut trace = OptimalSolutions::new();
        bq.optimize_posterior_mean(None, &mut trace, false, &mut rng)
            .unwrap();

        let dir = std::env::temp_dir().join("sbo_quadrature_debug");
        let path = bq
            .write_debug_data(&dir, &trace, "toy", NAME_MODEL, "default")
            .unwrap();
        assert_eq!(
            path,
            dir.join("toy").join(
                "opt_post_mean_gp_gp_fitting_gaussian_toy_Product_of_kernels_with_separable_domain_Matern52_Tasks_default.json"
            )
        );
        let text = std::fs::read_to_string(&path).unwrap();
        let read: OptimalSolutions = serde_json::from_str(&text).unwrap();
        assert_eq!(read, trace);
    }
}
