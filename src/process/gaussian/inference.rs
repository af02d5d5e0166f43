use log::{info, warn};
use nalgebra::DVector;
use rand::Rng;
use rand_distr::StandardNormal;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use super::kernel::KernelSpec;
use super::{GpError, GpFittingGaussian, GpParams, SliceSampler, TrainingData};
use crate::optimize::{project, Bounds, Method, Optimization};

/// Maximum likelihood estimate of the hyperparameters
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct MleResult {
    /// Hyperparameters, `[var_noise, mean, kernel...]`
    pub solution: DVector<f64>,
    /// Log-likelihood at `solution`
    pub optimal_value: f64,
}

impl GpFittingGaussian {
    fn slice_sampler(&self) -> SliceSampler {
        let widths = self
            .start_point_sampler()
            .iter()
            .map(|v| v.abs().max(1.0))
            .collect();
        SliceSampler::new(widths, self.params().sampler)
    }

    /// `n` independent draws of the hyperparameters from their priors
    pub fn sample_parameters_prior<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<DVector<f64>> {
        (0..n)
            .map(|_| {
                let values: Vec<f64> = self
                    .parameters_model()
                    .into_iter()
                    .flat_map(|p| p.draw(rng))
                    .collect();
                DVector::from_vec(values)
            })
            .collect()
    }

    /// `n` draws of the hyperparameters from their posterior by slice
    /// sampling.
    ///
    /// The chain continues from `start_point` if given, otherwise from the
    /// last posterior sample, otherwise from the starting point of the
    /// sampler. Before the first sample ever drawn, `n_burning` sweeps are
    /// discarded; between kept samples, `thinning` sweeps are. Samples are
    /// appended to [`GpFittingGaussian::samples_parameters`].
    pub fn sample_parameters_posterior<R: Rng>(
        &mut self,
        n: usize,
        start_point: Option<DVector<f64>>,
        rng: &mut R,
    ) -> Result<Vec<DVector<f64>>, GpError> {
        let sampler = self.slice_sampler();
        let sampler_params = self.params().sampler;
        let first_samples = self.samples_parameters().is_empty();

        let mut x = match start_point {
            Some(x) => x,
            None => self
                .samples_parameters()
                .last()
                .cloned()
                .unwrap_or_else(|| self.start_point_sampler().clone()),
        };
        if x.len() != self.dimension_parameters() {
            return Err(GpError::DimensionMismatch {
                name: "start_point".to_string(),
                expected: self.dimension_parameters(),
                given: x.len(),
            });
        }

        let this = &*self;
        let ln_p = |theta: &DVector<f64>| this.log_prob_parameters(theta);

        let mut start = this.start_point_sampler().clone();
        if first_samples && sampler_params.n_burning > 0 {
            for _ in 0..sampler_params.n_burning {
                sampler.sweep(&mut x, &ln_p, rng)?;
            }
            start = x.clone();
        }

        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            for _ in 0..=sampler_params.thinning {
                sampler.sweep(&mut x, &ln_p, rng)?;
            }
            samples.push(x.clone());
        }

        let mut all = self.samples_parameters().to_vec();
        all.extend(samples.iter().cloned());
        self.set_samples(start, all);
        Ok(samples)
    }

    /// Maximize the log-likelihood over the hyperparameters.
    ///
    /// Starts from `start`, or from one posterior sample when `start` is
    /// `None`. Hyperparameters bounded below by a positive number are
    /// searched over their logarithm. When the gradient is not finite, the
    /// point is moved by a random offset of relative size 1e-6 and the
    /// gradient recomputed, at most `max_perturbations` times.
    pub fn mle_parameters<R: Rng>(
        &mut self,
        start: Option<DVector<f64>>,
        rng: &mut R,
    ) -> Result<MleResult, GpError> {
        let start = match start {
            Some(start) => start,
            None => self
                .sample_parameters_posterior(1, None, rng)?
                .pop()
                .ok_or(GpError::NoData)?,
        };

        let bounds = self.bounds_parameters();
        let scale = LogScale::new(&bounds);
        let search_bounds = scale.bounds(&bounds);
        let optimization = Optimization::new(Method::Lbfgsb, search_bounds.clone(), false)?
            .with_params(self.params().optimizer);
        let start = scale.to_search(&project(&start, &bounds));
        let max_perturbations = self.params().max_perturbations;

        let this = &*self;
        let objective = |u: &DVector<f64>| this.objective_llh(&scale.to_natural(u));
        let gradient = |u: &DVector<f64>| {
            let mut point = u.clone();
            for _ in 0..=max_perturbations {
                let theta = scale.to_natural(&point);
                match this.grad_llh(&theta) {
                    Ok(grad) if grad.iter().all(|g| g.is_finite()) => {
                        return scale.chain(&theta, grad)
                    }
                    _ => {
                        warn!("log-likelihood gradient is not finite, perturbing the point");
                        let size = 1E-6 * point.norm();
                        let noise = DVector::from_fn(point.len(), |_, _| {
                            size * rng.sample::<f64, _>(StandardNormal)
                        });
                        point = project(&(point + noise), &search_bounds);
                    }
                }
            }
            DVector::zeros(u.len())
        };

        let res = optimization.optimize(&start, objective, gradient)?;
        let solution = project(&scale.to_natural(&res.solution), &bounds);
        let optimal_value = self.objective_llh(&solution);
        info!(
            "maximum likelihood found after {} iterations: log-likelihood = {}",
            res.n_iterations, optimal_value
        );
        Ok(MleResult {
            solution,
            optimal_value,
        })
    }

    /// Copy of the process with its hyperparameters set to their maximum
    /// likelihood estimate. `self` is left untouched.
    pub fn fit_gp_regression<R: Rng>(
        &self,
        start: Option<DVector<f64>>,
        rng: &mut R,
    ) -> Result<GpFittingGaussian, GpError> {
        let mut fitted = self.clone();
        let mle = fitted.mle_parameters(start, rng)?;
        fitted.set_value_parameters(mle.solution.as_slice())?;
        Ok(fitted)
    }

    /// Build a Gaussian process, fitting its hyperparameters by maximum
    /// likelihood when `mle` is set.
    pub fn train<R: Rng>(
        spec: KernelSpec,
        training_data: TrainingData,
        mle: bool,
        params: GpParams,
        rng: &mut R,
    ) -> Result<Self, GpError> {
        let gp = Self::new(spec, training_data, params)?;
        if mle {
            gp.fit_gp_regression(None, rng)
        } else {
            Ok(gp)
        }
    }
}

/// Map between the hyperparameters and the space they are optimized in.
///
/// Coordinates with a positive lower bound live on the log scale there,
/// the others are left as they are.
struct LogScale {
    log: Vec<bool>,
}

impl LogScale {
    fn new(bounds: &[Bounds]) -> Self {
        let log = bounds
            .iter()
            .map(|b| b.lower.map_or(false, |lo| lo > 0.0))
            .collect();
        Self { log }
    }

    fn bounds(&self, bounds: &[Bounds]) -> Vec<Bounds> {
        bounds
            .iter()
            .zip(self.log.iter())
            .map(|(b, &log)| {
                if log {
                    Bounds::new(b.lower.map(f64::ln), b.upper.map(f64::ln))
                } else {
                    *b
                }
            })
            .collect()
    }

    fn to_search(&self, theta: &DVector<f64>) -> DVector<f64> {
        self.map(theta, f64::ln)
    }

    fn to_natural(&self, u: &DVector<f64>) -> DVector<f64> {
        self.map(u, f64::exp)
    }

    /// Gradient with respect to the search coordinates, given the gradient
    /// at `theta`
    fn chain(&self, theta: &DVector<f64>, mut grad: DVector<f64>) -> DVector<f64> {
        for (i, &log) in self.log.iter().enumerate() {
            if log {
                grad[i] *= theta[i];
            }
        }
        grad
    }

    fn map(&self, x: &DVector<f64>, f: fn(f64) -> f64) -> DVector<f64> {
        DVector::from_iterator(
            x.len(),
            x.iter()
                .zip(self.log.iter())
                .map(|(&v, &log)| if log { f(v) } else { v }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{scaled_gp, training_data};
    use super::super::SliceSamplerParams;
    use super::*;
    use crate::process::gaussian::kernel::{Kernel, Matern52Kernel};
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn prior_samples_respect_bounds() {
        let gp = scaled_gp();
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let samples = gp.sample_parameters_prior(20, &mut rng);
        assert_eq!(samples.len(), 20);
        let bounds = gp.bounds_parameters();
        for s in samples {
            assert_eq!(s.len(), 4);
            assert!(s.iter().zip(bounds.iter()).all(|(v, b)| b.contains(*v)));
        }
    }

    #[test]
    fn posterior_samples_are_recorded() {
        let mut gp = scaled_gp();
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let samples = gp.sample_parameters_posterior(3, None, &mut rng).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(gp.samples_parameters().len(), 3);
        for s in &samples {
            assert!(gp.log_prob_parameters(s).is_finite());
        }

        gp.sample_parameters_posterior(2, None, &mut rng).unwrap();
        assert_eq!(gp.samples_parameters().len(), 5);
    }

    #[test]
    fn burn_in_moves_start_point() {
        let params = GpParams::default()
            .with_sampler(SliceSamplerParams::default().with_n_burning(2));
        let mut gp =
            GpFittingGaussian::new(KernelSpec::scaled_matern52(1), training_data(), params)
                .unwrap();
        let default = gp.start_point_sampler().clone();
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        gp.sample_parameters_posterior(1, None, &mut rng).unwrap();
        assert_ne!(gp.start_point_sampler(), &default);
    }

    #[test]
    fn posterior_start_of_wrong_length() {
        let mut gp = scaled_gp();
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let res = gp.sample_parameters_posterior(1, Some(DVector::zeros(2)), &mut rng);
        assert!(matches!(res, Err(GpError::DimensionMismatch { .. })));
    }

    #[test]
    fn mle_improves_likelihood() {
        let mut gp = scaled_gp();
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let start = gp.value_parameters();
        let before = gp.objective_llh(&start);
        let mle = gp.mle_parameters(Some(start), &mut rng).unwrap();
        assert!(mle.optimal_value >= before);
        assert::close(mle.optimal_value, gp.objective_llh(&mle.solution), 1E-8);
        let bounds = gp.bounds_parameters();
        assert!(mle
            .solution
            .iter()
            .zip(bounds.iter())
            .all(|(v, b)| b.contains(*v)));
    }

    /// Ten noisy draws of a Matérn 5/2 process with length scale 100 on [0, 500]
    fn sampled_data(rng: &mut Xoshiro256Plus) -> TrainingData {
        let n = 10;
        let points = DMatrix::from_fn(n, 1, |i, _| 500.0 * i as f64 / (n - 1) as f64);
        let kernel = Matern52Kernel::new(DVector::from_element(1, 100.0)).unwrap();
        let mut cov = kernel.covariance(&points, &points);
        for i in 0..n {
            cov[(i, i)] += 1E-10;
        }
        let l = cov.cholesky().unwrap().l();
        let z = DVector::from_fn(n, |_, _| rng.sample::<f64, _>(StandardNormal));
        let noise = DVector::from_fn(n, |_, _| 0.5 * rng.sample::<f64, _>(StandardNormal));
        TrainingData::new(points, l * z + noise, None).unwrap()
    }

    fn sampled_gp() -> GpFittingGaussian {
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        let data = sampled_data(&mut rng);
        GpFittingGaussian::new(KernelSpec::matern52(1), data, GpParams::default()).unwrap()
    }

    #[test]
    fn mle_from_prior_and_posterior_starts_agree() {
        let mut gp = sampled_gp();
        let mut rng = Xoshiro256Plus::seed_from_u64(10);
        let prior_start = gp.sample_parameters_prior(1, &mut rng).pop().unwrap();
        let from_prior = gp.mle_parameters(Some(prior_start), &mut rng).unwrap();
        let from_posterior = gp.mle_parameters(None, &mut rng).unwrap();

        assert::close(from_prior.optimal_value, from_posterior.optimal_value, 1E-6);
        for (a, b) in from_prior.solution.iter().zip(from_posterior.solution.iter()) {
            assert::close(*a, *b, 1E-3 * b.abs().max(1.0));
        }
        // noise 0.5² and length scale near the generating 100
        assert::close(from_prior.solution[0], 0.224, 1E-2);
        assert!(from_prior.solution[2] > 50.0 && from_prior.solution[2] < 150.0);
    }

    #[test]
    fn positive_hyperparameters_are_searched_on_log_scale() {
        let bounds = vec![Bounds::at_least(1E-10), Bounds::free(), Bounds::interval(1.0, 10.0)];
        let scale = LogScale::new(&bounds);
        let search = scale.bounds(&bounds);
        assert::close(search[0].lower.unwrap(), 1E-10_f64.ln(), 1E-12);
        assert_eq!(search[0].upper, None);
        assert_eq!(search[1], Bounds::free());
        assert::close(search[2].upper.unwrap(), 10.0_f64.ln(), 1E-12);

        let theta = DVector::from_column_slice(&[2.0, -3.0, 5.0]);
        let u = scale.to_search(&theta);
        assert::close(u[1], -3.0, 1E-12);
        assert!(scale.to_natural(&u).relative_eq(&theta, 1E-12, 1E-12));

        let grad = scale.chain(&theta, DVector::from_column_slice(&[1.0, 1.0, 1.0]));
        assert!(grad.relative_eq(&DVector::from_column_slice(&[2.0, 1.0, 5.0]), 1E-12, 1E-12));
    }

    #[test]
    fn fit_leaves_the_process_unchanged() {
        let gp = sampled_gp();
        let before = gp.value_parameters();
        let mut rng = Xoshiro256Plus::seed_from_u64(6);
        let fitted = gp.fit_gp_regression(None, &mut rng).unwrap();
        assert_eq!(gp.value_parameters(), before);
        assert!(gp.samples_parameters().is_empty());
        assert_eq!(fitted.samples_parameters().len(), 1);
        assert_ne!(fitted.value_parameters(), before);
        assert!(fitted.objective_llh(&fitted.value_parameters()) > gp.objective_llh(&before));
    }

    #[test]
    fn train_sets_mle_parameters() {
        let mut data_rng = Xoshiro256Plus::seed_from_u64(5);
        let mut rng = Xoshiro256Plus::seed_from_u64(6);
        let gp = GpFittingGaussian::train(
            KernelSpec::matern52(1),
            sampled_data(&mut data_rng),
            true,
            GpParams::default(),
            &mut rng,
        )
        .unwrap();
        let untrained = sampled_gp();
        let default_llh = untrained.objective_llh(&untrained.value_parameters());
        assert!(gp.objective_llh(&gp.value_parameters()) >= default_llh);
    }
}
