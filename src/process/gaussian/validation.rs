//! Leave-one-out validation of fitted hyperparameters
use std::path::{Path, PathBuf};

use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use super::kernel::KernelSpec;
use super::{GpError, GpFittingGaussian, GpParams, TrainingData};
use crate::consts::Z_95;

/// Root directory of the diagnostic plots
pub const DIAGNOSTIC_KERNEL_DIR: &str = "results/diagnostic_kernel";

/// Draws the diagnostic plots of a cross-validation run
pub trait DiagnosticPlotter {
    /// Histogram of the standardized leave-one-out residuals
    fn histogram(&mut self, residuals: &[f64], path: &Path);

    /// Leave-one-out means, with their 95% intervals, against the
    /// observations
    fn mean_vs_observations(
        &mut self,
        observations: &[f64],
        means: &[f64],
        half_widths: &[f64],
        path: &Path,
    );
}

/// Plotter that draws nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPlotter;

impl DiagnosticPlotter for NoPlotter {
    fn histogram(&mut self, _residuals: &[f64], _path: &Path) {}

    fn mean_vs_observations(
        &mut self,
        _observations: &[f64],
        _means: &[f64],
        _half_widths: &[f64],
        _path: &Path,
    ) {
    }
}

/// Outcome of a leave-one-out validation
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct CrossValidationResult {
    pub filename_histogram: PathBuf,
    pub filename_plot: PathBuf,
    /// Held out observations
    pub y_eval: DVector<f64>,
    pub n_data: usize,
    /// Leave-one-out posterior means
    pub means: DVector<f64>,
    /// Leave-one-out predictive variances, noise included
    pub variances: DVector<f64>,
    /// Fraction of observations inside their 95% interval, or -1 when the
    /// starting point is not valid
    pub success_proportion: f64,
}

/// Whether `value` lies in the 95% interval of a Gaussian with mean `mean`
/// and variance `var + var_noise`.
pub fn check_value_within_ci(value: f64, mean: f64, var: f64, var_noise: f64) -> bool {
    (value - mean).abs() <= Z_95 * (var + var_noise).sqrt()
}

fn python_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

/// Paths of the histogram and of the means-vs-observations plot
pub fn diagnostic_filenames(
    spec: &KernelSpec,
    problem_name: &str,
    n_data: usize,
    var_noise: Option<f64>,
) -> (PathBuf, PathBuf) {
    let noise = var_noise.map_or_else(|| "None".to_string(), |v| v.to_string());
    let suffix = format!(
        "{}_{}_same_correlation_{}_{}_{}.png",
        problem_name,
        spec.names_joined(),
        python_bool(spec.same_correlation),
        n_data,
        noise
    );
    let dir = Path::new(DIAGNOSTIC_KERNEL_DIR).join(problem_name);
    (
        dir.join(format!("validation_kernel_histogram_{}", suffix)),
        dir.join(format!("validation_kernel_mean_vs_observations_{}", suffix)),
    )
}

fn leave_one_out(data: &TrainingData, i: usize) -> Result<TrainingData, GpError> {
    let points: DMatrix<f64> = data.points().clone().remove_row(i);
    let evaluations: DVector<f64> = data.evaluations().clone().remove_row(i);
    let var_noise = data.var_noise().map(|v| v.clone().remove_row(i));
    TrainingData::new(points, evaluations, var_noise)
}

/// Posterior mean and predictive variance at the held out point `i`
fn predict_held_out<R: Rng>(
    spec: &KernelSpec,
    data: &TrainingData,
    i: usize,
    start: &DVector<f64>,
    params: &GpParams,
    rng: &mut R,
) -> Result<(f64, f64), GpError> {
    let gp = GpFittingGaussian::new(spec.clone(), leave_one_out(data, i)?, params.clone())?
        .fit_gp_regression(Some(start.clone()), rng)?;

    let point = data.points().rows(i, 1).clone_owned();
    let posterior = gp.compute_posterior_parameters(&point, false, true)?;
    let var = posterior.cov.map_or(0.0, |c| c[(0, 0)]);
    let noise = gp.var_noise() + data.var_noise().map_or(0.0, |v| v[i]);
    Ok((posterior.mean[0], var + noise))
}

/// Leave-one-out validation of maximum likelihood hyperparameters.
///
/// For each observation, a process is fitted to the others starting from
/// `start`, and the observation is checked against the 95% predictive
/// interval at its point. When `start` does not have one entry per
/// hyperparameter, or lies outside their bounds, no fit is attempted and the
/// success proportion is -1.
pub fn cross_validation_mle_parameters<P, R>(
    spec: &KernelSpec,
    data: &TrainingData,
    problem_name: &str,
    start: &DVector<f64>,
    params: &GpParams,
    plotter: &mut P,
    rng: &mut R,
) -> Result<CrossValidationResult, GpError>
where
    P: DiagnosticPlotter,
    R: Rng,
{
    let n = data.n();
    let (filename_histogram, filename_plot) =
        diagnostic_filenames(spec, problem_name, n, params.var_noise_value);

    let reference = GpFittingGaussian::new(spec.clone(), data.clone(), params.clone())?;
    let valid_start = start.len() == reference.dimension_parameters()
        && start
            .iter()
            .zip(reference.bounds_parameters().iter())
            .all(|(v, b)| b.contains(*v));
    if !valid_start {
        warn!("invalid starting point for cross validation: {}", start.transpose());
        return Ok(CrossValidationResult {
            filename_histogram,
            filename_plot,
            y_eval: data.evaluations().clone(),
            n_data: n,
            means: DVector::zeros(0),
            variances: DVector::zeros(0),
            success_proportion: -1.0,
        });
    }

    let mut means = DVector::from_element(n, f64::NAN);
    let mut variances = DVector::from_element(n, f64::NAN);
    let mut successes = 0;
    for i in 0..n {
        match predict_held_out(spec, data, i, start, params, rng) {
            Ok((mean, var)) => {
                means[i] = mean;
                variances[i] = var;
                if check_value_within_ci(data.evaluations()[i], mean, var, 0.0) {
                    successes += 1;
                }
            }
            Err(e) => warn!("cross validation fold {} failed: {}", i, e),
        }
    }
    let success_proportion = if n == 0 {
        0.0
    } else {
        successes as f64 / n as f64
    };
    info!(
        "cross validation of {} on {}: success proportion {}",
        spec.names_joined(),
        problem_name,
        success_proportion
    );

    let y = data.evaluations();
    let residuals: Vec<f64> = (0..n)
        .filter(|&i| means[i].is_finite())
        .map(|i| (y[i] - means[i]) / variances[i].sqrt())
        .collect();
    let half_widths: Vec<f64> = variances.iter().map(|v| Z_95 * v.sqrt()).collect();
    plotter.histogram(&residuals, &filename_histogram);
    plotter.mean_vs_observations(y.as_slice(), means.as_slice(), &half_widths, &filename_plot);

    Ok(CrossValidationResult {
        filename_histogram,
        filename_plot,
        y_eval: y.clone(),
        n_data: n,
        means,
        variances,
        success_proportion,
    })
}
