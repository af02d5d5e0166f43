//! Persistence of a fitted process
//!
//! Caches are not part of the record; they are rebuilt on first use.
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::kernel::{KernelName, KernelSpec};
use super::{GpError, GpFittingGaussian, GpParams, SliceSamplerParams, TrainingData, NAME_MODEL};
use crate::domain::BoundsDomain;

fn default_max_steps_out() -> usize {
    SliceSamplerParams::default().max_steps_out
}

fn default_name_model() -> String {
    NAME_MODEL.to_string()
}

/// Serializable state of a [`GpFittingGaussian`].
///
/// Only `type_kernel`, `training_data` and `dimensions` are required; the
/// other fields default to an unfitted model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GpRecord {
    pub type_kernel: Vec<KernelName>,
    /// Data the model was built with
    pub training_data: TrainingData,
    pub dimensions: Vec<usize>,
    #[serde(default)]
    pub kernel_values: Vec<f64>,
    #[serde(default)]
    pub mean_value: Vec<f64>,
    #[serde(default)]
    pub var_noise_value: Vec<f64>,
    #[serde(default)]
    pub thinning: usize,
    /// Current data, including points added after construction
    #[serde(default)]
    pub data: Option<TrainingData>,
    #[serde(default)]
    pub bounds_domain: Vec<BoundsDomain>,
    #[serde(default)]
    pub n_burning: usize,
    #[serde(default = "default_max_steps_out")]
    pub max_steps_out: usize,
    #[serde(default)]
    pub type_bounds: Vec<u8>,
    #[serde(default = "default_name_model")]
    pub name_model: String,
    #[serde(default)]
    pub problem_name: String,
    #[serde(default)]
    pub training_name: String,
    #[serde(default)]
    pub same_correlation: bool,
    #[serde(default)]
    pub start_point_sampler: Vec<f64>,
    #[serde(default)]
    pub samples_parameters: Vec<Vec<f64>>,
}

fn single(values: &[f64]) -> Option<f64> {
    values.first().copied()
}

impl GpFittingGaussian {
    /// Record of the model's state
    pub fn serialize(&self) -> GpRecord {
        let params = self.params();
        let spec = self.spec();
        GpRecord {
            type_kernel: spec.type_kernel.clone(),
            training_data: self.training_data().clone(),
            dimensions: spec.dimensions.clone(),
            kernel_values: self.kernel_values().iter().copied().collect(),
            mean_value: vec![self.mean()],
            var_noise_value: vec![self.var_noise()],
            thinning: params.sampler.thinning,
            data: Some(self.data().clone()),
            bounds_domain: params.bounds_domain.clone(),
            n_burning: params.sampler.n_burning,
            max_steps_out: params.sampler.max_steps_out,
            type_bounds: params.bounds_domain.iter().map(BoundsDomain::type_bounds).collect(),
            name_model: NAME_MODEL.to_string(),
            problem_name: params.problem_name.clone(),
            training_name: params.training_name.clone(),
            same_correlation: spec.same_correlation,
            start_point_sampler: self.start_point_sampler().iter().copied().collect(),
            samples_parameters: self
                .samples_parameters()
                .iter()
                .map(|s| s.iter().copied().collect())
                .collect(),
        }
    }

    /// Rebuild a model from its record
    pub fn deserialize(record: GpRecord) -> Result<Self, GpError> {
        let spec = KernelSpec::new(record.type_kernel, record.dimensions, record.same_correlation);
        let sampler = SliceSamplerParams::default()
            .with_thinning(record.thinning)
            .with_n_burning(record.n_burning)
            .with_max_steps_out(record.max_steps_out);

        let mut params = GpParams::default()
            .with_sampler(sampler)
            .with_bounds_domain(record.bounds_domain)
            .with_problem_name(record.problem_name)
            .with_training_name(record.training_name);
        if !record.kernel_values.is_empty() {
            params = params.with_kernel_values(record.kernel_values);
        }
        if let Some(mean) = single(&record.mean_value) {
            params = params.with_mean_value(mean);
        }
        if let Some(var_noise) = single(&record.var_noise_value) {
            params = params.with_var_noise_value(var_noise);
        }

        let mut gp = Self::new(spec, record.training_data, params)?;

        if let Some(data) = record.data {
            let n = gp.training_data().n();
            if data.n() > n {
                let m = data.n() - n;
                let points = data.points().rows(n, m).clone_owned();
                let evaluations = data.evaluations().rows(n, m).clone_owned();
                let var_noise = data.var_noise().map(|v| v.rows(n, m).clone_owned());
                gp.add_points_evaluations(&points, &evaluations, var_noise.as_ref())?;
            }
        }

        let start = if record.start_point_sampler.is_empty() {
            gp.start_point_sampler().clone()
        } else {
            DVector::from_vec(record.start_point_sampler)
        };
        let samples = record
            .samples_parameters
            .into_iter()
            .map(DVector::from_vec)
            .collect();
        gp.set_samples(start, samples);
        Ok(gp)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{scaled_gp, training_data};
    use super::*;
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn record_fields() {
        let mut gp = scaled_gp();
        gp.add_points_evaluations(
            &DMatrix::from_column_slice(1, 1, &[80.0]),
            &DVector::from_column_slice(&[80.0]),
            None,
        )
        .unwrap();
        let record = gp.serialize();
        assert_eq!(
            record.type_kernel,
            vec![KernelName::ScaledKernel, KernelName::Matern52]
        );
        assert_eq!(record.training_data, training_data());
        assert_eq!(record.data.as_ref().map(TrainingData::n), Some(6));
        assert_eq!(record.dimensions, vec![1]);
        assert_eq!(record.type_bounds, vec![0]);
        assert_eq!(record.name_model, "gp_fitting_gaussian");
        assert_eq!(record.max_steps_out, 1);
        assert_eq!(record.start_point_sampler.len(), 4);
        assert::close(record.start_point_sampler[0], 592.547_403_396_915_2, 1E-7);
        assert!(!record.same_correlation);
    }

    #[test]
    fn round_trip_through_json() {
        let mut gp = scaled_gp();
        let mut rng = Xoshiro256Plus::seed_from_u64(11);
        gp.sample_parameters_posterior(2, None, &mut rng).unwrap();
        gp.add_points_evaluations(
            &DMatrix::from_column_slice(1, 1, &[80.0]),
            &DVector::from_column_slice(&[80.0]),
            None,
        )
        .unwrap();

        let json = serde_json::to_string(&gp.serialize()).unwrap();
        let record: GpRecord = serde_json::from_str(&json).unwrap();
        let restored = GpFittingGaussian::deserialize(record).unwrap();

        assert_eq!(restored.serialize(), gp.serialize());
        assert_eq!(restored.value_parameters(), gp.value_parameters());
        assert_eq!(restored.data(), gp.data());
        assert_eq!(restored.samples_parameters().len(), 2);
        assert_eq!(restored.n_factorizations(), 0);
    }

    #[test]
    fn minimal_record() {
        let json = serde_json::json!({
            "type_kernel": ["Matern52"],
            "training_data": serde_json::to_value(training_data()).unwrap(),
            "dimensions": [1],
        });
        let record: GpRecord = serde_json::from_value(json).unwrap();
        let gp = GpFittingGaussian::deserialize(record).unwrap();
        assert_eq!(gp.spec(), &KernelSpec::matern52(1));
        assert_eq!(gp.training_data(), &training_data());
        assert!(gp.bounds_domain().is_empty());
    }
}
