//! Gaussian process surrogates and stratified Bayesian quadrature.
//!
//! The crate has two engines:
//!
//! * [`process::gaussian::GpFittingGaussian`] fits a Gaussian process to
//!   noisy scalar observations: Cholesky based regression, analytic
//!   log-likelihood gradients, maximum likelihood and slice-sampled
//!   hyperparameters.
//! * [`quadrature::BayesianQuadrature`] wraps a fitted process and exposes the
//!   posterior of `G(x) = E_w[F(x, w)]`, where `w` are nuisance dimensions
//!   (e.g. tasks), together with the pieces the knowledge gradient needs.
//!
//! # Example
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use rand::SeedableRng;
//! use sbo::prelude::*;
//!
//! let points = DMatrix::from_column_slice(3, 1, &[0.0, 5.0, 10.0]);
//! let evaluations = DVector::from_column_slice(&[0.0, 4.0, 10.0]);
//! let data = TrainingData::new(points, evaluations, None).unwrap();
//!
//! let spec = KernelSpec::matern52(1);
//! let gp = GpFittingGaussian::new(spec, data, GpParams::default()).unwrap();
//!
//! let query = DMatrix::from_column_slice(1, 1, &[2.5]);
//! let posterior = gp.compute_posterior_parameters(&query, false, true).unwrap();
//! assert_eq!(posterior.mean.len(), 1);
//! ```
#![warn(
    clippy::all,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::unseparated_literal_suffix,
    clippy::unreadable_literal,
    clippy::option_option,
    clippy::implicit_clone
)]

pub mod consts;
pub mod dist;
pub mod domain;
pub mod misc;
pub mod optimize;
pub mod prelude;
pub mod process;
pub mod quadrature;
pub mod traits;
