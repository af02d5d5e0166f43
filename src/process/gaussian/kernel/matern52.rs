use super::{
    mean_pairwise_abs_diff, scaled_sq_dist, CovGrad, CovGradError, Kernel,
    KernelError,
};
use crate::consts::{LENGTH_SCALE_DIVISOR, SMALLEST_POSITIVE_NUMBER, SQRT_5};
use crate::dist::Uniform;
use crate::optimize::Bounds;
use crate::process::gaussian::parameter::{positive_or_one, Parameter, Prior};
use nalgebra::base::constraint::{SameNumberOfColumns, ShapeConstraint};
use nalgebra::base::storage::Storage;
use nalgebra::{DMatrix, DVector, Dim, Matrix};
use std::f64;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Matérn kernel with ν = 5/2 and one length scale per input dimension
///
/// ```math
///     K(\mathbf{x}, \mathbf{x'}) = \left(1 + \sqrt{5} r + \frac{5}{3} r^2\right) \exp(-\sqrt{5} r),
///     \quad r^2 = \sum_i \left(\frac{x_i - x'_i}{l_i}\right)^2
/// ```
///
/// # Parameters
/// * `length_scales` - One positive length scale per input column.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Matern52Kernel {
    length_scales: DVector<f64>,
}

impl Matern52Kernel {
    /// Create a new Matérn-5/2 kernel with the given length scales
    pub fn new(length_scales: DVector<f64>) -> Result<Self, KernelError> {
        match length_scales.iter().find(|l| !(**l > 0.0 && l.is_finite())) {
            Some(&given) => Err(KernelError::ParameterOutOfBounds {
                name: "length_scale".to_string(),
                given,
                bounds: (0.0, f64::INFINITY),
            }),
            None => Ok(Self { length_scales }),
        }
    }

    /// Create a new `Matern52Kernel` without checking parameters
    #[must_use]
    pub fn new_unchecked(length_scales: DVector<f64>) -> Self {
        Self { length_scales }
    }

    pub fn length_scales(&self) -> &DVector<f64> {
        &self.length_scales
    }

    /// k(r) and the common factor (5/3)(1 + √5 r) exp(-√5 r) of its
    /// derivatives.
    #[inline]
    fn value_and_factor(r: f64) -> (f64, f64) {
        let e = (-SQRT_5 * r).exp();
        let value = (1.0 + SQRT_5 * r + 5.0 * r * r / 3.0) * e;
        let factor = 5.0 / 3.0 * (1.0 + SQRT_5 * r) * e;
        (value, factor)
    }
}

impl Kernel for Matern52Kernel {
    fn n_parameters(&self) -> usize {
        self.length_scales.len()
    }

    fn input_dim(&self) -> usize {
        self.length_scales.len()
    }

    fn covariance<R1, R2, C1, C2, S1, S2>(
        &self,
        x1: &Matrix<f64, R1, C1, S1>,
        x2: &Matrix<f64, R2, C2, S2>,
    ) -> DMatrix<f64>
    where
        R1: Dim,
        R2: Dim,
        C1: Dim,
        C2: Dim,
        S1: Storage<f64, R1, C1>,
        S2: Storage<f64, R2, C2>,
        ShapeConstraint: SameNumberOfColumns<C1, C2>,
    {
        DMatrix::from_fn(x1.nrows(), x2.nrows(), |i, j| {
            let r =
                scaled_sq_dist(&x1.row(i), &x2.row(j), &self.length_scales)
                    .sqrt();
            Self::value_and_factor(r).0
        })
    }

    fn parameters(&self) -> DVector<f64> {
        self.length_scales.clone()
    }

    fn reparameterize(&self, params: &[f64]) -> Result<Self, KernelError> {
        let n = self.n_parameters();
        if params.len() < n {
            Err(KernelError::MissingParameters(n - params.len()))
        } else if params.len() > n {
            Err(KernelError::ExtraneousParameters(params.len() - n))
        } else {
            Self::new(DVector::from_column_slice(params))
        }
    }

    fn covariance_with_gradient<R, C, S>(
        &self,
        x: &Matrix<f64, R, C, S>,
    ) -> Result<(DMatrix<f64>, CovGrad), CovGradError>
    where
        R: Dim,
        C: Dim,
        S: Storage<f64, R, C>,
    {
        let n = x.nrows();
        let d = self.length_scales.len();
        let mut cov = DMatrix::zeros(n, n);
        let mut grad = CovGrad::zeros(n, d);

        for i in 0..n {
            cov[(i, i)] = 1.0;
            for j in 0..i {
                let r = scaled_sq_dist(&x.row(i), &x.row(j), &self.length_scales)
                    .sqrt();
                let (value, factor) = Self::value_and_factor(r);
                cov[(i, j)] = value;
                cov[(j, i)] = value;
                for k in 0..d {
                    let l = self.length_scales[k];
                    let diff = x[(i, k)] - x[(j, k)];
                    let g = factor * diff * diff / (l * l * l);
                    grad[(i, j, k)] = g;
                    grad[(j, i, k)] = g;
                }
            }
        }
        Ok((cov, grad))
    }

    fn gradient_respect_point<R1, R2, C1, C2, S1, S2>(
        &self,
        point: &Matrix<f64, R1, C1, S1>,
        x2: &Matrix<f64, R2, C2, S2>,
    ) -> DMatrix<f64>
    where
        R1: Dim,
        R2: Dim,
        C1: Dim,
        C2: Dim,
        S1: Storage<f64, R1, C1>,
        S2: Storage<f64, R2, C2>,
        ShapeConstraint: SameNumberOfColumns<C1, C2>,
    {
        let d = self.length_scales.len();
        let p = point.row(0);
        let mut grad = DMatrix::zeros(x2.nrows(), d);
        for j in 0..x2.nrows() {
            let r = scaled_sq_dist(&p, &x2.row(j), &self.length_scales).sqrt();
            let (_, factor) = Self::value_and_factor(r);
            for k in 0..d {
                let l = self.length_scales[k];
                grad[(j, k)] = -factor * (p[k] - x2[(j, k)]) / (l * l);
            }
        }
        grad
    }

    fn hessian_respect_point<R1, R2, C1, C2, S1, S2>(
        &self,
        point: &Matrix<f64, R1, C1, S1>,
        x2: &Matrix<f64, R2, C2, S2>,
    ) -> Vec<DMatrix<f64>>
    where
        R1: Dim,
        R2: Dim,
        C1: Dim,
        C2: Dim,
        S1: Storage<f64, R1, C1>,
        S2: Storage<f64, R2, C2>,
        ShapeConstraint: SameNumberOfColumns<C1, C2>,
    {
        let d = self.length_scales.len();
        let p = point.row(0);
        (0..x2.nrows())
            .map(|j| {
                let r = scaled_sq_dist(&p, &x2.row(j), &self.length_scales)
                    .sqrt();
                let (_, factor) = Self::value_and_factor(r);
                let e = (-SQRT_5 * r).exp();
                let u = DVector::from_fn(d, |k, _| {
                    let l = self.length_scales[k];
                    (p[k] - x2[(j, k)]) / (l * l)
                });
                let mut hessian = &u * u.transpose() * (25.0 / 3.0 * e);
                for k in 0..d {
                    let l = self.length_scales[k];
                    hessian[(k, k)] -= factor / (l * l);
                }
                hessian
            })
            .collect()
    }

    fn hyperparameters(
        &self,
        points: &DMatrix<f64>,
        _evaluations: &DVector<f64>,
    ) -> Vec<Parameter> {
        let mean_ls = mean_pairwise_abs_diff(points)
            .map(|m| positive_or_one(m / LENGTH_SCALE_DIVISOR));
        let d = self.length_scales.len();
        let value = if mean_ls.len() == d {
            mean_ls
        } else {
            DVector::repeat(d, 1.0)
        };
        let priors = value
            .iter()
            .map(|&m| {
                Prior::Uniform(Uniform::new_unchecked(SMALLEST_POSITIVE_NUMBER, m))
            })
            .collect();
        let bounds = vec![Bounds::at_least(SMALLEST_POSITIVE_NUMBER); d];
        vec![Parameter::new("length_scale", value, priors, bounds)]
    }
}
