use super::{CovGrad, CovGradError, Kernel, KernelError, KernelType};
use crate::consts::SMALLEST_POSITIVE_NUMBER;
use crate::dist::LogNormal;
use crate::misc::mean_and_variance;
use crate::optimize::Bounds;
use crate::process::gaussian::parameter::{positive_or_one, Parameter, Prior};
use nalgebra::base::constraint::{SameNumberOfColumns, ShapeConstraint};
use nalgebra::base::storage::Storage;
use nalgebra::{DMatrix, DVector, Dim, Matrix};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Kernel multiplied by a signal variance, `σ² k(x, x')`.
///
/// Parameters are the inner kernel's followed by `σ²`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct ScaledKernel {
    kernel: Box<KernelType>,
    sigma2: f64,
}

impl ScaledKernel {
    pub fn new(kernel: KernelType, sigma2: f64) -> Result<Self, KernelError> {
        if sigma2 > 0.0 && sigma2.is_finite() {
            Ok(Self {
                kernel: Box::new(kernel),
                sigma2,
            })
        } else {
            Err(KernelError::ParameterOutOfBounds {
                name: "sigma2".to_string(),
                given: sigma2,
                bounds: (0.0, f64::INFINITY),
            })
        }
    }

    /// The kernel being scaled
    pub fn inner(&self) -> &KernelType {
        &self.kernel
    }

    /// Signal variance
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }
}

impl Kernel for ScaledKernel {
    fn n_parameters(&self) -> usize {
        self.kernel.n_parameters() + 1
    }

    fn input_dim(&self) -> usize {
        self.kernel.input_dim()
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
        self.kernel.covariance(x1, x2) * self.sigma2
    }

    fn parameters(&self) -> DVector<f64> {
        let inner = self.kernel.parameters();
        DVector::from_iterator(
            inner.len() + 1,
            inner.iter().copied().chain(std::iter::once(self.sigma2)),
        )
    }

    fn reparameterize(&self, params: &[f64]) -> Result<Self, KernelError> {
        let (kernel, rest) = self.kernel.consume_parameters(params)?;
        match rest {
            [] => Err(KernelError::MissingParameters(1)),
            [sigma2] => Self::new(kernel, *sigma2),
            _ => Err(KernelError::ExtraneousParameters(rest.len() - 1)),
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
        let (cov, grad) = self.kernel.covariance_with_gradient(x)?;
        let scaled_grad = grad.scale(self.sigma2);
        let sigma_grad = CovGrad::new(&[cov.clone()])?;
        Ok((cov * self.sigma2, scaled_grad.chain(&sigma_grad)?))
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
        self.kernel.gradient_respect_point(point, x2) * self.sigma2
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
        self.kernel
            .hessian_respect_point(point, x2)
            .into_iter()
            .map(|h| h * self.sigma2)
            .collect()
    }

    /// The signal variance defaults to the variance of the evaluations; its
    /// prior is the square of a `LogNormal(√var, 1)` variate.
    fn hyperparameters(
        &self,
        points: &DMatrix<f64>,
        evaluations: &DVector<f64>,
    ) -> Vec<Parameter> {
        let (_, var) = mean_and_variance(evaluations);
        let var = positive_or_one(var);
        let mut params = self.kernel.hyperparameters(points, evaluations);
        params.push(Parameter::new(
            "sigma2",
            DVector::from_element(1, var),
            vec![Prior::LogNormal(LogNormal::squared(var.sqrt(), 1.0).unwrap_or_default())],
            vec![Bounds::at_least(SMALLEST_POSITIVE_NUMBER)],
        ));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::misc::forward_difference;
    use crate::process::gaussian::kernel::Matern52Kernel;

    fn scaled(ls: f64, sigma2: f64) -> ScaledKernel {
        let inner = KernelType::Matern52(
            Matern52Kernel::new(DVector::from_element(1, ls)).unwrap(),
        );
        ScaledKernel::new(inner, sigma2).unwrap()
    }

    #[test]
    fn parameters_end_with_sigma2() {
        let k = scaled(2.0, 3.0);
        assert_eq!(k.parameters().as_slice(), &[2.0, 3.0]);
        let k2 = k.reparameterize(&[1.0, 0.5]).unwrap();
        assert_eq!(k2.sigma2(), 0.5);
        assert_eq!(k.reparameterize(&[1.0]), Err(KernelError::MissingParameters(1)));
    }

    #[test]
    fn self_covariance_is_sigma2() {
        let k = scaled(2.0, 3.0);
        let x = DMatrix::from_column_slice(2, 1, &[0.0, 1.0]);
        let cov = k.covariance(&x, &x);
        assert!(cov
            .diagonal()
            .relative_eq(&DVector::repeat(2, 3.0), 1E-12, 1E-12));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let k = scaled(14.0, 0.9);
        let x = DMatrix::from_column_slice(3, 1, &[0.0, 10.0, 25.0]);
        let (_, grad) = k.covariance_with_gradient(&x).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let fd = forward_difference(
                    |theta: &DVector<f64>| {
                        k.reparameterize(theta.as_slice()).unwrap().covariance(&x, &x)[(i, j)]
                    },
                    &k.parameters(),
                    1E-7,
                );
                assert::close(grad[(i, j, 0)], fd[0], 1E-5);
                assert::close(grad[(i, j, 1)], fd[1], 1E-5);
            }
        }
    }

    #[test]
    fn default_sigma2_is_variance() {
        let k = scaled(1.0, 1.0);
        let x = DMatrix::from_column_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let y = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
        let params = k.hyperparameters(&x, &y);
        assert_eq!(params.len(), 2);
        assert_eq!(params[1].name(), "sigma2");
        assert::close(params[1].value()[0], 1.25, 1E-12);
    }
}
