use super::{CovGrad, CovGradError, Kernel, KernelError, KernelType};
use crate::process::gaussian::parameter::Parameter;
use nalgebra::base::constraint::{SameNumberOfColumns, ShapeConstraint};
use nalgebra::base::storage::Storage;
use nalgebra::{DMatrix, DVector, Dim, Matrix};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Product of kernels, each acting on its own block of input columns.
///
/// Blocks are consecutive and in the order of the kernels: the first kernel
/// reads the first `input_dim` columns, the second the next ones, and so on.
/// Parameters are the concatenation of the sub-kernels' parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct ProductKernelSeparable {
    kernels: Vec<KernelType>,
}

impl ProductKernelSeparable {
    pub fn new(kernels: Vec<KernelType>) -> Result<Self, KernelError> {
        if kernels.is_empty() {
            Err(KernelError::EmptySpec)
        } else {
            Ok(Self { kernels })
        }
    }

    pub fn kernels(&self) -> &[KernelType] {
        &self.kernels
    }

    /// `(first column, number of columns)` of every block
    fn blocks(&self) -> Vec<(usize, usize)> {
        let mut start = 0;
        self.kernels
            .iter()
            .map(|k| {
                let block = (start, k.input_dim());
                start += block.1;
                block
            })
            .collect()
    }

    /// Covariance of every sub-kernel between `point` and `x2`, as rows
    fn block_covariances<R1, R2, C1, C2, S1, S2>(
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
    {
        self.kernels
            .iter()
            .zip(self.blocks())
            .map(|(k, (start, d))| {
                k.covariance(&point.columns(start, d), &x2.columns(start, d))
            })
            .collect()
    }

    /// Gradient of every sub-kernel with respect to its block of `point`
    fn block_gradients<R1, R2, C1, C2, S1, S2>(
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
    {
        self.kernels
            .iter()
            .zip(self.blocks())
            .map(|(k, (start, d))| {
                k.gradient_respect_point(&point.columns(start, d), &x2.columns(start, d))
            })
            .collect()
    }

    /// Hessian of every sub-kernel with respect to its block of `point`
    fn block_hessians<R1, R2, C1, C2, S1, S2>(
        &self,
        point: &Matrix<f64, R1, C1, S1>,
        x2: &Matrix<f64, R2, C2, S2>,
    ) -> Vec<Vec<DMatrix<f64>>>
    where
        R1: Dim,
        R2: Dim,
        C1: Dim,
        C2: Dim,
        S1: Storage<f64, R1, C1>,
        S2: Storage<f64, R2, C2>,
    {
        self.kernels
            .iter()
            .zip(self.blocks())
            .map(|(k, (start, d))| {
                k.hessian_respect_point(&point.columns(start, d), &x2.columns(start, d))
            })
            .collect()
    }
}

impl Kernel for ProductKernelSeparable {
    fn n_parameters(&self) -> usize {
        self.kernels.iter().map(Kernel::n_parameters).sum()
    }

    fn input_dim(&self) -> usize {
        self.kernels.iter().map(Kernel::input_dim).sum()
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
        self.block_covariances(x1, x2)
            .into_iter()
            .reduce(|acc, c| acc.component_mul(&c))
            .unwrap_or_else(|| DMatrix::repeat(x1.nrows(), x2.nrows(), 1.0))
    }

    fn parameters(&self) -> DVector<f64> {
        let params: Vec<f64> = self
            .kernels
            .iter()
            .flat_map(|k| k.parameters().iter().copied().collect::<Vec<_>>())
            .collect();
        DVector::from_vec(params)
    }

    fn reparameterize(&self, params: &[f64]) -> Result<Self, KernelError> {
        let mut rest = params;
        let mut kernels = Vec::with_capacity(self.kernels.len());
        for k in &self.kernels {
            let (new_kernel, next) = k.consume_parameters(rest)?;
            kernels.push(new_kernel);
            rest = next;
        }
        if rest.is_empty() {
            Ok(Self { kernels })
        } else {
            Err(KernelError::ExtraneousParameters(rest.len()))
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
        let parts = self
            .kernels
            .iter()
            .zip(self.blocks())
            .map(|(k, (start, d))| k.covariance_with_gradient(&x.columns(start, d)))
            .collect::<Result<Vec<_>, _>>()?;

        let n = x.nrows();
        let mut cov = DMatrix::repeat(n, n, 1.0);
        parts.iter().for_each(|(c, _)| cov.component_mul_assign(c));

        let mut grad: Option<CovGrad> = None;
        for (b, (_, grad_b)) in parts.iter().enumerate() {
            let mut others = DMatrix::repeat(n, n, 1.0);
            parts
                .iter()
                .enumerate()
                .filter(|(c, _)| *c != b)
                .for_each(|(_, (cov_c, _))| others.component_mul_assign(cov_c));
            let block_grad = grad_b.component_mul(&others)?;
            grad = Some(match grad {
                Some(g) => g.chain(&block_grad)?,
                None => block_grad,
            });
        }
        let grad = grad.ok_or(CovGradError::Empty)?;
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
        let m = x2.nrows();
        let covs = self.block_covariances(point, x2);
        let grads = self.block_gradients(point, x2);
        let mut grad = DMatrix::zeros(m, self.input_dim());
        for (b, (grad_b, (start, d))) in grads.iter().zip(self.blocks()).enumerate() {
            for j in 0..m {
                let others: f64 = covs
                    .iter()
                    .enumerate()
                    .filter(|(c, _)| *c != b)
                    .map(|(_, cov)| cov[(0, j)])
                    .product();
                for u in 0..d {
                    grad[(j, start + u)] = grad_b[(j, u)] * others;
                }
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
        let m = x2.nrows();
        let dim = self.input_dim();
        let blocks = self.blocks();
        let covs = self.block_covariances(point, x2);
        let grads = self.block_gradients(point, x2);
        let hessians = self.block_hessians(point, x2);

        // product of the block covariances at row j, leaving out `skip`
        let others = |j: usize, skip: &[usize]| -> f64 {
            covs.iter()
                .enumerate()
                .filter(|(c, _)| !skip.contains(c))
                .map(|(_, cov)| cov[(0, j)])
                .product()
        };

        (0..m)
            .map(|j| {
                let mut hessian = DMatrix::zeros(dim, dim);
                for (b, &(sb, db)) in blocks.iter().enumerate() {
                    for (c, &(sc, dc)) in blocks.iter().enumerate() {
                        if b == c {
                            let scale = others(j, &[b]);
                            let h = &hessians[b][j];
                            for u in 0..db {
                                for v in 0..db {
                                    hessian[(sb + u, sb + v)] = h[(u, v)] * scale;
                                }
                            }
                        } else {
                            let scale = others(j, &[b, c]);
                            for u in 0..db {
                                for v in 0..dc {
                                    hessian[(sb + u, sc + v)] =
                                        grads[b][(j, u)] * grads[c][(j, v)] * scale;
                                }
                            }
                        }
                    }
                }
                hessian
            })
            .collect()
    }

    fn hyperparameters(
        &self,
        points: &DMatrix<f64>,
        evaluations: &DVector<f64>,
    ) -> Vec<Parameter> {
        self.kernels
            .iter()
            .zip(self.blocks())
            .flat_map(|(k, (start, d))| {
                let block = if points.ncols() >= start + d {
                    points.columns(start, d).into_owned()
                } else {
                    DMatrix::zeros(0, d)
                };
                k.hyperparameters(&block, evaluations)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::misc::forward_difference;
    use crate::process::gaussian::kernel::{KernelSpec, Matern52Kernel, TasksKernel};

    fn matern_tasks() -> KernelType {
        KernelType::from_spec(&KernelSpec::matern52_tasks(2, 2))
            .unwrap()
            .reparameterize(&[1.5, 0.7, 0.3, -0.4, 0.2])
            .unwrap()
    }

    fn matern_matern() -> ProductKernelSeparable {
        ProductKernelSeparable::new(vec![
            KernelType::Matern52(Matern52Kernel::new(DVector::from_element(1, 1.3)).unwrap()),
            KernelType::Matern52(
                Matern52Kernel::new(DVector::from_column_slice(&[0.8, 2.0])).unwrap(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn covariance_is_product_of_blocks() {
        let matern = Matern52Kernel::new(DVector::from_element(1, 1.0)).unwrap();
        let tasks = TasksKernel::full(1).unwrap();
        let k = ProductKernelSeparable::new(vec![
            KernelType::Matern52(matern),
            KernelType::Tasks(tasks),
        ])
        .unwrap();
        let x = DMatrix::from_row_slice(1, 2, &[2.0, 0.0]);
        let y = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
        assert::close(k.covariance(&x, &y)[(0, 0)], 0.523_994_108_831_820_3, 1E-12);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let k = matern_tasks();
        let x = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 0.0, 2.0, -1.0, 1.0, 0.5, 0.5, 1.0]);
        let (cov, grad) = k.covariance_with_gradient(&x).unwrap();
        assert!(cov.relative_eq(&k.covariance(&x, &x), 1E-12, 1E-12));
        for i in 0..3 {
            for j in 0..3 {
                let fd = forward_difference(
                    |theta: &DVector<f64>| {
                        k.reparameterize(theta.as_slice()).unwrap().covariance(&x, &x)[(i, j)]
                    },
                    &k.parameters(),
                    1E-7,
                );
                for p in 0..k.n_parameters() {
                    assert::close(grad[(i, j, p)], fd[p], 1E-5);
                }
            }
        }
    }

    #[test]
    fn gradient_respect_point_matches_finite_differences() {
        let k = matern_matern();
        let point = DMatrix::from_row_slice(1, 3, &[0.2, -0.1, 0.4]);
        let x2 = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, -0.5, 0.3, 1.0]);
        let grad = k.gradient_respect_point(&point, &x2);
        for j in 0..2 {
            let fd = forward_difference(
                |p: &DVector<f64>| {
                    let p = DMatrix::from_row_slice(1, 3, p.as_slice());
                    k.covariance(&p, &x2.rows(j, 1))[(0, 0)]
                },
                &DVector::from_column_slice(point.as_slice()),
                1E-7,
            );
            for a in 0..3 {
                assert::close(grad[(j, a)], fd[a], 1E-5);
            }
        }
    }

    #[test]
    fn hessian_respect_point_matches_finite_differences() {
        let k = matern_matern();
        let point = DMatrix::from_row_slice(1, 3, &[0.2, -0.1, 0.4]);
        let x2 = DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]);
        let hessian = &k.hessian_respect_point(&point, &x2)[0];
        assert!(hessian.relative_eq(&hessian.transpose(), 1E-10, 1E-10));
        for a in 0..3 {
            let fd = forward_difference(
                |p: &DVector<f64>| {
                    let p = DMatrix::from_row_slice(1, 3, p.as_slice());
                    k.gradient_respect_point(&p, &x2)[(0, a)]
                },
                &DVector::from_column_slice(point.as_slice()),
                1E-7,
            );
            for b in 0..3 {
                assert::close(hessian[(a, b)], fd[b], 1E-5);
            }
        }
    }

    #[test]
    fn task_block_has_no_point_gradient() {
        let k = matern_tasks();
        let point = DMatrix::from_row_slice(1, 3, &[0.2, -0.1, 1.0]);
        let x2 = DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]);
        let grad = k.gradient_respect_point(&point, &x2);
        assert_eq!(grad[(0, 2)], 0.0);
        assert!(grad[(0, 0)] != 0.0);
    }

    #[test]
    fn hyperparameters_per_block() {
        let k = matern_tasks();
        let x = DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 0.0, 3.24, 6.48, 1.0]);
        let y = DVector::from_column_slice(&[1.0, 2.0]);
        let params = k.hyperparameters(&x, &y);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].dimension(), 2);
        assert::close(params[0].value()[0], 5.0, 1E-12);
        assert::close(params[0].value()[1], 10.0, 1E-12);
        assert_eq!(params[1].dimension(), 3);
    }
}
