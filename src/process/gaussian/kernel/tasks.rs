use super::{logistic, CovGrad, CovGradError, Kernel, KernelError};
use crate::dist::Gaussian;
use crate::optimize::Bounds;
use crate::process::gaussian::parameter::{Parameter, Prior};
use nalgebra::base::constraint::{SameNumberOfColumns, ShapeConstraint};
use nalgebra::base::storage::Storage;
use nalgebra::{DMatrix, DVector, Dim, Matrix};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Covariance between a finite set of tasks.
///
/// The input is a single column holding the task index (rounded to the
/// nearest integer). Two parameterizations are available:
///
/// * full: `C = L Lᵀ` with `L` lower triangular, its diagonal given by
///   `exp(θ)` and the rest by `θ`. Parameters fill `L` row by row, so there
///   are `n(n + 1) / 2` of them.
/// * same correlation: `C_ii = exp(θ₀)` and `C_ij = exp(θ₀) logistic(θ₁)`.
///
/// Both are positive definite for every parameter value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct TasksKernel {
    n_tasks: usize,
    same_correlation: bool,
    params: DVector<f64>,
}

impl TasksKernel {
    /// Full covariance between `n_tasks` tasks, all parameters zero
    pub fn full(n_tasks: usize) -> Result<Self, KernelError> {
        Self::new(n_tasks, false, DVector::zeros(n_tasks * (n_tasks + 1) / 2))
    }

    /// Shared correlation between `n_tasks` tasks, both parameters zero
    pub fn same_correlation(n_tasks: usize) -> Result<Self, KernelError> {
        Self::new(n_tasks, true, DVector::zeros(2))
    }

    pub fn new(
        n_tasks: usize,
        same_correlation: bool,
        params: DVector<f64>,
    ) -> Result<Self, KernelError> {
        if n_tasks == 0 {
            return Err(KernelError::ParameterOutOfBounds {
                name: "n_tasks".to_string(),
                given: 0.0,
                bounds: (1.0, f64::INFINITY),
            });
        }
        let expected = Self::count(n_tasks, same_correlation);
        if params.len() < expected {
            Err(KernelError::MissingParameters(expected - params.len()))
        } else if params.len() > expected {
            Err(KernelError::ExtraneousParameters(params.len() - expected))
        } else {
            Ok(Self {
                n_tasks,
                same_correlation,
                params,
            })
        }
    }

    fn count(n_tasks: usize, same_correlation: bool) -> usize {
        if same_correlation {
            2
        } else {
            n_tasks * (n_tasks + 1) / 2
        }
    }

    pub fn n_tasks(&self) -> usize {
        self.n_tasks
    }

    pub fn is_same_correlation(&self) -> bool {
        self.same_correlation
    }

    /// Lower triangular factor and, for each parameter, its derivative
    fn factor(&self) -> (DMatrix<f64>, Vec<DMatrix<f64>>) {
        let n = self.n_tasks;
        let mut l = DMatrix::zeros(n, n);
        let mut dl = Vec::with_capacity(self.params.len());
        let mut idx = 0;
        for i in 0..n {
            for j in 0..=i {
                let theta = self.params[idx];
                let mut d = DMatrix::zeros(n, n);
                if i == j {
                    l[(i, j)] = theta.exp();
                    d[(i, j)] = theta.exp();
                } else {
                    l[(i, j)] = theta;
                    d[(i, j)] = 1.0;
                }
                dl.push(d);
                idx += 1;
            }
        }
        (l, dl)
    }

    /// Covariance matrix between the tasks
    pub fn task_covariance(&self) -> DMatrix<f64> {
        self.task_covariance_with_gradient().0
    }

    fn task_covariance_with_gradient(&self) -> (DMatrix<f64>, Vec<DMatrix<f64>>) {
        let n = self.n_tasks;
        if self.same_correlation {
            let var = self.params[0].exp();
            let rho = logistic(self.params[1]);
            let cov = DMatrix::from_fn(n, n, |i, j| {
                if i == j {
                    var
                } else {
                    var * rho
                }
            });
            let d_rho = DMatrix::from_fn(n, n, |i, j| {
                if i == j {
                    0.0
                } else {
                    var * rho * (1.0 - rho)
                }
            });
            (cov.clone(), vec![cov, d_rho])
        } else {
            let (l, dl) = self.factor();
            let cov = &l * l.transpose();
            let grads = dl
                .iter()
                .map(|d| {
                    let a = d * l.transpose();
                    &a + a.transpose()
                })
                .collect();
            (cov, grads)
        }
    }

    /// Task index of a row, clamped to the known tasks
    #[inline]
    fn task(&self, value: f64) -> usize {
        (value.round().max(0.0) as usize).min(self.n_tasks - 1)
    }
}

impl Kernel for TasksKernel {
    fn n_parameters(&self) -> usize {
        self.params.len()
    }

    fn input_dim(&self) -> usize {
        1
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
        let cov = self.task_covariance();
        DMatrix::from_fn(x1.nrows(), x2.nrows(), |i, j| {
            cov[(self.task(x1[(i, 0)]), self.task(x2[(j, 0)]))]
        })
    }

    fn parameters(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn reparameterize(&self, params: &[f64]) -> Result<Self, KernelError> {
        Self::new(
            self.n_tasks,
            self.same_correlation,
            DVector::from_column_slice(params),
        )
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
        let tasks: Vec<usize> = (0..n).map(|i| self.task(x[(i, 0)])).collect();
        let (cov, grads) = self.task_covariance_with_gradient();
        let expand = |m: &DMatrix<f64>| {
            DMatrix::from_fn(n, n, |i, j| m[(tasks[i], tasks[j])])
        };
        let slices: Vec<DMatrix<f64>> = grads.iter().map(expand).collect();
        Ok((expand(&cov), CovGrad::new(&slices)?))
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
        DMatrix::zeros(x2.nrows(), point.ncols())
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
        let d = point.ncols();
        vec![DMatrix::zeros(d, d); x2.nrows()]
    }

    fn hyperparameters(
        &self,
        _points: &DMatrix<f64>,
        _evaluations: &DVector<f64>,
    ) -> Vec<Parameter> {
        let n = self.params.len();
        vec![Parameter::new(
            "lower_triangular",
            DVector::zeros(n),
            vec![Prior::Gaussian(Gaussian::standard()); n],
            vec![Bounds::free(); n],
        )]
    }
}
