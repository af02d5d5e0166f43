//! Covariance kernels for Gaussian processes
//!
//! Kernels carry their hyperparameters on the natural scale (length scales
//! and signal variance are positive, task parameters are unconstrained).
//! Parameter vectors are flat and ordered the same way `parameters` reports
//! them, so a kernel can be rebuilt from any slice of an optimizer's state.

use nalgebra::base::constraint::{SameNumberOfColumns, ShapeConstraint};
use nalgebra::base::storage::Storage;
use nalgebra::{DMatrix, DVector, Dim, Matrix};
use std::f64;
use std::fmt;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use super::parameter::Parameter;

mod covgrad;
pub use covgrad::*;

mod misc;
pub use self::misc::*;

mod matern52;
pub use self::matern52::*;

mod tasks;
pub use self::tasks::*;

mod scaled;
pub use self::scaled::*;

mod product;
pub use self::product::*;

/// Kernel Function
pub trait Kernel: std::fmt::Debug + Clone + PartialEq {
    /// Return the number of parameters used in this `Kernel`.
    fn n_parameters(&self) -> usize;

    /// Number of input columns the kernel reads
    fn input_dim(&self) -> usize;

    /// Returns the covariance matrix between the rows of `x1` and `x2`
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
        ShapeConstraint: SameNumberOfColumns<C1, C2>;

    /// Return the corresponding parameter vector
    fn parameters(&self) -> DVector<f64>;

    /// Create a new kernel of the given type from the provided parameters.
    fn reparameterize(&self, params: &[f64]) -> Result<Self, KernelError>;

    /// Takes a sequence of parameters and consumes only the ones it needs
    /// to create itself.
    fn consume_parameters<'p>(
        &self,
        params: &'p [f64],
    ) -> Result<(Self, &'p [f64]), KernelError> {
        let n = self.n_parameters();
        if params.len() < n {
            Err(KernelError::MissingParameters(n - params.len()))
        } else {
            let (cur, next) = params.split_at(n);
            let new_kernel = self.reparameterize(cur)?;
            Ok((new_kernel, next))
        }
    }

    /// Covariance and gradient with respect to the hyperparameters
    fn covariance_with_gradient<R, C, S>(
        &self,
        x: &Matrix<f64, R, C, S>,
    ) -> Result<(DMatrix<f64>, CovGrad), CovGradError>
    where
        R: Dim,
        C: Dim,
        S: Storage<f64, R, C>;

    /// Gradient of `k(point, x2_j)` with respect to `point` for every row
    /// `j` of `x2`. `point` has one row; the result is `m × d`.
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
        ShapeConstraint: SameNumberOfColumns<C1, C2>;

    /// Hessian of `k(point, x2_j)` with respect to `point`, one `d × d`
    /// matrix per row of `x2`.
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
        ShapeConstraint: SameNumberOfColumns<C1, C2>;

    /// Names, default values, priors and bounds of the hyperparameters,
    /// derived from the training data.
    fn hyperparameters(
        &self,
        points: &DMatrix<f64>,
        evaluations: &DVector<f64>,
    ) -> Vec<Parameter>;
}

/// Errors from Kernel construction
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum KernelError {
    /// Parameter Out of Bounds
    ParameterOutOfBounds {
        /// Name of parameter
        name: String,
        /// Value given
        given: f64,
        /// Lower and upper bounds on value
        bounds: (f64, f64),
    },
    /// Too many parameters provided
    ExtraneousParameters(usize),
    /// Too few parameters provided
    MissingParameters(usize),
    /// No kernel names were given
    EmptySpec,
    /// The kernel names and the dimensions list do not line up
    DimensionsMismatch { kernels: usize, dimensions: usize },
    /// The blocks of a separable product do not add up to its total
    IncompleteDimensions { total: usize, covered: usize },
    /// A kernel name was used where it cannot appear
    UnexpectedKernel(KernelName),
    /// An error in computing cov-grad
    CovGrad(CovGradError),
}

impl std::error::Error for KernelError {}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterOutOfBounds {
                name,
                given,
                bounds,
            } => write!(
                f,
                "Parameter {} is out of bounds ({}, {}), given: {}",
                name, bounds.0, bounds.1, given
            ),
            Self::ExtraneousParameters(n) => {
                write!(f, "{} extra parameters provided to kernel", n)
            }
            Self::MissingParameters(n) => {
                write!(f, "Missing {} parameters", n)
            }
            Self::EmptySpec => write!(f, "no kernel given"),
            Self::DimensionsMismatch {
                kernels,
                dimensions,
            } => write!(
                f,
                "{} kernels cannot be described by {} dimensions",
                kernels, dimensions
            ),
            Self::IncompleteDimensions { total, covered } => write!(
                f,
                "sub-kernel dimensions cover {} of {} dimensions",
                covered, total
            ),
            Self::UnexpectedKernel(name) => {
                write!(f, "{} cannot be used in this position", name)
            }
            Self::CovGrad(e) => {
                write!(f, "Covariance Gradient couldn't be computed: {}", e)
            }
        }
    }
}

impl From<CovGradError> for KernelError {
    fn from(e: CovGradError) -> Self {
        Self::CovGrad(e)
    }
}

/// Names of the kernels, as they appear in persisted models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub enum KernelName {
    #[cfg_attr(feature = "serde1", serde(rename = "Matern52"))]
    Matern52,
    #[cfg_attr(feature = "serde1", serde(rename = "Tasks"))]
    Tasks,
    #[cfg_attr(
        feature = "serde1",
        serde(rename = "Product_of_kernels_with_separable_domain")
    )]
    ProductKernelsSeparable,
    #[cfg_attr(feature = "serde1", serde(rename = "Scaled_kernel"))]
    ScaledKernel,
}

impl KernelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matern52 => "Matern52",
            Self::Tasks => "Tasks",
            Self::ProductKernelsSeparable => {
                "Product_of_kernels_with_separable_domain"
            }
            Self::ScaledKernel => "Scaled_kernel",
        }
    }
}

impl fmt::Display for KernelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Description of a kernel as a list of names and a list of dimensions.
///
/// * `[Matern52]` with `[d]`
/// * `[Tasks]` with `[n_tasks]`
/// * `[Scaled_kernel, ...]` wraps whatever the rest of the list describes
/// * `[Product_of_kernels_with_separable_domain, k1, k2, ...]` with
///   `[total, d1, d2, ...]`, where a task kernel's entry is its number of
///   tasks and it reads a single input column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct KernelSpec {
    pub type_kernel: Vec<KernelName>,
    pub dimensions: Vec<usize>,
    /// Task kernels share one correlation between every pair of tasks
    pub same_correlation: bool,
}

impl KernelSpec {
    pub fn new(
        type_kernel: Vec<KernelName>,
        dimensions: Vec<usize>,
        same_correlation: bool,
    ) -> Self {
        Self {
            type_kernel,
            dimensions,
            same_correlation,
        }
    }

    /// Matérn-5/2 over `dim` input columns
    pub fn matern52(dim: usize) -> Self {
        Self::new(vec![KernelName::Matern52], vec![dim], false)
    }

    /// Scaled Matérn-5/2 over `dim` input columns
    pub fn scaled_matern52(dim: usize) -> Self {
        Self::new(
            vec![KernelName::ScaledKernel, KernelName::Matern52],
            vec![dim],
            false,
        )
    }

    /// Matérn-5/2 over the first `dim` columns times a task kernel over the
    /// last column.
    pub fn matern52_tasks(dim: usize, n_tasks: usize) -> Self {
        Self::new(
            vec![
                KernelName::ProductKernelsSeparable,
                KernelName::Matern52,
                KernelName::Tasks,
            ],
            vec![dim + n_tasks, dim, n_tasks],
            false,
        )
    }

    pub fn with_same_correlation(self, same_correlation: bool) -> Self {
        Self {
            same_correlation,
            ..self
        }
    }

    /// Kernel names joined by `_`, as used in file names
    pub fn names_joined(&self) -> String {
        self.type_kernel
            .iter()
            .map(KernelName::as_str)
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Any of the supported kernels
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum KernelType {
    Matern52(Matern52Kernel),
    Tasks(TasksKernel),
    Scaled(ScaledKernel),
    Product(ProductKernelSeparable),
}

impl KernelType {
    /// Build a kernel with unit length scales and variances, and zero task
    /// parameters.
    pub fn from_spec(spec: &KernelSpec) -> Result<Self, KernelError> {
        Self::build(&spec.type_kernel, &spec.dimensions, spec.same_correlation)
    }

    fn build(
        names: &[KernelName],
        dims: &[usize],
        same_correlation: bool,
    ) -> Result<Self, KernelError> {
        match names {
            [] => Err(KernelError::EmptySpec),
            [KernelName::ScaledKernel, rest @ ..] => {
                let inner = Self::build(rest, dims, same_correlation)?;
                Ok(Self::Scaled(ScaledKernel::new(inner, 1.0)?))
            }
            [KernelName::ProductKernelsSeparable, rest @ ..] => {
                if dims.len() != rest.len() + 1 {
                    return Err(KernelError::DimensionsMismatch {
                        kernels: rest.len(),
                        dimensions: dims.len(),
                    });
                }
                let covered: usize = dims[1..].iter().sum();
                if covered != dims[0] {
                    return Err(KernelError::IncompleteDimensions {
                        total: dims[0],
                        covered,
                    });
                }
                let kernels = rest
                    .iter()
                    .zip(dims[1..].iter())
                    .map(|(name, dim)| {
                        Self::build_simple(*name, *dim, same_correlation)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Product(ProductKernelSeparable::new(kernels)?))
            }
            [name] => match dims {
                [dim] => Self::build_simple(*name, *dim, same_correlation),
                _ => Err(KernelError::DimensionsMismatch {
                    kernels: 1,
                    dimensions: dims.len(),
                }),
            },
            [name, ..] => Err(KernelError::UnexpectedKernel(*name)),
        }
    }

    fn build_simple(
        name: KernelName,
        dim: usize,
        same_correlation: bool,
    ) -> Result<Self, KernelError> {
        match name {
            KernelName::Matern52 => {
                Ok(Self::Matern52(Matern52Kernel::new(DVector::repeat(dim, 1.0))?))
            }
            KernelName::Tasks => {
                let kernel = if same_correlation {
                    TasksKernel::same_correlation(dim)?
                } else {
                    TasksKernel::full(dim)?
                };
                Ok(Self::Tasks(kernel))
            }
            other => Err(KernelError::UnexpectedKernel(other)),
        }
    }

    /// Number of tasks of the task kernel, if the kernel contains one
    pub fn n_tasks(&self) -> Option<usize> {
        match self {
            Self::Tasks(k) => Some(k.n_tasks()),
            Self::Scaled(k) => k.inner().n_tasks(),
            Self::Product(k) => k.kernels().iter().find_map(KernelType::n_tasks),
            Self::Matern52(_) => None,
        }
    }
}

macro_rules! dispatch {
    ($self: ident, $k: ident => $e: expr) => {
        match $self {
            KernelType::Matern52($k) => $e,
            KernelType::Tasks($k) => $e,
            KernelType::Scaled($k) => $e,
            KernelType::Product($k) => $e,
        }
    };
}

impl Kernel for KernelType {
    fn n_parameters(&self) -> usize {
        dispatch!(self, k => k.n_parameters())
    }

    fn input_dim(&self) -> usize {
        dispatch!(self, k => k.input_dim())
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
        dispatch!(self, k => k.covariance(x1, x2))
    }

    fn parameters(&self) -> DVector<f64> {
        dispatch!(self, k => k.parameters())
    }

    fn reparameterize(&self, params: &[f64]) -> Result<Self, KernelError> {
        Ok(match self {
            Self::Matern52(k) => Self::Matern52(k.reparameterize(params)?),
            Self::Tasks(k) => Self::Tasks(k.reparameterize(params)?),
            Self::Scaled(k) => Self::Scaled(k.reparameterize(params)?),
            Self::Product(k) => Self::Product(k.reparameterize(params)?),
        })
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
        dispatch!(self, k => k.covariance_with_gradient(x))
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
        dispatch!(self, k => k.gradient_respect_point(point, x2))
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
        dispatch!(self, k => k.hessian_respect_point(point, x2))
    }

    fn hyperparameters(
        &self,
        points: &DMatrix<f64>,
        evaluations: &DVector<f64>,
    ) -> Vec<Parameter> {
        dispatch!(self, k => k.hyperparameters(points, evaluations))
    }
}
