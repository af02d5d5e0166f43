//! Re-imports for convenience
#[doc(no_inline)]
pub use crate::dist::{Gaussian, Horseshoe, LogNormal, Uniform};
#[doc(no_inline)]
pub use crate::domain::BoundsDomain;
#[doc(no_inline)]
pub use crate::optimize::{Bounds, LbfgsbParams, OptimizationResult};
#[doc(no_inline)]
pub use crate::process::gaussian::kernel::{Kernel, KernelName, KernelSpec, KernelType};
#[doc(no_inline)]
pub use crate::process::gaussian::{
    GpError, GpFittingGaussian, GpParams, Posterior, SliceSamplerParams, TrainingData,
};
#[doc(no_inline)]
pub use crate::process::RandomProcess;
#[doc(no_inline)]
pub use crate::quadrature::{
    BayesianQuadrature, Expectation, OptimalSolutions, QuadratureError, UniformFinite,
};
#[doc(no_inline)]
pub use crate::traits::*;
