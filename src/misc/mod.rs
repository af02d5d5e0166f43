//! Numerical utilities shared by the engines
mod cache;
mod finite_diff;
mod linalg;

pub use cache::{CacheKey, SingleEntryCache};
pub use finite_diff::{central_difference, forward_difference};
pub use linalg::{cholesky_with_jitter, mean_and_variance, outer_product_self, JitterParams, NumericalError};
