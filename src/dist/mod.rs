//! Distributions used as hyperparameter priors
mod gaussian;
mod horseshoe;
mod lognormal;
mod uniform;

pub use self::gaussian::{Gaussian, GaussianError};
pub use self::horseshoe::{Horseshoe, HorseshoeError};
pub use self::lognormal::{LogNormal, LogNormalError};
pub use self::uniform::{Uniform, UniformError};

/// Implements `Display` through the `From<&T> for String` conversion.
#[macro_export]
macro_rules! impl_display {
    ($kind: ty) => {
        impl ::std::fmt::Display for $kind {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}", String::from(self))
            }
        }
    };
}
