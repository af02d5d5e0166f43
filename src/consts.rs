//! Mathematical and numerical constants

/// 0.5 ln(2π)
pub const HALF_LN_2PI: f64 = 0.918_938_533_204_672_7;
/// ln(2π)
pub const LN_2PI: f64 = 1.837_877_066_409_345_3;
/// √5, used by the Matérn-5/2 kernel
pub const SQRT_5: f64 = 2.236_067_977_499_789_8;
/// Lower bound used for strictly positive hyperparameters
pub const SMALLEST_POSITIVE_NUMBER: f64 = 1E-10;
/// Divisor applied to the mean pairwise distance to get a default length scale
pub const LENGTH_SCALE_DIVISOR: f64 = 0.324;
/// Two-sided 95% quantile of the standard normal
pub const Z_95: f64 = 1.96;
