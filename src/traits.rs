//! Traits shared by the prior distributions
use rand::Rng;

/// Random variable over values of type `X`.
pub trait Rv<X> {
    /// Probability function
    fn f(&self, x: &X) -> f64 {
        self.ln_f(x).exp()
    }

    /// Log of the probability function. Need not be normalized as long as
    /// the missing constant does not depend on `x`.
    fn ln_f(&self, x: &X) -> f64;

    /// Single draw from the `Rv`
    fn draw<R: Rng>(&self, rng: &mut R) -> X;

    /// Multiple draws of the `Rv`
    fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<X> {
        (0..n).map(|_| self.draw(rng)).collect()
    }
}

/// Identifies the support of the distribution
pub trait Support<X> {
    /// Returns `true` if `x` is in the support of the `Rv`
    fn supports(&self, x: &X) -> bool;
}

/// Continuous distributions
pub trait ContinuousDistr<X>: Rv<X> + Support<X> {
    /// The log PDF at `x`, `-∞` outside of the support
    fn ln_pdf(&self, x: &X) -> f64 {
        if self.supports(x) {
            self.ln_f(x)
        } else {
            f64::NEG_INFINITY
        }
    }

    /// The PDF at `x`
    fn pdf(&self, x: &X) -> f64 {
        self.ln_pdf(x).exp()
    }
}
