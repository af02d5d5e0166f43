use nalgebra::DVector;

pub mod gaussian;

/// Random process whose hyperparameters can be fitted by maximizing the
/// marginal likelihood.
pub trait RandomProcess {
    /// Error raised when the likelihood cannot be evaluated
    type Error;

    /// Compute the log marginal likelihood
    fn ln_m(&self) -> Result<f64, Self::Error>;

    /// Compute the log marginal likelihood with an different set of
    /// parameters and compute the gradient.
    fn ln_m_with_parameters(
        &self,
        parameters: &DVector<f64>,
    ) -> Result<(f64, DVector<f64>), Self::Error>;

    /// Get the parameters
    fn parameters(&self) -> DVector<f64>;

    /// Set with the given parameters
    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<(), Self::Error>;
}
