use nalgebra::DVector;

/// Forward finite-difference approximation of the gradient of `f` at `x`.
pub fn forward_difference<F>(f: F, x: &DVector<f64>, h: f64) -> DVector<f64>
where
    F: Fn(&DVector<f64>) -> f64,
{
    let fx = f(x);
    DVector::from_fn(x.len(), |i, _| {
        let mut xh = x.clone();
        xh[i] += h;
        (f(&xh) - fx) / h
    })
}

/// Central finite-difference approximation of the gradient of `f` at `x`.
pub fn central_difference<F>(f: F, x: &DVector<f64>, h: f64) -> DVector<f64>
where
    F: Fn(&DVector<f64>) -> f64,
{
    DVector::from_fn(x.len(), |i, _| {
        let mut lo = x.clone();
        let mut hi = x.clone();
        lo[i] -= h;
        hi[i] += h;
        (f(&hi) - f(&lo)) / (2.0 * h)
    })
}
