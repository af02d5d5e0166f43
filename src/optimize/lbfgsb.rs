//! Limited memory BFGS restricted to a box.
//!
//! A projected variant: the two-loop recursion runs on the free variables
//! only, and every trial point of the line search is projected back onto the
//! bounds.

use super::line_search::{projected_backtracking, BacktrackingParams};
use super::{project, Bounds, OptimizationResult, OptimizeError};
use log::debug;
use nalgebra::DVector;
use std::collections::VecDeque;

/// Parameters for the bounded L-BFGS optimizer
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct LbfgsbParams {
    /// Maximum number of iterations to run
    pub max_iter: usize,
    /// Number of correction pairs kept
    pub memory: usize,
    /// Exit when the largest projected gradient entry is below this
    pub pgtol: f64,
    /// Exit when the relative decrease of the objective is below this
    pub ftol: f64,
    /// Parameters given to the line search
    pub line_search: BacktrackingParams,
}

impl Default for LbfgsbParams {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            memory: 10,
            pgtol: 1E-5,
            ftol: 1E-12,
            line_search: BacktrackingParams::default(),
        }
    }
}

impl LbfgsbParams {
    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self { max_iter, ..self }
    }

    pub fn with_memory(self, memory: usize) -> Self {
        Self { memory, ..self }
    }

    pub fn with_pgtol(self, pgtol: f64) -> Self {
        Self { pgtol, ..self }
    }

    pub fn with_ftol(self, ftol: f64) -> Self {
        Self { ftol, ..self }
    }

    pub fn with_line_search(self, line_search: BacktrackingParams) -> Self {
        Self {
            line_search,
            ..self
        }
    }
}

/// Mask of variables that are not pinned at a bound by the gradient.
fn free_mask(x: &DVector<f64>, g: &DVector<f64>, bounds: &[Bounds]) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter().zip(g.iter()).zip(bounds.iter()).map(|((&xi, &gi), b)| {
            let at_lower = b.lower.map_or(false, |lo| xi <= lo && gi > 0.0);
            let at_upper = b.upper.map_or(false, |hi| xi >= hi && gi < 0.0);
            if at_lower || at_upper {
                0.0
            } else {
                1.0
            }
        }),
    )
}

/// Two-loop recursion: approximates `H·q` from the stored pairs.
fn two_loop(q: &DVector<f64>, pairs: &VecDeque<(DVector<f64>, DVector<f64>)>) -> DVector<f64> {
    let mut q = q.clone();
    let mut alphas = Vec::with_capacity(pairs.len());
    for (s, y) in pairs.iter().rev() {
        let rho = 1.0 / y.dot(s);
        let a = rho * s.dot(&q);
        q.axpy(-a, y, 1.0);
        alphas.push((a, rho));
    }

    let gamma = pairs.back().map_or(1.0, |(s, y)| s.dot(y) / y.dot(y));
    let mut r = q * gamma;

    for ((s, y), (a, rho)) in pairs.iter().zip(alphas.iter().rev()) {
        let b = rho * y.dot(&r);
        r.axpy(a - b, s, 1.0);
    }
    r
}

/// Minimize `f` within `bounds` starting from `x0`.
pub fn lbfgsb<F, G>(
    x0: &DVector<f64>,
    bounds: &[Bounds],
    params: &LbfgsbParams,
    mut f: F,
    mut grad: G,
) -> Result<OptimizationResult, OptimizeError>
where
    F: FnMut(&DVector<f64>) -> f64,
    G: FnMut(&DVector<f64>) -> DVector<f64>,
{
    let mut x = project(x0, bounds);
    let mut fx = f(&x);
    if !fx.is_finite() {
        return Err(OptimizeError::NumericalDivergence);
    }
    let mut g = grad(&x);
    let mut pairs: VecDeque<(DVector<f64>, DVector<f64>)> =
        VecDeque::with_capacity(params.memory);
    let mut converged = false;
    let mut n_iterations = 0;

    for i in 0..params.max_iter {
        n_iterations = i;
        let mask = free_mask(&x, &g, bounds);
        let pg = g.component_mul(&mask);
        let pg_norm = pg.amax();
        debug!("lbfgsb: i = {}, f = {}, |pg| = {:e}", i, fx, pg_norm);
        if pg_norm <= params.pgtol {
            converged = true;
            break;
        }

        let mut dir = -two_loop(&pg, &pairs).component_mul(&mask);
        if dir.dot(&g) >= 0.0 {
            debug!("lbfgsb: not a descent direction, resetting memory");
            pairs.clear();
            dir = -&pg;
        }

        let alpha_init = if pairs.is_empty() {
            (1.0 / dir.norm()).min(1.0)
        } else {
            1.0
        };

        let search = projected_backtracking(
            &params.line_search,
            &x,
            fx,
            &g,
            &dir,
            alpha_init,
            bounds,
            &mut f,
        );

        let (x_new, f_new) = match search {
            Ok(res) => res,
            Err(err) if !pairs.is_empty() => {
                debug!("lbfgsb: line search failed ({}), resetting memory", err);
                pairs.clear();
                continue;
            }
            Err(err) => {
                debug!("lbfgsb: line search failed ({}), stopping", err);
                break;
            }
        };

        let g_new = grad(&x_new);
        let s = &x_new - &x;
        let y = &g_new - &g;
        let sy = s.dot(&y);
        if sy > f64::EPSILON * y.dot(&y) {
            if pairs.len() == params.memory {
                pairs.pop_front();
            }
            pairs.push_back((s, y));
        }

        let decrease = fx - f_new;
        x = x_new;
        g = g_new;
        let scale = fx.abs().max(f_new.abs()).max(1.0);
        fx = f_new;
        n_iterations = i + 1;
        if decrease <= params.ftol * scale {
            converged = true;
            break;
        }
    }

    Ok(OptimizationResult {
        solution: x,
        optimal_value: fx,
        gradient: g,
        n_iterations,
        converged,
    })
}
