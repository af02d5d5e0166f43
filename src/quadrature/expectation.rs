//! Expectations over the nuisance dimensions
use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use super::QuadratureError;

/// Integration rule over the nuisance dimensions `w` of a function of
/// full points `(x, w)`.
///
/// Points handed to `f` are full points: column `x_domain[j]` holds `x_j`
/// and column `w_domain[j]` holds `w_j`.
pub trait Expectation {
    /// Number of nuisance dimensions the rule integrates over
    fn dimension(&self) -> usize;

    /// `E_w[f(x_i, w)]` for each row `x_i` of `points`.
    ///
    /// `f` returns one row per full point it is given; the result has one
    /// row per row of `points` and as many columns as `f` returns.
    fn expectation<F, E>(
        &self,
        f: F,
        points: &DMatrix<f64>,
        x_domain: &[usize],
        w_domain: &[usize],
    ) -> Result<DMatrix<f64>, E>
    where
        F: FnMut(&DMatrix<f64>) -> Result<DMatrix<f64>, E>;

    /// `E_{w, w'}[f(x_i, w; x_j, w')]` for each pair of rows of `points`.
    ///
    /// `f` returns the square matrix of its values between every pair of
    /// the full points it is given.
    fn double_expectation<F, E>(
        &self,
        f: F,
        points: &DMatrix<f64>,
        x_domain: &[usize],
        w_domain: &[usize],
    ) -> Result<DMatrix<f64>, E>
    where
        F: FnMut(&DMatrix<f64>) -> Result<DMatrix<f64>, E>;

    /// `E_w[∇_x f(x, w)]` at the single point `x`.
    ///
    /// `f` receives one full point and returns its gradient with respect to
    /// that point, one row per output and one column per input dimension.
    /// The result keeps the rows and the `x_domain` columns.
    fn grad_expectation<F, E>(
        &self,
        f: F,
        point: &DVector<f64>,
        x_domain: &[usize],
        w_domain: &[usize],
    ) -> Result<DMatrix<f64>, E>
    where
        F: FnMut(&DMatrix<f64>) -> Result<DMatrix<f64>, E>;
}

/// Uniform distribution over a finite set of nuisance values
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct UniformFinite {
    /// One row per admissible value of `w`
    domain_random: DMatrix<f64>,
}

impl UniformFinite {
    /// Uniform over the rows of `domain_random`
    pub fn new(domain_random: DMatrix<f64>) -> Result<Self, QuadratureError> {
        if domain_random.nrows() == 0 {
            Err(QuadratureError::EmptyDistribution)
        } else {
            Ok(Self { domain_random })
        }
    }

    /// Uniform over the task indices `0..n_tasks`
    pub fn tasks(n_tasks: usize) -> Result<Self, QuadratureError> {
        Self::new(DMatrix::from_fn(n_tasks, 1, |i, _| i as f64))
    }

    pub fn domain_random(&self) -> &DMatrix<f64> {
        &self.domain_random
    }

    fn n_values(&self) -> usize {
        self.domain_random.nrows()
    }

    /// Row `i * n_values + s` is `(points_i, w_s)`
    fn full_points(
        &self,
        points: &DMatrix<f64>,
        x_domain: &[usize],
        w_domain: &[usize],
    ) -> DMatrix<f64> {
        let m = self.n_values();
        let d = x_domain.len() + w_domain.len();
        let mut full = DMatrix::zeros(points.nrows() * m, d);
        for i in 0..points.nrows() {
            for s in 0..m {
                let row = i * m + s;
                for (j, &col) in x_domain.iter().enumerate() {
                    full[(row, col)] = points[(i, j)];
                }
                for (j, &col) in w_domain.iter().enumerate() {
                    full[(row, col)] = self.domain_random[(s, j)];
                }
            }
        }
        full
    }
}

impl Expectation for UniformFinite {
    fn dimension(&self) -> usize {
        self.domain_random.ncols()
    }

    fn expectation<F, E>(
        &self,
        mut f: F,
        points: &DMatrix<f64>,
        x_domain: &[usize],
        w_domain: &[usize],
    ) -> Result<DMatrix<f64>, E>
    where
        F: FnMut(&DMatrix<f64>) -> Result<DMatrix<f64>, E>,
    {
        let m = self.n_values();
        let values = f(&self.full_points(points, x_domain, w_domain))?;
        let mut result = DMatrix::zeros(points.nrows(), values.ncols());
        for (i, mut row) in result.row_iter_mut().enumerate() {
            row.copy_from(&values.rows(i * m, m).row_sum());
            row /= m as f64;
        }
        Ok(result)
    }

    fn double_expectation<F, E>(
        &self,
        mut f: F,
        points: &DMatrix<f64>,
        x_domain: &[usize],
        w_domain: &[usize],
    ) -> Result<DMatrix<f64>, E>
    where
        F: FnMut(&DMatrix<f64>) -> Result<DMatrix<f64>, E>,
    {
        let m = self.n_values();
        let t = points.nrows();
        let values = f(&self.full_points(points, x_domain, w_domain))?;
        let scale = (m * m) as f64;
        Ok(DMatrix::from_fn(t, t, |i, j| {
            values.view((i * m, j * m), (m, m)).sum() / scale
        }))
    }

    fn grad_expectation<F, E>(
        &self,
        mut f: F,
        point: &DVector<f64>,
        x_domain: &[usize],
        w_domain: &[usize],
    ) -> Result<DMatrix<f64>, E>
    where
        F: FnMut(&DMatrix<f64>) -> Result<DMatrix<f64>, E>,
    {
        let m = self.n_values();
        let row = DMatrix::from_row_slice(1, point.len(), point.as_slice());
        let full = self.full_points(&row, x_domain, w_domain);

        let mut result: Option<DMatrix<f64>> = None;
        for s in 0..m {
            let grad = f(&full.rows(s, 1).clone_owned())?.select_columns(x_domain);
            result = Some(match result {
                Some(acc) => acc + grad,
                None => grad,
            });
        }
        Ok(result.map_or_else(|| DMatrix::zeros(0, x_domain.len()), |acc| acc / m as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Never = std::convert::Infallible;

    #[test]
    fn tasks_domain() {
        let dist = UniformFinite::tasks(3).unwrap();
        assert_eq!(dist.dimension(), 1);
        assert_eq!(dist.domain_random().as_slice(), &[0.0, 1.0, 2.0]);
        assert_eq!(UniformFinite::tasks(0), Err(QuadratureError::EmptyDistribution));
    }

    #[test]
    fn full_points_interleave_columns() {
        let dist = UniformFinite::tasks(2).unwrap();
        let points = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let full = dist.full_points(&points, &[0, 2], &[1]);
        let expected = DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 0.0, 2.0, //
                1.0, 1.0, 2.0, //
                3.0, 0.0, 4.0, //
                3.0, 1.0, 4.0,
            ],
        );
        assert_eq!(full, expected);
    }

    #[test]
    fn single_expectation_averages_over_tasks() {
        let dist = UniformFinite::tasks(2).unwrap();
        let points = DMatrix::from_column_slice(2, 1, &[1.0, 2.0]);
        let res = dist
            .expectation::<_, Never>(
                |full| Ok(DMatrix::from_fn(full.nrows(), 2, |i, j| {
                    full[(i, 0)] + (j as f64 + 1.0) * full[(i, 1)]
                })),
                &points,
                &[0],
                &[1],
            )
            .unwrap();
        assert_eq!(res, DMatrix::from_row_slice(2, 2, &[1.5, 2.0, 2.5, 3.0]));
    }

    #[test]
    fn double_expectation_averages_blocks() {
        let dist = UniformFinite::tasks(2).unwrap();
        let points = DMatrix::from_column_slice(2, 1, &[1.0, 2.0]);
        // Value at (a, b) is x_a * x_b + w_a * w_b
        let res = dist
            .double_expectation::<_, Never>(
                |full| Ok(DMatrix::from_fn(full.nrows(), full.nrows(), |a, b| {
                    full[(a, 0)] * full[(b, 0)] + full[(a, 1)] * full[(b, 1)]
                })),
                &points,
                &[0],
                &[1],
            )
            .unwrap();
        let expected = DMatrix::from_row_slice(2, 2, &[1.25, 2.25, 2.25, 4.25]);
        assert_eq!(res, expected);
    }

    #[test]
    fn grad_expectation_keeps_x_columns() {
        let dist = UniformFinite::tasks(2).unwrap();
        let point = DVector::from_column_slice(&[3.0]);
        // Gradient of x * (1 + w) with respect to (x, w)
        let res = dist
            .grad_expectation::<_, Never>(
                |full| Ok(DMatrix::from_row_slice(1, 2, &[1.0 + full[(0, 1)], full[(0, 0)]])),
                &point,
                &[0],
                &[1],
            )
            .unwrap();
        assert_eq!(res, DMatrix::from_row_slice(1, 1, &[1.5]));
    }
}
