use nalgebra::base::storage::Storage;
use nalgebra::{DMatrix, DVector, Dim, Matrix, U1};

/// Squared distance between two rows, each dimension divided by its length
/// scale.
#[inline]
pub fn scaled_sq_dist<C1, C2, S1, S2>(
    a: &Matrix<f64, U1, C1, S1>,
    b: &Matrix<f64, U1, C2, S2>,
    length_scales: &DVector<f64>,
) -> f64
where
    C1: Dim,
    C2: Dim,
    S1: Storage<f64, U1, C1>,
    S2: Storage<f64, U1, C2>,
{
    length_scales
        .iter()
        .enumerate()
        .map(|(k, l)| {
            let d = (a[k] - b[k]) / l;
            d * d
        })
        .sum()
}

/// Mean absolute difference over every ordered pair of rows, per column.
/// Pairs of a row with itself are included.
pub fn mean_pairwise_abs_diff(points: &DMatrix<f64>) -> DVector<f64> {
    let n = points.nrows();
    DVector::from_iterator(
        points.ncols(),
        points.column_iter().map(|col| {
            if n == 0 {
                return 0.0;
            }
            let total: f64 = col
                .iter()
                .map(|a| col.iter().map(|b| (a - b).abs()).sum::<f64>())
                .sum();
            total / (n * n) as f64
        }),
    )
}

/// Logistic function
#[inline]
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_distance() {
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let b = DMatrix::from_row_slice(1, 2, &[3.0, 5.0]);
        let ls = DVector::from_column_slice(&[2.0, 3.0]);
        assert::close(scaled_sq_dist(&a.row(0), &b.row(0), &ls), 2.0, 1E-12);
    }

    #[test]
    fn pairwise_mean_includes_diagonal() {
        let x = DMatrix::from_column_slice(2, 1, &[0.0, 2.0]);
        // pairs: 0, 2, 2, 0
        assert::close(mean_pairwise_abs_diff(&x)[0], 1.0, 1E-12);
    }

    #[test]
    fn logistic_midpoint() {
        assert::close(logistic(0.0), 0.5, 1E-15);
        assert!(logistic(40.0) <= 1.0);
    }
}
