use crate::error::{DashboardError, DashboardResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

// Keeps the normal equations solvable when indicators are collinear
// (female and male shares always sum to 100).
const RIDGE: f64 = 1e-6;

/// Ordinary least squares on standardized features.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    intercept: f64,
    coefficients: Array1<f64>,
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl LinearRegression {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>) -> DashboardResult<Self> {
        let (rows, cols) = x.dim();
        if rows == 0 || rows != y.len() {
            return Err(DashboardError::Model(format!(
                "linear regression needs matching non-empty inputs, got {} rows and {} targets",
                rows,
                y.len()
            )));
        }

        let means = x
            .mean_axis(Axis(0))
            .ok_or_else(|| DashboardError::Model("empty feature matrix".to_string()))?;
        let scales = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 0.0 });
        let y_mean = y.mean().unwrap_or(0.0);

        let mut z = Array2::<f64>::zeros((rows, cols));
        for ((row, col), value) in x.indexed_iter() {
            if scales[col] > 0.0 {
                z[[row, col]] = (value - means[col]) / scales[col];
            }
        }
        let centered = y.mapv(|v| v - y_mean);

        let mut gram = z.t().dot(&z);
        let penalty = RIDGE * rows as f64;
        for i in 0..cols {
            // Constant columns get an identity row so their coefficient solves to zero.
            gram[[i, i]] += if scales[i] > 0.0 { penalty } else { 1.0 };
        }
        let moments = z.t().dot(&centered);
        let coefficients = solve(gram, moments)?;

        Ok(LinearRegression {
            intercept: y_mean,
            coefficients,
            means,
            scales,
        })
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.outer_iter()
            .map(|row| {
                self.intercept
                    + row
                        .iter()
                        .enumerate()
                        .filter(|(col, _)| self.scales[*col] > 0.0)
                        .map(|(col, value)| {
                            self.coefficients[col] * (value - self.means[col]) / self.scales[col]
                        })
                        .sum::<f64>()
            })
            .collect()
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> DashboardResult<Array1<f64>> {
    let n = b.len();
    for pivot in 0..n {
        let best = (pivot..n)
            .max_by(|&i, &j| a[[i, pivot]].abs().total_cmp(&a[[j, pivot]].abs()))
            .unwrap_or(pivot);
        if a[[best, pivot]].abs() < 1e-12 {
            return Err(DashboardError::Model(
                "singular system in least squares fit".to_string(),
            ));
        }
        if best != pivot {
            for col in 0..n {
                a.swap([pivot, col], [best, col]);
            }
            b.swap(pivot, best);
        }
        for row in (pivot + 1)..n {
            let factor = a[[row, pivot]] / a[[pivot, pivot]];
            if factor == 0.0 {
                continue;
            }
            for col in pivot..n {
                a[[row, col]] -= factor * a[[pivot, col]];
            }
            b[row] -= factor * b[pivot];
        }
    }

    let mut solution = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|col| a[[row, col]] * solution[col]).sum();
        solution[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_recovers_exact_linear_relationship() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 4.0], [4.0, 3.0], [5.0, 6.0]];
        let y = x.map_axis(Axis(1), |row| 3.0 + 2.0 * row[0] - 0.5 * row[1]);

        let model = LinearRegression::fit(x.view(), y.view()).unwrap();
        let predictions = model.predict(x.view());
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert_abs_diff_eq!(*p, *t, epsilon = 1e-4);
        }
        let unit = model.predict(array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]].view());
        assert_abs_diff_eq!(unit[0], 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(unit[1] - unit[0], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(unit[2] - unit[0], -0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_constant_and_collinear_columns_do_not_break_the_fit() {
        let x = array![
            [1.0, 7.0, 40.0, 60.0],
            [2.0, 7.0, 45.0, 55.0],
            [3.0, 7.0, 42.0, 58.0],
            [4.0, 7.0, 50.0, 50.0]
        ];
        let y = array![10.0, 20.0, 30.0, 40.0];

        let model = LinearRegression::fit(x.view(), y.view()).unwrap();
        let predictions = model.predict(x.view());
        assert!(predictions.iter().all(|p| p.is_finite()));
        // a column that never varied carries no weight
        let shifted = model.predict(array![[2.0, 7.0, 45.0, 55.0], [2.0, -90.0, 45.0, 55.0]].view());
        assert_eq!(shifted[0], shifted[1]);
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert_abs_diff_eq!(*p, *t, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(LinearRegression::fit(x.view(), y.view()).is_err());
    }

    #[test]
    fn test_solve_small_system() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve(a, b).unwrap();
        assert_abs_diff_eq!(x[0], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 1.4, epsilon = 1e-12);
    }
}
