use nalgebra::{DMatrix, DVector};

/// Ridge (L2-regularized) multiple regression fitted via the normal
/// equations. Features are standardized internally so the penalty is
/// scale-invariant; the intercept is unpenalized.
#[derive(Debug, Clone)]
pub struct RidgeRegression {
    coefficients: DVector<f64>,
    intercept: f64,
    feature_means: DVector<f64>,
    feature_stds: DVector<f64>,
}

impl RidgeRegression {
    /// Fit on an n x p design matrix and an n-vector target.
    /// Returns None when the system is empty or the regularized normal
    /// matrix is not positive definite.
    pub fn fit(x: &DMatrix<f64>, y: &DVector<f64>, lambda: f64) -> Option<Self> {
        let n = x.nrows();
        let p = x.ncols();
        if n == 0 || p == 0 || n != y.len() {
            return None;
        }

        let mut means = DVector::zeros(p);
        let mut stds = DVector::zeros(p);
        for j in 0..p {
            let col = x.column(j);
            let mean = col.sum() / n as f64;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            means[j] = mean;
            stds[j] = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
        }

        let mut z = DMatrix::zeros(n, p);
        for i in 0..n {
            for j in 0..p {
                z[(i, j)] = (x[(i, j)] - means[j]) / stds[j];
            }
        }

        let y_mean = y.sum() / n as f64;
        let yc = y.map(|v| v - y_mean);

        let gram = z.transpose() * &z + DMatrix::identity(p, p) * lambda;
        let rhs = z.transpose() * yc;
        let coefficients = gram.cholesky()?.solve(&rhs);

        Some(Self {
            coefficients,
            intercept: y_mean,
            feature_means: means,
            feature_stds: stds,
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut acc = self.intercept;
        for (j, &v) in row.iter().enumerate().take(self.coefficients.len()) {
            acc += self.coefficients[j] * (v - self.feature_means[j]) / self.feature_stds[j];
        }
        acc
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}
