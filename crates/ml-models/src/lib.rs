//! Small in-process regression models: simple OLS, ridge multiple
//! regression, and a regression random forest, plus the feature
//! engineering that feeds them.

pub mod features;
pub mod forest;
pub mod linear;
pub mod ridge;

pub use features::{FeatureConfig, FeatureSet};
pub use forest::{ForestConfig, RandomForest};
pub use linear::LinearFit;
pub use ridge::RidgeRegression;

/// Coefficient of determination. Returns 0 for degenerate inputs
/// (mismatched lengths, constant actuals).
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n < 2 {
        return 0.0;
    }
    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual[..n].iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot < 1e-15 {
        return 0.0;
    }
    let ss_res: f64 = actual[..n]
        .iter()
        .zip(predicted[..n].iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn r_squared_perfect_fit() {
        let y = vec![1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(r_squared(&y, &y), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn r_squared_constant_actuals() {
        let y = vec![2.0, 2.0, 2.0];
        let p = vec![1.0, 2.0, 3.0];
        assert_eq!(r_squared(&y, &p), 0.0);
    }
}
