//! Markowitz mean-variance weight solvers. The tangency (max-Sharpe)
//! portfolio is solved analytically when feasible and by projected
//! gradient ascent when the long-only constraint binds; when no asset
//! beats the risk-free rate the solver degrades to minimum variance, and
//! when the covariance matrix cannot be factored it degrades to equal
//! weights.

use nalgebra::{DMatrix, DVector};

use allocation_core::EngineError;

/// Weights below this threshold after solving are snapped to zero before
/// the final renormalization.
const WEIGHT_FLOOR: f64 = 1e-10;

const GRADIENT_ITERS: usize = 500;
const GRADIENT_STEP: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub risk_free_rate: f64,
    pub allow_short: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.02,
            allow_short: false,
        }
    }
}

/// Maximum-Sharpe portfolio weights. Weights sum to 1; with shorting
/// disallowed they are all non-negative.
pub fn max_sharpe_weights(
    mu: &[f64],
    cov: &DMatrix<f64>,
    config: &OptimizerConfig,
) -> Result<Vec<f64>, EngineError> {
    let n = mu.len();
    validate_dims(n, cov)?;
    if n == 1 {
        return Ok(vec![1.0]);
    }

    let Some(sigma) = regularized(cov) else {
        tracing::warn!("covariance matrix is not factorable, using equal weights");
        return Ok(equal_weights(n));
    };
    let chol = match sigma.clone().cholesky() {
        Some(c) => c,
        None => return Ok(equal_weights(n)),
    };

    let excess = DVector::from_iterator(n, mu.iter().map(|&m| m - config.risk_free_rate));

    // No asset beats the risk-free rate: the tangency portfolio is
    // undefined, fall back to minimum variance.
    if excess.iter().all(|&e| e <= 0.0) {
        return min_variance_from(&sigma, &chol, config.allow_short);
    }

    let sigma_inv_excess = chol.solve(&excess);
    let denom: f64 = sigma_inv_excess.sum();

    if denom.abs() > 1e-10 {
        let mut w: Vec<f64> = sigma_inv_excess.iter().map(|v| v / denom).collect();
        if config.allow_short || w.iter().all(|&wi| wi >= -WEIGHT_FLOOR) {
            finalize(&mut w);
            return Ok(w);
        }
    }

    // Long-only constraint binds: projected gradient ascent on the
    // Sharpe ratio from equal weights, keeping the best iterate.
    let mut w = equal_weights(n);
    let mut best = w.clone();
    let mut best_sharpe = f64::MIN;

    for _ in 0..GRADIENT_ITERS {
        let wv = DVector::from_column_slice(&w);
        let sigma_w = &sigma * &wv;
        let port_ret: f64 = wv.dot(&DVector::from_column_slice(mu));
        let variance = wv.dot(&sigma_w);
        let risk = variance.max(0.0).sqrt();

        let sharpe = if risk > 0.0 {
            (port_ret - config.risk_free_rate) / risk
        } else {
            0.0
        };
        if sharpe > best_sharpe {
            best_sharpe = sharpe;
            best.copy_from_slice(&w);
        }
        if risk <= 0.0 {
            break;
        }

        // Gradient of negative Sharpe:
        // d(-S)/dw_i = -(mu_i - rf)/sigma_p + (ret - rf)*(Sigma w)_i / sigma_p^3
        let excess_ret = port_ret - config.risk_free_rate;
        let risk_cubed = risk * risk * risk;
        for i in 0..n {
            let grad = -(mu[i] - config.risk_free_rate) / risk + excess_ret * sigma_w[i] / risk_cubed;
            w[i] -= GRADIENT_STEP * grad;
        }
        project_long_only(&mut w);
    }

    finalize(&mut best);
    Ok(best)
}

/// Global minimum-variance portfolio weights.
pub fn min_variance_weights(
    cov: &DMatrix<f64>,
    allow_short: bool,
) -> Result<Vec<f64>, EngineError> {
    let n = cov.nrows();
    if n == 0 {
        return Err(EngineError::EmptyInput);
    }
    if n == 1 {
        return Ok(vec![1.0]);
    }
    let Some(sigma) = regularized(cov) else {
        return Ok(equal_weights(n));
    };
    let chol = match sigma.clone().cholesky() {
        Some(c) => c,
        None => return Ok(equal_weights(n)),
    };
    min_variance_from(&sigma, &chol, allow_short)
}

/// w' * mu.
pub fn portfolio_return(weights: &[f64], mu: &[f64]) -> f64 {
    weights.iter().zip(mu.iter()).map(|(w, m)| w * m).sum()
}

/// sqrt(w' * Sigma * w).
pub fn portfolio_volatility(weights: &[f64], cov: &DMatrix<f64>) -> f64 {
    let w = DVector::from_column_slice(weights);
    let variance = w.dot(&(cov * &w));
    variance.max(0.0).sqrt()
}

fn validate_dims(n: usize, cov: &DMatrix<f64>) -> Result<(), EngineError> {
    if n == 0 {
        return Err(EngineError::EmptyInput);
    }
    if cov.nrows() != n || cov.ncols() != n {
        return Err(EngineError::InvalidSeries {
            ticker: "portfolio".to_string(),
            reason: format!(
                "covariance is {}x{}, expected {}x{}",
                cov.nrows(),
                cov.ncols(),
                n,
                n
            ),
        });
    }
    Ok(())
}

/// Add an escalating diagonal ridge until the matrix admits a Cholesky
/// factorization. Returns None when even a heavy ridge fails.
fn regularized(cov: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n = cov.nrows();
    if cov.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if cov.clone().cholesky().is_some() {
        return Some(cov.clone());
    }
    let scale = (cov.trace() / n as f64).abs().max(1e-8);
    let mut ridge = scale * 1e-8;
    for _ in 0..8 {
        let candidate = cov + DMatrix::identity(n, n) * ridge;
        if candidate.clone().cholesky().is_some() {
            return Some(candidate);
        }
        ridge *= 10.0;
    }
    None
}

fn min_variance_from(
    sigma: &DMatrix<f64>,
    chol: &nalgebra::Cholesky<f64, nalgebra::Dyn>,
    allow_short: bool,
) -> Result<Vec<f64>, EngineError> {
    let n = sigma.nrows();
    let ones = DVector::from_element(n, 1.0);
    let sigma_inv_ones = chol.solve(&ones);
    let denom: f64 = sigma_inv_ones.sum();
    if denom.abs() < 1e-12 {
        return Ok(equal_weights(n));
    }
    let mut w: Vec<f64> = sigma_inv_ones.iter().map(|v| v / denom).collect();

    if !allow_short && w.iter().any(|&wi| wi < -WEIGHT_FLOOR) {
        // Projected gradient descent on variance, gradient 2 * Sigma * w.
        let mut cur = equal_weights(n);
        for _ in 0..GRADIENT_ITERS {
            let wv = DVector::from_column_slice(&cur);
            let grad = sigma * &wv * 2.0;
            for i in 0..n {
                cur[i] -= GRADIENT_STEP * grad[i];
            }
            project_long_only(&mut cur);
        }
        w = cur;
    }

    finalize(&mut w);
    Ok(w)
}

fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Project onto the long-only simplex: clamp negatives, renormalize.
fn project_long_only(w: &mut [f64]) {
    for wi in w.iter_mut() {
        if *wi < 0.0 {
            *wi = 0.0;
        }
    }
    let total: f64 = w.iter().sum();
    if total > 0.0 {
        for wi in w.iter_mut() {
            *wi /= total;
        }
    } else {
        let n = w.len();
        for wi in w.iter_mut() {
            *wi = 1.0 / n as f64;
        }
    }
}

/// Snap dust to zero and renormalize to an exact unit sum.
fn finalize(w: &mut [f64]) {
    for wi in w.iter_mut() {
        if wi.abs() < WEIGHT_FLOOR {
            *wi = 0.0;
        }
    }
    let total: f64 = w.iter().sum();
    if total.abs() > 1e-12 {
        for wi in w.iter_mut() {
            *wi /= total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cov2(vol_a: f64, vol_b: f64, corr: f64) -> DMatrix<f64> {
        let off = corr * vol_a * vol_b;
        DMatrix::from_row_slice(2, 2, &[vol_a * vol_a, off, off, vol_b * vol_b])
    }

    fn long_only_config() -> OptimizerConfig {
        OptimizerConfig::default()
    }

    #[test]
    fn single_asset_gets_full_weight() {
        let cov = DMatrix::from_row_slice(1, 1, &[0.04]);
        let w = max_sharpe_weights(&[0.08], &cov, &long_only_config()).unwrap();
        assert_eq!(w, vec![1.0]);
    }

    #[test]
    fn weights_sum_to_one_and_non_negative() {
        let cov = cov2(0.20, 0.10, 0.3);
        let w = max_sharpe_weights(&[0.10, 0.06], &cov, &long_only_config()).unwrap();
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(w.iter().all(|&wi| wi >= 0.0));
    }

    #[test]
    fn identical_assets_split_evenly() {
        let v = 0.15;
        let cov = cov2(v, v, 1.0);
        let w = max_sharpe_weights(&[0.08, 0.08], &cov, &long_only_config()).unwrap();
        assert_relative_eq!(w[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(w[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn equal_sharpe_prefers_lower_vol() {
        // Both assets carry Sharpe 0.4; lower-vol asset should dominate.
        let cov = cov2(0.20, 0.10, 0.3);
        let w = max_sharpe_weights(&[0.10, 0.06], &cov, &long_only_config()).unwrap();
        assert!(w[1] > w[0], "expected B > A, got {:?}", w);
    }

    #[test]
    fn all_below_risk_free_falls_back_to_min_variance() {
        let cov = cov2(0.20, 0.10, 0.3);
        let w = max_sharpe_weights(&[0.01, 0.015], &cov, &long_only_config()).unwrap();
        let mv = min_variance_weights(&cov, false).unwrap();
        assert_relative_eq!(w[0], mv[0], epsilon = 1e-9);
        assert_relative_eq!(w[1], mv[1], epsilon = 1e-9);
    }

    #[test]
    fn min_variance_lower_risk_than_tangency() {
        let cov = cov2(0.20, 0.10, 0.3);
        let mu = [0.10, 0.06];
        let tang = max_sharpe_weights(&mu, &cov, &long_only_config()).unwrap();
        let mv = min_variance_weights(&cov, false).unwrap();
        assert!(
            portfolio_volatility(&mv, &cov) <= portfolio_volatility(&tang, &cov) + 1e-9
        );
    }

    #[test]
    fn long_only_binds_when_analytic_shorts() {
        // Dominated asset: unconstrained tangency shorts it.
        let cov = cov2(0.20, 0.20, 0.95);
        let w = max_sharpe_weights(&[0.20, 0.03], &cov, &long_only_config()).unwrap();
        assert!(w.iter().all(|&wi| wi >= 0.0));
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(w[0] > 0.9, "winner should dominate, got {:?}", w);
    }

    #[test]
    fn shorting_allowed_passes_analytic_solution_through() {
        let cov = cov2(0.20, 0.20, 0.95);
        let config = OptimizerConfig {
            allow_short: true,
            ..Default::default()
        };
        let w = max_sharpe_weights(&[0.20, 0.03], &cov, &config).unwrap();
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(w[1] < 0.0, "expected a short leg, got {:?}", w);
    }

    #[test]
    fn singular_covariance_degrades_gracefully() {
        // Rank-1 matrix (perfect correlation, same vol).
        let cov = cov2(0.15, 0.15, 1.0);
        let w = max_sharpe_weights(&[0.09, 0.05], &cov, &long_only_config()).unwrap();
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(w.iter().all(|&wi| wi >= 0.0));
    }

    #[test]
    fn empty_input_rejected() {
        let cov = DMatrix::<f64>::zeros(0, 0);
        assert_eq!(
            max_sharpe_weights(&[], &cov, &long_only_config()).unwrap_err(),
            EngineError::EmptyInput
        );
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let cov = DMatrix::from_row_slice(1, 1, &[0.04]);
        let err = max_sharpe_weights(&[0.1, 0.2], &cov, &long_only_config()).unwrap_err();
        assert_eq!(err.code(), "INVALID_SERIES");
    }

    #[test]
    fn portfolio_stats_blend() {
        let cov = cov2(0.20, 0.10, 0.0);
        let w = [0.5, 0.5];
        assert_relative_eq!(portfolio_return(&w, &[0.10, 0.06]), 0.08, epsilon = 1e-12);
        let vol = portfolio_volatility(&w, &cov);
        // sqrt(0.25*0.04 + 0.25*0.01)
        assert_relative_eq!(vol, (0.0125f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn three_asset_tangency_beats_min_variance_sharpe() {
        let v = [0.15, 0.20, 0.25];
        let corr = [[1.0, 0.3, 0.1], [0.3, 1.0, 0.5], [0.1, 0.5, 1.0]];
        let mut cov = DMatrix::zeros(3, 3);
        for i in 0..3 {
            for j in 0..3 {
                cov[(i, j)] = corr[i][j] * v[i] * v[j];
            }
        }
        let mu = [0.10, 0.04, 0.07];
        let rf = 0.02;
        let tang = max_sharpe_weights(&mu, &cov, &long_only_config()).unwrap();
        let mv = min_variance_weights(&cov, false).unwrap();

        let sharpe = |w: &[f64]| {
            let r = portfolio_return(w, &mu);
            let s = portfolio_volatility(w, &cov);
            if s > 0.0 {
                (r - rf) / s
            } else {
                0.0
            }
        };
        assert!(sharpe(&tang) >= sharpe(&mv) - 1e-6);
    }
}
