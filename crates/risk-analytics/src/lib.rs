//! Return-series statistics: volatility, Sharpe, drawdown, VaR, covariance.
//! Stateless functions over daily return and price slices; all annualization
//! assumes 252 trading days.

use allocation_core::{AssetStats, PriceSeries, TickerDetails};
use nalgebra::DMatrix;
use statrs::statistics::Statistics;

pub const TRADING_DAYS: f64 = 252.0;

/// Daily simple returns from a close-price series.
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    if closes.len() < 2 {
        return Vec::new();
    }
    closes
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Annualized volatility: sample stdev of daily returns x sqrt(252).
pub fn annualized_volatility(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    returns.std_dev() * TRADING_DAYS.sqrt()
}

/// Annualized mean return: mean daily return x 252.
pub fn annualized_mean_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.mean() * TRADING_DAYS
}

/// Sharpe ratio from annualized figures. Zero volatility yields 0, never
/// NaN or infinity.
pub fn sharpe_ratio(annualized_return: f64, risk_free_rate: f64, annualized_vol: f64) -> f64 {
    if annualized_vol <= 0.0 {
        return 0.0;
    }
    (annualized_return - risk_free_rate) / annualized_vol
}

/// Maximum drawdown over a price path: min(price / running-max - 1).
/// Always in [-1, 0].
pub fn max_drawdown(prices: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &p in prices {
        if p > peak {
            peak = p;
        }
        if peak > 0.0 {
            let dd = p / peak - 1.0;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd.max(-1.0)
}

/// Historical 95% VaR: the 5th percentile of the daily-return distribution,
/// reported as a loss (capped at 0 when even the tail is positive).
pub fn var_95(returns: &[f64]) -> f64 {
    percentile_5(returns).min(0.0)
}

/// Conditional 95% VaR: the mean of the returns at or below the 5th
/// percentile, reported as a loss like `var_95`.
pub fn cvar_95(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let threshold = percentile_5(returns);
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= threshold).collect();
    (tail.iter().sum::<f64>() / tail.len() as f64).min(0.0)
}

fn percentile_5(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((sorted.len() as f64) * 0.05) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Skewness of the return distribution (third standardized moment).
pub fn skew(returns: &[f64]) -> f64 {
    let (m2, m3, _) = central_moments(returns);
    if m2 <= 0.0 {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Excess kurtosis of the return distribution: a normal distribution
/// scores 0, fat tails score positive.
pub fn kurtosis(returns: &[f64]) -> f64 {
    let (m2, _, m4) = central_moments(returns);
    if m2 <= 0.0 {
        return 0.0;
    }
    m4 / (m2 * m2) - 3.0
}

fn central_moments(returns: &[f64]) -> (f64, f64, f64) {
    let n = returns.len();
    if n < 2 {
        return (0.0, 0.0, 0.0);
    }
    let mean = returns.iter().sum::<f64>() / n as f64;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for r in returns {
        let d = r - mean;
        m2 += d * d;
        m3 += d * d * d;
        m4 += d * d * d * d;
    }
    (m2 / n as f64, m3 / n as f64, m4 / n as f64)
}

/// Weight-blended portfolio return series: r_p,t = sum_i w_i * r_i,t.
/// Series must already be aligned to a common date index.
pub fn portfolio_daily_returns(weights: &[f64], asset_returns: &[Vec<f64>]) -> Vec<f64> {
    let n_obs = asset_returns.iter().map(|r| r.len()).min().unwrap_or(0);
    (0..n_obs)
        .map(|t| {
            weights
                .iter()
                .zip(asset_returns.iter())
                .map(|(w, r)| w * r[t])
                .sum()
        })
        .collect()
}

/// Sample covariance matrix of daily returns, annualized by x252.
/// Series must already be aligned; observations are truncated to the
/// shortest series.
pub fn covariance_matrix(asset_returns: &[Vec<f64>]) -> DMatrix<f64> {
    let n = asset_returns.len();
    let n_obs = asset_returns.iter().map(|r| r.len()).min().unwrap_or(0);
    let mut cov = DMatrix::zeros(n, n);
    if n_obs < 2 {
        return cov;
    }
    let means: Vec<f64> = asset_returns
        .iter()
        .map(|r| r[..n_obs].iter().sum::<f64>() / n_obs as f64)
        .collect();
    for i in 0..n {
        for j in i..n {
            let mut acc = 0.0;
            for t in 0..n_obs {
                acc += (asset_returns[i][t] - means[i]) * (asset_returns[j][t] - means[j]);
            }
            let c = acc / (n_obs as f64 - 1.0) * TRADING_DAYS;
            cov[(i, j)] = c;
            cov[(j, i)] = c;
        }
    }
    cov
}

/// Full per-asset statistics block for one ticker.
pub fn asset_stats(
    series: &PriceSeries,
    expected_return: f64,
    risk_free_rate: f64,
    details: &TickerDetails,
) -> AssetStats {
    let closes = series.closes();
    let returns = daily_returns(&closes);
    let vol = annualized_volatility(&returns);
    AssetStats {
        ticker: series.ticker.clone(),
        expected_return,
        volatility: vol,
        sharpe_ratio: sharpe_ratio(expected_return, risk_free_rate, vol),
        max_drawdown: max_drawdown(&closes),
        var_95: var_95(&returns),
        cvar_95: cvar_95(&returns),
        skew: skew(&returns),
        kurtosis: kurtosis(&returns),
        sector: details.sector.clone(),
        market_cap: details.market_cap,
        pe_ratio: details.pe_ratio,
    }
}
