use nalgebra::{DMatrix, DVector};

/// Configuration of the engineered feature set. The feature count is a
/// tuning detail derived from this struct, not a contract.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Number of lagged daily returns.
    pub return_lags: usize,
    /// Simple moving-average windows; each yields a price/SMA ratio.
    pub sma_windows: Vec<usize>,
    /// Window for rolling return volatility.
    pub vol_window: usize,
    /// Momentum windows; each yields price_t / price_{t-w} - 1.
    pub momentum_windows: Vec<usize>,
    /// RSI period.
    pub rsi_period: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            return_lags: 5,
            sma_windows: vec![5, 10, 20],
            vol_window: 10,
            momentum_windows: vec![5, 10],
            rsi_period: 14,
        }
    }
}

impl FeatureConfig {
    pub fn n_features(&self) -> usize {
        self.return_lags + self.sma_windows.len() + 1 + self.momentum_windows.len() + 1
    }

    /// Leading observations consumed before the first usable sample.
    pub fn warmup(&self) -> usize {
        let mut w = self.return_lags + 1;
        w = w.max(self.sma_windows.iter().copied().max().unwrap_or(0));
        w = w.max(self.vol_window + 1);
        w = w.max(self.momentum_windows.iter().copied().max().unwrap_or(0) + 1);
        w.max(self.rsi_period + 1)
    }
}

/// Supervised dataset built from one close-price series: each row is the
/// feature vector at day t, the target is the simple return from t to t+1.
/// `latest` holds the feature vector at the final observed day, for
/// predicting the next unobserved return.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub matrix: DMatrix<f64>,
    pub target: DVector<f64>,
    pub names: Vec<String>,
    pub latest: Vec<f64>,
}

impl FeatureSet {
    /// Returns None when the series is too short for even one sample.
    pub fn build(closes: &[f64], config: &FeatureConfig) -> Option<Self> {
        let n = closes.len();
        let warmup = config.warmup();
        // Need warmup days of history plus one future day for the target.
        if n < warmup + 2 {
            return None;
        }

        let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();

        let names = feature_names(config);
        let n_feat = config.n_features();

        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut targets: Vec<f64> = Vec::new();
        for t in warmup..n - 1 {
            rows.push(feature_row(closes, &returns, t, config));
            targets.push(returns[t]); // returns[t] = close[t] -> close[t+1]
        }
        let latest = feature_row(closes, &returns, n - 1, config);

        let n_samples = rows.len();
        let mut matrix = DMatrix::zeros(n_samples, n_feat);
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                matrix[(i, j)] = v;
            }
        }

        Some(Self {
            matrix,
            target: DVector::from_vec(targets),
            names,
            latest,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }
}

fn feature_names(config: &FeatureConfig) -> Vec<String> {
    let mut names = Vec::with_capacity(config.n_features());
    for lag in 0..config.return_lags {
        names.push(format!("ret_lag{}", lag + 1));
    }
    for w in &config.sma_windows {
        names.push(format!("sma{}_ratio", w));
    }
    names.push(format!("vol{}", config.vol_window));
    for w in &config.momentum_windows {
        names.push(format!("mom{}", w));
    }
    names.push(format!("rsi{}", config.rsi_period));
    names
}

/// Feature vector at day index t (t indexes `closes`; returns[t-1] is the
/// most recent completed return).
fn feature_row(closes: &[f64], returns: &[f64], t: usize, config: &FeatureConfig) -> Vec<f64> {
    let mut row = Vec::with_capacity(config.n_features());

    for lag in 1..=config.return_lags {
        row.push(returns[t - lag]);
    }

    for &w in &config.sma_windows {
        let sma = closes[t + 1 - w..=t].iter().sum::<f64>() / w as f64;
        row.push(if sma > 0.0 { closes[t] / sma } else { 1.0 });
    }

    let vol_slice = &returns[t - config.vol_window..t];
    let mean = vol_slice.iter().sum::<f64>() / vol_slice.len() as f64;
    let var = vol_slice.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (vol_slice.len() as f64 - 1.0).max(1.0);
    row.push(var.sqrt());

    for &w in &config.momentum_windows {
        let base = closes[t - w];
        row.push(if base > 0.0 { closes[t] / base - 1.0 } else { 0.0 });
    }

    row.push(rsi(&returns[t - config.rsi_period..t]));

    row
}

/// RSI over a slice of returns, scaled to [0, 100]. 50 when flat.
fn rsi(returns: &[f64]) -> f64 {
    let gains: f64 = returns.iter().filter(|&&r| r > 0.0).sum();
    let losses: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| -r).sum();
    if gains + losses < 1e-15 {
        return 50.0;
    }
    100.0 * gains / (gains + losses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_closes(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64) * 0.5 + ((i * 7) % 5) as f64)
            .collect()
    }

    #[test]
    fn builds_expected_shape() {
        let config = FeatureConfig::default();
        let closes = synthetic_closes(80);
        let fs = FeatureSet::build(&closes, &config).unwrap();
        assert_eq!(fs.n_features(), config.n_features());
        assert_eq!(fs.names.len(), config.n_features());
        assert_eq!(fs.n_samples(), 80 - config.warmup() - 1);
        assert_eq!(fs.latest.len(), config.n_features());
    }

    #[test]
    fn too_short_series_is_none() {
        let config = FeatureConfig::default();
        let closes = synthetic_closes(10);
        assert!(FeatureSet::build(&closes, &config).is_none());
    }

    #[test]
    fn rsi_bounds() {
        assert_eq!(rsi(&[0.0, 0.0]), 50.0);
        assert_eq!(rsi(&[0.01, 0.02]), 100.0);
        assert_eq!(rsi(&[-0.01, -0.02]), 0.0);
    }
}
