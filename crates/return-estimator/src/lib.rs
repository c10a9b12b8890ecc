//! Expected-return estimators. The basic estimator annualizes realized
//! price growth; the enhanced one regresses next-day returns on engineered
//! features and compounds the prediction.

use allocation_core::{EngineError, PriceSeries, ReturnEstimate, ReturnEstimator};
use ml_models::{FeatureConfig, FeatureSet, RidgeRegression};

const TRADING_DAYS: f64 = 252.0;

/// Daily predictions outside this band are treated as noise and clamped
/// before compounding.
const MAX_DAILY_RETURN: f64 = 0.2;

/// Compounded annual estimates are clamped to a plausible band.
const MIN_ANNUAL_RETURN: f64 = -0.95;
const MAX_ANNUAL_RETURN: f64 = 5.0;

/// Geometric mean of realized returns, annualized:
/// (last / first)^(252 / n_returns) - 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricalReturnEstimator;

impl HistoricalReturnEstimator {
    fn annualized(series: &PriceSeries) -> Result<f64, EngineError> {
        series.validate()?;
        let closes = series.closes();
        let n_returns = (closes.len() - 1) as f64;
        let growth = closes[closes.len() - 1] / closes[0];
        Ok(growth.powf(TRADING_DAYS / n_returns) - 1.0)
    }
}

impl ReturnEstimator for HistoricalReturnEstimator {
    fn estimate(&self, series: &PriceSeries) -> Result<ReturnEstimate, EngineError> {
        Ok(ReturnEstimate {
            annualized: Self::annualized(series)?,
            method: "mean_historical".to_string(),
        })
    }
}

/// Ridge regression of next-day return on lagged returns, SMA ratios,
/// rolling volatility, momentum and RSI. Falls back to the historical
/// estimator when the series is too short to train on.
pub struct EnhancedReturnEstimator {
    min_days: usize,
    lambda: f64,
    features: FeatureConfig,
}

impl EnhancedReturnEstimator {
    pub fn new(min_days: usize) -> Self {
        Self {
            min_days,
            lambda: 1.0,
            features: FeatureConfig::default(),
        }
    }

    fn fallback(series: &PriceSeries) -> Result<ReturnEstimate, EngineError> {
        Ok(ReturnEstimate {
            annualized: HistoricalReturnEstimator::annualized(series)?,
            method: "historical_fallback".to_string(),
        })
    }
}

impl Default for EnhancedReturnEstimator {
    fn default() -> Self {
        Self::new(20)
    }
}

impl ReturnEstimator for EnhancedReturnEstimator {
    fn estimate(&self, series: &PriceSeries) -> Result<ReturnEstimate, EngineError> {
        series.validate()?;
        let closes = series.closes();
        if closes.len() < self.min_days {
            tracing::debug!(
                ticker = %series.ticker,
                points = closes.len(),
                "series too short for feature model, using historical estimate"
            );
            return Self::fallback(series);
        }

        let Some(feature_set) = FeatureSet::build(&closes, &self.features) else {
            return Self::fallback(series);
        };
        let Some(model) = RidgeRegression::fit(&feature_set.matrix, &feature_set.target, self.lambda)
        else {
            return Self::fallback(series);
        };

        let daily = model
            .predict(&feature_set.latest)
            .clamp(-MAX_DAILY_RETURN, MAX_DAILY_RETURN);
        let annualized =
            ((1.0 + daily).powf(TRADING_DAYS) - 1.0).clamp(MIN_ANNUAL_RETURN, MAX_ANNUAL_RETURN);

        Ok(ReturnEstimate {
            annualized,
            method: format!("ridge_{}_features", model.n_features()),
        })
    }
}
