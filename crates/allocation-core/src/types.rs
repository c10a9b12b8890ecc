use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::EngineError;

/// One close-price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Ordered close-price history for one ticker.
///
/// Invariant: dates strictly increasing, at least 2 points (one derivable
/// return). Enforced by `validate`, which providers call before handing a
/// series to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, points: Vec<PricePoint>) -> Self {
        Self {
            ticker: ticker.into(),
            points,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.points.len() < 2 {
            return Err(EngineError::InsufficientHistory {
                ticker: self.ticker.clone(),
                points: self.points.len(),
                required: 2,
            });
        }
        for w in self.points.windows(2) {
            if w[1].date <= w[0].date {
                return Err(EngineError::InvalidSeries {
                    ticker: self.ticker.clone(),
                    reason: format!("dates not strictly increasing at {}", w[1].date),
                });
            }
        }
        if self.points.iter().any(|p| !p.close.is_finite() || p.close <= 0.0) {
            return Err(EngineError::InvalidSeries {
                ticker: self.ticker.clone(),
                reason: "non-positive or non-finite close price".into(),
            });
        }
        Ok(())
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// Simple period-over-period percentage changes; length = points - 1.
    pub fn daily_returns(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|w| (w[1].close - w[0].close) / w[0].close)
            .collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

/// Lookback window requested from the price provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Week1,
    Month1,
    Month3,
    Month6,
    Year1,
    Year2,
    Year5,
}

impl Period {
    pub fn calendar_days(&self) -> i64 {
        match self {
            Period::Week1 => 7,
            Period::Month1 => 30,
            Period::Month3 => 91,
            Period::Month6 => 182,
            Period::Year1 => 365,
            Period::Year2 => 730,
            Period::Year5 => 1825,
        }
    }

}

/// Pass-through ticker metadata supplied by the provider; never computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickerDetails {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
}

/// Per-asset risk/return statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStats {
    pub ticker: String,
    /// Annualized expected return (fraction, e.g. 0.12 = 12%).
    pub expected_return: f64,
    /// Annualized volatility (fraction).
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// Peak-to-trough decline, reported as a negative fraction in [-1, 0].
    pub max_drawdown: f64,
    /// 5th percentile of daily returns; worst single-day loss at 95%.
    pub var_95: f64,
    /// Mean daily return in the tail at or below the VaR threshold.
    pub cvar_95: f64,
    /// Skewness of the daily-return distribution.
    pub skew: f64,
    /// Excess kurtosis of the daily-return distribution (normal = 0).
    pub kurtosis: f64,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
}

/// One line of an allocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLine {
    pub ticker: String,
    pub amount: f64,
}

/// Capital allocation request: ordered (ticker, amount) pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub stocks: Vec<StockLine>,
}

pub const MAX_REQUEST_TICKERS: usize = 10;

impl AllocationRequest {
    pub fn tickers(&self) -> Vec<String> {
        self.stocks.iter().map(|s| s.ticker.clone()).collect()
    }

    pub fn total_amount(&self) -> f64 {
        self.stocks.iter().map(|s| s.amount).sum()
    }

    /// Input validation: rejected before any computation is attempted.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.stocks.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        if self.stocks.len() > MAX_REQUEST_TICKERS {
            return Err(EngineError::TooManyTickers {
                count: self.stocks.len(),
                max: MAX_REQUEST_TICKERS,
            });
        }
        let mut seen = std::collections::HashSet::new();
        for line in &self.stocks {
            if line.amount <= 0.0 || !line.amount.is_finite() {
                return Err(EngineError::InvalidAmount {
                    ticker: line.ticker.clone(),
                    amount: line.amount,
                });
            }
            if !seen.insert(line.ticker.to_uppercase()) {
                return Err(EngineError::DuplicateTicker(line.ticker.clone()));
            }
        }
        Ok(())
    }
}

/// Which return model produced the expected returns fed to the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Basic,
    Enhanced,
}

/// A ticker dropped from an optimization, with the reason it was dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedTicker {
    pub ticker: String,
    pub code: String,
    pub message: String,
}

/// Optimization response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// ticker -> weight; sums to 1.0 within 1e-6, all >= 0.
    pub weights: BTreeMap<String, f64>,
    /// ticker -> currency amount = weight * total.
    pub allocation: BTreeMap<String, f64>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub per_stock_stats: BTreeMap<String, AssetStats>,
    pub model_used: ModelKind,
    /// Label describing which estimator produced the expected returns.
    pub return_method: String,
    /// Per-asset expected returns used by the solver; enhanced mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_expected_returns: Option<BTreeMap<String, f64>>,
    /// Tickers excluded from the solve, with typed reasons.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedTicker>,
}

/// Forecast model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    Linear,
    RandomForest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_price: f64,
}

/// Per-ticker forecast.
///
/// `model_score` is R² of the training fit for the linear model and held-out
/// validation R² for the random forest, both clamped to [0, 1]. Fallback
/// (flat-line) forecasts report 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub current_price: f64,
    pub model_score: f64,
    pub predictions: Vec<ForecastPoint>,
}

/// One aligned date row of a comparison chart. Tickers with no observation
/// on this date are simply absent from `values`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonPoint {
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    pub current_price: f64,
    /// Total return over the window (fraction).
    pub total_return: f64,
    /// Annualized volatility (fraction).
    pub volatility: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub chart_data: Vec<ComparisonPoint>,
    pub metrics: BTreeMap<String, ComparisonMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Bullish => "Bullish",
            SentimentLabel::Bearish => "Bearish",
            SentimentLabel::Neutral => "Neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexQuote {
    pub current: f64,
    pub change_percent: f64,
}

/// Market-wide sentiment read from major index moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub sentiment: SentimentLabel,
    pub indicators: BTreeMap<String, IndexQuote>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(ticker: &str, closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries::new(
            ticker,
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| PricePoint {
                    date: start + chrono::Duration::days(i as i64),
                    close: c,
                })
                .collect(),
        )
    }

    #[test]
    fn daily_returns_length_and_values() {
        let s = series("AAPL", &[100.0, 110.0, 99.0]);
        let r = s.daily_returns();
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(r[1], -0.10, epsilon = 1e-12);
    }

    #[test]
    fn validate_rejects_short_series() {
        let s = series("AAPL", &[100.0]);
        let err = s.validate().unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_HISTORY");
    }

    #[test]
    fn validate_rejects_unordered_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let s = PriceSeries::new(
            "AAPL",
            vec![
                PricePoint { date: d, close: 100.0 },
                PricePoint { date: d, close: 101.0 },
            ],
        );
        assert_eq!(s.validate().unwrap_err().code(), "INVALID_SERIES");
    }

    #[test]
    fn request_validation() {
        let empty = AllocationRequest { stocks: vec![] };
        assert_eq!(empty.validate().unwrap_err().code(), "EMPTY_INPUT");

        let zero = AllocationRequest {
            stocks: vec![StockLine {
                ticker: "AAPL".into(),
                amount: 0.0,
            }],
        };
        assert_eq!(zero.validate().unwrap_err().code(), "INVALID_AMOUNT");

        let dup = AllocationRequest {
            stocks: vec![
                StockLine { ticker: "AAPL".into(), amount: 100.0 },
                StockLine { ticker: "aapl".into(), amount: 200.0 },
            ],
        };
        assert_eq!(dup.validate().unwrap_err().code(), "DUPLICATE_TICKER");

        let many = AllocationRequest {
            stocks: (0..11)
                .map(|i| StockLine {
                    ticker: format!("T{i}"),
                    amount: 1.0,
                })
                .collect(),
        };
        assert_eq!(many.validate().unwrap_err().code(), "TOO_MANY_TICKERS");
    }
}
