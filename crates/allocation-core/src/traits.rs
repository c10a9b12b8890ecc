use async_trait::async_trait;

use crate::{EngineError, Period, PriceSeries, TickerDetails};

/// Seam to the external market-data collaborator. Implementations must be
/// safe for concurrent use; per-ticker fetches fan out in parallel.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Ordered (date, close) history for one ticker over the lookback window.
    async fn get_prices(&self, ticker: &str, period: Period) -> Result<PriceSeries, EngineError>;

    /// Pass-through metadata (sector, market cap, P/E). Optional: providers
    /// without a reference endpoint return defaults.
    async fn get_details(&self, _ticker: &str) -> Result<TickerDetails, EngineError> {
        Ok(TickerDetails::default())
    }
}

/// Annualized expected return plus a label naming the estimator that
/// produced it.
#[derive(Debug, Clone)]
pub struct ReturnEstimate {
    pub annualized: f64,
    pub method: String,
}

/// Polymorphic expected-return estimator: one interface, basic and enhanced
/// variants behind it, so the optimizer never branches on model kind.
pub trait ReturnEstimator: Send + Sync {
    fn estimate(&self, series: &PriceSeries) -> Result<ReturnEstimate, EngineError>;
}
