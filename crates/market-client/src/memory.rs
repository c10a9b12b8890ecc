use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use allocation_core::{EngineError, Period, PriceProvider, PriceSeries, TickerDetails};

/// In-memory provider for tests and offline runs. Serves pre-loaded series
/// keyed by ticker; unknown tickers error the same way the HTTP client does.
#[derive(Default)]
pub struct MemoryProvider {
    series: HashMap<String, PriceSeries>,
    details: HashMap<String, TickerDetails>,
    failures: HashMap<String, EngineError>,
    delay: Option<Duration>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.series.insert(series.ticker.clone(), series);
        self
    }

    pub fn with_details(mut self, ticker: &str, details: TickerDetails) -> Self {
        self.details.insert(ticker.to_string(), details);
        self
    }

    /// Make one ticker fail with a fixed error.
    pub fn with_failure(mut self, ticker: &str, error: EngineError) -> Self {
        self.failures.insert(ticker.to_string(), error);
        self
    }

    /// Delay every fetch, for exercising timeout paths.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl PriceProvider for MemoryProvider {
    async fn get_prices(&self, ticker: &str, _period: Period) -> Result<PriceSeries, EngineError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.get(ticker) {
            return Err(err.clone());
        }
        self.series
            .get(ticker)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTicker(ticker.to_string()))
    }

    async fn get_details(&self, ticker: &str) -> Result<TickerDetails, EngineError> {
        Ok(self.details.get(ticker).cloned().unwrap_or_default())
    }
}
