use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use allocation_core::{EngineError, Period, PricePoint, PriceProvider, PriceSeries, TickerDetails};

pub mod memory;

pub use memory::MemoryProvider;

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window.
            let oldest = *ts.front().unwrap_or(&now);
            let sleep_dur =
                (oldest + self.window).duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "rate limiter: waiting {:.1}s for a request slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// HTTP market-data client backed by a Polygon-style aggregates API.
/// Requests are rate limited with a sliding window and 429 responses are
/// retried a fixed number of times.
#[derive(Clone)]
pub struct HttpMarketClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl HttpMarketClient {
    pub fn new(api_key: String) -> Self {
        let base_url =
            std::env::var("MARKET_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        // Free-tier keys should set MARKET_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("MARKET_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    pub fn from_env() -> Result<Self, EngineError> {
        let api_key = std::env::var("MARKET_API_KEY")
            .map_err(|_| EngineError::Provider("MARKET_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, EngineError> {
        let request = builder
            .build()
            .map_err(|e| EngineError::Provider(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| EngineError::Provider("cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| EngineError::Provider(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!(
                "market api 429, waiting {}s before retry {}/3",
                wait_secs,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(EngineError::Provider(
            "rate limited after 3 retries".to_string(),
        ))
    }

    async fn fetch_aggregates(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, EngineError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            ticker,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        if response.status().as_u16() == 404 {
            return Err(EngineError::UnknownTicker(ticker.to_string()));
        }
        if !response.status().is_success() {
            return Err(EngineError::Provider(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body: AggregateResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Provider(e.to_string()))?;

        // An empty result set for a well-formed request means the symbol
        // does not resolve to any listed instrument.
        if body.results.is_empty() {
            return Err(EngineError::UnknownTicker(ticker.to_string()));
        }

        Ok(body
            .results
            .into_iter()
            .filter_map(|r| {
                DateTime::from_timestamp_millis(r.t).map(|dt| PricePoint {
                    date: dt.date_naive(),
                    close: r.c,
                })
            })
            .collect())
    }
}

#[async_trait]
impl PriceProvider for HttpMarketClient {
    async fn get_prices(&self, ticker: &str, period: Period) -> Result<PriceSeries, EngineError> {
        let to = Utc::now();
        let from = to - chrono::Duration::days(period.calendar_days());
        let points = self.fetch_aggregates(ticker, from, to).await?;
        let series = PriceSeries::new(ticker, points);
        series.validate()?;
        Ok(series)
    }

    async fn get_details(&self, ticker: &str) -> Result<TickerDetails, EngineError> {
        let url = format!("{}/v3/reference/tickers/{}", self.base_url, ticker);

        let response = self
            .send_request(
                self.client
                    .get(&url)
                    .query(&[("apiKey", self.api_key.as_str())]),
            )
            .await?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(EngineError::UnknownTicker(ticker.to_string()));
        }
        // Reference data is optional on some plans.
        if status == 401 || status == 403 {
            tracing::debug!("ticker details not available (HTTP {}), using defaults", status);
            return Ok(TickerDetails::default());
        }
        if !response.status().is_success() {
            return Err(EngineError::Provider(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body: TickerDetailsResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Provider(e.to_string()))?;

        Ok(TickerDetails {
            name: Some(body.results.name),
            sector: body.results.sic_description,
            market_cap: body.results.market_cap,
            pe_ratio: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64,
    c: f64,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: TickerDetailsResult,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResult {
    name: String,
    #[serde(default)]
    sic_description: Option<String>,
    #[serde(default)]
    market_cap: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_admits_up_to_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_delays_excess_requests() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        // Third acquire waits for the window to open up.
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[test]
    fn aggregate_response_tolerates_missing_results() {
        let body: AggregateResponse =
            serde_json::from_str(r#"{"status":"OK","ticker":"AAPL"}"#).unwrap();
        assert!(body.results.is_empty());
    }

    #[test]
    fn aggregate_response_parses_bars() {
        let body: AggregateResponse = serde_json::from_str(
            r#"{"results":[{"t":1700000000000,"o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":100.0}]}"#,
        )
        .unwrap();
        assert_eq!(body.results.len(), 1);
        assert_eq!(body.results[0].c, 1.5);
    }
}
