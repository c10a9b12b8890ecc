//! Public entry points of the engine: `optimize`, `predict`, `compare` and
//! `market_sentiment`. Per-ticker price fetches fan out on a JoinSet with
//! bounded concurrency and per-fetch timeouts; tickers with bad data are
//! dropped with typed reasons while at least one survives, and fatal
//! provider or timeout errors abort the whole request.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use allocation_core::{
    AllocationRequest, ComparisonResult, DroppedTicker, EngineConfig, EngineError, ForecastModel,
    ForecastResult, IndexQuote, ModelKind, OptimizationResult, Period, PriceProvider, PriceSeries,
    ReturnEstimator, SentimentLabel, SentimentSnapshot, TickerDetails,
};
use forecast_engine::ForecastEngine;
use market_client::HttpMarketClient;
use optimizer::OptimizerConfig;
use return_estimator::{EnhancedReturnEstimator, HistoricalReturnEstimator};

const SP500_SYMBOL: &str = "^GSPC";
const VIX_SYMBOL: &str = "^VIX";

const BULLISH_SP500_CHANGE: f64 = 1.0;
const BULLISH_VIX_MAX: f64 = 20.0;
const BEARISH_SP500_CHANGE: f64 = -1.0;
const BEARISH_VIX_MIN: f64 = 25.0;

/// Batch forecast response: successes and per-ticker failures side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionBatch {
    pub forecasts: BTreeMap<String, ForecastResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed: BTreeMap<String, DroppedTicker>,
}

pub struct AllocationEngine {
    provider: Arc<dyn PriceProvider>,
    config: EngineConfig,
    forecaster: ForecastEngine,
}

impl AllocationEngine {
    pub fn new(provider: Arc<dyn PriceProvider>, config: EngineConfig) -> Self {
        Self {
            provider,
            config,
            forecaster: ForecastEngine::default(),
        }
    }

    /// HTTP-backed engine configured from the environment (a .env file is
    /// honored when present).
    pub fn from_env() -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();
        let client = HttpMarketClient::from_env()?;
        Ok(Self::new(Arc::new(client), EngineConfig::from_env()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mean-variance allocation of the requested capital.
    #[tracing::instrument(skip(self, request), fields(tickers = request.stocks.len()))]
    pub async fn optimize(
        &self,
        request: &AllocationRequest,
        model: ModelKind,
    ) -> Result<OptimizationResult, EngineError> {
        request.validate()?;

        let tickers: Vec<String> = request
            .stocks
            .iter()
            .map(|s| s.ticker.to_uppercase())
            .collect();

        let fetched = self.fetch_all(&tickers, self.config.lookback).await;
        let (survivors, dropped) = self.partition(&tickers, fetched)?;

        let estimator: Box<dyn ReturnEstimator> = match model {
            ModelKind::Basic => Box::new(HistoricalReturnEstimator),
            ModelKind::Enhanced => {
                Box::new(EnhancedReturnEstimator::new(self.config.enhanced_min_days))
            }
        };

        let mut kept: Vec<PriceSeries> = Vec::new();
        let mut mu: Vec<f64> = Vec::new();
        let mut methods: Vec<String> = Vec::new();
        let mut dropped = dropped;
        let mut first_err: Option<EngineError> = None;
        for series in survivors {
            match estimator.estimate(&series) {
                Ok(estimate) => {
                    mu.push(estimate.annualized);
                    methods.push(estimate.method);
                    kept.push(series);
                }
                Err(err) => {
                    tracing::warn!(ticker = %series.ticker, %err, "dropping ticker: estimation failed");
                    dropped.push(DroppedTicker {
                        ticker: series.ticker.clone(),
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                    first_err.get_or_insert(err);
                }
            }
        }
        if kept.is_empty() {
            return Err(first_err.unwrap_or(EngineError::EmptyInput));
        }

        // Covariance runs on returns aligned to the dates every survivor has.
        let aligned_returns = aligned_daily_returns(&kept);
        let cov = risk_analytics::covariance_matrix(&aligned_returns);
        let solver_config = OptimizerConfig {
            risk_free_rate: self.config.risk_free_rate,
            allow_short: self.config.allow_short,
        };
        let weights = optimizer::max_sharpe_weights(&mu, &cov, &solver_config)?;

        let expected_return = optimizer::portfolio_return(&weights, &mu);
        let blended = risk_analytics::portfolio_daily_returns(&weights, &aligned_returns);
        let volatility = risk_analytics::annualized_volatility(&blended);
        let sharpe =
            risk_analytics::sharpe_ratio(expected_return, self.config.risk_free_rate, volatility);

        let total = request.total_amount();
        let mut weight_map = BTreeMap::new();
        let mut allocation = BTreeMap::new();
        let mut per_stock_stats = BTreeMap::new();
        let mut stock_expected_returns = BTreeMap::new();
        for (i, series) in kept.iter().enumerate() {
            let details = self
                .provider
                .get_details(&series.ticker)
                .await
                .unwrap_or_else(|_| TickerDetails::default());
            weight_map.insert(series.ticker.clone(), weights[i]);
            allocation.insert(series.ticker.clone(), weights[i] * total);
            per_stock_stats.insert(
                series.ticker.clone(),
                risk_analytics::asset_stats(series, mu[i], self.config.risk_free_rate, &details),
            );
            stock_expected_returns.insert(series.ticker.clone(), mu[i]);
        }

        methods.sort();
        methods.dedup();

        tracing::info!(
            kept = kept.len(),
            dropped = dropped.len(),
            expected_return,
            volatility,
            "optimization complete"
        );

        Ok(OptimizationResult {
            weights: weight_map,
            allocation,
            expected_return,
            volatility,
            sharpe_ratio: sharpe,
            per_stock_stats,
            model_used: model,
            return_method: methods.join("+"),
            stock_expected_returns: match model {
                ModelKind::Enhanced => Some(stock_expected_returns),
                ModelKind::Basic => None,
            },
            dropped,
        })
    }

    /// Multi-day price forecasts for a batch of tickers.
    #[tracing::instrument(skip(self, symbols), fields(symbols = symbols.len(), days))]
    pub async fn predict(
        &self,
        symbols: &[String],
        days: u32,
        model: ForecastModel,
    ) -> Result<PredictionBatch, EngineError> {
        if symbols.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        if days == 0 || days > 365 {
            return Err(EngineError::InvalidHorizon { days });
        }

        let tickers: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        let fetched = self.fetch_all(&tickers, self.config.lookback).await;

        let mut forecasts = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for ticker in &tickers {
            let outcome = match fetched.get(ticker) {
                Some(Ok(series)) => self.forecaster.forecast(series, days, model),
                Some(Err(err)) => Err(err.clone()),
                None => Err(EngineError::Timeout),
            };
            match outcome {
                Ok(result) => {
                    forecasts.insert(ticker.clone(), result);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    failed.insert(
                        ticker.clone(),
                        DroppedTicker {
                            ticker: ticker.clone(),
                            code: err.code().to_string(),
                            message: err.to_string(),
                        },
                    );
                }
            }
        }

        Ok(PredictionBatch { forecasts, failed })
    }

    /// Base-100 performance comparison over a lookback window.
    #[tracing::instrument(skip(self, symbols), fields(symbols = symbols.len()))]
    pub async fn compare(
        &self,
        symbols: &[String],
        period: Period,
    ) -> Result<ComparisonResult, EngineError> {
        if symbols.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let tickers: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        let fetched = self.fetch_all(&tickers, period).await;

        let mut resolvable = Vec::new();
        for ticker in &tickers {
            match fetched.get(ticker) {
                Some(Ok(series)) => resolvable.push(series.clone()),
                Some(Err(err)) if err.is_fatal() => return Err(err.clone()),
                Some(Err(err)) => {
                    tracing::warn!(%ticker, %err, "excluding ticker from comparison");
                }
                None => return Err(EngineError::Timeout),
            }
        }
        if resolvable.len() < 2 {
            return Err(EngineError::TooFewSymbols {
                count: resolvable.len(),
                required: 2,
            });
        }

        comparison_engine::compare(&resolvable)
    }

    /// Market-wide sentiment from the S&P 500 and VIX over the last week.
    #[tracing::instrument(skip(self))]
    pub async fn market_sentiment(&self) -> Result<SentimentSnapshot, EngineError> {
        let sp500 = self
            .provider
            .get_prices(SP500_SYMBOL, Period::Week1)
            .await?;
        let vix = self.provider.get_prices(VIX_SYMBOL, Period::Week1).await?;

        let sp500_quote = index_quote(&sp500)?;
        let vix_quote = index_quote(&vix)?;

        let sentiment = if sp500_quote.change_percent > BULLISH_SP500_CHANGE
            && vix_quote.current < BULLISH_VIX_MAX
        {
            SentimentLabel::Bullish
        } else if sp500_quote.change_percent < BEARISH_SP500_CHANGE
            && vix_quote.current > BEARISH_VIX_MIN
        {
            SentimentLabel::Bearish
        } else {
            SentimentLabel::Neutral
        };

        let mut indicators = BTreeMap::new();
        indicators.insert(SP500_SYMBOL.to_string(), sp500_quote);
        indicators.insert(VIX_SYMBOL.to_string(), vix_quote);

        tracing::info!(sentiment = sentiment.as_str(), "sentiment snapshot");
        Ok(SentimentSnapshot {
            sentiment,
            indicators,
        })
    }

    /// Concurrent per-ticker fetch with a semaphore cap, per-fetch timeout
    /// and an overall request deadline.
    async fn fetch_all(
        &self,
        tickers: &[String],
        period: Period,
    ) -> HashMap<String, Result<PriceSeries, EngineError>> {
        let cap = self
            .config
            .max_concurrent_fetches
            .min(tickers.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(cap));
        let mut set = JoinSet::new();

        for ticker in tickers {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let ticker = ticker.clone();
            let fetch_timeout = self.config.fetch_timeout;
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result =
                    match tokio::time::timeout(fetch_timeout, provider.get_prices(&ticker, period))
                        .await
                    {
                        Ok(inner) => inner,
                        Err(_) => {
                            tracing::warn!(%ticker, "per-ticker fetch timed out");
                            Err(EngineError::Timeout)
                        }
                    };
                (ticker, result)
            });
        }

        let mut results = HashMap::new();
        let deadline = tokio::time::timeout(self.config.request_timeout, async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((ticker, result)) => {
                        results.insert(ticker, result);
                    }
                    Err(err) => tracing::error!(%err, "fetch task failed to join"),
                }
            }
        })
        .await;

        if deadline.is_err() {
            tracing::warn!("request deadline elapsed, abandoning outstanding fetches");
            set.abort_all();
            for ticker in tickers {
                results
                    .entry(ticker.clone())
                    .or_insert(Err(EngineError::Timeout));
            }
        }
        results
    }

    /// Split fetch outcomes into usable series and dropped tickers. Fatal
    /// errors abort; series below the configured history floor are dropped.
    fn partition(
        &self,
        tickers: &[String],
        mut fetched: HashMap<String, Result<PriceSeries, EngineError>>,
    ) -> Result<(Vec<PriceSeries>, Vec<DroppedTicker>), EngineError> {
        let mut survivors = Vec::new();
        let mut dropped = Vec::new();
        let mut first_err: Option<EngineError> = None;

        for ticker in tickers {
            let result = fetched
                .remove(ticker)
                .unwrap_or(Err(EngineError::Timeout));
            let err = match result {
                Ok(series) => {
                    if series.points.len() >= self.config.min_history_points {
                        survivors.push(series);
                        continue;
                    }
                    EngineError::InsufficientHistory {
                        ticker: ticker.clone(),
                        points: series.points.len(),
                        required: self.config.min_history_points,
                    }
                }
                Err(err) => err,
            };
            if err.is_fatal() {
                return Err(err);
            }
            tracing::warn!(%ticker, %err, "dropping ticker");
            dropped.push(DroppedTicker {
                ticker: ticker.clone(),
                code: err.code().to_string(),
                message: err.to_string(),
            });
            first_err.get_or_insert(err);
        }

        if survivors.is_empty() {
            return Err(first_err.unwrap_or(EngineError::EmptyInput));
        }
        Ok((survivors, dropped))
    }
}

fn index_quote(series: &PriceSeries) -> Result<IndexQuote, EngineError> {
    series.validate()?;
    let closes = series.closes();
    let first = closes[0];
    let last = closes[closes.len() - 1];
    Ok(IndexQuote {
        current: last,
        change_percent: (last / first - 1.0) * 100.0,
    })
}

/// Daily returns for each series restricted to the dates all of them share.
fn aligned_daily_returns(series_list: &[PriceSeries]) -> Vec<Vec<f64>> {
    let mut common: BTreeSet<chrono::NaiveDate> =
        series_list[0].points.iter().map(|p| p.date).collect();
    for series in &series_list[1..] {
        let dates: BTreeSet<_> = series.points.iter().map(|p| p.date).collect();
        common = common.intersection(&dates).copied().collect();
    }

    series_list
        .iter()
        .map(|series| {
            let by_date: HashMap<_, _> = series.points.iter().map(|p| (p.date, p.close)).collect();
            let closes: Vec<f64> = common.iter().filter_map(|d| by_date.get(d)).copied().collect();
            risk_analytics::daily_returns(&closes)
        })
        .collect()
}
