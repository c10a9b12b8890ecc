//! Multi-step price forecasts. The linear model extrapolates an OLS fit
//! of price on time index; the random-forest model regresses price on
//! (time index, SMA-10, SMA-30, rolling volatility) and extrapolates
//! holding the last indicator values. Degenerate series fall back to a
//! flat line at the last close with zero confidence.

use chrono::Duration;

use allocation_core::{
    EngineError, ForecastModel, ForecastPoint, ForecastResult, PriceSeries,
};
use ml_models::{r_squared, ForestConfig, LinearFit, RandomForest};

const MAX_HORIZON_DAYS: u32 = 365;

const SMA_SHORT: usize = 10;
const SMA_LONG: usize = 30;
const VOL_WINDOW: usize = 10;

/// Fraction of samples held out to score the forest.
const VALIDATION_SPLIT: f64 = 0.2;

pub struct ForecastEngine {
    min_points: usize,
    forest: ForestConfig,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self {
            min_points: 40,
            forest: ForestConfig::default(),
        }
    }
}

impl ForecastEngine {
    pub fn new(min_points: usize) -> Self {
        Self {
            min_points,
            ..Default::default()
        }
    }

    pub fn forecast(
        &self,
        series: &PriceSeries,
        days: u32,
        model: ForecastModel,
    ) -> Result<ForecastResult, EngineError> {
        if days == 0 || days > MAX_HORIZON_DAYS {
            return Err(EngineError::InvalidHorizon { days });
        }
        series.validate()?;

        let closes = series.closes();
        if closes.len() < self.min_points {
            return Err(EngineError::InsufficientHistory {
                ticker: series.ticker.clone(),
                points: closes.len(),
                required: self.min_points,
            });
        }

        let current_price = closes[closes.len() - 1];
        let (prices, score) = match model {
            ForecastModel::Linear => linear_path(&closes, days),
            ForecastModel::RandomForest => forest_path(&closes, days, &self.forest),
        }
        .unwrap_or_else(|| {
            tracing::warn!(
                ticker = %series.ticker,
                ?model,
                "model fit failed, falling back to flat-line forecast"
            );
            (vec![current_price; days as usize], 0.0)
        });

        // last_date exists: validate() guarantees >= 2 points.
        let last_date = series.last_date().unwrap_or_default();
        let predictions = prices
            .into_iter()
            .enumerate()
            .map(|(i, predicted_price)| ForecastPoint {
                date: last_date + Duration::days(i as i64 + 1),
                predicted_price,
            })
            .collect();

        Ok(ForecastResult {
            current_price,
            model_score: score.clamp(0.0, 1.0),
            predictions,
        })
    }
}

fn linear_path(closes: &[f64], days: u32) -> Option<(Vec<f64>, f64)> {
    let n = closes.len();
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let fit = LinearFit::fit(&x, closes)?;

    let prices = (0..days as i64)
        .map(|k| fit.predict((n as i64 + k) as f64).max(0.01))
        .collect();
    Some((prices, fit.r_squared))
}

fn forest_path(closes: &[f64], days: u32, config: &ForestConfig) -> Option<(Vec<f64>, f64)> {
    let n = closes.len();
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();

    // One sample per day once the longest window is available.
    let first = SMA_LONG - 1;
    if n <= first {
        return None;
    }
    let feature_at = |t: usize| -> Vec<f64> {
        vec![
            t as f64,
            sma(closes, t, SMA_SHORT),
            sma(closes, t, SMA_LONG),
            rolling_vol(&returns, t, VOL_WINDOW),
        ]
    };

    let rows: Vec<Vec<f64>> = (first..n).map(feature_at).collect();
    let targets: Vec<f64> = (first..n).map(|t| closes[t]).collect();

    let n_val = ((rows.len() as f64) * VALIDATION_SPLIT).round() as usize;
    let n_train = rows.len().checked_sub(n_val)?;
    if n_train < 2 || n_val < 1 {
        return None;
    }

    let forest = RandomForest::fit(&rows[..n_train], &targets[..n_train], config.clone())?;

    let predicted: Vec<f64> = rows[n_train..].iter().map(|r| forest.predict(r)).collect();
    let score = r_squared(&targets[n_train..], &predicted);

    // Extrapolate with the time index advancing and the last observed
    // indicator values held fixed.
    let last = feature_at(n - 1);
    let prices = (1..=days as usize)
        .map(|k| {
            let row = vec![(n - 1 + k) as f64, last[1], last[2], last[3]];
            forest.predict(&row).max(0.01)
        })
        .collect();

    Some((prices, score))
}

fn sma(closes: &[f64], t: usize, window: usize) -> f64 {
    let start = (t + 1).saturating_sub(window);
    let slice = &closes[start..=t];
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Sample stdev of the trailing `window` returns ending at day t.
fn rolling_vol(returns: &[f64], t: usize, window: usize) -> f64 {
    let end = t.min(returns.len());
    let start = end.saturating_sub(window);
    let slice = &returns[start..end];
    if slice.len() < 2 {
        return 0.0;
    }
    let mean = slice.iter().sum::<f64>() / slice.len() as f64;
    let var =
        slice.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (slice.len() as f64 - 1.0);
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocation_core::PricePoint;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn series_from_closes(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + Duration::days(i as i64),
                close,
            })
            .collect();
        PriceSeries::new("TEST", points)
    }

    fn trending_closes(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + i as f64 * 0.8 + ((i * 13) % 5) as f64)
            .collect()
    }

    #[test]
    fn rejects_invalid_horizon() {
        let engine = ForecastEngine::default();
        let series = series_from_closes(&trending_closes(60));
        for days in [0u32, 366] {
            let err = engine
                .forecast(&series, days, ForecastModel::Linear)
                .unwrap_err();
            assert_eq!(err.code(), "INVALID_HORIZON");
        }
    }

    #[test]
    fn rejects_short_series() {
        let engine = ForecastEngine::default();
        let series = series_from_closes(&trending_closes(10));
        let err = engine
            .forecast(&series, 30, ForecastModel::Linear)
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_HISTORY");
    }

    #[test]
    fn linear_continues_an_exact_trend() {
        let engine = ForecastEngine::default();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 2.0).collect();
        let series = series_from_closes(&closes);
        let result = engine.forecast(&series, 5, ForecastModel::Linear).unwrap();

        assert_relative_eq!(result.model_score, 1.0, epsilon = 1e-9);
        assert_eq!(result.predictions.len(), 5);
        // Next index is 60: price 100 + 60*2 = 220, then +2 per day.
        for (i, p) in result.predictions.iter().enumerate() {
            assert_relative_eq!(p.predicted_price, 220.0 + 2.0 * i as f64, epsilon = 1e-9);
        }
    }

    #[test]
    fn constant_series_forecasts_flat_with_zero_score() {
        let engine = ForecastEngine::default();
        let series = series_from_closes(&[75.0; 60]);
        let result = engine.forecast(&series, 10, ForecastModel::Linear).unwrap();

        assert_eq!(result.model_score, 0.0);
        assert_eq!(result.predictions.len(), 10);
        for p in &result.predictions {
            assert_relative_eq!(p.predicted_price, 75.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn prediction_dates_are_consecutive_after_last_observation() {
        let engine = ForecastEngine::default();
        let series = series_from_closes(&trending_closes(60));
        let last = series.last_date().unwrap();
        let result = engine.forecast(&series, 7, ForecastModel::Linear).unwrap();

        for (i, p) in result.predictions.iter().enumerate() {
            assert_eq!(p.date, last + Duration::days(i as i64 + 1));
        }
    }

    #[test]
    fn forest_output_matches_horizon_and_is_finite() {
        let engine = ForecastEngine::default();
        let series = series_from_closes(&trending_closes(120));
        let result = engine
            .forecast(&series, 30, ForecastModel::RandomForest)
            .unwrap();

        assert_eq!(result.predictions.len(), 30);
        assert!(result.model_score >= 0.0 && result.model_score <= 1.0);
        for p in &result.predictions {
            assert!(p.predicted_price.is_finite());
            assert!(p.predicted_price > 0.0);
        }
    }

    #[test]
    fn forest_falls_back_to_flat_line_when_fit_is_impossible() {
        // 30 points leave exactly one usable sample after the 30-day SMA
        // warmup, too few to train and validate a forest.
        let engine = ForecastEngine::new(30);
        let series = series_from_closes(&trending_closes(30));
        let result = engine
            .forecast(&series, 14, ForecastModel::RandomForest)
            .unwrap();

        assert_eq!(result.model_score, 0.0);
        assert_eq!(result.predictions.len(), 14);
        for p in &result.predictions {
            assert_relative_eq!(p.predicted_price, result.current_price, epsilon = 1e-12);
        }
    }

    #[test]
    fn current_price_is_last_close() {
        let engine = ForecastEngine::default();
        let mut closes = trending_closes(60);
        closes[59] = 142.5;
        let series = series_from_closes(&closes);
        let result = engine.forecast(&series, 1, ForecastModel::Linear).unwrap();
        assert_relative_eq!(result.current_price, 142.5, epsilon = 1e-12);
    }
}
