//! Side-by-side performance comparison: base-100 normalized price paths
//! aligned on the union of observation dates, plus per-ticker summary
//! metrics.

use std::collections::BTreeMap;

use allocation_core::{
    ComparisonMetrics, ComparisonPoint, ComparisonResult, EngineError, PriceSeries,
};

const MIN_TICKERS: usize = 2;

/// Build a comparison across at least two price series. Each ticker is
/// indexed to 100 at its own first observation; dates where a ticker has
/// no print carry no value for that ticker.
pub fn compare(series_list: &[PriceSeries]) -> Result<ComparisonResult, EngineError> {
    if series_list.len() < MIN_TICKERS {
        return Err(EngineError::TooFewSymbols {
            count: series_list.len(),
            required: MIN_TICKERS,
        });
    }
    for series in series_list {
        series.validate()?;
    }

    let mut chart: BTreeMap<chrono::NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
    let mut metrics = BTreeMap::new();

    for series in series_list {
        let base = series.points[0].close;
        for point in &series.points {
            chart
                .entry(point.date)
                .or_default()
                .insert(series.ticker.clone(), 100.0 * point.close / base);
        }

        let closes = series.closes();
        let returns = series.daily_returns();
        metrics.insert(
            series.ticker.clone(),
            ComparisonMetrics {
                current_price: closes[closes.len() - 1],
                total_return: closes[closes.len() - 1] / closes[0] - 1.0,
                volatility: risk_analytics::annualized_volatility(&returns),
            },
        );
    }

    let chart_data = chart
        .into_iter()
        .map(|(date, values)| ComparisonPoint { date, values })
        .collect();

    Ok(ComparisonResult {
        chart_data,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocation_core::PricePoint;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn series(ticker: &str, start_day: u32, closes: &[f64]) -> PriceSeries {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: NaiveDate::from_ymd_opt(2024, 3, start_day + i as u32).unwrap(),
                close,
            })
            .collect();
        PriceSeries::new(ticker, points)
    }

    #[test]
    fn requires_two_tickers() {
        let only = series("AAPL", 1, &[100.0, 101.0]);
        let err = compare(std::slice::from_ref(&only)).unwrap_err();
        assert_eq!(err.code(), "TOO_FEW_SYMBOLS");
    }

    #[test]
    fn each_ticker_starts_at_100() {
        let a = series("AAA", 1, &[50.0, 55.0, 60.0]);
        let b = series("BBB", 1, &[200.0, 190.0, 210.0]);
        let result = compare(&[a, b]).unwrap();

        let first = &result.chart_data[0];
        assert_relative_eq!(first.values["AAA"], 100.0, epsilon = 1e-9);
        assert_relative_eq!(first.values["BBB"], 100.0, epsilon = 1e-9);
    }

    #[test]
    fn normalization_tracks_each_tickers_own_base() {
        let a = series("AAA", 1, &[50.0, 75.0]);
        let b = series("BBB", 1, &[200.0, 100.0]);
        let result = compare(&[a, b]).unwrap();

        let last = result.chart_data.last().unwrap();
        assert_relative_eq!(last.values["AAA"], 150.0, epsilon = 1e-9);
        assert_relative_eq!(last.values["BBB"], 50.0, epsilon = 1e-9);
    }

    #[test]
    fn union_alignment_leaves_holes() {
        // BBB starts one day later and is missing the middle date.
        let a = series("AAA", 1, &[100.0, 110.0, 121.0]);
        let b = PriceSeries::new(
            "BBB",
            vec![
                PricePoint {
                    date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                    close: 40.0,
                },
                PricePoint {
                    date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                    close: 44.0,
                },
            ],
        );
        let result = compare(&[a, b]).unwrap();

        assert_eq!(result.chart_data.len(), 4);
        assert!(!result.chart_data[0].values.contains_key("BBB"));
        assert_relative_eq!(result.chart_data[1].values["BBB"], 100.0, epsilon = 1e-9);
        assert!(!result.chart_data[2].values.contains_key("BBB"));
        // Later values are unaffected by the hole.
        assert_relative_eq!(result.chart_data[3].values["BBB"], 110.0, epsilon = 1e-9);
    }

    #[test]
    fn metrics_report_return_and_price() {
        let a = series("AAA", 1, &[100.0, 110.0, 121.0]);
        let b = series("BBB", 1, &[80.0, 80.0, 60.0]);
        let result = compare(&[a, b]).unwrap();

        let ma = &result.metrics["AAA"];
        assert_relative_eq!(ma.current_price, 121.0, epsilon = 1e-12);
        assert_relative_eq!(ma.total_return, 0.21, epsilon = 1e-12);
        assert!(ma.volatility >= 0.0);

        let mb = &result.metrics["BBB"];
        assert_relative_eq!(mb.total_return, -0.25, epsilon = 1e-12);
    }
}
