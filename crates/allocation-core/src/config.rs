use std::time::Duration;

use crate::Period;

/// Engine-wide tunables. `Default` matches the documented behavior;
/// `from_env` lets the embedding binary override via environment variables
/// (load a .env file with dotenvy before constructing).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Annual risk-free rate used in Sharpe calculations.
    pub risk_free_rate: f64,
    /// Configuration point for short selling. The solver currently only
    /// implements the long-only projection; the flag exists so the
    /// constraint is stated rather than implicit.
    pub allow_short: bool,
    /// Lookback window requested from the provider for optimization.
    pub lookback: Period,
    /// Cap on concurrent per-ticker fetches.
    pub max_concurrent_fetches: usize,
    /// Per-ticker fetch deadline.
    pub fetch_timeout: Duration,
    /// Overall request deadline; waiting on remaining fetches is abandoned
    /// when it elapses.
    pub request_timeout: Duration,
    /// Minimum price points required to estimate risk for a ticker.
    pub min_history_points: usize,
    /// Trading days below which the enhanced estimator falls back.
    pub enhanced_min_days: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.02,
            allow_short: false,
            lookback: Period::Year1,
            max_concurrent_fetches: 4,
            fetch_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            min_history_points: 30,
            enhanced_min_days: 20,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<f64>("ENGINE_RISK_FREE_RATE") {
            cfg.risk_free_rate = v;
        }
        if let Some(v) = env_parse::<bool>("ENGINE_ALLOW_SHORT") {
            cfg.allow_short = v;
        }
        if let Some(v) = env_parse::<usize>("ENGINE_MAX_CONCURRENT_FETCHES") {
            cfg.max_concurrent_fetches = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("ENGINE_FETCH_TIMEOUT_SECS") {
            cfg.fetch_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("ENGINE_REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("ENGINE_MIN_HISTORY_POINTS") {
            cfg.min_history_points = v;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.risk_free_rate, 0.02);
        assert!(!cfg.allow_short);
        assert_eq!(cfg.max_concurrent_fetches, 4);
        assert_eq!(cfg.enhanced_min_days, 20);
    }
}
