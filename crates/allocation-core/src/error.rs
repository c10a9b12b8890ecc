use thiserror::Error;

/// Engine-wide error taxonomy. Every variant carries a stable machine code
/// so the consuming layer can render specific guidance without parsing
/// message text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("no tickers provided")]
    EmptyInput,

    #[error("invalid amount {amount} for {ticker}: amount must be > 0")]
    InvalidAmount { ticker: String, amount: f64 },

    #[error("duplicate ticker in request: {0}")]
    DuplicateTicker(String),

    #[error("too many tickers: {count} (maximum {max})")]
    TooManyTickers { count: usize, max: usize },

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("insufficient history for {ticker}: {points} price points, need {required}")]
    InsufficientHistory {
        ticker: String,
        points: usize,
        required: usize,
    },

    #[error("invalid forecast horizon: {days} days (must be 1-365)")]
    InvalidHorizon { days: u32 },

    #[error("comparison requires at least {required} resolvable tickers, got {count}")]
    TooFewSymbols { count: usize, required: usize },

    #[error("invalid price series for {ticker}: {reason}")]
    InvalidSeries { ticker: String, reason: String },

    #[error("data provider error: {0}")]
    Provider(String),

    #[error("request timed out")]
    Timeout,
}

impl EngineError {
    /// Stable machine-readable code for each variant.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::EmptyInput => "EMPTY_INPUT",
            EngineError::InvalidAmount { .. } => "INVALID_AMOUNT",
            EngineError::DuplicateTicker(_) => "DUPLICATE_TICKER",
            EngineError::TooManyTickers { .. } => "TOO_MANY_TICKERS",
            EngineError::UnknownTicker(_) => "UNKNOWN_TICKER",
            EngineError::InsufficientHistory { .. } => "INSUFFICIENT_HISTORY",
            EngineError::InvalidHorizon { .. } => "INVALID_HORIZON",
            EngineError::TooFewSymbols { .. } => "TOO_FEW_SYMBOLS",
            EngineError::InvalidSeries { .. } => "INVALID_SERIES",
            EngineError::Provider(_) => "PROVIDER",
            EngineError::Timeout => "TIMEOUT",
        }
    }

    /// True for errors that abort the whole request with no partial result.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Provider(_) | EngineError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::EmptyInput.code(), "EMPTY_INPUT");
        assert_eq!(
            EngineError::InvalidAmount {
                ticker: "AAPL".into(),
                amount: -1.0
            }
            .code(),
            "INVALID_AMOUNT"
        );
        assert_eq!(EngineError::InvalidHorizon { days: 400 }.code(), "INVALID_HORIZON");
        assert_eq!(EngineError::Timeout.code(), "TIMEOUT");
    }

    #[test]
    fn fatality() {
        assert!(EngineError::Provider("down".into()).is_fatal());
        assert!(EngineError::Timeout.is_fatal());
        assert!(!EngineError::UnknownTicker("ZZZZ".into()).is_fatal());
    }
}
