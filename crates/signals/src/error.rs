use thiserror::Error;

/// Indicator computation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndicatorError {
    /// Not enough candle history for the requested analysis.
    #[error("insufficient candle history: need {required}, have {available}")]
    InsufficientData { required: usize, available: usize },
}

/// Signal generation errors. None of these are faults — they mean "no trade
/// this iteration".
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SignalError {
    #[error(transparent)]
    InsufficientData(#[from] IndicatorError),

    #[error("signal strength {strength:.1} below threshold {min:.1}")]
    BelowThreshold { strength: f64, min: f64 },

    /// Buy and sell scores tied; no directional consensus.
    #[error("no directional consensus")]
    NoDirection,
}
