use rust_decimal::Decimal;
use thiserror::Error;

/// Why a signal was not converted into a position. These are expected
/// control-flow outcomes, logged and dropped, never propagated as faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeRejection {
    #[error("daily loss limit hit: realized {realized} against limit {limit}")]
    DailyLossBreaker { realized: Decimal, limit: Decimal },

    #[error("max open positions reached ({open}/{max})")]
    MaxPositions { open: usize, max: usize },

    #[error("exposure ceiling: {projected} would exceed {ceiling}")]
    ExposureCeiling { projected: Decimal, ceiling: Decimal },

    /// Premium too rich for even one lot within the per-trade capital
    /// fraction, or not a sizable price at all.
    #[error("cannot size one lot at premium {premium}")]
    BelowOneLot { premium: Decimal },
}

impl TradeRejection {
    /// True for the daily breaker, which halts entries for the rest of the
    /// session rather than just skipping this signal.
    #[must_use]
    pub fn halts_trading(&self) -> bool {
        matches!(self, Self::DailyLossBreaker { .. })
    }
}
