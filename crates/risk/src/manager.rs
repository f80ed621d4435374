//! Position sizing, protective exits, and pre-trade gates.

use optrade_core::config::RiskConfig;
use optrade_core::types::{ExitReason, OptionType, Position, RiskState};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::TradeRejection;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// What to do with an open position after marking it to the latest price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCheck {
    Exit(ExitReason),
    /// Ratchet the stop toward the price; never loosens.
    UpdateStop(Decimal),
    Hold,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    cfg: RiskConfig,
}

impl RiskManager {
    #[must_use]
    pub fn new(cfg: RiskConfig) -> Self {
        Self { cfg }
    }

    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.cfg
    }

    /// Sizes an entry: the quantity whose stop-distance loss equals the
    /// per-trade risk budget, rounded down to whole lots with a one-lot
    /// floor, then shrunk so the notional stays within the per-trade
    /// capital fraction.
    ///
    /// # Errors
    ///
    /// `BelowOneLot` when the premium is invalid or the capital fraction
    /// cannot carry a single lot.
    pub fn size_position(&self, premium: Decimal) -> Result<i64, TradeRejection> {
        if premium <= Decimal::ZERO {
            return Err(TradeRejection::BelowOneLot { premium });
        }
        let per_unit_risk = premium * self.cfg.stop_loss_pct / HUNDRED;
        if per_unit_risk <= Decimal::ZERO {
            return Err(TradeRejection::BelowOneLot { premium });
        }

        let by_risk = (self.cfg.max_risk_amount() / per_unit_risk)
            .floor()
            .to_i64()
            .unwrap_or(0);
        let lots = (by_risk / self.cfg.lot_size).max(1);
        let mut quantity = lots * self.cfg.lot_size;

        let max_notional = self.cfg.capital * self.cfg.trade_capital_fraction;
        if premium * Decimal::from(quantity) > max_notional {
            let by_capital = (max_notional / premium).floor().to_i64().unwrap_or(0);
            quantity = by_capital / self.cfg.lot_size * self.cfg.lot_size;
        }
        if quantity < self.cfg.lot_size {
            return Err(TradeRejection::BelowOneLot { premium });
        }
        debug!(%premium, quantity, "sized position");
        Ok(quantity)
    }

    /// Initial protective levels around the entry premium. A call is the
    /// long side (stop below, target above); a put mirrors both.
    #[must_use]
    pub fn initial_stops(&self, entry_price: Decimal, option_type: OptionType) -> (Decimal, Decimal) {
        let stop_off = self.cfg.stop_loss_pct / HUNDRED;
        let target_off = self.cfg.target_pct / HUNDRED;
        match option_type {
            OptionType::Ce => (
                entry_price * (Decimal::ONE - stop_off),
                entry_price * (Decimal::ONE + target_off),
            ),
            OptionType::Pe => (
                entry_price * (Decimal::ONE + stop_off),
                entry_price * (Decimal::ONE - target_off),
            ),
        }
    }

    /// Candidate trailing stop for an open position. Engages only once the
    /// unrealized profit fraction exceeds the trailing percentage, and only
    /// tightens: `None` unless the candidate beats the existing stop in the
    /// protective direction.
    #[must_use]
    pub fn trailing_stop(&self, position: &Position, current_price: Decimal) -> Option<Decimal> {
        if position.entry_price <= Decimal::ZERO {
            return None;
        }
        let trail = self.cfg.trailing_stop_pct / HUNDRED;
        match position.option_type {
            OptionType::Ce => {
                let profit = (current_price - position.entry_price) / position.entry_price;
                if profit <= trail {
                    return None;
                }
                let candidate = current_price * (Decimal::ONE - trail);
                (candidate > position.stop_loss).then_some(candidate)
            }
            OptionType::Pe => {
                let profit = (position.entry_price - current_price) / position.entry_price;
                if profit <= trail {
                    return None;
                }
                let candidate = current_price * (Decimal::ONE + trail);
                (candidate < position.stop_loss).then_some(candidate)
            }
        }
    }

    /// Evaluates one open position against the latest premium. Exit checks
    /// run before the trailing ratchet so a breach this bar is honored.
    #[must_use]
    pub fn check_exit(&self, position: &Position, current_price: Decimal) -> ExitCheck {
        let (stop_hit, target_hit) = match position.option_type {
            OptionType::Ce => (
                current_price <= position.stop_loss,
                current_price >= position.target,
            ),
            OptionType::Pe => (
                current_price >= position.stop_loss,
                current_price <= position.target,
            ),
        };

        if stop_hit {
            let reason = if position.trailing_active {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            };
            return ExitCheck::Exit(reason);
        }
        if target_hit {
            return ExitCheck::Exit(ExitReason::Target);
        }
        match self.trailing_stop(position, current_price) {
            Some(new_stop) => ExitCheck::UpdateStop(new_stop),
            None => ExitCheck::Hold,
        }
    }

    /// Pre-trade gates against current portfolio state, cheapest first.
    ///
    /// # Errors
    ///
    /// The first failing gate as a [`TradeRejection`].
    pub fn check_entry(
        &self,
        state: &RiskState,
        trade_notional: Decimal,
    ) -> Result<(), TradeRejection> {
        let loss_limit = self.cfg.max_daily_loss();
        if state.today_realized_pnl <= -loss_limit {
            warn!(realized = %state.today_realized_pnl, limit = %loss_limit, "daily loss breaker");
            return Err(TradeRejection::DailyLossBreaker {
                realized: state.today_realized_pnl,
                limit: loss_limit,
            });
        }

        if state.open_positions >= self.cfg.max_positions {
            return Err(TradeRejection::MaxPositions {
                open: state.open_positions,
                max: self.cfg.max_positions,
            });
        }

        let ceiling = self.cfg.capital * self.cfg.exposure_ceiling;
        let projected = state.total_exposure + trade_notional;
        if projected > ceiling {
            return Err(TradeRejection::ExposureCeiling { projected, ceiling });
        }

        Ok(())
    }

    /// True when the secure-profit switch is on and the day's total P&L
    /// has reached the lock-in amount.
    #[must_use]
    pub fn should_secure_profit(&self, realized: Decimal, unrealized: Decimal) -> bool {
        self.cfg.secure_profit_enabled
            && self.cfg.secure_profit_amount > Decimal::ZERO
            && realized + unrealized >= self.cfg.secure_profit_amount
    }
}

/// P&L of a position at a price. Calls profit as the premium rises, puts
/// as it falls.
#[must_use]
pub fn unrealized_pnl(position: &Position, current_price: Decimal) -> Decimal {
    let qty = Decimal::from(position.quantity);
    match position.option_type {
        OptionType::Ce => (current_price - position.entry_price) * qty,
        OptionType::Pe => (position.entry_price - current_price) * qty,
    }
}

/// Percent return on the entry premium, signed by the option side.
#[must_use]
pub fn pnl_pct(entry_price: Decimal, exit_price: Decimal, option_type: OptionType) -> Decimal {
    if entry_price == Decimal::ZERO {
        return Decimal::ZERO;
    }
    let raw = match option_type {
        OptionType::Ce => exit_price - entry_price,
        OptionType::Pe => entry_price - exit_price,
    };
    raw / entry_price * HUNDRED
}
