use optrade_core::config::RiskConfig;
use optrade_core::types::RiskState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time risk summary served by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub capital: Decimal,
    pub max_risk_per_trade: Decimal,
    pub max_daily_loss: Decimal,
    pub today_realized_pnl: Decimal,
    pub open_positions: usize,
    pub max_positions: usize,
    pub total_exposure: Decimal,
    pub exposure_ceiling: Decimal,
    /// True once the daily loss breaker has fired.
    pub trading_halted: bool,
}

impl RiskMetrics {
    #[must_use]
    pub fn compute(cfg: &RiskConfig, state: &RiskState) -> Self {
        let max_daily_loss = cfg.max_daily_loss();
        Self {
            capital: cfg.capital,
            max_risk_per_trade: cfg.max_risk_amount(),
            max_daily_loss,
            today_realized_pnl: state.today_realized_pnl,
            open_positions: state.open_positions,
            max_positions: cfg.max_positions,
            total_exposure: state.total_exposure,
            exposure_ceiling: cfg.capital * cfg.exposure_ceiling,
            trading_halted: state.today_realized_pnl <= -max_daily_loss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn metrics_reflect_config_and_state() {
        let cfg = RiskConfig::default();
        let state = RiskState {
            today_realized_pnl: dec!(-1200),
            open_positions: 2,
            total_exposure: dec!(24000),
        };
        let m = RiskMetrics::compute(&cfg, &state);
        assert_eq!(m.max_risk_per_trade, dec!(1400));
        assert_eq!(m.exposure_ceiling, dec!(56000.0));
        assert!(!m.trading_halted);

        let halted = RiskState {
            today_realized_pnl: dec!(-3600),
            ..state
        };
        assert!(RiskMetrics::compute(&cfg, &halted).trading_halted);
    }
}
