use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub order_flow: OrderFlowConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub upstox: UpstoxConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Paper trading simulates fills locally; live places real orders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_candle_count")]
    pub candle_count: usize,
    /// Seconds between decision iterations.
    #[serde(default = "default_decision_interval")]
    pub decision_interval_secs: u64,
    /// Back-off after a failed iteration before looping again.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    #[serde(default)]
    pub trading_mode: TradingMode,
}

fn default_symbol() -> String {
    "NSE_INDEX|Nifty 50".to_string()
}

fn default_interval() -> String {
    "1minute".to_string()
}

const fn default_candle_count() -> usize {
    100
}

const fn default_decision_interval() -> u64 {
    60
}

const fn default_error_backoff() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval: default_interval(),
            candle_count: default_candle_count(),
            decision_interval_secs: default_decision_interval(),
            error_backoff_secs: default_error_backoff(),
            trading_mode: TradingMode::default(),
        }
    }
}

/// Market hours in exchange-local time (IST). 09:15-15:30, square-off 15:15.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionConfig {
    pub open_hour: u32,
    pub open_minute: u32,
    pub close_hour: u32,
    pub close_minute: u32,
    pub square_off_hour: u32,
    pub square_off_minute: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_hour: 9,
            open_minute: 15,
            close_hour: 15,
            close_minute: 30,
            square_off_hour: 15,
            square_off_minute: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub ema_short: usize,
    pub ema_long: usize,
    pub sr_lookback: usize,
    pub breakout_lookback: usize,
    /// Fractional buffer beyond the range edge before a breakout counts.
    pub breakout_buffer: f64,
    pub volume_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: 2.0,
            ema_short: 9,
            ema_long: 21,
            sr_lookback: 20,
            breakout_lookback: 20,
            breakout_buffer: 0.005,
            volume_period: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderFlowConfig {
    /// Bars of volume-delta history backing the CVD window.
    pub cvd_lookback: usize,
    /// Bars of raw volume history for large-order detection.
    pub volume_lookback: usize,
    /// Depth fraction one side must exceed to signal (0.6 = 60%).
    pub imbalance_threshold: f64,
    /// Current volume vs trailing average multiple that flags a large order.
    pub large_order_multiplier: f64,
    pub divergence_window: usize,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self {
            cvd_lookback: 20,
            volume_lookback: 20,
            imbalance_threshold: 0.6,
            large_order_multiplier: 3.0,
            divergence_window: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Minimum composite strength (0-100) before a signal is tradeable.
    pub min_strength: f64,
    /// Strike ladder spacing for the underlying index.
    pub strike_increment: Decimal,
    /// 0 = ATM; positive steps OTM, negative ITM.
    pub moneyness_offset: i32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_strength: 60.0,
            strike_increment: Decimal::from(50),
            moneyness_offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub capital: Decimal,
    /// Percent of capital risked per trade.
    pub risk_per_trade_pct: Decimal,
    /// Percent of capital at which the daily-loss breaker fires.
    pub max_daily_loss_pct: Decimal,
    pub max_positions: usize,
    pub stop_loss_pct: Decimal,
    pub target_pct: Decimal,
    pub trailing_stop_pct: Decimal,
    /// Minimum tradable contract multiple.
    pub lot_size: i64,
    /// Fraction of capital total open exposure may not exceed.
    pub exposure_ceiling: Decimal,
    /// Fraction of capital a single trade's notional may not exceed.
    pub trade_capital_fraction: Decimal,
    pub secure_profit_enabled: bool,
    pub secure_profit_amount: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            capital: Decimal::from(70_000),
            risk_per_trade_pct: Decimal::from(2),
            max_daily_loss_pct: Decimal::from(5),
            max_positions: 3,
            stop_loss_pct: Decimal::new(15, 1),
            target_pct: Decimal::from(3),
            trailing_stop_pct: Decimal::from(1),
            lot_size: 50,
            exposure_ceiling: Decimal::new(8, 1),
            trade_capital_fraction: Decimal::new(5, 1),
            secure_profit_enabled: false,
            secure_profit_amount: Decimal::ZERO,
        }
    }
}

impl RiskConfig {
    /// Rupee amount risked per trade.
    #[must_use]
    pub fn max_risk_amount(&self) -> Decimal {
        self.capital * self.risk_per_trade_pct / Decimal::from(100)
    }

    /// Rupee amount of realized loss that halts entries for the day.
    #[must_use]
    pub fn max_daily_loss(&self) -> Decimal {
        self.capital * self.max_daily_loss_pct / Decimal::from(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstoxConfig {
    pub api_url: String,
    /// Bearer token; load via OPTRADE_UPSTOX__ACCESS_TOKEN, not the file.
    #[serde(default)]
    pub access_token: String,
    /// I = intraday, D = delivery.
    pub product: String,
}

impl Default for UpstoxConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.upstox.com/v2".to_string(),
            access_token: String::new(),
            product: "I".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://trading_bot.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_risk_amounts() {
        let risk = RiskConfig::default();
        assert_eq!(risk.max_risk_amount(), dec!(1400));
        assert_eq!(risk.max_daily_loss(), dec!(3500));
    }

    #[test]
    fn defaults_match_the_session_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.decision_interval_secs, 60);
        assert_eq!(cfg.indicators.bb_period, 20);
        assert_eq!(cfg.risk.max_positions, 3);
        assert_eq!(cfg.signal.min_strength, 60.0);
        assert_eq!(cfg.session.square_off_hour, 15);
        assert_eq!(cfg.session.square_off_minute, 15);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let cfg = AppConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.risk.capital, dec!(70000));
        assert_eq!(back.engine.symbol, "NSE_INDEX|Nifty 50");
    }
}
