use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar. Sequences are ordered oldest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Immutable top-of-book snapshot for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    pub symbol: String,
    pub last_price: Decimal,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_qty: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Buy,
    Sell,
    Neutral,
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Option right: CE = call, PE = put (exchange nomenclature).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Ce,
    Pe,
}

impl OptionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ce => "CE",
            Self::Pe => "PE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CE" => Some(Self::Ce),
            "PE" => Some(Self::Pe),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Why a position was closed. Display strings are the persisted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    Target,
    TrailingStop,
    Manual,
    SquareOff,
    ProfitProtection,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::Target => write!(f, "TARGET"),
            Self::TrailingStop => write!(f, "TRAILING_STOP"),
            Self::Manual => write!(f, "MANUAL"),
            Self::SquareOff => write!(f, "SQUARE_OFF"),
            Self::ProfitProtection => write!(f, "PROFIT_PROTECTION"),
        }
    }
}

/// Position of the last close relative to the Bollinger bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandPosition {
    AboveUpper,
    BelowLower,
    AboveMiddle,
    BelowMiddle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Breakout {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    Neutral,
}

/// Indicator values captured on the signal for audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_position: Option<BandPosition>,
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
}

/// Order-flow values captured on the signal for audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub volume_delta: f64,
    pub cvd: f64,
    pub imbalance: f64,
    pub large_order_detected: bool,
}

/// A fused, tradeable signal. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub direction: SignalDirection,
    /// Composite strength, 0-100.
    pub strength: f64,
    /// Names of the indicators that voted with the winning side.
    pub contributors: Vec<String>,
    pub underlying_price: Decimal,
    pub strike: Decimal,
    pub option_type: OptionType,
    pub technical: TechnicalSnapshot,
    pub order_flow: FlowSnapshot,
    pub buy_score: f64,
    pub sell_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// An open or closed options position as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    /// Trade row recorded at entry, updated on exit.
    pub trade_id: i64,
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    /// Quantity in units (lots x lot size).
    pub quantity: i64,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub stop_loss: Decimal,
    pub target: Decimal,
    /// True once the trailing ratchet has tightened the stop at least once.
    pub trailing_active: bool,
    pub status: PositionStatus,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub pnl: Option<Decimal>,
}

impl Position {
    /// Entry-time notional exposure.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.entry_price * Decimal::from(self.quantity)
    }
}

/// Insert payload for a new position; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub trade_id: i64,
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub quantity: i64,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub target: Decimal,
    pub entry_time: DateTime<Utc>,
}

/// Insert payload for the trade audit row recorded at entry.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub action: OrderSide,
    pub quantity: i64,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub target: Decimal,
    pub signal_strength: f64,
    /// Contributing indicator names, for per-strategy attribution on exit.
    pub contributors: Vec<String>,
}

/// Risk gating inputs, recomputed from the store every iteration.
/// Never cached across iterations so a restart cannot observe stale risk.
#[derive(Debug, Clone, Copy)]
pub struct RiskState {
    pub today_realized_pnl: Decimal,
    pub open_positions: usize,
    pub total_exposure: Decimal,
}

/// A position as reported by the broker, used for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn exit_reason_display_matches_persisted_values() {
        assert_eq!(ExitReason::StopLoss.to_string(), "STOP_LOSS");
        assert_eq!(ExitReason::TrailingStop.to_string(), "TRAILING_STOP");
        assert_eq!(ExitReason::SquareOff.to_string(), "SQUARE_OFF");
    }

    #[test]
    fn option_type_round_trips_through_str() {
        assert_eq!(OptionType::parse("CE"), Some(OptionType::Ce));
        assert_eq!(OptionType::parse("PE"), Some(OptionType::Pe));
        assert_eq!(OptionType::parse("XX"), None);
        assert_eq!(OptionType::Ce.as_str(), "CE");
    }

    #[test]
    fn position_notional_is_entry_times_quantity() {
        let pos = Position {
            id: 1,
            trade_id: 1,
            symbol: "NSE_FO|NIFTY25AUG2824500CE".to_string(),
            option_type: OptionType::Ce,
            strike: dec!(24500),
            quantity: 50,
            entry_price: dec!(120.50),
            current_price: dec!(120.50),
            stop_loss: dec!(118.69),
            target: dec!(124.12),
            trailing_active: false,
            status: PositionStatus::Open,
            entry_time: Utc::now(),
            exit_time: None,
            exit_reason: None,
            pnl: None,
        };
        assert_eq!(pos.notional(), dec!(6025.00));
    }
}
