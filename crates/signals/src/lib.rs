//! Market analysis for the decision engine: technical indicators over candle
//! history, order-flow state over quote updates, and the fusion layer that
//! turns both into tradeable signals.

pub mod error;
pub mod fusion;
pub mod indicators;
pub mod order_flow;
pub mod window;

pub use error::{IndicatorError, SignalError};
pub use fusion::{Score, SignalFusionEngine, Vote};
pub use indicators::{
    Bollinger, IndicatorEngine, Macd, SupportResistance, TechnicalAnalysis, TechnicalVotes,
};
pub use order_flow::{
    FlowAnalysis, FlowVotes, ImbalanceReport, LargeOrderReport, OrderFlowAnalyzer,
};
pub use window::RollingWindow;
