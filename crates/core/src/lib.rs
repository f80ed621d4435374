pub mod config;
pub mod config_loader;
pub mod traits;
pub mod types;

pub use config::{
    AppConfig, DatabaseConfig, EngineConfig, IndicatorConfig, OrderFlowConfig, RiskConfig,
    ServerConfig, SessionConfig, SignalConfig, TradingMode, UpstoxConfig,
};
pub use config_loader::ConfigLoader;
pub use traits::{Broker, PositionStore};
pub use types::{
    BandPosition, Breakout, BrokerPosition, Candle, ExitReason, FlowSnapshot, MarketQuote,
    NewPosition, NewTrade, OptionType, OrderSide, OrderType, Position, PositionStatus, RiskState,
    Signal, SignalDirection, TechnicalSnapshot, VolumeTrend,
};
