//! Broker transports: the Upstox v2 REST client for live trading and a
//! paper simulator that reuses the live client for market data only.

pub mod error;
pub mod paper;
pub mod upstox;

pub use error::UpstoxError;
pub use paper::PaperBroker;
pub use upstox::UpstoxClient;
