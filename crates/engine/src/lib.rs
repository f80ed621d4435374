//! The trading engine: IST session gating, the minute-by-minute decision
//! loop, order execution, and end-of-day square-off.

pub mod commands;
pub mod engine;
pub mod expiry;
pub mod session;

pub use commands::{EngineCommand, EngineHandle, EngineState, EngineStatus};
pub use engine::TradingEngine;
pub use session::{MarketSession, SessionPhase};
