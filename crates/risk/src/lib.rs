//! Risk controls for the decision engine: sizing, protective exits, and the
//! portfolio gates every entry must clear.

pub mod error;
pub mod manager;
pub mod metrics;

pub use error::TradeRejection;
pub use manager::{pnl_pct, unrealized_pnl, ExitCheck, RiskManager};
pub use metrics::RiskMetrics;
