use crate::types::{
    BrokerPosition, Candle, ExitReason, MarketQuote, NewPosition, NewTrade, OrderSide, OrderType,
    Position,
};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Broker transport capability. One interface, two variants: the live HTTP
/// client and the paper-trading simulator.
///
/// `Ok(None)` / empty responses mean "unavailable right now" — callers skip
/// the iteration rather than treating it as a fault.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<Option<MarketQuote>>;

    /// Recent candles, oldest first. Empty when the feed has nothing.
    async fn get_candles(&self, symbol: &str, interval: &str, count: usize)
        -> Result<Vec<Candle>>;

    /// Places an order; `Ok(None)` means the broker rejected the placement.
    /// No position may be recorded for a `None` order id.
    async fn place_order(
        &self,
        symbol: &str,
        quantity: i64,
        side: OrderSide,
        order_type: OrderType,
    ) -> Result<Option<String>>;

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>>;

    /// Broker-side flatten of anything still open, used as the final step of
    /// the end-of-day square-off.
    async fn square_off_all(&self) -> Result<()>;
}

/// Persistent store capability. The engine recomputes risk state from here
/// every iteration; it never trusts a local cache across iterations.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn get_open_positions(&self) -> Result<Vec<Position>>;

    /// Inserts a position, returning its id.
    async fn add_position(&self, position: NewPosition) -> Result<i64>;

    /// Refreshes the mark price and unrealized P&L of an open position.
    async fn update_position_mark(
        &self,
        id: i64,
        current_price: Decimal,
        unrealized_pnl: Decimal,
    ) -> Result<()>;

    /// Applies a trailing-stop ratchet. Implementations persist the new stop
    /// and flag the position as trailing.
    async fn update_stop_loss(&self, id: i64, new_stop: Decimal) -> Result<()>;

    async fn close_position(
        &self,
        id: i64,
        exit_price: Decimal,
        pnl: Decimal,
        reason: ExitReason,
    ) -> Result<()>;

    /// Sum of realized P&L over today's closed trades.
    async fn get_today_realized_pnl(&self) -> Result<Decimal>;

    /// Inserts the entry audit row, returning the trade id.
    async fn add_trade(&self, trade: NewTrade) -> Result<i64>;

    async fn close_trade(
        &self,
        id: i64,
        exit_price: Decimal,
        pnl: Decimal,
        pnl_pct: Decimal,
        reason: ExitReason,
    ) -> Result<()>;

    /// Contributor names recorded on a trade at entry.
    async fn get_trade_contributors(&self, trade_id: i64) -> Result<Vec<String>>;

    /// Folds one trade's P&L into a strategy's aggregate performance row.
    async fn update_strategy_performance(&self, name: &str, pnl: Decimal) -> Result<()>;
}
