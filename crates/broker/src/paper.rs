//! Paper-trading broker: real market data, simulated executions.
//!
//! Wraps a live transport for quotes and candles but keeps fills entirely
//! local, so paper mode makes zero order API calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use optrade_core::traits::Broker;
use optrade_core::types::{BrokerPosition, Candle, MarketQuote, OrderSide, OrderType};
use parking_lot::Mutex;
use tracing::info;

pub struct PaperBroker {
    data_source: Arc<dyn Broker>,
    /// Net simulated quantity per symbol.
    positions: Mutex<HashMap<String, i64>>,
    next_order_id: AtomicU64,
}

impl PaperBroker {
    #[must_use]
    pub fn new(data_source: Arc<dyn Broker>) -> Self {
        Self {
            data_source,
            positions: Mutex::new(HashMap::new()),
            next_order_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn get_quote(&self, symbol: &str) -> anyhow::Result<Option<MarketQuote>> {
        self.data_source.get_quote(symbol).await
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        self.data_source.get_candles(symbol, interval, count).await
    }

    async fn place_order(
        &self,
        symbol: &str,
        quantity: i64,
        side: OrderSide,
        _order_type: OrderType,
    ) -> anyhow::Result<Option<String>> {
        let signed = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };
        {
            let mut positions = self.positions.lock();
            let net = positions.entry(symbol.to_string()).or_insert(0);
            *net += signed;
            if *net == 0 {
                positions.remove(symbol);
            }
        }
        let order_id = format!(
            "PAPER-{}",
            self.next_order_id.fetch_add(1, Ordering::Relaxed)
        );
        info!(symbol, quantity, side = %side, order_id, "paper fill");
        Ok(Some(order_id))
    }

    async fn get_positions(&self) -> anyhow::Result<Vec<BrokerPosition>> {
        Ok(self
            .positions
            .lock()
            .iter()
            .map(|(symbol, &quantity)| BrokerPosition {
                symbol: symbol.clone(),
                quantity,
            })
            .collect())
    }

    async fn square_off_all(&self) -> anyhow::Result<()> {
        let flattened: Vec<String> = self.positions.lock().drain().map(|(s, _)| s).collect();
        if !flattened.is_empty() {
            info!(count = flattened.len(), "paper square-off");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    /// Data-only stub; panics if an order API is ever hit.
    struct StubData;

    #[async_trait]
    impl Broker for StubData {
        async fn get_quote(&self, symbol: &str) -> anyhow::Result<Option<MarketQuote>> {
            Ok(Some(MarketQuote {
                symbol: symbol.to_string(),
                last_price: dec!(120),
                bid_price: dec!(119.95),
                ask_price: dec!(120.05),
                bid_qty: dec!(100),
                ask_qty: dec!(100),
                timestamp: Utc::now(),
            }))
        }

        async fn get_candles(
            &self,
            _symbol: &str,
            _interval: &str,
            _count: usize,
        ) -> anyhow::Result<Vec<Candle>> {
            Ok(Vec::new())
        }

        async fn place_order(
            &self,
            _symbol: &str,
            _quantity: i64,
            _side: OrderSide,
            _order_type: OrderType,
        ) -> anyhow::Result<Option<String>> {
            panic!("paper mode must not forward orders");
        }

        async fn get_positions(&self) -> anyhow::Result<Vec<BrokerPosition>> {
            panic!("paper mode must not forward position queries");
        }

        async fn square_off_all(&self) -> anyhow::Result<()> {
            panic!("paper mode must not forward square-off");
        }
    }

    #[tokio::test]
    async fn fills_are_simulated_and_netted() {
        let paper = PaperBroker::new(Arc::new(StubData));
        let id = paper
            .place_order("NIFTY-CE", 50, OrderSide::Buy, OrderType::Market)
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("PAPER-1"));

        let positions = paper.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, 50);

        // Selling the same quantity flattens and removes the entry.
        paper
            .place_order("NIFTY-CE", 50, OrderSide::Sell, OrderType::Market)
            .await
            .unwrap();
        assert!(paper.get_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn market_data_passes_through() {
        let paper = PaperBroker::new(Arc::new(StubData));
        let quote = paper.get_quote("NSE_INDEX|Nifty 50").await.unwrap().unwrap();
        assert_eq!(quote.last_price, dec!(120));
    }

    #[tokio::test]
    async fn square_off_clears_simulated_book() {
        let paper = PaperBroker::new(Arc::new(StubData));
        paper
            .place_order("NIFTY-PE", 100, OrderSide::Buy, OrderType::Market)
            .await
            .unwrap();
        paper.square_off_all().await.unwrap();
        assert!(paper.get_positions().await.unwrap().is_empty());
    }
}
