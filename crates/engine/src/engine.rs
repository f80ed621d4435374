//! The decision loop: one iteration per minute while the session is active,
//! square-off at the cutoff, command handling in between.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use optrade_core::config::AppConfig;
use optrade_core::traits::{Broker, PositionStore};
use optrade_core::types::{
    ExitReason, NewPosition, NewTrade, OptionType, OrderSide, OrderType, Position, RiskState,
    Signal,
};
use optrade_risk::{pnl_pct, unrealized_pnl, ExitCheck, RiskManager};
use optrade_signals::{
    IndicatorEngine, IndicatorError, OrderFlowAnalyzer, SignalError, SignalFusionEngine,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::commands::{EngineCommand, EngineHandle, EngineState, EngineStatus};
use crate::expiry::{current_weekly_expiry, option_symbol};
use crate::session::{MarketSession, SessionPhase};

const COMMAND_CHANNEL_CAPACITY: usize = 16;

enum Flow {
    Continue,
    Shutdown,
}

pub struct TradingEngine {
    cfg: AppConfig,
    broker: Arc<dyn Broker>,
    store: Arc<dyn PositionStore>,
    indicators: IndicatorEngine,
    order_flow: OrderFlowAnalyzer,
    fusion: SignalFusionEngine,
    risk: RiskManager,
    session: MarketSession,
    state: EngineState,
    last_iteration: Option<DateTime<Utc>>,
    last_error: Option<String>,
    rx: mpsc::Receiver<EngineCommand>,
}

impl TradingEngine {
    #[must_use]
    pub fn new(
        cfg: AppConfig,
        broker: Arc<dyn Broker>,
        store: Arc<dyn PositionStore>,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let engine = Self {
            indicators: IndicatorEngine::new(cfg.indicators),
            order_flow: OrderFlowAnalyzer::new(cfg.order_flow),
            fusion: SignalFusionEngine::new(cfg.signal.clone()),
            risk: RiskManager::new(cfg.risk.clone()),
            session: MarketSession::new(cfg.session),
            state: EngineState::OutsideMarketHours,
            last_iteration: None,
            last_error: None,
            cfg,
            broker,
            store,
            rx,
        };
        (engine, EngineHandle::new(tx))
    }

    /// Runs until shutdown. Iteration failures back off and continue; only
    /// a closed command channel or an explicit shutdown ends the loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(symbol = %self.cfg.engine.symbol, mode = ?self.cfg.engine.trading_mode, "engine starting");
        loop {
            let delay = if self.last_error.is_some() {
                Duration::from_secs(self.cfg.engine.error_backoff_secs)
            } else {
                Duration::from_secs(self.cfg.engine.decision_interval_secs)
            };

            tokio::select! {
                cmd = self.rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if matches!(self.handle_command(cmd).await, Flow::Shutdown) {
                        break;
                    }
                }
                () = tokio::time::sleep(delay) => {
                    self.tick(Utc::now()).await;
                }
            }
        }
        info!("engine stopped");
        Ok(())
    }

    async fn tick(&mut self, now: DateTime<Utc>) {
        match (self.state, self.session.phase(now)) {
            (EngineState::Stopped, SessionPhase::Closed) => {
                // Day is over; arm for the next session.
                self.state = EngineState::OutsideMarketHours;
            }
            (EngineState::Stopped, _) => {}
            // The session cutoff outranks a pause: a paused engine still
            // flattens instead of carrying positions past the close.
            (_, SessionPhase::SquareOff) => {
                info!("square-off window reached");
                self.state = EngineState::SquaringOff;
                if let Err(e) = self.square_off_all().await {
                    error!(error = %e, "square-off failed");
                }
                self.state = EngineState::Stopped;
            }
            (EngineState::Paused, _) => {}
            (_, SessionPhase::Closed) => {
                if self.state != EngineState::OutsideMarketHours {
                    info!("market closed");
                    self.state = EngineState::OutsideMarketHours;
                }
                if let Some(minutes) = self.session.minutes_to_open(now) {
                    debug!(minutes, "waiting for open");
                }
            }
            (_, SessionPhase::Active) => {
                self.state = EngineState::Active;
                match self.iterate(now).await {
                    Ok(()) => {
                        self.last_error = None;
                        self.last_iteration = Some(now);
                    }
                    Err(e) => {
                        error!(error = %e, "iteration failed");
                        self.last_error = Some(e.to_string());
                    }
                }
            }
        }
    }

    /// One decision pass: refresh data, analyze, maybe enter, then manage
    /// whatever is open.
    async fn iterate(&mut self, now: DateTime<Utc>) -> Result<()> {
        let symbol = self.cfg.engine.symbol.clone();
        let candles = self
            .broker
            .get_candles(&symbol, &self.cfg.engine.interval, self.cfg.engine.candle_count)
            .await?;
        let Some(quote) = self.broker.get_quote(&symbol).await? else {
            warn!(symbol, "no quote; skipping iteration");
            return Ok(());
        };
        if candles.is_empty() {
            warn!(symbol, "no candles; skipping iteration");
            return Ok(());
        }

        let last_candle = &candles[candles.len() - 1];
        let flow = self.order_flow.analyze(last_candle, &quote);

        match self.indicators.analyze(&candles) {
            Ok(technical) => match self.fusion.generate(&technical, &flow, &quote) {
                Ok(signal) => self.execute_signal(&signal, now).await?,
                Err(SignalError::NoDirection | SignalError::BelowThreshold { .. }) => {}
                Err(SignalError::InsufficientData(e)) => {
                    debug!(error = %e, "not enough history yet");
                }
            },
            Err(IndicatorError::InsufficientData {
                required,
                available,
            }) => {
                debug!(required, available, "warming up");
            }
        }

        let unrealized = self.monitor_positions().await?;

        let realized = self.store.get_today_realized_pnl().await?;
        if self.risk.should_secure_profit(realized, unrealized) {
            info!(%realized, %unrealized, "profit protection triggered");
            self.square_off_all().await?;
            self.state = EngineState::Stopped;
        }
        Ok(())
    }

    /// Turns a fused signal into a position if every risk gate passes.
    async fn execute_signal(&self, signal: &Signal, now: DateTime<Utc>) -> Result<()> {
        let open = self.store.get_open_positions().await?;
        if !self.fusion.validate(signal, &open) {
            return Ok(());
        }

        let expiry = current_weekly_expiry(self.session.trading_date(now));
        let symbol = option_symbol(expiry, signal.strike, signal.option_type);

        let Some(option_quote) = self.broker.get_quote(&symbol).await? else {
            warn!(symbol, "no option quote; signal dropped");
            return Ok(());
        };
        let premium = option_quote.last_price;

        let quantity = match self.risk.size_position(premium) {
            Ok(q) => q,
            Err(rejection) => {
                info!(%premium, %rejection, "signal not sized");
                return Ok(());
            }
        };

        let risk_state = RiskState {
            today_realized_pnl: self.store.get_today_realized_pnl().await?,
            open_positions: open.len(),
            total_exposure: open.iter().map(Position::notional).sum(),
        };
        if let Err(rejection) = self
            .risk
            .check_entry(&risk_state, premium * Decimal::from(quantity))
        {
            warn!(%rejection, "entry gated");
            return Ok(());
        }

        // Calls are entered long; puts take the sell side, as the fused
        // signal direction dictates.
        let entry_side = match signal.option_type {
            OptionType::Ce => OrderSide::Buy,
            OptionType::Pe => OrderSide::Sell,
        };
        let Some(order_id) = self
            .broker
            .place_order(&symbol, quantity, entry_side, OrderType::Market)
            .await?
        else {
            error!(symbol, "entry order rejected");
            return Ok(());
        };

        let (stop_loss, target) = self.risk.initial_stops(premium, signal.option_type);
        let trade_id = self
            .store
            .add_trade(NewTrade {
                symbol: symbol.clone(),
                option_type: signal.option_type,
                strike: signal.strike,
                action: entry_side,
                quantity,
                entry_price: premium,
                stop_loss,
                target,
                signal_strength: signal.strength,
                contributors: signal.contributors.clone(),
            })
            .await?;
        self.store
            .add_position(NewPosition {
                trade_id,
                symbol: symbol.clone(),
                option_type: signal.option_type,
                strike: signal.strike,
                quantity,
                entry_price: premium,
                stop_loss,
                target,
                entry_time: now,
            })
            .await?;

        info!(
            symbol,
            order_id,
            quantity,
            %premium,
            %stop_loss,
            %target,
            strength = signal.strength,
            "position opened"
        );
        Ok(())
    }

    /// Marks every open position, applies exits and trailing ratchets, and
    /// returns the total unrealized P&L of what stayed open.
    async fn monitor_positions(&self) -> Result<Decimal> {
        let mut total_unrealized = Decimal::ZERO;
        for position in self.store.get_open_positions().await? {
            let Some(quote) = self.broker.get_quote(&position.symbol).await? else {
                warn!(symbol = %position.symbol, "no quote for open position");
                continue;
            };
            let price = quote.last_price;
            let upnl = unrealized_pnl(&position, price);
            self.store
                .update_position_mark(position.id, price, upnl)
                .await?;

            match self.risk.check_exit(&position, price) {
                ExitCheck::Exit(reason) => {
                    self.close_position(&position, price, reason).await?;
                }
                ExitCheck::UpdateStop(new_stop) => {
                    debug!(symbol = %position.symbol, %new_stop, "trailing stop raised");
                    self.store.update_stop_loss(position.id, new_stop).await?;
                    total_unrealized += upnl;
                }
                ExitCheck::Hold => {
                    total_unrealized += upnl;
                }
            }
        }
        Ok(total_unrealized)
    }

    /// Sells out of one position and settles its records. A rejected exit
    /// order leaves the position open for the next pass.
    async fn close_position(
        &self,
        position: &Position,
        exit_price: Decimal,
        reason: ExitReason,
    ) -> Result<()> {
        let exit_side = match position.option_type {
            OptionType::Ce => OrderSide::Sell,
            OptionType::Pe => OrderSide::Buy,
        };
        let placed = self
            .broker
            .place_order(
                &position.symbol,
                position.quantity,
                exit_side,
                OrderType::Market,
            )
            .await?;
        if placed.is_none() {
            error!(symbol = %position.symbol, "exit order rejected; will retry");
            return Ok(());
        }

        let pnl = unrealized_pnl(position, exit_price);
        let pct = pnl_pct(position.entry_price, exit_price, position.option_type);
        self.store
            .close_position(position.id, exit_price, pnl, reason)
            .await?;
        self.store
            .close_trade(position.trade_id, exit_price, pnl, pct, reason)
            .await?;

        for contributor in self.store.get_trade_contributors(position.trade_id).await? {
            self.store
                .update_strategy_performance(&contributor, pnl)
                .await?;
        }

        info!(
            symbol = %position.symbol,
            %exit_price,
            %pnl,
            reason = %reason,
            "position closed"
        );
        Ok(())
    }

    /// Closes everything open, then asks the broker for a final flatten.
    /// Falls back to the last stored mark when a quote is unavailable, so
    /// end-of-day never leaves a position dangling.
    async fn square_off_all(&self) -> Result<()> {
        for position in self.store.get_open_positions().await? {
            let price = match self.broker.get_quote(&position.symbol).await? {
                Some(quote) => quote.last_price,
                None => {
                    warn!(
                        symbol = %position.symbol,
                        stale_price = %position.current_price,
                        "no quote at square-off; using last mark"
                    );
                    position.current_price
                }
            };
            self.close_position(&position, price, ExitReason::SquareOff)
                .await?;
        }
        self.broker.square_off_all().await?;
        Ok(())
    }

    async fn handle_command(&mut self, cmd: EngineCommand) -> Flow {
        match cmd {
            EngineCommand::Pause => {
                info!("paused by command");
                self.state = EngineState::Paused;
            }
            EngineCommand::Resume => {
                info!("resumed by command");
                self.state = if self.session.is_open(Utc::now()) {
                    EngineState::Active
                } else {
                    EngineState::OutsideMarketHours
                };
            }
            EngineCommand::SquareOff => {
                info!("square-off by command");
                if let Err(e) = self.square_off_all().await {
                    error!(error = %e, "commanded square-off failed");
                }
                self.state = EngineState::Stopped;
            }
            EngineCommand::ClosePosition { id } => {
                if let Err(e) = self.close_by_id(id).await {
                    error!(id, error = %e, "manual close failed");
                }
            }
            EngineCommand::GetStatus(reply) => {
                let status = self.build_status().await;
                let _ = reply.send(status);
            }
            EngineCommand::Shutdown => return Flow::Shutdown,
        }
        Flow::Continue
    }

    async fn close_by_id(&self, id: i64) -> Result<()> {
        let open = self.store.get_open_positions().await?;
        let Some(position) = open.into_iter().find(|p| p.id == id) else {
            warn!(id, "manual close: no such open position");
            return Ok(());
        };
        let price = match self.broker.get_quote(&position.symbol).await? {
            Some(quote) => quote.last_price,
            None => position.current_price,
        };
        self.close_position(&position, price, ExitReason::Manual)
            .await
    }

    async fn build_status(&self) -> EngineStatus {
        let open_positions = self
            .store
            .get_open_positions()
            .await
            .map(|p| p.len())
            .unwrap_or(0);
        let today_realized_pnl = self
            .store
            .get_today_realized_pnl()
            .await
            .unwrap_or(Decimal::ZERO);
        EngineStatus {
            state: self.state,
            symbol: self.cfg.engine.symbol.clone(),
            last_iteration: self.last_iteration,
            open_positions,
            today_realized_pnl,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use optrade_core::types::{BrokerPosition, Candle, MarketQuote, OptionType, SignalDirection};
    use optrade_store::Database;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    /// Broker stub with per-symbol quotes and an order log.
    #[derive(Default)]
    struct ScriptedBroker {
        quotes: Mutex<HashMap<String, Decimal>>,
        orders: Mutex<Vec<(String, i64, OrderSide)>>,
        reject_orders: bool,
    }

    impl ScriptedBroker {
        fn set_quote(&self, symbol: &str, price: Decimal) {
            self.quotes.lock().insert(symbol.to_string(), price);
        }

        fn orders(&self) -> Vec<(String, i64, OrderSide)> {
            self.orders.lock().clone()
        }
    }

    #[async_trait]
    impl Broker for ScriptedBroker {
        async fn get_quote(&self, symbol: &str) -> Result<Option<MarketQuote>> {
            Ok(self.quotes.lock().get(symbol).map(|&price| MarketQuote {
                symbol: symbol.to_string(),
                last_price: price,
                bid_price: price,
                ask_price: price,
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
        ) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }

        async fn place_order(
            &self,
            symbol: &str,
            quantity: i64,
            side: OrderSide,
            _order_type: OrderType,
        ) -> Result<Option<String>> {
            if self.reject_orders {
                return Ok(None);
            }
            self.orders
                .lock()
                .push((symbol.to_string(), quantity, side));
            Ok(Some(format!("ORD-{}", self.orders.lock().len())))
        }

        async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
            Ok(Vec::new())
        }

        async fn square_off_all(&self) -> Result<()> {
            Ok(())
        }
    }

    fn signal(strike: Decimal, direction: SignalDirection, option_type: OptionType) -> Signal {
        Signal {
            timestamp: Utc::now(),
            direction,
            strength: 70.0,
            contributors: vec!["rsi".to_string(), "order_flow".to_string()],
            underlying_price: strike,
            strike,
            option_type,
            technical: Default::default(),
            order_flow: Default::default(),
            buy_score: 70.0,
            sell_score: 0.0,
        }
    }

    fn buy_signal(strike: Decimal) -> Signal {
        signal(strike, SignalDirection::Buy, OptionType::Ce)
    }

    fn sell_signal(strike: Decimal) -> Signal {
        signal(strike, SignalDirection::Sell, OptionType::Pe)
    }

    async fn engine_with(
        broker: Arc<ScriptedBroker>,
    ) -> (TradingEngine, Arc<Database>) {
        let store = Arc::new(Database::in_memory().await.unwrap());
        let (engine, _handle) =
            TradingEngine::new(AppConfig::default(), broker, store.clone());
        (engine, store)
    }

    fn expected_symbol_with(strike: &str, side: &str) -> String {
        // Same exchange-local date the engine uses.
        let today = Utc::now()
            .with_timezone(&chrono_tz::Asia::Kolkata)
            .date_naive();
        let expiry = current_weekly_expiry(today);
        format!(
            "NSE_FO|NIFTY{}{}{}",
            expiry.format("%y%b%d").to_string().to_uppercase(),
            strike,
            side
        )
    }

    fn expected_symbol(strike: &str) -> String {
        expected_symbol_with(strike, "CE")
    }

    #[tokio::test]
    async fn signal_becomes_a_sized_position() {
        let broker = Arc::new(ScriptedBroker::default());
        let symbol = expected_symbol("24500");
        broker.set_quote(&symbol, dec!(120));
        let (engine, store) = engine_with(broker.clone()).await;

        engine
            .execute_signal(&buy_signal(dec!(24500)), Utc::now())
            .await
            .unwrap();

        let orders = broker.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].0, symbol);
        assert_eq!(orders[0].2, OrderSide::Buy);
        // Quantity is a whole-lot multiple within the capital fraction.
        assert_eq!(orders[0].1, 250);

        let open = store.get_open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].entry_price, dec!(120));
        assert_eq!(open[0].stop_loss, dec!(118.200));
        assert!(
            store
                .get_trade_contributors(open[0].trade_id)
                .await
                .unwrap()
                .contains(&"rsi".to_string())
        );
    }

    #[tokio::test]
    async fn duplicate_contract_is_not_reentered() {
        let broker = Arc::new(ScriptedBroker::default());
        let symbol = expected_symbol("24500");
        broker.set_quote(&symbol, dec!(120));
        let (engine, _store) = engine_with(broker.clone()).await;

        let signal = buy_signal(dec!(24500));
        engine.execute_signal(&signal, Utc::now()).await.unwrap();
        engine.execute_signal(&signal, Utc::now()).await.unwrap();
        assert_eq!(broker.orders().len(), 1);
    }

    #[tokio::test]
    async fn rejected_entry_order_records_nothing() {
        let broker = Arc::new(ScriptedBroker {
            reject_orders: true,
            ..Default::default()
        });
        let symbol = expected_symbol("24500");
        broker.set_quote(&symbol, dec!(120));
        let (engine, store) = engine_with(broker.clone()).await;

        engine
            .execute_signal(&buy_signal(dec!(24500)), Utc::now())
            .await
            .unwrap();
        assert!(store.get_open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_breach_closes_and_attributes() {
        let broker = Arc::new(ScriptedBroker::default());
        let symbol = expected_symbol("24500");
        broker.set_quote(&symbol, dec!(120));
        let (engine, store) = engine_with(broker.clone()).await;
        engine
            .execute_signal(&buy_signal(dec!(24500)), Utc::now())
            .await
            .unwrap();

        // Premium collapses through the stop.
        broker.set_quote(&symbol, dec!(110));
        engine.monitor_positions().await.unwrap();

        assert!(store.get_open_positions().await.unwrap().is_empty());
        let orders = broker.orders();
        assert_eq!(orders.last().unwrap().2, OrderSide::Sell);

        // Losing trade feeds both contributors' aggregates.
        let perf = store.get_strategy_performance().await.unwrap();
        assert_eq!(perf.len(), 2);
        assert!(perf.iter().all(|p| p.losing_trades == 1));
        // Realized loss shows up in the daily total.
        assert_eq!(
            store.get_today_realized_pnl().await.unwrap(),
            dec!(-10) * dec!(250)
        );
    }

    #[tokio::test]
    async fn trailing_ratchet_tightens_then_exits_as_trailing_stop() {
        let broker = Arc::new(ScriptedBroker::default());
        let symbol = expected_symbol("24500");
        broker.set_quote(&symbol, dec!(120));
        let (engine, store) = engine_with(broker.clone()).await;
        engine
            .execute_signal(&buy_signal(dec!(24500)), Utc::now())
            .await
            .unwrap();

        // Rally below the target raises the stop to 1% under price.
        broker.set_quote(&symbol, dec!(122));
        engine.monitor_positions().await.unwrap();
        let open = store.get_open_positions().await.unwrap();
        assert_eq!(open[0].stop_loss, dec!(120.78));
        assert!(open[0].trailing_active);

        // Fade through the ratcheted stop exits as a trailing stop.
        broker.set_quote(&symbol, dec!(120.5));
        engine.monitor_positions().await.unwrap();
        assert!(store.get_open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn square_off_uses_stale_mark_when_quote_is_gone() {
        let broker = Arc::new(ScriptedBroker::default());
        let symbol = expected_symbol("24500");
        broker.set_quote(&symbol, dec!(120));
        let (engine, store) = engine_with(broker.clone()).await;
        engine
            .execute_signal(&buy_signal(dec!(24500)), Utc::now())
            .await
            .unwrap();

        // Mark moves up, then the feed dies.
        broker.set_quote(&symbol, dec!(121));
        engine.monitor_positions().await.unwrap();
        broker.quotes.lock().clear();

        engine.square_off_all().await.unwrap();
        assert!(store.get_open_positions().await.unwrap().is_empty());
        assert_eq!(
            store.get_today_realized_pnl().await.unwrap(),
            dec!(1) * dec!(250)
        );
    }

    #[tokio::test]
    async fn put_entry_sells_and_exits_on_a_rising_premium() {
        let broker = Arc::new(ScriptedBroker::default());
        let symbol = expected_symbol_with("24500", "PE");
        broker.set_quote(&symbol, dec!(120));
        let (engine, store) = engine_with(broker.clone()).await;

        engine
            .execute_signal(&sell_signal(dec!(24500)), Utc::now())
            .await
            .unwrap();

        let orders = broker.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].0, symbol);
        assert_eq!(orders[0].2, OrderSide::Sell);

        // Protective levels sit mirrored around the put entry.
        let open = store.get_open_positions().await.unwrap();
        assert_eq!(open[0].stop_loss, dec!(121.800));
        assert_eq!(open[0].target, dec!(116.40));

        // A rising premium is the losing direction for the put side; the
        // stop breach exits with a buy and books the loss.
        broker.set_quote(&symbol, dec!(122));
        engine.monitor_positions().await.unwrap();

        assert!(store.get_open_positions().await.unwrap().is_empty());
        assert_eq!(broker.orders().last().unwrap().2, OrderSide::Buy);
        assert_eq!(
            store.get_today_realized_pnl().await.unwrap(),
            dec!(-2) * dec!(250)
        );
    }

    #[tokio::test]
    async fn square_off_cutoff_preempts_pause() {
        let broker = Arc::new(ScriptedBroker::default());
        let symbol = expected_symbol("24500");
        broker.set_quote(&symbol, dec!(120));
        let (mut engine, store) = engine_with(broker.clone()).await;
        engine
            .execute_signal(&buy_signal(dec!(24500)), Utc::now())
            .await
            .unwrap();
        engine.state = EngineState::Paused;

        // 15:20 IST on a weekday, inside the square-off window.
        let cutoff = Utc.with_ymd_and_hms(2025, 8, 29, 9, 50, 0).unwrap();
        engine.tick(cutoff).await;

        assert_eq!(engine.state, EngineState::Stopped);
        assert!(store.get_open_positions().await.unwrap().is_empty());
    }
}
