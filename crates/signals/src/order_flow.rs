//! Order-flow analysis over candle volume and top-of-book quotes.
//!
//! Per-bar volume is split into buy and sell pressure by where the close
//! lands inside the bar's range. The analyzer is stateful and must be fed
//! bars in arrival order, one `analyze` call per bar.

use optrade_core::config::OrderFlowConfig;
use optrade_core::types::{Candle, FlowSnapshot, MarketQuote, SignalDirection};
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::window::RollingWindow;

/// Minimum volume samples before large-order detection engages.
const LARGE_ORDER_MIN_SAMPLES: usize = 5;

/// Votes derived from the flow state; `None` means abstain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowVotes {
    /// Majority among the imbalance, large-order, and aggressive votes.
    pub overall: Option<SignalDirection>,
    pub imbalance: Option<SignalDirection>,
    pub large_order: Option<SignalDirection>,
}

/// Depth imbalance reading for one quote.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImbalanceReport {
    /// Bid fraction minus ask fraction of visible depth, -1..=1.
    pub imbalance: f64,
    /// `|imbalance|` scaled to 0-100.
    pub strength: f64,
    pub vote: Option<SignalDirection>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LargeOrderReport {
    pub detected: bool,
    pub vote: Option<SignalDirection>,
}

#[derive(Debug, Clone)]
pub struct FlowAnalysis {
    pub volume_delta: f64,
    pub cvd: f64,
    pub imbalance: ImbalanceReport,
    pub large_order: LargeOrderReport,
    /// A print at or through the previous quote's book.
    pub aggressive: Option<SignalDirection>,
    /// Price and flow trending against each other over the window.
    pub divergence: Option<SignalDirection>,
    /// Share of cast votes agreeing with the overall vote, 0-100.
    pub strength: f64,
    pub votes: FlowVotes,
}

impl FlowAnalysis {
    #[must_use]
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            volume_delta: self.volume_delta,
            cvd: self.cvd,
            imbalance: self.imbalance.imbalance,
            large_order_detected: self.large_order.detected,
        }
    }
}

#[derive(Debug)]
pub struct OrderFlowAnalyzer {
    cfg: OrderFlowConfig,
    deltas: RollingWindow,
    volumes: RollingWindow,
    closes: RollingWindow,
    delta_history: RollingWindow,
    last_close: Option<f64>,
    prev_quote: Option<MarketQuote>,
}

impl OrderFlowAnalyzer {
    #[must_use]
    pub fn new(cfg: OrderFlowConfig) -> Self {
        Self {
            deltas: RollingWindow::new(cfg.cvd_lookback),
            volumes: RollingWindow::new(cfg.volume_lookback),
            closes: RollingWindow::new(cfg.divergence_window),
            delta_history: RollingWindow::new(cfg.divergence_window),
            cfg,
            last_close: None,
            prev_quote: None,
        }
    }

    /// Estimated buy volume minus sell volume for one bar. A close near the
    /// high of a bullish bar reads as buying pressure; the mirror holds for
    /// bearish bars. Zero-range bars carry no information.
    #[must_use]
    pub fn volume_delta(candle: &Candle) -> f64 {
        let high = dec_f64(candle.high);
        let low = dec_f64(candle.low);
        let close = dec_f64(candle.close);
        let open = dec_f64(candle.open);
        let volume = dec_f64(candle.volume);

        let range = high - low;
        if range <= 0.0 {
            return 0.0;
        }
        let buy_ratio = if close > open {
            (close - low) / range
        } else {
            1.0 - (high - close) / range
        };
        volume * (2.0 * buy_ratio - 1.0)
    }

    /// Cumulative volume delta over the lookback window.
    #[must_use]
    pub fn cvd(&self) -> f64 {
        self.deltas.sum()
    }

    /// Depth imbalance of one quote. An empty book reads as balanced and
    /// casts no vote.
    #[must_use]
    pub fn bid_ask_imbalance(&self, quote: &MarketQuote) -> ImbalanceReport {
        let bid = dec_f64(quote.bid_qty);
        let ask = dec_f64(quote.ask_qty);
        let total = bid + ask;
        if total <= 0.0 {
            return ImbalanceReport::default();
        }

        let bid_ratio = bid / total;
        let ask_ratio = ask / total;
        let imbalance = bid_ratio - ask_ratio;

        let vote = if bid_ratio > self.cfg.imbalance_threshold {
            Some(SignalDirection::Buy)
        } else if ask_ratio > self.cfg.imbalance_threshold {
            Some(SignalDirection::Sell)
        } else {
            None
        };

        ImbalanceReport {
            imbalance,
            strength: imbalance.abs() * 100.0,
            vote,
        }
    }

    /// A last trade at or through the previous quote's book is a market
    /// order that crossed the spread.
    #[must_use]
    pub fn aggressive_order(quote: &MarketQuote, prev: &MarketQuote) -> Option<SignalDirection> {
        if quote.last_price >= prev.ask_price {
            Some(SignalDirection::Buy)
        } else if quote.last_price <= prev.bid_price {
            Some(SignalDirection::Sell)
        } else {
            None
        }
    }

    /// Rolls the volume window forward and flags bars whose volume is a
    /// configured multiple of the trailing average. Direction comes from the
    /// close against the last observed close. Stays quiet until enough
    /// history has accumulated.
    fn large_order(&mut self, candle: &Candle) -> LargeOrderReport {
        self.volumes.push(dec_f64(candle.volume));
        if self.volumes.len() < LARGE_ORDER_MIN_SAMPLES {
            return LargeOrderReport::default();
        }

        let close = dec_f64(candle.close);
        let (Some(avg), Some(current)) = (self.volumes.trailing_mean(), self.volumes.back()) else {
            return LargeOrderReport::default();
        };

        let detected = avg > 0.0 && current > avg * self.cfg.large_order_multiplier;
        let vote = if detected {
            self.last_close.and_then(|prev| {
                if close > prev {
                    Some(SignalDirection::Buy)
                } else if close < prev {
                    Some(SignalDirection::Sell)
                } else {
                    None
                }
            })
        } else {
            None
        };
        self.last_close = Some(close);

        LargeOrderReport { detected, vote }
    }

    /// Price making ground the flow does not confirm. Rising price on
    /// falling deltas is distribution (sell vote); the mirror is
    /// accumulation.
    fn divergence(&self) -> Option<SignalDirection> {
        if self.closes.len() < self.cfg.divergence_window
            || self.delta_history.len() < self.cfg.divergence_window
        {
            return None;
        }
        let price_up = self.closes.back()? > self.closes.front()?;
        let delta_up = self.delta_history.back()? > self.delta_history.front()?;

        match (price_up, delta_up) {
            (false, true) => Some(SignalDirection::Buy),
            (true, false) => Some(SignalDirection::Sell),
            _ => None,
        }
    }

    /// Full flow pass for one bar and its quote. Rolls every window
    /// forward, so call exactly once per bar.
    pub fn analyze(&mut self, candle: &Candle, quote: &MarketQuote) -> FlowAnalysis {
        let volume_delta = Self::volume_delta(candle);
        self.deltas.push(volume_delta);
        let cvd = self.deltas.sum();

        let imbalance = self.bid_ask_imbalance(quote);
        let large_order = self.large_order(candle);

        let aggressive = self
            .prev_quote
            .as_ref()
            .and_then(|prev| Self::aggressive_order(quote, prev));
        self.prev_quote = Some(quote.clone());

        self.closes.push(dec_f64(candle.close));
        self.delta_history.push(volume_delta);
        let divergence = self.divergence();

        let mut buy = 0u32;
        let mut sell = 0u32;
        for vote in [imbalance.vote, large_order.vote, aggressive]
            .into_iter()
            .flatten()
        {
            match vote {
                SignalDirection::Buy => buy += 1,
                SignalDirection::Sell => sell += 1,
                SignalDirection::Neutral => {}
            }
        }
        let overall = if buy > sell {
            Some(SignalDirection::Buy)
        } else if sell > buy {
            Some(SignalDirection::Sell)
        } else {
            None
        };
        let strength = if overall.is_some() {
            f64::from(buy.max(sell)) / f64::from(buy + sell) * 100.0
        } else {
            0.0
        };

        debug!(
            symbol = %quote.symbol,
            volume_delta,
            cvd,
            imbalance = imbalance.imbalance,
            large_order = large_order.detected,
            "order flow"
        );

        FlowAnalysis {
            volume_delta,
            cvd,
            imbalance,
            large_order,
            aggressive,
            divergence,
            strength,
            votes: FlowVotes {
                overall,
                imbalance: imbalance.vote,
                large_order: large_order.vote,
            },
        }
    }
}

fn dec_f64(d: rust_decimal::Decimal) -> f64 {
    d.to_f64().unwrap_or_default()
}
