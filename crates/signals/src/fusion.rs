//! Weighted fusion of indicator and order-flow votes into one tradeable
//! signal, plus ATM strike selection for the option leg.

use chrono::Utc;
use optrade_core::config::SignalConfig;
use optrade_core::types::{
    MarketQuote, OptionType, Position, Signal, SignalDirection, TechnicalSnapshot,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::SignalError;
use crate::indicators::TechnicalAnalysis;
use crate::order_flow::FlowAnalysis;

/// Component weights. They sum to 100 so a unanimous board maxes strength.
const WEIGHT_RSI: f64 = 15.0;
const WEIGHT_MACD: f64 = 15.0;
const WEIGHT_BOLLINGER: f64 = 10.0;
const WEIGHT_EMA: f64 = 10.0;
const WEIGHT_BREAKOUT: f64 = 10.0;
const WEIGHT_FLOW: f64 = 20.0;
const WEIGHT_IMBALANCE: f64 = 10.0;
const WEIGHT_LARGE_ORDER: f64 = 10.0;

/// One component's vote, named for attribution.
#[derive(Debug, Clone, Copy)]
pub struct Vote {
    pub name: &'static str,
    pub weight: f64,
    pub direction: Option<SignalDirection>,
}

/// Outcome of scoring one vote board.
#[derive(Debug, Clone)]
pub struct Score {
    pub buy: f64,
    pub sell: f64,
    pub direction: SignalDirection,
    /// Strength of the winning side, 0-100.
    pub strength: f64,
    /// Names of the components that voted with the winner.
    pub contributors: Vec<String>,
}

/// Sums weighted votes per side. The winner's total is the signal strength;
/// a tie (including all-abstain) is Neutral with zero strength.
#[must_use]
pub fn score(votes: &[Vote]) -> Score {
    let mut buy = 0.0;
    let mut sell = 0.0;
    for vote in votes {
        match vote.direction {
            Some(SignalDirection::Buy) => buy += vote.weight,
            Some(SignalDirection::Sell) => sell += vote.weight,
            _ => {}
        }
    }

    let direction = if buy > sell {
        SignalDirection::Buy
    } else if sell > buy {
        SignalDirection::Sell
    } else {
        SignalDirection::Neutral
    };

    let strength = match direction {
        SignalDirection::Buy => buy,
        SignalDirection::Sell => sell,
        SignalDirection::Neutral => 0.0,
    };

    let contributors = votes
        .iter()
        .filter(|v| v.direction == Some(direction))
        .map(|v| v.name.to_string())
        .collect();

    Score {
        buy,
        sell,
        direction,
        strength,
        contributors,
    }
}

#[derive(Debug, Clone)]
pub struct SignalFusionEngine {
    cfg: SignalConfig,
}

impl SignalFusionEngine {
    #[must_use]
    pub fn new(cfg: SignalConfig) -> Self {
        Self { cfg }
    }

    /// Nearest strike on the ladder, shifted by the moneyness offset
    /// (positive steps away from the money for the chosen side).
    #[must_use]
    pub fn select_strike(&self, spot: Decimal, option_type: OptionType) -> Decimal {
        let inc = self.cfg.strike_increment;
        let atm = (spot / inc).round() * inc;
        let shift = inc * Decimal::from(self.cfg.moneyness_offset);
        match option_type {
            OptionType::Ce => atm + shift,
            OptionType::Pe => atm - shift,
        }
    }

    /// Fuses one iteration's technical and flow analyses into a signal.
    ///
    /// # Errors
    ///
    /// `NoDirection` on a tied board; `BelowThreshold` when the winning
    /// side's strength misses the configured minimum. Both mean "no trade
    /// this iteration", not a fault.
    pub fn generate(
        &self,
        technical: &TechnicalAnalysis,
        flow: &FlowAnalysis,
        quote: &MarketQuote,
    ) -> Result<Signal, SignalError> {
        let votes = [
            Vote {
                name: "rsi",
                weight: WEIGHT_RSI,
                direction: technical.votes.rsi,
            },
            Vote {
                name: "macd",
                weight: WEIGHT_MACD,
                direction: technical.votes.macd,
            },
            Vote {
                name: "bollinger",
                weight: WEIGHT_BOLLINGER,
                direction: technical.votes.bollinger,
            },
            Vote {
                name: "ema",
                weight: WEIGHT_EMA,
                direction: technical.votes.ema,
            },
            Vote {
                name: "breakout",
                weight: WEIGHT_BREAKOUT,
                direction: technical.votes.breakout,
            },
            Vote {
                name: "order_flow",
                weight: WEIGHT_FLOW,
                direction: flow.votes.overall,
            },
            Vote {
                name: "bid_ask_imbalance",
                weight: WEIGHT_IMBALANCE,
                direction: flow.votes.imbalance,
            },
            Vote {
                name: "large_order",
                weight: WEIGHT_LARGE_ORDER,
                direction: flow.votes.large_order,
            },
        ];

        let scored = score(&votes);
        debug!(
            buy = scored.buy,
            sell = scored.sell,
            direction = %scored.direction,
            "fusion scores"
        );

        let direction = match scored.direction {
            SignalDirection::Neutral => return Err(SignalError::NoDirection),
            d => d,
        };

        if scored.strength < self.cfg.min_strength {
            return Err(SignalError::BelowThreshold {
                strength: scored.strength,
                min: self.cfg.min_strength,
            });
        }

        // Bullish view buys calls, bearish buys puts. Short premium is out
        // of scope for this engine.
        let option_type = match direction {
            SignalDirection::Buy => OptionType::Ce,
            _ => OptionType::Pe,
        };
        let spot = quote.last_price;
        let strike = self.select_strike(spot, option_type);

        info!(
            direction = %direction,
            strength = scored.strength,
            strike = %strike,
            option_type = %option_type,
            contributors = ?scored.contributors,
            "signal generated"
        );

        Ok(Signal {
            timestamp: Utc::now(),
            direction,
            strength: scored.strength,
            contributors: scored.contributors,
            underlying_price: spot,
            strike,
            option_type,
            technical: snapshot(technical),
            order_flow: flow.snapshot(),
            buy_score: scored.buy,
            sell_score: scored.sell,
        })
    }

    /// Pre-execution check against the open book: no stacking a second
    /// position on the same option side, and the strength floor must still
    /// hold.
    #[must_use]
    pub fn validate(&self, signal: &Signal, open_positions: &[Position]) -> bool {
        if let Some(held) = open_positions
            .iter()
            .find(|p| p.option_type == signal.option_type)
        {
            warn!(
                symbol = %held.symbol,
                option_type = %signal.option_type,
                "already holding this option side"
            );
            return false;
        }
        signal.strength >= self.cfg.min_strength
    }
}

fn snapshot(t: &TechnicalAnalysis) -> TechnicalSnapshot {
    TechnicalSnapshot {
        rsi: t.rsi,
        macd: t.macd.map(|m| m.macd),
        macd_signal: t.macd.map(|m| m.signal),
        macd_histogram: t.macd.map(|m| m.histogram),
        bb_position: t.bollinger.as_ref().map(|b| b.position),
        ema_short: t.ema_short,
        ema_long: t.ema_long,
        support: t.support_resistance.map(|sr| sr.support),
        resistance: t.support_resistance.map(|sr| sr.resistance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order_flow::{FlowVotes, ImbalanceReport, LargeOrderReport};
    use chrono::Utc;
    use optrade_core::types::{PositionStatus, VolumeTrend};
    use rust_decimal_macros::dec;

    fn vote(name: &'static str, weight: f64, d: Option<SignalDirection>) -> Vote {
        Vote {
            name,
            weight,
            direction: d,
        }
    }

    #[test]
    fn score_sums_weights_per_side() {
        let s = score(&[
            vote("rsi", 15.0, Some(SignalDirection::Buy)),
            vote("macd", 15.0, Some(SignalDirection::Buy)),
            vote("ema", 10.0, Some(SignalDirection::Sell)),
            vote("bollinger", 10.0, None),
        ]);
        assert_eq!(s.buy, 30.0);
        assert_eq!(s.sell, 10.0);
        assert_eq!(s.direction, SignalDirection::Buy);
        assert_eq!(s.strength, 30.0);
        assert_eq!(s.contributors, vec!["rsi", "macd"]);
    }

    #[test]
    fn oversold_rsi_with_bullish_macd_scores_at_least_40() {
        // RSI and MACD agreeing bullish already carry 30; any third
        // concurring vote clears 40.
        let s = score(&[
            vote("rsi", 15.0, Some(SignalDirection::Buy)),
            vote("macd", 15.0, Some(SignalDirection::Buy)),
            vote("bollinger", 10.0, Some(SignalDirection::Buy)),
        ]);
        assert!(s.strength >= 40.0);
        assert_eq!(s.direction, SignalDirection::Buy);
    }

    #[test]
    fn tied_board_is_neutral_with_zero_strength() {
        let s = score(&[
            vote("rsi", 15.0, Some(SignalDirection::Buy)),
            vote("macd", 15.0, Some(SignalDirection::Sell)),
        ]);
        assert_eq!(s.direction, SignalDirection::Neutral);
        assert_eq!(s.strength, 0.0);
        assert!(s.contributors.is_empty());
    }

    #[test]
    fn strike_snaps_to_the_ladder() {
        let fusion = SignalFusionEngine::new(SignalConfig::default());
        assert_eq!(
            fusion.select_strike(dec!(24512), OptionType::Ce),
            dec!(24500)
        );
        assert_eq!(
            fusion.select_strike(dec!(24537.85), OptionType::Pe),
            dec!(24550)
        );
    }

    #[test]
    fn moneyness_offset_shifts_away_from_the_money() {
        let fusion = SignalFusionEngine::new(SignalConfig {
            moneyness_offset: 2,
            ..SignalConfig::default()
        });
        assert_eq!(
            fusion.select_strike(dec!(24500), OptionType::Ce),
            dec!(24600)
        );
        assert_eq!(
            fusion.select_strike(dec!(24500), OptionType::Pe),
            dec!(24400)
        );
    }

    fn quote() -> MarketQuote {
        MarketQuote {
            symbol: "NSE_INDEX|Nifty 50".to_string(),
            last_price: dec!(24512),
            bid_price: dec!(24511.95),
            ask_price: dec!(24512.05),
            bid_qty: dec!(100),
            ask_qty: dec!(100),
            timestamp: Utc::now(),
        }
    }

    fn technical(votes: crate::indicators::TechnicalVotes) -> TechnicalAnalysis {
        TechnicalAnalysis {
            current_price: dec!(24512),
            rsi: Some(25.0),
            macd: None,
            bollinger: None,
            ema_short: None,
            ema_long: None,
            support_resistance: None,
            breakout: None,
            volume_trend: VolumeTrend::Neutral,
            votes,
        }
    }

    fn flow(votes: FlowVotes) -> FlowAnalysis {
        FlowAnalysis {
            volume_delta: 100.0,
            cvd: 500.0,
            imbalance: ImbalanceReport {
                imbalance: 0.4,
                strength: 40.0,
                vote: votes.imbalance,
            },
            large_order: LargeOrderReport::default(),
            aggressive: None,
            divergence: None,
            strength: 0.0,
            votes,
        }
    }

    #[test]
    fn generate_rejects_weak_and_tied_boards() {
        let fusion = SignalFusionEngine::new(SignalConfig::default());
        let q = quote();

        let t = technical(crate::indicators::TechnicalVotes::default());
        let f = flow(FlowVotes::default());
        assert!(matches!(
            fusion.generate(&t, &f, &q),
            Err(SignalError::NoDirection)
        ));

        let t = technical(crate::indicators::TechnicalVotes {
            rsi: Some(SignalDirection::Buy),
            ..Default::default()
        });
        assert!(matches!(
            fusion.generate(&t, &f, &q),
            Err(SignalError::BelowThreshold { strength, .. }) if strength == 15.0
        ));
    }

    #[test]
    fn generate_emits_a_call_signal_on_a_bullish_board() {
        let fusion = SignalFusionEngine::new(SignalConfig::default());
        let t = technical(crate::indicators::TechnicalVotes {
            rsi: Some(SignalDirection::Buy),
            macd: Some(SignalDirection::Buy),
            ema: Some(SignalDirection::Buy),
            ..Default::default()
        });
        let f = flow(FlowVotes {
            overall: Some(SignalDirection::Buy),
            imbalance: Some(SignalDirection::Buy),
            large_order: None,
        });
        let signal = fusion.generate(&t, &f, &quote()).unwrap();
        assert_eq!(signal.direction, SignalDirection::Buy);
        assert_eq!(signal.option_type, OptionType::Ce);
        assert_eq!(signal.strength, 70.0);
        assert_eq!(signal.strike, dec!(24500));
        assert!(signal.contributors.contains(&"order_flow".to_string()));
        assert_eq!(signal.buy_score, 70.0);
        assert_eq!(signal.sell_score, 0.0);
    }

    fn open_position(option_type: OptionType) -> Position {
        Position {
            id: 1,
            trade_id: 1,
            symbol: "NSE_FO|NIFTY25SEP0224500CE".to_string(),
            option_type,
            strike: dec!(24500),
            quantity: 50,
            entry_price: dec!(120),
            current_price: dec!(121),
            stop_loss: dec!(118.2),
            target: dec!(123.6),
            trailing_active: false,
            status: PositionStatus::Open,
            entry_time: Utc::now(),
            exit_time: None,
            exit_reason: None,
            pnl: None,
        }
    }

    #[test]
    fn validate_blocks_stacking_the_same_option_side() {
        let fusion = SignalFusionEngine::new(SignalConfig::default());
        let t = technical(crate::indicators::TechnicalVotes {
            rsi: Some(SignalDirection::Buy),
            macd: Some(SignalDirection::Buy),
            ema: Some(SignalDirection::Buy),
            ..Default::default()
        });
        let f = flow(FlowVotes {
            overall: Some(SignalDirection::Buy),
            imbalance: Some(SignalDirection::Buy),
            large_order: None,
        });
        let signal = fusion.generate(&t, &f, &quote()).unwrap();

        assert!(fusion.validate(&signal, &[]));
        // A put on the books does not block a call entry.
        assert!(fusion.validate(&signal, &[open_position(OptionType::Pe)]));
        assert!(!fusion.validate(&signal, &[open_position(OptionType::Ce)]));
    }
}
