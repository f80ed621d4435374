//! Technical indicators over ordered candle sequences.
//!
//! Every indicator returns `None` (never an error, never a panic) when the
//! window is shorter than its minimum period; only the aggregate
//! [`IndicatorEngine::analyze`] surfaces `InsufficientData`.

use optrade_core::config::IndicatorConfig;
use optrade_core::types::{BandPosition, Breakout, Candle, SignalDirection, VolumeTrend};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::IndicatorError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub position: BandPosition,
    /// (upper - lower) / middle; 0 when middle is non-positive.
    pub bandwidth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportResistance {
    pub support: f64,
    pub resistance: f64,
    pub pivot: f64,
    pub r1: f64,
    pub s1: f64,
}

/// Per-indicator buy/sell votes; `None` means the indicator abstained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TechnicalVotes {
    pub rsi: Option<SignalDirection>,
    pub macd: Option<SignalDirection>,
    pub bollinger: Option<SignalDirection>,
    pub ema: Option<SignalDirection>,
    pub breakout: Option<SignalDirection>,
}

/// Full indicator pass over one candle window.
#[derive(Debug, Clone)]
pub struct TechnicalAnalysis {
    pub current_price: Decimal,
    pub rsi: Option<f64>,
    pub macd: Option<Macd>,
    pub bollinger: Option<Bollinger>,
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub support_resistance: Option<SupportResistance>,
    pub breakout: Option<Breakout>,
    pub volume_trend: VolumeTrend,
    pub votes: TechnicalVotes,
}

#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    cfg: IndicatorConfig,
}

impl IndicatorEngine {
    #[must_use]
    pub fn new(cfg: IndicatorConfig) -> Self {
        Self { cfg }
    }

    /// Relative Strength Index over the trailing `period` closes
    /// (rolling-mean gain/loss ratio). `None` below period+1 candles.
    #[must_use]
    pub fn rsi(&self, candles: &[Candle], period: usize) -> Option<f64> {
        if period == 0 || candles.len() < period + 1 {
            return None;
        }
        let closes = closes(&candles[candles.len() - (period + 1)..]);

        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;
        for pair in closes.windows(2) {
            let delta = pair[1] - pair[0];
            if delta > 0.0 {
                gain_sum += delta;
            } else {
                loss_sum -= delta;
            }
        }
        let avg_gain = gain_sum / period as f64;
        let avg_loss = loss_sum / period as f64;

        if avg_loss == 0.0 {
            // No losses in the window; RS is unbounded.
            return Some(100.0);
        }
        let rs = avg_gain / avg_loss;
        Some((100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0))
    }

    /// MACD line, signal line, and histogram. `None` below slow+signal
    /// candles.
    #[must_use]
    pub fn macd(&self, candles: &[Candle], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
        if candles.len() < slow + signal {
            return None;
        }
        let closes = closes(candles);
        let fast_ema = ema_series(&closes, fast);
        let slow_ema = ema_series(&closes, slow);
        let macd_line: Vec<f64> = fast_ema
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();
        let signal_line = ema_series(&macd_line, signal);

        let macd = *macd_line.last()?;
        let sig = *signal_line.last()?;
        Some(Macd {
            macd,
            signal: sig,
            histogram: macd - sig,
        })
    }

    /// Bollinger bands (SMA +/- k * sample stddev) with last-close
    /// classification. `None` below `period` candles.
    #[must_use]
    pub fn bollinger(&self, candles: &[Candle], period: usize, k: f64) -> Option<Bollinger> {
        if period < 2 || candles.len() < period {
            return None;
        }
        let window = closes(&candles[candles.len() - period..]);
        let middle = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|c| (c - middle).powi(2))
            .sum::<f64>()
            / (period - 1) as f64;
        let std_dev = variance.sqrt();
        let upper = middle + k * std_dev;
        let lower = middle - k * std_dev;

        let price = *window.last()?;
        let position = if price >= upper {
            BandPosition::AboveUpper
        } else if price <= lower {
            BandPosition::BelowLower
        } else if price > middle {
            BandPosition::AboveMiddle
        } else {
            BandPosition::BelowMiddle
        };

        let bandwidth = if middle > 0.0 {
            (upper - lower) / middle
        } else {
            0.0
        };

        Some(Bollinger {
            upper,
            middle,
            lower,
            position,
            bandwidth,
        })
    }

    /// Exponential moving average seeded at the first close. `None` below
    /// `period` candles.
    #[must_use]
    pub fn ema(&self, candles: &[Candle], period: usize) -> Option<f64> {
        if period == 0 || candles.len() < period {
            return None;
        }
        ema_series(&closes(candles), period).last().copied()
    }

    /// Range extremes plus pivot levels. The pivot uses the last candle's
    /// H/L/C. `None` below `lookback` candles.
    #[must_use]
    pub fn support_resistance(
        &self,
        candles: &[Candle],
        lookback: usize,
    ) -> Option<SupportResistance> {
        if lookback == 0 || candles.len() < lookback {
            return None;
        }
        let window = &candles[candles.len() - lookback..];
        let resistance = window
            .iter()
            .map(|c| dec_f64(c.high))
            .fold(f64::MIN, f64::max);
        let support = window.iter().map(|c| dec_f64(c.low)).fold(f64::MAX, f64::min);

        let last = window.last()?;
        let pivot = (dec_f64(last.high) + dec_f64(last.low) + dec_f64(last.close)) / 3.0;

        Some(SupportResistance {
            support,
            resistance,
            pivot,
            r1: 2.0 * pivot - support,
            s1: 2.0 * pivot - resistance,
        })
    }

    /// Breakout beyond the lookback range with a buffer past the edge.
    #[must_use]
    pub fn breakout(
        &self,
        candles: &[Candle],
        current_price: f64,
        lookback: usize,
    ) -> Option<Breakout> {
        if lookback == 0 || candles.len() < lookback {
            return None;
        }
        let window = &candles[candles.len() - lookback..];
        let resistance = window
            .iter()
            .map(|c| dec_f64(c.high))
            .fold(f64::MIN, f64::max);
        let support = window.iter().map(|c| dec_f64(c.low)).fold(f64::MAX, f64::min);

        if current_price > resistance * (1.0 + self.cfg.breakout_buffer) {
            Some(Breakout::Bullish)
        } else if current_price < support * (1.0 - self.cfg.breakout_buffer) {
            Some(Breakout::Bearish)
        } else {
            None
        }
    }

    /// Latest volume vs the average of the trailing `period` volumes
    /// (current included). Neutral when short of data.
    #[must_use]
    pub fn volume_trend(&self, candles: &[Candle], period: usize) -> VolumeTrend {
        if period == 0 || candles.len() < period {
            return VolumeTrend::Neutral;
        }
        let window = &candles[candles.len() - period..];
        let avg = window.iter().map(|c| dec_f64(c.volume)).sum::<f64>() / period as f64;
        let current = dec_f64(candles[candles.len() - 1].volume);

        if current > avg * 1.5 {
            VolumeTrend::Increasing
        } else if current < avg * 0.5 {
            VolumeTrend::Decreasing
        } else {
            VolumeTrend::Neutral
        }
    }

    /// Runs every indicator and derives per-indicator votes.
    ///
    /// # Errors
    ///
    /// `InsufficientData` when the window is shorter than the Bollinger
    /// period; individual indicators with longer requirements simply abstain.
    pub fn analyze(&self, candles: &[Candle]) -> Result<TechnicalAnalysis, IndicatorError> {
        let cfg = &self.cfg;
        if candles.len() < cfg.bb_period {
            return Err(IndicatorError::InsufficientData {
                required: cfg.bb_period,
                available: candles.len(),
            });
        }

        let current_price = candles[candles.len() - 1].close;
        let price_f64 = dec_f64(current_price);

        let rsi = self.rsi(candles, cfg.rsi_period);
        let macd = self.macd(candles, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let bollinger = self.bollinger(candles, cfg.bb_period, cfg.bb_std);
        let ema_short = self.ema(candles, cfg.ema_short);
        let ema_long = self.ema(candles, cfg.ema_long);
        let support_resistance = self.support_resistance(candles, cfg.sr_lookback);
        let breakout = self.breakout(candles, price_f64, cfg.breakout_lookback);
        let volume_trend = self.volume_trend(candles, cfg.volume_period);

        let mut votes = TechnicalVotes::default();

        if let Some(rsi) = rsi {
            if rsi < cfg.rsi_oversold {
                votes.rsi = Some(SignalDirection::Buy);
            } else if rsi > cfg.rsi_overbought {
                votes.rsi = Some(SignalDirection::Sell);
            }
        }

        if let Some(m) = macd {
            if m.histogram > 0.0 && m.macd > m.signal {
                votes.macd = Some(SignalDirection::Buy);
            } else if m.histogram < 0.0 && m.macd < m.signal {
                votes.macd = Some(SignalDirection::Sell);
            }
        }

        if let Some(b) = &bollinger {
            match b.position {
                BandPosition::BelowLower => votes.bollinger = Some(SignalDirection::Buy),
                BandPosition::AboveUpper => votes.bollinger = Some(SignalDirection::Sell),
                _ => {}
            }
        }

        if let (Some(short), Some(long)) = (ema_short, ema_long) {
            votes.ema = Some(if short > long {
                SignalDirection::Buy
            } else {
                SignalDirection::Sell
            });
        }

        votes.breakout = breakout.map(|b| match b {
            Breakout::Bullish => SignalDirection::Buy,
            Breakout::Bearish => SignalDirection::Sell,
        });

        Ok(TechnicalAnalysis {
            current_price,
            rsi,
            macd,
            bollinger,
            ema_short,
            ema_long,
            support_resistance,
            breakout,
            volume_trend,
            votes,
        })
    }
}

fn dec_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or_default()
}

fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| dec_f64(c.close)).collect()
}

/// Iterative EMA over the whole series, seeded at the first value
/// (pandas `ewm(span=period, adjust=False)` semantics).
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(v) => *v,
        None => return out,
    };
    out.push(prev);
    for v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}
