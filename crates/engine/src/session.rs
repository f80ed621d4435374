//! Exchange session gating in IST.
//!
//! All session decisions convert the wall clock to Asia/Kolkata first; the
//! host timezone never matters.

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Asia::Kolkata;
use optrade_core::config::SessionConfig;

/// Where we are in the trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Weekend, pre-open, or post-close.
    Closed,
    /// Normal trading window.
    Active,
    /// Inside the session but past the square-off cutoff.
    SquareOff,
}

#[derive(Debug, Clone, Copy)]
pub struct MarketSession {
    cfg: SessionConfig,
}

impl MarketSession {
    #[must_use]
    pub fn new(cfg: SessionConfig) -> Self {
        Self { cfg }
    }

    #[must_use]
    pub fn phase(&self, now: DateTime<Utc>) -> SessionPhase {
        let ist = now.with_timezone(&Kolkata);
        if matches!(ist.weekday(), Weekday::Sat | Weekday::Sun) {
            return SessionPhase::Closed;
        }
        let time = ist.time();
        let open = hm(self.cfg.open_hour, self.cfg.open_minute);
        let close = hm(self.cfg.close_hour, self.cfg.close_minute);
        let square_off = hm(self.cfg.square_off_hour, self.cfg.square_off_minute);

        if time < open || time > close {
            SessionPhase::Closed
        } else if time >= square_off {
            SessionPhase::SquareOff
        } else {
            SessionPhase::Active
        }
    }

    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.phase(now) != SessionPhase::Closed
    }

    /// Today's date in exchange-local terms, for expiry math.
    #[must_use]
    pub fn trading_date(&self, now: DateTime<Utc>) -> chrono::NaiveDate {
        now.with_timezone(&Kolkata).date_naive()
    }

    /// Minutes until today's open, for log context while idling. `None`
    /// once the bell has rung or on a weekend.
    #[must_use]
    pub fn minutes_to_open(&self, now: DateTime<Utc>) -> Option<i64> {
        let ist = now.with_timezone(&Kolkata);
        let open = hm(self.cfg.open_hour, self.cfg.open_minute);
        if ist.time() >= open || matches!(ist.weekday(), Weekday::Sat | Weekday::Sun) {
            return None;
        }
        let now_mins = i64::from(ist.hour()) * 60 + i64::from(ist.minute());
        let open_mins = i64::from(self.cfg.open_hour) * 60 + i64::from(self.cfg.open_minute);
        Some(open_mins - now_mins)
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
