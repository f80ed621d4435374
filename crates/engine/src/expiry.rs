//! Weekly expiry selection and option instrument keys.

use chrono::{Datelike, NaiveDate, Weekday};
use optrade_core::types::OptionType;
use rust_decimal::Decimal;

/// NIFTY weekly options expire on Thursday. Returns the current week's
/// expiry: today if it is Thursday, otherwise the next one.
#[must_use]
pub fn current_weekly_expiry(today: NaiveDate) -> NaiveDate {
    let mut date = today;
    while date.weekday() != Weekday::Thu {
        date = date.succ_opt().unwrap_or(date);
    }
    date
}

/// Upstox instrument key for a NIFTY weekly option, e.g.
/// `NSE_FO|NIFTY25SEP0424500CE`. The strike is rendered without decimals.
#[must_use]
pub fn option_symbol(expiry: NaiveDate, strike: Decimal, option_type: OptionType) -> String {
    let expiry_code = expiry.format("%y%b%d").to_string().to_uppercase();
    format!(
        "NSE_FO|NIFTY{expiry_code}{}{}",
        strike.trunc(),
        option_type.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn expiry_is_this_weeks_thursday() {
        // Monday 2025-09-01 -> Thursday 2025-09-04.
        assert_eq!(current_weekly_expiry(date(2025, 9, 1)), date(2025, 9, 4));
        // Thursday maps to itself.
        assert_eq!(current_weekly_expiry(date(2025, 9, 4)), date(2025, 9, 4));
        // Friday rolls to next week's Thursday.
        assert_eq!(current_weekly_expiry(date(2025, 9, 5)), date(2025, 9, 11));
    }

    #[test]
    fn symbol_format_matches_the_exchange_key() {
        let expiry = date(2025, 9, 4);
        assert_eq!(
            option_symbol(expiry, dec!(24500), OptionType::Ce),
            "NSE_FO|NIFTY25SEP0424500CE"
        );
        assert_eq!(
            option_symbol(expiry, dec!(24450.00), OptionType::Pe),
            "NSE_FO|NIFTY25SEP0424450PE"
        );
    }
}
