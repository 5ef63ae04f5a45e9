use super::money::{round_half_up, Amount, Balance, Rate, DAILY_RATE_SCALE, MONEY_SCALE};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    Active,
    Closed,
}

/// A loan accruing simple, non-compounding interest on a fixed principal.
///
/// `accrued_interest` only ever grows while the loan is ACTIVE, and
/// `last_interest_date` is the watermark: the last calendar day interest has
/// been posted through, inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub principal: Amount,
    pub annual_rate: Rate,
    pub accrued_interest: Balance,
    pub last_interest_date: NaiveDate,
    pub status: LoanStatus,
}

/// One immutable row per (loan, calendar date), recording the rate and
/// interest used for that day. The pair is unique; a day is never re-posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestAccrual {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub date: NaiveDate,
    pub daily_rate: Decimal,
    pub principal: Amount,
    pub interest: Balance,
}

/// A year is a leap year if divisible by 4, not by 100, unless also by 400.
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Day-count basis for the year containing `date`: 366 in a leap year, else 365.
pub fn days_in_year(date: NaiveDate) -> u32 {
    if is_leap_year(date.year()) { 366 } else { 365 }
}

/// Raw daily figures for one calendar date, before rounding.
///
/// daily_rate = annual_rate / days_in_year(date)
/// interest   = principal * annual_rate / 100 / days_in_year(date)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyInterest {
    pub daily_rate: Decimal,
    pub interest: Decimal,
}

impl DailyInterest {
    /// Daily rate rounded for reporting (10 decimal places).
    pub fn rounded_rate(&self) -> Decimal {
        round_half_up(self.daily_rate, DAILY_RATE_SCALE)
    }

    /// Daily interest rounded for reporting (4 decimal places).
    pub fn rounded_interest(&self) -> Decimal {
        round_half_up(self.interest, MONEY_SCALE)
    }
}

/// Computes the daily rate and interest for one calendar date.
///
/// A date on the far side of a year boundary picks up the new year's
/// day-count automatically.
pub fn daily_interest(principal: Amount, annual_rate: Rate, date: NaiveDate) -> DailyInterest {
    let days = Decimal::from(days_in_year(date));
    let daily_rate = annual_rate.value() / days;
    let interest = principal.value() * annual_rate.value() / Decimal::from(100) / days;
    DailyInterest {
        daily_rate,
        interest,
    }
}
