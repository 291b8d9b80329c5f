//! School-year arithmetic.
//!
//! The SIS keys year-scoped queries on an internal `yearid`. We ask the
//! server which year is active via a year-range query; when the server
//! cannot answer, the id is derived locally from the calendar and the
//! tenant's rollover date.

use anyhow::{Context, bail};
use chrono::{Datelike, NaiveDate};

/// First school year the SIS counts from: yearid 0 is 1990-1991.
const BASE_YEAR: i32 = 1990;

/// Parse a `mm/dd` rollover date into (month, day).
///
/// A tenant config with a malformed rollover date cannot be trusted for
/// year arithmetic, so this is a hard error.
pub fn rollover_date(raw: &str) -> anyhow::Result<(u32, u32)> {
    let (month, day) = raw
        .split_once('/')
        .with_context(|| format!("rollover date {raw:?} is not mm/dd"))?;
    let month: u32 = month
        .parse()
        .with_context(|| format!("rollover month in {raw:?} is not a number"))?;
    let day: u32 = day
        .parse()
        .with_context(|| format!("rollover day in {raw:?} is not a number"))?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        bail!("rollover date {raw:?} is out of range");
    }
    Ok((month, day))
}

/// Whether `today` falls on or after the rollover date of its year.
fn rolled_over(today: NaiveDate, rollover: (u32, u32)) -> bool {
    (today.month(), today.day()) >= rollover
}

/// The `"YYYY-YYYY"` range of the school year containing `today`.
pub fn year_range(today: NaiveDate, rollover: (u32, u32)) -> String {
    let year = today.year();
    if rolled_over(today, rollover) {
        format!("{}-{}", year, year + 1)
    } else {
        format!("{}-{}", year - 1, year)
    }
}

/// Locally derived yearid, used when the server's year query fails.
pub fn fallback_year_id(today: NaiveDate, rollover: (u32, u32)) -> i64 {
    let year = today.year();
    let start = if rolled_over(today, rollover) {
        year
    } else {
        year - 1
    };
    i64::from(start - BASE_YEAR)
}
