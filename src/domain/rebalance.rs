//! Rebalance schedules.
//!
//! A schedule is generated once per session from (start, end, frequency,
//! pre_market) and reused for every tick's membership test. Times are
//! 09:30 (pre-market) or 16:00 (post-market) in the market clock's timezone.
//! Holiday calendars are not considered.
//!
//! `start` and `end` are instants: a candidate timestamp is kept only when
//! `start <= t <= end`. An `end` at midnight therefore excludes that day's
//! rebalance.

use crate::domain::error::PortconError;
use crate::domain::market::{MarketClock, Timestamp};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Default schedule length when no end is given.
pub const DEFAULT_SCHEDULE_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    /// A single rebalance at the start.
    BuyAndHold,
    /// Every business day.
    Daily,
    /// Once a week on the given business day.
    Weekly(Weekday),
    /// Last business day of each month.
    #[default]
    EndOfMonth,
}

impl Frequency {
    /// Parse a frequency tag; `weekday` is required for (and only read by)
    /// `weekly`.
    pub fn parse(tag: &str, weekday: Option<&str>) -> Result<Self, PortconError> {
        match tag.trim().to_lowercase().as_str() {
            "buy_and_hold" => Ok(Frequency::BuyAndHold),
            "daily" => Ok(Frequency::Daily),
            "end_of_month" => Ok(Frequency::EndOfMonth),
            "weekly" => {
                let weekday = weekday.ok_or_else(|| {
                    PortconError::configuration("weekly rebalance requires a weekday")
                })?;
                Ok(Frequency::Weekly(parse_weekday(weekday)?))
            }
            other => Err(PortconError::configuration(format!(
                "unknown rebalance frequency '{other}', expected buy_and_hold, daily, weekly or end_of_month"
            ))),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::BuyAndHold => write!(f, "buy_and_hold"),
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly(day) => write!(f, "weekly({})", day.to_string().to_uppercase()),
            Frequency::EndOfMonth => write!(f, "end_of_month"),
        }
    }
}

/// Three-letter business weekday, case-insensitive (`MON`..`FRI`).
pub fn parse_weekday(s: &str) -> Result<Weekday, PortconError> {
    let invalid = || {
        PortconError::configuration(format!(
            "'{s}' is not a valid weekday, expected one of MON, TUE, WED, THU, FRI"
        ))
    };
    let tag = s.trim().to_uppercase();
    if tag.len() != 3 {
        return Err(invalid());
    }
    match Weekday::from_str(&tag) {
        Ok(day) if is_business_day(day) => Ok(day),
        _ => Err(invalid()),
    }
}

fn is_business_day(day: Weekday) -> bool {
    !matches!(day, Weekday::Sat | Weekday::Sun)
}

fn last_business_day(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    while !is_business_day(day.weekday()) {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// Ordered, deduplicated rebalance timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceSchedule {
    times: BTreeSet<Timestamp>,
    frequency: Frequency,
    pre_market: bool,
}

impl RebalanceSchedule {
    pub fn generate(
        start: Timestamp,
        end: Timestamp,
        frequency: Frequency,
        pre_market: bool,
        clock: &MarketClock,
    ) -> Result<Self, PortconError> {
        if end < start {
            return Err(PortconError::configuration(format!(
                "rebalance end {end} is before start {start}"
            )));
        }

        let time = Self::market_time_for(pre_market);
        let first = clock.local_date(start);
        let last = clock.local_date(end);

        let times: BTreeSet<Timestamp> = match frequency {
            Frequency::BuyAndHold => BTreeSet::from([clock.at(first, time)]),
            Frequency::Daily | Frequency::Weekly(_) => first
                .iter_days()
                .take_while(|d| *d <= last)
                .filter(|d| match frequency {
                    Frequency::Weekly(day) => d.weekday() == day,
                    _ => is_business_day(d.weekday()),
                })
                .map(|d| clock.at(d, time))
                .filter(|t| *t >= start && *t <= end)
                .collect(),
            Frequency::EndOfMonth => {
                let mut out = BTreeSet::new();
                let (mut year, mut month) = (first.year(), first.month());
                while (year, month) <= (last.year(), last.month()) {
                    if let Some(day) = last_business_day(year, month) {
                        let t = clock.at(day, time);
                        if t >= start && t <= end {
                            out.insert(t);
                        }
                    }
                    (year, month) = if month == 12 {
                        (year + 1, 1)
                    } else {
                        (year, month + 1)
                    };
                }
                out
            }
        };

        Ok(RebalanceSchedule {
            times,
            frequency,
            pre_market,
        })
    }

    /// Generate with the defaults for missing pieces: end one year after
    /// start, end-of-month frequency.
    pub fn with_defaults(
        start: Timestamp,
        end: Option<Timestamp>,
        frequency: Option<Frequency>,
        pre_market: bool,
        clock: &MarketClock,
    ) -> Result<Self, PortconError> {
        let end = end
            .or_else(|| start.checked_add_signed(Duration::days(DEFAULT_SCHEDULE_DAYS)))
            .ok_or_else(|| {
                PortconError::configuration(format!("no default end one year after {start}"))
            })?;
        Self::generate(
            start,
            end,
            frequency.unwrap_or_default(),
            pre_market,
            clock,
        )
    }

    pub fn market_time_for(pre_market: bool) -> NaiveTime {
        if pre_market {
            MarketClock::open_time()
        } else {
            MarketClock::close_time()
        }
    }

    pub fn market_time(&self) -> NaiveTime {
        Self::market_time_for(self.pre_market)
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Exact membership; `dt` is never snapped to a nearby time.
    pub fn is_due(&self, dt: Timestamp) -> bool {
        self.times.contains(&dt)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timestamp> {
        self.times.iter()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}
