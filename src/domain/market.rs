//! Market clock: the timezone and session times every timestamp is
//! localized to.

use crate::domain::error::PortconError;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Weekday};
use chrono_tz::Tz;

/// An instant carrying the exchange's UTC offset on that day.
pub type Timestamp = DateTime<FixedOffset>;

/// IANA zone of the reference exchange.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketClock {
    pub tz: Tz,
}

impl Default for MarketClock {
    fn default() -> Self {
        MarketClock {
            tz: DEFAULT_TIMEZONE,
        }
    }
}

impl MarketClock {
    pub fn new(tz: Tz) -> Self {
        MarketClock { tz }
    }

    /// Parse an IANA zone name such as `America/New_York`.
    pub fn from_timezone(name: &str) -> Result<Self, PortconError> {
        name.trim()
            .parse::<Tz>()
            .map(MarketClock::new)
            .map_err(|_| {
                PortconError::configuration(format!(
                    "unknown timezone '{}', expected an IANA name such as America/New_York",
                    name.trim()
                ))
            })
    }

    pub fn open_time() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 30, 0).expect("valid constant time")
    }

    pub fn close_time() -> NaiveTime {
        NaiveTime::from_hms_opt(16, 0, 0).expect("valid constant time")
    }

    /// `date` at local wall-clock `time`, with that day's offset.
    ///
    /// A time repeated by a DST fall-back resolves to the earlier instant;
    /// a time skipped by a spring-forward is read with the offset in force
    /// before the jump.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> Timestamp {
        let local = date.and_time(time);
        match self.tz.from_local_datetime(&local).earliest() {
            Some(t) => t.fixed_offset(),
            None => {
                let before = self.tz.offset_from_utc_datetime(&local).fix();
                self.tz.from_utc_datetime(&(local - before)).fixed_offset()
            }
        }
    }

    pub fn open(&self, date: NaiveDate) -> Timestamp {
        self.at(date, Self::open_time())
    }

    /// The instant a daily close for `date` becomes known.
    pub fn close(&self, date: NaiveDate) -> Timestamp {
        self.at(date, Self::close_time())
    }

    pub fn start_of_day(&self, date: NaiveDate) -> Timestamp {
        self.at(date, NaiveTime::MIN)
    }

    /// The exchange-local calendar date of an instant.
    pub fn local_date(&self, t: Timestamp) -> NaiveDate {
        t.with_timezone(&self.tz).date_naive()
    }

    /// Open and close of every weekday in `[first, last]`, in order.
    pub fn session_ticks(&self, first: NaiveDate, last: NaiveDate) -> Vec<Timestamp> {
        first
            .iter_days()
            .take_while(|d| *d <= last)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .flat_map(|d| [self.open(d), self.close(d)])
            .collect()
    }
}
