#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};
use portcon::domain::error::PortconError;
use portcon::domain::market::{MarketClock, Timestamp};
use portcon::domain::optimizer::TargetWeights;
use portcon::domain::prices::{Close, PriceTable};
use portcon::ports::data_port::PriceDataPort;
use portcon::ports::weights_port::TargetWeightPort;
use std::cell::Cell;
use std::collections::HashMap;

/// In-memory price source. A close is visible from its market close on,
/// as with the CSV adapter.
pub struct MockDataPort {
    pub data: HashMap<String, Vec<Close>>,
    pub errors: HashMap<String, String>,
    pub clock: MarketClock,
    pub calls: Cell<usize>,
    pub sessions: Cell<usize>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            clock: MarketClock::default(),
            calls: Cell::new(0),
            sessions: Cell::new(0),
        }
    }

    pub fn with_closes(mut self, asset: &str, closes: Vec<Close>) -> Self {
        self.data.insert(asset.to_string(), closes);
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl PriceDataPort for MockDataPort {
    fn historical_closes(
        &self,
        assets: &[String],
        end_dt: Timestamp,
        start_dt: Option<Timestamp>,
    ) -> Result<PriceTable, PortconError> {
        self.calls.set(self.calls.get() + 1);
        let mut series = Vec::new();
        for asset in assets {
            if let Some(reason) = self.errors.get(asset) {
                return Err(PortconError::Data {
                    reason: reason.clone(),
                });
            }
            let closes = self
                .data
                .get(asset)
                .map(|closes| {
                    closes
                        .iter()
                        .filter(|c| {
                            let known_at = self.clock.close(c.date);
                            known_at <= end_dt && start_dt.is_none_or(|s| known_at >= s)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            series.push((asset.clone(), closes));
        }
        Ok(PriceTable::from_series(series))
    }

    fn begin_session(&self) {
        self.sessions.set(self.sessions.get() + 1);
    }
}

/// Keeps every submission in order.
#[derive(Default)]
pub struct RecordingSink {
    pub submissions: Vec<(Timestamp, TargetWeights)>,
}

impl TargetWeightPort for RecordingSink {
    fn submit(&mut self, dt: Timestamp, weights: &TargetWeights) -> Result<(), PortconError> {
        self.submissions.push((dt, weights.clone()));
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(count)
        .collect()
}

/// Deterministic wiggly closes on business days; `phase` and `period`
/// decorrelate assets from each other.
pub fn generate_closes(
    start: NaiveDate,
    count: usize,
    start_price: f64,
    phase: f64,
    period: f64,
) -> Vec<Close> {
    business_days(start, count)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let t = i as f64;
            Close {
                date,
                close: start_price * (1.0 + 0.001 * t + 0.02 * (t / period + phase).sin()),
            }
        })
        .collect()
}

pub fn gross(weights: &TargetWeights) -> f64 {
    weights.values().map(|w| w.abs()).sum()
}

/// A `<ASSET>.csv` body for the CSV adapter.
pub fn closes_csv(closes: &[Close]) -> String {
    let mut out = String::from("date,close\n");
    for c in closes {
        out.push_str(&format!("{},{}\n", c.date.format("%Y-%m-%d"), c.close));
    }
    out
}
