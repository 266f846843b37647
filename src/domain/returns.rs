//! Return series construction from close prices.
//!
//! Log mode:    r[t] = ln(P[t] / P[t-1])
//! Simple mode: r[t] = (P[t] - P[t-1]) / P[t-1]
//!
//! The first price row has no prior period and never produces a return.
//! Rows where any asset lacks a return are dropped, so every surviving row
//! is a complete cross-section.

use crate::domain::error::PortconError;
use crate::domain::prices::PriceTable;
use chrono::{Duration, NaiveDate};
use nalgebra::DMatrix;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    #[default]
    Log,
    Simple,
}

impl ReturnMode {
    pub fn period_return(self, prev: f64, curr: f64) -> f64 {
        match self {
            ReturnMode::Log => (curr / prev).ln(),
            ReturnMode::Simple => (curr - prev) / prev,
        }
    }
}

impl FromStr for ReturnMode {
    type Err = PortconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "log" | "logarithmic" => Ok(ReturnMode::Log),
            "simple" | "arithmetic" => Ok(ReturnMode::Simple),
            other => Err(PortconError::configuration(format!(
                "unknown return mode '{other}', expected log or simple"
            ))),
        }
    }
}

impl fmt::Display for ReturnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnMode::Log => write!(f, "log"),
            ReturnMode::Simple => write!(f, "simple"),
        }
    }
}

/// Period returns; `values` is observations x assets.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    pub index: Vec<NaiveDate>,
    pub assets: Vec<String>,
    pub values: DMatrix<f64>,
}

impl ReturnSeries {
    pub fn from_prices(prices: &PriceTable, mode: ReturnMode) -> Self {
        let width = prices.assets.len();
        let mut index = Vec::new();
        let mut flat = Vec::new();

        if width > 0 {
            for t in 1..prices.rows.len() {
                let prev = &prices.rows[t - 1];
                let curr = &prices.rows[t];
                let row: Option<Vec<f64>> = prev
                    .iter()
                    .zip(curr)
                    .map(|(p, c)| match (p, c) {
                        (Some(p), Some(c)) => {
                            let r = mode.period_return(*p, *c);
                            r.is_finite().then_some(r)
                        }
                        _ => None,
                    })
                    .collect();

                if let Some(row) = row {
                    index.push(prices.index[t]);
                    flat.extend(row);
                }
            }
        }

        ReturnSeries {
            values: DMatrix::from_row_slice(index.len(), width, &flat),
            index,
            assets: prices.assets.clone(),
        }
    }

    /// Keep only rows within `window` of the last timestamp present.
    pub fn trailing(self, window: Duration) -> Self {
        let Some(&last) = self.index.last() else {
            return self;
        };
        let Some(cutoff) = last.checked_sub_signed(window) else {
            return self;
        };
        let keep: Vec<usize> = (0..self.index.len())
            .filter(|&t| self.index[t] >= cutoff)
            .collect();
        if keep.len() == self.index.len() {
            return self;
        }

        let values = self.values.select_rows(keep.iter());
        let index = keep.iter().map(|&t| self.index[t]).collect();
        ReturnSeries {
            index,
            assets: self.assets,
            values,
        }
    }

    pub fn observations(&self) -> usize {
        self.values.nrows()
    }

    pub fn asset_count(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.observations() == 0
    }

    /// Arithmetic mean of each asset's returns.
    pub fn mean(&self) -> Vec<f64> {
        let n = self.observations() as f64;
        self.values
            .column_iter()
            .map(|col| col.sum() / n)
            .collect()
    }

    /// Sample standard deviation (n - 1 denominator) of each asset's returns.
    pub fn std_dev(&self) -> Vec<f64> {
        let n = self.observations();
        self.mean()
            .iter()
            .zip(self.values.column_iter())
            .map(|(m, col)| {
                let ss: f64 = col.iter().map(|r| (r - m) * (r - m)).sum();
                (ss / (n as f64 - 1.0)).sqrt()
            })
            .collect()
    }
}

/// How a model turns prices into returns: the return mode plus an optional
/// trailing window ("tailing" model variants).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReturnSettings {
    pub mode: ReturnMode,
    pub trailing_window: Option<Duration>,
}

impl ReturnSettings {
    pub fn new(mode: ReturnMode) -> Self {
        ReturnSettings {
            mode,
            trailing_window: None,
        }
    }

    pub fn with_trailing_window(mut self, window: Duration) -> Self {
        self.trailing_window = Some(window);
        self
    }

    pub fn build(&self, prices: &PriceTable) -> ReturnSeries {
        let series = ReturnSeries::from_prices(prices, self.mode);
        match self.trailing_window {
            Some(window) => series.trailing(window),
            None => series,
        }
    }
}
