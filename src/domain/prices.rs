//! Historical close price table, indexed by date and columned by asset.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// A dated close observation for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Close {
    pub date: NaiveDate,
    pub close: f64,
}

/// Rows are dates in ascending order, columns are assets. A missing close
/// (asset not trading on that date) is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceTable {
    pub index: Vec<NaiveDate>,
    pub assets: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    pub fn empty(assets: Vec<String>) -> Self {
        PriceTable {
            index: Vec::new(),
            assets,
            rows: Vec::new(),
        }
    }

    /// Merge per-asset close series on the union of their dates.
    pub fn from_series(series: Vec<(String, Vec<Close>)>) -> Self {
        let assets: Vec<String> = series.iter().map(|(asset, _)| asset.clone()).collect();
        let width = assets.len();
        let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();

        for (col, (_, closes)) in series.iter().enumerate() {
            for c in closes {
                by_date.entry(c.date).or_insert_with(|| vec![None; width])[col] = Some(c.close);
            }
        }

        let (index, rows): (Vec<_>, Vec<_>) = by_date.into_iter().unzip();
        PriceTable {
            index,
            assets,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    pub fn close(&self, date: NaiveDate, asset: &str) -> Option<f64> {
        let col = self.column(asset)?;
        let row = self.index.binary_search(&date).ok()?;
        self.rows[row][col]
    }
}
