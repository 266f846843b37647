//! CSV daily-bar price adapter.
//!
//! One file per asset, `<ASSET>.csv`, with a header row. The `date`
//! column (`YYYY-MM-DD`) and the `close` column (or `adj_close` when there
//! is no `close`) are located by name; other columns are ignored.
//!
//! A daily close becomes known at the market close of its date, so a
//! query ending before 16:00 local never sees that day's bar.

use crate::domain::error::PortconError;
use crate::domain::market::{MarketClock, Timestamp};
use crate::domain::prices::{Close, PriceTable};
use crate::ports::data_port::PriceDataPort;
use chrono::NaiveDate;
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvPriceData {
    base_path: PathBuf,
    clock: MarketClock,
}

impl CsvPriceData {
    pub fn new(base_path: PathBuf, clock: MarketClock) -> Self {
        Self { base_path, clock }
    }

    fn csv_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{asset}.csv"))
    }

    /// Every close in the asset's file, sorted by date.
    pub fn read_closes(&self, asset: &str) -> Result<Vec<Close>, PortconError> {
        let path = self.csv_path(asset);
        let content = fs::read_to_string(&path).map_err(|e| PortconError::Data {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| PortconError::Data {
                reason: format!("{}: CSV header error: {e}", path.display()),
            })?
            .clone();
        let find = |names: &[&str]| {
            names.iter().find_map(|name| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(name))
            })
        };
        let date_col = find(&["date"]).ok_or_else(|| PortconError::Data {
            reason: format!("{}: missing date column", path.display()),
        })?;
        let close_col = find(&["close", "adj_close", "adj close"]).ok_or_else(|| {
            PortconError::Data {
                reason: format!("{}: missing close column", path.display()),
            }
        })?;

        let mut closes = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| PortconError::Data {
                reason: format!("{}: CSV parse error: {e}", path.display()),
            })?;
            let field = |col: usize| record.get(col).map(str::trim).unwrap_or("");

            let date = NaiveDate::parse_from_str(field(date_col), "%Y-%m-%d").map_err(|e| {
                PortconError::Data {
                    reason: format!("{} row {}: invalid date: {e}", path.display(), line + 1),
                }
            })?;
            let raw = field(close_col);
            if raw.is_empty() {
                continue;
            }
            let close: f64 = raw.parse().map_err(|e| PortconError::Data {
                reason: format!("{} row {}: invalid close value: {e}", path.display(), line + 1),
            })?;

            closes.push(Close { date, close });
        }

        closes.sort_by_key(|c| c.date);
        closes.dedup_by_key(|c| c.date);
        debug!(asset, rows = closes.len(), "loaded closes");
        Ok(closes)
    }

    /// Assets with a CSV file in the data directory.
    pub fn available_assets(&self) -> Result<Vec<String>, PortconError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| PortconError::Data {
            reason: format!(
                "failed to read directory {}: {e}",
                self.base_path.display()
            ),
        })?;

        let mut assets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PortconError::Data {
                reason: format!("directory entry error: {e}"),
            })?;
            let name = entry.file_name();
            if let Some(asset) = name.to_string_lossy().strip_suffix(".csv") {
                assets.push(asset.to_string());
            }
        }

        assets.sort();
        Ok(assets)
    }
}

impl PriceDataPort for CsvPriceData {
    fn historical_closes(
        &self,
        assets: &[String],
        end_dt: Timestamp,
        start_dt: Option<Timestamp>,
    ) -> Result<PriceTable, PortconError> {
        let visible = |date: NaiveDate| {
            let known_at = self.clock.close(date);
            known_at <= end_dt && start_dt.is_none_or(|start| known_at >= start)
        };

        // per-asset reads are independent
        let series = assets
            .par_iter()
            .map(|asset| -> Result<(String, Vec<Close>), PortconError> {
                let closes: Vec<Close> = self
                    .read_closes(asset)?
                    .into_iter()
                    .filter(|c| visible(c.date))
                    .collect();
                Ok((asset.clone(), closes))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PriceTable::from_series(series))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join("SPY.csv"),
            "Date,Open,High,Low,Close,Volume\n\
             2024-01-16,100.0,110.0,90.0,105.0,50000\n\
             2024-01-15,99.0,101.0,98.0,100.0,40000\n\
             2024-01-17,110.0,120.0,105.0,115.0,55000\n",
        )
        .unwrap();
        fs::write(path.join("QQQ.csv"), "date,adj_close\n2024-01-16,400.5\n2024-01-17,\n").unwrap();
        fs::write(path.join("BAD.csv"), "date,close\n16/01/2024,1.0\n").unwrap();
        fs::write(path.join("notes.txt"), "ignored").unwrap();

        (dir, path)
    }

    fn adapter(path: PathBuf) -> CsvPriceData {
        CsvPriceData::new(path, MarketClock::default())
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn read_closes_sorts_and_locates_columns() {
        let (_dir, path) = setup_test_data();
        let closes = adapter(path).read_closes("SPY").unwrap();
        assert_eq!(closes.len(), 3);
        assert_eq!(closes[0], Close { date: d(15), close: 100.0 });
        assert_eq!(closes[2].close, 115.0);
    }

    #[test]
    fn adj_close_fallback_skips_blank_values() {
        let (_dir, path) = setup_test_data();
        let closes = adapter(path).read_closes("QQQ").unwrap();
        assert_eq!(closes, vec![Close { date: d(16), close: 400.5 }]);
    }

    #[test]
    fn closes_become_visible_at_market_close() {
        let (_dir, path) = setup_test_data();
        let adapter = adapter(path);
        let clock = MarketClock::default();
        let assets = vec!["SPY".to_string()];

        let before_close = adapter
            .historical_closes(&assets, clock.open(d(17)), None)
            .unwrap();
        assert_eq!(before_close.index, vec![d(15), d(16)]);

        let at_close = adapter
            .historical_closes(&assets, clock.close(d(17)), None)
            .unwrap();
        assert_eq!(at_close.len(), 3);

        let windowed = adapter
            .historical_closes(&assets, clock.close(d(17)), Some(clock.start_of_day(d(16))))
            .unwrap();
        assert_eq!(windowed.index, vec![d(16), d(17)]);
    }

    #[test]
    fn no_data_yet_is_empty_not_error() {
        let (_dir, path) = setup_test_data();
        let table = adapter(path)
            .historical_closes(&["SPY".to_string()], MarketClock::default().close(d(1)), None)
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.assets, vec!["SPY"]);
    }

    #[test]
    fn merges_assets_on_date_union() {
        let (_dir, path) = setup_test_data();
        let table = adapter(path)
            .historical_closes(
                &["QQQ".to_string(), "SPY".to_string()],
                MarketClock::default().close(d(17)),
                None,
            )
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.close(d(16), "QQQ"), Some(400.5));
        assert_eq!(table.close(d(15), "QQQ"), None);
    }

    #[test]
    fn missing_file_is_data_error() {
        let (_dir, path) = setup_test_data();
        let result = adapter(path).historical_closes(
            &["XYZ".to_string()],
            MarketClock::default().close(d(17)),
            None,
        );
        assert!(matches!(result, Err(PortconError::Data { .. })));
    }

    #[test]
    fn malformed_date_is_data_error() {
        let (_dir, path) = setup_test_data();
        let result = adapter(path).read_closes("BAD");
        assert!(matches!(result, Err(PortconError::Data { reason }) if reason.contains("invalid date")));
    }

    #[test]
    fn available_assets_lists_csv_files() {
        let (_dir, path) = setup_test_data();
        assert_eq!(adapter(path).available_assets().unwrap(), vec!["BAD", "QQQ", "SPY"]);
    }
}
