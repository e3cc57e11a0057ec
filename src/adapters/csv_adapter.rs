//! CSV directory data adapter.
//!
//! Layout under the base directory:
//!
//! ```text
//! picks.csv            source,algorithm,ticker,pick_date,entry_price,score
//! bars/<TICKER>.csv    date,open,high,low,close,volume
//! ```

use crate::domain::daily_bar::DailyBar;
use crate::domain::error::PicklabError;
use crate::domain::pick::{Pick, sort_by_date};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct PickRow {
    source: String,
    algorithm: String,
    ticker: String,
    pick_date: NaiveDate,
    entry_price: f64,
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BarRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

fn read_err(path: &Path, e: impl std::fmt::Display) -> PicklabError {
    PicklabError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    }
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PicklabError> {
        let dir = config
            .get_string("csv", "dir")
            .ok_or_else(|| PicklabError::ConfigMissing {
                section: "csv".into(),
                key: "dir".into(),
            })?;
        Ok(Self::new(PathBuf::from(dir)))
    }

    fn picks_path(&self) -> PathBuf {
        self.base_path.join("picks.csv")
    }

    /// Tickers name files under `bars/`, so they must be a single plain
    /// path segment.
    fn bars_path(&self, ticker: &str) -> Result<PathBuf, PicklabError> {
        let plain = !ticker.is_empty()
            && !ticker.starts_with('.')
            && !ticker.contains(['/', '\\', ':']);
        if !plain {
            return Err(PicklabError::Database {
                reason: format!("ticker '{ticker}' is not a valid bar file name"),
            });
        }
        Ok(self.base_path.join("bars").join(format!("{ticker}.csv")))
    }

    fn read_picks(&self) -> Result<Vec<PickRow>, PicklabError> {
        let path = self.picks_path();
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| read_err(&path, e))?;
        rdr.deserialize()
            .collect::<Result<Vec<PickRow>, _>>()
            .map_err(|e| read_err(&path, e))
    }

    /// Bars for one ticker; a ticker without a file simply has no bars.
    fn read_bars(&self, ticker: &str) -> Result<Vec<BarRow>, PicklabError> {
        let path = self.bars_path(ticker)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_err(&path, e)),
        };
        csv::Reader::from_reader(file)
            .deserialize()
            .collect::<Result<Vec<BarRow>, _>>()
            .map_err(|e| read_err(&path, e))
    }
}

impl MarketDataPort for CsvAdapter {
    fn fetch_picks(
        &self,
        source: &str,
        algorithm: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Pick>, PicklabError> {
        let picks = self
            .read_picks()?
            .into_iter()
            .filter(|r| r.source == source && r.algorithm == algorithm)
            .filter(|r| r.pick_date >= start_date && r.pick_date <= end_date)
            .map(|r| Pick {
                ticker: r.ticker,
                algorithm: r.algorithm,
                pick_date: r.pick_date,
                entry_price: r.entry_price,
                score: r.score,
            })
            .collect();
        Ok(sort_by_date(picks))
    }

    fn fetch_bars(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyBar>, PicklabError> {
        let mut bars = Vec::new();
        for ticker in tickers {
            let mut rows: Vec<BarRow> = self
                .read_bars(ticker)?
                .into_iter()
                .filter(|r| r.date >= start_date && r.date <= end_date)
                .collect();
            rows.sort_by_key(|r| r.date);
            bars.extend(rows.into_iter().map(|r| DailyBar {
                ticker: ticker.clone(),
                trade_date: r.date,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
            }));
        }
        Ok(bars)
    }

    fn list_algorithms(&self, source: &str) -> Result<Vec<String>, PicklabError> {
        let names: BTreeSet<String> = self
            .read_picks()?
            .into_iter()
            .filter(|r| r.source == source)
            .map(|r| r.algorithm)
            .collect();
        Ok(names.into_iter().collect())
    }

    fn get_pick_range(
        &self,
        source: &str,
        algorithm: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PicklabError> {
        let dates: Vec<NaiveDate> = self
            .read_picks()?
            .into_iter()
            .filter(|r| r.source == source && r.algorithm == algorithm && r.entry_price > 0.0)
            .map(|r| r.pick_date)
            .collect();
        Ok(dates
            .iter()
            .min()
            .zip(dates.iter().max())
            .map(|(&min, &max)| (min, max, dates.len())))
    }
}
