#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use picklab::domain::daily_bar::DailyBar;
use picklab::domain::error::PicklabError;
use picklab::domain::pick::Pick;
use picklab::ports::data_port::MarketDataPort;
use std::cell::Cell;
use std::collections::HashMap;

/// In-memory market data keyed by (source, algorithm), counting every call.
pub struct MockDataPort {
    pub picks: HashMap<(String, String), Vec<Pick>>,
    pub bars: HashMap<String, Vec<DailyBar>>,
    pub errors: HashMap<String, String>,
    pub calls: Cell<usize>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            picks: HashMap::new(),
            bars: HashMap::new(),
            errors: HashMap::new(),
            calls: Cell::new(0),
        }
    }

    pub fn with_market(mut self, source: &str, market: Market) -> Self {
        let algorithm = market
            .picks
            .first()
            .map(|p| p.algorithm.clone())
            .unwrap_or_default();
        self.picks
            .insert((source.to_string(), algorithm), market.picks);
        for bar in market.bars {
            self.bars.entry(bar.ticker.clone()).or_default().push(bar);
        }
        self
    }

    /// Every call for `ticker` bars fails with `reason`.
    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    fn tick(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl MarketDataPort for MockDataPort {
    fn fetch_picks(
        &self,
        source: &str,
        algorithm: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Pick>, PicklabError> {
        self.tick();
        Ok(self
            .picks
            .get(&(source.to_string(), algorithm.to_string()))
            .map(|picks| {
                picks
                    .iter()
                    .filter(|p| p.pick_date >= start_date && p.pick_date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_bars(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyBar>, PicklabError> {
        self.tick();
        let mut out = Vec::new();
        for ticker in tickers {
            if let Some(reason) = self.errors.get(ticker) {
                return Err(PicklabError::Database {
                    reason: reason.clone(),
                });
            }
            if let Some(bars) = self.bars.get(ticker) {
                out.extend(
                    bars.iter()
                        .filter(|b| b.trade_date >= start_date && b.trade_date <= end_date)
                        .cloned(),
                );
            }
        }
        Ok(out)
    }

    fn list_algorithms(&self, source: &str) -> Result<Vec<String>, PicklabError> {
        self.tick();
        let mut names: Vec<String> = self
            .picks
            .keys()
            .filter(|(s, _)| s == source)
            .map(|(_, a)| a.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn get_pick_range(
        &self,
        source: &str,
        algorithm: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PicklabError> {
        self.tick();
        let dates: Vec<NaiveDate> = self
            .picks
            .get(&(source.to_string(), algorithm.to_string()))
            .map(|picks| {
                picks
                    .iter()
                    .filter(|p| p.is_eligible())
                    .map(|p| p.pick_date)
                    .collect()
            })
            .unwrap_or_default();
        match (dates.iter().min(), dates.iter().max()) {
            (Some(&min), Some(&max)) => Ok(Some((min, max, dates.len()))),
            _ => Ok(None),
        }
    }
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn make_pick(ticker: &str, algorithm: &str, date: NaiveDate, entry: f64) -> Pick {
    Pick {
        ticker: ticker.to_string(),
        algorithm: algorithm.to_string(),
        pick_date: date,
        entry_price: entry,
        score: None,
    }
}

pub fn make_bar(ticker: &str, date: NaiveDate, high: f64, low: f64, close: f64) -> DailyBar {
    DailyBar {
        ticker: ticker.to_string(),
        trade_date: date,
        open: close,
        high,
        low,
        close,
        volume: 1_000,
    }
}

/// Picks and the bars that follow them.
pub struct Market {
    pub picks: Vec<Pick>,
    pub bars: Vec<DailyBar>,
}

/// One pick every `every` days for `days` days. Each pick gets its own
/// ticker whose closes follow `path(pick_number)` as percent moves from the
/// entry price on the days after the pick.
pub fn market(
    algorithm: &str,
    start: NaiveDate,
    days: i64,
    every: usize,
    path: impl Fn(usize) -> Vec<f64>,
) -> Market {
    let mut picks = Vec::new();
    let mut bars = Vec::new();
    for (n, offset) in (0..days).step_by(every).enumerate() {
        let date = start + Duration::days(offset);
        let ticker = format!("{}{n:03}", algorithm.to_uppercase());
        picks.push(make_pick(&ticker, algorithm, date, 100.0));
        for (k, pct) in path(n).into_iter().enumerate() {
            let close = 100.0 * (1.0 + pct / 100.0);
            bars.push(make_bar(
                &ticker,
                date + Duration::days(k as i64 + 1),
                close,
                close,
                close,
            ));
        }
    }
    Market { picks, bars }
}

/// Every pick climbs 1% a day for a week.
pub fn steady(algorithm: &str, days: i64) -> Market {
    market(algorithm, d("2024-01-01"), days, 2, |_| {
        (1..=7).map(|k| k as f64).collect()
    })
}

/// Picks alternate between a 6% pop and a 6% slide.
pub fn choppy(algorithm: &str, days: i64) -> Market {
    market(algorithm, d("2024-01-01"), days, 2, |n| {
        let sign = if n % 2 == 0 { 1.0 } else { -1.0 };
        (1..=7).map(|k| sign * 2.0 * k.min(3) as f64).collect()
    })
}
