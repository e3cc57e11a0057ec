//! Pre-fetched per-ticker bar series.
//!
//! The simulator and optimizer read bars only through [`PriceHistory`], never
//! from a store, so every run over the same history is reproducible.

use crate::domain::daily_bar::DailyBar;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    series: HashMap<String, Vec<DailyBar>>,
}

impl PriceHistory {
    /// Group bars by ticker, each series sorted ascending by trade date.
    /// Duplicate dates keep the last bar supplied.
    pub fn new(bars: Vec<DailyBar>) -> Self {
        let mut series: HashMap<String, Vec<DailyBar>> = HashMap::new();
        for bar in bars {
            series.entry(bar.ticker.clone()).or_default().push(bar);
        }
        for bars in series.values_mut() {
            bars.sort_by_key(|b| b.trade_date);
            dedup_keep_last(bars);
        }
        Self { series }
    }

    pub fn ticker_count(&self) -> usize {
        self.series.len()
    }

    pub fn bar_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn series(&self, ticker: &str) -> &[DailyBar] {
        self.series.get(ticker).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Up to `limit` bars strictly after `date`, in date order.
    pub fn bars_after(&self, ticker: &str, date: NaiveDate, limit: usize) -> &[DailyBar] {
        let bars = self.series(ticker);
        let start = bars.partition_point(|b| b.trade_date <= date);
        let end = bars.len().min(start.saturating_add(limit));
        &bars[start..end]
    }

    /// A copy holding only bars dated inside `[start, end]`.
    pub fn restricted(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let series = self
            .series
            .iter()
            .map(|(ticker, bars)| {
                let lo = bars.partition_point(|b| b.trade_date < start);
                let hi = bars.partition_point(|b| b.trade_date <= end);
                (ticker.clone(), bars[lo..hi.max(lo)].to_vec())
            })
            .filter(|(_, bars)| !bars.is_empty())
            .collect();
        Self { series }
    }
}

fn dedup_keep_last(bars: &mut Vec<DailyBar>) {
    let mut out: Vec<DailyBar> = Vec::with_capacity(bars.len());
    for bar in bars.drain(..) {
        match out.last_mut() {
            Some(prev) if prev.trade_date == bar.trade_date => *prev = bar,
            _ => out.push(bar),
        }
    }
    *bars = out;
}
