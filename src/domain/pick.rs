//! Picks emitted by external scoring algorithms.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub ticker: String,
    pub algorithm: String,
    pub pick_date: NaiveDate,
    pub entry_price: f64,
    pub score: Option<f64>,
}

impl Pick {
    /// Only picks with a positive entry price can be traded.
    pub fn is_eligible(&self) -> bool {
        self.entry_price > 0.0 && self.entry_price.is_finite()
    }

    pub fn in_window(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.pick_date >= start && self.pick_date <= end
    }
}

/// Eligible picks inside `[start, end]`, in their original order.
pub fn picks_in_window(picks: &[Pick], start: NaiveDate, end: NaiveDate) -> Vec<Pick> {
    picks
        .iter()
        .filter(|p| p.is_eligible() && p.in_window(start, end))
        .cloned()
        .collect()
}

/// Sort picks by date, keeping the store order for picks on the same day.
pub fn sort_by_date(mut picks: Vec<Pick>) -> Vec<Pick> {
    picks.sort_by_key(|p| p.pick_date);
    picks
}

/// Distinct tickers in first-seen order.
pub fn tickers(picks: &[Pick]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    picks
        .iter()
        .filter(|p| seen.insert(p.ticker.as_str()))
        .map(|p| p.ticker.clone())
        .collect()
}
