//! Daily OHLCV bar representation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl DailyBar {
    /// True when the bar's range touches `price` or goes below it.
    pub fn reaches_low(&self, price: f64) -> bool {
        self.low <= price
    }

    /// True when the bar's range touches `price` or goes above it.
    pub fn reaches_high(&self, price: f64) -> bool {
        self.high >= price
    }
}
