//! Market data port: read-only access to picks and daily bars.

use crate::domain::daily_bar::DailyBar;
use crate::domain::error::PicklabError;
use crate::domain::pick::Pick;
use chrono::NaiveDate;

pub trait MarketDataPort {
    /// Picks for one algorithm of one source, ascending by pick date.
    fn fetch_picks(
        &self,
        source: &str,
        algorithm: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Pick>, PicklabError>;

    /// Bars for every ticker in `tickers`, ascending by date within a ticker.
    fn fetch_bars(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyBar>, PicklabError>;

    /// Distinct algorithms that have picks under `source`.
    fn list_algorithms(&self, source: &str) -> Result<Vec<String>, PicklabError>;

    /// First and last pick date plus pick count, or `None` without picks.
    fn get_pick_range(
        &self,
        source: &str,
        algorithm: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PicklabError>;
}
