//! Portfolio backtest over a sequence of picks.
//!
//! Picks are processed strictly in the order given, each one fully resolved
//! before the next is sized, so capital compounds trade by trade. The run is
//! a fold over the picks: every step consumes the previous state and
//! returns a new one with one more trade, equity point or skip record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::metrics::Metrics;
use super::pick::Pick;
use super::price_history::PriceHistory;
use super::risk_params::RiskParams;
use super::simulator::{Trade, apply_slippage_entry, simulate_trade};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub index: usize,
    pub date: NaiveDate,
    pub capital: f64,
    pub peak: f64,
    pub drawdown_pct: f64,
}

impl EquityPoint {
    pub fn starting(date: NaiveDate, capital: f64) -> Self {
        EquityPoint {
            index: 0,
            date,
            capital,
            peak: capital,
            drawdown_pct: 0.0,
        }
    }

    fn next(&self, date: NaiveDate, capital: f64) -> Self {
        let peak = self.peak.max(capital);
        let drawdown_pct = if peak > 0.0 {
            (peak - capital) / peak * 100.0
        } else {
            0.0
        };
        EquityPoint {
            index: self.index + 1,
            date,
            capital,
            peak,
            drawdown_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPick {
    pub ticker: String,
    pub pick_date: NaiveDate,
    pub allocation: f64,
    pub required: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub skipped: Vec<SkippedPick>,
}

impl BacktestResult {
    pub fn metrics(&self) -> Metrics {
        Metrics::compute(&self.trades, &self.equity_curve, self.initial_capital)
    }
}

#[derive(Debug, Clone)]
struct BacktestState {
    capital: f64,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    skipped: Vec<SkippedPick>,
}

impl BacktestState {
    fn new(initial_capital: f64, start: Option<NaiveDate>) -> Self {
        BacktestState {
            capital: initial_capital,
            trades: Vec::new(),
            equity_curve: start
                .map(|date| vec![EquityPoint::starting(date, initial_capital)])
                .unwrap_or_default(),
            skipped: Vec::new(),
        }
    }

    fn step(mut self, pick: &Pick, history: &PriceHistory, params: &RiskParams) -> Self {
        let allocation = self.capital * params.position_size_pct / 100.0;
        let required =
            apply_slippage_entry(pick.entry_price, params.slippage_pct) + params.commission;

        if allocation.is_nan() || allocation < required {
            self.skipped.push(SkippedPick {
                ticker: pick.ticker.clone(),
                pick_date: pick.pick_date,
                allocation,
                required,
            });
            return self;
        }

        let bars = history.bars_after(&pick.ticker, pick.pick_date, params.hold_limit());
        let trade = simulate_trade(pick, bars, params, allocation);

        self.capital += trade.net_pnl;
        if let Some(point) = self.equity_curve.last().map(|last| last.next(trade.exit_date, self.capital)) {
            self.equity_curve.push(point);
        }
        self.trades.push(trade);
        self
    }

    fn finish(self, initial_capital: f64) -> BacktestResult {
        BacktestResult {
            initial_capital,
            final_capital: self.capital,
            trades: self.trades,
            equity_curve: self.equity_curve,
            skipped: self.skipped,
        }
    }
}

/// Run `picks` in order against pre-fetched bars with shared capital.
///
/// Ineligible picks (entry price <= 0) are ignored. A pick whose allocation
/// (capital * position size %) cannot cover one share plus commission is
/// recorded as skipped and never revisited.
pub fn run_backtest(
    picks: &[Pick],
    history: &PriceHistory,
    params: &RiskParams,
    initial_capital: f64,
) -> BacktestResult {
    let eligible: Vec<&Pick> = picks.iter().filter(|p| p.is_eligible()).collect();
    let start = eligible.first().map(|p| p.pick_date);

    eligible
        .into_iter()
        .fold(BacktestState::new(initial_capital, start), |state, pick| {
            state.step(pick, history, params)
        })
        .finish(initial_capital)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::daily_bar::DailyBar;
    use crate::domain::simulator::ExitReason;
    use chrono::Duration;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn make_pick(ticker: &str, date: &str, entry: f64) -> Pick {
        Pick {
            ticker: ticker.into(),
            algorithm: "momentum".into(),
            pick_date: d(date),
            entry_price: entry,
            score: None,
        }
    }

    /// `count` flat bars after `date` with a constant close.
    fn flat_bars(ticker: &str, date: &str, count: usize, close: f64) -> Vec<DailyBar> {
        (1..=count)
            .map(|i| DailyBar {
                ticker: ticker.into(),
                trade_date: d(date) + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000,
            })
            .collect()
    }

    fn params() -> RiskParams {
        RiskParams {
            take_profit_pct: 5.0,
            stop_loss_pct: 3.0,
            max_hold_days: 3,
            slippage_pct: 0.0,
            commission: 0.0,
            position_size_pct: 50.0,
        }
    }

    #[test]
    fn empty_picks_give_empty_result() {
        let result = run_backtest(&[], &PriceHistory::default(), &params(), 10_000.0);
        assert!(result.trades.is_empty());
        assert!(result.equity_curve.is_empty());
        assert!((result.final_capital - 10_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn capital_compounds_across_picks() {
        let mut bars = flat_bars("AAPL", "2024-01-01", 3, 110.0);
        bars.extend(flat_bars("MSFT", "2024-01-10", 3, 90.0));
        let history = PriceHistory::new(bars);
        let picks = vec![
            make_pick("AAPL", "2024-01-01", 100.0),
            make_pick("MSFT", "2024-01-10", 100.0),
        ];

        let result = run_backtest(&picks, &history, &params(), 10_000.0);

        assert_eq!(result.trades.len(), 2);
        // 50 shares take profit at 105: +250
        assert_eq!(result.trades[0].exit_reason, ExitReason::TakeProfit);
        assert!((result.trades[0].net_pnl - 250.0).abs() < 1e-9);
        // 5125 / 100 = 51 shares stopped at 97: -153
        assert_eq!(result.trades[1].shares, 51);
        assert_eq!(result.trades[1].exit_reason, ExitReason::StopLoss);
        assert!((result.trades[1].net_pnl - (-153.0)).abs() < 1e-9);
        assert!((result.final_capital - 10_097.0).abs() < 1e-9);
    }

    #[test]
    fn equity_curve_tracks_peak_and_drawdown() {
        let mut bars = flat_bars("AAPL", "2024-01-01", 3, 110.0);
        bars.extend(flat_bars("MSFT", "2024-01-10", 3, 90.0));
        let history = PriceHistory::new(bars);
        let picks = vec![
            make_pick("AAPL", "2024-01-01", 100.0),
            make_pick("MSFT", "2024-01-10", 100.0),
        ];

        let curve = run_backtest(&picks, &history, &params(), 10_000.0).equity_curve;

        assert_eq!(curve.len(), 3);
        assert_eq!(curve[0].index, 0);
        assert_eq!(curve[0].date, d("2024-01-01"));
        assert!((curve[1].peak - 10_250.0).abs() < 1e-9);
        assert!((curve[2].peak - 10_250.0).abs() < 1e-9);
        assert!((curve[2].drawdown_pct - 153.0 / 10_250.0 * 100.0).abs() < 1e-9);
        assert_eq!(curve[2].date, d("2024-01-11"));
    }

    #[test]
    fn unaffordable_pick_is_skipped() {
        let history = PriceHistory::new(flat_bars("BRK", "2024-01-01", 3, 600_000.0));
        let picks = vec![make_pick("BRK", "2024-01-01", 600_000.0)];

        let result = run_backtest(&picks, &history, &params(), 10_000.0);

        assert!(result.trades.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert!((result.skipped[0].allocation - 5_000.0).abs() < 1e-9);
        assert_eq!(result.equity_curve.len(), 1);
    }

    #[test]
    fn commission_counts_toward_affordability() {
        let history = PriceHistory::new(flat_bars("AAPL", "2024-01-01", 3, 100.0));
        let picks = vec![make_pick("AAPL", "2024-01-01", 100.0)];
        let p = RiskParams {
            commission: 1.0,
            position_size_pct: 1.0,
            ..params()
        };

        // allocation = 100, required = 101
        let result = run_backtest(&picks, &history, &p, 10_000.0);
        assert_eq!(result.skipped.len(), 1);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn ineligible_picks_are_ignored() {
        let history = PriceHistory::new(flat_bars("AAPL", "2024-01-01", 3, 100.0));
        let picks = vec![
            make_pick("AAPL", "2024-01-01", 0.0),
            make_pick("AAPL", "2024-01-01", 100.0),
        ];
        let result = run_backtest(&picks, &history, &params(), 10_000.0);
        assert_eq!(result.trades.len(), 1);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn missing_bars_book_commission_loss() {
        let picks = vec![make_pick("GONE", "2024-01-01", 50.0)];
        let p = RiskParams {
            commission: 2.5,
            ..params()
        };
        let result = run_backtest(&picks, &PriceHistory::default(), &p, 10_000.0);
        assert_eq!(result.trades[0].exit_reason, ExitReason::NoPriceData);
        assert!((result.final_capital - 9_995.0).abs() < 1e-9);
    }

    #[test]
    fn zero_hold_exits_on_first_bar() {
        let history = PriceHistory::new(flat_bars("AAPL", "2024-01-01", 3, 101.0));
        let picks = vec![make_pick("AAPL", "2024-01-01", 100.0)];
        let p = RiskParams {
            max_hold_days: 0,
            commission: 1.0,
            ..params()
        };

        let result = run_backtest(&picks, &history, &p, 10_000.0);
        let direct = simulate_trade(&picks[0], history.series("AAPL"), &p, 5_000.0);

        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::MaxHold);
        assert_eq!(trade.exit_date, d("2024-01-02"));
        assert_eq!(trade.hold_days, 1);
        // 50 shares * +1 - 2 commissions
        assert!((trade.net_pnl - 48.0).abs() < 1e-9);
        assert_eq!(trade, &direct);
    }

    #[test]
    fn metrics_use_initial_capital() {
        let history = PriceHistory::new(flat_bars("AAPL", "2024-01-01", 3, 110.0));
        let picks = vec![make_pick("AAPL", "2024-01-01", 100.0)];
        let metrics = run_backtest(&picks, &history, &params(), 10_000.0).metrics();
        assert_eq!(metrics.total_trades, 1);
        assert!((metrics.total_return - 2.5).abs() < 1e-9);
    }
}
