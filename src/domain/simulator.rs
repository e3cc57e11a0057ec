//! Trade outcome simulation.
//!
//! Resolves one pick into one trade by walking the daily bars that follow
//! the pick date. Slippage is applied against the trader on both sides, and
//! the stop is checked before the target on every bar so that a bar whose
//! range covers both prices books the loss.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::daily_bar::DailyBar;
use super::pick::Pick;
use super::risk_params::RiskParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxHold,
    EndOfData,
    NoPriceData,
}

impl ExitReason {
    pub const ALL: [ExitReason; 5] = [
        ExitReason::StopLoss,
        ExitReason::TakeProfit,
        ExitReason::MaxHold,
        ExitReason::EndOfData,
        ExitReason::NoPriceData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::MaxHold => "max_hold",
            ExitReason::EndOfData => "end_of_data",
            ExitReason::NoPriceData => "no_price_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ticker: String,
    pub pick_date: NaiveDate,
    /// Slippage-adjusted entry price.
    pub entry_price: f64,
    /// Slippage-adjusted exit price.
    pub exit_price: f64,
    pub exit_date: NaiveDate,
    pub exit_reason: ExitReason,
    pub shares: u64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub return_pct: f64,
    pub hold_days: u32,
}

impl Trade {
    /// Breakeven trades count as losses.
    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }
}

/// Buy side: execution_price = market_price * (1 + slippage_pct / 100)
pub fn apply_slippage_entry(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Sell side: execution_price = market_price * (1 - slippage_pct / 100)
pub fn apply_slippage_exit(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Whole shares purchasable with `allocation` at `price`.
pub fn shares_for(allocation: f64, price: f64) -> u64 {
    if price <= 0.0 || !price.is_finite() || allocation <= 0.0 || !allocation.is_finite() {
        return 0;
    }
    (allocation / price).floor() as u64
}

struct RawExit {
    price: f64,
    date: NaiveDate,
    reason: ExitReason,
    hold_days: u32,
}

/// Simulate one pick against the bars strictly after its date.
///
/// Only the first `max_hold_days` bars are considered. Per bar:
/// 1. low <= stop price: exit `stop_loss` at the stop price
/// 2. high >= target price: exit `take_profit` at the target price
/// 3. bars held >= max_hold_days: exit `max_hold` at the close
///
/// Running out of bars exits `end_of_data` at the last close. With no bars
/// at all the trade is a `no_price_data` loss of two commissions.
pub fn simulate_trade(
    pick: &Pick,
    bars: &[DailyBar],
    params: &RiskParams,
    allocation: f64,
) -> Trade {
    let entry = apply_slippage_entry(pick.entry_price, params.slippage_pct);
    let shares = shares_for(allocation, entry);
    let stop = params.stop_price(entry);
    let target = params.target_price(entry);
    let window = &bars[..bars.len().min(params.hold_limit())];

    let triggered = window.iter().enumerate().find_map(|(i, bar)| {
        let held = i as u32 + 1;
        if let Some(price) = stop.filter(|&s| bar.reaches_low(s)) {
            return Some(RawExit {
                price,
                date: bar.trade_date,
                reason: ExitReason::StopLoss,
                hold_days: held,
            });
        }
        if let Some(price) = target.filter(|&t| bar.reaches_high(t)) {
            return Some(RawExit {
                price,
                date: bar.trade_date,
                reason: ExitReason::TakeProfit,
                hold_days: held,
            });
        }
        if held >= params.max_hold_days {
            return Some(RawExit {
                price: bar.close,
                date: bar.trade_date,
                reason: ExitReason::MaxHold,
                hold_days: held,
            });
        }
        None
    });

    let raw = triggered.or_else(|| {
        window.last().map(|bar| RawExit {
            price: bar.close,
            date: bar.trade_date,
            reason: ExitReason::EndOfData,
            hold_days: window.len() as u32,
        })
    });

    match raw {
        Some(raw) => {
            let exit = apply_slippage_exit(raw.price, params.slippage_pct);
            close_trade(pick, entry, exit, shares, raw, params.commission)
        }
        None => close_trade(
            pick,
            entry,
            entry,
            shares,
            RawExit {
                price: entry,
                date: pick.pick_date,
                reason: ExitReason::NoPriceData,
                hold_days: 0,
            },
            params.commission,
        ),
    }
}

fn close_trade(
    pick: &Pick,
    entry: f64,
    exit: f64,
    shares: u64,
    raw: RawExit,
    commission: f64,
) -> Trade {
    let gross_pnl = (exit - entry) * shares as f64;
    let net_pnl = gross_pnl - 2.0 * commission;
    // One-share notional keeps the sign of the return when nothing was bought.
    let notional = entry * shares.max(1) as f64;
    let return_pct = if notional > 0.0 {
        net_pnl / notional * 100.0
    } else {
        0.0
    };

    Trade {
        ticker: pick.ticker.clone(),
        pick_date: pick.pick_date,
        entry_price: entry,
        exit_price: exit,
        exit_date: raw.date,
        exit_reason: raw.reason,
        shares,
        gross_pnl,
        net_pnl,
        return_pct,
        hold_days: raw.hold_days,
    }
}
