//! Grid search over take-profit, stop-loss and hold-days.
//!
//! Callers pass picks and bars already restricted to the window being
//! searched; the optimizer never reaches outside what it is given.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backtest::run_backtest;
use super::metrics::Metrics;
use super::pick::Pick;
use super::price_history::PriceHistory;
use super::risk_params::{DISABLED_PCT, RiskParams};

/// Candidates with fewer trades than this are never selected.
pub const MIN_TRADES_FOR_ELIGIBILITY: usize = 2;

// Fixed blend weights. Kept as-is for compatibility with stored results;
// they were chosen by hand and are a candidate for tuning.
pub const WIN_RATE_WEIGHT: f64 = 0.3;
pub const AVG_RETURN_WEIGHT: f64 = 5.0;
pub const PROFIT_FACTOR_WEIGHT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub take_profit: Vec<f64>,
    pub stop_loss: Vec<f64>,
    pub max_hold_days: Vec<u32>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid {
            take_profit: vec![5.0, 10.0, 15.0, 20.0, DISABLED_PCT],
            stop_loss: vec![3.0, 5.0, 8.0, 10.0, DISABLED_PCT],
            max_hold_days: vec![5, 10, 20],
        }
    }
}

impl ParamGrid {
    pub fn size(&self) -> usize {
        self.take_profit.len() * self.stop_loss.len() * self.max_hold_days.len()
    }

    /// Every combination in take-profit, stop-loss, hold-days order, sharing
    /// the cost and sizing fields of `base`.
    pub fn candidates(&self, base: &RiskParams) -> Vec<RiskParams> {
        let mut out = Vec::with_capacity(self.size());
        for &tp in &self.take_profit {
            for &sl in &self.stop_loss {
                for &hold in &self.max_hold_days {
                    out.push(base.with_exits(tp, sl, hold));
                }
            }
        }
        out
    }
}

/// winRate * 0.3 + avgReturn * 5 + profitFactor * 10, with win rate and
/// average return in percent.
pub fn score(metrics: &Metrics) -> f64 {
    metrics.win_rate * WIN_RATE_WEIGHT
        + metrics.avg_return * AVG_RETURN_WEIGHT
        + metrics.profit_factor * PROFIT_FACTOR_WEIGHT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub params: RiskParams,
    pub metrics: Metrics,
    pub score: f64,
    pub candidates_evaluated: usize,
    pub candidates_eligible: usize,
}

struct Best {
    params: RiskParams,
    metrics: Metrics,
    score: f64,
}

/// Backtest every grid cell and keep the highest score among cells with at
/// least [`MIN_TRADES_FOR_ELIGIBILITY`] trades. Ties keep the earlier cell.
/// Returns `None` when no cell is eligible.
pub fn grid_search(
    picks: &[Pick],
    history: &PriceHistory,
    grid: &ParamGrid,
    base: &RiskParams,
    initial_capital: f64,
) -> Option<OptimizationResult> {
    let candidates = grid.candidates(base);
    let evaluated = candidates.len();

    let (best, eligible) = candidates.into_iter().fold(
        (None::<Best>, 0usize),
        |(best, eligible), params| {
            let metrics = run_backtest(picks, history, &params, initial_capital).metrics();
            if metrics.total_trades < MIN_TRADES_FOR_ELIGIBILITY {
                debug!(%params, trades = metrics.total_trades, "grid cell ineligible");
                return (best, eligible);
            }

            let cell_score = score(&metrics);
            debug!(%params, trades = metrics.total_trades, score = cell_score, "grid cell scored");
            let best = match best {
                Some(current) if current.score >= cell_score => Some(current),
                _ => Some(Best {
                    params,
                    metrics,
                    score: cell_score,
                }),
            };
            (best, eligible + 1)
        },
    );

    best.map(|b| OptimizationResult {
        params: b.params,
        metrics: b.metrics,
        score: b.score,
        candidates_evaluated: evaluated,
        candidates_eligible: eligible,
    })
}
