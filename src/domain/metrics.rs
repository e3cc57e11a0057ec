//! Performance metrics over a trade sequence and its equity curve.
//!
//! Ratios measure consistency across trades, not annualized daily returns.
//! Every ratio guards its denominator and falls back to a fixed sentinel, so
//! the optimizer can rank candidates without NaN or infinity leaking into a
//! comparison.

use serde::{Deserialize, Serialize};

use super::backtest::EquityPoint;
use super::simulator::{ExitReason, Trade};

/// Profit factor reported when there are winning trades and no losses.
pub const PROFIT_FACTOR_CAP: f64 = 999.0;

const DAYS_PER_YEAR: f64 = 365.0;
const VAR_PERCENTILE: f64 = 0.05;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitReasonCounts {
    pub stop_loss: usize,
    pub take_profit: usize,
    pub max_hold: usize,
    pub end_of_data: usize,
    pub no_price_data: usize,
}

impl ExitReasonCounts {
    fn tally(trades: &[Trade]) -> Self {
        trades
            .iter()
            .fold(ExitReasonCounts::default(), |mut counts, t| {
                match t.exit_reason {
                    ExitReason::StopLoss => counts.stop_loss += 1,
                    ExitReason::TakeProfit => counts.take_profit += 1,
                    ExitReason::MaxHold => counts.max_hold += 1,
                    ExitReason::EndOfData => counts.end_of_data += 1,
                    ExitReason::NoPriceData => counts.no_price_data += 1,
                }
                counts
            })
    }
}

/// Percent-valued fields (`win_rate`, returns, drawdown) are on a 0-100 scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub total_pnl: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub ulcer_index: f64,
    pub var_95: f64,
    pub cvar_95: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub kelly_fraction: f64,
    pub calmar_ratio: f64,
    pub recovery_factor: f64,
    pub avg_hold_days: f64,
    pub exit_reasons: ExitReasonCounts,
}

impl Metrics {
    pub fn compute(trades: &[Trade], equity_curve: &[EquityPoint], initial_capital: f64) -> Self {
        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let total_trades = trades.len();

        let (winners, losers): (Vec<&Trade>, Vec<&Trade>) = trades.iter().partition(|t| t.is_win());
        let wins = winners.len();
        let losses = losers.len();

        let win_rate = ratio(wins as f64, total_trades as f64) * 100.0;
        let avg_return = mean(&returns);
        let avg_win = mean(&winners.iter().map(|t| t.return_pct).collect::<Vec<_>>());
        let avg_loss = mean(&losers.iter().map(|t| t.return_pct.abs()).collect::<Vec<_>>());

        let best_trade = returns.iter().copied().fold(None, max_opt).unwrap_or(0.0);
        let worst_trade = returns.iter().copied().fold(None, min_opt).unwrap_or(0.0);

        let gross_wins: f64 = winners.iter().map(|t| t.net_pnl).sum();
        let gross_losses: f64 = losers.iter().map(|t| t.net_pnl.abs()).sum();
        let total_pnl: f64 = trades.iter().map(|t| t.net_pnl).sum();

        let profit_factor = if gross_losses > 0.0 {
            finite_or(gross_wins / gross_losses, 0.0).min(PROFIT_FACTOR_CAP)
        } else if gross_wins > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };

        let final_capital = equity_curve
            .last()
            .map(|p| p.capital)
            .unwrap_or(initial_capital + total_pnl);
        let total_return = finite_or(
            ratio(final_capital - initial_capital, initial_capital) * 100.0,
            0.0,
        );
        let annualized_return = annualize(total_return, trades);

        let (max_drawdown, ulcer_index) = compute_drawdown(equity_curve);
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&returns);
        let (var_95, cvar_95) = compute_tail_risk(&returns);
        let (skewness, kurtosis) = compute_shape(&returns);
        let kelly_fraction = compute_kelly(wins, total_trades, avg_win, avg_loss);

        let calmar_ratio = if max_drawdown > 0.0 {
            finite_or(annualized_return / max_drawdown, 0.0)
        } else {
            0.0
        };
        let recovery_factor = if max_drawdown > 0.0 {
            let magnitude = finite_or(total_return.abs() / max_drawdown, 0.0);
            if total_return < 0.0 { -magnitude } else { magnitude }
        } else {
            0.0
        };

        let avg_hold_days = mean(&trades.iter().map(|t| t.hold_days as f64).collect::<Vec<_>>());

        Metrics {
            total_trades,
            wins,
            losses,
            win_rate,
            avg_return,
            avg_win,
            avg_loss,
            best_trade,
            worst_trade,
            total_pnl,
            total_return,
            annualized_return,
            profit_factor,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            ulcer_index,
            var_95,
            cvar_95,
            skewness,
            kurtosis,
            kelly_fraction,
            calmar_ratio,
            recovery_factor,
            avg_hold_days,
            exit_reasons: ExitReasonCounts::tally(trades),
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        finite_or(numerator / denominator, 0.0)
    }
}

fn mean(values: &[f64]) -> f64 {
    ratio(values.iter().sum(), values.len() as f64)
}

fn max_opt(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.max(v)))
}

fn min_opt(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.min(v)))
}

fn annualize(total_return: f64, trades: &[Trade]) -> f64 {
    let first = trades.iter().map(|t| t.pick_date).min();
    let last = trades.iter().map(|t| t.exit_date).max();
    let (Some(first), Some(last)) = (first, last) else {
        return 0.0;
    };
    let growth = 1.0 + total_return / 100.0;
    if growth <= 0.0 {
        return -100.0;
    }
    let days = (last - first).num_days().max(1) as f64;
    finite_or((growth.powf(DAYS_PER_YEAR / days) - 1.0) * 100.0, 0.0)
}

/// Returns (max drawdown %, ulcer index) over the equity curve.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, f64) {
    if equity_curve.is_empty() {
        return (0.0, 0.0);
    }

    let (_, drawdowns) = equity_curve.iter().fold(
        (f64::MIN, Vec::with_capacity(equity_curve.len())),
        |(peak, mut dds), point| {
            let peak = peak.max(point.capital);
            let dd = if peak > 0.0 {
                (peak - point.capital) / peak * 100.0
            } else {
                0.0
            };
            dds.push(dd);
            (peak, dds)
        },
    );

    let max_dd = drawdowns.iter().copied().fold(0.0_f64, f64::max);
    let ulcer = mean(&drawdowns.iter().map(|d| d * d).collect::<Vec<_>>()).sqrt();
    (finite_or(max_dd, 0.0), finite_or(ulcer, 0.0))
}

/// Returns (sharpe-like, sortino-like) over per-trade returns.
fn compute_risk_adjusted(returns: &[f64]) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let avg = mean(returns);
    let variance = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let downside = (returns.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>() / n).sqrt();

    let sharpe = if stddev > 0.0 { finite_or(avg / stddev, 0.0) } else { 0.0 };
    let sortino = if downside > 0.0 { finite_or(avg / downside, 0.0) } else { 0.0 };
    (sharpe, sortino)
}

/// Returns (VaR95, CVaR95) from the sorted return distribution.
fn compute_tail_risk(returns: &[f64]) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((VAR_PERCENTILE * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    (sorted[idx], mean(&sorted[..=idx]))
}

/// Returns (skewness, excess kurtosis) from central moments.
fn compute_shape(returns: &[f64]) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }
    let avg = mean(returns);
    let moment = |k: i32| mean(&returns.iter().map(|r| (r - avg).powi(k)).collect::<Vec<_>>());
    let m2 = moment(2);
    if m2 <= 0.0 {
        return (0.0, 0.0);
    }
    let skew = finite_or(moment(3) / m2.powf(1.5), 0.0);
    let kurt = finite_or(moment(4) / (m2 * m2) - 3.0, 0.0);
    (skew, kurt)
}

fn compute_kelly(wins: usize, total: usize, avg_win: f64, avg_loss: f64) -> f64 {
    if wins == 0 || total == 0 {
        return 0.0;
    }
    let w = wins as f64 / total as f64;
    if avg_loss <= 0.0 {
        return w;
    }
    let payoff = avg_win / avg_loss;
    if payoff <= 0.0 {
        return 0.0;
    }
    finite_or(w - (1.0 - w) / payoff, 0.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                index: i,
                date: start() + Duration::days(i as i64),
                capital: v,
                peak: v,
                drawdown_pct: 0.0,
            })
            .collect()
    }

    fn make_trade(net_pnl: f64, return_pct: f64, days: u32) -> Trade {
        Trade {
            ticker: "AAPL".into(),
            pick_date: start(),
            entry_price: 100.0,
            exit_price: 100.0 + return_pct,
            exit_date: start() + Duration::days(days as i64),
            exit_reason: ExitReason::MaxHold,
            shares: 10,
            gross_pnl: net_pnl,
            net_pnl,
            return_pct,
            hold_days: days,
        }
    }

    fn mixed_trades() -> Vec<Trade> {
        vec![
            make_trade(100.0, 10.0, 5),
            make_trade(-50.0, -5.0, 3),
            make_trade(200.0, 20.0, 10),
            make_trade(0.0, 0.0, 2),
        ]
    }

    #[test]
    fn empty_inputs_are_all_zero() {
        let m = Metrics::compute(&[], &[], 10_000.0);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m, Metrics::default());
    }

    #[test]
    fn win_rate_counts_breakeven_as_loss() {
        let m = Metrics::compute(&mixed_trades(), &[], 10_000.0);
        assert_eq!(m.wins, 2);
        assert_eq!(m.losses, 2);
        assert_relative_eq!(m.win_rate, 50.0);
        assert_relative_eq!(m.avg_return, 6.25);
        assert_relative_eq!(m.avg_win, 15.0);
        assert_relative_eq!(m.avg_loss, 2.5);
        assert_relative_eq!(m.best_trade, 20.0);
        assert_relative_eq!(m.worst_trade, -5.0);
        assert_relative_eq!(m.avg_hold_days, 5.0);
    }

    #[test]
    fn profit_factor_ratio() {
        let m = Metrics::compute(&mixed_trades(), &[], 10_000.0);
        assert_relative_eq!(m.profit_factor, 6.0);
    }

    #[test]
    fn profit_factor_sentinels() {
        let all_wins = vec![make_trade(10.0, 1.0, 1), make_trade(20.0, 2.0, 1)];
        assert_relative_eq!(
            Metrics::compute(&all_wins, &[], 10_000.0).profit_factor,
            PROFIT_FACTOR_CAP
        );

        let all_losses = vec![make_trade(-10.0, -1.0, 1), make_trade(-20.0, -2.0, 1)];
        assert_relative_eq!(Metrics::compute(&all_losses, &[], 10_000.0).profit_factor, 0.0);
    }

    #[test]
    fn sharpe_and_sortino_need_two_samples() {
        let m = Metrics::compute(&[make_trade(10.0, 1.0, 1)], &[], 10_000.0);
        assert_relative_eq!(m.sharpe_ratio, 0.0);
        assert_relative_eq!(m.sortino_ratio, 0.0);
    }

    #[test]
    fn sharpe_and_sortino_values() {
        let trades = vec![make_trade(200.0, 20.0, 1), make_trade(-100.0, -10.0, 1)];
        let m = Metrics::compute(&trades, &[], 10_000.0);
        // mean 5, population stddev 15, downside sqrt(100 / 2)
        assert_relative_eq!(m.sharpe_ratio, 5.0 / 15.0, epsilon = 1e-12);
        assert_relative_eq!(m.sortino_ratio, 5.0 / 50.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn constant_returns_have_zero_sharpe() {
        let trades = vec![make_trade(10.0, 1.0, 1), make_trade(10.0, 1.0, 1)];
        let m = Metrics::compute(&trades, &[], 10_000.0);
        assert_relative_eq!(m.sharpe_ratio, 0.0);
        assert_relative_eq!(m.sortino_ratio, 0.0);
        assert_relative_eq!(m.skewness, 0.0);
        assert_relative_eq!(m.kurtosis, 0.0);
    }

    #[test]
    fn max_drawdown_and_ulcer() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, ulcer) = compute_drawdown(&curve);
        assert_relative_eq!(dd, (110.0 - 80.0) / 110.0 * 100.0, epsilon = 1e-9);

        let dds: [f64; 6] = [0.0, 0.0, 20.0 / 110.0, 15.0 / 110.0, 30.0 / 110.0, 10.0 / 110.0];
        let expected = (dds.iter().map(|d| (d * 100.0).powi(2)).sum::<f64>() / 6.0).sqrt();
        assert_relative_eq!(ulcer, expected, epsilon = 1e-9);
    }

    #[test]
    fn annualized_return_compounds_over_calendar_days() {
        // +10% from first pick to last exit 73 days later: five periods a year
        let trades = vec![make_trade(1_000.0, 10.0, 73)];
        let m = Metrics::compute(&trades, &make_equity_curve(&[10_000.0, 11_000.0]), 10_000.0);
        assert_relative_eq!(m.total_return, 10.0, epsilon = 1e-9);
        assert_relative_eq!(m.annualized_return, (1.1_f64.powi(5) - 1.0) * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn same_day_exit_annualizes_over_one_day() {
        let trades = vec![make_trade(100.0, 1.0, 0)];
        let m = Metrics::compute(&trades, &make_equity_curve(&[10_000.0, 10_100.0]), 10_000.0);
        assert_relative_eq!(
            m.annualized_return,
            (1.01_f64.powf(365.0) - 1.0) * 100.0,
            max_relative = 1e-9
        );
    }

    #[test]
    fn wiped_out_account_annualizes_to_minus_hundred() {
        let trades = vec![make_trade(-10_000.0, -100.0, 10)];
        let m = Metrics::compute(&trades, &make_equity_curve(&[10_000.0, 0.0]), 10_000.0);
        assert_relative_eq!(m.total_return, -100.0);
        assert_relative_eq!(m.annualized_return, -100.0);
    }

    #[test]
    fn calmar_and_recovery_values() {
        let trades = vec![make_trade(1_000.0, 10.0, 73)];
        let curve = make_equity_curve(&[10_000.0, 12_000.0, 10_800.0, 11_000.0]);
        let m = Metrics::compute(&trades, &curve, 10_000.0);

        let annualized = (1.1_f64.powi(5) - 1.0) * 100.0;
        assert_relative_eq!(m.max_drawdown, 10.0, epsilon = 1e-9);
        assert_relative_eq!(m.calmar_ratio, annualized / 10.0, epsilon = 1e-9);
        assert_relative_eq!(m.recovery_factor, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn var_and_cvar_use_fifth_percentile_index() {
        // 20 returns: -9..=10, index floor(0.05 * 20) = 1
        let trades: Vec<Trade> = (-9..=10)
            .map(|r| make_trade(r as f64, r as f64, 1))
            .collect();
        let m = Metrics::compute(&trades, &[], 10_000.0);
        assert_relative_eq!(m.var_95, -8.0);
        assert_relative_eq!(m.cvar_95, -8.5);
    }

    #[test]
    fn var_small_sample_is_worst_trade() {
        let trades = vec![make_trade(5.0, 5.0, 1), make_trade(-3.0, -3.0, 1), make_trade(1.0, 1.0, 1)];
        let m = Metrics::compute(&trades, &[], 10_000.0);
        assert_relative_eq!(m.var_95, -3.0);
        assert_relative_eq!(m.cvar_95, -3.0);
    }

    #[test]
    fn symmetric_returns_shape() {
        let trades = vec![make_trade(-1.0, -1.0, 1), make_trade(0.0, 0.0, 1), make_trade(1.0, 1.0, 1)];
        let m = Metrics::compute(&trades, &[], 10_000.0);
        assert_relative_eq!(m.skewness, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.kurtosis, -1.5, epsilon = 1e-12);
    }

    #[test]
    fn kelly_fraction_and_floor() {
        let m = Metrics::compute(&mixed_trades(), &[], 10_000.0);
        // W = 0.5, payoff = 15 / 2.5 = 6
        assert_relative_eq!(m.kelly_fraction, 0.5 - 0.5 / 6.0, epsilon = 1e-12);

        let poor = vec![
            make_trade(1.0, 1.0, 1),
            make_trade(-10.0, -10.0, 1),
            make_trade(-10.0, -10.0, 1),
            make_trade(-10.0, -10.0, 1),
        ];
        assert_relative_eq!(Metrics::compute(&poor, &[], 10_000.0).kelly_fraction, 0.0);

        let only_wins = vec![make_trade(1.0, 1.0, 1), make_trade(2.0, 2.0, 1)];
        assert_relative_eq!(Metrics::compute(&only_wins, &[], 10_000.0).kelly_fraction, 1.0);
    }

    #[test]
    fn total_return_from_equity_curve() {
        let curve = make_equity_curve(&[10_000.0, 10_500.0, 11_000.0]);
        let m = Metrics::compute(&mixed_trades(), &curve, 10_000.0);
        assert_relative_eq!(m.total_return, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn total_return_without_curve_uses_pnl() {
        let m = Metrics::compute(&mixed_trades(), &[], 10_000.0);
        assert_relative_eq!(m.total_return, 2.5, epsilon = 1e-9);
        assert_relative_eq!(m.total_pnl, 250.0);
    }

    #[test]
    fn calmar_and_recovery_zero_without_drawdown() {
        let curve = make_equity_curve(&[10_000.0, 10_100.0, 10_200.0]);
        let m = Metrics::compute(&mixed_trades(), &curve, 10_000.0);
        assert_relative_eq!(m.max_drawdown, 0.0);
        assert_relative_eq!(m.calmar_ratio, 0.0);
        assert_relative_eq!(m.recovery_factor, 0.0);
    }

    #[test]
    fn recovery_factor_negative_on_loss() {
        let curve = make_equity_curve(&[10_000.0, 9_000.0, 9_500.0]);
        let trades = vec![make_trade(-1_000.0, -10.0, 1), make_trade(500.0, 5.0, 2)];
        let m = Metrics::compute(&trades, &curve, 10_000.0);
        assert_relative_eq!(m.max_drawdown, 10.0, epsilon = 1e-9);
        assert_relative_eq!(m.total_return, -5.0, epsilon = 1e-9);
        assert_relative_eq!(m.recovery_factor, -0.5, epsilon = 1e-9);
        assert!(m.calmar_ratio < 0.0);
    }

    #[test]
    fn exit_reasons_are_tallied() {
        let mut trades = mixed_trades();
        trades[0].exit_reason = ExitReason::TakeProfit;
        trades[1].exit_reason = ExitReason::StopLoss;
        trades[3].exit_reason = ExitReason::NoPriceData;
        let m = Metrics::compute(&trades, &[], 10_000.0);
        assert_eq!(m.exit_reasons.take_profit, 1);
        assert_eq!(m.exit_reasons.stop_loss, 1);
        assert_eq!(m.exit_reasons.max_hold, 1);
        assert_eq!(m.exit_reasons.no_price_data, 1);
        assert_eq!(m.exit_reasons.end_of_data, 0);
    }

    #[test]
    fn all_outputs_finite_for_degenerate_input() {
        let trades = vec![make_trade(f64::MAX, 1e300, 0), make_trade(-f64::MAX, -1e300, 0)];
        let curve = make_equity_curve(&[0.0, 0.0]);
        let m = Metrics::compute(&trades, &curve, 0.0);
        for v in [
            m.win_rate,
            m.profit_factor,
            m.sharpe_ratio,
            m.sortino_ratio,
            m.max_drawdown,
            m.ulcer_index,
            m.skewness,
            m.kurtosis,
            m.kelly_fraction,
            m.calmar_ratio,
            m.recovery_factor,
            m.total_return,
            m.annualized_return,
        ] {
            assert!(v.is_finite());
        }
    }
}
