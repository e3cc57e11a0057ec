//! Walk-forward cross-validation.
//!
//! History is cut into consecutive folds. Each fold searches the parameter
//! grid on its train window, then replays the winning parameters unchanged
//! on the test window that follows it. Test windows never overlap and the
//! next fold's train window starts the day after the previous test window
//! ends.
//!
//! All windows are inclusive: a 60-day window starting on the 1st ends on
//! the 60th day.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, info};

use super::backtest::run_backtest;
use super::error::PicklabError;
use super::metrics::Metrics;
use super::optimizer::{OptimizationResult, ParamGrid, grid_search};
use super::pick::{Pick, picks_in_window, sort_by_date, tickers};
use super::price_history::PriceHistory;
use super::risk_params::RiskParams;

pub const DEFAULT_TRAIN_DAYS: u32 = 60;
pub const DEFAULT_TEST_DAYS: u32 = 20;
pub const TRAIN_DAYS_RANGE: (u32, u32) = (14, 180);
pub const TEST_DAYS_RANGE: (u32, u32) = (7, 60);

/// Mean efficiency below this, over enough valid folds, flags overfitting.
pub const OVERFIT_EFFICIENCY_THRESHOLD: f64 = 0.5;
pub const MIN_VALID_FOLDS_FOR_OVERFIT: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub train_days: u32,
    pub test_days: u32,
    pub initial_capital: f64,
    pub base_params: RiskParams,
    pub grid: ParamGrid,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        WalkForwardConfig {
            train_days: DEFAULT_TRAIN_DAYS,
            test_days: DEFAULT_TEST_DAYS,
            initial_capital: 10_000.0,
            base_params: RiskParams::default(),
            grid: ParamGrid::default(),
        }
    }
}

impl WalkForwardConfig {
    pub fn required_days(&self) -> i64 {
        self.train_days as i64 + self.test_days as i64
    }

    /// Bounds checks run before any computation starts.
    pub fn validate(&self) -> Result<(), PicklabError> {
        let invalid = |reason: String| Err(PicklabError::InvalidRequest { reason });

        let (lo, hi) = TRAIN_DAYS_RANGE;
        if !(lo..=hi).contains(&self.train_days) {
            return invalid(format!("train_days must be in [{lo}, {hi}], got {}", self.train_days));
        }
        let (lo, hi) = TEST_DAYS_RANGE;
        if !(lo..=hi).contains(&self.test_days) {
            return invalid(format!("test_days must be in [{lo}, {hi}], got {}", self.test_days));
        }
        if !(self.initial_capital > 0.0) {
            return invalid("initial_capital must be positive".into());
        }
        if self.grid.size() == 0 {
            return invalid("parameter grid must not be empty".into());
        }
        if self.grid.take_profit.iter().chain(&self.grid.stop_loss).any(|v| !(*v > 0.0)) {
            return invalid("take_profit and stop_loss values must be positive".into());
        }
        if self.grid.max_hold_days.contains(&0) {
            return invalid("max_hold_days values must be at least 1".into());
        }
        let p = &self.base_params;
        if p.slippage_pct < 0.0 || p.commission < 0.0 {
            return invalid("slippage and commission must be non-negative".into());
        }
        if !(p.position_size_pct > 0.0 && p.position_size_pct <= 100.0) {
            return invalid("position_size_pct must be in (0, 100]".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Window of `days` days starting at `start`.
    pub fn starting(start: NaiveDate, days: u32) -> Self {
        DateWindow {
            start,
            end: start + Duration::days(days as i64 - 1),
        }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn overlaps(&self, other: &DateWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldWindow {
    pub index: usize,
    pub train: DateWindow,
    pub test: DateWindow,
}

impl FoldWindow {
    fn at(cursor: NaiveDate, train_days: u32, test_days: u32) -> Self {
        let train = DateWindow::starting(cursor, train_days);
        let test = DateWindow::starting(train.end + Duration::days(1), test_days);
        FoldWindow {
            index: 0,
            train,
            test,
        }
    }

    /// Train start through test end.
    pub fn span(&self) -> DateWindow {
        DateWindow {
            start: self.train.start,
            end: self.test.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FoldPlan {
    Folds(Vec<FoldWindow>),
    InsufficientData {
        available_days: i64,
        required_days: i64,
    },
}

/// Lay out folds over `[first, last]`, stopping before a test window would
/// run past `last`.
pub fn plan_folds(first: NaiveDate, last: NaiveDate, train_days: u32, test_days: u32) -> FoldPlan {
    let available_days = (last - first).num_days() + 1;
    let required_days = train_days as i64 + test_days as i64;
    if available_days < required_days {
        return FoldPlan::InsufficientData {
            available_days,
            required_days,
        };
    }

    let windows = std::iter::successors(Some(FoldWindow::at(first, train_days, test_days)), |w| {
        Some(FoldWindow::at(w.test.end + Duration::days(1), train_days, test_days))
    })
    .take_while(|w| w.test.end <= last)
    .enumerate()
    .map(|(index, w)| FoldWindow { index, ..w })
    .collect();

    FoldPlan::Folds(windows)
}

/// OOS avg return / IS avg return; exactly 0 when the IS average is 0.
pub fn walk_forward_efficiency(is_avg_return: f64, oos_avg_return: f64) -> f64 {
    if is_avg_return == 0.0 {
        return 0.0;
    }
    let eff = oos_avg_return / is_avg_return;
    if eff.is_finite() { eff } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train: DateWindow,
    pub test: DateWindow,
    pub train_picks: usize,
    pub test_picks: usize,
    /// `None` when no grid cell had enough trades in the train window.
    pub in_sample: Option<OptimizationResult>,
    /// `None` when there were no in-sample parameters to replay.
    pub out_of_sample: Option<Metrics>,
    pub efficiency: f64,
}

impl Fold {
    /// Has an in-sample optimum and at least one out-of-sample trade.
    pub fn is_valid(&self) -> bool {
        self.in_sample.is_some()
            && self
                .out_of_sample
                .as_ref()
                .is_some_and(|m| m.total_trades > 0)
    }

    pub fn oos_trades(&self) -> usize {
        self.out_of_sample.as_ref().map_or(0, |m| m.total_trades)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationStatus {
    Completed,
    InsufficientData {
        available_days: i64,
        required_days: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub status: ValidationStatus,
    pub total_folds: usize,
    pub valid_folds: usize,
    pub avg_is_return: f64,
    pub avg_oos_return: f64,
    pub avg_is_win_rate: f64,
    pub avg_oos_win_rate: f64,
    pub avg_efficiency: f64,
    pub overfitting: bool,
    /// Per-parameter plurality vote across the folds' in-sample optima.
    pub robust_params: Option<RiskParams>,
    pub total_oos_trades: usize,
}

impl ValidationSummary {
    fn insufficient(available_days: i64, required_days: i64) -> Self {
        ValidationSummary {
            status: ValidationStatus::InsufficientData {
                available_days,
                required_days,
            },
            total_folds: 0,
            valid_folds: 0,
            avg_is_return: 0.0,
            avg_oos_return: 0.0,
            avg_is_win_rate: 0.0,
            avg_oos_win_rate: 0.0,
            avg_efficiency: 0.0,
            overfitting: false,
            robust_params: None,
            total_oos_trades: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub train_days: u32,
    pub test_days: u32,
    pub folds: Vec<Fold>,
    pub summary: ValidationSummary,
}

/// Most frequent value; ties go to the value seen first.
fn mode<T: PartialEq + Copy>(values: impl IntoIterator<Item = T>) -> Option<T> {
    let counts = values
        .into_iter()
        .fold(Vec::<(T, usize)>::new(), |mut counts, v| {
            match counts.iter_mut().find(|(seen, _)| *seen == v) {
                Some((_, n)) => *n += 1,
                None => counts.push((v, 1)),
            }
            counts
        });
    counts
        .into_iter()
        .fold(None, |best: Option<(T, usize)>, (v, n)| {
            if best.is_some_and(|(_, best_n)| best_n >= n) {
                best
            } else {
                Some((v, n))
            }
        })
        .map(|(v, _)| v)
}

fn robust_params(folds: &[Fold], base: &RiskParams) -> Option<RiskParams> {
    let optima: Vec<&RiskParams> = folds
        .iter()
        .filter_map(|f| f.in_sample.as_ref().map(|o| &o.params))
        .collect();
    let tp = mode(optima.iter().map(|p| p.take_profit_pct))?;
    let sl = mode(optima.iter().map(|p| p.stop_loss_pct))?;
    let hold = mode(optima.iter().map(|p| p.max_hold_days))?;
    Some(base.with_exits(tp, sl, hold))
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Aggregate folds into a summary. Folds without an in-sample optimum or
/// without out-of-sample trades are counted but left out of the averages.
pub fn summarize(folds: &[Fold], base: &RiskParams) -> ValidationSummary {
    let valid: Vec<(&OptimizationResult, &Metrics)> = folds
        .iter()
        .filter(|f| f.is_valid())
        .filter_map(|f| Some((f.in_sample.as_ref()?, f.out_of_sample.as_ref()?)))
        .collect();

    let collect = |pick: &dyn Fn(&OptimizationResult, &Metrics) -> f64| -> f64 {
        average(&valid.iter().map(|(is, oos)| pick(*is, *oos)).collect::<Vec<_>>())
    };

    let avg_efficiency = average(
        &folds
            .iter()
            .filter(|f| f.is_valid())
            .map(|f| f.efficiency)
            .collect::<Vec<_>>(),
    );
    let valid_folds = valid.len();

    ValidationSummary {
        status: ValidationStatus::Completed,
        total_folds: folds.len(),
        valid_folds,
        avg_is_return: collect(&|is, _| is.metrics.avg_return),
        avg_oos_return: collect(&|_, oos| oos.avg_return),
        avg_is_win_rate: collect(&|is, _| is.metrics.win_rate),
        avg_oos_win_rate: collect(&|_, oos| oos.win_rate),
        avg_efficiency,
        overfitting: valid_folds >= MIN_VALID_FOLDS_FOR_OVERFIT
            && avg_efficiency < OVERFIT_EFFICIENCY_THRESHOLD,
        robust_params: robust_params(folds, base),
        total_oos_trades: folds.iter().map(Fold::oos_trades).sum(),
    }
}

#[derive(Debug, Clone)]
pub struct WalkForwardValidator {
    config: WalkForwardConfig,
}

impl WalkForwardValidator {
    pub fn new(config: WalkForwardConfig) -> Self {
        WalkForwardValidator { config }
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    /// Fold layout from the eligible picks' date range.
    pub fn plan(&self, picks: &[Pick]) -> FoldPlan {
        let dates = picks.iter().filter(|p| p.is_eligible()).map(|p| p.pick_date);
        let first = dates.clone().min();
        let last = dates.max();
        match (first, last) {
            (Some(first), Some(last)) => {
                plan_folds(first, last, self.config.train_days, self.config.test_days)
            }
            _ => FoldPlan::InsufficientData {
                available_days: 0,
                required_days: self.config.required_days(),
            },
        }
    }

    /// Optimize on the train window, replay on the test window. `history`
    /// must cover the fold's span; each side only sees bars inside its own
    /// window.
    pub fn evaluate_fold(&self, window: &FoldWindow, picks: &[Pick], history: &PriceHistory) -> Fold {
        let cfg = &self.config;
        let train_picks = picks_in_window(picks, window.train.start, window.train.end);
        let test_picks = picks_in_window(picks, window.test.start, window.test.end);

        let in_sample = grid_search(
            &train_picks,
            &history.restricted(window.train.start, window.train.end),
            &cfg.grid,
            &cfg.base_params,
            cfg.initial_capital,
        );

        let test_history = history.restricted(window.test.start, window.test.end);
        let out_of_sample = in_sample.as_ref().map(|opt| {
            run_backtest(&test_picks, &test_history, &opt.params, cfg.initial_capital).metrics()
        });

        let efficiency = match (&in_sample, &out_of_sample) {
            (Some(is), Some(oos)) => walk_forward_efficiency(is.metrics.avg_return, oos.avg_return),
            _ => 0.0,
        };

        match &in_sample {
            Some(opt) => info!(
                fold = window.index,
                params = %opt.params,
                is_avg_return = opt.metrics.avg_return,
                oos_trades = out_of_sample.as_ref().map_or(0, |m| m.total_trades),
                efficiency,
                "fold evaluated"
            ),
            None => debug!(
                fold = window.index,
                train_picks = train_picks.len(),
                "no eligible grid cell in train window"
            ),
        }

        Fold {
            index: window.index,
            train: window.train,
            test: window.test,
            train_picks: train_picks.len(),
            test_picks: test_picks.len(),
            in_sample,
            out_of_sample,
            efficiency,
        }
    }

    /// Run every fold against a fully pre-fetched history.
    pub fn run(&self, picks: &[Pick], history: &PriceHistory) -> WalkForwardResult {
        let result = self.run_with_loader(picks, |window, _| {
            let span = window.span();
            Ok::<_, Infallible>(history.restricted(span.start, span.end))
        });
        match result {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Run every fold, asking `load` once per fold for the bars of the
    /// tickers picked inside that fold's span.
    pub fn run_with_loader<E, F>(&self, picks: &[Pick], mut load: F) -> Result<WalkForwardResult, E>
    where
        F: FnMut(&FoldWindow, &[String]) -> Result<PriceHistory, E>,
    {
        let picks = sort_by_date(picks.iter().filter(|p| p.is_eligible()).cloned().collect());
        let cfg = &self.config;

        let windows = match self.plan(&picks) {
            FoldPlan::Folds(windows) => windows,
            FoldPlan::InsufficientData {
                available_days,
                required_days,
            } => {
                info!(available_days, required_days, "not enough history for one fold");
                return Ok(WalkForwardResult {
                    train_days: cfg.train_days,
                    test_days: cfg.test_days,
                    folds: Vec::new(),
                    summary: ValidationSummary::insufficient(available_days, required_days),
                });
            }
        };

        let mut folds = Vec::with_capacity(windows.len());
        for window in &windows {
            let span = window.span();
            let fold_picks = picks_in_window(&picks, span.start, span.end);
            let history = load(window, &tickers(&fold_picks))?;
            folds.push(self.evaluate_fold(window, &fold_picks, &history));
        }

        let summary = summarize(&folds, &cfg.base_params);
        Ok(WalkForwardResult {
            train_days: cfg.train_days,
            test_days: cfg.test_days,
            folds,
            summary,
        })
    }
}
