//! Request surface over the walk-forward core.
//!
//! Wires the market data, result store, auth and cache ports around
//! [`WalkForwardValidator`]. Privileged actions are authorized before any
//! data is read.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::error::PicklabError;
use crate::domain::optimizer::{OptimizationResult, grid_search};
use crate::domain::price_history::PriceHistory;
use crate::domain::risk_params::RiskParams;
use crate::domain::walk_forward::{
    ValidationStatus, WalkForwardConfig, WalkForwardResult, WalkForwardValidator,
};
use crate::ports::auth_port::AuthPort;
use crate::ports::cache_port::CachePort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::result_store_port::{ResultStorePort, StoredSummary};

pub const ACTION_VALIDATE_ALL: &str = "validate_all";
pub const ACTION_PERSIST: &str = "persist";

/// Uniform response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> From<Result<T, PicklabError>> for ApiResponse<T> {
    fn from(result: Result<T, PicklabError>) -> Self {
        match result {
            Ok(data) => ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => ApiResponse {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub source: String,
    pub algorithm: String,
    pub train_days: Option<u32>,
    pub test_days: Option<u32>,
    pub persist: bool,
}

impl ValidateRequest {
    pub fn new(source: impl Into<String>, algorithm: impl Into<String>) -> Self {
        ValidateRequest {
            source: source.into(),
            algorithm: algorithm.into(),
            train_days: None,
            test_days: None,
            persist: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub source: String,
    pub algorithm: String,
    pub config: WalkForwardConfig,
    pub result: WalkForwardResult,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub source: String,
    pub algorithm: String,
    /// Single grid search over the whole history; `None` when no cell had
    /// enough trades.
    pub naive: Option<OptimizationResult>,
    pub walk_forward: StoredSummary,
    /// Naive average return minus walk-forward out-of-sample average, in
    /// percentage points.
    pub return_gap: f64,
    pub recommendation: String,
}

fn describe(params: Option<&RiskParams>) -> String {
    params.map_or_else(|| "none".to_string(), |p| p.to_string())
}

/// Plain-language verdict on naive vs walk-forward results.
pub fn recommend(naive: Option<&OptimizationResult>, stored: &StoredSummary) -> String {
    let s = &stored.summary;
    let robust = describe(s.robust_params.as_ref());
    let naive_return = naive.map_or(0.0, |n| n.metrics.avg_return);

    if s.valid_folds == 0 {
        return "Not enough out-of-sample evidence: no fold produced both an optimum and a \
                test trade. Collect more picks before trusting any parameters."
            .to_string();
    }
    if s.overfitting {
        return format!(
            "Overfitting detected. The full-history optimum ({}, {:.2}% per trade) keeps only \
             {:.0}% of its edge out of sample. Prefer the robust parameters ({robust}) and expect \
             about {:.2}% per trade.",
            describe(naive.map(|n| &n.params)),
            naive_return,
            s.avg_efficiency * 100.0,
            s.avg_oos_return
        );
    }
    if s.valid_folds < 2 {
        return format!(
            "Only one valid fold; results are tentative. Robust parameters ({robust}) returned \
             {:.2}% per trade out of sample.",
            s.avg_oos_return
        );
    }
    format!(
        "Walk-forward results hold up (efficiency {:.2} over {} folds). Use the robust parameters \
         ({robust}) and expect about {:.2}% per trade rather than the naive {:.2}%.",
        s.avg_efficiency, s.valid_folds, s.avg_oos_return, naive_return
    )
}

pub struct ValidationService<'a> {
    data: &'a dyn MarketDataPort,
    store: Option<&'a dyn ResultStorePort>,
    auth: &'a dyn AuthPort,
    cache: &'a dyn CachePort,
    settings: WalkForwardConfig,
    cache_ttl: Duration,
}

impl<'a> ValidationService<'a> {
    pub fn new(
        data: &'a dyn MarketDataPort,
        auth: &'a dyn AuthPort,
        cache: &'a dyn CachePort,
        settings: WalkForwardConfig,
    ) -> Self {
        ValidationService {
            data,
            store: None,
            auth,
            cache,
            settings,
            cache_ttl: Duration::from_secs(300),
        }
    }

    pub fn with_store(mut self, store: &'a dyn ResultStorePort) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn store(&self) -> Result<&'a dyn ResultStorePort, PicklabError> {
        self.store.ok_or_else(|| PicklabError::InvalidRequest {
            reason: "no result store configured".into(),
        })
    }

    fn cache_key(source: &str, algorithm: &str, config: &WalkForwardConfig) -> String {
        format!(
            "validate|{source}|{algorithm}|{}|{}",
            config.train_days, config.test_days
        )
    }

    fn config_for(&self, request: &ValidateRequest) -> Result<WalkForwardConfig, PicklabError> {
        let config = WalkForwardConfig {
            train_days: request.train_days.unwrap_or(self.settings.train_days),
            test_days: request.test_days.unwrap_or(self.settings.test_days),
            ..self.settings.clone()
        };
        config.validate()?;
        Ok(config)
    }

    /// Walk-forward validation for one algorithm. Persisting requires the
    /// admin credential; non-persisting responses are cached.
    pub fn validate(
        &self,
        request: &ValidateRequest,
        credential: Option<&str>,
    ) -> Result<ValidationReport, PicklabError> {
        if request.persist {
            self.auth.authorize(ACTION_PERSIST, credential)?;
            self.store()?;
        }
        let config = self.config_for(request)?;

        let key = Self::cache_key(&request.source, &request.algorithm, &config);
        if !request.persist {
            if let Some(hit) = self.cached(&key) {
                return Ok(hit);
            }
        }

        let mut report = self.run(&request.source, &request.algorithm, config)?;
        if request.persist {
            self.persist(&mut report)?;
        } else {
            self.cache
                .put(&key, serde_json::to_string(&report)?, self.cache_ttl);
        }
        Ok(report)
    }

    fn cached(&self, key: &str) -> Option<ValidationReport> {
        let raw = self.cache.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(report) => {
                debug!(key, "validation served from cache");
                Some(report)
            }
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    fn persist(&self, report: &mut ValidationReport) -> Result<(), PicklabError> {
        self.store()?
            .save_result(&report.source, &report.algorithm, &report.result)?;
        self.cache.invalidate_prefix(&format!(
            "validate|{}|{}|",
            report.source, report.algorithm
        ));
        report.persisted = true;
        info!(source = %report.source, algorithm = %report.algorithm, "validation persisted");
        Ok(())
    }

    fn run(
        &self,
        source: &str,
        algorithm: &str,
        config: WalkForwardConfig,
    ) -> Result<ValidationReport, PicklabError> {
        let (first, last, count) =
            self.data
                .get_pick_range(source, algorithm)?
                .ok_or_else(|| PicklabError::NoData {
                    what: format!("picks for {source}/{algorithm}"),
                })?;
        info!(source, algorithm, %first, %last, picks = count, "starting walk-forward validation");

        let picks = self.data.fetch_picks(source, algorithm, first, last)?;
        let validator = WalkForwardValidator::new(config);
        let result = validator.run_with_loader(&picks, |window, tickers| {
            let span = window.span();
            let history = PriceHistory::new(self.data.fetch_bars(tickers, span.start, span.end)?);
            debug!(
                fold = window.index,
                tickers = tickers.len(),
                bars = history.bar_count(),
                "fold bars loaded"
            );
            Ok::<_, PicklabError>(history)
        })?;

        info!(
            source,
            algorithm,
            folds = result.summary.total_folds,
            valid_folds = result.summary.valid_folds,
            avg_efficiency = result.summary.avg_efficiency,
            overfitting = result.summary.overfitting,
            "walk-forward validation finished"
        );

        Ok(ValidationReport {
            source: source.to_string(),
            algorithm: algorithm.to_string(),
            config: validator.config().clone(),
            result,
            persisted: false,
        })
    }

    /// Validate every algorithm under `source`, best mean efficiency first.
    /// Results are persisted when a store is configured.
    pub fn validate_all(
        &self,
        source: &str,
        credential: Option<&str>,
    ) -> Result<Vec<ValidationReport>, PicklabError> {
        self.auth.authorize(ACTION_VALIDATE_ALL, credential)?;
        self.settings.validate()?;

        let algorithms = self.data.list_algorithms(source)?;
        if algorithms.is_empty() {
            return Err(PicklabError::NoData {
                what: format!("algorithms for source {source}"),
            });
        }

        let mut reports = Vec::with_capacity(algorithms.len());
        for algorithm in &algorithms {
            let mut report = self.run(source, algorithm, self.settings.clone())?;
            if self.store.is_some() {
                self.persist(&mut report)?;
            }
            reports.push(report);
        }

        reports.sort_by(|a, b| {
            b.result
                .summary
                .avg_efficiency
                .total_cmp(&a.result.summary.avg_efficiency)
        });
        Ok(reports)
    }

    /// Naive full-history optimum against the stored walk-forward summary.
    pub fn compare(&self, source: &str, algorithm: &str) -> Result<Comparison, PicklabError> {
        let stored = self
            .store()?
            .load_summary(source, algorithm)?
            .ok_or_else(|| PicklabError::NoData {
                what: format!("stored walk-forward result for {source}/{algorithm}"),
            })?;
        if let ValidationStatus::InsufficientData {
            available_days,
            required_days,
        } = stored.summary.status
        {
            return Err(PicklabError::InsufficientData {
                available_days,
                required_days,
            });
        }

        let naive = match self.data.get_pick_range(source, algorithm)? {
            Some((first, last, _)) => {
                let picks = self.data.fetch_picks(source, algorithm, first, last)?;
                let tickers = crate::domain::pick::tickers(&picks);
                let history = PriceHistory::new(self.data.fetch_bars(&tickers, first, last)?);
                let s = &self.settings;
                grid_search(&picks, &history, &s.grid, &s.base_params, s.initial_capital)
            }
            None => None,
        };

        let return_gap =
            naive.as_ref().map_or(0.0, |n| n.metrics.avg_return) - stored.summary.avg_oos_return;
        let recommendation = recommend(naive.as_ref(), &stored);
        debug!(source, algorithm, return_gap, "comparison built");

        Ok(Comparison {
            source: source.to_string(),
            algorithm: algorithm.to_string(),
            naive,
            walk_forward: stored,
            return_gap,
            recommendation,
        })
    }

    pub fn results(&self) -> Result<Vec<StoredSummary>, PicklabError> {
        self.store()?.list_summaries()
    }
}
