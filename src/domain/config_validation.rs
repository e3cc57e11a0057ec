//! Configuration validation.
//!
//! Every value is checked before a validation run is built from it.

use crate::domain::error::PicklabError;
use crate::domain::optimizer::ParamGrid;
use crate::domain::risk_params::RiskParams;
use crate::domain::walk_forward::{
    DEFAULT_TEST_DAYS, DEFAULT_TRAIN_DAYS, TEST_DAYS_RANGE, TRAIN_DAYS_RANGE, WalkForwardConfig,
};
use crate::ports::config_port::ConfigPort;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PicklabError {
    PicklabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), PicklabError> {
    validate_windows(config)?;
    validate_capital(config)?;
    validate_costs(config)?;
    validate_position_size(config)?;
    validate_cache_ttl(config)?;
    grid_from_config(config)?;
    Ok(())
}

fn validate_windows(config: &dyn ConfigPort) -> Result<(), PicklabError> {
    let checks = [
        ("train_days", DEFAULT_TRAIN_DAYS, TRAIN_DAYS_RANGE),
        ("test_days", DEFAULT_TEST_DAYS, TEST_DAYS_RANGE),
    ];
    for (key, default, (lo, hi)) in checks {
        let value = config.get_int("validation", key, default as i64);
        if value < lo as i64 || value > hi as i64 {
            return Err(invalid(
                "validation",
                key,
                format!("{key} must be between {lo} and {hi}"),
            ));
        }
    }
    Ok(())
}

fn validate_capital(config: &dyn ConfigPort) -> Result<(), PicklabError> {
    let value = config.get_double("validation", "initial_capital", DEFAULT_INITIAL_CAPITAL);
    if value <= 0.0 {
        return Err(invalid(
            "validation",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), PicklabError> {
    let defaults = RiskParams::default();
    for (key, default) in [
        ("slippage_pct", defaults.slippage_pct),
        ("commission", defaults.commission),
    ] {
        if config.get_double("risk", key, default) < 0.0 {
            return Err(invalid("risk", key, format!("{key} must be non-negative")));
        }
    }
    Ok(())
}

fn validate_position_size(config: &dyn ConfigPort) -> Result<(), PicklabError> {
    let value = config.get_double(
        "risk",
        "position_size_pct",
        RiskParams::default().position_size_pct,
    );
    if value <= 0.0 || value > 100.0 {
        return Err(invalid(
            "risk",
            "position_size_pct",
            "position_size_pct must be between 0 (exclusive) and 100",
        ));
    }
    Ok(())
}

fn validate_cache_ttl(config: &dyn ConfigPort) -> Result<(), PicklabError> {
    if config.get_int("validation", "cache_ttl_secs", DEFAULT_CACHE_TTL_SECS) < 0 {
        return Err(invalid(
            "validation",
            "cache_ttl_secs",
            "cache_ttl_secs must be non-negative",
        ));
    }
    Ok(())
}

/// Parse a `[grid]` list, falling back to `default` when the key is absent.
fn grid_list<T>(config: &dyn ConfigPort, key: &str, default: &[T]) -> Result<Vec<T>, PicklabError>
where
    T: FromStr + PartialOrd + Default + Copy,
{
    let Some(items) = config.get_list("grid", key) else {
        return Ok(default.to_vec());
    };
    if items.is_empty() {
        return Err(invalid("grid", key, format!("{key} must list at least one value")));
    }
    items
        .iter()
        .map(|item| {
            let value = item
                .parse::<T>()
                .map_err(|_| invalid("grid", key, format!("'{item}' is not a number")))?;
            if value <= T::default() {
                return Err(invalid("grid", key, format!("{key} values must be positive")));
            }
            Ok(value)
        })
        .collect()
}

pub fn grid_from_config(config: &dyn ConfigPort) -> Result<ParamGrid, PicklabError> {
    let defaults = ParamGrid::default();
    Ok(ParamGrid {
        take_profit: grid_list(config, "take_profit", &defaults.take_profit)?,
        stop_loss: grid_list(config, "stop_loss", &defaults.stop_loss)?,
        max_hold_days: grid_list(config, "max_hold_days", &defaults.max_hold_days)?,
    })
}

/// Validate, then build the run settings from `[validation]`, `[risk]` and
/// `[grid]`.
pub fn walk_forward_config(config: &dyn ConfigPort) -> Result<WalkForwardConfig, PicklabError> {
    validate_config(config)?;
    let defaults = RiskParams::default();
    let base_params = RiskParams {
        slippage_pct: config.get_double("risk", "slippage_pct", defaults.slippage_pct),
        commission: config.get_double("risk", "commission", defaults.commission),
        position_size_pct: config.get_double(
            "risk",
            "position_size_pct",
            defaults.position_size_pct,
        ),
        ..defaults
    };
    // Ranges were checked above, so the narrowing casts are lossless.
    Ok(WalkForwardConfig {
        train_days: config.get_int("validation", "train_days", DEFAULT_TRAIN_DAYS as i64) as u32,
        test_days: config.get_int("validation", "test_days", DEFAULT_TEST_DAYS as i64) as u32,
        initial_capital: config.get_double(
            "validation",
            "initial_capital",
            DEFAULT_INITIAL_CAPITAL,
        ),
        base_params,
        grid: grid_from_config(config)?,
    })
}

pub fn cache_ttl(config: &dyn ConfigPort) -> Duration {
    let secs = config.get_int("validation", "cache_ttl_secs", DEFAULT_CACHE_TTL_SECS);
    Duration::from_secs(secs.max(0) as u64)
}
