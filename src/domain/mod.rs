//! Core domain types and logic.

pub mod daily_bar;
pub mod pick;
pub mod price_history;
pub mod risk_params;
pub mod simulator;
pub mod metrics;
pub mod backtest;
pub mod optimizer;
pub mod walk_forward;
pub mod config_validation;
pub mod error;
