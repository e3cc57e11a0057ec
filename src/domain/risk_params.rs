//! Risk parameters under optimization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Take-profit / stop-loss value that switches the rule off (buy-and-hold).
pub const DISABLED_PCT: f64 = 999.0;

pub fn is_disabled(pct: f64) -> bool {
    pct >= DISABLED_PCT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub max_hold_days: u32,
    pub slippage_pct: f64,
    /// Flat fee charged on each side of a trade.
    pub commission: f64,
    pub position_size_pct: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        RiskParams {
            take_profit_pct: 10.0,
            stop_loss_pct: 5.0,
            max_hold_days: 10,
            slippage_pct: 0.1,
            commission: 0.0,
            position_size_pct: 10.0,
        }
    }
}

impl RiskParams {
    /// Same costs and sizing, different exit rules.
    pub fn with_exits(&self, take_profit_pct: f64, stop_loss_pct: f64, max_hold_days: u32) -> Self {
        RiskParams {
            take_profit_pct,
            stop_loss_pct,
            max_hold_days,
            ..self.clone()
        }
    }

    /// Number of bars a trade may see. A zero hold still gets one bar.
    pub fn hold_limit(&self) -> usize {
        self.max_hold_days.max(1) as usize
    }

    /// Target price for an effective entry, or `None` when take-profit is disabled.
    pub fn target_price(&self, effective_entry: f64) -> Option<f64> {
        if is_disabled(self.take_profit_pct) {
            None
        } else {
            Some(effective_entry * (1.0 + self.take_profit_pct / 100.0))
        }
    }

    /// Stop price for an effective entry, or `None` when stop-loss is disabled.
    pub fn stop_price(&self, effective_entry: f64) -> Option<f64> {
        if is_disabled(self.stop_loss_pct) {
            None
        } else {
            Some(effective_entry * (1.0 - self.stop_loss_pct / 100.0))
        }
    }
}

impl fmt::Display for RiskParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |v: f64| {
            if is_disabled(v) {
                "off".to_string()
            } else {
                format!("{v}%")
            }
        };
        write!(
            f,
            "tp={} sl={} hold={}d",
            pct(self.take_profit_pct),
            pct(self.stop_loss_pct),
            self.max_hold_days
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_from_effective_entry() {
        let params = RiskParams {
            take_profit_pct: 5.0,
            stop_loss_pct: 3.0,
            ..Default::default()
        };
        assert!((params.target_price(100.0).unwrap() - 105.0).abs() < 1e-9);
        assert!((params.stop_price(100.0).unwrap() - 97.0).abs() < 1e-9);
    }

    #[test]
    fn sentinel_disables_rule() {
        let params = RiskParams {
            take_profit_pct: DISABLED_PCT,
            stop_loss_pct: DISABLED_PCT,
            ..Default::default()
        };
        assert_eq!(params.target_price(100.0), None);
        assert_eq!(params.stop_price(100.0), None);
    }

    #[test]
    fn with_exits_keeps_costs() {
        let base = RiskParams {
            slippage_pct: 0.25,
            commission: 1.0,
            position_size_pct: 20.0,
            ..Default::default()
        };
        let p = base.with_exits(15.0, 8.0, 20);
        assert_eq!(p.max_hold_days, 20);
        assert!((p.slippage_pct - 0.25).abs() < f64::EPSILON);
        assert!((p.commission - 1.0).abs() < f64::EPSILON);
        assert!((p.position_size_pct - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hold_limit_is_at_least_one_bar() {
        assert_eq!(RiskParams::default().with_exits(5.0, 3.0, 0).hold_limit(), 1);
        assert_eq!(RiskParams::default().with_exits(5.0, 3.0, 7).hold_limit(), 7);
    }

    #[test]
    fn display_marks_disabled_rules() {
        let p = RiskParams::default().with_exits(DISABLED_PCT, 5.0, 10);
        assert_eq!(p.to_string(), "tp=off sl=5% hold=10d");
    }
}
