use serde::{Deserialize, Serialize};

use crate::error::WalkForwardError;
use crate::optimization::{PortfolioMetrics, SolverSettings, TRADING_DAYS_PER_YEAR};
use crate::returns::MissingDataPolicy;
use crate::types::{Money, Rate};
use crate::WalkForwardResult;

/// Smallest universe the backtester accepts.
pub const MIN_ASSETS: usize = 2;

/// Immutable run configuration for [`RollingBacktester`](super::RollingBacktester).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Estimation window length W in observations (default 504, two years).
    #[serde(default = "default_window_days")]
    pub window_days: usize,
    /// Observations per year P (default 252).
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    /// Annual risk-free rate used by the Sharpe objective (default 0.02).
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
    /// Starting portfolio value (default 100).
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Money,
    #[serde(default)]
    pub solver: SolverSettings,
    /// Handling of incomplete input rows (default: reject).
    #[serde(default)]
    pub missing_data: MissingDataPolicy,
}

fn default_window_days() -> usize {
    504
}

fn default_periods_per_year() -> f64 {
    TRADING_DAYS_PER_YEAR
}

fn default_risk_free_rate() -> Rate {
    0.02
}

fn default_initial_capital() -> Money {
    100.0
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            periods_per_year: default_periods_per_year(),
            risk_free_rate: default_risk_free_rate(),
            initial_capital: default_initial_capital(),
            solver: SolverSettings::default(),
            missing_data: MissingDataPolicy::default(),
        }
    }
}

impl BacktestConfig {
    /// Set the window from a length in years: `W = round(P * years)`.
    pub fn with_window_years(mut self, years: f64) -> WalkForwardResult<Self> {
        if !(years.is_finite() && years > 0.0) {
            return Err(WalkForwardError::InvalidInput {
                field: "window_years".into(),
                reason: format!("Window length must be positive, got {}", years),
            });
        }
        self.window_days = (self.periods_per_year * years).round() as usize;
        Ok(self)
    }

    /// Window length expressed in years.
    pub fn window_years(&self) -> f64 {
        self.window_days as f64 / self.periods_per_year
    }

    pub fn metrics(&self) -> PortfolioMetrics {
        PortfolioMetrics::new(self.periods_per_year, self.risk_free_rate)
    }

    /// Validate against a universe of `num_assets` assets.
    pub fn validate(&self, num_assets: usize) -> WalkForwardResult<()> {
        if num_assets < MIN_ASSETS {
            return Err(WalkForwardError::InvalidInput {
                field: "assets".into(),
                reason: format!(
                    "At least {} assets required, got {}",
                    MIN_ASSETS, num_assets
                ),
            });
        }
        if self.window_days <= num_assets {
            return Err(WalkForwardError::InsufficientWindow {
                window_days: self.window_days,
                num_assets,
            });
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(WalkForwardError::InvalidInput {
                field: "periods_per_year".into(),
                reason: format!("Must be positive, got {}", self.periods_per_year),
            });
        }
        if !self.risk_free_rate.is_finite() {
            return Err(WalkForwardError::InvalidInput {
                field: "risk_free_rate".into(),
                reason: "Must be finite".into(),
            });
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(WalkForwardError::InvalidInput {
                field: "initial_capital".into(),
                reason: format!("Must be positive, got {}", self.initial_capital),
            });
        }
        self.solver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: BacktestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, BacktestConfig::default());
        assert_eq!(cfg.window_days, 504);
        assert_eq!(cfg.window_years(), 2.0);
        assert_eq!(cfg.missing_data, MissingDataPolicy::Reject);
    }

    #[test]
    fn test_window_years() {
        let cfg = BacktestConfig::default().with_window_years(1.0).unwrap();
        assert_eq!(cfg.window_days, 252);
        assert!(BacktestConfig::default().with_window_years(0.0).is_err());
    }

    #[test]
    fn test_window_must_exceed_universe() {
        let cfg = BacktestConfig {
            window_days: 3,
            ..BacktestConfig::default()
        };
        assert!(matches!(
            cfg.validate(3),
            Err(WalkForwardError::InsufficientWindow {
                window_days: 3,
                num_assets: 3
            })
        ));
        assert!(cfg.validate(2).is_ok());
    }

    #[test]
    fn test_single_asset_rejected() {
        assert!(BacktestConfig::default().validate(1).is_err());
    }

    #[test]
    fn test_non_positive_capital_rejected() {
        let cfg = BacktestConfig {
            initial_capital: 0.0,
            ..BacktestConfig::default()
        };
        assert!(cfg.validate(2).is_err());
    }
}
