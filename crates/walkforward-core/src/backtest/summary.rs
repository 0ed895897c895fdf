use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::backtest::rolling::PortfolioValueSeries;
use crate::error::WalkForwardError;
use crate::optimization::TRADING_DAYS_PER_YEAR;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::WalkForwardResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Return and risk statistics of a value series, Sharpe excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatistics {
    /// `last / initial_capital - 1`
    pub total_return: f64,
    /// `mean(daily) * P`
    pub annualized_return: f64,
    /// `stdev(daily) * sqrt(P)`, sample standard deviation.
    pub annualized_volatility: f64,
    /// Largest peak-to-trough decline, as a positive fraction.
    pub max_drawdown: f64,
    /// Number of values in the series.
    pub observations: usize,
}

/// Full performance summary of a value series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    /// `annualized_return / annualized_volatility`, no risk-free adjustment.
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub observations: usize,
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Reduces a portfolio value series to summary statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSummarizer {
    periods_per_year: f64,
}

impl Default for PerformanceSummarizer {
    fn default() -> Self {
        Self {
            periods_per_year: TRADING_DAYS_PER_YEAR,
        }
    }
}

impl PerformanceSummarizer {
    pub fn new(periods_per_year: f64) -> WalkForwardResult<Self> {
        if !(periods_per_year.is_finite() && periods_per_year > 0.0) {
            return Err(WalkForwardError::InvalidInput {
                field: "periods_per_year".into(),
                reason: format!("Must be positive, got {}", periods_per_year),
            });
        }
        Ok(Self { periods_per_year })
    }

    /// Statistics that stay defined for a flat series.
    ///
    /// Needs at least three values so the daily returns have a sample
    /// standard deviation.
    pub fn statistics(
        &self,
        initial_capital: Money,
        values: &[f64],
    ) -> WalkForwardResult<ReturnStatistics> {
        if !(initial_capital.is_finite() && initial_capital > 0.0) {
            return Err(WalkForwardError::InvalidInput {
                field: "initial_capital".into(),
                reason: format!("Must be positive, got {}", initial_capital),
            });
        }
        if values.len() < 3 {
            return Err(WalkForwardError::InsufficientData(format!(
                "At least 3 values required for a performance summary, got {}",
                values.len()
            )));
        }
        if let Some(i) = values.iter().position(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(WalkForwardError::InvalidInput {
                field: format!("values[{}]", i),
                reason: format!("Portfolio values must be positive and finite, got {}", values[i]),
            });
        }

        let daily = pct_change(values);
        let n = daily.len() as f64;
        let mean = daily.iter().sum::<f64>() / n;
        let variance = daily.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);

        let last = values[values.len() - 1];
        Ok(ReturnStatistics {
            total_return: last / initial_capital - 1.0,
            annualized_return: mean * self.periods_per_year,
            annualized_volatility: variance.sqrt() * self.periods_per_year.sqrt(),
            max_drawdown: max_drawdown(initial_capital, values),
            observations: values.len(),
        })
    }

    /// Annualised return over annualised volatility.
    ///
    /// Fails with `DegenerateVariance` for a flat series.
    pub fn sharpe_ratio(&self, stats: &ReturnStatistics) -> WalkForwardResult<f64> {
        if stats.annualized_volatility.is_nan() || stats.annualized_volatility <= 0.0 {
            return Err(WalkForwardError::DegenerateVariance {
                context: "portfolio value series has zero volatility".into(),
            });
        }
        Ok(stats.annualized_return / stats.annualized_volatility)
    }

    pub fn summarize(
        &self,
        initial_capital: Money,
        values: &[f64],
    ) -> WalkForwardResult<PerformanceSummary> {
        let stats = self.statistics(initial_capital, values)?;
        let sharpe_ratio = self.sharpe_ratio(&stats)?;
        Ok(PerformanceSummary {
            total_return: stats.total_return,
            annualized_return: stats.annualized_return,
            annualized_volatility: stats.annualized_volatility,
            sharpe_ratio,
            max_drawdown: stats.max_drawdown,
            observations: stats.observations,
        })
    }

    pub fn summarize_series(
        &self,
        series: &PortfolioValueSeries,
    ) -> WalkForwardResult<PerformanceSummary> {
        self.summarize(series.initial_capital, &series.values())
    }
}

/// Simple period returns `v_t / v_{t-1} - 1`.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Maximum drawdown with `initial_capital` as the opening peak.
fn max_drawdown(initial_capital: Money, values: &[f64]) -> f64 {
    let mut peak = initial_capital;
    let mut worst = 0.0_f64;
    for v in values {
        peak = peak.max(*v);
        worst = worst.max((peak - v) / peak);
    }
    worst
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Input for [`summarize_performance`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryInput {
    /// Portfolio values in time order.
    pub values: Vec<f64>,
    /// Starting capital; defaults to the first value.
    #[serde(default)]
    pub initial_capital: Option<Money>,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
}

fn default_periods_per_year() -> f64 {
    TRADING_DAYS_PER_YEAR
}

/// Summarise a value series.
pub fn summarize_performance(
    input: &SummaryInput,
) -> WalkForwardResult<ComputationOutput<PerformanceSummary>> {
    let start = Instant::now();
    let initial_capital = match (input.initial_capital, input.values.first()) {
        (Some(c), _) => c,
        (None, Some(first)) => *first,
        (None, None) => {
            return Err(WalkForwardError::InsufficientData(
                "Value series is empty".into(),
            ))
        }
    };

    let summarizer = PerformanceSummarizer::new(input.periods_per_year)?;
    let summary = summarizer.summarize(initial_capital, &input.values)?;

    let mut warnings = Vec::new();
    if input.initial_capital.is_none() {
        warnings.push("initial_capital not supplied; first value used".to_string());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Performance summary from daily simple returns (sample standard deviation)",
        &serde_json::json!({
            "initial_capital": initial_capital,
            "periods_per_year": input.periods_per_year,
            "observations": input.values.len(),
            "sharpe_risk_free_rate": 0.0,
        }),
        warnings,
        elapsed,
        summary,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_flat_series_has_degenerate_sharpe() {
        let s = PerformanceSummarizer::default();
        let values = vec![100.0; 10];
        let stats = s.statistics(100.0, &values).unwrap();
        assert_eq!(stats.total_return, 0.0);
        assert_eq!(stats.annualized_volatility, 0.0);
        assert!(matches!(
            s.summarize(100.0, &values),
            Err(WalkForwardError::DegenerateVariance { .. })
        ));
    }

    #[test]
    fn test_summary_values() {
        let s = PerformanceSummarizer::default();
        let values = vec![101.0, 99.99, 102.9897];
        let summary = s.summarize(100.0, &values).unwrap();
        // daily: -0.01, 0.03
        assert_abs_diff_eq!(summary.total_return, 0.029897, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.annualized_return, 0.01 * 252.0, epsilon = 1e-10);
        let stdev = (2.0 * 0.02f64.powi(2)).sqrt();
        assert_abs_diff_eq!(summary.annualized_volatility, stdev * 252f64.sqrt(), epsilon = 1e-10);
        assert_abs_diff_eq!(
            summary.sharpe_ratio,
            summary.annualized_return / summary.annualized_volatility,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(summary.max_drawdown, 0.01, epsilon = 1e-12);
        assert_eq!(summary.observations, 3);
    }

    #[test]
    fn test_max_drawdown_tracks_running_peak() {
        let dd = max_drawdown(100.0, &[120.0, 90.0, 130.0, 117.0]);
        assert_abs_diff_eq!(dd, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_too_few_values() {
        let s = PerformanceSummarizer::default();
        assert!(matches!(
            s.statistics(100.0, &[100.0, 101.0]),
            Err(WalkForwardError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_entry_point_defaults_capital_to_first_value() {
        let input: SummaryInput =
            serde_json::from_str(r#"{"values": [100.0, 110.0, 99.0, 121.0]}"#).unwrap();
        let out = summarize_performance(&input).unwrap();
        assert_abs_diff_eq!(out.result.total_return, 0.21, epsilon = 1e-12);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }
}
