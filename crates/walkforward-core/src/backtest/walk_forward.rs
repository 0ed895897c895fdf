use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::backtest::config::BacktestConfig;
use crate::backtest::rolling::{BacktestWarning, RollingBacktester, WindowAllocation};
use crate::backtest::summary::{PerformanceSummarizer, ReturnStatistics};
use crate::error::WalkForwardError;
use crate::returns::{IngestedReturns, PriceTable, ReturnSeries, ReturnTable};
use crate::types::{with_metadata, ComputationOutput, DatedValue, Money};
use crate::WalkForwardResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for [`run_walk_forward`]: market data plus run configuration.
///
/// Exactly one of `prices` and `returns` must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prices: Option<PriceTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ReturnTable>,
    #[serde(default)]
    pub config: BacktestConfig,
}

/// Complete result of a walk-forward backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardOutput {
    pub assets: Vec<String>,
    pub window_days: usize,
    pub initial_capital: Money,
    pub final_value: Money,
    /// One value per out-of-sample day.
    pub values: Vec<DatedValue>,
    /// Weights and in-sample metrics behind each value.
    pub allocations: Vec<WindowAllocation>,
    /// `None` when the series is too short to summarise or the portfolio
    /// value reached zero.
    pub statistics: Option<ReturnStatistics>,
    /// `None` for a zero-volatility value series.
    pub sharpe_ratio: Option<f64>,
    /// Input rows removed under `DropAndReport`.
    pub dropped_dates: Vec<NaiveDate>,
    pub backtest_warnings: Vec<BacktestWarning>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Ingest market data, run the rolling backtest and summarise the result.
///
/// Data-shape and configuration problems fail the whole call. Per-window
/// non-convergence, a wiped-out value series and an undefined summary Sharpe
/// ratio are reported as warnings.
pub fn run_walk_forward(
    input: &WalkForwardInput,
) -> WalkForwardResult<ComputationOutput<WalkForwardOutput>> {
    let start = Instant::now();
    let config = &input.config;

    let IngestedReturns {
        series,
        dropped_dates,
    } = ingest(input)?;

    let backtester = RollingBacktester::new(config.clone(), series.num_assets())?;
    let run = backtester.run(&series)?;

    let mut backtest_warnings = Vec::new();
    if !dropped_dates.is_empty() {
        backtest_warnings.push(BacktestWarning::DroppedRows {
            dates: dropped_dates.clone(),
        });
    }
    backtest_warnings.extend(run.warnings);

    let mut warnings: Vec<String> = backtest_warnings.iter().map(|w| w.to_string()).collect();

    let summarizer = PerformanceSummarizer::new(config.periods_per_year)?;
    let values = run.values.values();
    let wiped_out = run
        .values
        .points
        .iter()
        .find(|p| !(p.value.is_finite() && p.value > 0.0));
    let (statistics, sharpe_ratio) = if let Some(point) = wiped_out {
        warnings.push(format!(
            "Summary skipped: portfolio value reached {} on {}",
            point.value, point.date
        ));
        (None, None)
    } else {
        match summarizer.statistics(run.values.initial_capital, &values) {
            Ok(stats) => match summarizer.sharpe_ratio(&stats) {
                Ok(sharpe) => (Some(stats), Some(sharpe)),
                Err(e) => {
                    warnings.push(format!("Sharpe ratio undefined: {}", e));
                    (Some(stats), None)
                }
            },
            Err(WalkForwardError::InsufficientData(msg)) => {
                warnings.push(format!("Summary skipped: {}", msg));
                (None, None)
            }
            Err(e) => return Err(e),
        }
    };

    let output = WalkForwardOutput {
        assets: series.assets().to_vec(),
        window_days: config.window_days,
        initial_capital: config.initial_capital,
        final_value: run.values.final_value(),
        values: run.values.points,
        allocations: run.allocations,
        statistics,
        sharpe_ratio,
        dropped_dates,
        backtest_warnings,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Walk-forward maximum Sharpe ratio backtest (rolling sample moments, SQP, long-only)",
        &serde_json::json!({
            "window_days": config.window_days,
            "window_years": config.window_years(),
            "periods_per_year": config.periods_per_year,
            "risk_free_rate": config.risk_free_rate,
            "initial_capital": config.initial_capital,
            "max_iterations": config.solver.max_iterations,
            "tolerance": config.solver.tolerance,
            "missing_data": config.missing_data,
            "covariance": "unbiased sample, denominator W - 1",
            "rebalancing": "daily, weights from rows [i - W, i) applied to row i",
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn ingest(input: &WalkForwardInput) -> WalkForwardResult<IngestedReturns> {
    let policy = input.config.missing_data;
    match (&input.prices, &input.returns) {
        (Some(prices), None) => ReturnSeries::from_prices(prices, policy),
        (None, Some(returns)) => ReturnSeries::from_table(returns.clone(), policy),
        (Some(_), Some(_)) => Err(WalkForwardError::InvalidInput {
            field: "prices/returns".into(),
            reason: "Supply either prices or returns, not both".into(),
        }),
        (None, None) => Err(WalkForwardError::InvalidInput {
            field: "prices/returns".into(),
            reason: "Market data required: supply prices or returns".into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
