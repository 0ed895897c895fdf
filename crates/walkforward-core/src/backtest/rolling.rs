use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::backtest::config::BacktestConfig;
use crate::error::WalkForwardError;
use crate::linalg::dot;
use crate::optimization::{ConstrainedSolver, MaxSharpeOptimizer, SolverStatus, SqpSolver};
use crate::returns::ReturnSeries;
use crate::types::{DatedValue, Money};
use crate::WalkForwardResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Out-of-sample portfolio value, one point per evaluated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValueSeries {
    pub initial_capital: Money,
    pub points: Vec<DatedValue>,
}

impl PortfolioValueSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Last value, or the initial capital for an empty series.
    pub fn final_value(&self) -> Money {
        self.points
            .last()
            .map_or(self.initial_capital, |p| p.value)
    }
}

/// Weights chosen for one out-of-sample day and the window behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowAllocation {
    /// Evaluation date (row i).
    pub date: NaiveDate,
    /// First date of the estimation window (row i - W).
    pub window_start: NaiveDate,
    /// Last date of the estimation window (row i - 1).
    pub window_end: NaiveDate,
    pub weights: Vec<f64>,
    /// In-sample annualised expected return.
    pub expected_return: f64,
    /// In-sample annualised volatility.
    pub volatility: Option<f64>,
    /// In-sample Sharpe ratio.
    pub sharpe_ratio: Option<f64>,
    /// Realised portfolio return on `date`.
    pub realized_return: f64,
    pub iterations: u32,
    pub converged: bool,
}

/// Non-fatal conditions met during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BacktestWarning {
    /// The optimizer stopped short of tolerance; its best iterate was used.
    OptimizerNonConvergence {
        date: NaiveDate,
        iterations: u32,
        status: SolverStatus,
    },
    /// Incomplete input rows removed under `MissingDataPolicy::DropAndReport`.
    DroppedRows { dates: Vec<NaiveDate> },
}

impl fmt::Display for BacktestWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacktestWarning::OptimizerNonConvergence {
                date,
                iterations,
                status,
            } => write!(
                f,
                "Optimizer did not converge for {} after {} iterations ({:?}); best iterate used",
                date, iterations, status
            ),
            BacktestWarning::DroppedRows { dates } => {
                write!(f, "{} incomplete input rows dropped", dates.len())?;
                if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
                    write!(f, " between {} and {}", first, last)?;
                }
                Ok(())
            }
        }
    }
}

/// Everything a completed run hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub values: PortfolioValueSeries,
    pub allocations: Vec<WindowAllocation>,
    pub warnings: Vec<BacktestWarning>,
}

// ---------------------------------------------------------------------------
// Backtester
// ---------------------------------------------------------------------------

/// Walk-forward loop: re-optimise on the trailing W rows, hold the weights
/// for the next unseen row, compound.
///
/// Row i is never part of the window that produced its weights. The run is
/// stateless, so identical inputs give identical output.
#[derive(Debug, Clone)]
pub struct RollingBacktester<S = SqpSolver> {
    config: BacktestConfig,
    num_assets: usize,
    optimizer: MaxSharpeOptimizer<S>,
}

impl RollingBacktester<SqpSolver> {
    /// Validate `config` for a universe of `num_assets` assets.
    ///
    /// Fails with `InsufficientWindow` when `W <= N`.
    pub fn new(config: BacktestConfig, num_assets: usize) -> WalkForwardResult<Self> {
        config.validate(num_assets)?;
        let optimizer = MaxSharpeOptimizer::new(config.metrics(), config.solver);
        Ok(Self {
            config,
            num_assets,
            optimizer,
        })
    }
}

impl<S: ConstrainedSolver> RollingBacktester<S> {
    /// Backtester driven by a different solver backend.
    pub fn with_solver(
        config: BacktestConfig,
        num_assets: usize,
        solver: S,
    ) -> WalkForwardResult<Self> {
        config.validate(num_assets)?;
        let optimizer = MaxSharpeOptimizer::with_solver(solver, config.metrics());
        Ok(Self {
            config,
            num_assets,
            optimizer,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run the walk-forward simulation over `series`.
    ///
    /// Produces exactly `T - W` values. Fails before any optimisation when
    /// the series does not match the configured universe or `T <= W`.
    pub fn run(&self, series: &ReturnSeries) -> WalkForwardResult<BacktestRun> {
        let t = series.len();
        let w = self.config.window_days;

        if series.num_assets() != self.num_assets {
            return Err(WalkForwardError::InvalidInput {
                field: "returns".into(),
                reason: format!(
                    "Series has {} assets, backtester configured for {}",
                    series.num_assets(),
                    self.num_assets
                ),
            });
        }
        if t <= w {
            return Err(WalkForwardError::InsufficientData(format!(
                "{} return rows cannot cover a {}-day window plus one evaluation day",
                t, w
            )));
        }

        info!(
            assets = self.num_assets,
            rows = t,
            window_days = w,
            steps = t - w,
            "starting walk-forward backtest"
        );

        let mut value = self.config.initial_capital;
        let mut points = Vec::with_capacity(t - w);
        let mut allocations = Vec::with_capacity(t - w);
        let mut warnings = Vec::new();

        for i in w..t {
            let date = series.date(i);
            let window = series.window(i - w, i);
            let estimate = window.estimate()?;
            let allocation = self
                .optimizer
                .optimize_estimate(&estimate)
                .map_err(|e| match e {
                    WalkForwardError::InvalidWeights { reason } => {
                        WalkForwardError::InvalidWeights {
                            reason: format!("{} (evaluation date {})", reason, date),
                        }
                    }
                    other => other,
                })?;

            if !allocation.converged() {
                warn!(
                    %date,
                    iterations = allocation.iterations,
                    status = ?allocation.status,
                    "optimizer did not converge; using best iterate"
                );
                warnings.push(BacktestWarning::OptimizerNonConvergence {
                    date,
                    iterations: allocation.iterations,
                    status: allocation.status,
                });
            }

            let realized = dot(&allocation.weights, series.row(i));
            value *= 1.0 + realized;
            debug!(%date, realized, value, iterations = allocation.iterations, "window evaluated");

            points.push(DatedValue { date, value });
            allocations.push(WindowAllocation {
                date,
                window_start: series.date(i - w),
                window_end: series.date(i - 1),
                weights: allocation.weights,
                expected_return: allocation.expected_return,
                volatility: allocation.volatility,
                sharpe_ratio: allocation.sharpe_ratio,
                realized_return: realized,
                iterations: allocation.iterations,
                converged: allocation.status == SolverStatus::Converged,
            });
        }

        info!(
            final_value = value,
            non_converged = warnings.len(),
            "walk-forward backtest complete"
        );

        Ok(BacktestRun {
            values: PortfolioValueSeries {
                initial_capital: self.config.initial_capital,
                points,
            },
            allocations,
            warnings,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
