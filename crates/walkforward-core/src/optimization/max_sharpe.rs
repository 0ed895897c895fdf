use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::WalkForwardError;
use crate::optimization::metrics::PortfolioMetrics;
use crate::optimization::solver::{
    Bound, ConstrainedSolver, LinearEquality, Objective, SolverSettings, SolverStatus,
    FEASIBILITY_EPSILON,
};
use crate::optimization::sqp::SqpSolver;
use crate::returns::{ReturnSeries, WindowEstimate};
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::WalkForwardResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Long-only, fully invested allocation maximising the in-sample Sharpe ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxSharpeAllocation {
    /// Weights in [0, 1] summing to one.
    pub weights: Vec<f64>,
    /// Annualised in-sample expected return.
    pub expected_return: f64,
    /// Annualised in-sample volatility; `None` for a zero-variance window.
    pub volatility: Option<f64>,
    /// In-sample Sharpe ratio; `None` for a zero-variance window.
    pub sharpe_ratio: Option<f64>,
    /// Solver iterations used.
    pub iterations: u32,
    /// How the solver run ended.
    pub status: SolverStatus,
}

impl MaxSharpeAllocation {
    pub fn converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

/// Negative Sharpe ratio over fixed window moments.
struct NegativeSharpe<'a> {
    metrics: PortfolioMetrics,
    mean: &'a [f64],
    covariance: &'a [Vec<f64>],
}

impl Objective for NegativeSharpe<'_> {
    fn value(&self, x: &[f64]) -> f64 {
        self.metrics.negative_sharpe(x, self.mean, self.covariance)
    }

    fn gradient(&self, x: &[f64]) -> Vec<f64> {
        self.metrics
            .negative_sharpe_gradient(x, self.mean, self.covariance)
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Maximum-Sharpe allocation under `sum(w) = 1`, `0 <= w <= 1`.
///
/// The solver is seeded from the uniform allocation and converges to a local
/// optimum. The feasible set is convex, and away from zero variance the
/// uniform seed lands on the global optimum in practice, but that is not
/// guaranteed.
#[derive(Debug, Clone)]
pub struct MaxSharpeOptimizer<S = SqpSolver> {
    solver: S,
    metrics: PortfolioMetrics,
}

impl MaxSharpeOptimizer<SqpSolver> {
    pub fn new(metrics: PortfolioMetrics, settings: SolverSettings) -> Self {
        Self {
            solver: SqpSolver::new(settings),
            metrics,
        }
    }
}

impl<S: ConstrainedSolver> MaxSharpeOptimizer<S> {
    /// Use an alternative solver backend.
    pub fn with_solver(solver: S, metrics: PortfolioMetrics) -> Self {
        Self { solver, metrics }
    }

    pub fn metrics(&self) -> &PortfolioMetrics {
        &self.metrics
    }

    /// Optimise against a window's mean vector and covariance matrix.
    ///
    /// Non-convergence is not an error: the best feasible iterate comes back
    /// with `status` set accordingly.
    pub fn optimize(
        &self,
        mean: &[f64],
        covariance: &[Vec<f64>],
    ) -> WalkForwardResult<MaxSharpeAllocation> {
        let n = mean.len();
        validate_moments(mean, covariance)?;

        let objective = NegativeSharpe {
            metrics: self.metrics,
            mean,
            covariance,
        };
        let initial_guess = vec![1.0 / n as f64; n];
        let bounds = vec![Bound::unit(); n];
        let equality = [LinearEquality::sum_to(n, 1.0)];

        let outcome =
            self.solver
                .solve_constrained_minimum(&objective, &initial_guess, &bounds, &equality)?;

        let weights = sanitize_weights(outcome.x)?;
        let expected_return = self.metrics.annualized_return(&weights, mean);
        let volatility = self.metrics.annualized_volatility(&weights, covariance).ok();
        let sharpe_ratio = volatility.map(|v| (expected_return - self.metrics.risk_free_rate) / v);

        Ok(MaxSharpeAllocation {
            weights,
            expected_return,
            volatility,
            sharpe_ratio,
            iterations: outcome.iterations,
            status: outcome.status,
        })
    }

    /// Optimise against precomputed window moments.
    pub fn optimize_estimate(&self, estimate: &WindowEstimate) -> WalkForwardResult<MaxSharpeAllocation> {
        self.optimize(&estimate.mean, &estimate.covariance)
    }
}

// ---------------------------------------------------------------------------
// Weight hygiene
// ---------------------------------------------------------------------------

/// Clamp sub-epsilon drift into `[0, 1]` and renormalise to sum one.
///
/// Anything beyond numerical drift (non-finite values, materially negative
/// weights, a sum far from one) is rejected instead of repaired.
pub fn sanitize_weights(mut weights: Vec<f64>) -> WalkForwardResult<Vec<f64>> {
    if let Some(i) = weights.iter().position(|w| !w.is_finite()) {
        return Err(WalkForwardError::InvalidWeights {
            reason: format!("weight {} is not finite", i),
        });
    }
    if let Some(i) = weights
        .iter()
        .position(|w| *w < -FEASIBILITY_EPSILON || *w > 1.0 + FEASIBILITY_EPSILON)
    {
        return Err(WalkForwardError::InvalidWeights {
            reason: format!("weight {} = {} lies outside [0, 1]", i, weights[i]),
        });
    }
    weights.iter_mut().for_each(|w| *w = w.clamp(0.0, 1.0));

    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(WalkForwardError::InvalidWeights {
            reason: format!("weights sum to {} instead of 1", total),
        });
    }
    weights.iter_mut().for_each(|w| *w /= total);
    Ok(weights)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_moments(mean: &[f64], covariance: &[Vec<f64>]) -> WalkForwardResult<()> {
    let n = mean.len();
    if n == 0 {
        return Err(WalkForwardError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if mean.iter().any(|m| !m.is_finite()) {
        return Err(WalkForwardError::InvalidInput {
            field: "mean".into(),
            reason: "Mean returns must be finite".into(),
        });
    }
    validate_covariance_matrix(covariance, n)
}

#[allow(clippy::needless_range_loop)]
fn validate_covariance_matrix(cov: &[Vec<f64>], n: usize) -> WalkForwardResult<()> {
    if cov.len() != n {
        return Err(WalkForwardError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(WalkForwardError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(WalkForwardError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} contains a non-finite entry", i),
            });
        }
        if row[i] < 0.0 {
            return Err(WalkForwardError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Negative variance on diagonal entry {}", i),
            });
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let scale = cov[i][i].abs().max(cov[j][j].abs()).max(1e-300);
            if (cov[i][j] - cov[j][i]).abs() > 1e-9 * scale {
                return Err(WalkForwardError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Single-window entry point
// ---------------------------------------------------------------------------

/// Input for a one-off maximum-Sharpe optimisation over a block of returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxSharpeInput {
    /// Estimation window; every row is used.
    pub returns: ReturnSeries,
    /// Annual risk-free rate.
    #[serde(default)]
    pub risk_free_rate: Rate,
    /// Observations per year (default 252).
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    #[serde(default)]
    pub solver: SolverSettings,
}

fn default_periods_per_year() -> f64 {
    crate::optimization::metrics::TRADING_DAYS_PER_YEAR
}

/// Named weight in a single-window result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetWeight {
    pub name: String,
    pub weight: f64,
}

/// Output of [`optimize_max_sharpe`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxSharpeOutput {
    pub weights: Vec<AssetWeight>,
    pub expected_return: f64,
    pub volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub iterations: u32,
    pub converged: bool,
    pub observations: usize,
}

/// Estimate moments from every row of `input.returns` and return the
/// maximum-Sharpe allocation.
pub fn optimize_max_sharpe(
    input: &MaxSharpeInput,
) -> WalkForwardResult<ComputationOutput<MaxSharpeOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let series = &input.returns;
    let n = series.num_assets();
    if series.len() <= n {
        return Err(WalkForwardError::InsufficientWindow {
            window_days: series.len(),
            num_assets: n,
        });
    }
    if !(input.periods_per_year.is_finite() && input.periods_per_year > 0.0) {
        return Err(WalkForwardError::InvalidInput {
            field: "periods_per_year".into(),
            reason: "Must be positive".into(),
        });
    }

    let metrics = PortfolioMetrics::new(input.periods_per_year, input.risk_free_rate);
    let optimizer = MaxSharpeOptimizer::new(metrics, input.solver);
    let estimate = series.window(0, series.len()).estimate()?;
    let allocation = optimizer.optimize_estimate(&estimate)?;

    if !allocation.converged() {
        warnings.push(format!(
            "Optimizer stopped after {} iterations ({:?}); best iterate returned",
            allocation.iterations, allocation.status
        ));
    }
    if allocation.volatility.is_none() {
        warnings.push("Window has zero variance; Sharpe ratio undefined".into());
    }

    let output = MaxSharpeOutput {
        weights: series
            .assets()
            .iter()
            .zip(allocation.weights.iter())
            .map(|(name, w)| AssetWeight {
                name: name.clone(),
                weight: *w,
            })
            .collect(),
        expected_return: allocation.expected_return,
        volatility: allocation.volatility,
        sharpe_ratio: allocation.sharpe_ratio,
        iterations: allocation.iterations,
        converged: allocation.converged(),
        observations: series.len(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Long-only maximum Sharpe ratio (SQP, uniform seed)",
        &serde_json::json!({
            "n_assets": n,
            "observations": series.len(),
            "risk_free_rate": input.risk_free_rate,
            "periods_per_year": input.periods_per_year,
            "max_iterations": input.solver.max_iterations,
            "tolerance": input.solver.tolerance,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn optimizer(rf: f64) -> MaxSharpeOptimizer {
        MaxSharpeOptimizer::new(PortfolioMetrics::new(252.0, rf), SolverSettings::default())
    }

    /// Long-only tangency weights for a diagonal covariance are proportional
    /// to `(mu_i - rf/P) / sigma_i^2` when all are positive.
    #[test]
    fn test_diagonal_covariance_matches_closed_form() {
        let mean = vec![0.0008, 0.0005, 0.0003];
        let var = vec![0.0002, 0.0001, 0.00005];
        let cov = vec![
            vec![var[0], 0.0, 0.0],
            vec![0.0, var[1], 0.0],
            vec![0.0, 0.0, var[2]],
        ];
        let rf = 0.02;
        let raw: Vec<f64> = (0..3).map(|i| (mean[i] - rf / 252.0) / var[i]).collect();
        let total: f64 = raw.iter().sum();

        let alloc = optimizer(rf).optimize(&mean, &cov).unwrap();
        assert!(alloc.converged());
        for i in 0..3 {
            assert_abs_diff_eq!(alloc.weights[i], raw[i] / total, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_negative_excess_asset_gets_zero_weight() {
        // Third asset has a negative mean; long-only tangency drops it.
        let mean = vec![0.0006, 0.0004, -0.0005];
        let cov = vec![
            vec![0.0001, 0.0, 0.0],
            vec![0.0, 0.0001, 0.0],
            vec![0.0, 0.0, 0.0001],
        ];
        let alloc = optimizer(0.0).optimize(&mean, &cov).unwrap();
        assert_abs_diff_eq!(alloc.weights[2], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(alloc.weights[0], 0.6, epsilon = 1e-4);
        assert_abs_diff_eq!(alloc.weights[1], 0.4, epsilon = 1e-4);
    }

    #[test]
    fn test_identical_assets_stay_uniform() {
        let mean = vec![0.0005; 4];
        let cov = vec![vec![0.0001; 4]; 4];
        let alloc = optimizer(0.02).optimize(&mean, &cov).unwrap();
        for w in &alloc.weights {
            assert_abs_diff_eq!(*w, 0.25, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_variance_window_returns_uniform() {
        let mean = vec![0.0, 0.0];
        let cov = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let alloc = optimizer(0.02).optimize(&mean, &cov).unwrap();
        assert_eq!(alloc.status, SolverStatus::NonFiniteObjective);
        assert_eq!(alloc.weights, vec![0.5, 0.5]);
        assert!(alloc.volatility.is_none());
        assert!(alloc.sharpe_ratio.is_none());
    }

    #[test]
    fn test_asymmetric_covariance_rejected() {
        let cov = vec![vec![0.0001, 0.00002], vec![0.0, 0.0001]];
        assert!(optimizer(0.0).optimize(&[0.001, 0.001], &cov).is_err());
    }

    #[test]
    fn test_sanitize_weights() {
        let w = sanitize_weights(vec![0.5 + 1e-12, 0.5, -1e-12]).unwrap();
        assert!(w.iter().all(|x| *x >= 0.0));
        assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-15);

        assert!(sanitize_weights(vec![0.7, 0.7]).is_err());
        assert!(sanitize_weights(vec![1.2, -0.2]).is_err());
        assert!(sanitize_weights(vec![f64::NAN, 1.0]).is_err());
    }

    /// Constant-step solver used to prove the optimizer is backend-agnostic.
    struct UniformSolver;

    impl ConstrainedSolver for UniformSolver {
        fn solve_constrained_minimum(
            &self,
            objective: &dyn Objective,
            initial_guess: &[f64],
            _bounds: &[Bound],
            _equality_constraints: &[LinearEquality],
        ) -> WalkForwardResult<crate::optimization::solver::SolverOutcome> {
            Ok(crate::optimization::solver::SolverOutcome {
                x: initial_guess.to_vec(),
                objective: objective.value(initial_guess),
                iterations: 0,
                status: SolverStatus::IterationLimit,
            })
        }
    }

    #[test]
    fn test_alternative_backend_is_used() {
        let opt = MaxSharpeOptimizer::with_solver(UniformSolver, PortfolioMetrics::default());
        let alloc = opt
            .optimize(&[0.001, 0.0], &[vec![0.0001, 0.0], vec![0.0, 0.0001]])
            .unwrap();
        assert_eq!(alloc.weights, vec![0.5, 0.5]);
        assert!(!alloc.converged());
    }
}
