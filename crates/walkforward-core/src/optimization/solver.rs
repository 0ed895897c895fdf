//! Solver-agnostic description of a smooth minimisation problem with box
//! bounds and linear equality constraints.
//!
//! `MaxSharpeOptimizer` talks to the numerical backend only through
//! [`ConstrainedSolver`], so an interior-point or projected-gradient backend
//! can replace [`SqpSolver`](super::sqp::SqpSolver) without touching the
//! rolling backtest.

use serde::{Deserialize, Serialize};

use crate::error::WalkForwardError;
use crate::linalg::dot;
use crate::WalkForwardResult;

/// Constraint magnitudes below this count as satisfied.
pub const FEASIBILITY_EPSILON: f64 = 1e-8;

/// A smooth objective `f: R^n -> R`.
pub trait Objective {
    fn value(&self, x: &[f64]) -> f64;

    /// Gradient of `value`. Defaults to central finite differences.
    fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut probe = x.to_vec();
        (0..x.len())
            .map(|i| {
                let h = 1e-7 * x[i].abs().max(1.0);
                probe[i] = x[i] + h;
                let up = self.value(&probe);
                probe[i] = x[i] - h;
                let down = self.value(&probe);
                probe[i] = x[i];
                (up - down) / (2.0 * h)
            })
            .collect()
    }
}

/// Closed interval `[lower, upper]` for one decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// The long-only, no-leverage interval `[0, 1]`.
    pub fn unit() -> Self {
        Self::new(0.0, 1.0)
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.max(self.lower).min(self.upper)
    }
}

/// Linear equality `coefficients . x = rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearEquality {
    pub coefficients: Vec<f64>,
    pub rhs: f64,
}

impl LinearEquality {
    /// `sum(x) = total`, the full-investment constraint when `total = 1`.
    pub fn sum_to(n: usize, total: f64) -> Self {
        Self {
            coefficients: vec![1.0; n],
            rhs: total,
        }
    }

    pub fn residual(&self, x: &[f64]) -> f64 {
        dot(&self.coefficients, x) - self.rhs
    }
}

/// Iteration budget and convergence tolerance for a solver run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Maximum number of outer iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Stop once the step or the objective change falls below this.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_max_iterations() -> u32 {
    100
}

fn default_tolerance() -> f64 {
    1e-9
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> WalkForwardResult<()> {
        if self.max_iterations == 0 {
            return Err(WalkForwardError::InvalidInput {
                field: "solver.max_iterations".into(),
                reason: "Iteration budget must be at least 1".into(),
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(WalkForwardError::InvalidInput {
                field: "solver.tolerance".into(),
                reason: format!("Tolerance must be positive and finite, got {}", self.tolerance),
            });
        }
        Ok(())
    }
}

/// How a solver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Converged,
    IterationLimit,
    LineSearchFailed,
    NonFiniteObjective,
    SubproblemFailed,
}

/// Result of a solver run. `x` is always feasible; when `status` is not
/// `Converged` it is the best iterate reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOutcome {
    pub x: Vec<f64>,
    pub objective: f64,
    pub iterations: u32,
    pub status: SolverStatus,
}

impl SolverOutcome {
    pub fn converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

/// A local minimiser for smooth objectives under box bounds and linear
/// equality constraints, handled natively rather than by penalties.
pub trait ConstrainedSolver {
    fn solve_constrained_minimum(
        &self,
        objective: &dyn Objective,
        initial_guess: &[f64],
        bounds: &[Bound],
        equality_constraints: &[LinearEquality],
    ) -> WalkForwardResult<SolverOutcome>;
}

/// Shape and feasibility checks shared by solver backends.
pub fn validate_problem(
    initial_guess: &[f64],
    bounds: &[Bound],
    equality_constraints: &[LinearEquality],
) -> WalkForwardResult<()> {
    let n = initial_guess.len();
    if n == 0 {
        return Err(WalkForwardError::InvalidInput {
            field: "initial_guess".into(),
            reason: "At least one decision variable required".into(),
        });
    }
    if bounds.len() != n {
        return Err(WalkForwardError::InvalidInput {
            field: "bounds".into(),
            reason: format!("Expected {} bounds but got {}", n, bounds.len()),
        });
    }
    for (i, (b, x)) in bounds.iter().zip(initial_guess.iter()).enumerate() {
        if b.lower > b.upper {
            return Err(WalkForwardError::InvalidInput {
                field: format!("bounds[{}]", i),
                reason: format!("lower {} exceeds upper {}", b.lower, b.upper),
            });
        }
        if !x.is_finite() || *x < b.lower - FEASIBILITY_EPSILON || *x > b.upper + FEASIBILITY_EPSILON {
            return Err(WalkForwardError::InvalidInput {
                field: format!("initial_guess[{}]", i),
                reason: format!("{} lies outside [{}, {}]", x, b.lower, b.upper),
            });
        }
    }
    for (k, eq) in equality_constraints.iter().enumerate() {
        if eq.coefficients.len() != n {
            return Err(WalkForwardError::InvalidInput {
                field: format!("equality_constraints[{}]", k),
                reason: format!("Expected {} coefficients but got {}", n, eq.coefficients.len()),
            });
        }
        if eq.residual(initial_guess).abs() > FEASIBILITY_EPSILON {
            return Err(WalkForwardError::InvalidInput {
                field: format!("equality_constraints[{}]", k),
                reason: "Initial guess violates the constraint".into(),
            });
        }
    }
    Ok(())
}
