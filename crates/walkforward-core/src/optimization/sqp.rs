//! Sequential quadratic programming for smooth objectives under box bounds
//! and linear equality constraints.
//!
//! Each outer iteration solves the quadratic model
//!
//! ```text
//! min  1/2 d'Bd + g'd   s.t.  A d = 0,  lower - x <= d <= upper - x
//! ```
//!
//! with a primal active-set method, where `B` is a damped-BFGS
//! approximation of the Hessian. Because every constraint is linear and the
//! iterate is feasible, any step `x + a*d` with `a` in `[0, 1]` stays feasible,
//! so the line search is a plain Armijo backtrack on the objective.

use tracing::debug;

use crate::error::WalkForwardError;
use crate::linalg::{dot, mat_vec_multiply, solve_linear_system};
use crate::optimization::solver::{
    validate_problem, Bound, ConstrainedSolver, LinearEquality, Objective, SolverOutcome,
    SolverSettings, SolverStatus,
};
use crate::WalkForwardResult;

const ARMIJO_C: f64 = 1e-4;
const MAX_LINE_SEARCH_STEPS: u32 = 40;
const QP_STEP_EPSILON: f64 = 1e-13;
const MULTIPLIER_EPSILON: f64 = 1e-12;
const CURVATURE_EPSILON: f64 = 1e-18;

/// Damped-BFGS SQP solver with an active-set QP subproblem.
#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    settings: SolverSettings,
}

impl SqpSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }
}

impl ConstrainedSolver for SqpSolver {
    fn solve_constrained_minimum(
        &self,
        objective: &dyn Objective,
        initial_guess: &[f64],
        bounds: &[Bound],
        equality_constraints: &[LinearEquality],
    ) -> WalkForwardResult<SolverOutcome> {
        self.settings.validate()?;
        validate_problem(initial_guess, bounds, equality_constraints)?;

        let n = initial_guess.len();
        let tol = self.settings.tolerance;
        let a: Vec<Vec<f64>> = equality_constraints
            .iter()
            .map(|eq| eq.coefficients.clone())
            .collect();

        let mut x: Vec<f64> = initial_guess
            .iter()
            .zip(bounds.iter())
            .map(|(xi, b)| b.clamp(*xi))
            .collect();
        let mut f = objective.value(&x);
        if !f.is_finite() {
            debug!(objective = f, "objective is not finite at the initial guess");
            return Ok(SolverOutcome {
                x,
                objective: f,
                iterations: 0,
                status: SolverStatus::NonFiniteObjective,
            });
        }
        let mut g = objective.gradient(&x);
        let mut hessian = identity(n);
        let mut fresh_hessian = true;

        let mut status = SolverStatus::IterationLimit;
        let mut iterations = 0;

        while iterations < self.settings.max_iterations {
            iterations += 1;

            let lower: Vec<f64> = bounds.iter().zip(x.iter()).map(|(b, xi)| b.lower - xi).collect();
            let upper: Vec<f64> = bounds.iter().zip(x.iter()).map(|(b, xi)| b.upper - xi).collect();

            let d = match solve_qp_subproblem(&hessian, &g, &lower, &upper, &a) {
                Ok(d) => d,
                Err(e) => {
                    debug!(error = %e, iterations, "QP subproblem failed");
                    status = SolverStatus::SubproblemFailed;
                    break;
                }
            };

            if inf_norm(&d) <= tol {
                status = SolverStatus::Converged;
                break;
            }

            let slope = dot(&g, &d);
            let accepted = if slope < 0.0 {
                backtrack(objective, &x, &d, bounds, f, slope)
            } else {
                None
            };

            let Some((x_new, f_new)) = accepted else {
                if fresh_hessian {
                    status = SolverStatus::LineSearchFailed;
                    break;
                }
                // Stale curvature; retry from steepest descent.
                hessian = identity(n);
                fresh_hessian = true;
                continue;
            };

            let g_new = objective.gradient(&x_new);
            let s: Vec<f64> = x_new.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = g_new.iter().zip(g.iter()).map(|(a, b)| a - b).collect();
            if damped_bfgs_update(&mut hessian, &s, &y) {
                fresh_hessian = false;
            }

            let improvement = f - f_new;
            x = x_new;
            f = f_new;
            g = g_new;

            if improvement.abs() <= tol {
                status = SolverStatus::Converged;
                break;
            }
        }

        debug!(iterations, objective = f, ?status, "SQP finished");
        Ok(SolverOutcome {
            x,
            objective: f,
            iterations,
            status,
        })
    }
}

/// Armijo backtracking along `d`. Returns the accepted point and its value.
fn backtrack(
    objective: &dyn Objective,
    x: &[f64],
    d: &[f64],
    bounds: &[Bound],
    f: f64,
    slope: f64,
) -> Option<(Vec<f64>, f64)> {
    let mut alpha = 1.0;
    for _ in 0..MAX_LINE_SEARCH_STEPS {
        let trial: Vec<f64> = x
            .iter()
            .zip(d.iter())
            .zip(bounds.iter())
            .map(|((xi, di), b)| b.clamp(xi + alpha * di))
            .collect();
        let f_trial = objective.value(&trial);
        if f_trial.is_finite() && f_trial <= f + ARMIJO_C * alpha * slope {
            return Some((trial, f_trial));
        }
        alpha *= 0.5;
    }
    None
}

/// Powell-damped BFGS update of `b`. Returns false when the pair carries no
/// usable curvature and `b` is left untouched.
#[allow(clippy::needless_range_loop)]
fn damped_bfgs_update(b: &mut [Vec<f64>], s: &[f64], y: &[f64]) -> bool {
    let bs = mat_vec_multiply(b, s);
    let sbs = dot(s, &bs);
    if sbs <= CURVATURE_EPSILON {
        return false;
    }
    let sy = dot(s, y);
    let theta = if sy >= 0.2 * sbs {
        1.0
    } else {
        0.8 * sbs / (sbs - sy)
    };
    let r: Vec<f64> = y
        .iter()
        .zip(bs.iter())
        .map(|(yi, bsi)| theta * yi + (1.0 - theta) * bsi)
        .collect();
    let sr = dot(s, &r);
    if sr <= CURVATURE_EPSILON {
        return false;
    }
    let n = s.len();
    for i in 0..n {
        for j in 0..n {
            b[i][j] += r[i] * r[j] / sr - bs[i] * bs[j] / sbs;
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveBound {
    Lower,
    Upper,
}

/// Primal active-set solve of
/// `min 1/2 d'Hd + g'd  s.t.  A d = 0,  lower <= d <= upper`
/// starting from the feasible point `d = 0` (requires `lower <= 0 <= upper`).
///
/// If the iteration cap is hit the current, feasible `d` is returned.
#[allow(clippy::needless_range_loop)]
fn solve_qp_subproblem(
    h: &[Vec<f64>],
    g: &[f64],
    lower: &[f64],
    upper: &[f64],
    a: &[Vec<f64>],
) -> WalkForwardResult<Vec<f64>> {
    let n = g.len();
    let m = a.len();
    let mut d = vec![0.0; n];
    let mut active: Vec<Option<ActiveBound>> = vec![None; n];
    let max_iterations = 10 * (n + m) + 20;

    for _ in 0..max_iterations {
        let free: Vec<usize> = (0..n).filter(|&i| active[i].is_none()).collect();
        let grad: Vec<f64> = mat_vec_multiply(h, &d)
            .iter()
            .zip(g.iter())
            .map(|(hd, gi)| hd + gi)
            .collect();

        let (p, lambda) = solve_equality_qp(h, &grad, a, &free)?;

        if p.iter().all(|pi| pi.abs() <= QP_STEP_EPSILON) {
            let mut release: Option<(usize, f64)> = None;
            for i in 0..n {
                let Some(side) = active[i] else {
                    continue;
                };
                let reduced = grad[i] + (0..m).map(|k| a[k][i] * lambda[k]).sum::<f64>();
                let multiplier = match side {
                    ActiveBound::Lower => reduced,
                    ActiveBound::Upper => -reduced,
                };
                if multiplier < -MULTIPLIER_EPSILON
                    && release.map_or(true, |(_, worst)| multiplier < worst)
                {
                    release = Some((i, multiplier));
                }
            }
            match release {
                None => return Ok(d),
                Some((i, _)) => active[i] = None,
            }
            continue;
        }

        let mut alpha = 1.0;
        let mut blocking: Option<(usize, ActiveBound)> = None;
        for (k, &i) in free.iter().enumerate() {
            let (limit, side) = if p[k] < 0.0 {
                ((lower[i] - d[i]) / p[k], ActiveBound::Lower)
            } else if p[k] > 0.0 {
                ((upper[i] - d[i]) / p[k], ActiveBound::Upper)
            } else {
                continue;
            };
            let limit = limit.max(0.0);
            if limit < alpha {
                alpha = limit;
                blocking = Some((i, side));
            }
        }

        for (k, &i) in free.iter().enumerate() {
            d[i] += alpha * p[k];
        }
        if let Some((i, side)) = blocking {
            d[i] = match side {
                ActiveBound::Lower => lower[i],
                ActiveBound::Upper => upper[i],
            };
            active[i] = Some(side);
        }
    }

    Ok(d)
}

/// Solve the KKT system on the free variables:
/// `[H_FF A_F'; A_F 0] [p; lambda] = [-grad_F; 0]`.
#[allow(clippy::needless_range_loop)]
fn solve_equality_qp(
    h: &[Vec<f64>],
    grad: &[f64],
    a: &[Vec<f64>],
    free: &[usize],
) -> WalkForwardResult<(Vec<f64>, Vec<f64>)> {
    let nf = free.len();
    let m = a.len();
    if nf == 0 {
        return Err(WalkForwardError::SingularMatrix {
            context: "QP subproblem: every variable is at a bound".into(),
        });
    }

    let size = nf + m;
    let mut kkt = vec![vec![0.0; size]; size];
    let mut rhs = vec![0.0; size];
    for (r, &i) in free.iter().enumerate() {
        for (c, &j) in free.iter().enumerate() {
            kkt[r][c] = h[i][j];
        }
        for k in 0..m {
            kkt[r][nf + k] = a[k][i];
            kkt[nf + k][r] = a[k][i];
        }
        rhs[r] = -grad[i];
    }

    let solution = solve_linear_system(&kkt, &rhs, "QP subproblem KKT system")?;
    let p = solution[..nf].to_vec();
    let lambda = solution[nf..].to_vec();
    Ok((p, lambda))
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}
