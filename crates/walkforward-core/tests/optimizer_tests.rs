use approx::assert_abs_diff_eq;

use walkforward_core::optimization::{
    optimize_max_sharpe, Bound, ConstrainedSolver, LinearEquality, MaxSharpeInput,
    MaxSharpeOptimizer, Objective, PortfolioMetrics, SolverSettings, SolverStatus, SqpSolver,
};
use walkforward_core::synthetic::SyntheticMarket;

fn metrics(rf: f64) -> PortfolioMetrics {
    PortfolioMetrics::new(252.0, rf)
}

// ---------------------------------------------------------------------------
// MaxSharpeOptimizer
// ---------------------------------------------------------------------------

#[test]
fn test_correlated_two_asset_tangency() {
    // Unconstrained tangency w ∝ Σ⁻¹ (μ - rf/P); both components positive here.
    let mean = [0.0008, 0.0004];
    let cov = vec![vec![0.0004, 0.00006], vec![0.00006, 0.0001]];
    let rf = 0.01;
    let ex = [mean[0] - rf / 252.0, mean[1] - rf / 252.0];
    let det = cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0];
    let raw = [
        (cov[1][1] * ex[0] - cov[0][1] * ex[1]) / det,
        (cov[0][0] * ex[1] - cov[1][0] * ex[0]) / det,
    ];
    let total = raw[0] + raw[1];

    let alloc = MaxSharpeOptimizer::new(metrics(rf), SolverSettings::default())
        .optimize(&mean, &cov)
        .unwrap();
    assert!(alloc.converged());
    assert_abs_diff_eq!(alloc.weights[0], raw[0] / total, epsilon = 1e-4);
    assert_abs_diff_eq!(alloc.weights[1], raw[1] / total, epsilon = 1e-4);
}

#[test]
fn test_optimum_beats_uniform_and_corners() {
    let series = SyntheticMarket::uncorrelated(
        vec!["A".into(), "B".into(), "C".into(), "D".into(), "E".into()],
        vec![0.0007, 0.0004, 0.0002, 0.0005, 0.0001],
        &[0.015, 0.009, 0.005, 0.011, 0.003],
        chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        500,
        17,
    )
    .generate_returns()
    .unwrap();
    let est = series.window(0, series.len()).estimate().unwrap();
    let m = metrics(0.02);
    let alloc = MaxSharpeOptimizer::new(m, SolverSettings::default())
        .optimize_estimate(&est)
        .unwrap();

    let best = alloc.sharpe_ratio.unwrap();
    let uniform = vec![0.2; 5];
    assert!(best >= m.sharpe_ratio(&uniform, &est.mean, &est.covariance).unwrap() - 1e-6);
    for i in 0..5 {
        let mut corner = vec![0.0; 5];
        corner[i] = 1.0;
        let s = m.sharpe_ratio(&corner, &est.mean, &est.covariance).unwrap();
        assert!(best >= s - 1e-6, "corner {} has Sharpe {} > {}", i, s, best);
    }
    assert_abs_diff_eq!(alloc.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
}

#[test]
fn test_tight_budget_still_feasible() {
    let mean = [0.0009, 0.0001, 0.0004];
    let cov = vec![
        vec![0.0003, 0.00005, 0.0],
        vec![0.00005, 0.0001, 0.00002],
        vec![0.0, 0.00002, 0.00005],
    ];
    let settings = SolverSettings {
        max_iterations: 1,
        tolerance: 1e-14,
    };
    let alloc = MaxSharpeOptimizer::new(metrics(0.0), settings)
        .optimize(&mean, &cov)
        .unwrap();
    assert_eq!(alloc.status, SolverStatus::IterationLimit);
    assert_abs_diff_eq!(alloc.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(alloc.weights.iter().all(|w| *w >= 0.0 && *w <= 1.0));
}

#[test]
fn test_dimension_mismatch_rejected() {
    let opt = MaxSharpeOptimizer::new(metrics(0.0), SolverSettings::default());
    assert!(opt.optimize(&[0.001, 0.002], &[vec![0.0001]]).is_err());
}

// ---------------------------------------------------------------------------
// SQP backend
// ---------------------------------------------------------------------------

/// Smooth convex bowl with its minimum at (1, 0.5).
struct ExpBowl;

impl Objective for ExpBowl {
    fn value(&self, x: &[f64]) -> f64 {
        (x[0] - 1.0).exp() - x[0] + 2.0 * (x[1] - 0.5).powi(2)
    }
}

#[test]
fn test_sqp_with_default_numerical_gradient() {
    let solver = SqpSolver::new(SolverSettings {
        max_iterations: 200,
        tolerance: 1e-12,
    });
    let out = solver
        .solve_constrained_minimum(
            &ExpBowl,
            &[0.2, 1.5],
            &[Bound::new(0.0, 2.0), Bound::new(0.0, 2.0)],
            &[],
        )
        .unwrap();
    assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-3);
    assert_abs_diff_eq!(out.x[1], 0.5, epsilon = 1e-3);
}

#[test]
fn test_sqp_rejects_infeasible_start() {
    let out = SqpSolver::default().solve_constrained_minimum(
        &ExpBowl,
        &[0.7, 0.7],
        &[Bound::unit(), Bound::unit()],
        &[LinearEquality::sum_to(2, 1.0)],
    );
    assert!(out.is_err());
}

// ---------------------------------------------------------------------------
// Single-window entry point
// ---------------------------------------------------------------------------

#[test]
fn test_optimize_max_sharpe_from_json() {
    let json = r#"{
        "returns": {
            "assets": ["A", "B"],
            "rows": [
                {"date": "2024-01-02", "returns": [0.011, 0.00721]},
                {"date": "2024-01-03", "returns": [-0.009, 0.00721]},
                {"date": "2024-01-04", "returns": [0.011, -0.00621]},
                {"date": "2024-01-05", "returns": [-0.009, -0.00621]}
            ]
        },
        "risk_free_rate": 0.02
    }"#;
    let input: MaxSharpeInput = serde_json::from_str(json).unwrap();
    let out = optimize_max_sharpe(&input).unwrap();
    assert_eq!(out.result.weights.len(), 2);
    assert_eq!(out.result.weights[0].name, "A");
    assert_eq!(out.result.observations, 4);
    let total: f64 = out.result.weights.iter().map(|w| w.weight).sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
}

#[test]
fn test_optimize_max_sharpe_needs_more_rows_than_assets() {
    let json = r#"{
        "returns": {
            "assets": ["A", "B"],
            "rows": [
                {"date": "2024-01-02", "returns": [0.01, 0.02]},
                {"date": "2024-01-03", "returns": [0.02, 0.01]}
            ]
        }
    }"#;
    let input: MaxSharpeInput = serde_json::from_str(json).unwrap();
    assert!(optimize_max_sharpe(&input).is_err());
}
