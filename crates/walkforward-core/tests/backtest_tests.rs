use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use walkforward_core::backtest::{
    run_walk_forward, BacktestConfig, BacktestWarning, PerformanceSummarizer, RollingBacktester,
    WalkForwardInput,
};
use walkforward_core::returns::{MissingDataPolicy, ReturnRow, ReturnSeries, ReturnTable};
use walkforward_core::synthetic::{business_days, SyntheticMarket};
use walkforward_core::WalkForwardError;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 2).unwrap()
}

/// A: mean 0.001, var 0.0001; B: mean 0.0005, var 0.00005; zero covariance.
/// Every block of four rows reproduces those moments exactly.
fn two_asset_scenario(t: usize) -> ReturnSeries {
    let vol_b = 0.00005f64.sqrt();
    let rows = (0..t)
        .map(|k| {
            let sa = if k % 2 == 0 { 1.0 } else { -1.0 };
            let sb = if k % 4 < 2 { 1.0 } else { -1.0 };
            vec![0.001 + 0.01 * sa, 0.0005 + vol_b * sb]
        })
        .collect();
    ReturnSeries::new(
        vec!["A".into(), "B".into()],
        business_days(start(), t),
        rows,
    )
    .unwrap()
}

fn synthetic(days: usize, seed: u64) -> ReturnSeries {
    SyntheticMarket {
        assets: vec!["EQ".into(), "BOND".into(), "GOLD".into(), "REIT".into()],
        mean: vec![0.0006, 0.0002, 0.0003, 0.0004],
        covariance: vec![
            vec![0.00020, 0.00002, 0.00001, 0.00008],
            vec![0.00002, 0.00003, 0.00000, 0.00001],
            vec![0.00001, 0.00000, 0.00010, 0.00001],
            vec![0.00008, 0.00001, 0.00001, 0.00015],
        ],
        start_date: start(),
        days,
        seed,
        initial_price: 100.0,
    }
    .generate_returns()
    .unwrap()
}

fn config(window_days: usize) -> BacktestConfig {
    BacktestConfig {
        window_days,
        ..BacktestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Walk-forward loop
// ---------------------------------------------------------------------------

#[test]
fn test_higher_sharpe_asset_gets_larger_weight() {
    let series = two_asset_scenario(262);
    let run = RollingBacktester::new(config(252), 2)
        .unwrap()
        .run(&series)
        .unwrap();
    assert_eq!(run.values.len(), 10);
    for alloc in &run.allocations {
        assert!(
            alloc.weights[0] > alloc.weights[1],
            "expected A overweight, got {:?}",
            alloc.weights
        );
        // Closed form for a diagonal covariance with rf = 2%
        let raw_a = (0.001 - 0.02 / 252.0) / 0.0001;
        let raw_b = (0.0005 - 0.02 / 252.0) / 0.00005;
        assert_abs_diff_eq!(alloc.weights[0], raw_a / (raw_a + raw_b), epsilon = 1e-4);
    }
}

#[test]
fn test_identical_assets_get_near_uniform_weights() {
    let rows = (0..80)
        .map(|k| {
            let r = if k % 3 == 0 { 0.012 } else { -0.005 };
            vec![r, r, r]
        })
        .collect();
    let series = ReturnSeries::new(
        vec!["X".into(), "Y".into(), "Z".into()],
        business_days(start(), 80),
        rows,
    )
    .unwrap();
    let run = RollingBacktester::new(config(30), 3)
        .unwrap()
        .run(&series)
        .unwrap();
    for alloc in &run.allocations {
        assert!(alloc.weights.iter().all(|w| *w <= 0.99));
        for w in &alloc.weights {
            assert_abs_diff_eq!(*w, 1.0 / 3.0, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_weights_valid_on_synthetic_market() {
    let series = synthetic(160, 11);
    let run = RollingBacktester::new(config(60), 4)
        .unwrap()
        .run(&series)
        .unwrap();
    assert_eq!(run.values.len(), 100);
    for alloc in &run.allocations {
        let total: f64 = alloc.weights.iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-6);
        let min = alloc.weights.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(min >= -1e-6, "negative weight {}", min);
    }
}

#[test]
fn test_window_covariances_are_symmetric() {
    let series = synthetic(120, 5);
    for i in 60..series.len() {
        let est = series.window(i - 60, i).estimate().unwrap();
        for a in 0..4 {
            for b in 0..4 {
                assert_eq!(est.covariance[a][b], est.covariance[b][a]);
            }
        }
    }
}

#[test]
fn test_evaluation_row_never_informs_its_own_weights() {
    let original = synthetic(90, 21);
    let i = 70;

    let mut rows = original.rows().to_vec();
    rows[i] = vec![0.25, -0.2, 0.15, -0.1];
    let shocked = ReturnSeries::new(
        original.assets().to_vec(),
        original.dates().to_vec(),
        rows,
    )
    .unwrap();

    let bt = RollingBacktester::new(config(40), 4).unwrap();
    let base = bt.run(&original).unwrap();
    let hit = bt.run(&shocked).unwrap();

    let k = i - 40;
    assert_eq!(base.allocations[k].weights, hit.allocations[k].weights);
    assert_ne!(
        base.allocations[k].realized_return,
        hit.allocations[k].realized_return
    );
    assert_ne!(base.allocations[k + 1].weights, hit.allocations[k + 1].weights);
}

#[test]
fn test_identical_inputs_identical_runs() {
    let series = synthetic(100, 3);
    let bt = RollingBacktester::new(config(50), 4).unwrap();
    assert_eq!(bt.run(&series).unwrap(), bt.run(&series).unwrap());
}

#[test]
fn test_series_length_is_rows_minus_window() {
    let series = synthetic(75, 8);
    for w in [20, 40, 74] {
        let run = RollingBacktester::new(config(w), 4)
            .unwrap()
            .run(&series)
            .unwrap();
        assert_eq!(run.values.len(), 75 - w);
    }
}

#[test]
fn test_window_must_exceed_universe() {
    assert!(matches!(
        RollingBacktester::new(config(4), 4),
        Err(WalkForwardError::InsufficientWindow {
            window_days: 4,
            num_assets: 4
        })
    ));
}

// ---------------------------------------------------------------------------
// Ingestion and summary
// ---------------------------------------------------------------------------

fn returns_table(series: &ReturnSeries) -> ReturnTable {
    series.to_table()
}

#[test]
fn test_missing_value_fails_before_optimization() {
    let mut table = returns_table(&synthetic(60, 2));
    table.rows[33].returns[2] = None;
    let input = WalkForwardInput {
        prices: None,
        returns: Some(table),
        config: config(20),
    };
    match run_walk_forward(&input) {
        Err(WalkForwardError::MisalignedData { row, .. }) => assert_eq!(row, 33),
        other => panic!("expected MisalignedData, got {:?}", other.map(|o| o.result.values.len())),
    }
}

#[test]
fn test_out_of_order_dates_rejected() {
    let mut table = returns_table(&synthetic(40, 2));
    table.rows.swap(10, 11);
    assert!(matches!(
        ReturnSeries::from_table(table, MissingDataPolicy::DropAndReport),
        Err(WalkForwardError::MisalignedData { row: 11, .. })
    ));
}

#[test]
fn test_flat_market_reports_degenerate_summary() {
    let table = ReturnTable {
        assets: vec!["CASH1".into(), "CASH2".into()],
        rows: business_days(start(), 30)
            .into_iter()
            .map(|date| ReturnRow {
                date,
                returns: vec![Some(0.0), Some(0.0)],
            })
            .collect(),
    };
    let input = WalkForwardInput {
        prices: None,
        returns: Some(table),
        config: config(10),
    };
    let out = run_walk_forward(&input).unwrap().result;

    assert!(out.values.iter().all(|p| p.value == 100.0));
    assert!(out.sharpe_ratio.is_none());
    assert_eq!(out.backtest_warnings.len(), 20);
    assert!(matches!(
        out.backtest_warnings[0],
        BacktestWarning::OptimizerNonConvergence { .. }
    ));
    for alloc in &out.allocations {
        assert_eq!(alloc.weights, vec![0.5, 0.5]);
    }

    let values: Vec<f64> = out.values.iter().map(|p| p.value).collect();
    assert!(matches!(
        PerformanceSummarizer::default().summarize(100.0, &values),
        Err(WalkForwardError::DegenerateVariance { .. })
    ));
}

#[test]
fn test_prices_input_end_to_end() {
    let market = SyntheticMarket {
        days: 120,
        ..SyntheticMarket::uncorrelated(
            vec!["A".into(), "B".into(), "C".into()],
            vec![0.0005, 0.0003, 0.0001],
            &[0.012, 0.008, 0.004],
            start(),
            120,
            99,
        )
    };
    let input = WalkForwardInput {
        prices: Some(market.generate_prices().unwrap()),
        returns: None,
        config: config(63),
    };
    let out = run_walk_forward(&input).unwrap();
    assert_eq!(out.result.values.len(), 120 - 63);
    assert!(out.result.statistics.is_some());
    assert_eq!(out.metadata.precision, "ieee754_f64");
}

#[test]
fn test_config_from_json_applies_defaults() {
    let json = r#"{
        "returns": {
            "assets": ["A", "B"],
            "rows": [
                {"date": "2024-01-02", "returns": [0.01, 0.0]},
                {"date": "2024-01-03", "returns": [null, 0.01]}
            ]
        },
        "config": {"window_days": 252, "missing_data": "drop_and_report"}
    }"#;
    let input: WalkForwardInput = serde_json::from_str(json).unwrap();
    assert_eq!(input.config.risk_free_rate, 0.02);
    assert_eq!(input.config.initial_capital, 100.0);
    assert_eq!(input.config.missing_data, MissingDataPolicy::DropAndReport);
    assert!(matches!(
        run_walk_forward(&input),
        Err(WalkForwardError::InsufficientData(_))
    ));
}
