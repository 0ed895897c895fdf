use approx::assert_abs_diff_eq;
use chrono::NaiveDate;

use walkforward_core::factor_models::{
    run_factor_regression, FactorRegressionInput, FactorRow, FactorTable,
};
use walkforward_core::synthetic::SyntheticMarket;

/// Market factor taken from the first synthetic asset, so the equal-weight
/// portfolio of (market, independent asset) has a known market beta of 0.5.
#[test]
fn test_equal_weight_portfolio_beta() {
    let series = SyntheticMarket::uncorrelated(
        vec!["MKT".into(), "IDIO".into()],
        vec![0.0004, 0.0001],
        &[0.01, 0.002],
        NaiveDate::from_ymd_opt(2018, 6, 1).unwrap(),
        750,
        2024,
    )
    .generate_returns()
    .unwrap();

    let rf = 0.00008;
    let factors = FactorTable {
        factors: vec!["MKT_RF".into(), "RF".into()],
        rows: series
            .dates()
            .iter()
            .zip(series.rows())
            .map(|(date, row)| FactorRow {
                date: *date,
                values: vec![row[0] - rf, rf],
            })
            .collect(),
    };

    let out = run_factor_regression(&FactorRegressionInput::equal_weight(&series, factors))
        .unwrap()
        .result;

    assert_eq!(out.observations, 750);
    assert_eq!(out.betas[0].name, "MKT_RF");
    assert_abs_diff_eq!(out.betas[0].estimate, 0.5, epsilon = 0.02);
    assert!(out.betas[0].t_stat.unwrap() > 10.0);
    assert!(out.r_squared > 0.9);

    let last = out.portfolio_growth.last().unwrap().value;
    let expected: f64 = series
        .equal_weight_returns()
        .iter()
        .map(|p| 1.0 + p.value)
        .product();
    assert_abs_diff_eq!(last, expected, epsilon = 1e-12);
    assert!(out.market_growth.is_some());
}

#[test]
fn test_factor_table_from_json_with_defaults() {
    let json = r#"{
        "portfolio_returns": [
            {"date": "2024-02-01", "value": 0.010},
            {"date": "2024-02-02", "value": -0.004},
            {"date": "2024-02-05", "value": 0.006},
            {"date": "2024-02-06", "value": 0.001},
            {"date": "2024-02-07", "value": -0.002}
        ],
        "factors": {
            "factors": ["MKT_RF", "RF"],
            "rows": [
                {"date": "2024-02-01", "values": [0.012, 0.0001]},
                {"date": "2024-02-02", "values": [-0.006, 0.0001]},
                {"date": "2024-02-05", "values": [0.004, 0.0001]},
                {"date": "2024-02-06", "values": [0.002, 0.0001]},
                {"date": "2024-02-07", "values": [-0.001, 0.0001]}
            ]
        }
    }"#;
    let input: FactorRegressionInput = serde_json::from_str(json).unwrap();
    assert_eq!(input.risk_free_column, "RF");
    let out = run_factor_regression(&input).unwrap();
    assert_eq!(out.result.observations, 5);
    assert_eq!(out.result.betas.len(), 1);
    assert!(out.warnings.is_empty());
}
