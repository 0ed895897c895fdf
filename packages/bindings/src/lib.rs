use napi::Result as NapiResult;
use napi_derive::napi;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Backtest
// ---------------------------------------------------------------------------

#[napi]
pub fn run_walk_forward(input_json: String) -> NapiResult<String> {
    let input: walkforward_core::backtest::WalkForwardInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = walkforward_core::backtest::run_walk_forward(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn summarize_performance(input_json: String) -> NapiResult<String> {
    let input: walkforward_core::backtest::SummaryInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        walkforward_core::backtest::summarize_performance(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize_max_sharpe(input_json: String) -> NapiResult<String> {
    let input: walkforward_core::optimization::MaxSharpeInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        walkforward_core::optimization::optimize_max_sharpe(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Factor models
// ---------------------------------------------------------------------------

#[napi]
pub fn factor_regression(input_json: String) -> NapiResult<String> {
    let input: walkforward_core::factor_models::FactorRegressionInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        walkforward_core::factor_models::run_factor_regression(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Synthetic data
// ---------------------------------------------------------------------------

#[napi]
pub fn simulate_prices(input_json: String) -> NapiResult<String> {
    let market: walkforward_core::synthetic::SyntheticMarket =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let prices = market.generate_prices().map_err(to_napi_error)?;
    serde_json::to_string(&prices).map_err(to_napi_error)
}
