use clap::Args;
use serde_json::Value;

use walkforward_core::factor_models::{run_factor_regression, FactorRegressionInput};
use walkforward_core::returns::{MissingDataPolicy, ReturnSeries};

use crate::input;

#[derive(Args)]
pub struct FactorsArgs {
    /// FactorRegressionInput JSON; stdin if omitted
    #[arg(long, conflicts_with_all = ["returns", "factors"])]
    pub input: Option<String>,

    /// Wide asset return CSV; the equal-weight portfolio is regressed
    #[arg(long, requires = "factors")]
    pub returns: Option<String>,

    /// Wide factor CSV (e.g. Fama-French MKT_RF, SMB, HML, RF)
    #[arg(long, requires = "returns")]
    pub factors: Option<String>,

    /// Factor CSV values are percentages; divide by 100
    #[arg(long)]
    pub percent: bool,

    /// Market excess return column
    #[arg(long, default_value = "MKT_RF")]
    pub market_column: String,

    /// Risk-free rate column
    #[arg(long, default_value = "RF")]
    pub rf_column: String,
}

pub fn run_factors(args: FactorsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let fr_input: FactorRegressionInput = match (&args.returns, &args.factors) {
        (Some(returns_path), Some(factors_path)) => {
            let table = input::table::read_wide_csv(returns_path, 1.0)?.into_returns();
            let series = ReturnSeries::from_table(table, MissingDataPolicy::Reject)?.series;
            let scale = if args.percent { 0.01 } else { 1.0 };
            let factors = input::table::read_wide_csv(factors_path, scale)?.into_factors()?;
            FactorRegressionInput {
                risk_free_column: args.rf_column.clone(),
                market_column: args.market_column.clone(),
                ..FactorRegressionInput::equal_weight(&series, factors)
            }
        }
        _ => input::stdin::read_input(args.input.as_deref(), "factor regression")?,
    };
    let result = run_factor_regression(&fr_input)?;
    Ok(serde_json::to_value(result)?)
}
