use clap::Args;
use serde_json::Value;

use walkforward_core::optimization::{optimize_max_sharpe, MaxSharpeInput, SolverSettings};
use walkforward_core::returns::{MissingDataPolicy, ReturnSeries};

use crate::input;

#[derive(Args)]
pub struct OptimizeArgs {
    /// MaxSharpeInput JSON; stdin if omitted
    #[arg(long, conflicts_with = "returns")]
    pub input: Option<String>,

    /// Wide return CSV; every row forms the estimation window
    #[arg(long)]
    pub returns: Option<String>,

    /// Annual risk-free rate as a decimal (with --returns)
    #[arg(long, default_value = "0.02")]
    pub risk_free_rate: f64,

    /// Observations per year (with --returns)
    #[arg(long, default_value = "252")]
    pub periods_per_year: f64,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let opt_input: MaxSharpeInput = match args.returns.as_deref() {
        Some(path) => {
            let table = input::table::read_wide_csv(path, 1.0)?.into_returns();
            MaxSharpeInput {
                returns: ReturnSeries::from_table(table, MissingDataPolicy::Reject)?.series,
                risk_free_rate: args.risk_free_rate,
                periods_per_year: args.periods_per_year,
                solver: SolverSettings::default(),
            }
        }
        None => input::stdin::read_input(args.input.as_deref(), "max-Sharpe optimization")?,
    };
    let result = optimize_max_sharpe(&opt_input)?;
    Ok(serde_json::to_value(result)?)
}
