use clap::Args;
use serde_json::Value;

use walkforward_core::backtest::{run_walk_forward, BacktestConfig, WalkForwardInput};
use walkforward_core::returns::MissingDataPolicy;

use crate::input;

#[derive(Args)]
pub struct BacktestArgs {
    /// Full input as JSON (prices or returns plus config); stdin if omitted
    #[arg(long, conflicts_with_all = ["prices", "returns"])]
    pub input: Option<String>,

    /// Wide price CSV: date column followed by one column per asset
    #[arg(long, conflicts_with = "returns")]
    pub prices: Option<String>,

    /// Wide return CSV in decimal units
    #[arg(long)]
    pub returns: Option<String>,

    /// Backtest configuration (JSON, or YAML for .yaml/.yml)
    #[arg(long)]
    pub config: Option<String>,

    /// Estimation window in years (window = round(periods_per_year * years))
    #[arg(long, conflicts_with = "window_days")]
    pub window_years: Option<f64>,

    /// Estimation window in observations
    #[arg(long)]
    pub window_days: Option<usize>,

    /// Annual risk-free rate as a decimal
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Starting portfolio value
    #[arg(long)]
    pub initial_capital: Option<f64>,

    /// Optimizer iteration budget per window
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Drop incomplete rows and report them instead of failing
    #[arg(long)]
    pub drop_missing: bool,
}

pub fn run_backtest(args: BacktestArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut bt_input: WalkForwardInput = match (&args.prices, &args.returns) {
        (Some(path), _) => WalkForwardInput {
            prices: Some(input::table::read_wide_csv(path, 1.0)?.into_prices()),
            returns: None,
            config: load_config(args.config.as_deref())?,
        },
        (None, Some(path)) => WalkForwardInput {
            prices: None,
            returns: Some(input::table::read_wide_csv(path, 1.0)?.into_returns()),
            config: load_config(args.config.as_deref())?,
        },
        (None, None) => {
            let mut from_json: WalkForwardInput =
                input::stdin::read_input(args.input.as_deref(), "backtest")?;
            if let Some(path) = args.config.as_deref() {
                from_json.config = input::file::read_config(path)?;
            }
            from_json
        }
    };

    apply_overrides(&mut bt_input.config, &args)?;
    let result = run_walk_forward(&bt_input)?;
    Ok(serde_json::to_value(result)?)
}

fn load_config(path: Option<&str>) -> Result<BacktestConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => input::file::read_config(p),
        None => Ok(BacktestConfig::default()),
    }
}

fn apply_overrides(
    config: &mut BacktestConfig,
    args: &BacktestArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(rf) = args.risk_free_rate {
        config.risk_free_rate = rf;
    }
    if let Some(capital) = args.initial_capital {
        config.initial_capital = capital;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.solver.max_iterations = max_iterations;
    }
    if args.drop_missing {
        config.missing_data = MissingDataPolicy::DropAndReport;
    }
    if let Some(days) = args.window_days {
        config.window_days = days;
    }
    if let Some(years) = args.window_years {
        *config = config.clone().with_window_years(years)?;
    }
    Ok(())
}
