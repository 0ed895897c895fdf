use clap::{Args, ValueEnum};
use serde_json::{Map, Value};

use walkforward_core::synthetic::SyntheticMarket;

use crate::input;
use crate::OutputFormat;

#[derive(Debug, Clone, ValueEnum)]
pub enum SimulateKind {
    Prices,
    Returns,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// SyntheticMarket JSON (assets, mean, covariance, start_date, days, seed); stdin if omitted
    #[arg(long)]
    pub input: Option<String>,

    /// Generate a price table or a return series
    #[arg(long, default_value = "prices")]
    pub kind: SimulateKind,

    /// Override the seed in the input
    #[arg(long)]
    pub seed: Option<u64>,
}

/// JSON output feeds straight back into `backtest --input`; table and CSV
/// output are wide rows suitable for `backtest --prices`.
pub fn run_simulate(
    args: SimulateArgs,
    format: &OutputFormat,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut market: SyntheticMarket =
        input::stdin::read_input(args.input.as_deref(), "synthetic data")?;
    if let Some(seed) = args.seed {
        market.seed = seed;
    }

    let (key, assets, rows): (&str, Vec<String>, Vec<(String, Vec<Option<f64>>)>) =
        match args.kind {
            SimulateKind::Prices => {
                let table = market.generate_prices()?;
                if matches!(format, OutputFormat::Json) {
                    return Ok(serde_json::json!({ "prices": table }));
                }
                let rows = table
                    .rows
                    .into_iter()
                    .map(|r| (r.date.to_string(), r.prices))
                    .collect();
                ("prices", table.assets, rows)
            }
            SimulateKind::Returns => {
                let series = market.generate_returns()?;
                if matches!(format, OutputFormat::Json) {
                    return Ok(serde_json::json!({ "returns": series }));
                }
                let rows = series
                    .dates()
                    .iter()
                    .zip(series.rows())
                    .map(|(d, r)| (d.to_string(), r.iter().copied().map(Some).collect()))
                    .collect();
                ("returns", series.assets().to_vec(), rows)
            }
        };

    tracing::debug!(kind = key, rows = rows.len(), "synthetic data generated");
    let wide: Vec<Value> = rows
        .into_iter()
        .map(|(date, values)| {
            let mut obj = Map::new();
            obj.insert("date".into(), Value::String(date));
            for (asset, v) in assets.iter().zip(values) {
                obj.insert(asset.clone(), serde_json::json!(v));
            }
            Value::Object(obj)
        })
        .collect();
    Ok(Value::Array(wide))
}
