use clap::Args;
use serde_json::Value;

use walkforward_core::backtest::{summarize_performance, SummaryInput};

use crate::input;

#[derive(Args)]
pub struct SummarizeArgs {
    /// SummaryInput JSON ({"values": [...], "initial_capital": ...}); stdin if omitted
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_summarize(args: SummarizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let summary_input: SummaryInput =
        input::stdin::read_input(args.input.as_deref(), "performance summary")?;
    let result = summarize_performance(&summary_input)?;
    Ok(serde_json::to_value(result)?)
}
