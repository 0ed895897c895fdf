mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::backtest::BacktestArgs;
use commands::factors::FactorsArgs;
use commands::optimize::OptimizeArgs;
use commands::simulate::SimulateArgs;
use commands::summarize::SummarizeArgs;

/// Walk-forward maximum-Sharpe portfolio backtesting
#[derive(Parser)]
#[command(
    name = "wfo",
    version,
    about = "Walk-forward maximum-Sharpe portfolio backtesting",
    long_about = "Re-optimises a long-only maximum-Sharpe portfolio on a rolling estimation \
                  window, holds it for the next unseen day and reports the out-of-sample \
                  value series. Also runs single-window optimisations, performance \
                  summaries, factor regressions and synthetic data generation."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log verbosity on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a rolling maximum-Sharpe walk-forward backtest
    Backtest(BacktestArgs),
    /// Maximum-Sharpe weights for a single estimation window
    Optimize(OptimizeArgs),
    /// Summarise a portfolio value series
    Summarize(SummarizeArgs),
    /// OLS regression of portfolio returns on market factors
    Factors(FactorsArgs),
    /// Generate seeded synthetic prices or returns
    Simulate(SimulateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Backtest(args) => commands::backtest::run_backtest(args),
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Summarize(args) => commands::summarize::run_summarize(args),
        Commands::Factors(args) => commands::factors::run_factors(args),
        Commands::Simulate(args) => commands::simulate::run_simulate(args, &cli.output),
        Commands::Version => {
            println!("wfo {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
