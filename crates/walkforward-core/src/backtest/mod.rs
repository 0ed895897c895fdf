pub mod config;
pub mod rolling;
pub mod summary;
pub mod walk_forward;

pub use config::BacktestConfig;
pub use rolling::{
    BacktestRun, BacktestWarning, PortfolioValueSeries, RollingBacktester, WindowAllocation,
};
pub use summary::{
    pct_change, summarize_performance, PerformanceSummarizer, PerformanceSummary,
    ReturnStatistics, SummaryInput,
};
pub use walk_forward::{run_walk_forward, WalkForwardInput, WalkForwardOutput};
