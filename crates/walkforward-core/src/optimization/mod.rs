pub mod max_sharpe;
pub mod metrics;
pub mod solver;
pub mod sqp;

pub use max_sharpe::{
    optimize_max_sharpe, sanitize_weights, AssetWeight, MaxSharpeAllocation, MaxSharpeInput,
    MaxSharpeOptimizer, MaxSharpeOutput,
};
pub use metrics::{PortfolioMetrics, TRADING_DAYS_PER_YEAR};
pub use solver::{
    Bound, ConstrainedSolver, LinearEquality, Objective, SolverOutcome, SolverSettings,
    SolverStatus,
};
pub use sqp::SqpSolver;
