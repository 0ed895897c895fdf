pub mod error;
pub mod linalg;
pub mod optimization;
pub mod returns;
pub mod types;

#[cfg(feature = "backtest")]
pub mod backtest;

#[cfg(feature = "factor_models")]
pub mod factor_models;

#[cfg(feature = "synthetic")]
pub mod synthetic;

pub use error::WalkForwardError;
pub use types::*;

/// Standard result type for all walk-forward operations
pub type WalkForwardResult<T> = Result<T, WalkForwardError>;
