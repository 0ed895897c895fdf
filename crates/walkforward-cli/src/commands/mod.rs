pub mod backtest;
pub mod factors;
pub mod optimize;
pub mod simulate;
pub mod summarize;
