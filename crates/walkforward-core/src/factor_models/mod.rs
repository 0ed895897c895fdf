pub mod regression;

pub use regression::{
    cumulative_growth, run_factor_regression, Coefficient, FactorRegressionInput,
    FactorRegressionOutput, FactorRow, FactorTable,
};
