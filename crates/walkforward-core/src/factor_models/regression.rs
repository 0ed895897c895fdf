use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use crate::error::WalkForwardError;
use crate::linalg::{mat_inverse, mat_multiply, mat_transpose, mat_vec_multiply};
use crate::returns::ReturnSeries;
use crate::types::{with_metadata, ComputationOutput, DatedValue};
use crate::WalkForwardResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One date of factor returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRow {
    pub date: NaiveDate,
    pub values: Vec<f64>,
}

/// Dated factor returns in decimal units (e.g. Fama-French MKT_RF, SMB,
/// HML and RF).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorTable {
    pub factors: Vec<String>,
    pub rows: Vec<FactorRow>,
}

/// Input for [`run_factor_regression`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorRegressionInput {
    /// Dated portfolio returns.
    pub portfolio_returns: Vec<DatedValue>,
    pub factors: FactorTable,
    /// Column subtracted from portfolio returns and left out of the
    /// regressors. Absent column means raw returns are regressed.
    #[serde(default = "default_risk_free_column")]
    pub risk_free_column: String,
    /// Column used for the market growth curve `prod(1 + MKT_RF + RF)`.
    #[serde(default = "default_market_column")]
    pub market_column: String,
}

fn default_risk_free_column() -> String {
    "RF".into()
}

fn default_market_column() -> String {
    "MKT_RF".into()
}

impl FactorRegressionInput {
    /// Regress the equally weighted portfolio of `series` on `factors`.
    pub fn equal_weight(series: &ReturnSeries, factors: FactorTable) -> Self {
        Self {
            portfolio_returns: series.equal_weight_returns(),
            factors,
            risk_free_column: default_risk_free_column(),
            market_column: default_market_column(),
        }
    }
}

/// One regression coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// `None` when the standard error is zero (exact fit).
    pub t_stat: Option<f64>,
}

/// Output of [`run_factor_regression`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorRegressionOutput {
    /// Intercept (per-period alpha).
    pub alpha: Coefficient,
    /// One loading per regressor, in factor-table order.
    pub betas: Vec<Coefficient>,
    pub r_squared: f64,
    pub adjusted_r_squared: f64,
    pub residual_std_error: f64,
    /// Dates present in both inputs.
    pub observations: usize,
    /// Portfolio dates with no factor row.
    pub unmatched_dates: usize,
    /// `prod(1 + r_p)` over the matched dates only. Portfolio dates with no
    /// factor row are skipped, so the curve can differ from compounding the
    /// full portfolio series.
    pub portfolio_growth: Vec<DatedValue>,
    /// `prod(1 + MKT_RF + RF)`, when both columns are present.
    pub market_growth: Option<Vec<DatedValue>>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// OLS regression of excess portfolio returns on an intercept plus factors.
///
/// Portfolio and factor data are inner-joined on date; `beta = (X'X)^-1 X'y`.
pub fn run_factor_regression(
    input: &FactorRegressionInput,
) -> WalkForwardResult<ComputationOutput<FactorRegressionOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let table = &input.factors;
    validate_factor_table(table)?;

    let rf_idx = table.factors.iter().position(|f| *f == input.risk_free_column);
    let mkt_idx = table.factors.iter().position(|f| *f == input.market_column);
    let regressors: Vec<usize> = (0..table.factors.len())
        .filter(|j| Some(*j) != rf_idx)
        .collect();
    if regressors.is_empty() {
        return Err(WalkForwardError::InvalidInput {
            field: "factors".into(),
            reason: "At least one factor besides the risk-free column required".into(),
        });
    }
    if rf_idx.is_none() {
        warnings.push(format!(
            "No '{}' column; regressing raw portfolio returns",
            input.risk_free_column
        ));
    }

    // Inner join on date
    let by_date: BTreeMap<NaiveDate, &[f64]> = table
        .rows
        .iter()
        .map(|r| (r.date, r.values.as_slice()))
        .collect();
    let mut matched: Vec<(NaiveDate, f64, &[f64])> = Vec::with_capacity(input.portfolio_returns.len());
    for (i, p) in input.portfolio_returns.iter().enumerate() {
        if !p.value.is_finite() {
            return Err(WalkForwardError::MisalignedData {
                row: i,
                date: p.date,
                reason: "portfolio return is not finite".into(),
            });
        }
        if let Some(values) = by_date.get(&p.date) {
            matched.push((p.date, p.value, *values));
        }
    }
    matched.sort_by_key(|(date, _, _)| *date);
    if let Some(pair) = matched.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(WalkForwardError::MisalignedData {
            row: 0,
            date: pair[1].0,
            reason: "duplicate portfolio return date".into(),
        });
    }

    let unmatched_dates = input.portfolio_returns.len() - matched.len();
    if unmatched_dates > 0 {
        warnings.push(format!(
            "{} portfolio dates have no factor data and were skipped",
            unmatched_dates
        ));
    }

    let n = matched.len();
    let cols = regressors.len() + 1;
    if n <= cols {
        return Err(WalkForwardError::InsufficientData(format!(
            "{} matched observations cannot identify {} coefficients",
            n, cols
        )));
    }

    // Design matrix and response
    let x: Vec<Vec<f64>> = matched
        .iter()
        .map(|(_, _, f)| {
            let mut row = Vec::with_capacity(cols);
            row.push(1.0);
            row.extend(regressors.iter().map(|j| f[*j]));
            row
        })
        .collect();
    let y: Vec<f64> = matched
        .iter()
        .map(|(_, r, f)| r - rf_idx.map_or(0.0, |k| f[k]))
        .collect();

    // OLS via normal equations
    let xt = mat_transpose(&x);
    let xtx = mat_multiply(&xt, &x);
    let xtx_inv = mat_inverse(&xtx, "OLS normal equations")?;
    let xty = mat_vec_multiply(&xt, &y);
    let beta = mat_vec_multiply(&xtx_inv, &xty);

    // Fit statistics
    let nf = n as f64;
    let dof = (n - cols) as f64;
    let y_mean = y.iter().sum::<f64>() / nf;
    let fitted = mat_vec_multiply(&x, &beta);
    let ss_res: f64 = y.iter().zip(fitted.iter()).map(|(a, b)| (a - b).powi(2)).sum();
    let ss_tot: f64 = y.iter().map(|a| (a - y_mean).powi(2)).sum();
    if ss_tot <= 0.0 {
        return Err(WalkForwardError::DegenerateVariance {
            context: "excess portfolio returns are constant".into(),
        });
    }
    let r_squared = 1.0 - ss_res / ss_tot;
    let adjusted_r_squared = 1.0 - (1.0 - r_squared) * (nf - 1.0) / dof;
    let sigma2 = ss_res / dof;

    let coefficient = |name: &str, j: usize| {
        let std_error = (sigma2 * xtx_inv[j][j]).max(0.0).sqrt();
        Coefficient {
            name: name.to_string(),
            estimate: beta[j],
            std_error,
            t_stat: (std_error > 0.0).then(|| beta[j] / std_error),
        }
    };
    let alpha = coefficient("alpha", 0);
    let betas = regressors
        .iter()
        .enumerate()
        .map(|(k, j)| coefficient(&table.factors[*j], k + 1))
        .collect();

    // Growth curves
    let portfolio_growth = cumulative_growth(matched.iter().map(|(d, r, _)| (*d, *r)));
    let market_growth = match (mkt_idx, rf_idx) {
        (Some(m), Some(k)) => Some(cumulative_growth(
            matched.iter().map(|(d, _, f)| (*d, f[m] + f[k])),
        )),
        (Some(m), None) => Some(cumulative_growth(matched.iter().map(|(d, _, f)| (*d, f[m])))),
        (None, _) => None,
    };

    let output = FactorRegressionOutput {
        alpha,
        betas,
        r_squared,
        adjusted_r_squared,
        residual_std_error: sigma2.sqrt(),
        observations: n,
        unmatched_dates,
        portfolio_growth,
        market_growth,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "OLS factor regression (normal equations) on date-aligned excess returns",
        &serde_json::json!({
            "regressors": regressors.iter().map(|j| table.factors[*j].clone()).collect::<Vec<_>>(),
            "risk_free_column": input.risk_free_column,
            "market_column": input.market_column,
            "observations": n,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Running product `prod(1 + r)` keyed by date.
pub fn cumulative_growth(returns: impl IntoIterator<Item = (NaiveDate, f64)>) -> Vec<DatedValue> {
    let mut level = 1.0;
    returns
        .into_iter()
        .map(|(date, r)| {
            level *= 1.0 + r;
            DatedValue { date, value: level }
        })
        .collect()
}

fn validate_factor_table(table: &FactorTable) -> WalkForwardResult<()> {
    if table.factors.is_empty() {
        return Err(WalkForwardError::InvalidInput {
            field: "factors".into(),
            reason: "At least one factor column required".into(),
        });
    }
    let mut seen = HashSet::new();
    for name in &table.factors {
        if !seen.insert(name.as_str()) {
            return Err(WalkForwardError::InvalidInput {
                field: "factors".into(),
                reason: format!("Duplicate factor column '{}'", name),
            });
        }
    }
    let mut dates = HashSet::new();
    for (i, row) in table.rows.iter().enumerate() {
        if !dates.insert(row.date) {
            return Err(WalkForwardError::MisalignedData {
                row: i,
                date: row.date,
                reason: "duplicate factor date".into(),
            });
        }
        if row.values.len() != table.factors.len() {
            return Err(WalkForwardError::MisalignedData {
                row: i,
                date: row.date,
                reason: format!(
                    "{} factor values for {} columns",
                    row.values.len(),
                    table.factors.len()
                ),
            });
        }
        if let Some(j) = row.values.iter().position(|v| !v.is_finite()) {
            return Err(WalkForwardError::MisalignedData {
                row: i,
                date: row.date,
                reason: format!("factor '{}' is not finite", table.factors[j]),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
