//! Seeded multivariate-normal market data.
//!
//! Daily returns are drawn as `r = mu + L z` with `L` the Cholesky factor of
//! the covariance and `z` standard normal, so the same seed always yields
//! the same series.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::error::WalkForwardError;
use crate::linalg::{cholesky, mat_vec_multiply};
use crate::returns::series::validate_assets;
use crate::returns::{PriceRow, PriceTable, ReturnSeries};
use crate::WalkForwardResult;

/// Parameters of a synthetic market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticMarket {
    pub assets: Vec<String>,
    /// Daily mean return per asset.
    pub mean: Vec<f64>,
    /// Daily covariance matrix; must be positive definite.
    pub covariance: Vec<Vec<f64>>,
    /// First business day on or after this date starts the series.
    pub start_date: NaiveDate,
    /// Number of return observations to draw.
    pub days: usize,
    #[serde(default)]
    pub seed: u64,
    /// Opening price for every asset when generating prices.
    #[serde(default = "default_initial_price")]
    pub initial_price: f64,
}

fn default_initial_price() -> f64 {
    100.0
}

impl SyntheticMarket {
    /// Uncorrelated assets from daily means and daily volatilities.
    pub fn uncorrelated(
        assets: Vec<String>,
        mean: Vec<f64>,
        volatility: &[f64],
        start_date: NaiveDate,
        days: usize,
        seed: u64,
    ) -> Self {
        let n = volatility.len();
        let covariance = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if i == j { volatility[i] * volatility[i] } else { 0.0 })
                    .collect()
            })
            .collect();
        Self {
            assets,
            mean,
            covariance,
            start_date,
            days,
            seed,
            initial_price: default_initial_price(),
        }
    }

    /// Draw `days` rows of correlated daily returns on business days.
    pub fn generate_returns(&self) -> WalkForwardResult<ReturnSeries> {
        let (dates, rows) = self.draw(self.days)?;
        ReturnSeries::new(self.assets.clone(), dates, rows)
    }

    /// Price table with `days + 1` rows, so its returns span `days` rows.
    pub fn generate_prices(&self) -> WalkForwardResult<PriceTable> {
        if !(self.initial_price.is_finite() && self.initial_price > 0.0) {
            return Err(WalkForwardError::InvalidInput {
                field: "initial_price".into(),
                reason: format!("Must be positive, got {}", self.initial_price),
            });
        }
        let (dates, rows) = self.draw(self.days + 1)?;
        let mut level = vec![self.initial_price; self.assets.len()];
        let table_rows = dates
            .into_iter()
            .zip(rows)
            .enumerate()
            .map(|(k, (date, returns))| {
                if k > 0 {
                    for (p, r) in level.iter_mut().zip(returns.iter()) {
                        *p *= (1.0 + r).max(f64::MIN_POSITIVE);
                    }
                }
                PriceRow {
                    date,
                    prices: level.iter().copied().map(Some).collect(),
                }
            })
            .collect();
        Ok(PriceTable {
            assets: self.assets.clone(),
            rows: table_rows,
        })
    }

    fn draw(&self, count: usize) -> WalkForwardResult<(Vec<NaiveDate>, Vec<Vec<f64>>)> {
        self.validate()?;
        let chol = cholesky(&self.covariance, "synthetic covariance")?;
        let normal = Normal::new(0.0, 1.0).map_err(|e| WalkForwardError::InvalidInput {
            field: "normal".into(),
            reason: e.to_string(),
        })?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = self.assets.len();

        let rows = (0..count)
            .map(|_| {
                let z: Vec<f64> = (0..n).map(|_| rng.sample(normal)).collect();
                mat_vec_multiply(&chol, &z)
                    .into_iter()
                    .zip(self.mean.iter())
                    .map(|(shock, mu)| mu + shock)
                    .collect()
            })
            .collect();
        Ok((business_days(self.start_date, count), rows))
    }

    fn validate(&self) -> WalkForwardResult<()> {
        validate_assets(&self.assets)?;
        let n = self.assets.len();
        if self.mean.len() != n || self.mean.iter().any(|m| !m.is_finite()) {
            return Err(WalkForwardError::InvalidInput {
                field: "mean".into(),
                reason: format!("Expected {} finite mean returns", n),
            });
        }
        if self.covariance.len() != n || self.covariance.iter().any(|r| r.len() != n) {
            return Err(WalkForwardError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Expected a {}x{} matrix", n, n),
            });
        }
        if self.days == 0 {
            return Err(WalkForwardError::InvalidInput {
                field: "days".into(),
                reason: "At least one observation required".into(),
            });
        }
        Ok(())
    }
}

/// `count` consecutive weekdays starting on or after `start`.
pub fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(count);
    let mut day = start;
    while out.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
        day += Duration::days(1);
    }
    out
}
