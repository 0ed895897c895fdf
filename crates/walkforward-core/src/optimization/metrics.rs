use serde::{Deserialize, Serialize};

use crate::error::WalkForwardError;
use crate::linalg::{dot, mat_vec_multiply, quadratic_form};
use crate::types::Rate;
use crate::WalkForwardResult;

/// Trading days per year used to annualise daily moments.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Annualised return, volatility and Sharpe ratio of a weight vector
/// against period-unit moments (mean vector and covariance matrix).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// Observations per year (252 for daily data).
    pub periods_per_year: f64,
    /// Annualised risk-free rate.
    pub risk_free_rate: Rate,
}

impl Default for PortfolioMetrics {
    fn default() -> Self {
        Self {
            periods_per_year: TRADING_DAYS_PER_YEAR,
            risk_free_rate: 0.0,
        }
    }
}

impl PortfolioMetrics {
    pub fn new(periods_per_year: f64, risk_free_rate: Rate) -> Self {
        Self {
            periods_per_year,
            risk_free_rate,
        }
    }

    /// `(w . mu) * P`
    pub fn annualized_return(&self, weights: &[f64], mean: &[f64]) -> f64 {
        dot(weights, mean) * self.periods_per_year
    }

    /// `w' (Sigma * P) w`, the annualised variance.
    pub fn annualized_variance(&self, weights: &[f64], covariance: &[Vec<f64>]) -> f64 {
        quadratic_form(covariance, weights) * self.periods_per_year
    }

    /// `sqrt(w' (Sigma * P) w)`; fails when the variance is not positive.
    pub fn annualized_volatility(
        &self,
        weights: &[f64],
        covariance: &[Vec<f64>],
    ) -> WalkForwardResult<f64> {
        let variance = self.annualized_variance(weights, covariance);
        if variance.is_nan() || variance <= 0.0 {
            return Err(WalkForwardError::DegenerateVariance {
                context: format!("portfolio variance {:e} is not positive", variance),
            });
        }
        Ok(variance.sqrt())
    }

    /// `(R - rf) / sigma` for the annualised return R and volatility sigma.
    pub fn sharpe_ratio(
        &self,
        weights: &[f64],
        mean: &[f64],
        covariance: &[Vec<f64>],
    ) -> WalkForwardResult<f64> {
        let vol = self.annualized_volatility(weights, covariance)?;
        Ok((self.annualized_return(weights, mean) - self.risk_free_rate) / vol)
    }

    /// Minimisation objective. Zero-variance candidates score `+inf`.
    pub fn negative_sharpe(&self, weights: &[f64], mean: &[f64], covariance: &[Vec<f64>]) -> f64 {
        match self.sharpe_ratio(weights, mean, covariance) {
            Ok(sharpe) => -sharpe,
            Err(_) => f64::INFINITY,
        }
    }

    /// Analytic gradient of [`negative_sharpe`](Self::negative_sharpe):
    /// `-P mu / V + (R - rf) P Sigma w / V^3`.
    ///
    /// Returns zeros where the volatility vanishes.
    pub fn negative_sharpe_gradient(
        &self,
        weights: &[f64],
        mean: &[f64],
        covariance: &[Vec<f64>],
    ) -> Vec<f64> {
        let p = self.periods_per_year;
        let sigma_w = mat_vec_multiply(covariance, weights);
        let variance = dot(weights, &sigma_w) * p;
        if variance.is_nan() || variance <= 0.0 {
            return vec![0.0; weights.len()];
        }
        let vol = variance.sqrt();
        let excess = dot(weights, mean) * p - self.risk_free_rate;
        let vol_cubed = vol * variance;
        mean.iter()
            .zip(sigma_w.iter())
            .map(|(m, sw)| -p * m / vol + excess * p * sw / vol_cubed)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_assets() -> (Vec<f64>, Vec<Vec<f64>>) {
        // Daily: A mean 0.0004, vol 1%; B mean 0.0002, vol 0.5%; rho 0.2
        let cov_ab = 0.2 * 0.01 * 0.005;
        (
            vec![0.0004, 0.0002],
            vec![vec![0.0001, cov_ab], vec![cov_ab, 0.000025]],
        )
    }

    #[test]
    fn test_annualized_return_scales_by_periods() {
        let m = PortfolioMetrics::new(252.0, 0.02);
        let (mu, _) = two_assets();
        assert_abs_diff_eq!(m.annualized_return(&[0.5, 0.5], &mu), 0.0756, epsilon = 1e-12);
    }

    #[test]
    fn test_annualized_volatility_single_asset() {
        let m = PortfolioMetrics::new(252.0, 0.0);
        let (_, cov) = two_assets();
        let vol = m.annualized_volatility(&[1.0, 0.0], &cov).unwrap();
        assert_abs_diff_eq!(vol, 0.01 * 252f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_variance_is_degenerate() {
        let m = PortfolioMetrics::default();
        let cov = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        assert!(matches!(
            m.annualized_volatility(&[0.5, 0.5], &cov),
            Err(WalkForwardError::DegenerateVariance { .. })
        ));
        assert_eq!(m.negative_sharpe(&[0.5, 0.5], &[0.001, 0.001], &cov), f64::INFINITY);
        assert_eq!(
            m.negative_sharpe_gradient(&[0.5, 0.5], &[0.001, 0.001], &cov),
            vec![0.0, 0.0]
        );
    }

    #[test]
    fn test_negative_sharpe_sign() {
        let m = PortfolioMetrics::new(252.0, 0.02);
        let (mu, cov) = two_assets();
        let w = [0.6, 0.4];
        let sharpe = m.sharpe_ratio(&w, &mu, &cov).unwrap();
        assert!(sharpe > 0.0);
        assert_abs_diff_eq!(m.negative_sharpe(&w, &mu, &cov), -sharpe, epsilon = 1e-15);
    }

    #[test]
    fn test_gradient_matches_central_differences() {
        let m = PortfolioMetrics::new(252.0, 0.02);
        let (mu, cov) = two_assets();
        let w = [0.3, 0.7];
        let grad = m.negative_sharpe_gradient(&w, &mu, &cov);
        let h = 1e-6;
        for i in 0..2 {
            let mut up = w;
            let mut down = w;
            up[i] += h;
            down[i] -= h;
            let numeric =
                (m.negative_sharpe(&up, &mu, &cov) - m.negative_sharpe(&down, &mu, &cov)) / (2.0 * h);
            assert_abs_diff_eq!(grad[i], numeric, epsilon = 1e-5);
        }
    }
}
