use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::WalkForwardError;
use crate::WalkForwardResult;

/// Sample moments of one estimation window, in period units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEstimate {
    /// Mean return per asset.
    pub mean: Vec<f64>,
    /// Unbiased sample covariance (denominator `len - 1`).
    pub covariance: Vec<Vec<f64>>,
}

/// Borrowed view over a contiguous block of rows of a `ReturnSeries`.
#[derive(Debug, Clone, Copy)]
pub struct EstimationWindow<'a> {
    dates: &'a [NaiveDate],
    rows: &'a [Vec<f64>],
}

impl<'a> EstimationWindow<'a> {
    pub(crate) fn new(dates: &'a [NaiveDate], rows: &'a [Vec<f64>]) -> Self {
        Self { dates, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> &'a [NaiveDate] {
        self.dates
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn num_assets(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Per-asset arithmetic mean.
    pub fn mean_vector(&self) -> Vec<f64> {
        let n = self.num_assets();
        let t = self.len() as f64;
        let mut mean = vec![0.0; n];
        for row in self.rows {
            for (m, r) in mean.iter_mut().zip(row.iter()) {
                *m += r;
            }
        }
        mean.iter_mut().for_each(|m| *m /= t);
        mean
    }

    /// Unbiased sample covariance matrix.
    ///
    /// Only the upper triangle is accumulated and then mirrored, so the
    /// result is exactly symmetric.
    pub fn sample_covariance(&self) -> WalkForwardResult<Vec<Vec<f64>>> {
        if self.len() < 2 {
            return Err(WalkForwardError::InsufficientData(format!(
                "Sample covariance needs at least 2 observations, window has {}",
                self.len()
            )));
        }
        let mean = self.mean_vector();
        Ok(covariance_about(self.rows, &mean))
    }

    /// Mean vector and sample covariance in one pass over the mean.
    pub fn estimate(&self) -> WalkForwardResult<WindowEstimate> {
        if self.len() < 2 {
            return Err(WalkForwardError::InsufficientData(format!(
                "Sample covariance needs at least 2 observations, window has {}",
                self.len()
            )));
        }
        let mean = self.mean_vector();
        let covariance = covariance_about(self.rows, &mean);
        Ok(WindowEstimate { mean, covariance })
    }
}

#[allow(clippy::needless_range_loop)]
fn covariance_about(rows: &[Vec<f64>], mean: &[f64]) -> Vec<Vec<f64>> {
    let n = mean.len();
    let denom = (rows.len() - 1) as f64;
    let mut cov = vec![vec![0.0; n]; n];
    for row in rows {
        for i in 0..n {
            let di = row[i] - mean[i];
            for j in i..n {
                cov[i][j] += di * (row[j] - mean[j]);
            }
        }
    }
    for i in 0..n {
        for j in i..n {
            let v = cov[i][j] / denom;
            cov[i][j] = v;
            cov[j][i] = v;
        }
    }
    cov
}
