use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::WalkForwardError;
use crate::returns::series::{
    check_order, check_width, first_missing, missing_value, validate_assets, IngestedReturns,
    MissingDataPolicy, ReturnSeries,
};
use crate::WalkForwardResult;

/// Closing prices for every asset on one trading date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub prices: Vec<Option<f64>>,
}

/// Date-indexed price table handed over by the market data provider.
///
/// Prices are never forward-filled: a missing or non-positive price marks
/// the whole row incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub assets: Vec<String>,
    pub rows: Vec<PriceRow>,
}

impl PriceTable {
    /// Convert prices into simple periodic returns `p_t / p_{t-1} - 1`.
    ///
    /// The first retained row only seeds the calculation, so the series has
    /// one row fewer than the retained price rows. Under
    /// `MissingDataPolicy::DropAndReport` a return that follows a dropped
    /// row spans more than one trading day; the dropped dates are reported so
    /// the caller can judge that.
    pub fn to_returns(&self, policy: MissingDataPolicy) -> WalkForwardResult<IngestedReturns> {
        validate_assets(&self.assets)?;
        let n = self.assets.len();

        let mut kept: Vec<(NaiveDate, Vec<f64>)> = Vec::with_capacity(self.rows.len());
        let mut dropped_dates = Vec::new();
        let mut prev: Option<NaiveDate> = None;

        for (i, row) in self.rows.iter().enumerate() {
            check_order(i, row.date, prev)?;
            check_width(i, row.date, row.prices.len(), n)?;
            prev = Some(row.date);

            let problem = first_missing(&row.prices)
                .map(|j| (j, missing_value(i, row.date, &self.assets[j])))
                .or_else(|| {
                    row.prices.iter().enumerate().find_map(|(j, p)| match p {
                        Some(x) if *x <= 0.0 => {
                            Some((j, non_positive_price(i, row.date, &self.assets[j], *x)))
                        }
                        _ => None,
                    })
                });

            match (problem, policy) {
                (None, _) => kept.push((row.date, row.prices.iter().flatten().copied().collect())),
                (Some((_, err)), MissingDataPolicy::Reject) => return Err(err),
                (Some((j, _)), MissingDataPolicy::DropAndReport) => {
                    tracing::warn!(date = %row.date, asset = %self.assets[j], "dropping incomplete price row");
                    dropped_dates.push(row.date);
                }
            }
        }

        if kept.len() < 2 {
            return Err(WalkForwardError::InsufficientData(format!(
                "At least 2 complete price rows required to compute returns, got {}",
                kept.len()
            )));
        }

        let (dates, rows): (Vec<NaiveDate>, Vec<Vec<f64>>) = kept
            .windows(2)
            .map(|pair| {
                let (_, before) = &pair[0];
                let (date, after) = &pair[1];
                let returns = after
                    .iter()
                    .zip(before.iter())
                    .map(|(p1, p0)| p1 / p0 - 1.0)
                    .collect();
                (*date, returns)
            })
            .unzip();

        Ok(IngestedReturns {
            series: ReturnSeries::new(self.assets.clone(), dates, rows)?,
            dropped_dates,
        })
    }
}

fn non_positive_price(row: usize, date: NaiveDate, asset: &str, price: f64) -> WalkForwardError {
    WalkForwardError::MisalignedData {
        row,
        date,
        reason: format!("non-positive price {} for asset '{}'", price, asset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn table(rows: Vec<(u32, Vec<Option<f64>>)>) -> PriceTable {
        PriceTable {
            assets: vec!["AAA".into(), "BBB".into()],
            rows: rows
                .into_iter()
                .map(|(day, prices)| PriceRow {
                    date: d(day),
                    prices,
                })
                .collect(),
        }
    }

    #[test]
    fn test_simple_returns_from_prices() {
        let prices = table(vec![
            (4, vec![Some(100.0), Some(50.0)]),
            (5, vec![Some(110.0), Some(49.0)]),
            (6, vec![Some(99.0), Some(49.0)]),
        ]);
        let ingested = prices.to_returns(MissingDataPolicy::Reject).unwrap();
        let series = ingested.series;

        assert_eq!(series.dates(), &[d(5), d(6)]);
        assert_abs_diff_eq!(series.row(0)[0], 0.10, epsilon = 1e-12);
        assert_abs_diff_eq!(series.row(0)[1], -0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(series.row(1)[0], -0.10, epsilon = 1e-12);
        assert_abs_diff_eq!(series.row(1)[1], 0.0, epsilon = 1e-12);
        assert!(ingested.dropped_dates.is_empty());
    }

    #[test]
    fn test_missing_price_is_misaligned() {
        let prices = table(vec![
            (4, vec![Some(100.0), Some(50.0)]),
            (5, vec![None, Some(49.0)]),
            (6, vec![Some(99.0), Some(49.0)]),
        ]);
        let err = prices.to_returns(MissingDataPolicy::Reject).unwrap_err();
        assert!(matches!(err, WalkForwardError::MisalignedData { row: 1, .. }));
    }

    #[test]
    fn test_non_positive_price_is_reported_as_such() {
        let prices = table(vec![
            (4, vec![Some(100.0), Some(50.0)]),
            (5, vec![Some(101.0), Some(0.0)]),
            (6, vec![Some(102.0), Some(49.0)]),
        ]);
        match prices.to_returns(MissingDataPolicy::Reject) {
            Err(WalkForwardError::MisalignedData { row, date, reason }) => {
                assert_eq!(row, 1);
                assert_eq!(date, d(5));
                assert!(reason.contains("non-positive price"), "{}", reason);
                assert!(reason.contains("BBB"), "{}", reason);
            }
            other => panic!("expected MisalignedData, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_price_reason_names_missing_value() {
        let prices = table(vec![
            (4, vec![Some(100.0), Some(50.0)]),
            (5, vec![None, Some(-3.0)]),
        ]);
        match prices.to_returns(MissingDataPolicy::Reject) {
            Err(WalkForwardError::MisalignedData { reason, .. }) => {
                assert!(reason.contains("missing value for asset 'AAA'"), "{}", reason);
            }
            other => panic!("expected MisalignedData, got {:?}", other),
        }
    }

    #[test]
    fn test_drop_policy_spans_gap_and_reports_it() {
        let prices = table(vec![
            (4, vec![Some(100.0), Some(50.0)]),
            (5, vec![Some(105.0), None]),
            (6, vec![Some(110.0), Some(55.0)]),
        ]);
        let ingested = prices.to_returns(MissingDataPolicy::DropAndReport).unwrap();
        assert_eq!(ingested.dropped_dates, vec![d(5)]);
        assert_eq!(ingested.series.dates(), &[d(6)]);
        assert_abs_diff_eq!(ingested.series.row(0)[0], 0.10, epsilon = 1e-12);
        assert_abs_diff_eq!(ingested.series.row(0)[1], 0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_single_complete_row_is_insufficient() {
        let prices = table(vec![(4, vec![Some(100.0), Some(50.0)])]);
        assert!(matches!(
            prices.to_returns(MissingDataPolicy::Reject),
            Err(WalkForwardError::InsufficientData(_))
        ));
    }
}
