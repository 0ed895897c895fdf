use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::WalkForwardError;
use crate::returns::prices::PriceTable;
use crate::returns::window::EstimationWindow;
use crate::types::DatedValue;
use crate::WalkForwardResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What to do with a row that is missing a value for at least one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// Fail ingestion with `MisalignedData` naming the first incomplete row.
    #[default]
    Reject,
    /// Drop incomplete rows and report every dropped date to the caller.
    DropAndReport,
}

/// One row of the wire format: a date plus one (possibly missing) return per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRow {
    pub date: NaiveDate,
    pub returns: Vec<Option<f64>>,
}

/// Wire format of a return series, as supplied by a market data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnTable {
    pub assets: Vec<String>,
    pub rows: Vec<ReturnRow>,
}

/// Aligned periodic returns for a fixed asset universe.
///
/// Invariants, enforced at construction:
/// - asset identifiers are non-empty and unique,
/// - dates are strictly increasing,
/// - every row has exactly one finite return per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReturnTable", into = "ReturnTable")]
pub struct ReturnSeries {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<f64>>,
}

/// A series together with the rows ingestion discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedReturns {
    pub series: ReturnSeries,
    pub dropped_dates: Vec<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl ReturnSeries {
    /// Build a series from fully populated rows.
    pub fn new(
        assets: Vec<String>,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<f64>>,
    ) -> WalkForwardResult<Self> {
        validate_assets(&assets)?;
        if dates.len() != rows.len() {
            return Err(WalkForwardError::InvalidInput {
                field: "dates".into(),
                reason: format!("{} dates supplied for {} rows", dates.len(), rows.len()),
            });
        }

        let n = assets.len();
        for (i, (date, row)) in dates.iter().zip(rows.iter()).enumerate() {
            check_order(i, *date, i.checked_sub(1).map(|p| dates[p]))?;
            check_width(i, *date, row.len(), n)?;
            if let Some(j) = row.iter().position(|r| !r.is_finite()) {
                return Err(missing_value(i, *date, &assets[j]));
            }
        }

        Ok(Self {
            assets,
            dates,
            rows,
        })
    }

    /// Build a series from the wire format, applying `policy` to incomplete rows.
    pub fn from_table(
        table: ReturnTable,
        policy: MissingDataPolicy,
    ) -> WalkForwardResult<IngestedReturns> {
        validate_assets(&table.assets)?;
        let n = table.assets.len();

        let mut dates = Vec::with_capacity(table.rows.len());
        let mut rows = Vec::with_capacity(table.rows.len());
        let mut dropped_dates = Vec::new();
        let mut prev: Option<NaiveDate> = None;

        for (i, row) in table.rows.into_iter().enumerate() {
            check_order(i, row.date, prev)?;
            check_width(i, row.date, row.returns.len(), n)?;
            prev = Some(row.date);

            match first_missing(&row.returns) {
                None => {
                    dates.push(row.date);
                    rows.push(row.returns.into_iter().flatten().collect());
                }
                Some(j) => match policy {
                    MissingDataPolicy::Reject => {
                        return Err(missing_value(i, row.date, &table.assets[j]));
                    }
                    MissingDataPolicy::DropAndReport => {
                        tracing::warn!(date = %row.date, asset = %table.assets[j], "dropping incomplete return row");
                        dropped_dates.push(row.date);
                    }
                },
            }
        }

        Ok(IngestedReturns {
            series: Self {
                assets: table.assets,
                dates,
                rows,
            },
            dropped_dates,
        })
    }

    /// Build a series of simple returns from a price table.
    pub fn from_prices(
        table: &PriceTable,
        policy: MissingDataPolicy,
    ) -> WalkForwardResult<IngestedReturns> {
        table.to_returns(policy)
    }

    /// Wire representation of this series.
    pub fn to_table(&self) -> ReturnTable {
        ReturnTable {
            assets: self.assets.clone(),
            rows: self
                .dates
                .iter()
                .zip(self.rows.iter())
                .map(|(date, row)| ReturnRow {
                    date: *date,
                    returns: row.iter().copied().map(Some).collect(),
                })
                .collect(),
        }
    }
}

impl TryFrom<ReturnTable> for ReturnSeries {
    type Error = WalkForwardError;

    fn try_from(table: ReturnTable) -> Result<Self, Self::Error> {
        Self::from_table(table, MissingDataPolicy::Reject).map(|ingested| ingested.series)
    }
}

impl From<ReturnSeries> for ReturnTable {
    fn from(series: ReturnSeries) -> Self {
        series.to_table()
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl ReturnSeries {
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    /// Number of rows (T).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, index: usize) -> NaiveDate {
        self.dates[index]
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Read-only view over rows `[start, end)`.
    pub fn window(&self, start: usize, end: usize) -> EstimationWindow<'_> {
        EstimationWindow::new(&self.dates[start..end], &self.rows[start..end])
    }

    /// Daily returns of the equally weighted portfolio (row means).
    pub fn equal_weight_returns(&self) -> Vec<DatedValue> {
        let n = self.num_assets() as f64;
        self.dates
            .iter()
            .zip(self.rows.iter())
            .map(|(date, row)| DatedValue {
                date: *date,
                value: row.iter().sum::<f64>() / n,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

pub(crate) fn validate_assets(assets: &[String]) -> WalkForwardResult<()> {
    if assets.is_empty() {
        return Err(WalkForwardError::InvalidInput {
            field: "assets".into(),
            reason: "At least one asset identifier required".into(),
        });
    }
    let mut seen = HashSet::with_capacity(assets.len());
    for asset in assets {
        if asset.trim().is_empty() {
            return Err(WalkForwardError::InvalidInput {
                field: "assets".into(),
                reason: "Asset identifiers must be non-empty".into(),
            });
        }
        if !seen.insert(asset.as_str()) {
            return Err(WalkForwardError::InvalidInput {
                field: "assets".into(),
                reason: format!("Duplicate asset identifier '{}'", asset),
            });
        }
    }
    Ok(())
}

pub(crate) fn check_order(
    row: usize,
    date: NaiveDate,
    prev: Option<NaiveDate>,
) -> WalkForwardResult<()> {
    match prev {
        Some(p) if date <= p => Err(WalkForwardError::MisalignedData {
            row,
            date,
            reason: format!("date does not follow previous row dated {}", p),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn check_width(
    row: usize,
    date: NaiveDate,
    width: usize,
    n: usize,
) -> WalkForwardResult<()> {
    if width != n {
        return Err(WalkForwardError::MisalignedData {
            row,
            date,
            reason: format!("{} values for {} assets", width, n),
        });
    }
    Ok(())
}

pub(crate) fn first_missing(values: &[Option<f64>]) -> Option<usize> {
    values
        .iter()
        .position(|v| !matches!(v, Some(x) if x.is_finite()))
}

pub(crate) fn missing_value(row: usize, date: NaiveDate, asset: &str) -> WalkForwardError {
    WalkForwardError::MisalignedData {
        row,
        date,
        reason: format!("missing value for asset '{}'", asset),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
