use chrono::NaiveDate;
use std::io::Read;

use walkforward_core::factor_models::{FactorRow, FactorTable};
use walkforward_core::returns::{PriceRow, PriceTable, ReturnRow, ReturnTable};

use super::file::resolve_path;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"];
const MISSING_MARKERS: [&str; 4] = ["", "na", "nan", "null"];

/// Date-indexed CSV: first column a date, one numeric column per series.
#[derive(Debug)]
pub struct WideTable {
    pub columns: Vec<String>,
    pub rows: Vec<(NaiveDate, Vec<Option<f64>>)>,
}

impl WideTable {
    pub fn into_prices(self) -> PriceTable {
        PriceTable {
            assets: self.columns,
            rows: self
                .rows
                .into_iter()
                .map(|(date, prices)| PriceRow { date, prices })
                .collect(),
        }
    }

    pub fn into_returns(self) -> ReturnTable {
        ReturnTable {
            assets: self.columns,
            rows: self
                .rows
                .into_iter()
                .map(|(date, returns)| ReturnRow { date, returns })
                .collect(),
        }
    }

    /// Factor tables must be complete.
    pub fn into_factors(self) -> Result<FactorTable, Box<dyn std::error::Error>> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for (date, values) in self.rows {
            let complete: Option<Vec<f64>> = values.into_iter().collect();
            match complete {
                Some(values) => rows.push(FactorRow { date, values }),
                None => return Err(format!("Factor row {} has a missing value", date).into()),
            }
        }
        Ok(FactorTable {
            factors: self.columns,
            rows,
        })
    }
}

/// Read a wide CSV file, multiplying every value by `scale`.
pub fn read_wide_csv(path: &str, scale: f64) -> Result<WideTable, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = std::fs::File::open(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_wide(file, scale).map_err(|e| format!("'{}': {}", canonical.display(), e).into())
}

fn parse_wide<R: Read>(reader: R, scale: f64) -> Result<WideTable, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err("CSV needs a date column and at least one value column".into());
    }
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = i + 2;
        let raw_date = record.get(0).unwrap_or_default();
        let date = parse_date(raw_date)
            .ok_or_else(|| format!("line {}: unrecognised date '{}'", line, raw_date))?;
        let values = record
            .iter()
            .skip(1)
            .enumerate()
            .map(|(j, cell)| {
                parse_cell(cell, scale).map_err(|_| {
                    format!(
                        "line {}: column '{}' has non-numeric value '{}'",
                        line, columns[j], cell
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push((date, values));
    }

    Ok(WideTable { columns, rows })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn parse_cell(raw: &str, scale: f64) -> Result<Option<f64>, std::num::ParseFloatError> {
    if MISSING_MARKERS.contains(&raw.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    raw.parse::<f64>().map(|v| Some(v * scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wide_with_missing_cells() {
        let data = "date,SPY,TLT\n2024-01-02,470.1,95.2\n2024-01-03,,95.9\n20240104,471.0,NaN\n";
        let table = parse_wide(data.as_bytes(), 1.0).unwrap();
        assert_eq!(table.columns, vec!["SPY", "TLT"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[1].1, vec![None, Some(95.9)]);
        assert_eq!(table.rows[2].0, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(table.rows[2].1[1], None);
    }

    #[test]
    fn test_percent_scaling() {
        let data = "Date,Mkt-RF,RF\n20240102,1.25,0.02\n";
        let table = parse_wide(data.as_bytes(), 0.01).unwrap();
        let factors = table.into_factors().unwrap();
        assert!((factors.rows[0].values[0] - 0.0125).abs() < 1e-15);
    }

    #[test]
    fn test_bad_cell_reports_line() {
        let data = "date,A\n2024-01-02,abc\n";
        let err = parse_wide(data.as_bytes(), 1.0).unwrap_err().to_string();
        assert!(err.contains("line 2"));
    }
}
