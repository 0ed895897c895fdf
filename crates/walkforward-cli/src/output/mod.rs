pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Write a command result to stdout in the requested format.
///
/// CSV and minimal output carry no warnings section, so envelope warnings
/// go to the log on stderr instead.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => {
            log_warnings(value);
            csv_out::print_csv(value)
        }
        OutputFormat::Minimal => {
            log_warnings(value);
            minimal::print_minimal(value)
        }
    }
}

fn log_warnings(value: &Value) {
    for w in envelope_warnings(value) {
        tracing::warn!("{}", w);
    }
}

fn envelope_warnings(value: &Value) -> Vec<&str> {
    value
        .get("warnings")
        .and_then(Value::as_array)
        .map(|ws| ws.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
