pub mod csv_out;
pub mod minimal;
pub mod table;

use colored::Colorize;
use serde_json::Value;

use crate::OutputFormat;

/// Write a command result to stdout in the requested format.
///
/// Formats that print only data (csv, minimal) send the envelope's warnings
/// to stderr so that a degraded result is never silent.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("JSON serialization error: {}", e),
        },
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => {
            csv_out::print_csv(value);
            report_warnings(value);
        }
        OutputFormat::Minimal => {
            minimal::print_minimal(value);
            report_warnings(value);
        }
    }
}

fn report_warnings(value: &Value) {
    let warnings = value
        .get("warnings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for w in warnings.iter().filter_map(Value::as_str) {
        eprintln!("{}: {}", "warning".yellow().bold(), w);
    }
}
