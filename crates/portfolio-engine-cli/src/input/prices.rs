use portfolio_engine_core::statistics::PriceTable;
use serde_json::{json, Value};

use crate::input::file::Source;

/// Parse a price history CSV: a header row of asset names, then one row of
/// prices per observation. A leading `date` column (ISO `YYYY-MM-DD`) is
/// optional.
pub fn parse_price_csv(source: &Source) -> Result<PriceTable, Box<dyn std::error::Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source.text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let has_dates = headers
        .first()
        .is_some_and(|h| h.eq_ignore_ascii_case("date"));
    let assets: Vec<String> = headers
        .iter()
        .skip(usize::from(has_dates))
        .cloned()
        .collect();

    let mut dates: Vec<Value> = Vec::new();
    let mut prices: Vec<Vec<f64>> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let mut fields = record.iter();
        if has_dates {
            dates.push(json!(fields.next().unwrap_or_default()));
        }
        let row = fields
            .map(|f| {
                f.parse::<f64>().map_err(|e| {
                    format!("{}: row {}: bad price '{}': {}", source.origin, i + 1, f, e)
                })
            })
            .collect::<Result<Vec<f64>, String>>()?;
        prices.push(row);
    }

    let table = json!({
        "assets": assets,
        "dates": if has_dates { Value::from(dates) } else { Value::Null },
        "prices": prices,
    });
    Ok(serde_json::from_value(table)?)
}
