use serde_json::{Map, Value};
use std::io;

type Row = Vec<String>;

/// Write the tabular body of a result as CSV on stdout.
///
/// Projections write their percentile bands (one row per month), other
/// results their first list of records. Results without one fall back to
/// `field,value` pairs.
pub fn print_csv(value: &Value) {
    let rows = match value.get("result") {
        Some(Value::Object(result)) => band_rows(result)
            .or_else(|| first_records(result).map(record_rows))
            .unwrap_or_else(|| field_rows(result)),
        Some(Value::Array(items)) => record_rows(items),
        Some(other) => vec![vec![cell(other)]],
        None => value.as_object().map(field_rows).unwrap_or_default(),
    };

    let mut wtr = csv::Writer::from_writer(io::stdout().lock());
    for row in rows {
        if let Err(e) = wtr.write_record(&row) {
            eprintln!("CSV write error: {}", e);
            return;
        }
    }
    if let Err(e) = wtr.flush() {
        eprintln!("CSV write error: {}", e);
    }
}

fn band_rows(result: &Map<String, Value>) -> Option<Vec<Row>> {
    let years = array(result, "years")?;
    let bands = [
        array(result, "percentile_10")?,
        array(result, "percentile_50")?,
        array(result, "percentile_90")?,
    ];

    let mut rows = vec![vec![
        "year".to_string(),
        "p10".to_string(),
        "p50".to_string(),
        "p90".to_string(),
    ]];
    for (t, year) in years.iter().enumerate() {
        let mut row = vec![cell(year)];
        row.extend(bands.iter().map(|b| b.get(t).map(cell).unwrap_or_default()));
        rows.push(row);
    }
    Some(rows)
}

fn array<'a>(result: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    result.get(key)?.as_array()
}

fn first_records(result: &Map<String, Value>) -> Option<&[Value]> {
    result.values().find_map(|v| match v {
        Value::Array(items) if items.first().is_some_and(Value::is_object) => {
            Some(items.as_slice())
        }
        _ => None,
    })
}

fn record_rows(items: &[Value]) -> Vec<Row> {
    let Some(first) = items.first().and_then(Value::as_object) else {
        return items.iter().map(|v| vec![cell(v)]).collect();
    };
    let headers: Row = first.keys().cloned().collect();
    let mut rows = vec![headers.clone()];
    rows.extend(items.iter().filter_map(Value::as_object).map(|item| {
        headers
            .iter()
            .map(|h| item.get(h).map(cell).unwrap_or_default())
            .collect()
    }));
    rows
}

fn field_rows(map: &Map<String, Value>) -> Vec<Row> {
    let mut rows = vec![vec!["field".to_string(), "value".to_string()]];
    rows.extend(map.iter().map(|(k, v)| vec![k.clone(), cell(v)]));
    rows
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(_) | Value::Bool(_) => value.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
