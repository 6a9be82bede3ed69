use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Keys of a projection's percentile bands, rendered as one table.
const BAND_KEYS: [&str; 4] = ["years", "percentile_10", "percentile_50", "percentile_90"];

/// Numeric arrays longer than this are summarised instead of listed.
const MAX_INLINE_VALUES: usize = 12;

/// Render a command result as tables: headline fields, percentile bands for
/// projections, then one table per list of records (views, drift rows,
/// trades, brackets).
pub fn print_table(value: &Value) {
    let Value::Object(envelope) = value else {
        println!("{}", value);
        return;
    };
    match envelope.get("result") {
        Some(Value::Object(result)) => print_result(result),
        Some(Value::Array(items)) => print_records(items),
        Some(other) => println!("{}", format_value(other)),
        None => print_fields(envelope.iter()),
    }
    print_footer(envelope);
}

fn print_result(result: &Map<String, Value>) {
    let bands = band_table(result);
    let mut fields: Vec<(String, &Value)> = Vec::new();
    let mut sections: Vec<(&str, &[Value])> = Vec::new();

    for (key, val) in result {
        if bands.is_some() && BAND_KEYS.contains(&key.as_str()) {
            continue;
        }
        match val {
            Value::Array(items) if items.first().is_some_and(Value::is_object) => {
                sections.push((key.as_str(), items.as_slice()));
            }
            Value::Object(inner) if !is_path_matrix(inner) => {
                for (k, v) in inner {
                    fields.push((format!("{}.{}", key, k), v));
                }
            }
            _ => fields.push((key.clone(), val)),
        }
    }

    print_fields(fields.iter().map(|(k, v)| (k, *v)));
    if let Some(table) = bands {
        println!("\nPercentile bands:");
        println!("{}", table);
    }
    for (title, items) in sections {
        println!("\n{}:", title.replace('_', " "));
        print_records(items);
    }
}

fn print_fields<'a, K: AsRef<str> + 'a>(fields: impl Iterator<Item = (K, &'a Value)>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in fields {
        builder.push_record([key.as_ref().to_string(), format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

/// Yearly rows of the 10/50/90 bands, plus the final step if it falls
/// between years.
fn band_table(result: &Map<String, Value>) -> Option<Table> {
    let columns: Vec<Vec<f64>> = BAND_KEYS
        .iter()
        .map(|k| numbers(result.get(*k)?))
        .collect::<Option<_>>()?;
    let years = &columns[0];
    if years.is_empty() || columns.iter().any(|c| c.len() != years.len()) {
        return None;
    }

    let mut builder = Builder::default();
    builder.push_record(["Year", "P10", "Median", "P90"]);
    let last = years.len() - 1;
    for (t, year) in years.iter().enumerate() {
        if year.fract().abs() > 1e-9 && t != last {
            continue;
        }
        builder.push_record([
            format!("{:.2}", year),
            format!("{:.2}", columns[1][t]),
            format!("{:.2}", columns[2][t]),
            format!("{:.2}", columns[3][t]),
        ]);
    }
    Some(Table::from(builder))
}

fn numbers(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn is_path_matrix(map: &Map<String, Value>) -> bool {
    map.contains_key("num_paths") && map.contains_key("num_steps")
}

fn print_records(items: &[Value]) {
    let Some(Value::Object(first)) = items.first() else {
        for item in items {
            println!("{}", format_value(item));
        }
        if items.is_empty() {
            println!("(none)");
        }
        return;
    };

    let headers: Vec<&String> = first.keys().collect();
    let mut builder = Builder::default();
    builder.push_record(headers.iter().map(|h| h.to_string()));
    for item in items.iter().filter_map(Value::as_object) {
        builder.push_record(
            headers
                .iter()
                .map(|h| item.get(h.as_str()).map(format_value).unwrap_or_default()),
        );
    }
    println!("{}", Table::from(builder));
}

fn print_footer(envelope: &Map<String, Value>) {
    let warnings: Vec<&str> = envelope
        .get("warnings")
        .and_then(Value::as_array)
        .map(|w| w.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for w in warnings {
            println!("  - {}", w);
        }
    }
    if let Some(method) = envelope.get("methodology").and_then(Value::as_str) {
        println!("\nMethodology: {}", method);
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => format_float(f),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(items) if items.len() > MAX_INLINE_VALUES => {
            format!("[{} values]", items.len())
        }
        Value::Array(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(map) if is_path_matrix(map) => format!(
            "{} paths x {} steps",
            map.get("num_paths").map(format_value).unwrap_or_default(),
            map.get("num_steps").map(format_value).unwrap_or_default()
        ),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Six decimals with trailing zeros dropped.
fn format_float(f: f64) -> String {
    let s = format!("{:.6}", f);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
