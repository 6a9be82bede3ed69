use serde_json::Value;

/// The one number each command is usually run for, in lookup order.
/// Projections keep theirs under `summary`.
const HEADLINES: [&str; 9] = [
    "tax",
    "total_tax_saving",
    "ssf_optimal",
    "sharpe_ratio",
    "market_return",
    "max_abs_drift",
    "net_cash_flow",
    "median_final_value",
    "observations",
];

/// Print only the headline value of a result, or `key: value` for the first
/// field when no headline is present.
pub fn print_minimal(value: &Value) {
    let result = value.get("result").unwrap_or(value);
    let scope = result.get("summary").unwrap_or(result);

    let headline = HEADLINES
        .iter()
        .find_map(|k| scope.get(*k).filter(|v| !v.is_null()));
    match (headline, scope.as_object()) {
        (Some(v), _) => println!("{}", plain(v)),
        (None, Some(map)) => match map.iter().next() {
            Some((k, v)) => println!("{}: {}", k, plain(v)),
            None => println!("{{}}"),
        },
        (None, None) => println!("{}", plain(scope)),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        _ => value.to_string(),
    }
}
