use serde_json::{Map, Value};

/// Print just the key answer from the output.
///
/// Allocations print one `SYMBOL weight` line per asset, statistics one
/// `SYMBOL annualized_return annualized_volatility` line. Anything else
/// falls back to well-known scalar fields, then to the first field.
pub fn print_minimal(value: &Value) {
    let mut result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    // Pipeline output nests the allocation next to the statistics
    if let Some(allocation) = result_obj.get("allocation") {
        result_obj = allocation;
    }

    let priority_keys = ["sharpe_ratio", "expected_return", "expected_volatility"];

    if let Value::Object(map) = result_obj {
        if print_rows(map, "allocations", &["weight"]) {
            return;
        }
        if print_rows(map, "assets", &["annualized_return", "annualized_volatility"]) {
            return;
        }

        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn print_rows(map: &Map<String, Value>, key: &str, columns: &[&str]) -> bool {
    let Some(Value::Array(rows)) = map.get(key) else {
        return false;
    };
    for row in rows {
        let symbol = row.get("symbol").map(format_minimal).unwrap_or_default();
        let cells: Vec<String> = columns
            .iter()
            .map(|c| row.get(*c).map(format_minimal).unwrap_or_default())
            .collect();
        println!("{} {}", symbol, cells.join(" "));
    }
    true
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
