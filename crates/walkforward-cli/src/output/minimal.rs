use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Heuristic: look for well-known result fields in order of priority,
/// then fall back to the first field in the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = [
        "final_value",
        "sharpe_ratio",
        "total_return",
        "alpha",
        "weights",
    ];

    if let Value::Object(map) = result_obj {
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

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        // Regression coefficients print their point estimate
        Value::Object(map) if map.contains_key("estimate") => format_minimal(&map["estimate"]),
        // Named weights print as `name=weight` pairs
        Value::Array(items) if items.iter().all(|i| i.get("name").is_some()) => items
            .iter()
            .map(|i| {
                format!(
                    "{}={}",
                    format_minimal(&i["name"]),
                    i.get("weight").map(format_minimal).unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(" "),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
