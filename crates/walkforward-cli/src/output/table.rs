use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Arrays longer than this are shown as head and tail only.
const MAX_TABLE_ROWS: usize = 20;
const HEAD_TAIL_ROWS: usize = 5;

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_flat_object(map);
            }
        }
        Value::Array(arr) => {
            print_array_table(arr);
        }
        _ => {
            println!("{}", value);
        }
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    if let Value::Object(res_map) = result {
        // Scalars and nested objects first, row arrays as their own tables
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        let mut sections: Vec<(&str, &[Value])> = Vec::new();
        for (key, val) in res_map {
            match val {
                Value::Array(arr) if arr.first().map_or(false, Value::is_object) => {
                    builder.push_record([key.as_str(), &format!("[{} rows]", arr.len())]);
                    sections.push((key.as_str(), arr.as_slice()));
                }
                Value::Object(inner) => {
                    for (sub, v) in inner {
                        builder.push_record([format!("{}.{}", key, sub), format_value(v)]);
                    }
                }
                _ => builder.push_record([key.as_str(), &format_value(val)]),
            }
        }
        println!("{}", Table::from(builder));

        for (key, rows) in sections {
            println!("\n{}:", key);
            print_array_table(rows);
        }
    } else {
        print_flat_object(envelope);
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            println!("{}", format_value(item));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);

    let row_of = |item: &Value| -> Vec<String> {
        headers
            .iter()
            .map(|h| item.get(h.as_str()).map(format_value).unwrap_or_default())
            .collect()
    };

    if arr.len() <= MAX_TABLE_ROWS {
        for item in arr {
            builder.push_record(row_of(item));
        }
    } else {
        for item in &arr[..HEAD_TAIL_ROWS] {
            builder.push_record(row_of(item));
        }
        let mut gap = vec![String::new(); headers.len()];
        gap[0] = format!("... {} rows ...", arr.len() - 2 * HEAD_TAIL_ROWS);
        builder.push_record(gap);
        for item in &arr[arr.len() - HEAD_TAIL_ROWS..] {
            builder.push_record(row_of(item));
        }
    }

    println!("{}", Table::from(builder));
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
