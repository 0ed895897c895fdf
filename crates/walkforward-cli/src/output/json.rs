use serde_json::Value;

/// Pretty-printed JSON; field order follows the result structs.
pub fn render_json(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

pub fn print_json(value: &Value) {
    match render_json(value) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}
