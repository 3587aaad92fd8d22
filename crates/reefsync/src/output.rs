//! Output formatting: JSON, compact JSON, plain.

use std::io::{self, Write};

use serde_json::Value;

use crate::cli::OutputFormat;

/// Render a JSON value in the chosen format.
pub fn render(format: OutputFormat, value: &Value) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_default(),
        OutputFormat::JsonCompact => value.to_string(),
        OutputFormat::Plain => match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        },
    }
}

/// Write rendered output to stdout, ignoring broken pipes.
pub fn print_output(text: &str) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{text}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_strips_string_quotes() {
        assert_eq!(render(OutputFormat::Plain, &json!("auto")), "auto");
        assert_eq!(render(OutputFormat::Plain, &json!(12.5)), "12.5");
        assert_eq!(render(OutputFormat::Plain, &Value::Null), "");
    }

    #[test]
    fn compact_is_single_line() {
        let value = json!({"white": 40, "blue": 80});
        assert!(!render(OutputFormat::JsonCompact, &value).contains('\n'));
        assert!(render(OutputFormat::Json, &value).contains('\n'));
    }
}
