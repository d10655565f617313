//! Parameter interpolation and SQL identifier helpers
//!
//! Templates reference parameters as `:key`. Keys are replaced longest-first
//! so that `:table_name` is never partially consumed by a shorter `:table`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static SQL_IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("Invalid regex pattern"));

/// Whether `candidate` is a valid unquoted SQL identifier
pub fn is_sql_identifier(candidate: &str) -> bool {
    SQL_IDENTIFIER_PATTERN.is_match(candidate)
}

/// Replace every `:key` token in `template` with the rendered parameter value.
///
/// Arrays render as a comma-joined list; with `quote_arrays` each element is
/// single-quoted (for `IN (...)` clauses). Keys are processed longest-first.
pub fn interpolate(template: &str, params: &Map<String, Value>, quote_arrays: bool) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut rendered = template.to_string();
    for key in keys {
        let token = format!(":{key}");
        if rendered.contains(&token) {
            rendered = rendered.replace(&token, &render_value(&params[key.as_str()], quote_arrays));
        }
    }
    rendered
}

fn render_value(value: &Value, quote_arrays: bool) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "NULL".to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| render_array_element(item, quote_arrays))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn render_array_element(value: &Value, quote: bool) -> String {
    let rendered = render_value(value, quote);
    if quote {
        quote_literal(&rendered)
    } else {
        rendered
    }
}

/// Single-quote a string literal, doubling embedded quotes
pub fn quote_literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// Double-quote an identifier for use in generated DDL
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', ""))
}

/// Convert free-form header text into SQL-identifier form: lowercased,
/// whitespace and dashes collapsed to underscores, everything else dropped,
/// with a leading underscore added when the result would start with a digit.
pub fn to_sql_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if (ch == '_' || ch == '-' || ch.is_whitespace()) && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        return "column".to_string();
    }
    if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().expect("params must be an object").clone()
    }

    #[test]
    fn test_interpolate_string_and_number() {
        let p = params(json!({"table_name": "orders", "batch_size": 500}));
        let sql = interpolate(
            "INSERT INTO :table_name SELECT * FROM staging LIMIT :batch_size",
            &p,
            true,
        );
        assert_eq!(sql, "INSERT INTO orders SELECT * FROM staging LIMIT 500");
    }

    #[test]
    fn test_interpolate_prefers_longest_key() {
        let p = params(json!({"table": "wrong", "table_name": "orders"}));
        let sql = interpolate("DELETE FROM :table_name", &p, true);
        assert_eq!(sql, "DELETE FROM orders");
    }

    #[test]
    fn test_interpolate_quoted_array() {
        let p = params(json!({"statuses": ["open", "held"]}));
        let sql = interpolate("WHERE status IN (:statuses)", &p, true);
        assert_eq!(sql, "WHERE status IN ('open', 'held')");
    }

    #[test]
    fn test_interpolate_unquoted_array() {
        let p = params(json!({"ids": [7, 42]}));
        let sql = interpolate("WHERE id IN (:ids)", &p, false);
        assert_eq!(sql, "WHERE id IN (7, 42)");
    }

    #[test]
    fn test_interpolate_leaves_unknown_tokens() {
        let p = params(json!({"known": "x"}));
        let sql = interpolate("SELECT :known, :unknown", &p, true);
        assert_eq!(sql, "SELECT x, :unknown");
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_is_sql_identifier() {
        assert!(is_sql_identifier("orders_2024"));
        assert!(is_sql_identifier("_staging"));
        assert!(!is_sql_identifier("2024_orders"));
        assert!(!is_sql_identifier("Orders"));
        assert!(!is_sql_identifier("order-items"));
        assert!(!is_sql_identifier(""));
    }

    #[test]
    fn test_to_sql_identifier() {
        assert_eq!(to_sql_identifier("Customer Name"), "customer_name");
        assert_eq!(to_sql_identifier("  Order-Total ($)  "), "order_total");
        assert_eq!(to_sql_identifier("2024 revenue"), "_2024_revenue");
        assert_eq!(to_sql_identifier("%%%"), "column");
        assert_eq!(to_sql_identifier("already_fine"), "already_fine");
    }
}
