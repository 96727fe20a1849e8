//! Mapping from SQL result sets to Prometheus metric names, labels and values.

use crate::db::Cell;

/// Namespace prepended to every exported metric.
pub const NAMESPACE: &str = "sql";

/// Check that a name is a valid Prometheus metric name.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Sanitize a column name into a Prometheus-compatible label name.
///
/// Prometheus label names must match `[a-zA-Z_][a-zA-Z0-9_]*`.
/// Labels starting with `__` are reserved for internal use.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for (i, c) in name.chars().enumerate() {
        let valid = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };

        if valid {
            result.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    // Remove trailing underscores
    while result.len() > 1 && result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() || result == "_" {
        return "label".to_string();
    }

    if result.starts_with("__") {
        result.insert(0, 'z');
    }

    result
}

/// Build the full metric name for a configured query.
///
/// Format: `{namespace}_{name}`
pub fn build_metric_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", namespace, name)
    }
}

/// Decode the value column of a row.
///
/// Integers, floats and booleans convert directly. Text is parsed as a
/// float, which covers drivers that return `NUMERIC`/`DECIMAL` as strings.
/// Returns a description of the problem for NULL and non-numeric cells.
pub fn decode_value(cell: &Cell) -> Result<f64, String> {
    match cell {
        Cell::Int(v) => Ok(*v as f64),
        Cell::Float(v) => Ok(*v),
        Cell::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
        Cell::Text(s) => parse_number(s),
        Cell::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => parse_number(s),
            Err(_) => Err("binary value is not numeric".to_string()),
        },
        Cell::Null => Err("NULL value".to_string()),
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| format!("{:?} is not numeric", s))
}

/// Render a label column as a string.
///
/// Every cell type has a text form, so this never fails. NULL becomes the
/// empty string, which Prometheus treats the same as an absent label.
pub fn label_value(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Bool(v) => v.to_string(),
        Cell::Int(v) => v.to_string(),
        Cell::Float(v) => v.to_string(),
        Cell::Text(s) => s.clone(),
        Cell::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
    }
}
