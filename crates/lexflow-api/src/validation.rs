//! Request validation helpers.
//!
//! `validator` derives handle the declared fields; the helpers here turn
//! its error tree into the field-path list the error envelope carries,
//! and add the checks the derive cannot express: money precision over an
//! opaque payload, UUID-shaped strings, phone digits.

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use validator::ValidationErrors;

/// One rejected field, by path.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Flatten a `validator` error tree into field-path entries.
#[must_use]
pub fn collect_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    collect_into(errors, "", &mut out);
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

fn collect_into(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for e in field_errors {
                    let message = e
                        .message
                        .as_ref()
                        .map_or_else(|| e.code.to_string(), ToString::to_string);
                    out.push(FieldError {
                        field: path.clone(),
                        message,
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_into(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_into(nested, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

/// Field-name fragments that mark a number as money.
const MONEY_MARKERS: [&str; 6] = ["amount", "settlement", "payment", "fee", "cost", "award"];

/// Walk an opaque payload and reject money-named numbers with more than
/// four fractional digits.
#[must_use]
pub fn validate_money_precision(payload: &Value) -> Vec<FieldError> {
    let mut out = Vec::new();
    walk_money(payload, "", &mut out);
    out
}

fn walk_money(value: &Value, path: &str, out: &mut Vec<FieldError>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let lower = key.to_ascii_lowercase();
                if MONEY_MARKERS.iter().any(|m| lower.contains(m)) {
                    if let Value::Number(n) = child {
                        if fractional_digits(&n.to_string()) > 4 {
                            out.push(FieldError {
                                field: child_path.clone(),
                                message: "money values allow at most four fractional digits"
                                    .to_string(),
                            });
                        }
                    }
                }
                walk_money(child, &child_path, out);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                walk_money(item, &format!("{path}[{index}]"), out);
            }
        }
        _ => {}
    }
}

fn fractional_digits(rendered: &str) -> usize {
    // Scientific notation is rendered by serde_json only for values that
    // had it in the source; treat those as over-precision.
    if rendered.contains(['e', 'E']) {
        return usize::MAX;
    }
    rendered
        .split_once('.')
        .map_or(0, |(_, frac)| frac.trim_end_matches('0').len())
}

/// A UUID-shaped string, for path/header parameters validated by hand.
#[must_use]
pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok()
}

/// Phone numbers: digits with optional leading `+`, 7–15 digits.
#[must_use]
pub fn is_phone(value: &str) -> bool {
    let digits = value.strip_prefix('+').unwrap_or(value);
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Validator-compatible wrapper for the phone check.
pub fn validate_phone(value: &str) -> Result<(), validator::ValidationError> {
    if is_phone(value) {
        Ok(())
    } else {
        let mut error = validator::ValidationError::new("phone");
        error.message = Some("phone must be 7-15 digits".into());
        Err(error)
    }
}
