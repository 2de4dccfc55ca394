//! # View Redaction Checker
//!
//! One place that decides whether a response honored its view: BASIC must
//! hide every secret field, FULL must reveal each one with the value last
//! written by the tester.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{lookup_path, Resource, View};

/// A view-dependent rendering rule broken by one response
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum RedactionViolation {
    #[error("secret field '{field}' exposed under BASIC view: {value}")]
    SecretExposed { field: String, value: Value },

    #[error("secret field '{field}' missing under FULL view")]
    SecretMissing { field: String },

    #[error("secret field '{field}' is {actual}, last written {expected}")]
    SecretMismatch {
        field: String,
        expected: Value,
        actual: Value,
    },

    #[error("requested {requested} view but response reports {reported}")]
    ViewMismatch { requested: View, reported: View },
}

/// Check `resource`, fetched under `view`, against its secret fields.
///
/// `expected` holds the last-written field values; under FULL a secret
/// field the tester never wrote is only checked for presence.
pub fn check(
    resource: &Resource,
    view: View,
    secret_fields: &[String],
    expected: Option<&Map<String, Value>>,
) -> Vec<RedactionViolation> {
    let mut violations = Vec::new();

    if let Some(reported) = resource.view {
        if reported != view {
            violations.push(RedactionViolation::ViewMismatch {
                requested: view,
                reported,
            });
        }
    }

    for field in secret_fields {
        let actual = lookup_path(&resource.fields, field);
        match view {
            View::Basic => {
                if let Some(value) = actual.filter(|v| !is_redacted(Some(v))) {
                    violations.push(RedactionViolation::SecretExposed {
                        field: field.clone(),
                        value: value.clone(),
                    });
                }
            }
            View::Full => {
                let Some(actual) = actual.filter(|v| !v.is_null()) else {
                    violations.push(RedactionViolation::SecretMissing {
                        field: field.clone(),
                    });
                    continue;
                };
                if let Some(written) = expected.and_then(|e| lookup_path(e, field)) {
                    if !values_equal(written, actual) {
                        violations.push(RedactionViolation::SecretMismatch {
                            field: field.clone(),
                            expected: written.clone(),
                            actual: actual.clone(),
                        });
                    }
                }
            }
        }
    }

    violations
}

/// Absent, null and empty containers all count as hidden
pub fn is_redacted(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Structural equality with numbers compared by value, so `993` equals the
/// `993.0` a protobuf `Struct` carries
pub fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => expected == actual,
    }
}
