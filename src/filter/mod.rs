//! # Filter Evaluator
//!
//! Parses the service's filter strings (`qConnection="prefix" AND
//! integrationId='openai'`) and evaluates them locally, so a scenario can
//! predict which IDs a filtered list must return.

use serde_json::{Map, Value};

use crate::expectation::Snapshot;
use crate::models::{lookup_path, FilterFieldKind, Resource, ResourceSchema};

mod parser;

pub use parser::FilterParseError;

/// One `field = "value"` term, resolved against the schema at parse time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub value: String,
    pub kind: FilterFieldKind,
}

impl Predicate {
    fn matches(&self, id: &str, fields: &Map<String, Value>) -> bool {
        match &self.kind {
            FilterFieldKind::Fuzzy { text_fields } => {
                let needle = self.value.to_lowercase();
                text_fields
                    .iter()
                    .filter_map(|path| field_text(id, fields, path))
                    .any(|text| text.to_lowercase().contains(&needle))
            }
            FilterFieldKind::Exact { field } => {
                field_text(id, fields, field).is_some_and(|text| text == self.value)
            }
        }
    }
}

fn field_text(id: &str, fields: &Map<String, Value>, path: &str) -> Option<String> {
    if path == "id" {
        return Some(id.to_string());
    }
    match lookup_path(fields, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Conjunction of predicates; no predicates matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpression {
    pub terms: Vec<Predicate>,
}

impl FilterExpression {
    pub fn parse(input: &str, schema: &ResourceSchema) -> Result<Self, FilterParseError> {
        parser::parse(input, schema)
    }

    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn is_match_all(&self) -> bool {
        self.terms.is_empty()
    }

    /// Conjunction of both expressions
    pub fn and(mut self, other: FilterExpression) -> Self {
        self.terms.extend(other.terms);
        self
    }

    pub fn matches(&self, id: &str, fields: &Map<String, Value>) -> bool {
        self.terms.iter().all(|term| term.matches(id, fields))
    }

    pub fn matches_resource(&self, resource: &Resource) -> bool {
        self.matches(&resource.id, &resource.fields)
    }

    /// Canonical query string, parseable back into the same expression
    pub fn to_query_string(&self) -> String {
        self.terms
            .iter()
            .map(|term| {
                let escaped = term.value.replace('\\', "\\\\").replace('"', "\\\"");
                format!("{}=\"{escaped}\"", term.field)
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl std::fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

/// IDs of `snapshot` matching every conjunct, in collection order
pub fn evaluate(expr: &FilterExpression, snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .iter()
        .filter(|resource| expr.matches(&resource.id, &resource.fields))
        .map(|resource| resource.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::{apply, Operation};
    use serde_json::json;

    fn integrations() -> Snapshot {
        let schema = ResourceSchema::integration();
        let mut snapshot = Snapshot::new();
        for (id, title, vendor) in [
            ("bigquery", "BigQuery", "Google"),
            ("redis", "Redis", "Redis Labs"),
            ("openai", "OpenAI", "OpenAI"),
        ] {
            let op = Operation::Create {
                payload: json!({"id": id, "title": title, "vendor": vendor}),
            };
            snapshot = apply(&snapshot, &op, &schema).snapshot;
        }
        snapshot
    }

    #[test]
    fn test_fuzzy_filter_is_case_insensitive_substring() {
        let schema = ResourceSchema::integration();
        let expr = FilterExpression::parse(r#"qIntegration="que""#, &schema).unwrap();
        assert_eq!(evaluate(&expr, &integrations()), vec!["bigquery"]);

        let expr = FilterExpression::parse(r#"qIntegration="labs""#, &schema).unwrap();
        assert_eq!(evaluate(&expr, &integrations()), vec!["redis"]);
    }

    #[test]
    fn test_empty_filter_matches_all_in_order() {
        assert_eq!(
            evaluate(&FilterExpression::match_all(), &integrations()),
            vec!["bigquery", "redis", "openai"]
        );
        assert!(evaluate(&FilterExpression::match_all(), &Snapshot::new()).is_empty());
    }

    #[test]
    fn test_exact_and_fuzzy_conjunction() {
        let schema = ResourceSchema::connection();
        let mut snapshot = Snapshot::new();
        for (id, integration) in [("pre-a", "openai"), ("pre-b", "email"), ("other", "openai")] {
            let op = Operation::Create {
                payload: json!({"id": id, "integrationId": integration}),
            };
            snapshot = apply(&snapshot, &op, &schema).snapshot;
        }

        let fuzzy = FilterExpression::parse(r#"qConnection="pre-""#, &schema).unwrap();
        let exact = FilterExpression::parse("integrationId='openai'", &schema).unwrap();
        assert_eq!(evaluate(&fuzzy, &snapshot), vec!["pre-a", "pre-b"]);
        assert_eq!(evaluate(&fuzzy.and(exact), &snapshot), vec!["pre-a"]);
    }

    #[test]
    fn test_query_string_round_trip() {
        let schema = ResourceSchema::connection();
        let expr = FilterExpression::parse(
            r#"qConnection='quote"d' AND integrationId="openai""#,
            &schema,
        )
        .unwrap();
        let rendered = expr.to_query_string();
        assert_eq!(rendered, r#"qConnection="quote\"d" AND integrationId="openai""#);
        assert_eq!(FilterExpression::parse(&rendered, &schema).unwrap(), expr);
    }
}
