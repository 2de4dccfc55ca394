//! # Resource Schemas
//!
//! Declares which fields a resource kind carries, their types, which are
//! secret (redacted under the BASIC view) and which can be filtered on.
//! The engine treats schemas as given: they are fetched once through a
//! [`SchemaSource`] and cached read-only for the duration of a suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::resource::{lookup_path, IdRule, ResourceKind};
use crate::error::ConformanceResult;

/// JSON type expected for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldType {
    /// Null is always accepted: it means "unset".
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Self::String => value.is_string(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.fract() == 0.0)
            }
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

/// A declared field, addressed by dotted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub path: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub secret: bool,
}

impl FieldSpec {
    pub fn public(path: &str, field_type: FieldType) -> Self {
        Self {
            path: path.to_string(),
            field_type,
            secret: false,
        }
    }

    pub fn secret(path: &str, field_type: FieldType) -> Self {
        Self {
            path: path.to_string(),
            field_type,
            secret: true,
        }
    }
}

/// How a filter field matches resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum FilterFieldKind {
    /// Case-insensitive substring of any of the indexed text fields
    Fuzzy { text_fields: Vec<String> },
    /// Exact string equality on one field
    Exact { field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterField {
    pub name: String,
    #[serde(flatten)]
    pub kind: FilterFieldKind,
}

impl FilterField {
    pub fn fuzzy(name: &str, text_fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: FilterFieldKind::Fuzzy {
                text_fields: text_fields.iter().map(|f| f.to_string()).collect(),
            },
        }
    }

    pub fn exact(name: &str, field: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FilterFieldKind::Exact {
                field: field.to_string(),
            },
        }
    }
}

/// Schema of one resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub kind: ResourceKind,
    #[serde(default)]
    pub id_rule: IdRule,
    pub fields: Vec<FieldSpec>,
    /// Server-assigned fields; values sent by clients are ignored
    pub output_only: Vec<String>,
    /// Fields fixed at creation; updates leave them untouched
    pub immutable: Vec<String>,
    pub filter_fields: Vec<FilterField>,
}

const COMMON_OUTPUT_ONLY: &[&str] = &["uid", "name", "createTime", "updateTime", "deleteTime", "view"];

impl ResourceSchema {
    pub fn pipeline() -> Self {
        Self {
            kind: ResourceKind::Pipeline,
            id_rule: IdRule::default(),
            fields: vec![
                FieldSpec::public("description", FieldType::String),
                FieldSpec::public("recipe", FieldType::Object),
            ],
            output_only: output_only(&["owner", "ownerName", "permission"]),
            immutable: vec!["id".to_string()],
            filter_fields: vec![FilterField::fuzzy("q", &["id", "description"])],
        }
    }

    pub fn connection() -> Self {
        Self {
            kind: ResourceKind::Connection,
            id_rule: IdRule::default(),
            fields: vec![
                FieldSpec::public("integrationId", FieldType::String),
                FieldSpec::public("method", FieldType::String),
                FieldSpec::secret("setup", FieldType::Object),
                FieldSpec::public("setup.email-address", FieldType::String),
                FieldSpec::public("setup.password", FieldType::String),
                FieldSpec::public("setup.server-address", FieldType::String),
                FieldSpec::public("setup.server-port", FieldType::Integer),
                FieldSpec::public("setup.api-key", FieldType::String),
            ],
            output_only: output_only(&["integrationTitle", "namespaceId"]),
            immutable: vec!["id".to_string(), "integrationId".to_string()],
            filter_fields: vec![
                FilterField::fuzzy("qConnection", &["id"]),
                FilterField::exact("integrationId", "integrationId"),
                FilterField::exact("method", "method"),
            ],
        }
    }

    pub fn integration() -> Self {
        Self {
            kind: ResourceKind::Integration,
            id_rule: IdRule::default(),
            fields: vec![
                FieldSpec::public("title", FieldType::String),
                FieldSpec::public("vendor", FieldType::String),
                FieldSpec::public("description", FieldType::String),
                FieldSpec::public("icon", FieldType::String),
                FieldSpec::public("featured", FieldType::Boolean),
                FieldSpec::secret("schemas", FieldType::Array),
            ],
            output_only: output_only(&[]),
            immutable: vec!["id".to_string()],
            filter_fields: vec![FilterField::fuzzy("qIntegration", &["title", "vendor", "id"])],
        }
    }

    pub fn builtin(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Pipeline => Self::pipeline(),
            ResourceKind::Connection => Self::connection(),
            ResourceKind::Integration => Self::integration(),
        }
    }

    /// Paths of secret fields
    pub fn secret_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.secret)
            .map(|f| f.path.clone())
            .collect()
    }

    pub fn is_secret(&self, top_level: &str) -> bool {
        self.fields.iter().any(|f| f.secret && f.path == top_level)
    }

    pub fn filter_field(&self, name: &str) -> Option<&FilterField> {
        self.filter_fields.iter().find(|f| f.name == name)
    }

    /// Whether a top-level key is ignored when written by a client
    pub fn is_ignored_on_write(&self, key: &str) -> bool {
        self.output_only.iter().any(|k| k == key)
    }

    pub fn is_immutable(&self, key: &str) -> bool {
        self.immutable.iter().any(|k| k == key)
    }

    /// Type-check every declared field present in `payload`
    pub fn validate_payload(&self, payload: &Map<String, Value>) -> Result<(), String> {
        for spec in &self.fields {
            if let Some(value) = lookup_path(payload, &spec.path) {
                if !spec.field_type.accepts(value) {
                    return Err(format!(
                        "field '{}' expects {:?}, got {}",
                        spec.path, spec.field_type, value
                    ));
                }
            }
        }
        Ok(())
    }

    /// Mark the given paths secret, declaring them if unknown
    pub fn with_secret_fields(mut self, paths: &[String]) -> Self {
        for spec in &mut self.fields {
            spec.secret = paths.contains(&spec.path);
        }
        for path in paths {
            if !self.fields.iter().any(|f| &f.path == path) {
                self.fields.push(FieldSpec::secret(path, FieldType::Any));
            }
        }
        self
    }
}

fn output_only(extra: &[&str]) -> Vec<String> {
    COMMON_OUTPUT_ONLY
        .iter()
        .chain(extra.iter())
        .map(|s| s.to_string())
        .collect()
}

/// Per-kind adjustments applied on top of the built-in schemas
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOverride {
    #[serde(default)]
    pub secret_fields: Option<Vec<String>>,
    #[serde(default)]
    pub extra_fields: Vec<FieldSpec>,
    #[serde(default)]
    pub extra_filter_fields: Vec<FilterField>,
}

/// Where resource schemas come from
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch(&self, kind: ResourceKind) -> ConformanceResult<ResourceSchema>;
}

/// Built-in schemas plus configured overrides
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaSource {
    overrides: HashMap<ResourceKind, SchemaOverride>,
}

impl StaticSchemaSource {
    pub fn new(overrides: HashMap<ResourceKind, SchemaOverride>) -> Self {
        Self { overrides }
    }
}

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    async fn fetch(&self, kind: ResourceKind) -> ConformanceResult<ResourceSchema> {
        let mut schema = ResourceSchema::builtin(kind);
        if let Some(adjust) = self.overrides.get(&kind) {
            schema.fields.extend(adjust.extra_fields.iter().cloned());
            schema
                .filter_fields
                .extend(adjust.extra_filter_fields.iter().cloned());
            if let Some(secrets) = &adjust.secret_fields {
                schema = schema.with_secret_fields(secrets);
            }
        }
        Ok(schema)
    }
}

/// Fetch-once, read-only schema cache shared by every scenario of a suite
pub struct SchemaRegistry {
    source: Arc<dyn SchemaSource>,
    cache: DashMap<ResourceKind, Arc<ResourceSchema>>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("cached_kinds", &self.cache.len())
            .finish()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(Arc::new(StaticSchemaSource::default()))
    }
}

impl SchemaRegistry {
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    /// Return the cached schema, fetching it on first use
    pub async fn resolve(&self, kind: ResourceKind) -> ConformanceResult<Arc<ResourceSchema>> {
        if let Some(schema) = self.cached(kind) {
            return Ok(schema);
        }

        let fetched = Arc::new(self.source.fetch(kind).await?);
        debug!(kind = %kind, secret_fields = ?fetched.secret_fields(), "Fetched resource schema");

        // A concurrent fetch may have won; keep whichever landed first.
        Ok(Arc::clone(self.cache.entry(kind).or_insert(fetched).value()))
    }

    pub fn cached(&self, kind: ResourceKind) -> Option<Arc<ResourceSchema>> {
        self.cache.get(&kind).map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_connection_schema_secret_fields() {
        let schema = ResourceSchema::connection();
        assert_eq!(schema.secret_fields(), vec!["setup".to_string()]);
        assert!(schema.is_secret("setup"));
        assert!(schema.filter_field("qConnection").is_some());
        assert!(schema.filter_field("title").is_none());
    }

    #[test]
    fn test_validate_payload_rejects_string_port() {
        let schema = ResourceSchema::connection();
        let payload = json!({
            "setup": {"server-port": "993", "password": "0123"}
        });
        let error = schema
            .validate_payload(payload.as_object().unwrap())
            .unwrap_err();
        assert!(error.contains("setup.server-port"));

        let valid = json!({"setup": {"server-port": 993}});
        assert!(schema.validate_payload(valid.as_object().unwrap()).is_ok());
    }

    #[test]
    fn test_integer_accepts_whole_doubles() {
        assert!(FieldType::Integer.accepts(&json!(993.0)));
        assert!(!FieldType::Integer.accepts(&json!(993.5)));
    }

    #[test]
    fn test_with_secret_fields_replaces_secret_set() {
        let schema = ResourceSchema::connection()
            .with_secret_fields(&["setup.password".to_string(), "token".to_string()]);
        assert_eq!(
            schema.secret_fields(),
            vec!["setup.password".to_string(), "token".to_string()]
        );
    }

    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SchemaSource for CountingSource {
        async fn fetch(&self, kind: ResourceKind) -> ConformanceResult<ResourceSchema> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(ResourceSchema::builtin(kind))
        }
    }

    #[tokio::test]
    async fn test_registry_fetches_once() {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
        });
        let registry = SchemaRegistry::new(source.clone());

        let first = registry.resolve(ResourceKind::Connection).await.unwrap();
        let second = registry.resolve(ResourceKind::Connection).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_static_source_applies_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert(
            ResourceKind::Pipeline,
            SchemaOverride {
                secret_fields: Some(vec!["recipe".to_string()]),
                ..Default::default()
            },
        );
        let source = StaticSchemaSource::new(overrides);
        let schema = source.fetch(ResourceKind::Pipeline).await.unwrap();
        assert_eq!(schema.secret_fields(), vec!["recipe".to_string()]);
    }
}
