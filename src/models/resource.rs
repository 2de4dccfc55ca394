//! Resources, collection scopes and response views.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{views, MAX_ID_LENGTH};
use crate::error::{ConformanceError, ConformanceResult};

/// Kinds of resources managed by the service under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Pipeline,
    Connection,
    /// Read-only catalog entry
    Integration,
}

impl ResourceKind {
    /// JSON key wrapping a single resource in REST responses
    pub fn singular(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Connection => "connection",
            Self::Integration => "integration",
        }
    }

    /// Collection path segment and JSON key of list responses
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipelines",
            Self::Connection => "connections",
            Self::Integration => "integrations",
        }
    }

    /// Noun used in gRPC method names
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Pipeline => "Pipeline",
            Self::Connection => "Connection",
            Self::Integration => "Integration",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Integration)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pipeline" => Ok(Self::Pipeline),
            "connection" => Ok(Self::Connection),
            "integration" => Ok(Self::Integration),
            _ => Err(format!("Invalid resource kind: {s}")),
        }
    }
}

/// Response-shaping mode of read operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum View {
    #[default]
    Basic,
    Full,
}

impl View {
    /// Wire name used in query parameters and JSON bodies
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::Basic => views::BASIC,
            Self::Full => views::FULL,
        }
    }

    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            views::BASIC => Some(Self::Basic),
            views::FULL => Some(Self::Full),
            _ => None,
        }
    }

    /// Protobuf enum value (`VIEW_UNSPECIFIED` is 0)
    pub fn as_proto(&self) -> i32 {
        match self {
            Self::Basic => 1,
            Self::Full => 2,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

/// A collection of resources of one kind under an optional parent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionScope {
    pub kind: ResourceKind,
    /// Parent resource name, e.g. `namespaces/admin`; `None` for global catalogs
    pub parent: Option<String>,
}

impl CollectionScope {
    pub fn new(kind: ResourceKind, parent: impl Into<String>) -> Self {
        Self {
            kind,
            parent: Some(parent.into()),
        }
    }

    /// A parentless collection such as the integration catalog
    pub fn global(kind: ResourceKind) -> Self {
        Self { kind, parent: None }
    }

    /// Resource name of the collection, e.g. `namespaces/admin/connections`
    pub fn collection_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}/{}", parent.trim_matches('/'), self.kind.plural()),
            None => self.kind.plural().to_string(),
        }
    }

    pub fn resource(&self, id: impl Into<String>) -> ResourceRef {
        ResourceRef {
            scope: self.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CollectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.collection_name())
    }
}

/// Reference to a single resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub scope: CollectionScope,
    pub id: String,
}

impl ResourceRef {
    pub fn kind(&self) -> ResourceKind {
        self.scope.kind
    }

    /// Full resource name, e.g. `namespaces/admin/connections/my-conn`
    pub fn name(&self) -> String {
        format!("{}/{}", self.scope.collection_name(), self.id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// ID-format rule: a lowercase letter, then lowercase alphanumerics or
/// hyphens, never ending in a hyphen, bounded length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRule {
    pub max_length: usize,
}

impl Default for IdRule {
    fn default() -> Self {
        Self {
            max_length: MAX_ID_LENGTH,
        }
    }
}

impl IdRule {
    pub fn validate(&self, id: &str) -> Result<(), String> {
        if id.is_empty() {
            return Err("ID must not be empty".to_string());
        }
        if id.len() > self.max_length {
            return Err(format!(
                "ID '{id}' is {} characters long, maximum is {}",
                id.len(),
                self.max_length
            ));
        }
        if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(format!("ID '{id}' must start with a lowercase letter"));
        }
        if id.ends_with('-') {
            return Err(format!("ID '{id}' must not end with a hyphen"));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(format!("ID '{id}' contains invalid character '{bad}'"));
        }
        Ok(())
    }

    pub fn is_valid(&self, id: &str) -> bool {
        self.validate(id).is_ok()
    }
}

/// A resource as observed in a service response
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: String,
    pub uid: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    /// View the service reports having rendered, if any
    pub view: Option<View>,
    /// Every other field, public and secret alike
    pub fields: Map<String, Value>,
}

impl Resource {
    /// Decode a resource from its JSON (or `Struct`-converted) representation.
    ///
    /// `id` is required; the other envelope fields are optional because their
    /// presence is itself asserted by scenarios.
    pub fn from_json(value: Value) -> ConformanceResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(ConformanceError::invalid_response(
                "resource",
                "expected a JSON object",
            ));
        };

        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            other => {
                return Err(ConformanceError::invalid_response(
                    "id",
                    format!("expected a string, got {other:?}"),
                ))
            }
        };

        let uid = take_string(&mut fields, "uid");
        let create_time = take_timestamp(&mut fields, "createTime")?;
        let update_time = take_timestamp(&mut fields, "updateTime")?;
        let view = take_string(&mut fields, "view").and_then(|v| View::from_param(&v));

        Ok(Self {
            id,
            uid,
            create_time,
            update_time,
            view,
            fields,
        })
    }

    /// Look up a field by dotted path; `id` and `uid` resolve to the envelope
    pub fn field(&self, path: &str) -> Option<Value> {
        match path {
            "id" => Some(Value::String(self.id.clone())),
            "uid" => self.uid.clone().map(Value::String),
            _ => lookup_path(&self.fields, path).cloned(),
        }
    }

    /// Visible fields as a canonical JSON value, used for byte-level comparison
    pub fn visible_json(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(uid) = &self.uid {
            object.insert("uid".to_string(), Value::String(uid.clone()));
        }
        if let Some(view) = self.view {
            object.insert("view".to_string(), Value::String(view.as_param().to_string()));
        }
        Value::Object(object)
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn take_timestamp(
    fields: &mut Map<String, Value>,
    key: &str,
) -> ConformanceResult<Option<DateTime<Utc>>> {
    match take_string(fields, key) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| ConformanceError::invalid_response(key, format!("'{raw}': {e}"))),
    }
}

/// Resolve a dotted path (`setup.password`) inside a JSON object
pub fn lookup_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
