//! # Expectation Model
//!
//! Computes, without any I/O, what the service *should* hold after each
//! operation of a scenario. Every operation produces a fresh [`Snapshot`];
//! the previous one is never mutated, so a scenario can keep earlier
//! snapshots around for comparison.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{CollectionScope, Resource, ResourceSchema, View};
use crate::transport::StatusClass;

/// Expected state of one resource: its ID and the last-written values of
/// every field the tester wrote
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedResource {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// Ordered resources of one scope; insertion order is the list order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    resources: Vec<ExpectedResource>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot from resources already present on the service
    pub fn from_resources<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        Self {
            resources: resources
                .into_iter()
                .map(|r| ExpectedResource {
                    id: r.id.clone(),
                    fields: r.fields.clone(),
                })
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ExpectedResource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpectedResource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// How an update patch is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Overwrite each top-level field present in the patch, keep the rest
    #[default]
    Merge,
    /// Replace every writable field with the patch
    Replace,
}

/// A mutation applied to a collection
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create { payload: Value },
    Update { id: String, patch: Value, mode: UpdateMode },
    Delete { id: String },
}

impl Operation {
    pub fn label(&self) -> String {
        match self {
            Self::Create { payload } => format!(
                "create {}",
                payload.get("id").and_then(Value::as_str).unwrap_or("<no id>")
            ),
            Self::Update { id, .. } => format!("update {id}"),
            Self::Delete { id } => format!("delete {id}"),
        }
    }
}

/// Result of applying an operation to a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub snapshot: Snapshot,
    pub expected_status: StatusClass,
}

impl Transition {
    fn unchanged(snapshot: &Snapshot, expected_status: StatusClass) -> Self {
        Self {
            snapshot: snapshot.clone(),
            expected_status,
        }
    }
}

/// Apply `operation` to `snapshot`, returning the next snapshot and the
/// status the service is expected to answer with.
pub fn apply(snapshot: &Snapshot, operation: &Operation, schema: &ResourceSchema) -> Transition {
    match operation {
        Operation::Create { payload } => apply_create(snapshot, payload, schema),
        Operation::Update { id, patch, mode } => apply_update(snapshot, id, patch, *mode, schema),
        Operation::Delete { id } => match snapshot.get(id) {
            None => Transition::unchanged(snapshot, StatusClass::NotFound),
            Some(_) => Transition {
                snapshot: Snapshot {
                    resources: snapshot.resources.iter().filter(|r| &r.id != id).cloned().collect(),
                },
                expected_status: StatusClass::Ok,
            },
        },
    }
}

fn apply_create(snapshot: &Snapshot, payload: &Value, schema: &ResourceSchema) -> Transition {
    let Some(object) = payload.as_object() else {
        return Transition::unchanged(snapshot, StatusClass::InvalidArgument);
    };
    let Some(id) = object.get("id").and_then(Value::as_str) else {
        return Transition::unchanged(snapshot, StatusClass::InvalidArgument);
    };
    if !schema.id_rule.is_valid(id) || schema.validate_payload(object).is_err() {
        return Transition::unchanged(snapshot, StatusClass::InvalidArgument);
    }
    if snapshot.contains(id) {
        return Transition::unchanged(snapshot, StatusClass::AlreadyExists);
    }

    let fields = object
        .iter()
        .filter(|(key, _)| key.as_str() != "id" && !schema.is_ignored_on_write(key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut resources = snapshot.resources.clone();
    resources.push(ExpectedResource {
        id: id.to_string(),
        fields,
    });
    Transition {
        snapshot: Snapshot { resources },
        expected_status: StatusClass::Ok,
    }
}

fn apply_update(
    snapshot: &Snapshot,
    id: &str,
    patch: &Value,
    mode: UpdateMode,
    schema: &ResourceSchema,
) -> Transition {
    let Some(current) = snapshot.get(id) else {
        return Transition::unchanged(snapshot, StatusClass::NotFound);
    };
    let Some(patch) = patch.as_object() else {
        return Transition::unchanged(snapshot, StatusClass::InvalidArgument);
    };
    if schema.validate_payload(patch).is_err() {
        return Transition::unchanged(snapshot, StatusClass::InvalidArgument);
    }

    let writable = |key: &str| key != "id" && !schema.is_ignored_on_write(key) && !schema.is_immutable(key);

    let mut fields = match mode {
        UpdateMode::Merge => current.fields.clone(),
        UpdateMode::Replace => current
            .fields
            .iter()
            .filter(|(key, _)| !writable(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    };
    for (key, value) in patch.iter().filter(|(key, _)| writable(key)) {
        fields.insert(key.clone(), value.clone());
    }

    let resources = snapshot
        .resources
        .iter()
        .map(|r| {
            if r.id == id {
                ExpectedResource {
                    id: r.id.clone(),
                    fields: fields.clone(),
                }
            } else {
                r.clone()
            }
        })
        .collect();

    Transition {
        snapshot: Snapshot { resources },
        expected_status: StatusClass::Ok,
    }
}

/// Fields of `resource` visible under `view`: BASIC drops secret fields,
/// FULL shows everything with last-written values.
pub fn project(resource: &ExpectedResource, view: View, schema: &ResourceSchema) -> Map<String, Value> {
    let mut fields = resource.fields.clone();
    if view == View::Basic {
        for path in schema.secret_fields() {
            remove_path(&mut fields, &path);
        }
    }
    fields
}

fn remove_path(fields: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            fields.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = fields.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Expected state of one collection, owned by a single scenario
#[derive(Debug, Clone)]
pub struct Expectation {
    scope: CollectionScope,
    schema: Arc<ResourceSchema>,
    snapshot: Snapshot,
}

impl Expectation {
    pub fn new(scope: CollectionScope, schema: Arc<ResourceSchema>) -> Self {
        Self {
            scope,
            schema,
            snapshot: Snapshot::new(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn scope(&self) -> &CollectionScope {
        &self.scope
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Replace the snapshot with the one following `operation`
    pub fn advance(&mut self, operation: &Operation) -> StatusClass {
        let transition = apply(&self.snapshot, operation, &self.schema);
        self.snapshot = transition.snapshot;
        transition.expected_status
    }

    /// Transition `operation` would cause, without committing it
    pub fn preview(&self, operation: &Operation) -> Transition {
        apply(&self.snapshot, operation, &self.schema)
    }

    /// Adopt the snapshot of a previewed transition
    pub fn commit(&mut self, transition: Transition) {
        self.snapshot = transition.snapshot;
    }

    pub fn expected_get(&self, id: &str) -> StatusClass {
        if self.snapshot.contains(id) {
            StatusClass::Ok
        } else {
            StatusClass::NotFound
        }
    }

    /// Visible fields of `id` under `view`, if it exists
    pub fn expected_view(&self, id: &str, view: View) -> Option<Map<String, Value>> {
        self.snapshot
            .get(id)
            .map(|resource| project(resource, view, &self.schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceKind;
    use serde_json::json;

    fn schema() -> ResourceSchema {
        ResourceSchema::connection()
    }

    fn create(id: &str) -> Operation {
        Operation::Create {
            payload: json!({
                "id": id,
                "integrationId": "email",
                "uid": "client-chosen",
                "setup": {"password": "0123", "server-port": 993}
            }),
        }
    }

    #[test]
    fn test_create_appends_and_ignores_output_only() {
        let transition = apply(&Snapshot::new(), &create("a"), &schema());
        assert_eq!(transition.expected_status, StatusClass::Ok);
        let created = transition.snapshot.get("a").unwrap();
        assert!(!created.fields.contains_key("uid"));
        assert!(!created.fields.contains_key("id"));
        assert_eq!(created.fields["integrationId"], "email");
    }

    #[test]
    fn test_create_rejections() {
        let schema = schema();
        let one = apply(&Snapshot::new(), &create("a"), &schema).snapshot;

        assert_eq!(apply(&one, &create("a"), &schema).expected_status, StatusClass::AlreadyExists);
        assert_eq!(
            apply(&one, &create("cfm-This-Is-Invalid"), &schema).expected_status,
            StatusClass::InvalidArgument
        );
        let bad_port = Operation::Create {
            payload: json!({"id": "b", "setup": {"server-port": "993"}}),
        };
        assert_eq!(apply(&one, &bad_port, &schema).expected_status, StatusClass::InvalidArgument);
        let not_object = Operation::Create { payload: json!(["a"]) };
        assert_eq!(apply(&one, &not_object, &schema).expected_status, StatusClass::InvalidArgument);

        // Rejections leave the snapshot untouched
        assert_eq!(apply(&one, &bad_port, &schema).snapshot, one);
    }

    #[test]
    fn test_merge_update_overwrites_whole_values() {
        let schema = schema();
        let base = apply(&Snapshot::new(), &create("a"), &schema).snapshot;
        let update = Operation::Update {
            id: "a".to_string(),
            patch: json!({
                "uid": "should-be-ignored",
                "integrationId": "openai",
                "setup": {"password": "new"}
            }),
            mode: UpdateMode::Merge,
        };

        let transition = apply(&base, &update, &schema);
        assert_eq!(transition.expected_status, StatusClass::Ok);
        let updated = transition.snapshot.get("a").unwrap();
        assert_eq!(updated.fields["setup"], json!({"password": "new"}));
        assert_eq!(updated.fields["integrationId"], "email");
        assert!(!updated.fields.contains_key("uid"));
    }

    #[test]
    fn test_replace_update_keeps_immutable_fields_only() {
        let schema = schema();
        let base = apply(&Snapshot::new(), &create("a"), &schema).snapshot;
        let update = Operation::Update {
            id: "a".to_string(),
            patch: json!({"method": "METHOD_DICTIONARY"}),
            mode: UpdateMode::Replace,
        };
        let updated = apply(&base, &update, &schema).snapshot;
        let fields = &updated.get("a").unwrap().fields;
        assert_eq!(fields["integrationId"], "email");
        assert_eq!(fields["method"], "METHOD_DICTIONARY");
        assert!(!fields.contains_key("setup"));
    }

    #[test]
    fn test_delete_then_delete_again() {
        let schema = schema();
        let base = apply(&Snapshot::new(), &create("a"), &schema).snapshot;
        let delete = Operation::Delete { id: "a".to_string() };

        let first = apply(&base, &delete, &schema);
        assert_eq!(first.expected_status, StatusClass::Ok);
        assert!(first.snapshot.is_empty());

        let second = apply(&first.snapshot, &delete, &schema);
        assert_eq!(second.expected_status, StatusClass::NotFound);
    }

    #[test]
    fn test_update_unknown_is_not_found() {
        let update = Operation::Update {
            id: "ghost".to_string(),
            patch: json!({}),
            mode: UpdateMode::Merge,
        };
        assert_eq!(
            apply(&Snapshot::new(), &update, &schema()).expected_status,
            StatusClass::NotFound
        );
    }

    #[test]
    fn test_project_hides_secrets_under_basic() {
        let schema = schema();
        let snapshot = apply(&Snapshot::new(), &create("a"), &schema).snapshot;
        let resource = snapshot.get("a").unwrap();

        assert!(!project(resource, View::Basic, &schema).contains_key("setup"));
        assert_eq!(project(resource, View::Full, &schema)["setup"]["password"], "0123");

        let nested = schema.with_secret_fields(&["setup.password".to_string()]);
        let basic = project(resource, View::Basic, &nested);
        assert_eq!(basic["setup"], json!({"server-port": 993}));
    }

    #[test]
    fn test_expectation_is_deterministic() {
        let scope = CollectionScope::new(ResourceKind::Connection, "namespaces/admin");
        let ops = [create("a"), create("b"), Operation::Delete { id: "a".to_string() }];

        let run = || {
            let mut expectation = Expectation::new(scope.clone(), Arc::new(schema()));
            let statuses: Vec<_> = ops.iter().map(|op| expectation.advance(op)).collect();
            (statuses, expectation.snapshot().clone())
        };

        assert_eq!(run(), run());
        let (statuses, snapshot) = run();
        assert_eq!(statuses, vec![StatusClass::Ok; 3]);
        assert_eq!(snapshot.ids(), vec!["b".to_string()]);
    }
}
