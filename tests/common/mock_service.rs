//! In-memory pipeline service speaking the [`ProtocolAdapter`] contract.
//!
//! Behaves like a well-formed service by default. Fault knobs make it
//! misbehave in the specific ways the checkers are meant to catch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pipeline_conformance::filter::FilterExpression;
use pipeline_conformance::models::{
    CollectionScope, ListQuery, Page, Resource, ResourceKind, ResourceRef, ResourceSchema, View,
};
use pipeline_conformance::transport::{Envelope, ProtocolAdapter, ResponseBody, StatusClass, TransportKind};
use pipeline_conformance::{ConformanceError, ConformanceResult};
use serde_json::{json, Map, Value};

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

/// Ways the mock can misbehave
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Render secret fields under BASIC
    pub leak_secrets: bool,
    /// Added to every reported totalSize
    pub total_size_skew: u64,
    /// Every call fails before reaching the service
    pub unreachable: bool,
    /// Sleep before answering
    pub delay: Option<Duration>,
    /// Accept IDs that break the ID-format rule
    pub accept_invalid_ids: bool,
    /// Answer NOT_FOUND as INTERNAL
    pub not_found_as_internal: bool,
}

#[derive(Debug, Clone)]
struct Stored {
    id: String,
    uid: String,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
    fields: Map<String, Value>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Vec<Stored>>,
    next_uid: u64,
}

impl State {
    fn insert(&mut self, collection: &str, id: &str, fields: Map<String, Value>) -> Stored {
        self.next_uid += 1;
        let now = Utc::now();
        let stored = Stored {
            id: id.to_string(),
            uid: format!("uid-{:08}", self.next_uid),
            create_time: now,
            update_time: now,
            fields,
        };
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(stored.clone());
        stored
    }

    fn find(&self, target: &ResourceRef) -> Option<&Stored> {
        self.collections
            .get(&target.scope.collection_name())?
            .iter()
            .find(|r| r.id == target.id)
    }
}

#[derive(Debug)]
pub struct MockService {
    transport: TransportKind,
    state: Mutex<State>,
    faults: Mutex<Faults>,
    list_calls: AtomicUsize,
}

impl MockService {
    /// Empty service with the integration catalog seeded
    pub fn new(transport: TransportKind) -> Self {
        let service = Self {
            transport,
            state: Mutex::new(State::default()),
            faults: Mutex::new(Faults::default()),
            list_calls: AtomicUsize::new(0),
        };
        service.seed_integrations();
        service
    }

    pub fn with_faults(self, faults: Faults) -> Self {
        *self.faults.lock() = faults;
        self
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock() = faults;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of resources in `scope`
    pub fn count(&self, scope: &CollectionScope) -> usize {
        self.state
            .lock()
            .collections
            .get(&scope.collection_name())
            .map_or(0, Vec::len)
    }

    pub fn contains(&self, target: &ResourceRef) -> bool {
        self.state.lock().find(target).is_some()
    }

    /// Insert a resource directly, bypassing validation
    pub fn insert(&self, scope: &CollectionScope, id: &str, fields: Value) {
        let fields = fields.as_object().cloned().unwrap_or_default();
        self.state.lock().insert(&scope.collection_name(), id, fields);
    }

    fn seed_integrations(&self) {
        let scope = CollectionScope::global(ResourceKind::Integration);
        for (id, title, vendor) in [
            ("bigquery", "BigQuery", "Google"),
            ("redis", "Redis", "Redis Labs"),
            ("openai", "OpenAI", "OpenAI"),
            ("email", "Email", "Instill"),
            ("slack", "Slack", "Salesforce"),
            ("github", "GitHub", "Microsoft"),
            ("pinecone", "Pinecone", "Pinecone"),
            ("weaviate", "Weaviate", "Weaviate"),
            ("mongodb", "MongoDB", "MongoDB"),
            ("anthropic", "Anthropic", "Anthropic"),
            ("mistral", "Mistral", "Mistral AI"),
            ("stability", "Stability AI", "Stability AI"),
        ] {
            self.insert(
                &scope,
                id,
                json!({
                    "title": title,
                    "vendor": vendor,
                    "schemas": [{"method": "METHOD_DICTIONARY"}]
                }),
            );
        }
    }

    async fn enter(&self) -> ConformanceResult<Faults> {
        let faults = self.faults.lock().clone();
        if let Some(delay) = faults.delay {
            tokio::time::sleep(delay).await;
        }
        if faults.unreachable {
            return Err(ConformanceError::transport(
                self.transport.as_str(),
                "connection refused",
            ));
        }
        Ok(faults)
    }

    fn envelope(&self, faults: &Faults, status: StatusClass) -> Envelope {
        let status = if faults.not_found_as_internal && status == StatusClass::NotFound {
            StatusClass::Internal
        } else {
            status
        };
        Envelope::new(self.transport, status, self.raw_code(status), Duration::from_millis(1))
    }

    fn error(&self, faults: &Faults, status: StatusClass, message: impl Into<String>) -> Envelope {
        self.envelope(faults, status).with_error(message)
    }

    fn raw_code(&self, status: StatusClass) -> i32 {
        match (self.transport, status) {
            (TransportKind::Rest, StatusClass::Ok) => 200,
            (TransportKind::Rest, StatusClass::InvalidArgument) => 400,
            (TransportKind::Rest, StatusClass::NotFound) => 404,
            (TransportKind::Rest, StatusClass::AlreadyExists) => 409,
            (TransportKind::Rest, StatusClass::Unauthorized) => 401,
            (TransportKind::Rest, _) => 500,
            (TransportKind::Grpc, StatusClass::Ok) => 0,
            (TransportKind::Grpc, StatusClass::InvalidArgument) => 3,
            (TransportKind::Grpc, StatusClass::NotFound) => 5,
            (TransportKind::Grpc, StatusClass::AlreadyExists) => 6,
            (TransportKind::Grpc, StatusClass::Unauthorized) => 16,
            (TransportKind::Grpc, _) => 13,
        }
    }

    fn render(&self, faults: &Faults, kind: ResourceKind, stored: &Stored, view: View) -> Resource {
        let mut fields = stored.fields.clone();
        if view == View::Basic && !faults.leak_secrets {
            for secret in ResourceSchema::builtin(kind).secret_fields() {
                fields.remove(&secret);
            }
        }
        Resource {
            id: stored.id.clone(),
            uid: Some(stored.uid.clone()),
            create_time: Some(stored.create_time),
            update_time: Some(stored.update_time),
            view: Some(view),
            fields,
        }
    }

    fn not_found_message(kind: ResourceKind) -> String {
        format!("{} does not exist.", kind.noun())
    }
}

/// Keys a client may set; server-assigned fields are dropped, and so are
/// immutable ones on update
fn writable_fields(schema: &ResourceSchema, fields: &Map<String, Value>, updating: bool) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(key, _)| key.as_str() != "id" && !schema.is_ignored_on_write(key))
        .filter(|(key, _)| !(updating && schema.is_immutable(key)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl ProtocolAdapter for MockService {
    fn transport(&self) -> TransportKind {
        self.transport
    }

    fn endpoint(&self) -> &str {
        "mock://pipeline-service"
    }

    async fn create(&self, scope: &CollectionScope, payload: &Value) -> ConformanceResult<Envelope> {
        let faults = self.enter().await?;
        if scope.kind.is_read_only() {
            return Ok(self.error(&faults, StatusClass::InvalidArgument, "catalog is read-only"));
        }
        let Some(object) = payload.as_object() else {
            return Ok(self.error(&faults, StatusClass::InvalidArgument, "body must be an object"));
        };
        let Some(id) = object.get("id").and_then(Value::as_str) else {
            return Ok(self.error(&faults, StatusClass::InvalidArgument, "id is required"));
        };
        let schema = ResourceSchema::builtin(scope.kind);
        if !faults.accept_invalid_ids {
            if let Err(reason) = schema.id_rule.validate(id) {
                return Ok(self.error(&faults, StatusClass::InvalidArgument, reason));
            }
        }
        if let Err(reason) = schema.validate_payload(object) {
            return Ok(self.error(&faults, StatusClass::InvalidArgument, reason));
        }

        let mut state = self.state.lock();
        if state.find(&scope.resource(id)).is_some() {
            return Ok(self.error(&faults, StatusClass::AlreadyExists, format!("{id} already exists")));
        }
        let stored = state.insert(&scope.collection_name(), id, writable_fields(&schema, object, false));
        let resource = self.render(&faults, scope.kind, &stored, View::Full);
        Ok(self.envelope(&faults, StatusClass::Ok).with_body(ResponseBody::Resource(resource)))
    }

    async fn get(&self, target: &ResourceRef, view: View) -> ConformanceResult<Envelope> {
        let faults = self.enter().await?;
        let state = self.state.lock();
        match state.find(target) {
            Some(stored) => {
                let resource = self.render(&faults, target.kind(), stored, view);
                Ok(self.envelope(&faults, StatusClass::Ok).with_body(ResponseBody::Resource(resource)))
            }
            None => Ok(self.error(&faults, StatusClass::NotFound, Self::not_found_message(target.kind()))),
        }
    }

    async fn list(&self, scope: &CollectionScope, query: &ListQuery) -> ConformanceResult<Envelope> {
        let faults = self.enter().await?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let schema = ResourceSchema::builtin(scope.kind);
        let filter = match FilterExpression::parse(&query.filter, &schema) {
            Ok(filter) => filter,
            Err(e) => return Ok(self.error(&faults, StatusClass::InvalidArgument, e.to_string())),
        };
        let offset = match query.page_token.as_deref() {
            None => 0,
            Some(token) => match token.parse::<usize>() {
                Ok(offset) => offset,
                Err(_) => return Ok(self.error(&faults, StatusClass::InvalidArgument, "invalid page token")),
            },
        };
        let page_size = query
            .page_size
            .filter(|&size| size > 0)
            .map_or(DEFAULT_PAGE_SIZE, |size| (size as usize).min(MAX_PAGE_SIZE));
        let view = query.view.unwrap_or_default();

        let state = self.state.lock();
        let matching: Vec<&Stored> = state
            .collections
            .get(&scope.collection_name())
            .map(|items| items.iter().filter(|r| filter.matches(&r.id, &r.fields)).collect())
            .unwrap_or_default();

        let end = (offset + page_size).min(matching.len());
        let start = offset.min(end);
        let items = matching[start..end]
            .iter()
            .map(|stored| self.render(&faults, scope.kind, stored, view))
            .collect();
        let next_page_token = if end < matching.len() {
            end.to_string()
        } else {
            String::new()
        };
        let page = Page {
            items,
            next_page_token,
            total_size: matching.len() as u64 + faults.total_size_skew,
        };
        Ok(self.envelope(&faults, StatusClass::Ok).with_body(ResponseBody::Page(page)))
    }

    async fn update(&self, target: &ResourceRef, patch: &Value) -> ConformanceResult<Envelope> {
        let faults = self.enter().await?;
        let Some(patch) = patch.as_object() else {
            return Ok(self.error(&faults, StatusClass::InvalidArgument, "patch must be an object"));
        };
        let kind = target.kind();
        let schema = ResourceSchema::builtin(kind);

        let mut state = self.state.lock();
        let Some(stored) = state
            .collections
            .get_mut(&target.scope.collection_name())
            .and_then(|items| items.iter_mut().find(|r| r.id == target.id))
        else {
            return Ok(self.error(&faults, StatusClass::NotFound, Self::not_found_message(kind)));
        };
        if let Err(reason) = schema.validate_payload(patch) {
            return Ok(self.error(&faults, StatusClass::InvalidArgument, reason));
        }
        stored.fields.extend(writable_fields(&schema, patch, true));
        stored.update_time = Utc::now();
        let resource = self.render(&faults, kind, stored, View::Full);
        Ok(self.envelope(&faults, StatusClass::Ok).with_body(ResponseBody::Resource(resource)))
    }

    async fn delete(&self, target: &ResourceRef) -> ConformanceResult<Envelope> {
        let faults = self.enter().await?;
        let mut state = self.state.lock();
        let removed = state
            .collections
            .get_mut(&target.scope.collection_name())
            .and_then(|items| {
                let index = items.iter().position(|r| r.id == target.id)?;
                Some(items.remove(index))
            });
        match removed {
            Some(_) => Ok(self.envelope(&faults, StatusClass::Ok)),
            None => Ok(self.error(&faults, StatusClass::NotFound, Self::not_found_message(target.kind()))),
        }
    }

    async fn invoke(&self, target: &ResourceRef, action: &str, args: &Value) -> ConformanceResult<Envelope> {
        let faults = self.enter().await?;
        if target.kind() != ResourceKind::Pipeline || action != "trigger" {
            return Ok(self.error(&faults, StatusClass::InvalidArgument, format!("unknown action {action}")));
        }
        if self.state.lock().find(target).is_none() {
            return Ok(self.error(&faults, StatusClass::NotFound, Self::not_found_message(target.kind())));
        }
        let outputs: Vec<Value> = args
            .get("inputs")
            .and_then(Value::as_array)
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| json!({ "answer": input.get("input").cloned().unwrap_or(Value::Null) }))
                    .collect()
            })
            .unwrap_or_default();
        Ok(self
            .envelope(&faults, StatusClass::Ok)
            .with_body(ResponseBody::Value(json!({ "outputs": outputs, "metadata": {} }))))
    }
}
