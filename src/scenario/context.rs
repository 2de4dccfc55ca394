//! Per-scenario execution context.
//!
//! Every request a scenario makes goes through [`ScenarioContext`], which
//! advances the expectation model in lock step, labels the request, and
//! hands back an [`Observation`]. Assertions take the observation itself, so
//! a check is always tied to the response of the request that produced it.
//! Responses that no check ever looks at are reported when the scenario ends.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::report::{AssertionRecord, RequestLabel, TraceEntry};
use crate::error::{ConformanceError, ConformanceResult};
use crate::expectation::{Expectation, Operation, Snapshot, UpdateMode};
use crate::filter::{evaluate, FilterExpression};
use crate::fixtures::FixtureFactory;
use crate::models::{
    CollectionScope, ListQuery, Page, Resource, ResourceKind, ResourceRef, SchemaRegistry, View,
};
use crate::pagination::{CursorValidator, CursorViolation, WalkReport};
use crate::redaction::{self, values_equal};
use crate::transport::{Envelope, ProtocolAdapter, StatusClass, TransportKind};

/// Settings shared by every scenario of a suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSettings {
    /// Parent of namespaced collections, e.g. `namespaces/admin`
    pub namespace: String,
    pub default_page_size: u32,
}

/// A response, the request that produced it, and the status the
/// expectation model predicted
#[derive(Debug, Clone)]
pub struct Observation {
    pub request: RequestLabel,
    pub scope: CollectionScope,
    pub expected: StatusClass,
    pub envelope: Envelope,
}

impl Observation {
    pub fn status(&self) -> StatusClass {
        self.envelope.status
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.envelope.resource()
    }

    pub fn page(&self) -> Option<&Page> {
        self.envelope.page()
    }

    pub fn value(&self) -> Option<&Value> {
        self.envelope.value()
    }
}

pub struct ScenarioContext {
    name: String,
    adapter: Arc<dyn ProtocolAdapter>,
    fixtures: FixtureFactory,
    schemas: Arc<SchemaRegistry>,
    settings: ScenarioSettings,
    expectations: HashMap<CollectionScope, Expectation>,
    records: Vec<AssertionRecord>,
    unexamined: BTreeMap<u64, RequestLabel>,
    trace: Vec<TraceEntry>,
    created: Vec<ResourceRef>,
    sequence: u64,
}

impl std::fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("name", &self.name)
            .field("transport", &self.adapter.transport())
            .field("requests", &self.sequence)
            .field("assertions", &self.records.len())
            .finish()
    }
}

impl ScenarioContext {
    pub fn new(
        name: impl Into<String>,
        adapter: Arc<dyn ProtocolAdapter>,
        fixtures: FixtureFactory,
        schemas: Arc<SchemaRegistry>,
        settings: ScenarioSettings,
    ) -> Self {
        Self {
            name: name.into(),
            adapter,
            fixtures,
            schemas,
            settings,
            expectations: HashMap::new(),
            records: Vec::new(),
            unexamined: BTreeMap::new(),
            trace: Vec::new(),
            created: Vec::new(),
            sequence: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> TransportKind {
        self.adapter.transport()
    }

    pub fn settings(&self) -> &ScenarioSettings {
        &self.settings
    }

    pub fn fixtures(&mut self) -> &mut FixtureFactory {
        &mut self.fixtures
    }

    pub fn records(&self) -> &[AssertionRecord] {
        &self.records
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Fixtures created and not yet deleted
    pub fn created(&self) -> &[ResourceRef] {
        &self.created
    }

    pub fn has_failures(&self) -> bool {
        self.records.iter().any(|r| !r.passed)
    }

    /// Collection of `kind`: catalogs are global, the rest live in the
    /// configured namespace
    pub async fn scope(&mut self, kind: ResourceKind) -> ConformanceResult<CollectionScope> {
        let scope = if kind.is_read_only() {
            CollectionScope::global(kind)
        } else {
            CollectionScope::new(kind, self.settings.namespace.clone())
        };
        self.expectation_mut(&scope).await?;
        Ok(scope)
    }

    pub fn expectation(&self, scope: &CollectionScope) -> Option<&Expectation> {
        self.expectations.get(scope)
    }

    async fn expectation_mut(&mut self, scope: &CollectionScope) -> ConformanceResult<&mut Expectation> {
        let schema = self.schemas.resolve(scope.kind).await?;
        Ok(self
            .expectations
            .entry(scope.clone())
            .or_insert_with(|| Expectation::new(scope.clone(), schema)))
    }

    /// Minimal valid payload for `kind`; `overrides` must be a JSON object
    pub fn payload(&mut self, kind: ResourceKind, overrides: Value) -> ConformanceResult<Value> {
        let overrides = match overrides {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ConformanceError::fixture(format!(
                    "payload overrides must be an object, got {other}"
                )))
            }
        };
        self.fixtures.new_resource_payload(kind, overrides)
    }

    fn next_label(&mut self, operation: String, target: String) -> RequestLabel {
        self.sequence += 1;
        RequestLabel {
            id: self.sequence,
            operation,
            target,
            transport: self.adapter.transport(),
        }
    }

    fn observe(
        &mut self,
        request: RequestLabel,
        scope: CollectionScope,
        expected: StatusClass,
        envelope: Envelope,
    ) -> Observation {
        debug!(
            request = %request,
            expected = %expected,
            actual = %envelope.status,
            latency_ms = envelope.latency.as_millis() as u64,
            "Observed response"
        );
        self.trace.push(TraceEntry {
            step: request.operation.clone(),
            status: envelope.status,
        });
        self.unexamined.insert(request.id, request.clone());
        Observation {
            request,
            scope,
            expected,
            envelope,
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    pub async fn create(&mut self, scope: &CollectionScope, payload: Value) -> ConformanceResult<Observation> {
        let operation = Operation::Create {
            payload: payload.clone(),
        };
        let transition = self.expectation_mut(scope).await?.preview(&operation);
        let expected = transition.expected_status;
        let label = self.next_label(format!("create {}", scope.kind), scope.to_string());

        let envelope = self.adapter.create(scope, &payload).await?;
        if envelope.is_ok() {
            let id = envelope
                .resource()
                .map(|r| r.id.clone())
                .or_else(|| payload.get("id").and_then(Value::as_str).map(str::to_string));
            if let Some(id) = id {
                self.created.push(scope.resource(id));
            }
            self.expectation_mut(scope).await?.commit(transition);
        }
        Ok(self.observe(label, scope.clone(), expected, envelope))
    }

    pub async fn get(&mut self, target: &ResourceRef, view: View) -> ConformanceResult<Observation> {
        let expected = self.expectation_mut(&target.scope).await?.expected_get(&target.id);
        let label = self.next_label(format!("get {} {view}", target.kind()), target.name());
        let envelope = self.adapter.get(target, view).await?;
        Ok(self.observe(label, target.scope.clone(), expected, envelope))
    }

    /// One page; a filter the local parser rejects is expected to be
    /// rejected by the service as well
    pub async fn list(&mut self, scope: &CollectionScope, query: &ListQuery) -> ConformanceResult<Observation> {
        let expectation = self.expectation_mut(scope).await?;
        let expected = match FilterExpression::parse(&query.filter, expectation.schema()) {
            Ok(_) => StatusClass::Ok,
            Err(_) => StatusClass::InvalidArgument,
        };
        let label = self.next_label(format!("list {}", scope.kind.plural()), scope.to_string());
        let envelope = self.adapter.list(scope, query).await?;
        Ok(self.observe(label, scope.clone(), expected, envelope))
    }

    pub async fn update(
        &mut self,
        target: &ResourceRef,
        patch: Value,
        mode: UpdateMode,
    ) -> ConformanceResult<Observation> {
        let operation = Operation::Update {
            id: target.id.clone(),
            patch: patch.clone(),
            mode,
        };
        let transition = self.expectation_mut(&target.scope).await?.preview(&operation);
        let expected = transition.expected_status;
        let label = self.next_label(format!("update {}", target.kind()), target.name());

        let envelope = self.adapter.update(target, &patch).await?;
        if envelope.is_ok() {
            self.expectation_mut(&target.scope).await?.commit(transition);
        }
        Ok(self.observe(label, target.scope.clone(), expected, envelope))
    }

    pub async fn delete(&mut self, target: &ResourceRef) -> ConformanceResult<Observation> {
        let operation = Operation::Delete {
            id: target.id.clone(),
        };
        let transition = self.expectation_mut(&target.scope).await?.preview(&operation);
        let expected = transition.expected_status;
        let label = self.next_label(format!("delete {}", target.kind()), target.name());

        let envelope = self.adapter.delete(target).await?;
        if envelope.is_ok() {
            self.created.retain(|r| r != target);
            self.expectation_mut(&target.scope).await?.commit(transition);
        }
        Ok(self.observe(label, target.scope.clone(), expected, envelope))
    }

    /// Custom action; expected to succeed exactly when the target exists
    pub async fn invoke(&mut self, target: &ResourceRef, action: &str, args: &Value) -> ConformanceResult<Observation> {
        let expected = self.expectation_mut(&target.scope).await?.expected_get(&target.id);
        let label = self.next_label(format!("{action} {}", target.kind()), target.name());
        let envelope = self.adapter.invoke(target, action, args).await?;
        Ok(self.observe(label, target.scope.clone(), expected, envelope))
    }

    /// Walk every page of `query` and validate the cursor contract
    pub async fn walk(&mut self, scope: &CollectionScope, query: &ListQuery) -> ConformanceResult<WalkReport> {
        self.expectation_mut(scope).await?;
        let adapter = Arc::clone(&self.adapter);
        let validator = CursorValidator::new(
            adapter.as_ref(),
            scope.clone(),
            query.clone(),
            self.settings.default_page_size,
        );
        let report = validator.validate().await?;

        let status = report
            .violations
            .iter()
            .find_map(|v| match v {
                CursorViolation::PageRejected { status, .. } => Some(*status),
                _ => None,
            })
            .unwrap_or(StatusClass::Ok);
        self.trace.push(TraceEntry {
            step: format!("walk {}", scope.kind.plural()),
            status,
        });
        Ok(report)
    }

    /// Replace the expected state of a read-only catalog with what the
    /// service currently lists
    pub async fn seed_from_service(&mut self, scope: &CollectionScope) -> ConformanceResult<usize> {
        let adapter = Arc::clone(&self.adapter);
        let validator = CursorValidator::new(
            adapter.as_ref(),
            scope.clone(),
            ListQuery::new().with_view(View::Full),
            self.settings.default_page_size,
        );
        let resources: Vec<Resource> = validator.walk().try_collect().await?;
        let schema = self.schemas.resolve(scope.kind).await?;

        debug!(scope = %scope, resources = resources.len(), "Seeded expectation from service");
        self.expectations.insert(
            scope.clone(),
            Expectation::new(scope.clone(), schema).with_snapshot(Snapshot::from_resources(&resources)),
        );
        self.trace.push(TraceEntry {
            step: format!("seed {}", scope.kind.plural()),
            status: StatusClass::Ok,
        });
        Ok(resources.len())
    }

    /// IDs the filter should select from the expected state of `scope`
    pub fn predict_filter(&self, scope: &CollectionScope, filter: &str) -> ConformanceResult<Vec<String>> {
        let expectation = self
            .expectations
            .get(scope)
            .ok_or_else(|| ConformanceError::fixture(format!("no expectation for {scope}")))?;
        let expr = FilterExpression::parse(filter, expectation.schema())?;
        Ok(evaluate(&expr, expectation.snapshot()))
    }

    pub fn expected_ids(&self, scope: &CollectionScope) -> Vec<String> {
        self.expectations
            .get(scope)
            .map(|e| e.snapshot().ids())
            .unwrap_or_default()
    }

    // =========================================================================
    // ASSERTIONS
    // =========================================================================

    /// Record one check; returns whether it passed
    pub fn check(
        &mut self,
        name: impl Into<String>,
        passed: bool,
        expected: impl Display,
        actual: impl Display,
        request: Option<&RequestLabel>,
    ) -> bool {
        let record = AssertionRecord {
            name: name.into(),
            passed,
            expected: expected.to_string(),
            actual: actual.to_string(),
            request: request.cloned(),
        };
        if passed {
            debug!(scenario = %self.name, check = %record.name, "Check passed");
        } else {
            warn!(
                scenario = %self.name,
                check = %record.name,
                expected = %record.expected,
                actual = %record.actual,
                "Check failed"
            );
        }
        self.records.push(record);
        passed
    }

    fn examine(&mut self, observation: &Observation) {
        self.unexamined.remove(&observation.request.id);
    }

    /// The status matches the expectation model
    pub fn check_status(&mut self, observation: &Observation, name: impl Into<String>) -> bool {
        let expected = observation.expected;
        self.expect_status(observation, expected, name)
    }

    /// The status matches an explicitly given class
    pub fn expect_status(
        &mut self,
        observation: &Observation,
        expected: StatusClass,
        name: impl Into<String>,
    ) -> bool {
        self.examine(observation);
        self.check(
            name,
            observation.status() == expected,
            expected,
            observation.envelope.describe(),
            Some(&observation.request),
        )
    }

    /// Like [`check_status`](Self::check_status), but a mismatch breaks the
    /// causal chain and the remaining steps are skipped
    pub fn require_status(&mut self, observation: &Observation, name: impl Into<String>) -> ConformanceResult<()> {
        let name = name.into();
        if self.check_status(observation, name.clone()) {
            Ok(())
        } else {
            Err(ConformanceError::ChainBroken { step: name })
        }
    }

    /// Secret fields are rendered as `view` demands
    pub fn check_redaction(&mut self, observation: &Observation, view: View, name: impl Into<String>) -> bool {
        self.examine(observation);
        let Some(resource) = observation.resource() else {
            return self.check(
                name,
                false,
                format!("{view} resource"),
                observation.envelope.describe(),
                Some(&observation.request),
            );
        };

        let (secrets, written) = match self.expectations.get(&observation.scope) {
            Some(expectation) => (
                expectation.schema().secret_fields(),
                expectation.snapshot().get(&resource.id).map(|r| r.fields.clone()),
            ),
            None => (Vec::new(), None),
        };
        let violations = redaction::check(resource, view, &secrets, written.as_ref());
        let actual = if violations.is_empty() {
            "no violations".to_string()
        } else {
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        self.check(
            name,
            violations.is_empty(),
            format!("{view} rendering of [{}]", secrets.join(", ")),
            actual,
            Some(&observation.request),
        )
    }

    /// Public fields written by the tester come back with the written values
    pub fn check_visible_fields(&mut self, observation: &Observation, view: View, name: impl Into<String>) -> bool {
        self.examine(observation);
        let Some(resource) = observation.resource() else {
            return self.check(
                name,
                false,
                "resource body",
                observation.envelope.describe(),
                Some(&observation.request),
            );
        };

        let Some(expectation) = self.expectations.get(&observation.scope) else {
            return self.check(name, false, "known scope", &observation.scope, Some(&observation.request));
        };
        let Some(expected) = expectation.expected_view(&resource.id, view) else {
            return self.check(
                name,
                false,
                format!("'{}' in expected state", resource.id),
                "absent",
                Some(&observation.request),
            );
        };

        let mismatched: Vec<String> = expected
            .iter()
            .filter(|(key, _)| !expectation.schema().is_secret(key))
            .filter(|(key, value)| !resource.fields.get(*key).is_some_and(|actual| values_equal(value, actual)))
            .map(|(key, _)| key.clone())
            .collect();

        let actual = if mismatched.is_empty() {
            "all written fields match".to_string()
        } else {
            format!("mismatched: {}", mismatched.join(", "))
        };
        self.check(
            name,
            mismatched.is_empty(),
            "written field values",
            actual,
            Some(&observation.request),
        )
    }

    /// Compare two JSON values numerically-aware
    pub fn check_value(
        &mut self,
        observation: Option<&Observation>,
        name: impl Into<String>,
        expected: &Value,
        actual: &Value,
    ) -> bool {
        if let Some(observation) = observation {
            self.examine(observation);
        }
        self.check(
            name,
            values_equal(expected, actual),
            expected,
            actual,
            observation.map(|o| &o.request),
        )
    }

    /// The page holds exactly `expected` IDs, in any order
    pub fn check_ids(&mut self, observation: &Observation, name: impl Into<String>, expected: &[String]) -> bool {
        self.examine(observation);
        let actual = observation.page().map(Page::ids).unwrap_or_default();
        let passed = observation.page().is_some() && same_ids(expected, &actual);
        self.check(
            name,
            passed,
            format!("{expected:?}"),
            format!("{actual:?}"),
            Some(&observation.request),
        )
    }

    /// A walk broke no cursor rule
    pub fn check_walk(&mut self, name: impl Into<String>, report: &WalkReport) -> bool {
        let actual = if report.is_clean() {
            format!("{} resources over {} pages", report.ids.len(), report.pages.len())
        } else {
            report
                .violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        self.check(name, report.is_clean(), "clean cursor walk", actual, None)
    }

    /// A walk yielded exactly `expected` IDs, in any order
    pub fn check_walk_ids(&mut self, name: impl Into<String>, report: &WalkReport, expected: &[String]) -> bool {
        self.check(
            name,
            same_ids(expected, &report.ids),
            format!("{expected:?}"),
            format!("{:?}", report.ids),
            None,
        )
    }

    /// Re-fetching the page behind `token` yields the same page
    pub async fn check_token_idempotence(
        &mut self,
        name: impl Into<String>,
        scope: &CollectionScope,
        query: &ListQuery,
        token: &str,
    ) -> ConformanceResult<bool> {
        let adapter = Arc::clone(&self.adapter);
        let validator = CursorValidator::new(
            adapter.as_ref(),
            scope.clone(),
            query.clone(),
            self.settings.default_page_size,
        );
        let violation = validator.check_token_idempotence(token).await?;
        self.trace.push(TraceEntry {
            step: format!("refetch {}", scope.kind.plural()),
            status: StatusClass::Ok,
        });
        let passed = violation.is_none();
        let actual = violation.map_or_else(|| "same page".to_string(), |v| v.to_string());
        Ok(self.check(name, passed, "same page", actual, None))
    }

    /// Record a failure for every response no check looked at
    pub fn flag_unexamined(&mut self) {
        let unexamined = std::mem::take(&mut self.unexamined);
        for label in unexamined.into_values() {
            self.check(
                format!("response to {} examined", label.operation),
                false,
                "at least one assertion",
                "never asserted",
                Some(&label),
            );
        }
    }

    /// Delete every fixture still present, newest first; returns the names
    /// of those that could not be deleted
    pub async fn teardown(&mut self) -> Vec<String> {
        let targets = self.take_created();
        delete_all(self.adapter.as_ref(), targets).await
    }

    /// Hand over the cleanup list without deleting anything
    pub fn take_created(&mut self) -> Vec<ResourceRef> {
        std::mem::take(&mut self.created)
    }

    pub(crate) fn into_parts(self) -> (Vec<AssertionRecord>, Vec<TraceEntry>) {
        (self.records, self.trace)
    }
}

fn same_ids(expected: &[String], actual: &[String]) -> bool {
    let mut expected = expected.to_vec();
    let mut actual = actual.to_vec();
    expected.sort();
    actual.sort();
    expected == actual
}

/// Best-effort delete, newest first. `NOT_FOUND` counts as deleted.
pub(crate) async fn delete_all(adapter: &dyn ProtocolAdapter, mut targets: Vec<ResourceRef>) -> Vec<String> {
    let mut leaked = Vec::new();
    while let Some(target) = targets.pop() {
        match adapter.delete(&target).await {
            Ok(envelope) if envelope.is_ok() || envelope.status == StatusClass::NotFound => {
                debug!(target = %target, "Deleted fixture");
            }
            Ok(envelope) => {
                warn!(target = %target, status = %envelope.describe(), "Fixture delete rejected");
                leaked.push(target.name());
            }
            Err(error) => {
                warn!(target = %target, error = %error, "Fixture delete failed");
                leaked.push(target.name());
            }
        }
    }
    leaked
}
