//! Built-in scenarios for pipelines, connections and the integration
//! catalog.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::context::ScenarioContext;
use super::runner::Scenario;
use crate::error::{ConformanceError, ConformanceResult};
use crate::expectation::UpdateMode;
use crate::models::{ListQuery, Resource, ResourceKind, View};
use crate::transport::StatusClass;

/// Page size that fits every filtered result of these scenarios on one page
const SINGLE_PAGE: u32 = 100;

/// Integration lookups that must miss: an unknown ID and a component
/// that exists but takes no setup
const MISSING_INTEGRATIONS: [&str; 2] = ["restapio", "document"];
const MISSING_INTEGRATION_MESSAGE: &str = "Integration does not exist.";

/// Every built-in scenario
pub fn builtin_scenarios() -> Vec<Arc<dyn Scenario>> {
    vec![
        Arc::new(PipelineTrigger),
        Arc::new(PipelineRoundTrip),
        Arc::new(ConnectionLifecycle),
        Arc::new(ConnectionListing::default()),
        Arc::new(IntegrationCatalog),
    ]
}

/// Built-in scenarios by name; an empty list selects all of them
pub fn select(names: &[String]) -> ConformanceResult<Vec<Arc<dyn Scenario>>> {
    let all = builtin_scenarios();
    if names.is_empty() {
        return Ok(all);
    }
    names
        .iter()
        .map(|name| {
            all.iter()
                .find(|s| s.name() == name)
                .cloned()
                .ok_or_else(|| ConformanceError::config_error(format!("Unknown scenario: {name}")))
        })
        .collect()
}

fn payload_id(payload: &Value) -> ConformanceResult<String> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConformanceError::fixture("generated payload has no id"))
}

fn with_setup_field(setup: &Value, key: &str, value: Value) -> Value {
    let mut setup = setup.clone();
    if let Some(map) = setup.as_object_mut() {
        map.insert(key.to_string(), value);
    }
    setup
}

/// Create a pipeline, trigger it, delete it
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineTrigger;

#[async_trait]
impl Scenario for PipelineTrigger {
    fn name(&self) -> &str {
        "pipeline_trigger"
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> ConformanceResult<()> {
        let scope = ctx.scope(ResourceKind::Pipeline).await?;
        let payload = ctx.payload(ResourceKind::Pipeline, Value::Null)?;
        let target = scope.resource(payload_id(&payload)?);

        let created = ctx.create(&scope, payload).await?;
        ctx.require_status(&created, "create pipeline")?;

        let args = ctx.fixtures().trigger_args();
        let inputs = args["inputs"].as_array().map_or(0, Vec::len);
        let triggered = ctx.invoke(&target, "trigger", &args).await?;
        ctx.check_status(&triggered, "trigger pipeline");
        let outputs = triggered
            .value()
            .and_then(|v| v.get("outputs"))
            .and_then(Value::as_array)
            .map(Vec::len);
        ctx.check(
            "trigger returns one output per input",
            outputs == Some(inputs),
            inputs,
            format!("{outputs:?}"),
            Some(&triggered.request),
        );

        let missing = scope.resource(format!("{}-missing", target.id));
        let obs = ctx.invoke(&missing, "trigger", &args).await?;
        ctx.check_status(&obs, "trigger missing pipeline");

        let deleted = ctx.delete(&target).await?;
        ctx.require_status(&deleted, "delete pipeline")?;
        Ok(())
    }
}

/// Create, read back, update, filter and delete a pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineRoundTrip;

#[async_trait]
impl Scenario for PipelineRoundTrip {
    fn name(&self) -> &str {
        "pipeline_round_trip"
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> ConformanceResult<()> {
        let scope = ctx.scope(ResourceKind::Pipeline).await?;
        let payload = ctx.payload(ResourceKind::Pipeline, Value::Null)?;
        let id = payload_id(&payload)?;
        let target = scope.resource(&id);

        let created = ctx.create(&scope, payload.clone()).await?;
        ctx.require_status(&created, "create pipeline")?;

        let obs = ctx.create(&scope, payload).await?;
        ctx.check_status(&obs, "create duplicate pipeline");

        let fetched = ctx.get(&target, View::Full).await?;
        ctx.require_status(&fetched, "get pipeline")?;
        ctx.check_visible_fields(&fetched, View::Full, "pipeline round-trips description and recipe");

        let description = ctx.fixtures().random_text(20);
        let updated = ctx
            .update(&target, json!({ "description": description }), UpdateMode::Merge)
            .await?;
        ctx.require_status(&updated, "update pipeline description")?;
        ctx.check_visible_fields(&updated, View::Full, "update returns new description");

        let filter = format!("q=\"{id}\"");
        let predicted = ctx.predict_filter(&scope, &filter)?;
        let listed = ctx
            .list(&scope, &ListQuery::new().with_filter(&filter).with_page_size(SINGLE_PAGE))
            .await?;
        ctx.check_status(&listed, "list pipelines by id");
        ctx.check_ids(&listed, "pipeline filter matches prediction", &predicted);

        let deleted = ctx.delete(&target).await?;
        ctx.require_status(&deleted, "delete pipeline")?;
        let gone = ctx.get(&target, View::Basic).await?;
        ctx.check_status(&gone, "get deleted pipeline");
        Ok(())
    }
}

/// Connection create, validation, views, update and delete
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionLifecycle;

#[async_trait]
impl Scenario for ConnectionLifecycle {
    fn name(&self) -> &str {
        "connection_lifecycle"
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> ConformanceResult<()> {
        let scope = ctx.scope(ResourceKind::Connection).await?;
        let prefix = ctx.fixtures().prefix().to_string();
        let setup = ctx.fixtures().defaults().connection_setup.clone();
        let payload = ctx.payload(ResourceKind::Connection, Value::Null)?;
        let id = payload_id(&payload)?;
        let target = scope.resource(&id);

        let created = ctx.create(&scope, payload.clone()).await?;
        ctx.require_status(&created, "create connection")?;
        let uid = created.resource().and_then(|r| r.uid.clone());
        ctx.check(
            "created connection has a UID",
            uid.as_deref().is_some_and(|u| !u.is_empty()),
            "non-empty uid",
            format!("{uid:?}"),
            Some(&created.request),
        );
        let create_time = created.resource().and_then(|r| r.create_time);
        ctx.check(
            "created connection has a creation time",
            create_time.is_some(),
            "a timestamp",
            format!("{create_time:?}"),
            Some(&created.request),
        );

        for bad_id in [format!("{prefix}This-Is-Invalid"), format!("{prefix}UPPERCASE")] {
            let invalid = ctx.payload(ResourceKind::Connection, json!({ "id": bad_id, "setup": {} }))?;
            let obs = ctx.create(&scope, invalid).await?;
            ctx.check_status(&obs, format!("create connection with invalid ID {bad_id}"));
        }

        let mistyped = with_setup_field(&setup, "server-port", json!("993"));
        let invalid = ctx.payload(ResourceKind::Connection, json!({ "setup": mistyped }))?;
        let obs = ctx.create(&scope, invalid).await?;
        ctx.check_status(&obs, "create connection with string server-port");

        let obs = ctx.create(&scope, payload).await?;
        ctx.check_status(&obs, "create duplicate connection");

        let obs = ctx.get(&scope.resource(format!("{id}aaa")), View::Basic).await?;
        ctx.check_status(&obs, "get missing connection");

        let basic = ctx.get(&target, View::Basic).await?;
        ctx.require_status(&basic, "get connection")?;
        ctx.check_redaction(&basic, View::Basic, "BASIC view hides setup");
        ctx.check_visible_fields(&basic, View::Basic, "BASIC view keeps public fields");

        let full = ctx.get(&target, View::Full).await?;
        ctx.require_status(&full, "get connection with FULL view")?;
        ctx.check_redaction(&full, View::Full, "FULL view reveals setup");

        let again = ctx.get(&target, View::Full).await?;
        ctx.check_status(&again, "repeat get connection");
        let first = full.resource().map(Resource::visible_json).unwrap_or_default();
        let second = again.resource().map(Resource::visible_json).unwrap_or_default();
        ctx.check_value(Some(&again), "repeated get returns identical fields", &first, &second);

        let new_setup = with_setup_field(&setup, "password", json!("4324"));
        let updated = ctx
            .update(
                &target,
                json!({ "uid": "should-be-ignored", "setup": new_setup }),
                UpdateMode::Merge,
            )
            .await?;
        ctx.require_status(&updated, "update connection setup")?;
        ctx.check_redaction(&updated, View::Full, "update returns new setup");
        let updated_uid = updated.resource().and_then(|r| r.uid.clone());
        ctx.check(
            "update leaves UID unchanged",
            updated_uid == uid,
            format!("{uid:?}"),
            format!("{updated_uid:?}"),
            Some(&updated.request),
        );

        let after = ctx.get(&target, View::Full).await?;
        ctx.check_status(&after, "get updated connection");
        ctx.check_redaction(&after, View::Full, "FULL view has new setup");

        let deleted = ctx.delete(&target).await?;
        ctx.require_status(&deleted, "delete connection")?;
        let gone = ctx.get(&target, View::Basic).await?;
        ctx.check_status(&gone, "get deleted connection");
        let twice = ctx.delete(&target).await?;
        ctx.check_status(&twice, "delete connection twice");
        Ok(())
    }
}

/// Many connections under one prefix: page boundaries, cursor walk and
/// combined filters
#[derive(Debug, Clone)]
pub struct ConnectionListing {
    /// Connections created for `integration`
    pub count: usize,
    pub integration: String,
}

impl Default for ConnectionListing {
    fn default() -> Self {
        Self {
            count: 12,
            integration: "openai".to_string(),
        }
    }
}

#[async_trait]
impl Scenario for ConnectionListing {
    fn name(&self) -> &str {
        "connection_listing"
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> ConformanceResult<()> {
        let scope = ctx.scope(ResourceKind::Connection).await?;
        let prefix = ctx.fixtures().prefix().to_string();
        let page_size = ctx.settings().default_page_size as usize;

        let payload = ctx.payload(ResourceKind::Connection, Value::Null)?;
        let obs = ctx.create(&scope, payload).await?;
        ctx.require_status(&obs, "create email connection")?;

        for i in 0..self.count {
            let api_key = ctx.fixtures().random_text(16);
            let payload = ctx.payload(
                ResourceKind::Connection,
                json!({ "integrationId": self.integration, "setup": { "api-key": api_key } }),
            )?;
            let obs = ctx.create(&scope, payload).await?;
            ctx.require_status(&obs, format!("create {} connection {i}", self.integration))?;
        }

        let filter = format!("qConnection=\"{prefix}\"");
        let predicted = ctx.predict_filter(&scope, &filter)?;
        let total = predicted.len();
        let query = ListQuery::new().with_filter(&filter);

        let first = ctx.list(&scope, &query).await?;
        ctx.require_status(&first, "list connections by prefix")?;
        let (first_total, first_len, token) = first
            .page()
            .map(|p| (p.total_size, p.len(), p.next_page_token.clone()))
            .unwrap_or_default();
        ctx.check_value(Some(&first), "first page totalSize", &json!(total), &json!(first_total));
        ctx.check_value(
            Some(&first),
            "first page has default page size",
            &json!(total.min(page_size)),
            &json!(first_len),
        );

        if total > page_size {
            let second = ctx.list(&scope, &query.at_token(&token)).await?;
            ctx.check_status(&second, "list connections second page");
            let (second_total, second_len, second_token) = second
                .page()
                .map(|p| (p.total_size, p.len(), p.next_page_token.clone()))
                .unwrap_or_default();
            ctx.check_value(Some(&second), "second page totalSize", &json!(total), &json!(second_total));
            let remaining = (total - page_size).min(page_size);
            ctx.check_value(
                Some(&second),
                "second page has remaining items",
                &json!(remaining),
                &json!(second_len),
            );
            if total <= 2 * page_size {
                ctx.check_value(
                    Some(&second),
                    "second page is the last",
                    &json!(""),
                    &json!(second_token),
                );
            }
            ctx.check_token_idempotence("page token is idempotent", &scope, &query, &token)
                .await?;
        }

        let report = ctx.walk(&scope, &query.clone().with_page_size(5)).await?;
        ctx.check_walk("walk connections five at a time", &report);
        ctx.check_walk_ids("walk yields every prefixed connection", &report, &predicted);

        let combined = format!("{filter} AND integrationId='{}'", self.integration);
        let predicted = ctx.predict_filter(&scope, &combined)?;
        let listed = ctx
            .list(&scope, &ListQuery::new().with_filter(&combined).with_page_size(SINGLE_PAGE))
            .await?;
        ctx.check_status(&listed, "list connections by prefix and integration");
        ctx.check_ids(&listed, "combined filter matches prediction", &predicted);
        Ok(())
    }
}

/// Read-only integration catalog: lookups, views, pagination and fuzzy
/// filters checked against a local prediction
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrationCatalog;

#[async_trait]
impl Scenario for IntegrationCatalog {
    fn name(&self) -> &str {
        "integration_catalog"
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> ConformanceResult<()> {
        let scope = ctx.scope(ResourceKind::Integration).await?;
        let page_size = ctx.settings().default_page_size as usize;
        let count = ctx.seed_from_service(&scope).await?;
        if !ctx.check("integration catalog is not empty", count > 0, "> 0", count, None) {
            return Ok(());
        }

        for id in MISSING_INTEGRATIONS {
            let missing = ctx.get(&scope.resource(id), View::Basic).await?;
            ctx.check_status(&missing, format!("get missing integration '{id}'"));
            if missing.status() == StatusClass::NotFound {
                let message = missing.envelope.error.clone().unwrap_or_default();
                ctx.check(
                    format!("'{id}' has an end-user message"),
                    message == MISSING_INTEGRATION_MESSAGE,
                    MISSING_INTEGRATION_MESSAGE,
                    message,
                    Some(&missing.request),
                );
            }
        }

        let known = ctx.expected_ids(&scope);
        let id = known
            .iter()
            .find(|id| id.as_str() == "email")
            .or_else(|| known.first())
            .cloned()
            .ok_or_else(|| ConformanceError::fixture("integration catalog is empty"))?;
        let target = scope.resource(&id);

        let basic = ctx.get(&target, View::Basic).await?;
        ctx.check_status(&basic, "get integration");
        ctx.check_redaction(&basic, View::Basic, "BASIC view hides schemas");

        let full = ctx.get(&target, View::Full).await?;
        ctx.check_status(&full, "get integration with FULL view");
        ctx.check_redaction(&full, View::Full, "FULL view reveals schemas");

        let first = ctx.list(&scope, &ListQuery::new()).await?;
        ctx.check_status(&first, "list integrations");
        let (total, len) = first.page().map(|p| (p.total_size, p.len())).unwrap_or_default();
        ctx.check_value(Some(&first), "integration totalSize", &json!(count), &json!(total));
        ctx.check_value(
            Some(&first),
            "integrations have default page size",
            &json!(count.min(page_size)),
            &json!(len),
        );

        let report = ctx.walk(&scope, &ListQuery::new().with_page_size(2)).await?;
        ctx.check_walk("walk integrations two at a time", &report);
        ctx.check_walk_ids("walk yields the whole catalog", &report, &known);

        for needle in ["que", "labs"] {
            let filter = format!("qIntegration=\"{needle}\"");
            let predicted = ctx.predict_filter(&scope, &filter)?;
            let listed = ctx
                .list(&scope, &ListQuery::new().with_filter(&filter).with_page_size(SINGLE_PAGE))
                .await?;
            ctx.check_status(&listed, format!("filter integrations by '{needle}'"));
            ctx.check_ids(&listed, format!("'{needle}' matches local prediction"), &predicted);
        }

        let malformed = ctx
            .list(&scope, &ListQuery::new().with_filter("qIntegration que"))
            .await?;
        ctx.check_status(&malformed, "malformed integration filter is rejected");
        Ok(())
    }
}
