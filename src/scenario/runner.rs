//! # Suite Runner
//!
//! Expands scenarios x adapters into units and runs them concurrently up to
//! a bound. Steps inside a unit stay strictly sequential. A unit that
//! exceeds its timeout is dropped mid-flight and marked ERRORED; the
//! fixtures it created go to a best-effort cleanup pass at the end of the
//! suite.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::catalog;
use super::context::{delete_all, ScenarioContext, ScenarioSettings};
use super::parity::parity_reports;
use super::report::{ScenarioReport, SuiteReport};
use super::state::ScenarioState;
use crate::config::ConformanceConfig;
use crate::error::ConformanceResult;
use crate::fixtures::{FixtureDefaults, FixtureFactory, RandomSuffix};
use crate::models::{ResourceRef, SchemaRegistry, StaticSchemaSource};
use crate::transport::{ProtocolAdapter, UnifiedAdapter};

/// A named sequence of steps run against one adapter
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut ScenarioContext) -> ConformanceResult<()>;
}

/// Suite-wide execution settings
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteSettings {
    pub namespace: String,
    pub id_prefix: String,
    pub default_page_size: u32,
    pub scenario_timeout: Duration,
    pub max_concurrent_scenarios: usize,
    /// Base seed; unit `i` uses `seed + i`
    pub seed: Option<u64>,
    pub cleanup_after_timeout: bool,
    pub fixtures: FixtureDefaults,
}

impl SuiteSettings {
    pub fn from_config(config: &ConformanceConfig) -> Self {
        Self {
            namespace: config.suite.namespace.clone(),
            id_prefix: config.suite.id_prefix.clone(),
            default_page_size: config.suite.default_page_size,
            scenario_timeout: Duration::from_millis(config.suite.scenario_timeout_ms),
            max_concurrent_scenarios: config.suite.max_concurrent_scenarios,
            seed: config.suite.seed,
            cleanup_after_timeout: config.suite.cleanup_after_timeout,
            fixtures: config.fixtures.clone(),
        }
    }
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self::from_config(&ConformanceConfig::default())
    }
}

struct UnitOutcome {
    report: ScenarioReport,
    adapter: Arc<dyn ProtocolAdapter>,
    orphaned: Vec<ResourceRef>,
}

pub struct SuiteRunner {
    settings: SuiteSettings,
    schemas: Arc<SchemaRegistry>,
    adapters: Vec<Arc<dyn ProtocolAdapter>>,
    scenarios: Vec<Arc<dyn Scenario>>,
}

impl std::fmt::Debug for SuiteRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("settings", &self.settings)
            .field("adapters", &self.adapters.iter().map(|a| a.transport()).collect::<Vec<_>>())
            .field("scenarios", &self.scenarios.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

impl SuiteRunner {
    pub fn new(settings: SuiteSettings, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            settings,
            schemas,
            adapters: Vec::new(),
            scenarios: Vec::new(),
        }
    }

    /// Adapters for every configured transport and the configured scenarios
    pub async fn from_config(config: &ConformanceConfig) -> ConformanceResult<Self> {
        let source = StaticSchemaSource::new(config.schemas.clone());
        let schemas = Arc::new(SchemaRegistry::new(Arc::new(source)));
        let mut runner = Self::new(SuiteSettings::from_config(config), schemas);

        for kind in &config.suite.transports {
            let adapter = UnifiedAdapter::from_config(config, *kind).await?;
            runner = runner.with_adapter(Arc::new(adapter));
        }
        let scenarios = catalog::select(&config.suite.scenarios)?;
        Ok(runner.with_scenarios(scenarios))
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_scenario(mut self, scenario: Arc<dyn Scenario>) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_scenarios(mut self, scenarios: impl IntoIterator<Item = Arc<dyn Scenario>>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    pub fn settings(&self) -> &SuiteSettings {
        &self.settings
    }

    /// Run every unit, then the cleanup pass and the parity comparison
    pub async fn run(&self) -> SuiteReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let base_seed = self.settings.seed.unwrap_or_else(rand::random::<u64>);
        info!(
            run_id = %run_id,
            seed = base_seed,
            scenarios = self.scenarios.len(),
            adapters = self.adapters.len(),
            "Starting conformance suite"
        );

        let units: Vec<(u64, Arc<dyn Scenario>, Arc<dyn ProtocolAdapter>)> = self
            .scenarios
            .iter()
            .flat_map(|scenario| {
                self.adapters
                    .iter()
                    .map(move |adapter| (Arc::clone(scenario), Arc::clone(adapter)))
            })
            .enumerate()
            .map(|(index, (scenario, adapter))| (base_seed.wrapping_add(index as u64), scenario, adapter))
            .collect();

        let outcomes: Vec<UnitOutcome> = stream::iter(units)
            .map(|(seed, scenario, adapter)| self.run_unit(seed, scenario, adapter))
            .buffered(self.settings.max_concurrent_scenarios.max(1))
            .collect()
            .await;

        let mut leaked: Vec<String> = outcomes.iter().flat_map(|o| o.report.leaked.clone()).collect();
        for outcome in outcomes.iter().filter(|o| !o.orphaned.is_empty()) {
            if self.settings.cleanup_after_timeout {
                info!(
                    scenario = %outcome.report.name,
                    fixtures = outcome.orphaned.len(),
                    "Cleaning up after timed-out scenario"
                );
                leaked.extend(delete_all(outcome.adapter.as_ref(), outcome.orphaned.clone()).await);
            } else {
                leaked.extend(outcome.orphaned.iter().map(ResourceRef::name));
            }
        }
        if !leaked.is_empty() {
            warn!(count = leaked.len(), "Fixtures leaked after suite");
        }

        let scenarios: Vec<ScenarioReport> = outcomes.into_iter().map(|o| o.report).collect();
        let parity = parity_reports(&scenarios);
        let report = SuiteReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            scenarios,
            parity,
            leaked,
        };

        let summary = report.summary();
        info!(
            run_id = %run_id,
            passed = summary.passed,
            failed = summary.failed,
            errored = summary.errored,
            assertions = summary.assertions,
            "Conformance suite finished"
        );
        report
    }

    async fn run_unit(
        &self,
        seed: u64,
        scenario: Arc<dyn Scenario>,
        adapter: Arc<dyn ProtocolAdapter>,
    ) -> UnitOutcome {
        let span = info_span!(
            "scenario",
            name = scenario.name(),
            transport = %adapter.transport(),
            seed
        );
        self.execute(seed, scenario, adapter).instrument(span).await
    }

    async fn execute(
        &self,
        seed: u64,
        scenario: Arc<dyn Scenario>,
        adapter: Arc<dyn ProtocolAdapter>,
    ) -> UnitOutcome {
        let started = Instant::now();
        let mut report = ScenarioReport {
            name: scenario.name().to_string(),
            transport: adapter.transport(),
            state: ScenarioState::Pending,
            seed,
            assertions: Vec::new(),
            trace: Vec::new(),
            error: None,
            leaked: Vec::new(),
            duration_ms: 0,
        };

        let mut fixtures = FixtureFactory::new(RandomSuffix::seeded(seed), self.settings.fixtures.clone());
        match fixtures.new_scope_prefix(&self.settings.id_prefix) {
            Ok(prefix) => fixtures.set_prefix(prefix),
            Err(e) => {
                error!(error = %e, "Could not build a fixture prefix");
                report.state = settle(report.state, ScenarioState::Errored);
                report.error = Some(e.to_string());
                return UnitOutcome {
                    report,
                    adapter,
                    orphaned: Vec::new(),
                };
            }
        }

        let mut ctx = ScenarioContext::new(
            scenario.name(),
            Arc::clone(&adapter),
            fixtures,
            Arc::clone(&self.schemas),
            ScenarioSettings {
                namespace: self.settings.namespace.clone(),
                default_page_size: self.settings.default_page_size,
            },
        );

        report.state = settle(report.state, ScenarioState::Running);
        let outcome = tokio::time::timeout(self.settings.scenario_timeout, scenario.run(&mut ctx)).await;

        let mut orphaned = Vec::new();
        let next = match outcome {
            Ok(Ok(())) => {
                ctx.flag_unexamined();
                report.leaked = ctx.teardown().await;
                if ctx.has_failures() {
                    ScenarioState::Failed
                } else {
                    ScenarioState::Passed
                }
            }
            Ok(Err(e)) if e.is_assertion_failure() => {
                ctx.flag_unexamined();
                report.leaked = ctx.teardown().await;
                report.error = Some(e.to_string());
                ScenarioState::Failed
            }
            Ok(Err(e)) => {
                error!(error = %e, "Scenario aborted");
                report.leaked = ctx.teardown().await;
                report.error = Some(e.to_string());
                ScenarioState::Errored
            }
            Err(_) => {
                let timeout_ms = self.settings.scenario_timeout.as_millis() as u64;
                error!(timeout_ms, "Scenario timed out");
                orphaned = ctx.take_created();
                report.error = Some(format!("timed out after {timeout_ms}ms"));
                ScenarioState::Errored
            }
        };

        report.state = settle(report.state, next);
        let (assertions, trace) = ctx.into_parts();
        report.assertions = assertions;
        report.trace = trace;
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            state = %report.state,
            assertions = report.assertions.len(),
            failed = report.failed_assertions().count(),
            duration_ms = report.duration_ms,
            "Scenario finished"
        );
        UnitOutcome {
            report,
            adapter,
            orphaned,
        }
    }
}

fn settle(current: ScenarioState, next: ScenarioState) -> ScenarioState {
    current.transition(next).unwrap_or_else(|reason| {
        warn!(%reason, "Unexpected scenario state change");
        next
    })
}
