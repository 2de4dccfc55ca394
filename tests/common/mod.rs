//! Shared helpers for integration tests

#![allow(dead_code)]

pub mod mock_service;
pub mod strategies;

use std::sync::Arc;
use std::time::Duration;

use pipeline_conformance::fixtures::{FixtureDefaults, FixtureFactory, SequenceSuffix};
use pipeline_conformance::models::{SchemaRegistry, StaticSchemaSource};
use pipeline_conformance::scenario::{ScenarioContext, ScenarioSettings, SuiteRunner, SuiteSettings};
use pipeline_conformance::transport::{ProtocolAdapter, TransportKind};

pub use mock_service::{Faults, MockService};

pub const TEST_NAMESPACE: &str = "namespaces/admin";

pub fn schema_registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::new(Arc::new(StaticSchemaSource::default())))
}

/// Deterministic suite settings with a short timeout
pub fn test_settings() -> SuiteSettings {
    SuiteSettings {
        namespace: TEST_NAMESPACE.to_string(),
        id_prefix: "cfm-".to_string(),
        default_page_size: 10,
        scenario_timeout: Duration::from_secs(5),
        max_concurrent_scenarios: 4,
        seed: Some(42),
        cleanup_after_timeout: true,
        fixtures: FixtureDefaults::default(),
    }
}

pub fn mock(transport: TransportKind) -> Arc<MockService> {
    Arc::new(MockService::new(transport))
}

/// Runner over the given adapters with no scenarios registered yet
pub fn runner(settings: SuiteSettings, adapters: &[Arc<MockService>]) -> SuiteRunner {
    adapters.iter().fold(SuiteRunner::new(settings, schema_registry()), |runner, adapter| {
        runner.with_adapter(Arc::clone(adapter) as Arc<dyn ProtocolAdapter>)
    })
}

/// Scenario context with sequential IDs (`t-00000000`, `t-00000001`, ...)
pub fn context(name: &str, adapter: Arc<MockService>) -> ScenarioContext {
    let fixtures = FixtureFactory::new(SequenceSuffix::default(), FixtureDefaults::default()).with_prefix("t-");
    ScenarioContext::new(
        name,
        adapter,
        fixtures,
        schema_registry(),
        ScenarioSettings {
            namespace: TEST_NAMESPACE.to_string(),
            default_page_size: 10,
        },
    )
}
