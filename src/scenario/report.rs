//! Serializable results of a suite run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parity::ParityReport;
use super::state::ScenarioState;
use crate::transport::{StatusClass, TransportKind};

/// Identifies the request whose response an assertion looked at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestLabel {
    /// Sequence number within the scenario, starting at 1
    pub id: u64,
    /// Operation and resource kind, e.g. `get connection`
    pub operation: String,
    /// Resource or collection name the request addressed
    pub target: String,
    pub transport: TransportKind,
}

impl fmt::Display for RequestLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {} ({})", self.id, self.operation, self.target, self.transport)
    }
}

/// One check and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub name: String,
    pub passed: bool,
    pub expected: String,
    pub actual: String,
    pub request: Option<RequestLabel>,
}

/// Actual status of one step, used for cross-protocol comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: String,
    pub status: StatusClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub transport: TransportKind,
    pub state: ScenarioState,
    /// Seed of the unit's fixture factory, for replay
    pub seed: u64,
    pub assertions: Vec<AssertionRecord>,
    pub trace: Vec<TraceEntry>,
    /// Why the scenario stopped early, if it did
    pub error: Option<String>,
    /// Fixtures that could not be deleted
    pub leaked: Vec<String>,
    pub duration_ms: u64,
}

impl ScenarioReport {
    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionRecord> {
        self.assertions.iter().filter(|a| !a.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.assertions.iter().filter(|a| a.passed).count()
    }
}

/// Outcome counts across a suite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub assertions: usize,
    pub failed_assertions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
    pub parity: Vec<ParityReport>,
    /// Fixtures still present after teardown and the cleanup pass
    pub leaked: Vec<String>,
}

impl SuiteReport {
    pub fn summary(&self) -> SuiteSummary {
        let mut summary = SuiteSummary::default();
        for scenario in &self.scenarios {
            match scenario.state {
                ScenarioState::Passed => summary.passed += 1,
                ScenarioState::Failed => summary.failed += 1,
                ScenarioState::Errored => summary.errored += 1,
                ScenarioState::Pending | ScenarioState::Running => {}
            }
            summary.assertions += scenario.assertions.len();
            summary.failed_assertions += scenario.failed_assertions().count();
        }
        summary
    }

    /// True when every scenario passed and every parity comparison agreed
    pub fn is_success(&self) -> bool {
        self.scenarios.iter().all(|s| s.state == ScenarioState::Passed)
            && self.parity.iter().all(ParityReport::is_consistent)
    }

    /// Process exit code for CI: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(state: ScenarioState, passed: &[bool]) -> ScenarioReport {
        ScenarioReport {
            name: "connection_lifecycle".to_string(),
            transport: TransportKind::Rest,
            state,
            seed: 7,
            assertions: passed
                .iter()
                .enumerate()
                .map(|(i, passed)| AssertionRecord {
                    name: format!("check {i}"),
                    passed: *passed,
                    expected: "OK".to_string(),
                    actual: if *passed { "OK" } else { "NOT_FOUND" }.to_string(),
                    request: None,
                })
                .collect(),
            trace: Vec::new(),
            error: None,
            leaked: Vec::new(),
            duration_ms: 12,
        }
    }

    fn suite(scenarios: Vec<ScenarioReport>) -> SuiteReport {
        SuiteReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            scenarios,
            parity: Vec::new(),
            leaked: Vec::new(),
        }
    }

    #[test]
    fn test_exit_code_reflects_failures() {
        let passing = suite(vec![scenario(ScenarioState::Passed, &[true, true])]);
        assert!(passing.is_success());
        assert_eq!(passing.exit_code(), 0);

        let failing = suite(vec![
            scenario(ScenarioState::Passed, &[true]),
            scenario(ScenarioState::Failed, &[true, false]),
        ]);
        assert_eq!(failing.exit_code(), 1);

        let summary = failing.summary();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.assertions, 3);
        assert_eq!(summary.failed_assertions, 1);
    }

    #[test]
    fn test_report_serializes_states_and_labels() {
        let mut report = scenario(ScenarioState::Errored, &[false]);
        report.assertions[0].request = Some(RequestLabel {
            id: 3,
            operation: "get connection".to_string(),
            target: "namespaces/admin/connections/c1".to_string(),
            transport: TransportKind::Grpc,
        });
        let json = serde_json::to_value(suite(vec![report])).unwrap();
        assert_eq!(json["scenarios"][0]["state"], "ERRORED");
        assert_eq!(json["scenarios"][0]["assertions"][0]["request"]["transport"], "grpc");
    }

    #[test]
    fn test_request_label_display() {
        let label = RequestLabel {
            id: 2,
            operation: "delete pipeline".to_string(),
            target: "namespaces/admin/pipelines/p".to_string(),
            transport: TransportKind::Rest,
        };
        assert_eq!(label.to_string(), "#2 delete pipeline namespaces/admin/pipelines/p (REST)");
    }
}
