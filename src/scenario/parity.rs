//! Cross-protocol parity: the same scenario run over each transport must
//! observe the same status at every step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::report::{ScenarioReport, TraceEntry};
use super::state::ScenarioState;
use crate::transport::{StatusClass, TransportKind};

/// First point where two status traces disagree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Zero-based step index
    pub index: usize,
    pub step: String,
    pub reference: Option<StatusClass>,
    pub other: Option<StatusClass>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParityReport {
    pub scenario: String,
    pub reference: TransportKind,
    pub other: TransportKind,
    pub steps_compared: usize,
    pub divergence: Option<Divergence>,
}

impl ParityReport {
    pub fn is_consistent(&self) -> bool {
        self.divergence.is_none()
    }
}

/// Compare two runs of one scenario step by step
pub fn compare(reference: &ScenarioReport, other: &ScenarioReport) -> ParityReport {
    let longest = reference.trace.len().max(other.trace.len());
    let divergence = (0..longest).find_map(|index| {
        let left = reference.trace.get(index);
        let right = other.trace.get(index);
        let agree = matches!((left, right), (Some(l), Some(r)) if l == r);
        (!agree).then(|| Divergence {
            index,
            step: left.or(right).map(|e: &TraceEntry| e.step.clone()).unwrap_or_default(),
            reference: left.map(|e| e.status),
            other: right.map(|e| e.status),
        })
    });

    ParityReport {
        scenario: reference.name.clone(),
        reference: reference.transport,
        other: other.transport,
        steps_compared: reference.trace.len().min(other.trace.len()),
        divergence,
    }
}

/// Compare every scenario that ran over more than one transport.
///
/// The first transport a scenario ran on is the reference. Errored runs stop
/// at an arbitrary step and are left out.
pub fn parity_reports(scenarios: &[ScenarioReport]) -> Vec<ParityReport> {
    let mut by_name: BTreeMap<&str, Vec<&ScenarioReport>> = BTreeMap::new();
    let comparable = scenarios
        .iter()
        .filter(|r| r.state.is_terminal() && r.state != ScenarioState::Errored);
    for report in comparable {
        by_name.entry(report.name.as_str()).or_default().push(report);
    }

    by_name
        .into_values()
        .filter_map(|runs| {
            let (reference, others) = runs.split_first()?;
            Some(others.iter().map(|other| compare(reference, other)).collect::<Vec<_>>())
        })
        .flatten()
        .collect()
}
