use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one scenario unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioState {
    /// Scheduled, no request sent yet
    #[default]
    Pending,
    /// Steps are executing
    Running,
    /// Every assertion held
    Passed,
    /// At least one assertion failed
    Failed,
    /// Aborted by a transport, fixture, protocol or timeout error
    Errored,
}

impl ScenarioState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Errored)
    }

    /// Check if this state counts against the suite
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Errored)
    }

    pub fn can_transition_to(&self, next: ScenarioState) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Errored),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(self, next: ScenarioState) -> Result<ScenarioState, String> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(format!("Invalid scenario transition: {self} -> {next}"))
        }
    }
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Errored => write!(f, "ERRORED"),
        }
    }
}

impl std::str::FromStr for ScenarioState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "PASSED" => Ok(Self::Passed),
            "FAILED" => Ok(Self::Failed),
            "ERRORED" => Ok(Self::Errored),
            _ => Err(format!("Invalid scenario state: {s}")),
        }
    }
}
