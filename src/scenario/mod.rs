//! # Scenario Orchestrator
//!
//! Runs named step sequences against protocol adapters, keeps the
//! expectation model in step with every request, and records one assertion
//! per check.
//!
//! ## Outcome rules
//!
//! - A failed check marks the scenario FAILED and execution continues.
//! - A failed `require_*` check breaks the causal chain: the remaining steps
//!   are skipped and the scenario is FAILED.
//! - Transport, fixture, protocol and timeout errors abort the scenario,
//!   which is then ERRORED. Other scenarios are unaffected.
//!
//! ```rust,ignore
//! use pipeline_conformance::scenario::SuiteRunner;
//!
//! let runner = SuiteRunner::from_config(&config).await?;
//! let report = runner.run().await;
//! std::process::exit(report.exit_code());
//! ```

pub mod catalog;
mod context;
pub mod parity;
mod report;
mod runner;
mod state;

pub use catalog::builtin_scenarios;
pub use context::{Observation, ScenarioContext, ScenarioSettings};
pub use parity::{compare, parity_reports, Divergence, ParityReport};
pub use report::{AssertionRecord, RequestLabel, ScenarioReport, SuiteReport, SuiteSummary, TraceEntry};
pub use runner::{Scenario, SuiteRunner, SuiteSettings};
pub use state::ScenarioState;
