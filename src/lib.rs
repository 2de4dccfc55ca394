#![allow(clippy::doc_markdown)] // Allow technical terms like gRPC, PipelinePublicService in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeline Conformance
//!
//! Protocol-agnostic conformance verification for pipeline, connection and
//! integration management APIs exposed over REST and gRPC.
//!
//! ## Overview
//!
//! The engine computes what the service *should* answer, independently of
//! the service, and compares it with what each protocol surface actually
//! answers. The same scenario code runs against every transport, so REST and
//! gRPC are held to one set of assertions.
//!
//! ## Key Features
//!
//! - **One adapter trait** over REST (`reqwest`) and gRPC (`tonic`)
//! - **Pure expectation model** for create/update/delete sequences
//! - **Filter evaluator** predicting which IDs a filtered list must return
//! - **Cursor validator** walking pages lazily and checking the cursor contract
//! - **Redaction checker** for BASIC/FULL views of secret fields
//! - **Cross-protocol parity** of per-step status traces
//!
//! ## Module Organization
//!
//! - [`models`] - Resources, scopes, pages and resource schemas
//! - [`fixtures`] - Unique IDs and minimal valid payloads
//! - [`transport`] - Protocol adapters and the shared status taxonomy
//! - [`expectation`] - Expected collection state after each operation
//! - [`filter`] - Filter string parser and local evaluator
//! - [`pagination`] - Lazy page walks and cursor checks
//! - [`redaction`] - View-dependent secret field checks
//! - [`scenario`] - Scenario context, built-in scenarios and the suite runner
//! - [`config`] - Configuration loading
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipeline_conformance::{init_tracing, ConformanceConfig, SuiteRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_tracing();
//! let config = ConformanceConfig::load()?;
//! let report = SuiteRunner::from_config(&config).await?.run().await;
//! println!("{}", report.to_json()?);
//! std::process::exit(report.exit_code());
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib                        # Unit tests
//! cargo test                              # Unit and mock-service tests
//! cargo test --features test-services     # Against a running service
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod expectation;
pub mod filter;
pub mod fixtures;
pub mod logging;
pub mod models;
pub mod pagination;
pub mod redaction;
pub mod scenario;
pub mod transport;

pub use config::{AuthConfig, ConformanceConfig, GrpcConfig, RestConfig, SuiteConfig};
pub use error::{ConformanceError, ConformanceResult};
pub use expectation::{apply, project, Expectation, Operation, Snapshot, Transition, UpdateMode};
pub use filter::{evaluate, FilterExpression, FilterParseError};
pub use fixtures::{FixtureDefaults, FixtureFactory, RandomSuffix, SequenceSuffix, SuffixSource};
pub use logging::init_tracing;
pub use models::{
    CollectionScope, ListQuery, Page, Resource, ResourceKind, ResourceRef, ResourceSchema,
    SchemaRegistry, SchemaSource, StaticSchemaSource, View,
};
pub use pagination::{CursorValidator, CursorViolation, WalkReport};
pub use redaction::RedactionViolation;
pub use scenario::{
    Observation, Scenario, ScenarioContext, ScenarioReport, ScenarioState, SuiteReport, SuiteRunner,
    SuiteSettings,
};
pub use transport::{Envelope, ProtocolAdapter, StatusClass, TransportKind, UnifiedAdapter};
