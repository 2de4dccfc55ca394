//! # Fixture Factory
//!
//! Generates unique, format-valid resource IDs and minimal valid payloads.
//!
//! Uniqueness is guaranteed within one factory through an issued-ID set and a
//! bounded retry loop; across processes it is only probabilistic, which is
//! why every scenario works under its own random scope prefix.
//!
//! Randomness is injected through [`SuffixSource`], so a seeded
//! [`RandomSuffix`] reproduces a run and [`SequenceSuffix`] makes unit tests
//! fully deterministic.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::constants::{DEFAULT_ID_PREFIX, DEFAULT_SUFFIX_LENGTH, MAX_FIXTURE_ATTEMPTS};
use crate::error::{ConformanceError, ConformanceResult};
use crate::models::{IdRule, ResourceKind};

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Supplies the random part of fixture IDs
pub trait SuffixSource: Send + Sync {
    /// Return `len` characters from `[a-z0-9]`
    fn next_suffix(&mut self, len: usize) -> String;
}

/// Seeded pseudo-random suffixes
#[derive(Debug)]
pub struct RandomSuffix {
    seed: u64,
    rng: StdRng,
}

impl RandomSuffix {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Pick a fresh seed; log it so a failing run can be replayed
    pub fn from_entropy() -> Self {
        let seed = rand::random::<u64>();
        debug!(seed, "Seeding fixture suffixes from entropy");
        Self::seeded(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl SuffixSource for RandomSuffix {
    fn next_suffix(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| SUFFIX_ALPHABET[self.rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect()
    }
}

/// Zero-padded counter: `00000000`, `00000001`, ...
#[derive(Debug, Default)]
pub struct SequenceSuffix {
    next: u64,
}

impl SequenceSuffix {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }
}

impl SuffixSource for SequenceSuffix {
    fn next_suffix(&mut self, len: usize) -> String {
        let suffix = format!("{:0width$}", self.next, width = len);
        self.next += 1;
        suffix
    }
}

/// Default payload material for generated fixtures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureDefaults {
    /// Length of generated descriptions
    pub description_len: usize,
    pub connection_integration: String,
    pub connection_method: String,
    pub connection_setup: Value,
    pub pipeline_recipe: Value,
    /// Inputs sent when triggering a pipeline
    pub trigger_inputs: Vec<Value>,
}

impl Default for FixtureDefaults {
    fn default() -> Self {
        Self {
            description_len: 50,
            connection_integration: "email".to_string(),
            connection_method: "METHOD_DICTIONARY".to_string(),
            connection_setup: json!({
                "email-address": "wombat@foo.com",
                "password": "0123",
                "server-address": "imap.foo.com",
                "server-port": 993
            }),
            pipeline_recipe: json!({
                "version": "v1beta",
                "variable": {
                    "input": {"title": "Input", "format": "string"}
                },
                "output": {
                    "answer": {"title": "Answer", "value": "${variable.input}"}
                }
            }),
            trigger_inputs: vec![json!({"input": "hello"})],
        }
    }
}

/// Per-scenario generator of IDs and payloads
pub struct FixtureFactory {
    source: Box<dyn SuffixSource>,
    defaults: FixtureDefaults,
    id_rule: IdRule,
    issued: HashSet<String>,
    prefix: String,
    suffix_len: usize,
    max_attempts: usize,
}

impl std::fmt::Debug for FixtureFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureFactory")
            .field("prefix", &self.prefix)
            .field("issued", &self.issued.len())
            .finish()
    }
}

impl FixtureFactory {
    pub fn new(source: impl SuffixSource + 'static, defaults: FixtureDefaults) -> Self {
        Self {
            source: Box::new(source),
            defaults,
            id_rule: IdRule::default(),
            issued: HashSet::new(),
            prefix: DEFAULT_ID_PREFIX.to_string(),
            suffix_len: DEFAULT_SUFFIX_LENGTH,
            max_attempts: MAX_FIXTURE_ATTEMPTS,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix_len(mut self, suffix_len: usize) -> Self {
        self.suffix_len = suffix_len;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_id_rule(mut self, id_rule: IdRule) -> Self {
        self.id_rule = id_rule;
        self
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    /// Prefix shared by every ID this factory hands out
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn defaults(&self) -> &FixtureDefaults {
        &self.defaults
    }

    /// A fresh ID `{prefix}{suffix}`, valid and never issued before
    pub fn new_id(&mut self, prefix: &str) -> ConformanceResult<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = format!("{prefix}{}", self.source.next_suffix(self.suffix_len));
            self.id_rule
                .validate(&candidate)
                .map_err(|reason| ConformanceError::fixture(format!("prefix '{prefix}': {reason}")))?;

            if self.issued.insert(candidate.clone()) {
                return Ok(candidate);
            }
            debug!(candidate = %candidate, attempt, "Fixture ID collision, retrying");
        }

        Err(ConformanceError::fixture(format!(
            "no unique ID for prefix '{prefix}' after {} attempts",
            self.max_attempts
        )))
    }

    /// An ID under the factory prefix tagged with a readable label
    pub fn labeled_id(&mut self, label: &str) -> ConformanceResult<String> {
        let prefix = format!("{}{label}-", self.prefix);
        self.new_id(&prefix)
    }

    /// A unique prefix (ending in `-`) isolating one scenario's fixtures
    pub fn new_scope_prefix(&mut self, base: &str) -> ConformanceResult<String> {
        Ok(format!("{}-", self.new_id(base)?))
    }

    /// Random `[a-z0-9]` text
    pub fn random_text(&mut self, len: usize) -> String {
        self.source.next_suffix(len)
    }

    /// Minimal valid payload for `kind` with `overrides` applied last.
    ///
    /// A `null` override removes the key, which is how callers build
    /// payloads missing a required field.
    pub fn new_resource_payload(
        &mut self,
        kind: ResourceKind,
        overrides: Map<String, Value>,
    ) -> ConformanceResult<Value> {
        let mut payload = Map::new();
        match kind {
            ResourceKind::Pipeline => {
                payload.insert("id".into(), Value::String(self.labeled_id("pipe")?));
                let description = self.random_text(self.defaults.description_len);
                payload.insert("description".into(), Value::String(description));
                payload.insert("recipe".into(), self.defaults.pipeline_recipe.clone());
            }
            ResourceKind::Connection => {
                payload.insert("id".into(), Value::String(self.labeled_id("conn")?));
                payload.insert(
                    "integrationId".into(),
                    Value::String(self.defaults.connection_integration.clone()),
                );
                payload.insert(
                    "method".into(),
                    Value::String(self.defaults.connection_method.clone()),
                );
                payload.insert("setup".into(), self.defaults.connection_setup.clone());
            }
            ResourceKind::Integration => {
                return Err(ConformanceError::fixture(
                    "integrations are read-only catalog entries",
                ))
            }
        }

        for (key, value) in overrides {
            if value.is_null() {
                payload.remove(&key);
            } else {
                payload.insert(key, value);
            }
        }
        Ok(Value::Object(payload))
    }

    /// Inputs for the trigger action
    pub fn trigger_args(&self) -> Value {
        json!({ "inputs": self.defaults.trigger_inputs })
    }
}
