//! # Conformance Configuration
//!
//! Endpoints, credentials and suite behavior for a conformance run.
//! Supports environment variables, config files and programmatic overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{DEFAULT_API_PREFIX, DEFAULT_ID_PREFIX, DEFAULT_NAMESPACE, DEFAULT_PAGE_SIZE};
use crate::error::{ConformanceError, ConformanceResult};
use crate::fixtures::FixtureDefaults;
use crate::models::{ResourceKind, SchemaOverride};
use crate::transport::TransportKind;

/// Top-level configuration of a conformance run
///
/// # Examples
///
/// ```rust
/// use pipeline_conformance::ConformanceConfig;
///
/// let config = ConformanceConfig::default();
/// assert_eq!(config.rest.base_url, "http://localhost:8080");
/// assert_eq!(config.suite.namespace, "namespaces/admin");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformanceConfig {
    pub rest: RestConfig,
    pub grpc: GrpcConfig,
    pub auth: AuthConfig,
    pub suite: SuiteConfig,
    pub fixtures: FixtureDefaults,
    /// Per-kind schema adjustments keyed by kind (`connection`, ...)
    pub schemas: HashMap<ResourceKind, SchemaOverride>,
}

/// REST endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Base URL of the public API (e.g., "<http://localhost:8080>")
    pub base_url: String,
    /// Version prefix prepended to every path
    pub api_prefix: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout_ms: 30000,
        }
    }
}

/// gRPC endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub endpoint: String,
    /// Fully-qualified service name used in method paths
    pub service: String,
    /// Qualifier inserted in method names for parented resources,
    /// e.g. `Namespace` in `CreateNamespaceConnection`
    pub parent_qualifier: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8081".to_string(),
            service: "vdp.pipeline.v1beta.PipelinePublicService".to_string(),
            parent_qualifier: "Namespace".to_string(),
            timeout_ms: 30000,
            connect_timeout_ms: 10000,
        }
    }
}

/// Credentials sent with every request on every transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token for the Authorization header
    pub bearer_token: Option<String>,
    pub api_key: Option<String>,
    /// Header carrying the API key (defaults to "x-api-key")
    pub api_key_header: Option<String>,
    /// Authenticated user UID forwarded in the `jwt-sub` header
    pub user_uid: Option<String>,
}

impl AuthConfig {
    pub fn with_bearer_token(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bearer_token.is_some() || self.api_key.is_some() || self.user_uid.is_some()
    }
}

/// Suite execution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Transports every scenario runs against
    pub transports: Vec<TransportKind>,
    /// Parent of pipelines and connections
    pub namespace: String,
    /// Prefix of every fixture ID
    pub id_prefix: String,
    /// Page size the service applies when none is requested
    pub default_page_size: u32,
    pub scenario_timeout_ms: u64,
    pub max_concurrent_scenarios: usize,
    /// Base seed for fixture suffixes; random when unset
    pub seed: Option<u64>,
    /// Delete fixtures of timed-out scenarios at suite teardown
    pub cleanup_after_timeout: bool,
    /// Names of the scenarios to run; empty runs all
    pub scenarios: Vec<String>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            transports: vec![TransportKind::Rest, TransportKind::Grpc],
            namespace: DEFAULT_NAMESPACE.to_string(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            scenario_timeout_ms: 120_000,
            max_concurrent_scenarios: 4,
            seed: None,
            cleanup_after_timeout: true,
            scenarios: Vec::new(),
        }
    }
}

impl ConformanceConfig {
    /// Load configuration from environment variables and config file
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file (./conformance.toml, ~/.config/pipeline-conformance/config.toml)
    /// 3. Default values
    pub fn load() -> ConformanceResult<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::find_config_file() {
            debug!("Loading config from: {}", config_path.display());
            match Self::load_from_file(&config_path) {
                Ok(file_config) => config = file_config,
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "Ignoring unreadable config file, using defaults");
                }
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        debug!(
            rest = %config.rest.base_url,
            grpc = %config.grpc.endpoint,
            transports = ?config.suite.transports,
            "Loaded conformance configuration"
        );
        Ok(config)
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> ConformanceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConformanceError::config_error(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ConformanceError::config_error(format!("Failed to parse config file: {}", e))
        })
    }

    fn find_config_file() -> Option<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("./conformance.toml"),
            PathBuf::from("./config/conformance.toml"),
        ];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("pipeline-conformance").join("config.toml"));
        }

        candidates.into_iter().find(|path| path.is_file())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `CONFORMANCE_*` overrides from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CONFORMANCE_REST_URL") {
            self.rest.base_url = url;
        }
        if let Some(url) = lookup("CONFORMANCE_GRPC_URL") {
            self.grpc.endpoint = url;
        }
        if let Some(token) = lookup("CONFORMANCE_AUTH_TOKEN") {
            self.auth.bearer_token = Some(token);
        }
        if let Some(key) = lookup("CONFORMANCE_API_KEY") {
            self.auth.api_key = Some(key);
        }
        if let Some(uid) = lookup("CONFORMANCE_USER_UID") {
            self.auth.user_uid = Some(uid);
        }
        if let Some(namespace) = lookup("CONFORMANCE_NAMESPACE") {
            self.suite.namespace = namespace;
        }
        if let Some(seed) = lookup("CONFORMANCE_SEED").and_then(|s| s.parse().ok()) {
            self.suite.seed = Some(seed);
        }
        if let Some(timeout_ms) = lookup("CONFORMANCE_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.suite.scenario_timeout_ms = timeout_ms;
        }
        if let Some(transports) = lookup("CONFORMANCE_TRANSPORTS") {
            let parsed: Vec<TransportKind> = transports
                .split(',')
                .filter(|t| !t.trim().is_empty())
                .filter_map(|t| t.trim().parse().ok())
                .collect();
            if !parsed.is_empty() {
                self.suite.transports = parsed;
            }
        }
    }

    pub fn validate(&self) -> ConformanceResult<()> {
        if self.suite.transports.is_empty() {
            return Err(ConformanceError::config_error("suite.transports must not be empty"));
        }
        if self.suite.max_concurrent_scenarios == 0 {
            return Err(ConformanceError::config_error(
                "suite.max_concurrent_scenarios must be at least 1",
            ));
        }
        if self.suite.default_page_size == 0 {
            return Err(ConformanceError::config_error(
                "suite.default_page_size must be at least 1",
            ));
        }
        if !self.suite.id_prefix.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(ConformanceError::config_error(format!(
                "suite.id_prefix '{}' must start with a lowercase letter",
                self.suite.id_prefix
            )));
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> ConformanceResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConformanceError::config_error(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            ConformanceError::config_error(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content).map_err(|e| {
            ConformanceError::config_error(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Get default config file path
    pub fn default_config_path() -> ConformanceResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConformanceError::config_error("Could not determine config directory"))?;

        Ok(config_dir.join("pipeline-conformance").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ConformanceConfig::default();
        assert_eq!(config.rest.api_prefix, "/v1beta");
        assert_eq!(
            config.suite.transports,
            vec![TransportKind::Rest, TransportKind::Grpc]
        );
        assert_eq!(config.suite.default_page_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("conformance.toml");

        let mut original = ConformanceConfig::default();
        original.suite.seed = Some(7);
        original.auth.user_uid = Some("admin-uid".to_string());
        original.save_to_file(&config_path).unwrap();

        let loaded = ConformanceConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.suite.seed, Some(7));
        assert_eq!(loaded.auth.user_uid.as_deref(), Some("admin-uid"));
        assert_eq!(loaded.fixtures.connection_setup["server-port"], 993);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ConformanceConfig = toml::from_str(
            r#"
            [suite]
            namespace = "namespaces/ci"

            [schemas.connection]
            secret_fields = ["setup.password"]
            "#,
        )
        .unwrap();

        assert_eq!(config.suite.namespace, "namespaces/ci");
        assert_eq!(config.suite.id_prefix, "cfm-");
        assert_eq!(config.rest.base_url, "http://localhost:8080");
        assert_eq!(
            config.schemas[&ResourceKind::Connection].secret_fields,
            Some(vec!["setup.password".to_string()])
        );
    }

    #[test]
    fn test_malformed_file_is_a_config_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("conformance.toml");
        std::fs::write(&path, "[rest\nbase_url = ").unwrap();

        let error = ConformanceConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(error, ConformanceError::Config(ref m) if m.contains("parse")));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = ConformanceConfig::default();
        config.apply_overrides(|key| match key {
            "CONFORMANCE_REST_URL" => Some("http://api.test:9000".to_string()),
            "CONFORMANCE_SEED" => Some("1234".to_string()),
            "CONFORMANCE_TRANSPORTS" => Some("grpc".to_string()),
            "CONFORMANCE_USER_UID" => Some("uid-1".to_string()),
            _ => None,
        });

        assert_eq!(config.rest.base_url, "http://api.test:9000");
        assert_eq!(config.suite.seed, Some(1234));
        assert_eq!(config.suite.transports, vec![TransportKind::Grpc]);
        assert_eq!(config.auth.user_uid.as_deref(), Some("uid-1"));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = ConformanceConfig::default();
        config.suite.max_concurrent_scenarios = 0;
        assert!(matches!(config.validate(), Err(ConformanceError::Config(_))));

        let mut config = ConformanceConfig::default();
        config.suite.id_prefix = "Bad-".to_string();
        assert!(config.validate().is_err());
    }
}
