//! Channel setup, authentication metadata and status conversion for the
//! gRPC adapter.

use std::time::Duration;

use tonic::metadata::{Ascii, MetadataKey, MetadataValue};
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::debug;

use crate::config::{AuthConfig, ConformanceConfig};
use crate::constants::headers;
use crate::error::ConformanceError;
use crate::transport::{StatusClass, TransportKind};

/// Configuration for the gRPC adapter
#[derive(Debug, Clone)]
pub struct GrpcAdapterConfig {
    /// gRPC endpoint URL (e.g., "http://localhost:8081")
    pub endpoint: String,
    /// Fully-qualified service name, e.g. `vdp.pipeline.v1beta.PipelinePublicService`
    pub service: String,
    /// Inserted between verb and noun for parented resources
    pub parent_qualifier: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub auth: AuthConfig,
    pub tcp_keepalive: Option<Duration>,
    pub http2_keepalive_interval: Option<Duration>,
    pub http2_keepalive_timeout: Option<Duration>,
}

impl Default for GrpcAdapterConfig {
    fn default() -> Self {
        Self::from_config(&ConformanceConfig::default())
    }
}

impl GrpcAdapterConfig {
    pub fn from_config(config: &ConformanceConfig) -> Self {
        Self {
            endpoint: config.grpc.endpoint.clone(),
            service: config.grpc.service.clone(),
            parent_qualifier: config.grpc.parent_qualifier.clone(),
            timeout: Duration::from_millis(config.grpc.timeout_ms),
            connect_timeout: Duration::from_millis(config.grpc.connect_timeout_ms),
            auth: config.auth.clone(),
            tcp_keepalive: Some(Duration::from_secs(30)),
            http2_keepalive_interval: Some(Duration::from_secs(30)),
            http2_keepalive_timeout: Some(Duration::from_secs(10)),
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Build a tonic Channel from this configuration
    pub async fn connect(&self) -> Result<Channel, ConformanceError> {
        let mut endpoint = Endpoint::from_shared(self.endpoint.clone()).map_err(|e| {
            ConformanceError::config_error(format!("Invalid gRPC endpoint '{}': {}", self.endpoint, e))
        })?;

        endpoint = endpoint
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout);

        if let Some(keepalive) = self.tcp_keepalive {
            endpoint = endpoint.tcp_keepalive(Some(keepalive));
        }
        if let Some(interval) = self.http2_keepalive_interval {
            endpoint = endpoint.http2_keep_alive_interval(interval);
        }
        if let Some(timeout) = self.http2_keepalive_timeout {
            endpoint = endpoint.keep_alive_timeout(timeout);
        }

        debug!(endpoint = %self.endpoint, "Connecting to gRPC endpoint");

        endpoint.connect().await.map_err(|e| {
            ConformanceError::transport(TransportKind::Grpc.as_str(), format!("Failed to connect: {e}"))
        })
    }
}

/// Adds credentials and the user UID to every outgoing call
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    auth: AuthConfig,
}

impl AuthInterceptor {
    pub fn new(auth: AuthConfig) -> Self {
        Self { auth }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let metadata = request.metadata_mut();

        // Bearer token takes precedence
        if let Some(ref token) = self.auth.bearer_token {
            let value = format!("Bearer {token}")
                .parse::<MetadataValue<_>>()
                .map_err(|e| Status::internal(format!("Invalid bearer token: {e}")))?;
            metadata.insert("authorization", value);
        } else if let Some(ref api_key) = self.auth.api_key {
            let header_name = self
                .auth
                .api_key_header
                .as_deref()
                .unwrap_or(headers::DEFAULT_API_KEY)
                .to_lowercase();

            let value = api_key
                .parse::<MetadataValue<_>>()
                .map_err(|e| Status::internal(format!("Invalid API key: {e}")))?;

            // gRPC metadata keys must be lowercase ASCII
            let key: MetadataKey<Ascii> = header_name
                .parse()
                .map_err(|e| Status::internal(format!("Invalid header name: {e}")))?;
            metadata.insert(key, value);
        }

        if let Some(ref uid) = self.auth.user_uid {
            let value = uid
                .parse::<MetadataValue<_>>()
                .map_err(|e| Status::internal(format!("Invalid user UID: {e}")))?;
            metadata.insert(headers::USER_UID, value);
        }

        Ok(request)
    }
}

/// Statuses that mean the call never completed become transport errors;
/// anything else the service answered with is an unexpected status.
impl From<Status> for ConformanceError {
    fn from(status: Status) -> Self {
        match status.code() {
            tonic::Code::DeadlineExceeded => ConformanceError::Timeout {
                operation: status.message().to_string(),
            },
            tonic::Code::Unavailable | tonic::Code::Cancelled => ConformanceError::transport(
                TransportKind::Grpc.as_str(),
                format!("{:?}: {}", status.code(), status.message()),
            ),
            code => ConformanceError::unexpected_status(
                status.message(),
                StatusClass::from_grpc(code as i32).unwrap_or(StatusClass::Unclassified),
            ),
        }
    }
}
