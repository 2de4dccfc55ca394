//! # Protocol Adapters
//!
//! One capability set over every transport the service exposes. Scenarios
//! only ever talk to [`ProtocolAdapter`], so the same assertions run against
//! REST and gRPC without modification.
//!
//! ```rust,ignore
//! use pipeline_conformance::{ConformanceConfig, TransportKind, UnifiedAdapter};
//!
//! let config = ConformanceConfig::load()?;
//! let adapter = UnifiedAdapter::from_config(&config, TransportKind::Grpc).await?;
//! let envelope = adapter.get(&connection_ref, View::Full).await?;
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConformanceConfig;
use crate::error::ConformanceResult;
use crate::models::{CollectionScope, ListQuery, ResourceRef, View};

mod envelope;
pub mod rest;
mod status;

#[cfg(feature = "grpc")]
pub mod grpc;

pub use envelope::{Envelope, ResponseBody};
pub use rest::{RestAdapter, RestAdapterConfig};
pub use status::StatusClass;

#[cfg(feature = "grpc")]
pub use grpc::{GrpcAdapter, GrpcAdapterConfig};

/// Wire protocol of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Rest,
    Grpc,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rest => "REST",
            Self::Grpc => "gRPC",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" | "http" => Ok(Self::Rest),
            "grpc" => Ok(Self::Grpc),
            _ => Err(format!("Invalid transport: {s}")),
        }
    }
}

/// Transport-independent operations on the service under test.
///
/// A returned `Err` means the call did not complete (connection refused,
/// timeout, malformed success response). Every status the service actually
/// answered with, error statuses included, comes back as an [`Envelope`].
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn transport(&self) -> TransportKind;

    fn endpoint(&self) -> &str;

    async fn create(&self, scope: &CollectionScope, payload: &Value) -> ConformanceResult<Envelope>;

    async fn get(&self, target: &ResourceRef, view: View) -> ConformanceResult<Envelope>;

    async fn list(&self, scope: &CollectionScope, query: &ListQuery) -> ConformanceResult<Envelope>;

    /// Partial update; the patch carries only the fields being written
    async fn update(&self, target: &ResourceRef, patch: &Value) -> ConformanceResult<Envelope>;

    async fn delete(&self, target: &ResourceRef) -> ConformanceResult<Envelope>;

    /// Custom action such as `trigger`
    async fn invoke(&self, target: &ResourceRef, action: &str, args: &Value) -> ConformanceResult<Envelope>;
}

// ===================================================================================
// UNIFIED ADAPTER
// ===================================================================================

/// Adapter whose transport is chosen by configuration
#[derive(Debug)]
pub enum UnifiedAdapter {
    Rest(Box<RestAdapter>),
    #[cfg(feature = "grpc")]
    Grpc(Box<GrpcAdapter>),
}

impl UnifiedAdapter {
    pub async fn from_config(config: &ConformanceConfig, kind: TransportKind) -> ConformanceResult<Self> {
        match kind {
            TransportKind::Rest => {
                let adapter = RestAdapter::new(RestAdapterConfig::from_config(config))?;
                Ok(UnifiedAdapter::Rest(Box::new(adapter)))
            }
            #[cfg(feature = "grpc")]
            TransportKind::Grpc => {
                let adapter = GrpcAdapter::connect(GrpcAdapterConfig::from_config(config)).await?;
                Ok(UnifiedAdapter::Grpc(Box::new(adapter)))
            }
            #[cfg(not(feature = "grpc"))]
            TransportKind::Grpc => Err(crate::error::ConformanceError::Unsupported(
                "gRPC transport requested but 'grpc' feature is not enabled".to_string(),
            )),
        }
    }

    pub fn as_adapter(&self) -> &dyn ProtocolAdapter {
        match self {
            UnifiedAdapter::Rest(a) => a.as_ref(),
            #[cfg(feature = "grpc")]
            UnifiedAdapter::Grpc(a) => a.as_ref(),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for UnifiedAdapter {
    fn transport(&self) -> TransportKind {
        self.as_adapter().transport()
    }

    fn endpoint(&self) -> &str {
        self.as_adapter().endpoint()
    }

    async fn create(&self, scope: &CollectionScope, payload: &Value) -> ConformanceResult<Envelope> {
        self.as_adapter().create(scope, payload).await
    }

    async fn get(&self, target: &ResourceRef, view: View) -> ConformanceResult<Envelope> {
        self.as_adapter().get(target, view).await
    }

    async fn list(&self, scope: &CollectionScope, query: &ListQuery) -> ConformanceResult<Envelope> {
        self.as_adapter().list(scope, query).await
    }

    async fn update(&self, target: &ResourceRef, patch: &Value) -> ConformanceResult<Envelope> {
        self.as_adapter().update(target, patch).await
    }

    async fn delete(&self, target: &ResourceRef) -> ConformanceResult<Envelope> {
        self.as_adapter().delete(target).await
    }

    async fn invoke(&self, target: &ResourceRef, action: &str, args: &Value) -> ConformanceResult<Envelope> {
        self.as_adapter().invoke(target, action, args).await
    }
}
