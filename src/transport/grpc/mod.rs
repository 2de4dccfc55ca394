//! # gRPC Adapter
//!
//! Feature-gated (`grpc`) rendition of [`ProtocolAdapter`]. Calls are unary
//! and dispatched generically over `tonic::client::Grpc`, with method paths
//! `/{service}/{Verb}{Qualifier}{Noun}`:
//!
//! | operation | example method                 |
//! |-----------|--------------------------------|
//! | create    | `CreateNamespaceConnection`    |
//! | list      | `ListNamespaceConnections`     |
//! | invoke    | `TriggerNamespacePipeline`     |
//! | get       | `GetIntegration` (no parent)   |

use std::time::Instant;

use async_trait::async_trait;
use prost_types::{FieldMask, Struct};
use serde_json::{json, Value};
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tonic::{Request, Status};
use tracing::{debug, info};

use super::{Envelope, ProtocolAdapter, ResponseBody, StatusClass, TransportKind};
use crate::error::{ConformanceError, ConformanceResult};
use crate::models::{CollectionScope, ListQuery, Page, Resource, ResourceRef, View};

mod common;
pub mod conversions;
pub mod messages;

pub use common::{AuthInterceptor, GrpcAdapterConfig};

use conversions::{json_to_proto_struct, proto_struct_to_json, proto_struct_to_json_opt};
use messages::*;

type AuthedChannel = InterceptedService<Channel, AuthInterceptor>;

/// gRPC implementation of the adapter capability set
#[derive(Debug, Clone)]
pub struct GrpcAdapter {
    grpc: Grpc<AuthedChannel>,
    config: GrpcAdapterConfig,
}

impl GrpcAdapter {
    pub async fn connect(config: GrpcAdapterConfig) -> ConformanceResult<Self> {
        let channel = config.connect().await?;
        let grpc = Grpc::new(InterceptedService::new(
            channel,
            AuthInterceptor::new(config.auth.clone()),
        ));

        info!(
            endpoint = %config.endpoint,
            service = %config.service,
            auth = config.auth.is_configured(),
            "gRPC adapter connected"
        );

        Ok(Self { grpc, config })
    }

    /// Full method path for `verb` on a resource of `scope`
    pub fn method_path(&self, verb: &str, scope: &CollectionScope, plural: bool) -> String {
        method_path(&self.config.service, &self.config.parent_qualifier, verb, scope, plural)
    }

    async fn unary<Req, Resp>(&self, path: String, message: Req) -> ConformanceResult<(Result<Resp, Status>, Instant)>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let started = Instant::now();
        let path: PathAndQuery = path
            .parse()
            .map_err(|e| ConformanceError::config_error(format!("Invalid gRPC method path '{path}': {e}")))?;

        let mut grpc = self.grpc.clone();
        grpc.ready().await.map_err(|e| {
            let e: tonic::codegen::StdError = e.into();
            ConformanceError::transport(TransportKind::Grpc.as_str(), format!("Service was not ready: {e}"))
        })?;

        debug!(method = %path, "gRPC call");
        let result = grpc
            .unary(Request::new(message), path, ProstCodec::default())
            .await
            .map(tonic::Response::into_inner);
        Ok((result, started))
    }

    /// Turn a call result into an envelope, decoding successes with `decode`
    fn envelope<Resp>(
        result: Result<Resp, Status>,
        started: Instant,
        decode: impl FnOnce(Resp) -> ConformanceResult<Option<ResponseBody>>,
    ) -> ConformanceResult<Envelope> {
        let latency = started.elapsed();
        match result {
            Ok(response) => {
                let envelope = Envelope::new(TransportKind::Grpc, StatusClass::Ok, 0, latency);
                Ok(match decode(response)? {
                    Some(body) => envelope.with_body(body),
                    None => envelope,
                })
            }
            Err(status) => match StatusClass::from_grpc(status.code() as i32) {
                // Never completed: surface as a transport error
                None => Err(status.into()),
                Some(class) => Ok(Envelope::new(TransportKind::Grpc, class, status.code() as i32, latency)
                    .with_error(status.message())),
            },
        }
    }
}

fn method_path(service: &str, qualifier: &str, verb: &str, scope: &CollectionScope, plural: bool) -> String {
    let qualifier = if scope.parent.is_some() { qualifier } else { "" };
    let noun = scope.kind.noun();
    let suffix = if plural { "s" } else { "" };
    format!("/{service}/{verb}{qualifier}{noun}{suffix}")
}

fn capitalize(action: &str) -> String {
    let mut chars = action.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn require_struct(field: &str, value: &Value) -> ConformanceResult<Struct> {
    json_to_proto_struct(value)
        .ok_or_else(|| ConformanceError::invalid_response(field, "payload must be a JSON object"))
}

fn decode_resource(field: &str, resource: Option<Struct>) -> ConformanceResult<Option<ResponseBody>> {
    let resource = resource.ok_or_else(|| ConformanceError::invalid_response(field, "missing from response"))?;
    Ok(Some(ResponseBody::Resource(Resource::from_json(proto_struct_to_json(resource))?)))
}

/// `page_size` as the int32 the list RPCs carry
fn wire_page_size(query: &ListQuery) -> ConformanceResult<Option<i32>> {
    query
        .page_size
        .map(|size| {
            i32::try_from(size)
                .map_err(|_| ConformanceError::config_error(format!("Page size {size} exceeds the gRPC int32 range")))
        })
        .transpose()
}

/// `{"inputs": [..]}` becomes the repeated inputs; any other object is a single input
fn invoke_inputs(args: &Value) -> ConformanceResult<Vec<Struct>> {
    match args.get("inputs") {
        Some(Value::Array(inputs)) => inputs.iter().map(|input| require_struct("inputs", input)).collect(),
        _ if args.is_null() => Ok(Vec::new()),
        _ => Ok(vec![require_struct("inputs", args)?]),
    }
}

#[async_trait]
impl ProtocolAdapter for GrpcAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Grpc
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn create(&self, scope: &CollectionScope, payload: &Value) -> ConformanceResult<Envelope> {
        let request = CreateResourceRequest {
            parent: scope.parent.clone().unwrap_or_default(),
            resource: Some(require_struct("resource", payload)?),
        };
        let path = self.method_path("Create", scope, false);
        let (result, started) = self.unary::<_, ResourceResponse>(path, request).await?;
        Self::envelope(result, started, |r| decode_resource(scope.kind.singular(), r.resource))
    }

    async fn get(&self, target: &ResourceRef, view: View) -> ConformanceResult<Envelope> {
        let request = GetResourceRequest {
            name: target.name(),
            view: view.as_proto(),
        };
        let path = self.method_path("Get", &target.scope, false);
        let (result, started) = self.unary::<_, ResourceResponse>(path, request).await?;
        Self::envelope(result, started, |r| decode_resource(target.kind().singular(), r.resource))
    }

    async fn list(&self, scope: &CollectionScope, query: &ListQuery) -> ConformanceResult<Envelope> {
        let request = ListResourcesRequest {
            parent: scope.parent.clone().unwrap_or_default(),
            page_size: wire_page_size(query)?,
            page_token: query.page_token.clone(),
            filter: (!query.filter.is_empty()).then(|| query.filter.clone()),
            view: query.view.map(|view| view.as_proto()),
        };
        let path = self.method_path("List", scope, true);
        let (result, started) = self.unary::<_, ListResourcesResponse>(path, request).await?;
        Self::envelope(result, started, |response| {
            let items = response
                .resources
                .into_iter()
                .map(|resource| Resource::from_json(proto_struct_to_json(resource)))
                .collect::<ConformanceResult<Vec<_>>>()?;
            let total_size = u64::try_from(response.total_size).map_err(|_| {
                ConformanceError::invalid_response("total_size", format!("negative: {}", response.total_size))
            })?;
            Ok(Some(ResponseBody::Page(Page {
                items,
                next_page_token: response.next_page_token,
                total_size,
            })))
        })
    }

    async fn update(&self, target: &ResourceRef, patch: &Value) -> ConformanceResult<Envelope> {
        let mut resource = require_struct("resource", patch)?;
        let paths = resource.fields.keys().cloned().collect();
        resource
            .fields
            .entry("id".to_string())
            .or_insert_with(|| prost_types::Value {
                kind: Some(prost_types::value::Kind::StringValue(target.id.clone())),
            });

        let request = UpdateResourceRequest {
            resource: Some(resource),
            update_mask: Some(FieldMask { paths }),
            name: target.name(),
        };
        let path = self.method_path("Update", &target.scope, false);
        let (result, started) = self.unary::<_, ResourceResponse>(path, request).await?;
        Self::envelope(result, started, |r| decode_resource(target.kind().singular(), r.resource))
    }

    async fn delete(&self, target: &ResourceRef) -> ConformanceResult<Envelope> {
        let request = DeleteResourceRequest { name: target.name() };
        let path = self.method_path("Delete", &target.scope, false);
        let (result, started) = self.unary::<_, DeleteResourceResponse>(path, request).await?;
        Self::envelope(result, started, |_| Ok(None))
    }

    async fn invoke(&self, target: &ResourceRef, action: &str, args: &Value) -> ConformanceResult<Envelope> {
        let request = InvokeResourceRequest {
            name: target.name(),
            inputs: invoke_inputs(args)?,
        };
        let path = self.method_path(&capitalize(action), &target.scope, false);
        let (result, started) = self.unary::<_, InvokeResourceResponse>(path, request).await?;
        Self::envelope(result, started, |response| {
            let outputs: Vec<Value> = response.outputs.into_iter().map(proto_struct_to_json).collect();
            Ok(Some(ResponseBody::Value(json!({
                "outputs": outputs,
                "metadata": proto_struct_to_json_opt(response.metadata),
            }))))
        })
    }
}
