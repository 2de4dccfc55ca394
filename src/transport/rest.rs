//! # REST Adapter
//!
//! JSON-over-HTTP rendition of [`ProtocolAdapter`]. Paths follow
//! `{api_prefix}/{parent}/{collection}/{id}`, updates use `PATCH` and custom
//! actions are `POST .../{id}/{action}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, info};

use super::{Envelope, ProtocolAdapter, ResponseBody, StatusClass, TransportKind};
use crate::config::{AuthConfig, ConformanceConfig};
use crate::constants::headers;
use crate::error::{ConformanceError, ConformanceResult};
use crate::models::{CollectionScope, ListQuery, Page, Resource, ResourceKind, ResourceRef, View};

/// Configuration for the REST adapter
#[derive(Debug, Clone)]
pub struct RestAdapterConfig {
    /// Base URL of the API (e.g., "<http://localhost:8080>")
    pub base_url: String,
    /// Version prefix, e.g. `/v1beta`
    pub api_prefix: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    pub auth: AuthConfig,
}

impl RestAdapterConfig {
    pub fn from_config(config: &ConformanceConfig) -> Self {
        Self {
            base_url: config.rest.base_url.clone(),
            api_prefix: config.rest.api_prefix.clone(),
            timeout_ms: config.rest.timeout_ms,
            auth: config.auth.clone(),
        }
    }
}

/// What a successful response is expected to carry
#[derive(Debug, Clone, Copy)]
enum BodyShape {
    Resource(ResourceKind),
    Page(ResourceKind),
    Value,
    Empty,
}

/// REST implementation of the adapter capability set
#[derive(Debug, Clone)]
pub struct RestAdapter {
    client: Client,
    config: RestAdapterConfig,
}

impl RestAdapter {
    pub fn new(config: RestAdapterConfig) -> ConformanceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(auth_headers(&config.auth)?)
            .build()
            .map_err(|e| ConformanceError::config_error(format!("Failed to create HTTP client: {e}")))?;

        info!(
            base_url = %config.base_url,
            api_prefix = %config.api_prefix,
            auth = config.auth.is_configured(),
            "REST adapter created"
        );

        Ok(Self { client, config })
    }

    fn collection_url(&self, scope: &CollectionScope) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_prefix.trim_matches('/'),
            scope.collection_name()
        )
    }

    fn resource_url(&self, target: &ResourceRef) -> String {
        format!("{}/{}", self.collection_url(&target.scope), target.id)
    }

    async fn execute(&self, request: RequestBuilder, shape: BodyShape) -> ConformanceResult<Envelope> {
        let started = Instant::now();
        let response = request.send().await.map_err(classify_send_error)?;
        let latency = started.elapsed();

        let code = response.status().as_u16();
        let status = StatusClass::from_http(code);
        let text = response.text().await?;
        debug!(code, status = %status, latency_ms = latency.as_millis() as u64, "REST response");

        let envelope = Envelope::new(TransportKind::Rest, status, i32::from(code), latency);
        let json: Option<Value> = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        if !status.is_ok() {
            let message = json
                .as_ref()
                .and_then(|body| body.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(text);
            return Ok(envelope.with_error(message));
        }

        let body = match (shape, json) {
            (BodyShape::Empty, _) => return Ok(envelope),
            (BodyShape::Value, json) => ResponseBody::Value(json.unwrap_or(Value::Null)),
            (_, None) => {
                return Err(ConformanceError::invalid_response(
                    "body",
                    format!("status {code} with a missing or non-JSON body"),
                ))
            }
            (BodyShape::Resource(kind), Some(json)) => ResponseBody::Resource(decode_resource(json, kind)?),
            (BodyShape::Page(kind), Some(json)) => ResponseBody::Page(decode_page(json, kind)?),
        };
        Ok(envelope.with_body(body))
    }
}

#[async_trait]
impl ProtocolAdapter for RestAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Rest
    }

    fn endpoint(&self) -> &str {
        &self.config.base_url
    }

    async fn create(&self, scope: &CollectionScope, payload: &Value) -> ConformanceResult<Envelope> {
        let request = self.client.post(self.collection_url(scope)).json(payload);
        self.execute(request, BodyShape::Resource(scope.kind)).await
    }

    async fn get(&self, target: &ResourceRef, view: View) -> ConformanceResult<Envelope> {
        let request = self
            .client
            .get(self.resource_url(target))
            .query(&[("view", view.as_param())]);
        self.execute(request, BodyShape::Resource(target.kind())).await
    }

    async fn list(&self, scope: &CollectionScope, query: &ListQuery) -> ConformanceResult<Envelope> {
        let request = self
            .client
            .get(self.collection_url(scope))
            .query(&list_params(query));
        self.execute(request, BodyShape::Page(scope.kind)).await
    }

    async fn update(&self, target: &ResourceRef, patch: &Value) -> ConformanceResult<Envelope> {
        let request = self.client.patch(self.resource_url(target)).json(patch);
        self.execute(request, BodyShape::Resource(target.kind())).await
    }

    async fn delete(&self, target: &ResourceRef) -> ConformanceResult<Envelope> {
        let request = self.client.delete(self.resource_url(target));
        self.execute(request, BodyShape::Empty).await
    }

    async fn invoke(&self, target: &ResourceRef, action: &str, args: &Value) -> ConformanceResult<Envelope> {
        let url = format!("{}/{action}", self.resource_url(target));
        let request = self.client.post(url).json(args);
        self.execute(request, BodyShape::Value).await
    }
}

// ===================================================================================
// ENCODING AND DECODING
// ===================================================================================

fn auth_headers(auth: &AuthConfig) -> ConformanceResult<HeaderMap> {
    let mut map = HeaderMap::new();

    // Bearer token takes precedence over the API key
    if let Some(token) = &auth.bearer_token {
        map.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
    } else if let Some(api_key) = &auth.api_key {
        let name = auth
            .api_key_header
            .as_deref()
            .unwrap_or(headers::DEFAULT_API_KEY)
            .to_lowercase();
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConformanceError::config_error(format!("Invalid header name '{name}': {e}")))?;
        map.insert(name, header_value(api_key)?);
    }

    if let Some(uid) = &auth.user_uid {
        map.insert(HeaderName::from_static(headers::USER_UID), header_value(uid)?);
    }
    Ok(map)
}

fn header_value(value: &str) -> ConformanceResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ConformanceError::config_error(format!("Invalid header value: {e}")))
}

fn classify_send_error(error: reqwest::Error) -> ConformanceError {
    if error.is_timeout() {
        ConformanceError::Timeout {
            operation: error
                .url()
                .map(|u| u.path().to_string())
                .unwrap_or_else(|| "REST request".to_string()),
        }
    } else if error.is_connect() {
        ConformanceError::transport(TransportKind::Rest.as_str(), error.to_string())
    } else {
        ConformanceError::Http(error)
    }
}

fn list_params(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(page_size) = query.page_size {
        params.push(("pageSize", page_size.to_string()));
    }
    if let Some(token) = &query.page_token {
        params.push(("pageToken", token.clone()));
    }
    if !query.filter.is_empty() {
        params.push(("filter", query.filter.clone()));
    }
    if let Some(view) = query.view {
        params.push(("view", view.as_param().to_string()));
    }
    params
}

/// Unwrap `{"connection": {...}}` into a [`Resource`]
fn decode_resource(mut body: Value, kind: ResourceKind) -> ConformanceResult<Resource> {
    let inner = body
        .get_mut(kind.singular())
        .map(Value::take)
        .ok_or_else(|| ConformanceError::invalid_response(kind.singular(), "missing from response body"))?;
    Resource::from_json(inner)
}

/// Decode `{"connections": [...], "nextPageToken": "...", "totalSize": 13}`.
///
/// Proto3 JSON omits default values, so a missing list is empty, a missing
/// token is the last page and a missing size is zero. 64-bit sizes may be
/// rendered as strings.
pub(crate) fn decode_page(mut body: Value, kind: ResourceKind) -> ConformanceResult<Page> {
    let items = match body.get_mut(kind.plural()).map(Value::take) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(Resource::from_json)
            .collect::<ConformanceResult<Vec<_>>>()?,
        Some(other) => {
            return Err(ConformanceError::invalid_response(
                kind.plural(),
                format!("expected an array, got {other}"),
            ))
        }
    };

    let next_page_token = body
        .get("nextPageToken")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let total_size = match body.get("totalSize") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| ConformanceError::invalid_response("totalSize", format!("not a count: {n}")))?,
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| ConformanceError::invalid_response("totalSize", format!("not a count: {s}")))?,
        Some(other) => {
            return Err(ConformanceError::invalid_response(
                "totalSize",
                format!("unexpected value {other}"),
            ))
        }
    };

    Ok(Page {
        items,
        next_page_token,
        total_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn adapter(base_url: &str) -> RestAdapter {
        RestAdapter::new(RestAdapterConfig {
            base_url: base_url.to_string(),
            api_prefix: "/v1beta".to_string(),
            timeout_ms: 5000,
            auth: AuthConfig::default(),
        })
        .unwrap()
    }

    /// Serve one canned HTTP response and return the raw request it answered
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            let header_end = loop {
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break request.len();
                }
                request.extend_from_slice(&buf[..n]);
            };
            let head = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
            let content_length: usize = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            while request.len() < header_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (base_url, handle)
    }

    #[test]
    fn test_urls_follow_collection_layout() {
        let adapter = adapter("http://localhost:8080/");
        let scope = CollectionScope::new(ResourceKind::Connection, "namespaces/admin");
        assert_eq!(
            adapter.resource_url(&scope.resource("my-conn")),
            "http://localhost:8080/v1beta/namespaces/admin/connections/my-conn"
        );
        assert_eq!(
            adapter.collection_url(&CollectionScope::global(ResourceKind::Integration)),
            "http://localhost:8080/v1beta/integrations"
        );
    }

    #[test]
    fn test_list_params_skip_unset_fields() {
        let query = ListQuery::new()
            .with_page_size(2)
            .with_filter("qIntegration=\"que\"");
        let params = list_params(&query);
        assert_eq!(
            params,
            vec![
                ("pageSize", "2".to_string()),
                ("filter", "qIntegration=\"que\"".to_string())
            ]
        );
    }

    #[test]
    fn test_decode_page_defaults_omitted_fields() {
        let page = decode_page(json!({}), ResourceKind::Connection).unwrap();
        assert!(page.items.is_empty());
        assert!(page.is_last());
        assert_eq!(page.total_size, 0);

        let page = decode_page(
            json!({
                "connections": [{"id": "a"}, {"id": "b"}],
                "nextPageToken": "tok",
                "totalSize": "13"
            }),
            ResourceKind::Connection,
        )
        .unwrap();
        assert_eq!(page.ids(), vec!["a", "b"]);
        assert_eq!(page.next_page_token, "tok");
        assert_eq!(page.total_size, 13);
    }

    #[test]
    fn test_decode_resource_requires_wrapper_key() {
        let error = decode_resource(json!({"pipeline": {"id": "p"}}), ResourceKind::Connection).unwrap_err();
        assert!(matches!(error, ConformanceError::InvalidResponse { .. }));
    }

    #[test]
    fn test_auth_headers_include_user_uid() {
        let auth = AuthConfig {
            api_key: Some("secret".to_string()),
            api_key_header: Some("X-Custom-Key".to_string()),
            user_uid: Some("admin-uid".to_string()),
            ..Default::default()
        };
        let headers = auth_headers(&auth).unwrap();
        assert_eq!(headers.get("x-custom-key").unwrap(), "secret");
        assert_eq!(headers.get("jwt-sub").unwrap(), "admin-uid");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_error_status_keeps_service_message() {
        let (base_url, server) = serve_once(
            "404 Not Found",
            r#"{"code":5,"message":"Integration does not exist."}"#,
        )
        .await;

        let envelope = adapter(&base_url)
            .get(
                &CollectionScope::global(ResourceKind::Integration).resource("restapio"),
                View::Basic,
            )
            .await
            .unwrap();

        assert_eq!(envelope.status, StatusClass::NotFound);
        assert_eq!(envelope.raw_code, 404);
        assert_eq!(envelope.error.as_deref(), Some("Integration does not exist."));
        assert!(envelope.body.is_none());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /v1beta/integrations/restapio?view=VIEW_BASIC"));
    }

    #[tokio::test]
    async fn test_created_resource_is_decoded() {
        let (base_url, server) = serve_once(
            "201 Created",
            r#"{"connection":{"id":"c1","uid":"u-1","createTime":"2024-05-01T10:00:00Z","integrationId":"email"}}"#,
        )
        .await;

        let scope = CollectionScope::new(ResourceKind::Connection, "namespaces/admin");
        let envelope = adapter(&base_url)
            .create(&scope, &json!({"id": "c1"}))
            .await
            .unwrap();

        assert!(envelope.is_ok());
        let resource = envelope.resource().unwrap();
        assert_eq!(resource.uid.as_deref(), Some("u-1"));
        assert_eq!(resource.field("integrationId"), Some(json!("email")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let scope = CollectionScope::new(ResourceKind::Pipeline, "namespaces/admin");
        let error = adapter(&base_url)
            .list(&scope, &ListQuery::new())
            .await
            .unwrap_err();
        assert!(error.is_transport());
    }
}
