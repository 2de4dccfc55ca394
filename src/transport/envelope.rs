//! Normalized response envelope returned by every adapter call.

use std::time::Duration;

use serde_json::Value;

use super::{StatusClass, TransportKind};
use crate::models::{Page, Resource};

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Resource(Resource),
    Page(Page),
    /// Raw payload of actions such as `trigger`
    Value(Value),
}

/// `{status, rawCode, body, error, latency}` of one call, identical in shape
/// for every transport
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub transport: TransportKind,
    pub status: StatusClass,
    /// HTTP status or gRPC code as received
    pub raw_code: i32,
    pub body: Option<ResponseBody>,
    pub error: Option<String>,
    pub latency: Duration,
}

impl Envelope {
    pub fn new(transport: TransportKind, status: StatusClass, raw_code: i32, latency: Duration) -> Self {
        Self {
            transport,
            status,
            raw_code,
            body: None,
            error: None,
            latency,
        }
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn resource(&self) -> Option<&Resource> {
        match &self.body {
            Some(ResponseBody::Resource(resource)) => Some(resource),
            _ => None,
        }
    }

    pub fn page(&self) -> Option<&Page> {
        match &self.body {
            Some(ResponseBody::Page(page)) => Some(page),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.body {
            Some(ResponseBody::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn into_page(self) -> Option<Page> {
        match self.body {
            Some(ResponseBody::Page(page)) => Some(page),
            _ => None,
        }
    }

    /// `NOT_FOUND (404)` style label for assertion records
    pub fn describe(&self) -> String {
        match &self.error {
            Some(message) => format!("{} ({}): {message}", self.status, self.raw_code),
            None => format!("{} ({})", self.status, self.raw_code),
        }
    }
}
