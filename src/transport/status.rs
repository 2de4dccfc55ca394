//! Shared status taxonomy and its mapping from HTTP and gRPC codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol-independent outcome class of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusClass {
    Ok,
    NotFound,
    InvalidArgument,
    AlreadyExists,
    Internal,
    /// 401/403 or UNAUTHENTICATED/PERMISSION_DENIED
    Unauthorized,
    /// Any code outside the taxonomy; the envelope keeps the raw code
    Unclassified,
}

impl StatusClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Internal => "INTERNAL",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Unclassified => "UNCLASSIFIED",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn from_http(code: u16) -> Self {
        match code {
            200 | 201 | 204 => Self::Ok,
            400 => Self::InvalidArgument,
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            500..=599 => Self::Internal,
            _ => Self::Unclassified,
        }
    }

    /// Map a numeric gRPC status code.
    ///
    /// Returns `None` for codes that mean the call never completed
    /// (CANCELLED, DEADLINE_EXCEEDED, UNAVAILABLE); those are transport errors.
    pub fn from_grpc(code: i32) -> Option<Self> {
        let class = match code {
            0 => Self::Ok,
            // CANCELLED, DEADLINE_EXCEEDED, UNAVAILABLE
            1 | 4 | 14 => return None,
            // INVALID_ARGUMENT, FAILED_PRECONDITION, OUT_OF_RANGE
            3 | 9 | 11 => Self::InvalidArgument,
            5 => Self::NotFound,
            // ALREADY_EXISTS, ABORTED
            6 | 10 => Self::AlreadyExists,
            // PERMISSION_DENIED, UNAUTHENTICATED
            7 | 16 => Self::Unauthorized,
            // UNKNOWN, UNIMPLEMENTED, INTERNAL, DATA_LOSS
            2 | 12 | 13 | 15 => Self::Internal,
            _ => Self::Unclassified,
        };
        Some(class)
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatusClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Self::Ok),
            "NOT_FOUND" => Ok(Self::NotFound),
            "INVALID_ARGUMENT" => Ok(Self::InvalidArgument),
            "ALREADY_EXISTS" => Ok(Self::AlreadyExists),
            "INTERNAL" => Ok(Self::Internal),
            "UNAUTHORIZED" => Ok(Self::Unauthorized),
            "UNCLASSIFIED" => Ok(Self::Unclassified),
            _ => Err(format!("Invalid status class: {s}")),
        }
    }
}
