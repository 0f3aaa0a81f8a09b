//! Transport seam between the harness and the target service.
//!
//! The harness times `Transport::send` from dispatch until the full response
//! body has been read. Implementations must therefore consume the body before
//! returning.

#![allow(missing_docs)]

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::core::errors::AsrhError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One request against the target service. `path` is relative to the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl ApiRequest {
    #[must_use]
    pub fn get(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body: None,
            timeout,
        }
    }

    #[must_use]
    pub fn post_json(path: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body: Some(body),
            timeout,
        }
    }

    #[must_use]
    pub fn with_bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// Fully received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Only HTTP 200 counts as a successful call.
    pub fn ensure_ok(self) -> Result<Self, CallError> {
        if self.status == 200 {
            Ok(self)
        } else {
            Err(CallError::status(self.status))
        }
    }

    pub fn json(&self) -> Result<Value, CallError> {
        serde_json::from_str(&self.body)
            .map_err(|error| CallError::new(CallErrorKind::Decode, error.to_string()))
    }
}

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    /// Target unreachable: DNS, refused, reset.
    Connection,
    /// Exceeded the per-call timeout.
    Timeout,
    /// Non-200 status.
    Status(u16),
    /// Response body was not what the API promises.
    Decode,
}

/// A failed call. Recorded as an error sample, never propagated past the scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub kind: CallErrorKind,
    pub detail: String,
}

impl CallError {
    #[must_use]
    pub fn new(kind: CallErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn status(code: u16) -> Self {
        Self::new(CallErrorKind::Status(code), format!("HTTP {code}"))
    }

    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self.kind, CallErrorKind::Connection)
    }

    /// Lift into the crate error type, naming the target for context.
    #[must_use]
    pub fn into_error(self, target: &str, timeout: Duration) -> AsrhError {
        let target = target.to_string();
        match self.kind {
            CallErrorKind::Connection => AsrhError::Connection {
                target,
                details: self.detail,
            },
            CallErrorKind::Timeout => AsrhError::Timeout {
                target,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            CallErrorKind::Status(status) => AsrhError::HttpStatus { target, status },
            CallErrorKind::Decode => AsrhError::ResponseDecode {
                target,
                details: self.detail,
            },
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CallErrorKind::Connection => write!(f, "connection error: {}", self.detail),
            CallErrorKind::Timeout => write!(f, "timeout: {}", self.detail),
            CallErrorKind::Status(code) => write!(f, "HTTP {code}"),
            CallErrorKind::Decode => write!(f, "decode error: {}", self.detail),
        }
    }
}

/// Executes requests against the target service.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CallError>;

    /// Base URL or other identifier, for logs and errors.
    fn describe(&self) -> String;
}
