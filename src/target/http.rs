//! `ureq`-backed transport.

#![allow(missing_docs)]

use std::io;
use std::time::Duration;

use crate::target::transport::{ApiRequest, ApiResponse, CallError, CallErrorKind, Method, Transport};

/// Blocking HTTP(S) client bound to one base URL.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpTransport {
    /// Build an agent whose connect/read/write timeouts default to `timeout`.
    /// Each request additionally carries its own overall timeout.
    #[must_use]
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Self {
        let timeout = timeout.max(Duration::from_millis(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(user_agent)
            .try_proxy_from_env(false)
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CallError> {
        let url = self.url_for(&request.path);
        let mut req = match request.method {
            Method::Get => self.agent.get(&url),
            Method::Post => self.agent.post(&url),
        }
        .timeout(request.timeout)
        .set("Accept", "application/json");
        for (key, value) in &request.query {
            req = req.query(key, value);
        }
        if let Some(token) = request.bearer.as_deref() {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }

        let outcome = match &request.body {
            Some(body) => req.send_json(body.clone()),
            None => req.call(),
        };

        match outcome {
            Ok(response) => {
                let status = response.status();
                let body = response.into_string().map_err(|e| call_error_from_io(&e))?;
                Ok(ApiResponse { status, body })
            }
            Err(ureq::Error::Status(status, response)) => {
                // Drain so the connection can be pooled.
                let _ = response.into_string();
                Err(CallError::status(status))
            }
            Err(ureq::Error::Transport(transport)) => Err(call_error_from_transport(&transport)),
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

fn call_error_from_transport(transport: &ureq::Transport) -> CallError {
    let combined = format!("{:?} {}", transport.kind(), transport);
    CallError::new(classify_transport_error(&combined), transport.to_string())
}

fn call_error_from_io(error: &io::Error) -> CallError {
    let kind = match error.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CallErrorKind::Timeout,
        _ => CallErrorKind::Connection,
    };
    CallError::new(kind, error.to_string())
}

fn classify_transport_error(raw: &str) -> CallErrorKind {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") || lower.contains("wouldblock") {
        CallErrorKind::Timeout
    } else {
        CallErrorKind::Connection
    }
}
