//! Request builders and response parsers for the patient service.
//!
//! Builders return plain `ApiRequest` values so callers can time exactly the
//! `Transport::send` call; parsing happens outside the timed window.

#![allow(missing_docs)]

use std::time::Duration;

use serde_json::{Value, json};

use crate::core::config::{Credentials, EndpointsConfig};
use crate::target::transport::{ApiRequest, ApiResponse, CallError, CallErrorKind};

/// Endpoint map for the patient service.
#[derive(Debug, Clone)]
pub struct PatientApi {
    endpoints: EndpointsConfig,
}

impl PatientApi {
    #[must_use]
    pub fn new(endpoints: EndpointsConfig) -> Self {
        Self { endpoints }
    }

    #[must_use]
    pub fn login(&self, credentials: &Credentials, timeout: Duration) -> ApiRequest {
        ApiRequest::post_json(
            &self.endpoints.login,
            json!({
                "username": credentials.username,
                "password": credentials.password,
            }),
            timeout,
        )
    }

    #[must_use]
    pub fn list_patients(&self, token: Option<&str>, timeout: Duration) -> ApiRequest {
        ApiRequest::get(&self.endpoints.patients, timeout).with_bearer(token)
    }

    #[must_use]
    pub fn patient_detail(&self, token: Option<&str>, id: &str, timeout: Duration) -> ApiRequest {
        let path = self.endpoints.patient_detail.replace("{id}", id);
        ApiRequest::get(path, timeout).with_bearer(token)
    }

    #[must_use]
    pub fn search_patients(&self, token: Option<&str>, term: &str, timeout: Duration) -> ApiRequest {
        ApiRequest::get(&self.endpoints.patient_search, timeout)
            .with_bearer(token)
            .with_query("q", term)
    }

    #[must_use]
    pub fn health(&self, timeout: Duration) -> ApiRequest {
        ApiRequest::get(&self.endpoints.health, timeout)
    }

    /// Untimed warmup requests, one per configured warmup endpoint.
    #[must_use]
    pub fn warmup(&self, token: Option<&str>, timeout: Duration) -> Vec<ApiRequest> {
        self.endpoints
            .warmup
            .iter()
            .map(|path| ApiRequest::get(path, timeout).with_bearer(token))
            .collect()
    }
}

/// Pull the `access` token out of a login response.
pub fn extract_token(response: &ApiResponse) -> Result<String, CallError> {
    let body = response.json()?;
    body.get("access")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CallError::new(CallErrorKind::Decode, "login response has no access token"))
}

/// Collect up to `limit` patient ids from a list response's `results[].id`.
///
/// Numeric and string ids are both accepted; entries without an id are skipped.
pub fn extract_patient_ids(response: &ApiResponse, limit: usize) -> Result<Vec<String>, CallError> {
    let body = response.json()?;
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| CallError::new(CallErrorKind::Decode, "list response has no results array"))?;
    Ok(results
        .iter()
        .filter_map(|patient| match patient.get("id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .take(limit)
        .collect())
}
