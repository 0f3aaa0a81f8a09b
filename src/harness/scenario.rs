//! Scenario definitions and the built-in probes for the patient service.
//!
//! A probe performs one invocation: one or more timed calls, each attributed to
//! a named component. Composite probes (login + query) report several
//! components per invocation; flat probes report exactly one.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::Credentials;
use crate::target::api::{PatientApi, extract_token};
use crate::target::transport::{ApiRequest, ApiResponse, CallError, CallErrorKind, Transport};

/// A named component measured by a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    /// Report key, e.g. `jwt_validation`.
    pub key: &'static str,
    /// Human label stored as the summary's `test_name`.
    pub label: String,
}

impl ComponentSpec {
    #[must_use]
    pub fn new(key: &'static str, label: impl Into<String>) -> Self {
        Self {
            key,
            label: label.into(),
        }
    }
}

/// Outcome of one timed call: latency in ms, or why it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub component: &'static str,
    pub result: Result<f64, CallError>,
}

/// Context for a single invocation.
pub struct Invocation<'a> {
    /// Zero-based invocation index; probes rotate inputs with it.
    pub index: usize,
    pub transport: &'a dyn Transport,
    pub timeout: Duration,
}

/// One kind of repeatable measurement.
pub trait Probe: Send + Sync {
    /// Components in report order. Exactly one for flat scenarios.
    fn components(&self) -> Vec<ComponentSpec>;

    fn invoke(&self, invocation: &Invocation<'_>) -> Vec<CallOutcome>;
}

/// A named scenario: what to run, how often, how wide.
#[derive(Clone)]
pub struct ScenarioConfig {
    /// Report key, e.g. `patient_list_latency`.
    pub name: String,
    pub probe: Arc<dyn Probe>,
    pub repetitions: usize,
    pub concurrency: usize,
    pub call_timeout: Duration,
}

impl ScenarioConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, probe: Arc<dyn Probe>, repetitions: usize) -> Self {
        Self {
            name: name.into(),
            probe,
            repetitions,
            concurrency: 1,
            call_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ScenarioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioConfig")
            .field("name", &self.name)
            .field("repetitions", &self.repetitions)
            .field("concurrency", &self.concurrency)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

// ──────────────────── timing ────────────────────

/// A call bracketed by dispatch and full-response instants.
pub struct TimedCall {
    pub started: Instant,
    pub finished: Instant,
    pub result: Result<ApiResponse, CallError>,
}

impl TimedCall {
    pub fn elapsed_ms(&self) -> f64 {
        millis_between(self.started, self.finished)
    }
}

/// Send `request` and time it. Non-200 responses become `CallError`s.
pub fn timed_call(transport: &dyn Transport, request: &ApiRequest) -> TimedCall {
    let started = Instant::now();
    let result = transport.send(request);
    let finished = Instant::now();
    TimedCall {
        started,
        finished,
        result: result.and_then(ApiResponse::ensure_ok),
    }
}

pub fn millis_between(start: Instant, end: Instant) -> f64 {
    end.saturating_duration_since(start).as_secs_f64() * 1000.0
}

fn outcome(component: &'static str, call: &TimedCall) -> CallOutcome {
    CallOutcome {
        component,
        result: call
            .result
            .as_ref()
            .map(|_| call.elapsed_ms())
            .map_err(Clone::clone),
    }
}

// ──────────────────── built-in probes ────────────────────

/// Login, then validate the fresh token with a list request.
pub struct LoginProbe {
    pub api: PatientApi,
    pub credentials: Credentials,
}

impl Probe for LoginProbe {
    fn components(&self) -> Vec<ComponentSpec> {
        vec![
            ComponentSpec::new("authentication", "Authentication"),
            ComponentSpec::new("jwt_validation", "JWT Validation"),
        ]
    }

    fn invoke(&self, invocation: &Invocation<'_>) -> Vec<CallOutcome> {
        let login = timed_call(
            invocation.transport,
            &self.api.login(&self.credentials, invocation.timeout),
        );
        let token = match &login.result {
            Ok(response) => match extract_token(response) {
                Ok(token) => token,
                Err(error) => {
                    return vec![CallOutcome {
                        component: "authentication",
                        result: Err(error),
                    }];
                }
            },
            Err(_) => return vec![outcome("authentication", &login)],
        };
        let validation = timed_call(
            invocation.transport,
            &self.api.list_patients(Some(&token), invocation.timeout),
        );
        vec![
            outcome("authentication", &login),
            outcome("jwt_validation", &validation),
        ]
    }
}

/// Patient list with the session token.
pub struct ListProbe {
    pub api: PatientApi,
    pub token: Option<String>,
    pub key: &'static str,
    pub label: String,
}

impl ListProbe {
    #[must_use]
    pub fn new(api: PatientApi, token: Option<String>) -> Self {
        Self {
            api,
            token,
            key: "patient_list",
            label: "Patient List".to_string(),
        }
    }

    /// Same request under a different component name (load levels).
    #[must_use]
    pub fn labeled(mut self, key: &'static str, label: impl Into<String>) -> Self {
        self.key = key;
        self.label = label.into();
        self
    }
}

impl Probe for ListProbe {
    fn components(&self) -> Vec<ComponentSpec> {
        vec![ComponentSpec::new(self.key, self.label.clone())]
    }

    fn invoke(&self, invocation: &Invocation<'_>) -> Vec<CallOutcome> {
        let call = timed_call(
            invocation.transport,
            &self.api.list_patients(self.token.as_deref(), invocation.timeout),
        );
        vec![outcome(self.key, &call)]
    }
}

/// Patient detail, rotating through discovered ids.
pub struct DetailProbe {
    pub api: PatientApi,
    pub token: Option<String>,
    /// Non-empty; discovery failure is handled before the probe is built.
    pub ids: Vec<String>,
}

impl Probe for DetailProbe {
    fn components(&self) -> Vec<ComponentSpec> {
        vec![ComponentSpec::new("patient_detail", "Patient Detail")]
    }

    fn invoke(&self, invocation: &Invocation<'_>) -> Vec<CallOutcome> {
        let Some(id) = rotate(&self.ids, invocation.index) else {
            return vec![CallOutcome {
                component: "patient_detail",
                result: Err(CallError::new(CallErrorKind::Decode, "no patient ids to query")),
            }];
        };
        let call = timed_call(
            invocation.transport,
            &self
                .api
                .patient_detail(self.token.as_deref(), id, invocation.timeout),
        );
        vec![outcome("patient_detail", &call)]
    }
}

/// Patient search, rotating through the configured terms.
pub struct SearchProbe {
    pub api: PatientApi,
    pub token: Option<String>,
    pub terms: Vec<String>,
}

impl Probe for SearchProbe {
    fn components(&self) -> Vec<ComponentSpec> {
        vec![ComponentSpec::new("patient_search", "Patient Search")]
    }

    fn invoke(&self, invocation: &Invocation<'_>) -> Vec<CallOutcome> {
        let term = rotate(&self.terms, invocation.index).map_or("", String::as_str);
        let call = timed_call(
            invocation.transport,
            &self
                .api
                .search_patients(self.token.as_deref(), term, invocation.timeout),
        );
        vec![outcome("patient_search", &call)]
    }
}

/// Fresh login followed by a list query; the whole chain is also timed.
pub struct EndToEndProbe {
    pub api: PatientApi,
    pub credentials: Credentials,
}

impl Probe for EndToEndProbe {
    fn components(&self) -> Vec<ComponentSpec> {
        vec![
            ComponentSpec::new("end_to_end", "End-to-End"),
            ComponentSpec::new("auth_component", "Auth Component"),
            ComponentSpec::new("query_component", "Query Component"),
        ]
    }

    fn invoke(&self, invocation: &Invocation<'_>) -> Vec<CallOutcome> {
        let login = timed_call(
            invocation.transport,
            &self.api.login(&self.credentials, invocation.timeout),
        );
        let token = match login.result.as_ref().map_err(Clone::clone).and_then(extract_token) {
            Ok(token) => token,
            Err(error) => {
                return vec![
                    CallOutcome {
                        component: "auth_component",
                        result: Err(error.clone()),
                    },
                    CallOutcome {
                        component: "end_to_end",
                        result: Err(error),
                    },
                ];
            }
        };
        let query = timed_call(
            invocation.transport,
            &self.api.list_patients(Some(&token), invocation.timeout),
        );
        let end_to_end = CallOutcome {
            component: "end_to_end",
            result: query
                .result
                .as_ref()
                .map(|_| millis_between(login.started, query.finished))
                .map_err(Clone::clone),
        };
        vec![
            end_to_end,
            outcome("auth_component", &login),
            outcome("query_component", &query),
        ]
    }
}

fn rotate<T>(items: &[T], index: usize) -> Option<&T> {
    if items.is_empty() {
        None
    } else {
        items.get(index % items.len())
    }
}
