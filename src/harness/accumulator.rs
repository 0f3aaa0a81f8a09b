//! Results accumulator shared by all workers of one scenario.
//!
//! Every append and counter update happens under one `parking_lot::Mutex`, so
//! a worker's call outcomes for one invocation land together.

#![allow(missing_docs)]

use parking_lot::Mutex;

use crate::harness::scenario::{CallOutcome, ComponentSpec};
use crate::target::transport::CallError;

/// Samples and counters for one named component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSamples {
    pub key: &'static str,
    pub label: String,
    /// Successful call latencies in milliseconds, in completion order.
    pub samples: Vec<f64>,
    pub attempted: u64,
    pub errors: u64,
}

impl ComponentSamples {
    fn new(spec: &ComponentSpec) -> Self {
        Self {
            key: spec.key,
            label: spec.label.clone(),
            samples: Vec::new(),
            attempted: 0,
            errors: 0,
        }
    }
}

/// What the runner should do after an invocation was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordStatus {
    /// Invocations recorded so far, this one included.
    pub completed: u64,
    /// Failed calls so far, across all components.
    pub errors: u64,
    /// The target looks unreachable: stop dispatching.
    pub unreachable: bool,
}

#[derive(Debug)]
struct Inner {
    components: Vec<ComponentSamples>,
    completed: u64,
    errors: u64,
    consecutive_connection_failures: usize,
    any_success: bool,
    unreachable: bool,
    last_connection_error: Option<String>,
}

/// Thread-safe results accumulator.
#[derive(Debug)]
pub struct ResultsAccumulator {
    inner: Mutex<Inner>,
    unreachable_abort_after: usize,
}

impl ResultsAccumulator {
    /// `unreachable_abort_after` consecutive connection failures before any
    /// success mark the target unreachable. Zero disables the check.
    pub fn new(components: &[ComponentSpec], unreachable_abort_after: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                components: components.iter().map(ComponentSamples::new).collect(),
                completed: 0,
                errors: 0,
                consecutive_connection_failures: 0,
                any_success: false,
                unreachable: false,
                last_connection_error: None,
            }),
            unreachable_abort_after,
        }
    }

    /// Record every call outcome of one invocation.
    pub fn record(&self, outcomes: &[CallOutcome]) -> RecordStatus {
        let mut inner = self.inner.lock();
        for outcome in outcomes {
            let index = match inner.components.iter().position(|c| c.key == outcome.component) {
                Some(index) => index,
                None => {
                    inner.components.push(ComponentSamples {
                        key: outcome.component,
                        label: outcome.component.to_string(),
                        samples: Vec::new(),
                        attempted: 0,
                        errors: 0,
                    });
                    inner.components.len() - 1
                }
            };
            inner.components[index].attempted += 1;
            match &outcome.result {
                Ok(ms) => {
                    inner.components[index].samples.push(*ms);
                    inner.any_success = true;
                    inner.consecutive_connection_failures = 0;
                }
                Err(error) => {
                    inner.components[index].errors += 1;
                    inner.errors += 1;
                    track_connection_failure(&mut inner, error, self.unreachable_abort_after);
                }
            }
        }
        inner.completed += 1;
        RecordStatus {
            completed: inner.completed,
            errors: inner.errors,
            unreachable: inner.unreachable,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.inner.lock().unreachable
    }

    /// Detail of the connection failure that tripped the unreachable check.
    pub fn last_connection_error(&self) -> Option<String> {
        self.inner.lock().last_connection_error.clone()
    }

    /// Invocations recorded so far.
    pub fn completed(&self) -> u64 {
        self.inner.lock().completed
    }

    /// Consume the accumulator once every worker has joined.
    pub fn into_components(self) -> Vec<ComponentSamples> {
        self.inner.into_inner().components
    }
}

fn track_connection_failure(inner: &mut Inner, error: &CallError, abort_after: usize) {
    if !error.is_connection() {
        inner.consecutive_connection_failures = 0;
        return;
    }
    inner.consecutive_connection_failures += 1;
    inner.last_connection_error = Some(error.detail.clone());
    if abort_after > 0
        && !inner.any_success
        && inner.consecutive_connection_failures >= abort_after
    {
        inner.unreachable = true;
    }
}
