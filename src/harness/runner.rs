//! Bounded worker pool that executes one scenario.
//!
//! The dispatcher feeds invocation indices over a bounded crossbeam channel to
//! `min(concurrency, max_workers)` scoped threads. Workers stop picking up jobs
//! once the run is cancelled or the target is deemed unreachable.

#![allow(missing_docs)]
#![allow(clippy::cast_possible_truncation)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;

use crate::harness::accumulator::{ComponentSamples, ResultsAccumulator};
use crate::harness::cancel::CancelToken;
use crate::harness::scenario::{CallOutcome, ComponentSpec, Invocation, ScenarioConfig};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::stats::entry::SummaryEntry;
use crate::target::transport::Transport;

/// Floor for a deadline-capped call timeout.
const MIN_CALL_BUDGET: Duration = Duration::from_millis(10);

/// Shared, run-wide inputs for executing scenarios.
pub struct RunContext<'a> {
    pub transport: &'a dyn Transport,
    pub cancel: &'a CancelToken,
    pub logger: &'a ActivityLoggerHandle,
    pub max_workers: usize,
    /// Consecutive connection failures (before any success) that abort a scenario.
    pub unreachable_abort_after: usize,
    /// Emit a progress event every N completed invocations. Zero disables.
    pub progress_every: usize,
}

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStatus {
    Completed,
    /// Fatal scenario-level error: setup failure or target unreachable.
    Errored(String),
    /// Stopped by the global deadline or the operator.
    Aborted(String),
    /// Never started.
    NotRun(String),
}

/// Summary state of one component after the scenario ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentResult {
    pub key: &'static str,
    pub entry: SummaryEntry,
    pub attempted: u64,
    pub errors: u64,
}

impl ComponentResult {
    /// Successful calls as a percentage of attempted calls; `None` if nothing was attempted.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        if self.attempted == 0 {
            return None;
        }
        let ok = self.attempted.saturating_sub(self.errors);
        Some(ok as f64 / self.attempted as f64 * 100.0)
    }
}

/// Everything a scenario produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub status: ScenarioStatus,
    /// Components in probe order.
    pub components: Vec<ComponentResult>,
    pub duration: Duration,
}

impl ScenarioOutcome {
    /// A scenario that failed before any call was dispatched.
    #[must_use]
    pub fn errored(name: &str, components: &[ComponentSpec], reason: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ScenarioStatus::Errored(reason.to_string()),
            components: components
                .iter()
                .map(|spec| ComponentResult {
                    key: spec.key,
                    entry: SummaryEntry::Errored {
                        test_name: spec.label.clone(),
                        attempted: 0,
                        errors: 0,
                        reason: reason.to_string(),
                    },
                    attempted: 0,
                    errors: 0,
                })
                .collect(),
            duration: Duration::ZERO,
        }
    }

    /// A scenario skipped because the run stopped earlier.
    #[must_use]
    pub fn not_run(name: &str, components: &[ComponentSpec], reason: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ScenarioStatus::NotRun(reason.to_string()),
            components: components
                .iter()
                .map(|spec| ComponentResult {
                    key: spec.key,
                    entry: SummaryEntry::not_run(&spec.label, reason),
                    attempted: 0,
                    errors: 0,
                })
                .collect(),
            duration: Duration::ZERO,
        }
    }

    /// Single-component scenarios render as a flat summary in the report.
    pub fn is_flat(&self) -> bool {
        self.components.len() == 1
    }

    /// Entry for `component`, or the only entry of a flat scenario when `None`.
    pub fn component(&self, component: Option<&str>) -> Option<&ComponentResult> {
        match component {
            Some(key) => self.components.iter().find(|c| c.key == key),
            None if self.is_flat() => self.components.first(),
            None => None,
        }
    }

    pub fn attempted(&self) -> u64 {
        self.components.iter().map(|c| c.attempted).sum()
    }

    pub fn errors(&self) -> u64 {
        self.components.iter().map(|c| c.errors).sum()
    }

    /// The p95 of the headline (first) component, when measured.
    pub fn headline_p95(&self) -> Option<f64> {
        self.components
            .first()
            .and_then(|c| c.entry.summary())
            .map(|s| s.p95)
    }

    pub const fn status_label(&self) -> &'static str {
        match self.status {
            ScenarioStatus::Completed => "measured",
            ScenarioStatus::Errored(_) => "errored",
            ScenarioStatus::Aborted(_) => "aborted",
            ScenarioStatus::NotRun(_) => "not_run",
        }
    }
}

/// Run every invocation of `config` on a bounded worker pool.
pub fn run_scenario(config: &ScenarioConfig, ctx: &RunContext<'_>) -> ScenarioOutcome {
    let specs = config.probe.components();
    let started = Instant::now();

    if let Some(reason) = ctx.cancel.reason() {
        return ScenarioOutcome::not_run(&config.name, &specs, reason.describe());
    }

    ctx.logger.send(ActivityEvent::ScenarioStarted {
        scenario: config.name.clone(),
        requests: config.repetitions,
        concurrency: config.concurrency,
    });

    let accumulator = ResultsAccumulator::new(&specs, ctx.unreachable_abort_after);
    let workers = worker_count(config.concurrency, ctx.max_workers, config.repetitions);
    let halted = AtomicBool::new(false);

    if config.repetitions > 0 {
        let (job_tx, job_rx) = channel::bounded::<usize>(workers * 2);
        let accumulator = &accumulator;
        let halted = &halted;

        thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                s.spawn(move || {
                    while let Ok(index) = job_rx.recv() {
                        if halted.load(Ordering::Relaxed) || ctx.cancel.is_cancelled() {
                            break;
                        }
                        let timeout = call_budget(config.call_timeout, ctx.cancel);
                        let outcomes = config.probe.invoke(&Invocation {
                            index,
                            transport: ctx.transport,
                            timeout,
                        });
                        log_failures(ctx.logger, &config.name, &outcomes, timeout);
                        let status = accumulator.record(&outcomes);
                        if ctx.progress_every > 0
                            && status.completed % ctx.progress_every as u64 == 0
                        {
                            ctx.logger.send(ActivityEvent::ScenarioProgress {
                                scenario: config.name.clone(),
                                attempted: status.completed,
                                errors: status.errors,
                            });
                        }
                        if status.unreachable {
                            halted.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                });
            }
            drop(job_rx);

            for index in 0..config.repetitions {
                if halted.load(Ordering::Relaxed) || ctx.cancel.is_cancelled() {
                    break;
                }
                // Every worker has exited once the channel is disconnected.
                if job_tx.send(index).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });
    }

    let completed = accumulator.completed();
    let status = if accumulator.is_unreachable() {
        let detail = accumulator
            .last_connection_error()
            .unwrap_or_else(|| "connection failed".to_string());
        ScenarioStatus::Errored(format!("target unreachable ({}): {detail}", ctx.transport.describe()))
    } else if completed < config.repetitions as u64
        && let Some(reason) = ctx.cancel.reason()
    {
        ScenarioStatus::Aborted(reason.describe().to_string())
    } else {
        ScenarioStatus::Completed
    };

    let components = accumulator
        .into_components()
        .into_iter()
        .map(|samples| summarize_component(samples, &status))
        .collect();

    let outcome = ScenarioOutcome {
        name: config.name.clone(),
        status,
        components,
        duration: started.elapsed(),
    };

    ctx.logger.send(ActivityEvent::ScenarioCompleted {
        scenario: outcome.name.clone(),
        status: outcome.status_label().to_string(),
        attempted: outcome.attempted(),
        errors: outcome.errors(),
        p95_ms: outcome.headline_p95(),
        duration_ms: outcome.duration.as_secs_f64() * 1000.0,
    });

    outcome
}

/// Workers for a scenario: at least one, never more than the cap or the job count.
pub fn worker_count(concurrency: usize, max_workers: usize, repetitions: usize) -> usize {
    concurrency
        .max(1)
        .min(max_workers.max(1))
        .min(repetitions.max(1))
}

/// The per-call timeout, cut short so no call outlives the run deadline.
pub fn call_budget(call_timeout: Duration, cancel: &CancelToken) -> Duration {
    cancel
        .remaining()
        .map_or(call_timeout, |left| call_timeout.min(left.max(MIN_CALL_BUDGET)))
}

fn summarize_component(samples: ComponentSamples, status: &ScenarioStatus) -> ComponentResult {
    let ComponentSamples {
        key,
        label,
        samples,
        attempted,
        errors,
    } = samples;
    let entry = match status {
        ScenarioStatus::Errored(reason) => SummaryEntry::Errored {
            test_name: label,
            attempted,
            errors,
            reason: reason.clone(),
        },
        ScenarioStatus::Aborted(reason) => SummaryEntry::Aborted {
            test_name: label,
            attempted,
            errors,
            reason: reason.clone(),
        },
        ScenarioStatus::NotRun(reason) => SummaryEntry::not_run(&label, reason),
        ScenarioStatus::Completed => SummaryEntry::from_samples(&label, &samples, attempted, errors),
    };
    ComponentResult {
        key,
        entry,
        attempted,
        errors,
    }
}

fn log_failures(
    logger: &ActivityLoggerHandle,
    scenario: &str,
    outcomes: &[CallOutcome],
    timeout: Duration,
) {
    for outcome in outcomes {
        if let Err(error) = &outcome.result {
            let code = error.clone().into_error(scenario, timeout).code();
            logger.send(ActivityEvent::CallFailed {
                scenario: scenario.to_string(),
                component: outcome.component.to_string(),
                error_code: code.to_string(),
                error_message: error.to_string(),
            });
        }
    }
}
