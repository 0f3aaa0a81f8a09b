//! Activity logger: a dedicated thread owns the `JsonlWriter`.
//!
//! Worker threads send `ActivityEvent` through a bounded crossbeam channel. The
//! non-blocking `try_send()` keeps timed calls free of logging back-pressure.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{AsrhError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

// ──────────────────── channel capacity ────────────────────

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 4096;

// ──────────────────── public event type ────────────────────

/// Events emitted over the course of a run.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    RunStarted {
        experiment: String,
        target: String,
        config_hash: String,
    },
    AuthBootstrap {
        ok: bool,
        details: String,
    },
    WarmupCompleted {
        rounds: usize,
        failures: u64,
        duration_ms: f64,
    },
    ScenarioStarted {
        scenario: String,
        requests: usize,
        concurrency: usize,
    },
    ScenarioProgress {
        scenario: String,
        attempted: u64,
        errors: u64,
    },
    CallFailed {
        scenario: String,
        component: String,
        error_code: String,
        error_message: String,
    },
    ScenarioCompleted {
        scenario: String,
        status: String,
        attempted: u64,
        errors: u64,
        p95_ms: Option<f64>,
        duration_ms: f64,
    },
    LoadLevelCompleted {
        users: usize,
        attempted: u64,
        errors: u64,
        p95_ms: Option<f64>,
        acceptable: bool,
    },
    RequirementEvaluated {
        key: String,
        requirement: String,
        actual: String,
        compliant: bool,
    },
    RunAborted {
        reason: String,
    },
    RunCompleted {
        compliance_pct: f64,
        status: String,
        duration_ms: f64,
    },
    ReportWritten {
        path: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending log events.
///
/// Wraps a bounded crossbeam `Sender`. `send()` uses `try_send()` so callers
/// are never blocked by logging back-pressure.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle with no logger thread behind it. Every event is discarded.
    #[must_use]
    pub fn disabled() -> Self {
        let (tx, _rx) = bounded::<ActivityEvent>(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events counter
    /// is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown. Queued events are written first.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── configuration ────────────────────

/// Options for building the activity logger.
pub struct ActivityLogConfig {
    pub jsonl_config: JsonlConfig,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
    /// Echo a compact line per event to stderr (`--verbose`).
    pub echo_stderr: bool,
}

impl ActivityLogConfig {
    #[must_use]
    pub fn for_path(path: PathBuf, echo_stderr: bool) -> Self {
        Self {
            jsonl_config: JsonlConfig {
                path,
                ..JsonlConfig::default()
            },
            channel_capacity: CHANNEL_CAPACITY,
            echo_stderr,
        }
    }
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
            echo_stderr: false,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle.
///
/// The logger thread runs until `handle.shutdown()` is called or all senders
/// are dropped.
pub fn spawn_logger(
    config: ActivityLogConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("asrh-logger".to_string())
        .spawn(move || {
            logger_thread_main(&rx, config.jsonl_config, config.echo_stderr, &dropped_clone);
        })
        .map_err(|e| AsrhError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(
    rx: &Receiver<ActivityEvent>,
    jsonl_config: JsonlConfig,
    echo_stderr: bool,
    dropped: &AtomicU64,
) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        let entry = event_to_log_entry(&event);
        if echo_stderr {
            eprintln!("[ASRH] {}", compact_line(&entry));
        }
        jsonl.write_entry(&entry);
    }

    jsonl.flush();
}

// ──────────────────── event conversion ────────────────────

#[allow(clippy::too_many_lines)]
fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::RunStarted {
            experiment,
            target,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::RunStart, Severity::Info);
            e.details = Some(format!(
                "experiment={experiment} target={target} config_hash={config_hash}"
            ));
            e
        }
        ActivityEvent::AuthBootstrap { ok, details } => {
            let severity = if *ok { Severity::Info } else { Severity::Warning };
            let mut e = LogEntry::new(EventType::AuthBootstrap, severity);
            e.ok = Some(*ok);
            e.details = Some(details.clone());
            e
        }
        ActivityEvent::WarmupCompleted {
            rounds,
            failures,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::WarmupComplete, Severity::Info);
            e.errors = Some(*failures);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("rounds={rounds}"));
            e
        }
        ActivityEvent::ScenarioStarted {
            scenario,
            requests,
            concurrency,
        } => {
            let mut e = LogEntry::new(EventType::ScenarioStart, Severity::Info);
            e.scenario = Some(scenario.clone());
            e.details = Some(format!("requests={requests} concurrency={concurrency}"));
            e
        }
        ActivityEvent::ScenarioProgress {
            scenario,
            attempted,
            errors,
        } => {
            let mut e = LogEntry::new(EventType::ScenarioProgress, Severity::Info);
            e.scenario = Some(scenario.clone());
            e.attempted = Some(*attempted);
            e.errors = Some(*errors);
            e
        }
        ActivityEvent::CallFailed {
            scenario,
            component,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::CallFailed, Severity::Warning);
            e.scenario = Some(scenario.clone());
            e.component = Some(component.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::ScenarioCompleted {
            scenario,
            status,
            attempted,
            errors,
            p95_ms,
            duration_ms,
        } => {
            let severity = if status == "measured" {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::ScenarioComplete, severity);
            e.scenario = Some(scenario.clone());
            e.attempted = Some(*attempted);
            e.errors = Some(*errors);
            e.p95_ms = *p95_ms;
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("status={status}"));
            e
        }
        ActivityEvent::LoadLevelCompleted {
            users,
            attempted,
            errors,
            p95_ms,
            acceptable,
        } => {
            let mut e = LogEntry::new(EventType::LoadLevelComplete, Severity::Info);
            e.scenario = Some("concurrent_load_test".to_string());
            e.users = Some(*users);
            e.attempted = Some(*attempted);
            e.errors = Some(*errors);
            e.p95_ms = *p95_ms;
            e.ok = Some(*acceptable);
            e
        }
        ActivityEvent::RequirementEvaluated {
            key,
            requirement,
            actual,
            compliant,
        } => {
            let severity = if *compliant {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::RequirementEvaluated, severity);
            e.ok = Some(*compliant);
            e.details = Some(format!("{key}: requirement={requirement} actual={actual}"));
            e
        }
        ActivityEvent::RunAborted { reason } => {
            let mut e = LogEntry::new(EventType::RunAborted, Severity::Critical);
            e.ok = Some(false);
            e.details = Some(reason.clone());
            e
        }
        ActivityEvent::RunCompleted {
            compliance_pct,
            status,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::RunComplete, Severity::Info);
            e.ok = Some(status == "PASS");
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("status={status} compliance={compliance_pct:.1}%"));
            e
        }
        ActivityEvent::ReportWritten { path } => {
            let mut e = LogEntry::new(EventType::ReportWritten, Severity::Info);
            e.ok = Some(true);
            e.details = Some(path.clone());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::RunComplete, Severity::Info),
    }
}

/// One-line rendering for `--verbose` stderr echo.
fn compact_line(entry: &LogEntry) -> String {
    let event = serde_json::to_value(&entry.event)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut line = event;
    if let Some(scenario) = &entry.scenario {
        line.push_str(&format!(" scenario={scenario}"));
    }
    if let Some(component) = &entry.component {
        line.push_str(&format!(" component={component}"));
    }
    if let Some(users) = entry.users {
        line.push_str(&format!(" users={users}"));
    }
    if let Some(attempted) = entry.attempted {
        line.push_str(&format!(" attempted={attempted}"));
    }
    if let Some(errors) = entry.errors {
        line.push_str(&format!(" errors={errors}"));
    }
    if let Some(p95) = entry.p95_ms {
        line.push_str(&format!(" p95={p95:.2}ms"));
    }
    if let Some(code) = &entry.error_code {
        line.push_str(&format!(" [{code}]"));
    }
    if let Some(message) = &entry.error_message {
        line.push_str(&format!(" {message}"));
    }
    if let Some(details) = &entry.details {
        line.push_str(&format!(" {details}"));
    }
    line
}

// ──────────────────── tests ────────────────────
