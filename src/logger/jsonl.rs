//! JSONL logger: append-only line-delimited JSON for agent-friendly log consumption.
//!
//! Each line is a self-contained JSON object. Lines are assembled in memory and
//! written with a single `write_all` so a tailing process never sees a partial
//! line.
//!
//! A failing sink steps down once: primary file, fallback file, stderr with an
//! `[ASRH-JSONL]` prefix, then silent discard. Logging never fails a run.

#![allow(missing_docs)]

use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{AsrhError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Log event types matching the harness run lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStart,
    AuthBootstrap,
    WarmupComplete,
    ScenarioStart,
    ScenarioProgress,
    CallFailed,
    ScenarioComplete,
    LoadLevelComplete,
    RequirementEvaluated,
    RunAborted,
    RunComplete,
    ReportWritten,
    Error,
}

/// A single JSONL log entry; all fields optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Event type identifier.
    pub event: EventType,
    /// Severity level.
    pub severity: Severity,
    /// Scenario key (e.g. `patient_list_latency`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Component within a composite scenario.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Simulated users for a load level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<usize>,
    /// Calls attempted so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempted: Option<u64>,
    /// Failed calls so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<u64>,
    /// Duration of the call or phase in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// 95th percentile latency in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_ms: Option<f64>,
    /// Whether the action succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// ASRH error code if the action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            scenario: None,
            component: None,
            users: None,
            attempted: None,
            errors: None,
            duration_ms: None,
            p95_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where lines currently go.
enum Sink {
    File {
        out: BufWriter<File>,
        fallback: bool,
    },
    Stderr,
    Discard,
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Tried once if the primary path cannot be opened or written.
    pub fallback_path: Option<PathBuf>,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("asrh-activity.jsonl"),
            fallback_path: Some(std::env::temp_dir().join("asrh-activity.jsonl")),
        }
    }
}

/// Append-only JSONL log writer.
pub struct JsonlWriter {
    sink: Sink,
    /// Taken on first use.
    fallback_path: Option<PathBuf>,
}

impl JsonlWriter {
    /// Open the primary path, stepping down the sink chain if it fails.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            sink: Sink::Stderr,
            fallback_path: config.fallback_path,
        };
        match open_append(&config.path) {
            Ok(file) => writer.sink = Sink::file(file, false),
            Err(e) => writer.step_down_from_file(&e),
        }
        writer
    }

    /// Write a single log entry as one JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "[ASRH-JSONL] serialize error: {e}");
            }
        }
    }

    /// Flush buffers and sync file data.
    pub fn flush(&mut self) {
        if let Sink::File { out, .. } = &mut self.sink {
            let _ = out.flush();
            let _ = out.get_ref().sync_data();
        }
    }

    /// Current sink: `primary`, `fallback`, `stderr` or `discard`.
    pub fn state(&self) -> &'static str {
        match self.sink {
            Sink::File { fallback: false, .. } => "primary",
            Sink::File { fallback: true, .. } => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    fn write_line(&mut self, line: &str) {
        loop {
            let written = match &mut self.sink {
                Sink::File { out, .. } => out.write_all(line.as_bytes()),
                Sink::Stderr => write!(io::stderr(), "[ASRH-JSONL] {line}"),
                Sink::Discard => return,
            };
            let Err(e) = written else { return };
            if matches!(self.sink, Sink::Stderr) {
                self.sink = Sink::Discard;
            } else {
                self.step_down_from_file(&e);
            }
        }
    }

    /// Replace a failed file sink with the fallback file, or stderr once that is used up.
    fn step_down_from_file(&mut self, cause: &dyn Display) {
        if let Some(path) = self.fallback_path.take() {
            match open_append(&path) {
                Ok(file) => {
                    let _ = writeln!(
                        io::stderr(),
                        "[ASRH-JSONL] {cause}; logging to fallback {}",
                        path.display()
                    );
                    self.sink = Sink::file(file, true);
                    return;
                }
                Err(e) => {
                    let _ = writeln!(io::stderr(), "[ASRH-JSONL] {cause}; fallback failed: {e}");
                }
            }
        } else {
            let _ = writeln!(io::stderr(), "[ASRH-JSONL] {cause}");
        }
        self.sink = Sink::Stderr;
    }
}

impl Sink {
    fn file(file: File, fallback: bool) -> Self {
        Self::File {
            out: BufWriter::with_capacity(64 * 1024, file),
            fallback,
        }
    }
}

/// Open or create `path` for appending, creating parent directories.
fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| AsrhError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AsrhError::io(path, source))
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
