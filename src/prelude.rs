//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use asr_harness::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{AsrhError, Result};
pub use crate::core::ordered::OrderedMap;

// Stats
pub use crate::stats::entry::SummaryEntry;
pub use crate::stats::summary::{Statistic, StatisticalSummary, compute_summary};

// Compliance
pub use crate::compliance::requirement::{Operator, Requirement};
pub use crate::compliance::{ComplianceResult, evaluate_requirement};

// Target
pub use crate::target::http::HttpTransport;
pub use crate::target::transport::{ApiRequest, ApiResponse, CallError, Transport};

// Harness
pub use crate::harness::cancel::CancelToken;
pub use crate::harness::experiment::{ExperimentRun, LatencyExperiment};
pub use crate::harness::load::{LoadSettings, LoadSweep, run_load_sweep};
pub use crate::harness::runner::{RunContext, ScenarioOutcome, run_scenario};
pub use crate::harness::scenario::{Probe, ScenarioConfig};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};

// Report
pub use crate::report::io::{read_report, write_report};
pub use crate::report::{ExperimentReport, build_report};
