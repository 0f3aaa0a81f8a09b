#![forbid(unsafe_code)]

//! ASR latency harness (asrh): validates response-time requirements of a live
//! patient-records service.
//!
//! A run proceeds in four stages:
//! 1. **Bootstrap and warmup**: obtain a session token, prime caches and pools
//! 2. **Scenarios**: timed request scenarios (auth, list, detail, search, end-to-end)
//!    dispatched on a bounded worker pool
//! 3. **Load sweep**: the list endpoint at increasing concurrency levels
//! 4. **Compliance**: percentile summaries judged against declared requirements,
//!    written as a JSON report
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use asr_harness::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use asr_harness::core::config::Config;
//! use asr_harness::stats::summary::compute_summary;
//! ```

pub mod prelude;

pub mod compliance;
pub mod core;
pub mod harness;
pub mod logger;
pub mod report;
pub mod stats;
pub mod target;
