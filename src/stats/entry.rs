//! Explicit per-component result state.
//!
//! Every measured component lands in the report as exactly one of these
//! variants, tagged by `"status"`. A component with zero successful samples is
//! `no_data`, never an empty object, so it cannot be confused with a healthy
//! result or with a component that was never run.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::errors::AsrhError;
use crate::stats::summary::{StatisticalSummary, compute_summary};

/// Result state of one measured component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryEntry {
    /// At least one successful sample.
    Measured {
        #[serde(flatten)]
        summary: StatisticalSummary,
        attempted: u64,
        errors: u64,
    },
    /// Calls were attempted but none succeeded.
    NoData {
        test_name: String,
        attempted: u64,
        errors: u64,
        reason: String,
    },
    /// The scenario hit a fatal error (setup failure, target unreachable).
    Errored {
        test_name: String,
        attempted: u64,
        errors: u64,
        reason: String,
    },
    /// Interrupted by the global deadline or operator cancellation.
    Aborted {
        test_name: String,
        attempted: u64,
        errors: u64,
        reason: String,
    },
    /// Never started because the run stopped earlier.
    NotRun { test_name: String, reason: String },
}

impl SummaryEntry {
    /// Summarize samples, mapping an empty set to `NoData`.
    pub fn from_samples(test_name: &str, samples: &[f64], attempted: u64, errors: u64) -> Self {
        match compute_summary(test_name, samples) {
            Ok(summary) => Self::Measured {
                summary,
                attempted,
                errors,
            },
            Err(AsrhError::EmptySampleSet { .. }) => Self::NoData {
                test_name: test_name.to_string(),
                attempted,
                errors,
                reason: if attempted == 0 {
                    "no calls attempted".to_string()
                } else {
                    format!("all {attempted} calls failed")
                },
            },
            Err(other) => Self::Errored {
                test_name: test_name.to_string(),
                attempted,
                errors,
                reason: other.to_string(),
            },
        }
    }

    #[must_use]
    pub fn not_run(test_name: &str, reason: &str) -> Self {
        Self::NotRun {
            test_name: test_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The summary, when this component produced data.
    #[must_use]
    pub const fn summary(&self) -> Option<&StatisticalSummary> {
        match self {
            Self::Measured { summary, .. } => Some(summary),
            _ => None,
        }
    }

    /// `(attempted, errors)`; `None` for a component that never ran.
    #[must_use]
    pub const fn counts(&self) -> Option<(u64, u64)> {
        match self {
            Self::Measured {
                attempted, errors, ..
            }
            | Self::NoData {
                attempted, errors, ..
            }
            | Self::Errored {
                attempted, errors, ..
            }
            | Self::Aborted {
                attempted, errors, ..
            } => Some((*attempted, *errors)),
            Self::NotRun { .. } => None,
        }
    }

    /// Wire value of the `status` tag.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Measured { .. } => "measured",
            Self::NoData { .. } => "no_data",
            Self::Errored { .. } => "errored",
            Self::Aborted { .. } => "aborted",
            Self::NotRun { .. } => "not_run",
        }
    }

    #[must_use]
    pub fn test_name(&self) -> &str {
        match self {
            Self::Measured { summary, .. } => &summary.test_name,
            Self::NoData { test_name, .. }
            | Self::Errored { test_name, .. }
            | Self::Aborted { test_name, .. }
            | Self::NotRun { test_name, .. } => test_name,
        }
    }
}
