//! Requirement evaluation: judge measured statistics against declared thresholds.

#![allow(missing_docs)]

pub mod requirement;

use serde::{Deserialize, Serialize};

use crate::stats::entry::SummaryEntry;
use requirement::Requirement;

/// Verdict for one requirement. `compliant` is always a native boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    /// Requirement text, e.g. `< 800ms`.
    pub requirement: String,
    /// Observed value with unit, e.g. `612.34ms`, or a no-data marker.
    pub actual: String,
    pub compliant: bool,
    /// Raw observed value; `null` when the component has no data.
    pub measured: Option<f64>,
}

/// Judge one requirement against the entry for its scenario component.
///
/// Pure: identical inputs always produce identical output. A component without
/// data is never compliant.
#[must_use]
pub fn evaluate_requirement(requirement: &Requirement, entry: &SummaryEntry) -> ComplianceResult {
    match entry.summary() {
        Some(summary) => {
            let value = summary.get(requirement.statistic);
            ComplianceResult {
                requirement: requirement.text(),
                actual: format!("{value:.2}{}", requirement.unit),
                compliant: requirement.operator.holds(value, requirement.threshold),
                measured: Some(value),
            }
        }
        None => ComplianceResult {
            requirement: requirement.text(),
            actual: format!("no data ({})", entry.status()),
            compliant: false,
            measured: None,
        },
    }
}
