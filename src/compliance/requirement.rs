//! Declared latency requirements.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::{AsrhError, Result};

pub use crate::stats::summary::Statistic;

/// Comparison applied as `actual <op> threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Apply the comparison.
    #[must_use]
    pub fn holds(self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => actual < threshold,
            Self::Le => actual <= threshold,
            Self::Gt => actual > threshold,
            Self::Ge => actual >= threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A threshold on one statistic of one scenario (or scenario component).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    /// Key in the report's `asr_compliance` map.
    pub key: String,
    /// Scenario key in `test_results`.
    pub scenario: String,
    /// Sub-scenario for composite scenarios (e.g. `jwt_validation`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub statistic: Statistic,
    pub operator: Operator,
    pub threshold: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    "ms".to_string()
}

impl Requirement {
    /// Human-readable requirement text, e.g. `< 800ms`.
    #[must_use]
    pub fn text(&self) -> String {
        format!(
            "{} {}{}",
            self.operator,
            format_threshold(self.threshold),
            self.unit
        )
    }

    /// Dotted address of the judged statistic, e.g. `end_to_end_latency.end_to_end.p95`.
    #[must_use]
    pub fn target_label(&self) -> String {
        match &self.component {
            Some(component) => format!(
                "{}.{}.{}",
                self.scenario,
                component,
                self.statistic.label()
            ),
            None => format!("{}.{}", self.scenario, self.statistic.label()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() || self.scenario.trim().is_empty() {
            return Err(AsrhError::InvalidConfig {
                details: "requirement key and scenario must not be empty".to_string(),
            });
        }
        if !self.threshold.is_finite() {
            return Err(AsrhError::InvalidConfig {
                details: format!("requirement {:?} threshold must be finite", self.key),
            });
        }
        Ok(())
    }
}

/// Integral thresholds print without decimals (`800`), others keep them (`92.5`).
fn format_threshold(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p95_under(threshold: f64) -> Requirement {
        Requirement {
            key: "end_to_end_p95".to_string(),
            scenario: "end_to_end_latency".to_string(),
            component: Some("end_to_end".to_string()),
            statistic: Statistic::P95,
            operator: Operator::Lt,
            threshold,
            unit: "ms".to_string(),
        }
    }

    #[test]
    fn text_matches_report_convention() {
        assert_eq!(p95_under(800.0).text(), "< 800ms");
        assert_eq!(p95_under(92.5).text(), "< 92.5ms");
    }

    #[test]
    fn target_label_includes_component() {
        assert_eq!(
            p95_under(800.0).target_label(),
            "end_to_end_latency.end_to_end.p95"
        );
    }

    #[test]
    fn operators_compare_strictly_or_inclusively() {
        assert!(Operator::Lt.holds(799.9, 800.0));
        assert!(!Operator::Lt.holds(800.0, 800.0));
        assert!(Operator::Le.holds(800.0, 800.0));
        assert!(Operator::Gt.holds(99.5, 99.0));
        assert!(Operator::Ge.holds(99.0, 99.0));
    }

    #[test]
    fn operator_serializes_as_symbol() {
        let json = serde_json::to_string(&Operator::Le).unwrap();
        assert_eq!(json, r#""<=""#);
    }

    #[test]
    fn requirement_parses_from_toml() {
        let req: Requirement = toml::from_str(
            r#"
            key = "search_p99"
            scenario = "patient_search_latency"
            statistic = "p99"
            operator = "<"
            threshold = 400
            "#,
        )
        .expect("parse requirement");
        assert_eq!(req.statistic, Statistic::P99);
        assert_eq!(req.unit, "ms");
        assert!(req.component.is_none());
    }

    #[test]
    fn non_finite_threshold_rejected() {
        let err = p95_under(f64::INFINITY).validate().unwrap_err();
        assert!(err.to_string().contains("finite"));
    }
}
