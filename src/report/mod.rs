//! Experiment report: model and construction from a finished run.
//!
//! Maps keep run order (`core::ordered::OrderedMap`). Every flag is a native
//! boolean.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

pub mod io;

use serde::{Deserialize, Serialize};

use crate::compliance::requirement::Requirement;
use crate::compliance::{ComplianceResult, evaluate_requirement};
use crate::core::ordered::OrderedMap;
use crate::harness::experiment::{CONCURRENT_LOAD_TEST, ExperimentRun};
use crate::harness::load::{LoadLevelResult, LoadSweep};
use crate::harness::runner::ScenarioOutcome;
use crate::stats::entry::SummaryEntry;

/// Whether the run finished every scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Aborted,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PerformanceStatus {
    Pass,
    Fail,
}

impl PerformanceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

/// One `test_results` value.
///
/// Untagged: a flat entry carries a `status` key, a load map's values carry
/// `users`, anything else is a component map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioResult {
    Flat(SummaryEntry),
    LoadLevels(OrderedMap<LoadLevelResult>),
    Components(OrderedMap<SummaryEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub total_asrs_evaluated: usize,
    pub compliant_asrs: usize,
    pub compliance_percentage: f64,
    pub overall_performance_status: PerformanceStatus,
}

impl ComplianceSummary {
    /// `compliant / max(1, total) · 100`; PASS only at exactly 100.
    #[must_use]
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ComplianceResult>) -> Self {
        let (total, compliant) = results.into_iter().fold((0_usize, 0_usize), |(t, c), r| {
            (t + 1, c + usize::from(r.compliant))
        });
        let compliance_percentage = compliant as f64 / total.max(1) as f64 * 100.0;
        let overall_performance_status = if total > 0 && compliant == total {
            PerformanceStatus::Pass
        } else {
            PerformanceStatus::Fail
        };
        Self {
            total_asrs_evaluated: total,
            compliant_asrs: compliant,
            compliance_percentage,
            overall_performance_status,
        }
    }
}

/// Per-level load verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadAnalysis {
    /// `null` when the level produced no data.
    pub p95_latency: Option<f64>,
    pub success_rate: f64,
    pub acceptable_performance: bool,
}

/// The JSON artifact of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment: String,
    /// When results were complete, RFC 3339 UTC.
    pub timestamp: String,
    pub duration_seconds: f64,
    pub server_ip: String,
    pub run_status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub asr_compliance: OrderedMap<ComplianceResult>,
    pub test_results: OrderedMap<ScenarioResult>,
    pub summary: ComplianceSummary,
    pub load_analysis: OrderedMap<LoadAnalysis>,
}

impl ExperimentReport {
    pub fn passed(&self) -> bool {
        self.summary.overall_performance_status == PerformanceStatus::Pass
    }
}

/// Evaluate `requirements` against `run` and assemble the report.
#[must_use]
pub fn build_report(run: &ExperimentRun, requirements: &[Requirement]) -> ExperimentReport {
    let mut test_results = OrderedMap::new();
    for scenario in &run.scenarios {
        test_results.insert(scenario.name.clone(), scenario_result(scenario));
    }
    if let Some(sweep) = &run.load {
        test_results.insert(CONCURRENT_LOAD_TEST, ScenarioResult::LoadLevels(load_levels(sweep)));
    }

    let asr_compliance: OrderedMap<ComplianceResult> = requirements
        .iter()
        .map(|requirement| {
            let entry = lookup_entry(run, requirement);
            (requirement.key.clone(), evaluate_requirement(requirement, &entry))
        })
        .collect();

    let summary = ComplianceSummary::from_results(asr_compliance.values());

    let load_analysis = run
        .load
        .as_ref()
        .map(|sweep| {
            sweep
                .levels
                .iter()
                .map(|level| {
                    (
                        level.key(),
                        LoadAnalysis {
                            p95_latency: level.p95(),
                            success_rate: level.success_rate,
                            acceptable_performance: level.acceptable_performance,
                        },
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    ExperimentReport {
        experiment: run.experiment.clone(),
        timestamp: run
            .finished_at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        duration_seconds: run.duration.as_secs_f64(),
        server_ip: run.server_label.clone(),
        run_status: run.run_status,
        abort_reason: run.abort_reason.clone(),
        asr_compliance,
        test_results,
        summary,
        load_analysis,
    }
}

fn scenario_result(scenario: &ScenarioOutcome) -> ScenarioResult {
    if scenario.is_flat()
        && let Some(component) = scenario.components.first()
    {
        return ScenarioResult::Flat(component.entry.clone());
    }
    ScenarioResult::Components(
        scenario
            .components
            .iter()
            .map(|c| (c.key, c.entry.clone()))
            .collect(),
    )
}

fn load_levels(sweep: &LoadSweep) -> OrderedMap<LoadLevelResult> {
    sweep
        .levels
        .iter()
        .map(|level| (level.key(), level.clone()))
        .collect()
}

/// The entry a requirement is judged against. A missing scenario or component
/// still counts as evaluated, with no data.
fn lookup_entry(run: &ExperimentRun, requirement: &Requirement) -> SummaryEntry {
    let label = requirement.target_label();
    if requirement.scenario == CONCURRENT_LOAD_TEST {
        let level = run.load.as_ref().and_then(|sweep| {
            sweep.levels.iter().find(|level| {
                requirement
                    .component
                    .as_deref()
                    .is_some_and(|key| key == level.key())
            })
        });
        return level.map_or_else(
            || SummaryEntry::not_run(&label, "load level not run"),
            |level| level.entry.clone(),
        );
    }
    run.scenario(&requirement.scenario)
        .and_then(|scenario| scenario.component(requirement.component.as_deref()))
        .map_or_else(
            || SummaryEntry::not_run(&label, "scenario or component not run"),
            |component| component.entry.clone(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::default_requirements;
    use crate::harness::runner::{ComponentResult, ScenarioStatus};
    use std::time::Duration;

    fn measured(key: &'static str, samples: &[f64]) -> ComponentResult {
        ComponentResult {
            key,
            entry: SummaryEntry::from_samples(key, samples, samples.len() as u64, 0),
            attempted: samples.len() as u64,
            errors: 0,
        }
    }

    fn outcome(name: &str, components: Vec<ComponentResult>) -> ScenarioOutcome {
        ScenarioOutcome {
            name: name.to_string(),
            status: ScenarioStatus::Completed,
            components,
            duration: Duration::from_secs(1),
        }
    }

    fn run_with(e2e: &[f64], jwt: &[f64], detail: &[f64]) -> ExperimentRun {
        ExperimentRun {
            experiment: "Latency Validation (ASR-3)".to_string(),
            server_label: "10.0.0.5".to_string(),
            finished_at: chrono::Utc::now(),
            duration: Duration::from_secs(42),
            run_status: RunStatus::Completed,
            abort_reason: None,
            scenarios: vec![
                outcome(
                    "authentication_latency",
                    vec![measured("authentication", &[90.0]), measured("jwt_validation", jwt)],
                ),
                outcome("patient_detail_latency", vec![measured("patient_detail", detail)]),
                outcome(
                    "end_to_end_latency",
                    vec![
                        measured("end_to_end", e2e),
                        measured("auth_component", &[100.0]),
                        measured("query_component", &[100.0]),
                    ],
                ),
            ],
            load: Some(LoadSweep {
                levels: vec![
                    LoadLevelResult {
                        users: 1,
                        entry: SummaryEntry::from_samples("1 concurrent users", &[50.0], 5, 0),
                        success_rate: 100.0,
                        acceptable_performance: true,
                    },
                    LoadLevelResult {
                        users: 20,
                        entry: SummaryEntry::from_samples("20 concurrent users", &[], 100, 100),
                        success_rate: 0.0,
                        acceptable_performance: false,
                    },
                ],
            }),
        }
    }

    #[test]
    fn all_compliant_is_pass() {
        let report = build_report(&run_with(&[500.0, 600.0], &[50.0], &[80.0]), &default_requirements());
        assert_eq!(report.summary.total_asrs_evaluated, 3);
        assert_eq!(report.summary.compliant_asrs, 3);
        assert!((report.summary.compliance_percentage - 100.0).abs() < f64::EPSILON);
        assert!(report.passed());
    }

    #[test]
    fn one_violation_is_fail() {
        let report = build_report(&run_with(&[900.0, 950.0], &[50.0], &[80.0]), &default_requirements());
        assert_eq!(report.summary.compliant_asrs, 2);
        assert!((report.summary.compliance_percentage - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.summary.overall_performance_status, PerformanceStatus::Fail);
        let e2e = report.asr_compliance.get("end_to_end_p95").unwrap();
        assert!(!e2e.compliant);
        assert_eq!(e2e.requirement, "< 800ms");
    }

    #[test]
    fn zero_requirements_is_fail() {
        let report = build_report(&run_with(&[1.0], &[1.0], &[1.0]), &[]);
        assert_eq!(report.summary.total_asrs_evaluated, 0);
        assert!(report.summary.compliance_percentage.abs() < f64::EPSILON);
        assert_eq!(report.summary.overall_performance_status, PerformanceStatus::Fail);
    }

    #[test]
    fn empty_component_counts_as_evaluated_and_non_compliant() {
        let report = build_report(&run_with(&[500.0], &[], &[80.0]), &default_requirements());
        let jwt = report.asr_compliance.get("jwt_validation").unwrap();
        assert!(!jwt.compliant);
        assert!(jwt.measured.is_none());
        assert_eq!(report.summary.total_asrs_evaluated, 3);
    }

    #[test]
    fn missing_scenario_is_evaluated_as_not_run() {
        let mut requirements = default_requirements();
        requirements[0].scenario = "no_such_scenario".to_string();
        let report = build_report(&run_with(&[500.0], &[50.0], &[80.0]), &requirements);
        let result = report.asr_compliance.get("end_to_end_p95").unwrap();
        assert_eq!(result.actual, "no data (not_run)");
        assert!(!report.passed());
    }

    #[test]
    fn test_results_have_three_shapes() {
        let report = build_report(&run_with(&[500.0], &[50.0], &[80.0]), &default_requirements());
        assert!(matches!(
            report.test_results.get("patient_detail_latency"),
            Some(ScenarioResult::Flat(SummaryEntry::Measured { .. }))
        ));
        assert!(matches!(
            report.test_results.get("end_to_end_latency"),
            Some(ScenarioResult::Components(_))
        ));
        assert!(matches!(
            report.test_results.get("concurrent_load_test"),
            Some(ScenarioResult::LoadLevels(_))
        ));
    }

    #[test]
    fn load_analysis_covers_every_level_in_order() {
        let report = build_report(&run_with(&[500.0], &[50.0], &[80.0]), &default_requirements());
        let keys: Vec<&str> = report.load_analysis.keys().collect();
        assert_eq!(keys, ["1_users", "20_users"]);
        let empty = report.load_analysis.get("20_users").unwrap();
        assert!(empty.p95_latency.is_none());
        assert!(!empty.acceptable_performance);
    }

    fn level(users: usize) -> LoadLevelResult {
        let label = format!("{users} concurrent users");
        LoadLevelResult {
            users,
            entry: SummaryEntry::from_samples(&label, &[40.0 + users as f64], users as u64, 0),
            success_rate: 100.0,
            acceptable_performance: true,
        }
    }

    #[test]
    fn serialized_levels_follow_numeric_order() {
        let mut run = run_with(&[500.0], &[50.0], &[80.0]);
        run.load = Some(LoadSweep {
            levels: [1, 5, 10, 20].into_iter().map(level).collect(),
        });
        let report = build_report(&run, &default_requirements());
        let json = serde_json::to_string(&report).unwrap();

        let load_test = json.find("\"concurrent_load_test\"").unwrap();
        let analysis = json.find("\"load_analysis\"").unwrap();
        for start in [load_test, analysis] {
            let section = &json[start..];
            let positions: Vec<usize> = ["\"1_users\"", "\"5_users\"", "\"10_users\"", "\"20_users\""]
                .iter()
                .map(|key| section.find(key).unwrap())
                .collect();
            // A lexical sort would put 10_users before 5_users.
            assert!(
                positions.windows(2).all(|w| w[0] < w[1]),
                "levels out of order: {positions:?}"
            );
        }
    }

    #[test]
    fn timestamp_marks_when_results_were_complete() {
        let run = run_with(&[500.0], &[50.0], &[80.0]);
        let report = build_report(&run, &default_requirements());
        assert_eq!(
            report.timestamp,
            run.finished_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        );
        let parsed = chrono::DateTime::parse_from_rfc3339(&report.timestamp).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[test]
    fn report_json_has_the_documented_top_level_keys() {
        let report = build_report(&run_with(&[500.0], &[50.0], &[80.0]), &default_requirements());
        let value = serde_json::to_value(&report).unwrap();
        for key in [
            "experiment",
            "timestamp",
            "duration_seconds",
            "server_ip",
            "run_status",
            "asr_compliance",
            "test_results",
            "summary",
            "load_analysis",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["run_status"], "completed");
        assert_eq!(value["summary"]["overall_performance_status"], "PASS");
        assert!(value["asr_compliance"]["jwt_validation"]["compliant"].is_boolean());
        assert!(value.get("abort_reason").is_none());
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = build_report(&run_with(&[500.0, 700.0], &[50.0], &[]), &default_requirements());
        let json = serde_json::to_string_pretty(&report).unwrap();
        let back: ExperimentReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn requirement_can_target_a_load_level() {
        let mut requirement = default_requirements().remove(0);
        requirement.key = "load_1_users_p95".to_string();
        requirement.scenario = CONCURRENT_LOAD_TEST.to_string();
        requirement.component = Some("1_users".to_string());
        let report = build_report(&run_with(&[500.0], &[50.0], &[80.0]), &[requirement]);
        assert!(report.asr_compliance.get("load_1_users_p95").unwrap().compliant);
    }
}
