//! Full latency experiment: auth bootstrap, warmup, the five request
//! scenarios, the load sweep, then compliance and the report.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::core::config::Config;
use crate::harness::cancel::CancelToken;
use crate::harness::load::{LoadSettings, LoadSweep, run_load_sweep};
use crate::harness::runner::{
    RunContext, ScenarioOutcome, ScenarioStatus, call_budget, run_scenario,
};
use crate::harness::scenario::{
    ComponentSpec, DetailProbe, EndToEndProbe, ListProbe, LoginProbe, Probe, ScenarioConfig,
    SearchProbe, timed_call,
};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::report::{ExperimentReport, RunStatus, build_report};
use crate::target::api::{PatientApi, extract_patient_ids, extract_token};
use crate::target::transport::{ApiResponse, Transport};

pub const AUTHENTICATION_LATENCY: &str = "authentication_latency";
pub const PATIENT_LIST_LATENCY: &str = "patient_list_latency";
pub const PATIENT_DETAIL_LATENCY: &str = "patient_detail_latency";
pub const PATIENT_SEARCH_LATENCY: &str = "patient_search_latency";
pub const END_TO_END_LATENCY: &str = "end_to_end_latency";
pub const CONCURRENT_LOAD_TEST: &str = "concurrent_load_test";

/// Raw results of a run, before compliance evaluation.
#[derive(Debug, Clone)]
pub struct ExperimentRun {
    pub experiment: String,
    pub server_label: String,
    /// When the last scenario or load level finished.
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub run_status: RunStatus,
    /// Why the run stopped early, when it did.
    pub abort_reason: Option<String>,
    /// Scenarios in run order.
    pub scenarios: Vec<ScenarioOutcome>,
    /// `None` when the load sweep is disabled.
    pub load: Option<LoadSweep>,
}

impl ExperimentRun {
    pub fn scenario(&self, name: &str) -> Option<&ScenarioOutcome> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

/// One experiment against one target.
pub struct LatencyExperiment<'a> {
    config: &'a Config,
    transport: &'a dyn Transport,
    cancel: CancelToken,
    logger: ActivityLoggerHandle,
    api: PatientApi,
}

impl<'a> LatencyExperiment<'a> {
    pub fn new(
        config: &'a Config,
        transport: &'a dyn Transport,
        cancel: CancelToken,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            config,
            transport,
            cancel,
            logger,
            api: PatientApi::new(config.target.endpoints.clone()),
        }
    }

    /// Run everything and evaluate the requirements.
    pub fn execute(&self) -> ExperimentReport {
        let run = self.run();
        let report = build_report(&run, &self.config.requirements);

        for (key, result) in report.asr_compliance.iter() {
            self.logger.send(ActivityEvent::RequirementEvaluated {
                key: key.to_string(),
                requirement: result.requirement.clone(),
                actual: result.actual.clone(),
                compliant: result.compliant,
            });
        }
        self.logger.send(ActivityEvent::RunCompleted {
            compliance_pct: report.summary.compliance_percentage,
            status: report.summary.overall_performance_status.as_str().to_string(),
            duration_ms: report.duration_seconds * 1000.0,
        });
        report
    }

    /// Run bootstrap, warmup, scenarios and the load sweep.
    pub fn run(&self) -> ExperimentRun {
        let clock = Instant::now();
        let harness = &self.config.harness;

        self.logger.send(ActivityEvent::RunStarted {
            experiment: harness.experiment_name.clone(),
            target: self.transport.describe(),
            config_hash: self
                .config
                .stable_hash()
                .unwrap_or_else(|_| "unknown".to_string()),
        });

        let token = self.bootstrap_token();
        self.warmup(token.as_deref());

        let ctx = RunContext {
            transport: self.transport,
            cancel: &self.cancel,
            logger: &self.logger,
            max_workers: harness.max_workers,
            unreachable_abort_after: harness.unreachable_abort_after,
            progress_every: harness.progress_every,
        };
        let call_timeout = Duration::from_millis(harness.call_timeout_ms);
        let scenario = |name: &str, probe: Arc<dyn Probe>, repetitions: usize| {
            ScenarioConfig::new(name, probe, repetitions)
                .with_concurrency(harness.concurrency)
                .with_call_timeout(call_timeout)
        };

        let mut scenarios = Vec::with_capacity(5);

        let login: Arc<dyn Probe> = Arc::new(LoginProbe {
            api: self.api.clone(),
            credentials: self.config.target.auth_probe.clone(),
        });
        scenarios.push(run_scenario(
            &scenario(AUTHENTICATION_LATENCY, login, harness.auth_iterations),
            &ctx,
        ));

        let list: Arc<dyn Probe> = Arc::new(ListProbe::new(self.api.clone(), token.clone()));
        scenarios.push(run_scenario(
            &scenario(PATIENT_LIST_LATENCY, list, harness.test_requests),
            &ctx,
        ));

        scenarios.push(self.detail_scenario(token.as_deref(), &ctx, call_timeout, &scenario));

        let search: Arc<dyn Probe> = Arc::new(SearchProbe {
            api: self.api.clone(),
            token: token.clone(),
            terms: self.config.target.search_terms.clone(),
        });
        scenarios.push(run_scenario(
            &scenario(PATIENT_SEARCH_LATENCY, search, harness.test_requests),
            &ctx,
        ));

        let end_to_end: Arc<dyn Probe> = Arc::new(EndToEndProbe {
            api: self.api.clone(),
            credentials: self.config.target.end_to_end.clone(),
        });
        scenarios.push(run_scenario(
            &scenario(END_TO_END_LATENCY, end_to_end, harness.end_to_end_iterations),
            &ctx,
        ));

        let load = self.config.load.enabled.then(|| {
            let api = self.api.clone();
            let token = token.clone();
            run_load_sweep(
                &LoadSettings::from(&self.config.load),
                move |users| -> Arc<dyn Probe> {
                    Arc::new(
                        ListProbe::new(api.clone(), token.clone())
                            .labeled("requests", format!("{users} concurrent users")),
                    )
                },
                &ctx,
            )
        });

        let abort_reason = self.abort_reason(&scenarios, load.as_ref());
        if let Some(reason) = &abort_reason {
            self.logger.send(ActivityEvent::RunAborted {
                reason: reason.clone(),
            });
        }

        ExperimentRun {
            experiment: harness.experiment_name.clone(),
            server_label: self.config.target.server_label(),
            finished_at: Utc::now(),
            duration: clock.elapsed(),
            run_status: if abort_reason.is_some() {
                RunStatus::Aborted
            } else {
                RunStatus::Completed
            },
            abort_reason,
            scenarios,
            load,
        }
    }

    /// Session token for the read scenarios. Failure is logged, never fatal.
    fn bootstrap_token(&self) -> Option<String> {
        let timeout = call_budget(
            Duration::from_millis(self.config.harness.call_timeout_ms),
            &self.cancel,
        );
        let call = timed_call(
            self.transport,
            &self.api.login(&self.config.target.session, timeout),
        );
        let elapsed_ms = call.elapsed_ms();
        match call.result.and_then(|response| extract_token(&response)) {
            Ok(token) => {
                self.logger.send(ActivityEvent::AuthBootstrap {
                    ok: true,
                    details: format!(
                        "user={} login_ms={elapsed_ms:.2}",
                        self.config.target.session.username
                    ),
                });
                Some(token)
            }
            Err(error) => {
                self.logger.send(ActivityEvent::AuthBootstrap {
                    ok: false,
                    details: format!(
                        "user={} continuing without token: {error}",
                        self.config.target.session.username
                    ),
                });
                None
            }
        }
    }

    /// Untimed requests to prime caches and connection pools. Errors are ignored.
    fn warmup(&self, token: Option<&str>) {
        let rounds = self.config.harness.warmup_rounds;
        let timeout = call_budget(
            Duration::from_millis(self.config.harness.warmup_timeout_ms),
            &self.cancel,
        );
        let started = Instant::now();
        let mut failures = 0_u64;
        'rounds: for _ in 0..rounds {
            for request in self.api.warmup(token, timeout) {
                if self.cancel.is_cancelled() {
                    break 'rounds;
                }
                if self
                    .transport
                    .send(&request)
                    .and_then(ApiResponse::ensure_ok)
                    .is_err()
                {
                    failures += 1;
                }
            }
        }
        self.logger.send(ActivityEvent::WarmupCompleted {
            rounds,
            failures,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        });
    }

    /// Discover patient ids, then time detail requests rotating through them.
    fn detail_scenario<F>(
        &self,
        token: Option<&str>,
        ctx: &RunContext<'_>,
        call_timeout: Duration,
        scenario: &F,
    ) -> ScenarioOutcome
    where
        F: Fn(&str, Arc<dyn Probe>, usize) -> ScenarioConfig,
    {
        let placeholder = DetailProbe {
            api: self.api.clone(),
            token: token.map(str::to_string),
            ids: Vec::new(),
        };
        let specs = placeholder.components();
        if let Some(reason) = self.cancel.reason() {
            return ScenarioOutcome::not_run(PATIENT_DETAIL_LATENCY, &specs, reason.describe());
        }

        let discovery = self
            .transport
            .send(&self.api.list_patients(token, call_budget(call_timeout, &self.cancel)))
            .and_then(ApiResponse::ensure_ok)
            .and_then(|response| {
                extract_patient_ids(&response, self.config.harness.detail_id_pool)
            });
        let ids = match discovery {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => {
                return self.setup_failed(&specs, "patient list returned no patients");
            }
            Err(error) => {
                return self.setup_failed(&specs, &format!("patient id discovery failed: {error}"));
            }
        };

        let probe: Arc<dyn Probe> = Arc::new(DetailProbe { ids, ..placeholder });
        run_scenario(
            &scenario(PATIENT_DETAIL_LATENCY, probe, self.config.harness.test_requests),
            ctx,
        )
    }

    fn setup_failed(
        &self,
        specs: &[ComponentSpec],
        reason: &str,
    ) -> ScenarioOutcome {
        let outcome = ScenarioOutcome::errored(PATIENT_DETAIL_LATENCY, specs, reason);
        self.logger.send(ActivityEvent::ScenarioCompleted {
            scenario: PATIENT_DETAIL_LATENCY.to_string(),
            status: outcome.status_label().to_string(),
            attempted: 0,
            errors: 0,
            p95_ms: None,
            duration_ms: 0.0,
        });
        outcome
    }

    /// `Some` when any scenario or load level was cut short.
    fn abort_reason(&self, scenarios: &[ScenarioOutcome], load: Option<&LoadSweep>) -> Option<String> {
        let scenario_cut = scenarios.iter().any(|s| {
            matches!(
                s.status,
                ScenarioStatus::Aborted(_) | ScenarioStatus::NotRun(_)
            )
        });
        let load_cut = load.is_some_and(|sweep| {
            sweep
                .levels
                .iter()
                .any(|l| matches!(l.entry.status(), "aborted" | "not_run"))
        });
        (scenario_cut || load_cut).then(|| {
            self.cancel
                .reason()
                .map_or("run interrupted", |r| r.describe())
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::scenario::tests::FakeTransport;
    use crate::report::{PerformanceStatus, ScenarioResult};

    fn small_config() -> Config {
        let mut config = Config::default();
        config.target.server_ip = "10.0.0.5".to_string();
        config.harness.warmup_rounds = 1;
        config.harness.test_requests = 6;
        config.harness.auth_iterations = 3;
        config.harness.end_to_end_iterations = 3;
        config.load.levels = vec![2, 1];
        config.load.requests_per_user = 2;
        config
    }

    fn experiment<'a>(config: &'a Config, transport: &'a FakeTransport) -> LatencyExperiment<'a> {
        LatencyExperiment::new(
            config,
            transport,
            CancelToken::new(),
            ActivityLoggerHandle::disabled(),
        )
    }

    #[test]
    fn full_run_measures_every_scenario_in_order() {
        let config = small_config();
        let transport = FakeTransport::healthy();
        let run = experiment(&config, &transport).run();

        let names: Vec<&str> = run.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            [
                AUTHENTICATION_LATENCY,
                PATIENT_LIST_LATENCY,
                PATIENT_DETAIL_LATENCY,
                PATIENT_SEARCH_LATENCY,
                END_TO_END_LATENCY
            ]
        );
        assert!(run.scenarios.iter().all(|s| s.status == ScenarioStatus::Completed));
        assert_eq!(run.run_status, RunStatus::Completed);
        let load = run.load.as_ref().unwrap();
        assert_eq!(load.levels.iter().map(|l| l.users).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(run.server_label, "10.0.0.5");
    }

    #[test]
    fn detail_requests_rotate_discovered_ids() {
        let config = small_config();
        let transport = FakeTransport::healthy();
        experiment(&config, &transport).run();
        let paths = transport.paths();
        assert!(paths.iter().any(|p| p == "/patients/patients/1/"));
        assert!(paths.iter().any(|p| p == "/patients/patients/2/"));
    }

    #[test]
    fn failed_discovery_marks_detail_errored() {
        let config = small_config();
        let transport = FakeTransport {
            list_status: 500,
            ..FakeTransport::healthy()
        };
        let run = experiment(&config, &transport).run();
        let detail = run.scenario(PATIENT_DETAIL_LATENCY).unwrap();
        assert!(matches!(detail.status, ScenarioStatus::Errored(ref r) if r.contains("discovery")));
        // Other scenarios still ran.
        assert_eq!(
            run.scenario(PATIENT_SEARCH_LATENCY).unwrap().status,
            ScenarioStatus::Completed
        );
    }

    #[test]
    fn cancelled_run_is_aborted_with_not_run_scenarios() {
        let config = small_config();
        let transport = FakeTransport::healthy();
        let cancel = CancelToken::new();
        cancel.cancel();
        let run = LatencyExperiment::new(
            &config,
            &transport,
            cancel,
            ActivityLoggerHandle::disabled(),
        )
        .run();
        assert_eq!(run.run_status, RunStatus::Aborted);
        assert_eq!(run.abort_reason.as_deref(), Some("cancelled by operator"));
        assert!(
            run.scenarios
                .iter()
                .all(|s| matches!(s.status, ScenarioStatus::NotRun(_)))
        );
    }

    #[test]
    fn disabled_load_sweep_is_omitted() {
        let mut config = small_config();
        config.load.enabled = false;
        let transport = FakeTransport::healthy();
        let report = experiment(&config, &transport).execute();
        assert!(report.test_results.get(CONCURRENT_LOAD_TEST).is_none());
        assert!(report.load_analysis.is_empty());
    }

    #[test]
    fn execute_evaluates_default_requirements() {
        let config = small_config();
        let transport = FakeTransport::healthy();
        let report = experiment(&config, &transport).execute();

        let keys: Vec<&str> = report.asr_compliance.keys().collect();
        assert_eq!(keys, ["end_to_end_p95", "jwt_validation", "database_query"]);
        assert_eq!(report.summary.total_asrs_evaluated, 3);
        // An in-memory target answers far below every threshold.
        assert_eq!(report.summary.overall_performance_status, PerformanceStatus::Pass);
        assert!(matches!(
            report.test_results.get(AUTHENTICATION_LATENCY),
            Some(ScenarioResult::Components(_))
        ));
        assert!(matches!(
            report.test_results.get(PATIENT_LIST_LATENCY),
            Some(ScenarioResult::Flat(_))
        ));
        assert!(matches!(
            report.test_results.get(CONCURRENT_LOAD_TEST),
            Some(ScenarioResult::LoadLevels(_))
        ));
    }

    #[test]
    fn unreachable_target_still_produces_a_report() {
        let config = small_config();
        let transport = FakeTransport {
            unreachable: true,
            ..FakeTransport::healthy()
        };
        let report = experiment(&config, &transport).execute();
        assert_eq!(report.run_status, RunStatus::Completed);
        assert_eq!(report.summary.compliant_asrs, 0);
        assert_eq!(report.summary.overall_performance_status, PerformanceStatus::Fail);
    }
}
