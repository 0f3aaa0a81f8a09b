//! Concurrent load sweep: one scenario per user level, strictly sequential.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::config::LoadConfig;
use crate::harness::runner::{RunContext, run_scenario};
use crate::harness::scenario::{Probe, ScenarioConfig};
use crate::logger::activity::ActivityEvent;
use crate::stats::entry::SummaryEntry;

/// Sweep parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    pub levels: Vec<usize>,
    pub requests_per_user: usize,
    pub call_timeout: Duration,
    pub p95_ceiling_ms: f64,
    pub min_success_rate_pct: f64,
}

impl From<&LoadConfig> for LoadSettings {
    fn from(config: &LoadConfig) -> Self {
        Self {
            levels: config.levels.clone(),
            requests_per_user: config.requests_per_user,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            p95_ceiling_ms: config.p95_ceiling_ms,
            min_success_rate_pct: config.min_success_rate_pct,
        }
    }
}

/// Outcome of one concurrency level.
///
/// The summary entry is flattened, so a measured level reads like a flat
/// summary plus `users`, `success_rate` and `acceptable_performance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadLevelResult {
    pub users: usize,
    #[serde(flatten)]
    pub entry: SummaryEntry,
    /// Successful calls over attempted calls, in percent. 0 when nothing ran.
    pub success_rate: f64,
    pub acceptable_performance: bool,
}

impl LoadLevelResult {
    /// Report key for this level, e.g. `20_users`.
    pub fn key(&self) -> String {
        level_key(self.users)
    }

    pub fn p95(&self) -> Option<f64> {
        self.entry.summary().map(|s| s.p95)
    }

    pub fn errors(&self) -> u64 {
        self.entry.counts().map_or(0, |(_, errors)| errors)
    }

    pub fn attempted(&self) -> u64 {
        self.entry.counts().map_or(0, |(attempted, _)| attempted)
    }
}

/// All levels of a sweep, ascending by users.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadSweep {
    pub levels: Vec<LoadLevelResult>,
}

#[must_use]
pub fn level_key(users: usize) -> String {
    format!("{users}_users")
}

/// Levels in run order: ascending, duplicates and zero removed.
#[must_use]
pub fn normalize_levels(levels: &[usize]) -> Vec<usize> {
    let mut levels: Vec<usize> = levels.iter().copied().filter(|&n| n > 0).collect();
    levels.sort_unstable();
    levels.dedup();
    levels
}

/// `success_rate ≥ floor && p95 < ceiling`; false without data.
#[must_use]
pub fn acceptable_performance(
    entry: &SummaryEntry,
    success_rate: f64,
    settings: &LoadSettings,
) -> bool {
    entry.summary().is_some_and(|summary| {
        success_rate >= settings.min_success_rate_pct && summary.p95 < settings.p95_ceiling_ms
    })
}

/// Run each level after the previous one has fully drained.
///
/// Level N dispatches `N · requests_per_user` calls from `probe_for(N)` on
/// `min(N, max_workers)` workers.
pub fn run_load_sweep<F>(settings: &LoadSettings, probe_for: F, ctx: &RunContext<'_>) -> LoadSweep
where
    F: Fn(usize) -> Arc<dyn Probe>,
{
    let mut sweep = LoadSweep::default();
    for users in normalize_levels(&settings.levels) {
        let scenario = ScenarioConfig::new(
            level_key(users),
            probe_for(users),
            users.saturating_mul(settings.requests_per_user),
        )
        .with_concurrency(users)
        .with_call_timeout(settings.call_timeout);

        let outcome = run_scenario(&scenario, ctx);
        let entry = outcome
            .components
            .into_iter()
            .next()
            .map_or_else(
                || SummaryEntry::not_run(&scenario.name, "probe reported no components"),
                |component| component.entry,
            );
        let success_rate = success_rate(&entry);
        let level = LoadLevelResult {
            users,
            acceptable_performance: acceptable_performance(&entry, success_rate, settings),
            success_rate,
            entry,
        };

        ctx.logger.send(ActivityEvent::LoadLevelCompleted {
            users,
            attempted: level.attempted(),
            errors: level.errors(),
            p95_ms: level.p95(),
            acceptable: level.acceptable_performance,
        });
        sweep.levels.push(level);
    }
    sweep
}

fn success_rate(entry: &SummaryEntry) -> f64 {
    match entry.counts() {
        Some((attempted, errors)) if attempted > 0 => {
            attempted.saturating_sub(errors) as f64 / attempted as f64 * 100.0
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EndpointsConfig;
    use crate::harness::cancel::CancelToken;
    use crate::harness::scenario::ListProbe;
    use crate::harness::scenario::tests::FakeTransport;
    use crate::logger::activity::ActivityLoggerHandle;
    use crate::target::api::PatientApi;

    fn settings(levels: Vec<usize>) -> LoadSettings {
        LoadSettings {
            levels,
            requests_per_user: 5,
            call_timeout: Duration::from_secs(1),
            p95_ceiling_ms: 1_000.0,
            min_success_rate_pct: 99.0,
        }
    }

    fn list_probe(users: usize) -> Arc<dyn Probe> {
        Arc::new(
            ListProbe::new(PatientApi::new(EndpointsConfig::default()), Some("tok".to_string()))
                .labeled("requests", format!("{users} concurrent users")),
        )
    }

    fn run(transport: &FakeTransport, levels: Vec<usize>) -> LoadSweep {
        let cancel = CancelToken::new();
        let logger = ActivityLoggerHandle::disabled();
        let ctx = RunContext {
            transport,
            cancel: &cancel,
            logger: &logger,
            max_workers: 8,
            unreachable_abort_after: 5,
            progress_every: 0,
        };
        run_load_sweep(&settings(levels), list_probe, &ctx)
    }

    #[test]
    fn levels_are_sorted_and_deduplicated() {
        assert_eq!(normalize_levels(&[20, 1, 5, 5, 0, 10]), vec![1, 5, 10, 20]);
    }

    #[test]
    fn sweep_runs_levels_in_ascending_order() {
        let transport = FakeTransport::healthy();
        let sweep = run(&transport, vec![10, 1, 5]);
        let users: Vec<usize> = sweep.levels.iter().map(|l| l.users).collect();
        assert_eq!(users, [1, 5, 10]);
        assert_eq!(transport.paths().len(), (1 + 5 + 10) * 5);
        for level in &sweep.levels {
            assert_eq!(level.attempted(), level.users as u64 * 5);
            assert!((level.success_rate - 100.0).abs() < f64::EPSILON);
            assert!(level.acceptable_performance);
        }
    }

    #[test]
    fn failing_level_is_not_acceptable() {
        let transport = FakeTransport {
            list_status: 500,
            ..FakeTransport::healthy()
        };
        let sweep = run(&transport, vec![5]);
        let level = &sweep.levels[0];
        assert_eq!(level.entry.status(), "no_data");
        assert_eq!(level.errors(), 25);
        assert!(level.success_rate.abs() < f64::EPSILON);
        assert!(!level.acceptable_performance);
    }

    #[test]
    fn acceptable_requires_both_thresholds() {
        let s = settings(vec![1]);
        let fast = SummaryEntry::from_samples("x", &[100.0, 120.0], 2, 0);
        let slow = SummaryEntry::from_samples("x", &[1_500.0, 1_600.0], 2, 0);
        assert!(acceptable_performance(&fast, 100.0, &s));
        assert!(!acceptable_performance(&fast, 98.0, &s));
        assert!(!acceptable_performance(&slow, 100.0, &s));
    }

    #[test]
    fn level_serializes_flat_with_native_booleans() {
        let level = LoadLevelResult {
            users: 20,
            entry: SummaryEntry::from_samples("20 concurrent users", &[100.0, 200.0], 2, 0),
            success_rate: 100.0,
            acceptable_performance: true,
        };
        let value = serde_json::to_value(&level).unwrap();
        assert_eq!(value["users"], 20);
        assert_eq!(value["status"], "measured");
        assert_eq!(value["errors"], 0);
        assert_eq!(value["attempted"], 2);
        assert!(value["acceptable_performance"].is_boolean());
        assert_eq!(level.key(), "20_users");

        let back: LoadLevelResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, level);
    }
}
