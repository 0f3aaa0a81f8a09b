//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compliance::requirement::{Operator, Requirement, Statistic};
use crate::core::errors::{AsrhError, Result};

/// Full harness configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub harness: HarnessConfig,
    pub load: LoadConfig,
    pub paths: PathsConfig,
    /// Latency requirements judged against the measured statistics.
    pub requirements: Vec<Requirement>,
}

/// Where the target service lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    /// Bare host or IP; used to derive `base_url` when that is empty.
    pub server_ip: String,
    /// Full base URL, e.g. `http://35.202.107.19`. Takes precedence over `server_ip`.
    pub base_url: String,
    pub user_agent: String,
    pub endpoints: EndpointsConfig,
    /// Account used for the long-lived session token.
    pub session: Credentials,
    /// Account used by the authentication scenario.
    pub auth_probe: Credentials,
    /// Account used by the end-to-end scenario.
    pub end_to_end: Credentials,
    /// Terms rotated through by the search scenario.
    pub search_terms: Vec<String>,
}

/// Endpoint paths relative to the base URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointsConfig {
    pub login: String,
    pub patients: String,
    /// Detail path template; `{id}` is replaced by the patient id.
    pub patient_detail: String,
    pub patient_search: String,
    pub health: String,
    /// Hit (untimed) during warmup.
    pub warmup: Vec<String>,
}

/// Username/password pair posted to the login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Scenario sizing, timeouts, and worker-pool limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    pub experiment_name: String,
    pub warmup_rounds: usize,
    pub warmup_timeout_ms: u64,
    /// Repetitions for the list, detail, and search scenarios.
    pub test_requests: usize,
    pub auth_iterations: usize,
    pub end_to_end_iterations: usize,
    /// Concurrent callers for the fixed scenarios (1 = sequential).
    pub concurrency: usize,
    /// How many patient ids the detail scenario rotates through.
    pub detail_id_pool: usize,
    pub call_timeout_ms: u64,
    /// Ceiling on worker threads for any single scenario or load level.
    pub max_workers: usize,
    /// Global run deadline in seconds (0 disables).
    pub run_timeout_secs: u64,
    /// Consecutive connection failures (with no success yet) that abort a scenario.
    pub unreachable_abort_after: usize,
    /// Emit a progress event every N completed calls.
    pub progress_every: usize,
}

/// Concurrency sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoadConfig {
    pub enabled: bool,
    /// Simulated concurrent users per level; run in ascending order.
    pub levels: Vec<usize>,
    pub requests_per_user: usize,
    pub call_timeout_ms: u64,
    /// Acceptable-performance ceiling for a level's p95.
    pub p95_ceiling_ms: f64,
    /// Acceptable-performance floor for a level's success rate.
    pub min_success_rate_pct: f64,
}

/// Filesystem paths used by asrh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub report: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            harness: HarnessConfig::default(),
            load: LoadConfig::default(),
            paths: PathsConfig::default(),
            requirements: default_requirements(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            server_ip: String::new(),
            base_url: String::new(),
            user_agent: format!("asrh/{}", env!("CARGO_PKG_VERSION")),
            endpoints: EndpointsConfig::default(),
            session: Credentials::new("testuser1", "test123"),
            auth_probe: Credentials::new("testuser2", "test123"),
            end_to_end: Credentials::new("patient_user", "patient123"),
            search_terms: [
                "Maria",
                "Carlos",
                "Ana",
                "Luis",
                "Jose",
                "Gonzalez",
                "Rodriguez",
                "Martinez",
                "Lopez",
                "Garcia",
                "@gmail",
                "555",
                "123",
            ]
            .iter()
            .map(|term| (*term).to_string())
            .collect(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            login: "/auth/login/".to_string(),
            patients: "/patients/patients/".to_string(),
            patient_detail: "/patients/patients/{id}/".to_string(),
            patient_search: "/patients/patients/search/".to_string(),
            health: "/patients/health/".to_string(),
            warmup: vec![
                "/patients/patients/".to_string(),
                "/patients/health/".to_string(),
                "/patients/stats/".to_string(),
            ],
        }
    }
}

impl Credentials {
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            experiment_name: "Latency Validation (ASR-3)".to_string(),
            warmup_rounds: 10,
            warmup_timeout_ms: 5_000,
            test_requests: 100,
            auth_iterations: 20,
            end_to_end_iterations: 50,
            concurrency: 1,
            detail_id_pool: 10,
            call_timeout_ms: 10_000,
            max_workers: 64,
            run_timeout_secs: 0,
            unreachable_abort_after: 5,
            progress_every: 20,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: vec![1, 5, 10, 20],
            requests_per_user: 5,
            call_timeout_ms: 15_000,
            p95_ceiling_ms: 1_000.0,
            min_success_rate_pct: 99.0,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[ASRH-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("asrh").join("config.toml");
        let data = home_dir.join(".local").join("share").join("asrh");
        Self {
            config_file: cfg,
            report: PathBuf::from("latency_experiment_results.json"),
            activity_log: data.join("activity.jsonl"),
        }
    }
}

/// The three latency requirements evaluated by default.
#[must_use]
pub fn default_requirements() -> Vec<Requirement> {
    vec![
        Requirement {
            key: "end_to_end_p95".to_string(),
            scenario: "end_to_end_latency".to_string(),
            component: Some("end_to_end".to_string()),
            statistic: Statistic::P95,
            operator: Operator::Lt,
            threshold: 800.0,
            unit: "ms".to_string(),
        },
        Requirement {
            key: "jwt_validation".to_string(),
            scenario: "authentication_latency".to_string(),
            component: Some("jwt_validation".to_string()),
            statistic: Statistic::Mean,
            operator: Operator::Lt,
            threshold: 250.0,
            unit: "ms".to_string(),
        },
        Requirement {
            key: "database_query".to_string(),
            scenario: "patient_detail_latency".to_string(),
            component: None,
            statistic: Statistic::Mean,
            operator: Operator::Lt,
            threshold: 200.0,
            unit: "ms".to_string(),
        },
    ]
}

impl TargetConfig {
    /// Base URL with no trailing slash: explicit `base_url`, else `http://{server_ip}`.
    pub fn resolved_base_url(&self) -> Result<String> {
        let explicit = self.base_url.trim();
        if !explicit.is_empty() {
            return Ok(explicit.trim_end_matches('/').to_string());
        }
        let ip = self.server_ip.trim();
        if ip.is_empty() {
            return Err(AsrhError::InvalidConfig {
                details: "target.server_ip or target.base_url must be set".to_string(),
            });
        }
        Ok(format!("http://{}", ip.trim_end_matches('/')))
    }

    /// Identifier recorded as `server_ip` in the report.
    #[must_use]
    pub fn server_label(&self) -> String {
        if self.server_ip.trim().is_empty() {
            self.base_url.trim().to_string()
        } else {
            self.server_ip.trim().to_string()
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| AsrhError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(AsrhError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // target
        if let Some(raw) = lookup("ASRH_SERVER_IP") {
            self.target.server_ip = raw;
        }
        if let Some(raw) = lookup("ASRH_BASE_URL") {
            self.target.base_url = raw;
        }

        // harness
        for (name, slot) in [
            ("ASRH_HARNESS_WARMUP_ROUNDS", &mut self.harness.warmup_rounds),
            ("ASRH_HARNESS_TEST_REQUESTS", &mut self.harness.test_requests),
            ("ASRH_HARNESS_AUTH_ITERATIONS", &mut self.harness.auth_iterations),
            (
                "ASRH_HARNESS_END_TO_END_ITERATIONS",
                &mut self.harness.end_to_end_iterations,
            ),
            ("ASRH_HARNESS_CONCURRENCY", &mut self.harness.concurrency),
            ("ASRH_HARNESS_MAX_WORKERS", &mut self.harness.max_workers),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env_usize(name, &raw)?;
            }
        }
        for (name, slot) in [
            ("ASRH_HARNESS_CALL_TIMEOUT_MS", &mut self.harness.call_timeout_ms),
            ("ASRH_HARNESS_RUN_TIMEOUT_SECS", &mut self.harness.run_timeout_secs),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env_u64(name, &raw)?;
            }
        }

        // load
        if let Some(raw) = lookup("ASRH_LOAD_ENABLED") {
            self.load.enabled = parse_env_bool("ASRH_LOAD_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("ASRH_LOAD_LEVELS") {
            self.load.levels = parse_levels(&raw).map_err(|details| AsrhError::ConfigParse {
                context: "env",
                details: format!("ASRH_LOAD_LEVELS={raw:?}: {details}"),
            })?;
        }
        if let Some(raw) = lookup("ASRH_LOAD_REQUESTS_PER_USER") {
            self.load.requests_per_user = parse_env_usize("ASRH_LOAD_REQUESTS_PER_USER", &raw)?;
        }
        if let Some(raw) = lookup("ASRH_LOAD_CALL_TIMEOUT_MS") {
            self.load.call_timeout_ms = parse_env_u64("ASRH_LOAD_CALL_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("ASRH_LOAD_P95_CEILING_MS") {
            self.load.p95_ceiling_ms = parse_env_f64("ASRH_LOAD_P95_CEILING_MS", &raw)?;
        }
        if let Some(raw) = lookup("ASRH_LOAD_MIN_SUCCESS_RATE_PCT") {
            self.load.min_success_rate_pct =
                parse_env_f64("ASRH_LOAD_MIN_SUCCESS_RATE_PCT", &raw)?;
        }

        // paths
        if let Some(raw) = lookup("ASRH_REPORT_PATH") {
            self.paths.report = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("ASRH_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Sort and dedup load levels; trim endpoint whitespace.
    fn normalize(&mut self) {
        self.load.levels.sort_unstable();
        self.load.levels.dedup();
        self.target.server_ip = self.target.server_ip.trim().to_string();
        self.target.base_url = self.target.base_url.trim().to_string();
    }

    /// Check value ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        for (name, val) in [
            ("harness.test_requests", self.harness.test_requests),
            ("harness.auth_iterations", self.harness.auth_iterations),
            (
                "harness.end_to_end_iterations",
                self.harness.end_to_end_iterations,
            ),
            ("harness.concurrency", self.harness.concurrency),
            ("harness.detail_id_pool", self.harness.detail_id_pool),
            ("harness.max_workers", self.harness.max_workers),
            (
                "harness.unreachable_abort_after",
                self.harness.unreachable_abort_after,
            ),
            ("harness.progress_every", self.harness.progress_every),
            ("load.requests_per_user", self.load.requests_per_user),
        ] {
            if val == 0 {
                return Err(AsrhError::InvalidConfig {
                    details: format!("{name} must be >= 1"),
                });
            }
        }

        for (name, val) in [
            ("harness.call_timeout_ms", self.harness.call_timeout_ms),
            ("harness.warmup_timeout_ms", self.harness.warmup_timeout_ms),
            ("load.call_timeout_ms", self.load.call_timeout_ms),
        ] {
            if val == 0 {
                return Err(AsrhError::InvalidConfig {
                    details: format!("{name} must be > 0"),
                });
            }
        }

        if self.load.enabled {
            if self.load.levels.is_empty() {
                return Err(AsrhError::InvalidConfig {
                    details: "load.levels must not be empty when load.enabled=true".to_string(),
                });
            }
            if self.load.levels.contains(&0) {
                return Err(AsrhError::InvalidConfig {
                    details: "load.levels entries must be >= 1".to_string(),
                });
            }
        }
        if !(self.load.p95_ceiling_ms.is_finite() && self.load.p95_ceiling_ms > 0.0) {
            return Err(AsrhError::InvalidConfig {
                details: format!(
                    "load.p95_ceiling_ms must be a positive number, got {}",
                    self.load.p95_ceiling_ms
                ),
            });
        }
        if !(0.0..=100.0).contains(&self.load.min_success_rate_pct) {
            return Err(AsrhError::InvalidConfig {
                details: format!(
                    "load.min_success_rate_pct must be in [0, 100], got {}",
                    self.load.min_success_rate_pct
                ),
            });
        }

        if self.target.search_terms.is_empty() {
            return Err(AsrhError::InvalidConfig {
                details: "target.search_terms must not be empty".to_string(),
            });
        }
        if !self.target.endpoints.patient_detail.contains("{id}") {
            return Err(AsrhError::InvalidConfig {
                details: "target.endpoints.patient_detail must contain an {id} placeholder"
                    .to_string(),
            });
        }
        let endpoints = &self.target.endpoints;
        for path in [
            &endpoints.login,
            &endpoints.patients,
            &endpoints.patient_detail,
            &endpoints.patient_search,
            &endpoints.health,
        ]
        .into_iter()
        .chain(endpoints.warmup.iter())
        {
            if !path.starts_with('/') {
                return Err(AsrhError::InvalidConfig {
                    details: format!("endpoint path {path:?} must start with '/'"),
                });
            }
        }

        let mut keys = HashSet::new();
        for req in &self.requirements {
            req.validate()?;
            if !keys.insert(req.key.as_str()) {
                return Err(AsrhError::InvalidConfig {
                    details: format!("duplicate requirement key {:?}", req.key),
                });
            }
        }

        Ok(())
    }
}

/// Parse a comma-separated list of concurrency levels.
pub fn parse_levels(raw: &str) -> std::result::Result<Vec<usize>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|error| format!("{part:?}: {error}"))
        })
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_usize(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|error| AsrhError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| AsrhError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_f64(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|error| AsrhError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| AsrhError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
