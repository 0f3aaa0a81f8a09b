#![allow(dead_code)]

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_asrh") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "asrh.exe" } else { "asrh" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve asrh binary path for integration test"),
    }
}

/// Run the CLI with `home` as `$HOME`, so no user config leaks into the case.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, home, args, &[])
}

pub fn run_cli_case_with_env(
    case_name: &str,
    home: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> CmdResult {
    let root = std::env::temp_dir().join("asrh-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", home)
        .env("RUST_BACKTRACE", "1")
        .env_remove("ASRH_SERVER_IP")
        .env_remove("ASRH_BASE_URL")
        .env_remove("ASRH_OUTPUT_FORMAT");
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("execute asrh command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Minimal HTTP/1.1 stand-in for the patient-records API.
///
/// Every connection is answered on its own thread with `Connection: close`.
/// Routes follow the default endpoint layout.
pub struct StubServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, Copy)]
pub struct StubBehavior {
    pub login_status: u16,
    pub list_status: u16,
    pub delay: Duration,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            login_status: 200,
            list_status: 200,
            delay: Duration::ZERO,
        }
    }
}

impl StubServer {
    pub fn start(behavior: StubBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let addr = listener.local_addr().expect("stub server addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = handle_connection(stream, behavior);
                });
            }
        });
        Self { addr, hits }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Host and port, usable as `--server-ip`.
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn handle_connection(stream: TcpStream, behavior: StubBehavior) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    let path = target.split('?').next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    if !behavior.delay.is_zero() {
        thread::sleep(behavior.delay);
    }

    let (status, payload) = route(&method, &path, behavior);
    let reason = if status == 200 { "OK" } else { "Error" };
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    )?;
    stream.flush()
}

fn route(method: &str, path: &str, behavior: StubBehavior) -> (u16, String) {
    match (method, path) {
        ("POST", "/auth/login/") => {
            if behavior.login_status == 200 {
                (200, r#"{"access":"stub-token","refresh":"stub-refresh"}"#.to_string())
            } else {
                (behavior.login_status, r#"{"detail":"denied"}"#.to_string())
            }
        }
        ("GET", "/patients/patients/") | ("GET", "/patients/patients/search/") => {
            if behavior.list_status == 200 {
                (
                    200,
                    r#"{"count":3,"results":[{"id":1,"name":"Maria"},{"id":2,"name":"Carlos"},{"id":3,"name":"Ana"}]}"#
                        .to_string(),
                )
            } else {
                (behavior.list_status, r#"{"detail":"unavailable"}"#.to_string())
            }
        }
        ("GET", "/patients/health/") | ("GET", "/patients/stats/") => {
            (200, r#"{"status":"ok"}"#.to_string())
        }
        ("GET", detail) if detail.starts_with("/patients/patients/") => {
            (200, r#"{"id":1,"name":"Maria"}"#.to_string())
        }
        _ => (404, r#"{"detail":"not found"}"#.to_string()),
    }
}

/// Accepts connections and never answers, so every call runs into its timeout.
pub struct HangingServer {
    pub addr: SocketAddr,
}

impl HangingServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind hanging server");
        let addr = listener.local_addr().expect("hanging server addr");
        thread::spawn(move || {
            // Held open, never read or written.
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });
        Self { addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Requirements loose enough for any loopback run to satisfy.
pub const GENEROUS_REQUIREMENTS: &str = r#"
[[requirements]]
key = "end_to_end_p95"
scenario = "end_to_end_latency"
component = "end_to_end"
statistic = "p95"
operator = "<"
threshold = 60000.0

[[requirements]]
key = "patient_list_p95"
scenario = "patient_list_latency"
statistic = "p95"
operator = "<"
threshold = 60000.0
"#;

/// A requirement no real call can meet.
pub const IMPOSSIBLE_REQUIREMENTS: &str = r#"
[[requirements]]
key = "patient_list_p95"
scenario = "patient_list_latency"
statistic = "p95"
operator = "<"
threshold = 0.000001
"#;

/// Config file pointing at `base_url`, sized for fast test runs.
pub fn write_fast_config(dir: &Path, base_url: &str, requirements: &str) -> PathBuf {
    let path = dir.join("asrh.toml");
    let report = dir.join("report.json");
    let activity = dir.join("activity.jsonl");
    let raw = format!(
        r#"[target]
base_url = "{base_url}"

[harness]
warmup_rounds = 1
test_requests = 6
auth_iterations = 3
end_to_end_iterations = 3
concurrency = 2
call_timeout_ms = 3000

[load]
levels = [1, 2]
requests_per_user = 2

[paths]
report = "{}"
activity_log = "{}"
{requirements}"#,
        report.display(),
        activity.display()
    );
    fs::write(&path, raw).expect("write test config");
    path
}
