//! Run-wide cancellation: a global deadline plus an operator stop flag.
//!
//! The stop flag is an `Arc<AtomicBool>` so `signal-hook` can set it directly
//! from a SIGINT/SIGTERM handler. Workers poll `is_cancelled()` before every
//! call; an in-flight call is bounded by its own per-call timeout.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Deadline,
    Operator,
}

impl CancelReason {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Deadline => "global run timeout elapsed",
            Self::Operator => "cancelled by operator",
        }
    }
}

/// Cheaply-cloneable cancellation state shared by the orchestrator and workers.
#[derive(Clone, Debug)]
pub struct CancelToken {
    stop_flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token with no deadline that only trips on `cancel()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stop_flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A token whose deadline is `timeout` from now. A zero timeout means none.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut token = Self::new();
        if !timeout.is_zero() {
            token.deadline = Instant::now().checked_add(timeout);
        }
        token
    }

    /// Register SIGINT/SIGTERM to trip this token.
    ///
    /// Registration is best-effort; failures are logged to stderr but not fatal.
    #[cfg(feature = "signals")]
    pub fn register_signals(&self) {
        use signal_hook::consts::{SIGINT, SIGTERM};

        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.stop_flag)) {
            eprintln!("[ASRH-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.stop_flag)) {
            eprintln!("[ASRH-SIGNAL] failed to register SIGINT: {e}");
        }
    }

    /// Programmatically request cancellation.
    pub fn cancel(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// The reason the run should stop, if any. Operator cancellation wins.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.stop_flag.load(Ordering::Relaxed) {
            return Some(CancelReason::Operator);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::Deadline),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Time left until the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
