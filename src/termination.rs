//! Escalating signal-based termination.
//!
//! A single kill is SIGTERM, a bounded wait for exit, then SIGKILL and a second
//! bounded wait. "No such process" counts as success at any step; a permission
//! failure ends the attempt without escalation.

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clock::{elapsed_between, Clock};
use crate::process::ProcessCandidate;

/// Signals the executor sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    Term,
    Kill,
}

impl KillSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillSignal::Term => "SIGTERM",
            KillSignal::Kill => "SIGKILL",
        }
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal-delivery failures the executor distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("no such process")]
    NoSuchProcess,

    #[error("operation not permitted")]
    PermissionDenied,

    #[error("signal delivery failed: {0}")]
    Other(String),
}

/// Sends signals to processes.
pub trait SignalSender: Send + Sync {
    fn send(&self, pid: u32, signal: KillSignal) -> Result<(), SignalError>;

    /// Existence probe using the null signal. No side effects on the target.
    fn probe(&self, pid: u32) -> Result<(), SignalError>;

    /// True unless the probe reports "no such process".
    fn is_alive(&self, pid: u32) -> bool {
        !matches!(self.probe(pid), Err(SignalError::NoSuchProcess))
    }
}

/// [`SignalSender`] using `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignalSender;

impl NixSignalSender {
    fn kill(pid: u32, signal: Option<Signal>) -> Result<(), SignalError> {
        let raw = i32::try_from(pid).map_err(|_| SignalError::NoSuchProcess)?;
        if raw <= 0 {
            // 0 and negatives address process groups.
            return Err(SignalError::Other(format!("refusing to signal pid {pid}")));
        }
        signal::kill(Pid::from_raw(raw), signal).map_err(|e| match e {
            Errno::ESRCH => SignalError::NoSuchProcess,
            Errno::EPERM => SignalError::PermissionDenied,
            other => SignalError::Other(other.desc().to_string()),
        })
    }
}

impl SignalSender for NixSignalSender {
    fn send(&self, pid: u32, signal: KillSignal) -> Result<(), SignalError> {
        let sig = match signal {
            KillSignal::Term => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
        };
        Self::kill(pid, Some(sig))
    }

    fn probe(&self, pid: u32) -> Result<(), SignalError> {
        Self::kill(pid, None)
    }
}

/// Waits for a process to disappear within a deadline.
pub trait ExitWaiter: Send + Sync {
    /// Returns true if `pid` exited before `deadline` elapsed.
    fn await_exit(&self, pid: u32, deadline: Duration) -> bool;
}

/// Polls process existence at a fixed granularity.
pub struct PollingExitWaiter {
    signals: Arc<dyn SignalSender>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl PollingExitWaiter {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(signals: Arc<dyn SignalSender>, clock: Arc<dyn Clock>) -> Self {
        Self {
            signals,
            clock,
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

impl ExitWaiter for PollingExitWaiter {
    fn await_exit(&self, pid: u32, deadline: Duration) -> bool {
        let start = self.clock.now();
        loop {
            if !self.signals.is_alive(pid) {
                return true;
            }
            if elapsed_between(start, self.clock.now()) >= deadline {
                return false;
            }
            self.clock.sleep(self.interval);
        }
    }
}

/// Timing bounds of an escalation.
#[derive(Debug, Clone, Copy)]
pub struct TerminationTimings {
    pub term_timeout: Duration,
    pub kill_timeout: Duration,
    /// Pause between successive kills in a batch.
    pub batch_pacing: Duration,
}

impl Default for TerminationTimings {
    fn default() -> Self {
        Self {
            term_timeout: Duration::from_millis(5000),
            kill_timeout: Duration::from_millis(2000),
            batch_pacing: Duration::from_millis(500),
        }
    }
}

/// Result of one termination attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillOutcome {
    pub pid: u32,
    pub name: String,
    /// "SIGTERM", "SIGKILL" or "NONE".
    pub signal: String,
    pub success: bool,
    /// Estimated memory freed (the candidate's resident memory on success).
    pub memory_mb: f64,
    /// Number of signals attempted (1 or 2).
    pub attempts: u8,
    pub error: Option<String>,
    pub reason: String,
    pub finished_at: DateTime<Utc>,
}

/// Targets a dry run would hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryRunPlan {
    pub targets: Vec<ProcessCandidate>,
    pub estimated_memory_mb: f64,
}

/// Sends SIGTERM, then SIGKILL, and confirms exit.
pub struct TerminationExecutor {
    signals: Arc<dyn SignalSender>,
    waiter: Arc<dyn ExitWaiter>,
    clock: Arc<dyn Clock>,
    timings: TerminationTimings,
}

impl TerminationExecutor {
    pub fn new(
        signals: Arc<dyn SignalSender>,
        waiter: Arc<dyn ExitWaiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            signals,
            waiter,
            clock,
            timings: TerminationTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: TerminationTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Terminates one process with SIGTERM -> SIGKILL escalation.
    pub fn terminate(&self, candidate: &ProcessCandidate, reason: &str) -> KillOutcome {
        let pid = candidate.pid;
        info!(
            "Terminating pid {} ({}, {:.1} MB): {}",
            pid, candidate.name, candidate.memory_mb, reason
        );

        match self.signals.send(pid, KillSignal::Term) {
            Ok(()) => debug!("SIGTERM sent to pid {}", pid),
            Err(SignalError::NoSuchProcess) => {
                info!("pid {} already exited before SIGTERM", pid);
                return self.outcome(candidate, reason, Some(KillSignal::Term), 1, None);
            }
            Err(e) => {
                error!("SIGTERM to pid {} failed: {}", pid, e);
                return self.outcome(candidate, reason, None, 1, Some(format!("SIGTERM: {e}")));
            }
        }

        if self.waiter.await_exit(pid, self.timings.term_timeout) {
            info!("pid {} exited after SIGTERM", pid);
            return self.outcome(candidate, reason, Some(KillSignal::Term), 1, None);
        }

        warn!(
            "pid {} still alive after {:?}, escalating to SIGKILL",
            pid, self.timings.term_timeout
        );

        match self.signals.send(pid, KillSignal::Kill) {
            Ok(()) => debug!("SIGKILL sent to pid {}", pid),
            Err(SignalError::NoSuchProcess) => {
                info!("pid {} exited before SIGKILL", pid);
                return self.outcome(candidate, reason, Some(KillSignal::Term), 2, None);
            }
            Err(e) => {
                error!("SIGKILL to pid {} failed: {}", pid, e);
                return self.outcome(candidate, reason, None, 2, Some(format!("SIGKILL: {e}")));
            }
        }

        if self.waiter.await_exit(pid, self.timings.kill_timeout) {
            info!("pid {} exited after SIGKILL", pid);
            return self.outcome(candidate, reason, Some(KillSignal::Kill), 2, None);
        }

        error!("pid {} did not exit after SIGKILL", pid);
        self.outcome(
            candidate,
            reason,
            None,
            2,
            Some("did not exit after SIGKILL".to_string()),
        )
    }

    /// Terminates up to `max_kills` candidates in order, stopping at the first failure.
    pub fn terminate_batch(
        &self,
        candidates: &[ProcessCandidate],
        reason: &str,
        max_kills: usize,
    ) -> Vec<KillOutcome> {
        let mut outcomes = Vec::new();

        for (i, candidate) in candidates.iter().take(max_kills).enumerate() {
            if i > 0 {
                self.clock.sleep(self.timings.batch_pacing);
            }
            let outcome = self.terminate(candidate, reason);
            let failed = !outcome.success;
            outcomes.push(outcome);
            if failed {
                warn!(
                    "Batch halted after failure on pid {} ({} of {} processed)",
                    candidate.pid,
                    i + 1,
                    candidates.len().min(max_kills)
                );
                break;
            }
        }

        outcomes
    }

    /// Targets and projected memory of a batch, without sending any signal.
    pub fn dry_run(&self, candidates: &[ProcessCandidate], max_kills: usize) -> DryRunPlan {
        dry_run(candidates, max_kills)
    }

    fn outcome(
        &self,
        candidate: &ProcessCandidate,
        reason: &str,
        signal: Option<KillSignal>,
        attempts: u8,
        error: Option<String>,
    ) -> KillOutcome {
        let success = signal.is_some();
        KillOutcome {
            pid: candidate.pid,
            name: candidate.name.clone(),
            signal: signal.map(|s| s.as_str()).unwrap_or("NONE").to_string(),
            success,
            memory_mb: if success { candidate.memory_mb } else { 0.0 },
            attempts,
            error,
            reason: reason.to_string(),
            finished_at: self.clock.now(),
        }
    }
}

/// Targets and projected memory of a batch.
pub fn dry_run(candidates: &[ProcessCandidate], max_kills: usize) -> DryRunPlan {
    let targets: Vec<ProcessCandidate> = candidates.iter().take(max_kills).cloned().collect();
    let estimated_memory_mb = targets.iter().map(|c| c.memory_mb).sum();
    DryRunPlan {
        targets,
        estimated_memory_mb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_signal_names() {
        assert_eq!(KillSignal::Term.to_string(), "SIGTERM");
        assert_eq!(KillSignal::Kill.as_str(), "SIGKILL");
    }

    #[test]
    fn test_nix_sender_rejects_group_pids() {
        let sender = NixSignalSender;
        assert!(matches!(sender.probe(0), Err(SignalError::Other(_))));
        assert_eq!(sender.probe(u32::MAX), Err(SignalError::NoSuchProcess));
    }

    #[test]
    fn test_nix_sender_sees_own_process() {
        assert!(NixSignalSender.is_alive(std::process::id()));
    }

    struct NeverExits;

    impl SignalSender for NeverExits {
        fn send(&self, _pid: u32, _signal: KillSignal) -> Result<(), SignalError> {
            Ok(())
        }
        fn probe(&self, _pid: u32) -> Result<(), SignalError> {
            Ok(())
        }
    }

    #[test]
    fn test_polling_waiter_respects_deadline() {
        let clock = Arc::new(ManualClock::default());
        let waiter = PollingExitWaiter::new(Arc::new(NeverExits), clock.clone());
        assert!(!waiter.await_exit(42, Duration::from_millis(5000)));
        assert_eq!(clock.total_slept(), Duration::from_millis(5000));
    }
}
