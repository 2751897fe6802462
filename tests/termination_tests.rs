//! Integration tests for the SIGTERM -> SIGKILL executor.
//!
//! Signals are scripted and time is virtual, so escalation timing is exact.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{candidate, Behavior, ScriptedSignals};
use herakles_memguard::clock::{Clock, ManualClock};
use herakles_memguard::termination::{
    dry_run, KillSignal, PollingExitWaiter, SignalSender, TerminationExecutor,
};

fn executor(signals: Arc<ScriptedSignals>) -> (TerminationExecutor, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let sender: Arc<dyn SignalSender> = signals;
    let waiter = Arc::new(PollingExitWaiter::new(sender.clone(), clock.clone()));
    (
        TerminationExecutor::new(sender, waiter, clock.clone()),
        clock,
    )
}

#[test]
fn test_already_exited_counts_as_sigterm_success() {
    let signals = Arc::new(ScriptedSignals::new().with(4242, Behavior::Missing));
    let (exec, clock) = executor(signals.clone());

    let outcome = exec.terminate(&candidate(4242, "ghost", 300.0), "test");

    assert!(outcome.success);
    assert_eq!(outcome.signal, "SIGTERM");
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.memory_mb, 300.0);
    assert_eq!(signals.sent(), vec![(4242, KillSignal::Term)]);
    assert_eq!(clock.total_slept(), Duration::ZERO);
}

#[test]
fn test_graceful_exit_on_sigterm() {
    let signals = Arc::new(ScriptedSignals::new().with(10, Behavior::ExitsOnTerm));
    let (exec, _clock) = executor(signals.clone());

    let outcome = exec.terminate(&candidate(10, "chrome", 1200.0), "ram spike");

    assert!(outcome.success);
    assert_eq!(outcome.signal, "SIGTERM");
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.reason, "ram spike");
    assert!(outcome.error.is_none());
    assert_eq!(signals.sent(), vec![(10, KillSignal::Term)]);
}

#[test]
fn test_escalates_to_sigkill_after_term_timeout() {
    let signals = Arc::new(ScriptedSignals::new().with(11, Behavior::ExitsOnKill));
    let (exec, clock) = executor(signals.clone());
    let started = clock.now();

    let outcome = exec.terminate(&candidate(11, "java", 2048.0), "ram spike");

    assert!(outcome.success);
    assert_eq!(outcome.signal, "SIGKILL");
    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        signals.sent(),
        vec![(11, KillSignal::Term), (11, KillSignal::Kill)]
    );
    // Full SIGTERM grace period, then immediate exit after SIGKILL
    assert_eq!(clock.total_slept(), Duration::from_millis(5000));
    assert_eq!(outcome.finished_at - started, chrono::Duration::milliseconds(5000));
}

#[test]
fn test_unkillable_process_fails_within_bound() {
    let signals = Arc::new(ScriptedSignals::new().with(12, Behavior::Immortal));
    let (exec, clock) = executor(signals.clone());

    let outcome = exec.terminate(&candidate(12, "stuck", 700.0), "ram spike");

    assert!(!outcome.success);
    assert_eq!(outcome.signal, "NONE");
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.memory_mb, 0.0);
    assert!(outcome.error.is_some());
    assert_eq!(clock.total_slept(), Duration::from_millis(7000));
}

#[test]
fn test_permission_denied_does_not_escalate() {
    let signals = Arc::new(ScriptedSignals::new().with(13, Behavior::PermissionDenied));
    let (exec, clock) = executor(signals.clone());

    let outcome = exec.terminate(&candidate(13, "root-owned", 500.0), "ram spike");

    assert!(!outcome.success);
    assert_eq!(outcome.signal, "NONE");
    assert_eq!(outcome.attempts, 1);
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("not permitted"));
    assert_eq!(signals.sent(), vec![(13, KillSignal::Term)]);
    assert_eq!(clock.total_slept(), Duration::ZERO);
}

#[test]
fn test_exit_between_term_and_kill_is_success() {
    let signals = Arc::new(ScriptedSignals::new().with(14, Behavior::GoneBeforeKill));
    let (exec, _clock) = executor(signals);

    let outcome = exec.terminate(&candidate(14, "slow", 400.0), "ram spike");

    assert!(outcome.success);
    assert_eq!(outcome.signal, "SIGTERM");
    assert_eq!(outcome.attempts, 2);
}

#[test]
fn test_batch_stops_at_first_failure() {
    let signals = Arc::new(
        ScriptedSignals::new()
            .with(1, Behavior::ExitsOnTerm)
            .with(2, Behavior::PermissionDenied)
            .with(3, Behavior::ExitsOnTerm),
    );
    let (exec, clock) = executor(signals.clone());
    let targets = vec![
        candidate(1, "a", 900.0),
        candidate(2, "b", 800.0),
        candidate(3, "c", 700.0),
    ];

    let outcomes = exec.terminate_batch(&targets, "batch", 3);

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert!(signals.sent().iter().all(|(pid, _)| *pid != 3));
    // One pacing pause between the first and second kill
    assert_eq!(clock.total_slept(), Duration::from_millis(500));
}

#[test]
fn test_batch_respects_max_kills() {
    let signals = Arc::new(ScriptedSignals::new());
    let (exec, _clock) = executor(signals.clone());
    let targets = vec![candidate(1, "a", 900.0), candidate(2, "b", 800.0)];

    let outcomes = exec.terminate_batch(&targets, "batch", 1);

    assert_eq!(outcomes.len(), 1);
    assert_eq!(signals.sent(), vec![(1, KillSignal::Term)]);
}

#[test]
fn test_dry_run_sends_nothing() {
    let signals = Arc::new(ScriptedSignals::new());
    let (exec, _clock) = executor(signals.clone());
    let targets = vec![
        candidate(1, "a", 500.0),
        candidate(2, "b", 300.0),
        candidate(3, "c", 100.0),
    ];

    let plan = exec.dry_run(&targets, 2);

    assert_eq!(plan.targets.len(), 2);
    assert_eq!(plan.estimated_memory_mb, 800.0);
    assert!(signals.sent().is_empty());
    assert_eq!(dry_run(&targets, 10).estimated_memory_mb, 900.0);
    assert!(dry_run(&[], 3).targets.is_empty());
}
