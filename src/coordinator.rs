//! Periodic remediation loop.
//!
//! The coordinator owns the sampling timer and wires
//! probe -> detector -> catalog -> executor, reporting every step to the store
//! and the notification sink. A cycle-in-flight flag guarantees that at most one
//! remediation cycle (and therefore one termination sequence) runs at a time;
//! ticks that arrive while a cycle is still running are skipped, not queued.

use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, JitterSource, RandomJitter, SystemClock};
use crate::detector::{DetectionEvent, DetectorSettings, DetectorStats, PressureDetector};
use crate::guard_config::GuardConfig;
use crate::notify::{NoopNotifier, Notifier, SpikeNotification};
use crate::process::{
    CatalogSettings, ProcessCandidate, ProcessCatalog, ProcessLister, PsLister, Rejection,
    SelfIdentity,
};
use crate::store::{EventStore, MemoryStore, Severity, StoreStats, DEFAULT_HISTORY_LIMIT};
use crate::system::{MemoryProbe, MemorySnapshot, MemorySource, ProbeError};
use crate::termination::{
    DryRunPlan, KillOutcome, NixSignalSender, PollingExitWaiter, SignalSender,
    TerminationExecutor, TerminationTimings,
};

/// Swappable collaborators of a [`Coordinator`].
pub struct Dependencies {
    pub probe: Arc<dyn MemorySource>,
    pub lister: Arc<dyn ProcessLister>,
    pub signals: Arc<dyn SignalSender>,
    pub store: Arc<dyn EventStore>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub jitter: Arc<dyn JitterSource>,
    pub identity: SelfIdentity,
    pub timings: TerminationTimings,
}

impl Dependencies {
    /// Real /proc, `ps`, `kill(2)`, wall clock and RNG with an in-memory store and no webhook.
    pub fn system(proc_root: impl Into<PathBuf>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            probe: Arc::new(MemoryProbe::with_clock(proc_root, clock.clone())),
            lister: Arc::new(PsLister::new()),
            signals: Arc::new(NixSignalSender),
            store: Arc::new(MemoryStore::with_clock(DEFAULT_HISTORY_LIMIT, clock.clone())),
            notifier: Arc::new(NoopNotifier),
            clock,
            jitter: Arc::new(RandomJitter),
            identity: SelfIdentity::current(),
            timings: TerminationTimings::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was still in flight.
    Skipped,
    ProbeFailed { error: String },
    Normal { percent: f64 },
    /// Pressure confirmed but auto-kill is disabled.
    DetectionOnly { percent: f64 },
    NoCandidates { percent: f64 },
    Terminated { percent: f64, outcome: KillOutcome },
}

/// Errors from [`Coordinator::kill_by_pid`].
#[derive(Debug, thiserror::Error)]
pub enum KillByPidError {
    #[error("rejected: {0}")]
    Rejected(Rejection),

    #[error("a remediation cycle is in progress")]
    Busy,

    #[error("termination task failed: {0}")]
    Task(String),
}

/// Status for diagnostics output.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub running: bool,
    pub cycle_in_flight: bool,
    pub auto_kill_enabled: bool,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub detector: DetectorStats,
    pub last_snapshot: Option<MemorySnapshot>,
    pub store: StoreStats,
}

struct Shared {
    config: GuardConfig,
    probe: Arc<dyn MemorySource>,
    detector: Mutex<PressureDetector>,
    catalog: Arc<ProcessCatalog>,
    executor: Arc<TerminationExecutor>,
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    last_snapshot: RwLock<Option<MemorySnapshot>>,
    cycle_in_flight: AtomicBool,
    running: AtomicBool,
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the in-flight flag when a cycle ends, including on panic.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the sampling loop and remediation.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    pub fn new(config: GuardConfig, deps: Dependencies) -> Self {
        let detector = PressureDetector::new(
            DetectorSettings {
                threshold: config.threshold,
                sample_interval_ms: config.monitor_interval_ms,
                cooldown_base: config.cooldown_base(),
            },
            deps.clock.clone(),
            deps.jitter,
        );
        let catalog = ProcessCatalog::new(
            CatalogSettings::from_config(&config, deps.identity),
            deps.lister.clone(),
        );
        let waiter = Arc::new(PollingExitWaiter::new(
            deps.signals.clone(),
            deps.clock.clone(),
        ));
        let executor = TerminationExecutor::new(deps.signals.clone(), waiter, deps.clock.clone())
            .with_timings(deps.timings);

        Self {
            shared: Arc::new(Shared {
                config,
                probe: deps.probe,
                detector: Mutex::new(detector),
                catalog: Arc::new(catalog),
                executor: Arc::new(executor),
                store: deps.store,
                notifier: deps.notifier,
                clock: deps.clock,
                last_snapshot: RwLock::new(None),
                cycle_in_flight: AtomicBool::new(false),
                running: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                skipped_ticks: AtomicU64::new(0),
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.shared.config
    }

    pub fn catalog(&self) -> &ProcessCatalog {
        &self.shared.catalog
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.shared.store
    }

    /// Starts the sampling timer. Must be called inside a tokio runtime.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            debug!("Coordinator already running");
            return;
        }

        let interval = self
            .shared
            .config
            .monitor_interval()
            .max(Duration::from_millis(1));
        info!(
            "Starting memory guard: threshold {:.1}%, interval {:?}, auto-kill {}",
            self.shared.config.threshold, interval, self.shared.config.enable_auto_kill
        );

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !this.shared.running.load(Ordering::Acquire) {
                    break;
                }
                // Each cycle runs detached so a slow one makes the next tick skip.
                let cycle = this.clone();
                tokio::spawn(async move {
                    cycle.run_cycle().await;
                });
            }
        });

        *self.lock_timer() = Some(handle);
    }

    /// Cancels future ticks. A cycle already in flight runs to completion.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.lock_timer().take() {
            handle.abort();
        }
        info!("Memory guard stopped");
    }

    /// Waits until no cycle is in flight.
    pub async fn wait_idle(&self) {
        while self.shared.cycle_in_flight.load(Ordering::Acquire) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn get_last_snapshot(&self) -> Option<MemorySnapshot> {
        self.shared
            .last_snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get_status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            running: self.is_running(),
            cycle_in_flight: self.shared.cycle_in_flight.load(Ordering::Acquire),
            auto_kill_enabled: self.shared.config.enable_auto_kill,
            ticks: self.shared.ticks.load(Ordering::Relaxed),
            skipped_ticks: self.shared.skipped_ticks.load(Ordering::Relaxed),
            detector: self.lock_detector().stats(),
            last_snapshot: self.get_last_snapshot(),
            store: self.shared.store.stats(),
        }
    }

    /// Manual detector reset.
    pub fn reset_detector(&self) {
        self.lock_detector().reset();
        self.record_event(
            "detector_reset",
            Severity::Info,
            "Pressure detector manually reset",
            json!({}),
        );
    }

    /// Detector event history, oldest first.
    pub fn detection_history(&self) -> Vec<DetectionEvent> {
        self.lock_detector().history()
    }

    /// Takes and records a snapshot without feeding it to the detector.
    pub fn sample_now(&self) -> Result<MemorySnapshot, ProbeError> {
        let snapshot = self.shared.probe.sample()?;
        if let Err(e) = self.shared.store.record_snapshot(&snapshot) {
            warn!("Failed to record snapshot: {}", e);
        }
        *self
            .shared
            .last_snapshot
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Runs one sample -> detect -> select -> terminate cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.shared.ticks.fetch_add(1, Ordering::Relaxed);

        let Some(_guard) = self.try_enter() else {
            self.shared.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            warn!("Previous remediation cycle still running, skipping tick");
            return CycleOutcome::Skipped;
        };

        let snapshot = match self.shared.probe.sample() {
            Ok(s) => s,
            Err(e) => {
                error!("Memory sampling failed, skipping cycle: {}", e);
                return CycleOutcome::ProbeFailed {
                    error: e.to_string(),
                };
            }
        };

        if let Err(e) = self.shared.store.record_snapshot(&snapshot) {
            warn!("Failed to record snapshot: {}", e);
        }
        *self
            .shared
            .last_snapshot
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());

        let percent = snapshot.percent;
        let triggered = self.lock_detector().evaluate(&snapshot);
        if !triggered {
            debug!("RAM {:.1}% - no action", percent);
            return CycleOutcome::Normal { percent };
        }

        let threshold = self.shared.config.threshold;
        let reason = format!("RAM usage {percent:.1}% exceeded threshold {threshold:.1}%");
        self.record_event(
            "ram_spike",
            Severity::Warning,
            &reason,
            json!({ "ramPercent": percent, "threshold": threshold }),
        );

        if !self.shared.config.enable_auto_kill {
            warn!("{} - auto-kill disabled, no process terminated", reason);
            self.record_event(
                "detection_only",
                Severity::Info,
                "Auto-kill disabled; pressure recorded without termination",
                json!({ "ramPercent": percent }),
            );
            return CycleOutcome::DetectionOnly { percent };
        }

        let catalog = self.shared.catalog.clone();
        let executor = self.shared.executor.clone();
        let task_reason = reason.clone();
        let result = tokio::task::spawn_blocking(move || {
            let target = catalog.list_killable().into_iter().next()?;
            Some(executor.terminate(&target, &task_reason))
        })
        .await;

        let outcome = match result {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                warn!("{} but no killable process found", reason);
                self.record_event(
                    "no_candidates",
                    Severity::Warning,
                    "Memory pressure confirmed but no killable process found",
                    json!({ "ramPercent": percent }),
                );
                return CycleOutcome::NoCandidates { percent };
            }
            Err(e) => {
                error!("Termination task failed: {}", e);
                return CycleOutcome::NoCandidates { percent };
            }
        };

        self.report_outcome(&outcome, "auto_kill", Some(percent));
        self.notify(percent, outcome.memory_mb);

        CycleOutcome::Terminated { percent, outcome }
    }

    /// Terminates a specific pid, bypassing the detector.
    pub async fn kill_by_pid(&self, pid: u32, reason: &str) -> Result<KillOutcome, KillByPidError> {
        let catalog = self.shared.catalog.clone();
        let candidate = tokio::task::spawn_blocking(move || catalog.validate_single(pid))
            .await
            .map_err(|e| KillByPidError::Task(e.to_string()))?
            .map_err(KillByPidError::Rejected)?;

        let Some(_guard) = self.try_enter() else {
            return Err(KillByPidError::Busy);
        };

        let executor = self.shared.executor.clone();
        let task_reason = reason.to_string();
        let outcome =
            tokio::task::spawn_blocking(move || executor.terminate(&candidate, &task_reason))
                .await
                .map_err(|e| KillByPidError::Task(e.to_string()))?;

        self.report_outcome(&outcome, "manual_kill", None);
        Ok(outcome)
    }

    /// Targets the next remediation would pick, without signalling anything.
    pub async fn dry_run_preview(&self, max_kills: usize) -> DryRunPlan {
        let catalog = self.shared.catalog.clone();
        let executor = self.shared.executor.clone();
        let killable: Vec<ProcessCandidate> =
            tokio::task::spawn_blocking(move || catalog.list_killable())
                .await
                .unwrap_or_else(|e| {
                    error!("Candidate listing task failed: {}", e);
                    Vec::new()
                });
        executor.dry_run(&killable, max_kills)
    }

    fn try_enter(&self) -> Option<InFlightGuard<'_>> {
        self.shared
            .cycle_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.shared.cycle_in_flight))
    }

    fn report_outcome(&self, outcome: &KillOutcome, kind: &str, percent: Option<f64>) {
        if let Err(e) = self.shared.store.record_kill_outcome(
            outcome.pid,
            &outcome.name,
            outcome.memory_mb,
            &outcome.signal,
            &outcome.reason,
            outcome.success,
        ) {
            warn!("Failed to record kill outcome: {}", e);
        }

        let (severity, message) = if outcome.success {
            (
                Severity::Warning,
                format!(
                    "Terminated pid {} ({}) with {}, freed ~{:.1} MB",
                    outcome.pid, outcome.name, outcome.signal, outcome.memory_mb
                ),
            )
        } else {
            (
                Severity::Critical,
                format!(
                    "Failed to terminate pid {} ({}): {}",
                    outcome.pid,
                    outcome.name,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
            )
        };

        self.record_event(
            kind,
            severity,
            &message,
            json!({
                "pid": outcome.pid,
                "name": outcome.name,
                "signal": outcome.signal,
                "attempts": outcome.attempts,
                "success": outcome.success,
                "memoryMb": outcome.memory_mb,
                "ramPercent": percent,
                "error": outcome.error,
            }),
        );
    }

    fn record_event(&self, kind: &str, severity: Severity, message: &str, metadata: serde_json::Value) {
        if let Err(e) = self.shared.store.record_event(kind, severity, message, metadata) {
            warn!("Failed to record {} event: {}", kind, e);
        }
    }

    /// Fire-and-forget webhook delivery.
    fn notify(&self, percent: f64, freed_mb: f64) {
        let notifier = self.shared.notifier.clone();
        let notification = SpikeNotification::ram_spike(percent, freed_mb, self.shared.clock.now());
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&notification).await {
                debug!("Notification delivery failed (ignored): {}", e);
            }
        });
    }

    fn lock_detector(&self) -> std::sync::MutexGuard<'_, PressureDetector> {
        self.shared
            .detector
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.shared.timer.lock().unwrap_or_else(|e| e.into_inner())
    }
}
