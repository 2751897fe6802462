//! Scripted doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;
use herakles_memguard::process::{resolve_uid, CatalogError, ProcessLister};
use herakles_memguard::store::{
    EventRecord, EventStore, KillRecord, Severity, StoreError, StoreStats,
};
use herakles_memguard::system::{LoadAverage, MeminfoCounters, MemorySource};
use herakles_memguard::termination::{KillSignal, SignalError, SignalSender};
use herakles_memguard::{MemorySnapshot, ProbeError, ProcessCandidate};

pub const USER: &str = "alice";

/// Uid the catalog will expect for [`USER`] on this host.
pub fn user_uid() -> u32 {
    resolve_uid(USER).unwrap_or(1000)
}

pub fn candidate(pid: u32, name: &str, memory_mb: f64) -> ProcessCandidate {
    ProcessCandidate {
        pid,
        uid: user_uid(),
        user: USER.to_string(),
        memory_mb,
        memory_percent: 1.0,
        cpu_percent: 0.5,
        vsz_kb: 1_000_000,
        name: name.to_string(),
        command: format!("/usr/bin/{name} --flag"),
        ppid: 1,
        state: "S".to_string(),
    }
}

pub fn snapshot(percent: f64) -> MemorySnapshot {
    let total_kb = 16 * 1024 * 1024;
    let available_kb = ((100.0 - percent) / 100.0 * total_kb as f64).round() as u64;
    let counters = MeminfoCounters {
        mem_total_kb: total_kb,
        mem_available_kb: available_kb,
        ..Default::default()
    };
    MemorySnapshot::from_counters(&counters, LoadAverage::default(), 100.0, Utc::now())
        .expect("valid counters")
}

/// Returns queued percents, then repeats the last one. `None` entries fail.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<Option<f64>>>,
    last: Mutex<Option<f64>>,
}

impl ScriptedProbe {
    pub fn new(script: &[Option<f64>]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            last: Mutex::new(None),
        }
    }

    pub fn constant(percent: f64) -> Self {
        Self::new(&[Some(percent)])
    }
}

impl MemorySource for ScriptedProbe {
    fn sample(&self) -> Result<MemorySnapshot, ProbeError> {
        let next = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(entry) = script.pop_front() {
                *last = entry;
            }
            *last
        };
        match next {
            Some(percent) => Ok(snapshot(percent)),
            None => Err(ProbeError::InvalidMeminfo("scripted failure".to_string())),
        }
    }
}

/// Static process table.
pub struct FakeLister {
    pub processes: Mutex<Vec<ProcessCandidate>>,
    pub fail: bool,
}

impl FakeLister {
    pub fn new(processes: Vec<ProcessCandidate>) -> Self {
        Self {
            processes: Mutex::new(processes),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            processes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn remove(&self, pid: u32) {
        self.processes.lock().unwrap().retain(|p| p.pid != pid);
    }
}

impl ProcessLister for FakeLister {
    fn list_user(&self, user: &str) -> Result<Vec<ProcessCandidate>, CatalogError> {
        if self.fail {
            return Err(CatalogError::Failed {
                status: 2,
                stderr: "scripted failure".to_string(),
            });
        }
        let mut out: Vec<_> = self
            .processes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user == user)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.memory_mb.total_cmp(&a.memory_mb));
        Ok(out)
    }

    fn find(&self, pid: u32) -> Result<Option<ProcessCandidate>, CatalogError> {
        Ok(self
            .processes
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.pid == pid)
            .cloned())
    }
}

/// How a scripted process reacts to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Exits as soon as SIGTERM arrives.
    ExitsOnTerm,
    /// Ignores SIGTERM, dies on SIGKILL.
    ExitsOnKill,
    /// Already gone.
    Missing,
    /// Owned by someone else.
    PermissionDenied,
    /// Survives both signals.
    Immortal,
    /// Ignores SIGTERM but is gone by the time SIGKILL is sent.
    GoneBeforeKill,
}

/// Records every signal and simulates process reactions.
#[derive(Default)]
pub struct ScriptedSignals {
    behaviors: Mutex<HashMap<u32, Behavior>>,
    alive: Mutex<HashMap<u32, bool>>,
    sent: Mutex<Vec<(u32, KillSignal)>>,
}

impl ScriptedSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, pid: u32, behavior: Behavior) -> Self {
        self.behaviors.lock().unwrap().insert(pid, behavior);
        self.alive
            .lock()
            .unwrap()
            .insert(pid, behavior != Behavior::Missing);
        self
    }

    pub fn sent(&self) -> Vec<(u32, KillSignal)> {
        self.sent.lock().unwrap().clone()
    }

    fn behavior(&self, pid: u32) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(&pid)
            .copied()
            .unwrap_or(Behavior::ExitsOnTerm)
    }

    fn set_dead(&self, pid: u32) {
        self.alive.lock().unwrap().insert(pid, false);
    }
}

impl SignalSender for ScriptedSignals {
    fn send(&self, pid: u32, signal: KillSignal) -> Result<(), SignalError> {
        self.sent.lock().unwrap().push((pid, signal));
        match (self.behavior(pid), signal) {
            (Behavior::Missing, _) => Err(SignalError::NoSuchProcess),
            (Behavior::PermissionDenied, _) => Err(SignalError::PermissionDenied),
            (Behavior::ExitsOnTerm, _) => {
                self.set_dead(pid);
                Ok(())
            }
            (Behavior::ExitsOnKill, KillSignal::Kill) => {
                self.set_dead(pid);
                Ok(())
            }
            (Behavior::GoneBeforeKill, KillSignal::Kill) => Err(SignalError::NoSuchProcess),
            _ => Ok(()),
        }
    }

    fn probe(&self, pid: u32) -> Result<(), SignalError> {
        let alive = self.alive.lock().unwrap().get(&pid).copied().unwrap_or(false);
        if alive {
            Ok(())
        } else {
            Err(SignalError::NoSuchProcess)
        }
    }
}

/// Store whose writes all fail.
pub struct FailingStore;

impl EventStore for FailingStore {
    fn record_snapshot(&self, _snapshot: &MemorySnapshot) -> Result<(), StoreError> {
        Err(StoreError("disk full".to_string()))
    }

    fn record_kill_outcome(
        &self,
        _pid: u32,
        _name: &str,
        _memory_mb: f64,
        _signal: &str,
        _reason: &str,
        _success: bool,
    ) -> Result<(), StoreError> {
        Err(StoreError("disk full".to_string()))
    }

    fn record_event(
        &self,
        _kind: &str,
        _severity: Severity,
        _message: &str,
        _metadata: serde_json::Value,
    ) -> Result<(), StoreError> {
        Err(StoreError("disk full".to_string()))
    }

    fn recent_snapshots(&self, _limit: usize) -> Vec<MemorySnapshot> {
        Vec::new()
    }

    fn recent_kills(&self, _limit: usize) -> Vec<KillRecord> {
        Vec::new()
    }

    fn recent_events(&self, _limit: usize) -> Vec<EventRecord> {
        Vec::new()
    }

    fn stats(&self) -> StoreStats {
        StoreStats::default()
    }
}
