//! Persistence collaborator for snapshots, kill outcomes and events.
//!
//! The core only writes through [`EventStore`] and treats every write as
//! best-effort. [`MemoryStore`] keeps bounded histories in memory and answers
//! the read-back queries used for status output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::ringbuffer::Ringbuffer;
use crate::system::MemorySnapshot;

/// Default number of entries kept per history.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        })
    }
}

/// Kill record as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillRecord {
    pub pid: u32,
    pub name: String,
    pub memory_mb: f64,
    pub signal: String,
    pub reason: String,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Free-form event as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregates over everything the store has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub snapshots_recorded: u64,
    pub avg_percent: f64,
    pub peak_percent: f64,
    pub last_percent: f64,
    pub kills_total: u64,
    pub kills_succeeded: u64,
    pub kills_failed: u64,
    pub total_freed_mb: f64,
    pub events_recorded: u64,
}

/// Store write failure.
#[derive(Debug, thiserror::Error)]
#[error("store unavailable: {0}")]
pub struct StoreError(pub String);

/// Persistence interface consumed by the coordinator.
pub trait EventStore: Send + Sync {
    fn record_snapshot(&self, snapshot: &MemorySnapshot) -> Result<(), StoreError>;

    fn record_kill_outcome(
        &self,
        pid: u32,
        name: &str,
        memory_mb: f64,
        signal: &str,
        reason: &str,
        success: bool,
    ) -> Result<(), StoreError>;

    fn record_event(
        &self,
        kind: &str,
        severity: Severity,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Most recent snapshots, newest first.
    fn recent_snapshots(&self, limit: usize) -> Vec<MemorySnapshot>;

    /// Most recent kill records, newest first.
    fn recent_kills(&self, limit: usize) -> Vec<KillRecord>;

    /// Most recent events, newest first.
    fn recent_events(&self, limit: usize) -> Vec<EventRecord>;

    fn stats(&self) -> StoreStats;
}

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

struct Inner {
    snapshots: Ringbuffer<MemorySnapshot>,
    kills: Ringbuffer<KillRecord>,
    events: Ringbuffer<EventRecord>,
    percent: RunningStat,
    kills_total: u64,
    kills_succeeded: u64,
    total_freed_mb: f64,
    events_recorded: u64,
}

/// In-memory [`EventStore`] with bounded histories.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(history_limit: usize) -> Self {
        Self::with_clock(history_limit, Arc::new(SystemClock))
    }

    /// Store whose `recorded_at` stamps come from `clock`.
    pub fn with_clock(history_limit: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner {
                snapshots: Ringbuffer::new(history_limit),
                kills: Ringbuffer::new(history_limit),
                events: Ringbuffer::new(history_limit),
                percent: RunningStat::default(),
                kills_total: 0,
                kills_succeeded: 0,
                total_freed_mb: 0.0,
                events_recorded: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl EventStore for MemoryStore {
    fn record_snapshot(&self, snapshot: &MemorySnapshot) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.percent.add(snapshot.percent);
        inner.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn record_kill_outcome(
        &self,
        pid: u32,
        name: &str,
        memory_mb: f64,
        signal: &str,
        reason: &str,
        success: bool,
    ) -> Result<(), StoreError> {
        let recorded_at = self.clock.now();
        let mut inner = self.lock();
        inner.kills_total += 1;
        if success {
            inner.kills_succeeded += 1;
            inner.total_freed_mb += memory_mb;
        }
        inner.kills.push(KillRecord {
            pid,
            name: name.to_string(),
            memory_mb,
            signal: signal.to_string(),
            reason: reason.to_string(),
            success,
            recorded_at,
        });
        Ok(())
    }

    fn record_event(
        &self,
        kind: &str,
        severity: Severity,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<(), StoreError> {
        let recorded_at = self.clock.now();
        let mut inner = self.lock();
        inner.events_recorded += 1;
        inner.events.push(EventRecord {
            kind: kind.to_string(),
            severity,
            message: message.to_string(),
            metadata,
            recorded_at,
        });
        Ok(())
    }

    fn recent_snapshots(&self, limit: usize) -> Vec<MemorySnapshot> {
        self.lock().snapshots.latest(limit)
    }

    fn recent_kills(&self, limit: usize) -> Vec<KillRecord> {
        self.lock().kills.latest(limit)
    }

    fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        self.lock().events.latest(limit)
    }

    fn stats(&self) -> StoreStats {
        let inner = self.lock();
        StoreStats {
            snapshots_recorded: inner.percent.count,
            avg_percent: inner.percent.avg(),
            peak_percent: inner.percent.max,
            last_percent: inner.percent.last,
            kills_total: inner.kills_total,
            kills_succeeded: inner.kills_succeeded,
            kills_failed: inner.kills_total - inner.kills_succeeded,
            total_freed_mb: inner.total_freed_mb,
            events_recorded: inner.events_recorded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{LoadAverage, MeminfoCounters};

    fn snapshot(percent_available: u64) -> MemorySnapshot {
        let counters = MeminfoCounters {
            mem_total_kb: 100,
            mem_available_kb: percent_available,
            ..Default::default()
        };
        MemorySnapshot::from_counters(&counters, LoadAverage::default(), 0.0, Utc::now()).unwrap()
    }

    #[test]
    fn test_snapshot_stats() {
        let store = MemoryStore::new(10);
        for available in [50, 10, 30] {
            store.record_snapshot(&snapshot(available)).unwrap();
        }
        let stats = store.stats();
        assert_eq!(stats.snapshots_recorded, 3);
        assert!((stats.peak_percent - 90.0).abs() < 1e-9);
        assert!((stats.last_percent - 70.0).abs() < 1e-9);
        assert!((stats.avg_percent - 70.0).abs() < 1e-9);

        let recent = store.recent_snapshots(2);
        assert_eq!(recent.len(), 2);
        assert!((recent[0].percent - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_kill_stats() {
        let store = MemoryStore::default();
        store
            .record_kill_outcome(1, "chrome", 512.0, "SIGTERM", "ram spike", true)
            .unwrap();
        store
            .record_kill_outcome(2, "java", 0.0, "NONE", "ram spike", false)
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.kills_total, 2);
        assert_eq!(stats.kills_succeeded, 1);
        assert_eq!(stats.kills_failed, 1);
        assert_eq!(stats.total_freed_mb, 512.0);
        assert_eq!(store.recent_kills(1)[0].name, "java");
    }

    #[test]
    fn test_events_bounded() {
        let store = MemoryStore::new(2);
        for i in 0..5 {
            store
                .record_event("test", Severity::Info, &format!("event {i}"), serde_json::json!({}))
                .unwrap();
        }
        let events = store.recent_events(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "event 4");
        assert_eq!(store.stats().events_recorded, 5);
    }

    #[test]
    fn test_records_stamped_by_clock() {
        use crate::clock::ManualClock;
        use chrono::TimeZone;

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = MemoryStore::with_clock(10, clock.clone());

        store
            .record_kill_outcome(7, "java", 64.0, "SIGTERM", "ram spike", true)
            .unwrap();
        clock.advance(std::time::Duration::from_secs(90));
        store
            .record_event("auto_kill", Severity::Warning, "terminated", serde_json::json!({}))
            .unwrap();

        assert_eq!(store.recent_kills(1)[0].recorded_at, start);
        assert_eq!(
            store.recent_events(1)[0].recorded_at,
            start + chrono::Duration::seconds(90)
        );
    }
}
