//! System-wide memory sampling from the /proc filesystem.
//!
//! This module reads `/proc/meminfo`, `/proc/loadavg` and `/proc/uptime` and
//! turns them into an immutable [`MemorySnapshot`]. Percent-used is always
//! derived from `MemAvailable`, never from `MemFree`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};

/// Errors raised while sampling kernel counters.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid /proc/meminfo: {0}")]
    InvalidMeminfo(String),
}

/// Raw /proc/meminfo counters in kilobytes. Missing fields are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeminfoCounters {
    pub mem_total_kb: u64,
    pub mem_free_kb: u64,
    pub mem_available_kb: u64,
    pub buffers_kb: u64,
    pub cached_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

/// System load averages for 1, 5, and 15 minute intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// Normalized memory state captured at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub total_mb: f64,
    pub used_mb: f64,
    pub available_mb: f64,
    /// `used / total * 100` where `used = total - available`.
    pub percent: f64,
    pub swap_total_mb: f64,
    pub swap_used_mb: f64,
    pub swap_percent: f64,
    pub buffers_mb: f64,
    pub cached_mb: f64,
    pub load: LoadAverage,
    pub uptime_seconds: f64,
    pub captured_at: DateTime<Utc>,
}

impl MemorySnapshot {
    /// Builds a snapshot from raw counters.
    pub fn from_counters(
        counters: &MeminfoCounters,
        load: LoadAverage,
        uptime_seconds: f64,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, ProbeError> {
        if counters.mem_total_kb == 0 {
            return Err(ProbeError::InvalidMeminfo(
                "MemTotal missing or zero".to_string(),
            ));
        }

        let total_kb = counters.mem_total_kb;
        let available_kb = counters.mem_available_kb.min(total_kb);
        let used_kb = total_kb - available_kb;
        let swap_used_kb = counters
            .swap_total_kb
            .saturating_sub(counters.swap_free_kb);

        let swap_percent = if counters.swap_total_kb > 0 {
            swap_used_kb as f64 / counters.swap_total_kb as f64 * 100.0
        } else {
            0.0
        };

        Ok(Self {
            total_mb: kb_to_mb(total_kb),
            used_mb: kb_to_mb(used_kb),
            available_mb: kb_to_mb(available_kb),
            percent: used_kb as f64 / total_kb as f64 * 100.0,
            swap_total_mb: kb_to_mb(counters.swap_total_kb),
            swap_used_mb: kb_to_mb(swap_used_kb),
            swap_percent,
            buffers_mb: kb_to_mb(counters.buffers_kb),
            cached_mb: kb_to_mb(counters.cached_kb),
            load,
            uptime_seconds,
            captured_at,
        })
    }
}

fn kb_to_mb(kb: u64) -> f64 {
    kb as f64 / 1024.0
}

/// Anything that can produce memory snapshots.
pub trait MemorySource: Send + Sync {
    fn sample(&self) -> Result<MemorySnapshot, ProbeError>;
}

/// Reads kernel counters below a /proc root.
pub struct MemoryProbe {
    proc_root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl MemoryProbe {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self::with_clock(proc_root, Arc::new(SystemClock))
    }

    pub fn with_clock(proc_root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            proc_root: proc_root.into(),
            clock,
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    fn read(&self, name: &str) -> Result<String, ProbeError> {
        let path = self.proc_root.join(name);
        fs::read_to_string(&path).map_err(|source| ProbeError::Read {
            path: path.display().to_string(),
            source,
        })
    }
}

impl MemorySource for MemoryProbe {
    /// Samples /proc once. No retry; the caller decides what to do on failure.
    fn sample(&self) -> Result<MemorySnapshot, ProbeError> {
        let counters = parse_meminfo(&self.read("meminfo")?);
        let load = parse_load_average(&self.read("loadavg")?);
        let uptime = parse_uptime(&self.read("uptime")?);

        MemorySnapshot::from_counters(&counters, load, uptime, self.clock.now())
    }
}

/// Parses /proc/meminfo content. Unknown lines are ignored.
///
/// Format: "MemTotal:       16314240 kB"
pub fn parse_meminfo(content: &str) -> MeminfoCounters {
    let mut counters = MeminfoCounters::default();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let kb = value.parse::<u64>().unwrap_or(0);

        match key {
            "MemTotal:" => counters.mem_total_kb = kb,
            "MemFree:" => counters.mem_free_kb = kb,
            "MemAvailable:" => counters.mem_available_kb = kb,
            "Buffers:" => counters.buffers_kb = kb,
            "Cached:" => counters.cached_kb = kb,
            "SwapTotal:" => counters.swap_total_kb = kb,
            "SwapFree:" => counters.swap_free_kb = kb,
            _ => {}
        }
    }

    counters
}

/// Parses /proc/loadavg content.
///
/// Format: "0.00 0.01 0.05 1/234 5678". Missing values are 0.
pub fn parse_load_average(content: &str) -> LoadAverage {
    let mut fields = content
        .split_whitespace()
        .map(|s| s.parse::<f64>().unwrap_or(0.0));

    LoadAverage {
        one_min: fields.next().unwrap_or(0.0),
        five_min: fields.next().unwrap_or(0.0),
        fifteen_min: fields.next().unwrap_or(0.0),
    }
}

/// Parses /proc/uptime content.
///
/// Format: "<uptime_seconds> <idle_seconds>"
pub fn parse_uptime(content: &str) -> f64 {
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16000000 kB\n\
MemFree:         1000000 kB\n\
MemAvailable:    4000000 kB\n\
Buffers:          200000 kB\n\
Cached:          2000000 kB\n\
SwapCached:            0 kB\n\
SwapTotal:       2000000 kB\n\
SwapFree:        1500000 kB\n";

    #[test]
    fn test_parse_meminfo() {
        let c = parse_meminfo(MEMINFO);
        assert_eq!(c.mem_total_kb, 16_000_000);
        assert_eq!(c.mem_free_kb, 1_000_000);
        assert_eq!(c.mem_available_kb, 4_000_000);
        assert_eq!(c.buffers_kb, 200_000);
        assert_eq!(c.cached_kb, 2_000_000);
        assert_eq!(c.swap_total_kb, 2_000_000);
        assert_eq!(c.swap_free_kb, 1_500_000);
    }

    #[test]
    fn test_parse_meminfo_missing_fields_default_to_zero() {
        let c = parse_meminfo("MemTotal: 1024 kB\nMemAvailable: garbage kB\n");
        assert_eq!(c.mem_total_kb, 1024);
        assert_eq!(c.mem_available_kb, 0);
        assert_eq!(c.swap_total_kb, 0);
    }

    #[test]
    fn test_percent_uses_available_not_free() {
        let c = parse_meminfo(MEMINFO);
        let snap = MemorySnapshot::from_counters(&c, LoadAverage::default(), 0.0, Utc::now())
            .unwrap();
        // used = 16_000_000 - 4_000_000 = 12_000_000 -> 75%
        assert!((snap.percent - 75.0).abs() < 1e-9);
        assert!((snap.swap_percent - 25.0).abs() < 1e-9);
        assert!((snap.used_mb + snap.available_mb - snap.total_mb).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_is_an_error() {
        let c = parse_meminfo("MemFree: 100 kB\n");
        let result = MemorySnapshot::from_counters(&c, LoadAverage::default(), 0.0, Utc::now());
        assert!(matches!(result, Err(ProbeError::InvalidMeminfo(_))));
    }

    #[test]
    fn test_parse_load_average() {
        let load = parse_load_average("0.52 0.58 0.59 2/1190 12345");
        assert!((load.one_min - 0.52).abs() < 0.001);
        assert!((load.five_min - 0.58).abs() < 0.001);
        assert!((load.fifteen_min - 0.59).abs() < 0.001);
    }

    #[test]
    fn test_parse_load_average_invalid() {
        let load = parse_load_average("abc 0.58");
        assert_eq!(load.one_min, 0.0);
        assert!((load.five_min - 0.58).abs() < 0.001);
        assert_eq!(load.fifteen_min, 0.0);
    }

    #[test]
    fn test_parse_uptime() {
        assert!((parse_uptime("3600.25 7000.00\n") - 3600.25).abs() < 1e-9);
        assert_eq!(parse_uptime(""), 0.0);
    }
}
