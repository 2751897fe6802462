//! Integration tests for memory sampling against a fake /proc tree.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::TimeZone;
use herakles_memguard::clock::ManualClock;
use herakles_memguard::system::{MemorySource, ProbeError};
use herakles_memguard::MemoryProbe;

const MEMINFO: &str = "\
MemTotal:       16000000 kB
MemFree:          800000 kB
MemAvailable:    2400000 kB
Buffers:          102400 kB
Cached:          4096000 kB
SwapCached:            0 kB
SwapTotal:       2048000 kB
SwapFree:        1024000 kB
";

fn write_proc(root: &Path, meminfo: &str) {
    fs::write(root.join("meminfo"), meminfo).unwrap();
    fs::write(root.join("loadavg"), "1.50 0.75 0.25 2/345 6789\n").unwrap();
    fs::write(root.join("uptime"), "12345.67 54321.00\n").unwrap();
}

#[test]
fn test_sample_uses_available_memory() {
    let dir = tempfile::tempdir().unwrap();
    write_proc(dir.path(), MEMINFO);
    let start = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let probe = MemoryProbe::with_clock(dir.path(), Arc::new(ManualClock::new(start)));

    let snap = probe.sample().unwrap();

    // (16_000_000 - 2_400_000) / 16_000_000, not based on MemFree
    assert!((snap.percent - 85.0).abs() < 1e-9);
    assert!((snap.swap_percent - 50.0).abs() < 1e-9);
    assert!((snap.available_mb - 2_400_000.0 / 1024.0).abs() < 1e-9);
    assert!((snap.cached_mb - 4000.0).abs() < 1e-9);
    assert_eq!(snap.load.one_min, 1.5);
    assert_eq!(snap.uptime_seconds, 12345.67);
    assert_eq!(snap.captured_at, start);
}

#[test]
fn test_missing_meminfo_is_probe_error() {
    let dir = tempfile::tempdir().unwrap();
    let probe = MemoryProbe::new(dir.path());

    assert!(matches!(probe.sample(), Err(ProbeError::Read { .. })));
}

#[test]
fn test_zero_total_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    write_proc(dir.path(), "MemFree: 100 kB\nMemAvailable: 100 kB\n");
    let probe = MemoryProbe::new(dir.path());

    assert!(matches!(probe.sample(), Err(ProbeError::InvalidMeminfo(_))));
}

#[test]
fn test_real_proc_if_available() {
    if !Path::new("/proc/meminfo").exists() {
        return;
    }
    let snap = MemoryProbe::new("/proc").sample().unwrap();
    assert!(snap.total_mb > 0.0);
    assert!((0.0..=100.0).contains(&snap.percent));
}
